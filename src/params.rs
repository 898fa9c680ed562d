//! Resolution of partial configurations into immutable fixed-point
//! parameter sets.
//!
//! A spec (preset name, partial map, or an already-resolved set) is merged
//! through its `base` inheritance chain down from the catalog's `"neutral"`
//! root, every field is clamped into its declared bounds, timing fields are
//! converted to sample counts, and derived minimums are re-checked. The
//! resulting sets never change afterwards; `export()` flattens them into
//! the ordered integer sequence consumed by the external runtime.

use std::collections::BTreeSet;

use crate::config::{
    ConfigError, PartialConverterConfig, PartialHarvesterConfig, PresetCatalog, RangeClamped,
};
use crate::models::numeric::{LUT_SIZE, lut_shift};
use crate::sim::types::SimTiming;

/// Direct pass-through of the measured operating point.
pub const ALGO_DIRECT: u32 = 1 << 0;
/// Constant-voltage operating point.
pub const ALGO_CV: u32 = 1 << 8;
/// Open-circuit-voltage fraction tracking.
pub const ALGO_MPPT_VOC: u32 = 1 << 12;
/// Perturb-and-observe tracking.
pub const ALGO_MPPT_PO: u32 = 1 << 13;
/// Windowed peak-power tracking.
pub const ALGO_MPPT_OPT: u32 = 1 << 14;

/// Converter without active conversion stages.
pub const CNV_FEEDTHROUGH: u32 = 1 << 0;
/// Boost input stage (input drop + efficiency table active).
pub const CNV_BOOST: u32 = 1 << 4;
/// Buck output stage (regulated output drop active).
pub const CNV_BUCK: u32 = 1 << 5;

fn harvester_algorithm_code(name: &str) -> Result<u32, ConfigError> {
    match name {
        "direct" => Ok(ALGO_DIRECT),
        "cv" => Ok(ALGO_CV),
        "mppt_voc" => Ok(ALGO_MPPT_VOC),
        "mppt_po" => Ok(ALGO_MPPT_PO),
        "mppt_opt" => Ok(ALGO_MPPT_OPT),
        other => Err(ConfigError {
            field: "harvester.algorithm".into(),
            message: format!(
                "unknown algorithm \"{other}\", expected direct, cv, mppt_voc, mppt_po, or mppt_opt"
            ),
        }),
    }
}

fn converter_algorithm_code(name: &str) -> Result<u32, ConfigError> {
    match name {
        "feedthrough" => Ok(CNV_FEEDTHROUGH),
        "boost" => Ok(CNV_BOOST),
        "buck_boost" => Ok(CNV_BOOST | CNV_BUCK),
        other => Err(ConfigError {
            field: "converter.algorithm".into(),
            message: format!(
                "unknown algorithm \"{other}\", expected feedthrough, boost, or buck_boost"
            ),
        }),
    }
}

/// Resolved, immutable harvester parameter set (fixed-point units).
#[derive(Debug, Clone)]
pub struct HarvesterParams {
    /// Algorithm bitmask (`ALGO_*`).
    pub algorithm: u32,
    /// Peak-tracking window length in samples.
    pub window_size: u32,
    /// Fixed/initial operating voltage (µV).
    pub voltage_uv: u32,
    /// Lower operating-voltage bound (µV).
    pub voltage_min_uv: u32,
    /// Upper operating-voltage bound (µV).
    pub voltage_max_uv: u32,
    /// Harvest current limit (nA).
    pub current_limit_na: u32,
    /// Perturbation step (µV).
    pub voltage_step_uv: u32,
    /// Open-circuit-voltage fraction (n8).
    pub setpoint_n8: u32,
    /// Re-evaluation interval in samples.
    pub interval_n: u32,
    /// Hold duration in samples.
    pub duration_n: u32,
    /// Open-circuit settle samples per interval.
    pub wait_cycles_n: u32,
    /// Operating-point DAC step (µV).
    pub dac_step_uv: u32,
    /// Current ADC step (nA).
    pub adc_step_na: u32,
    diagnostics: Vec<RangeClamped>,
}

impl HarvesterParams {
    /// Range-clamp diagnostics collected during resolution.
    pub fn diagnostics(&self) -> &[RangeClamped] {
        &self.diagnostics
    }

    /// Flattens the set into the canonical wire order.
    ///
    /// The order is a compatibility boundary with the external runtime and
    /// must never be rearranged without a matching boundary change.
    pub fn export(&self) -> Vec<u32> {
        vec![
            self.algorithm,
            self.window_size,
            self.voltage_uv,
            self.voltage_min_uv,
            self.voltage_max_uv,
            self.current_limit_na,
            self.voltage_step_uv,
            self.setpoint_n8,
            self.interval_n,
            self.duration_n,
            self.wait_cycles_n,
            self.dac_step_uv,
            self.adc_step_na,
        ]
    }
}

/// Resolved, immutable converter parameter set (fixed-point units).
#[derive(Debug, Clone)]
pub struct ConverterParams {
    /// Topology bitmask (`CNV_*`).
    pub algorithm: u32,
    /// Forced-disabled samples after initialization.
    pub startup_delay_n: u32,
    /// Input voltage ceiling after the drop (µV).
    pub v_input_max_uv: u32,
    /// Input current cap (nA).
    pub i_input_max_na: u32,
    /// Input-side voltage drop (µV).
    pub v_input_drop_uv: u32,
    /// Capacitor integration gain: µV(n20) gained per nA of mid-rail
    /// current over one sample, stored n28.
    pub cap_gain_n28: u32,
    /// Intermediate voltage at start (µV).
    pub v_intermediate_init_uv: u32,
    /// Hard ceiling of the intermediate rail (µV).
    pub v_intermediate_max_uv: u32,
    /// Storage leakage current (nA).
    pub i_leak_na: u32,
    /// Output enable threshold (µV).
    pub v_enable_threshold_uv: u32,
    /// Output disable threshold (µV).
    pub v_disable_threshold_uv: u32,
    /// Mandatory hysteresis margin above the enable threshold (µV).
    pub dv_enable_hysteresis_uv: u32,
    /// Power-good assert threshold (µV).
    pub v_pwr_good_enable_uv: u32,
    /// Power-good deassert threshold (µV).
    pub v_pwr_good_disable_uv: u32,
    /// Evaluate power-good every sample instead of on the check interval.
    pub immediate_pwr_good: bool,
    /// Threshold check cadence in samples.
    pub interval_check_thresholds_n: u32,
    /// Buck/boost output stage drop (µV).
    pub dv_output_drop_uv: u32,
    /// Operating-point DAC step (µV).
    pub dac_step_uv: u32,
    /// Pre-shift for the input LUT voltage axis.
    pub lut_voltage_shift: u32,
    /// Pre-shift for the input LUT current axis.
    pub lut_current_shift: u32,
    /// Pre-shift for the output LUT raw-code axis.
    pub lut_output_shift: u32,
    /// Input efficiency table, n8, voltage-major.
    pub lut_input_eta_n8: [[u32; LUT_SIZE]; LUT_SIZE],
    /// Output inverse-efficiency table, n4.
    pub lut_output_inv_n4: [u32; LUT_SIZE],
    diagnostics: Vec<RangeClamped>,
}

impl ConverterParams {
    /// Range-clamp diagnostics collected during resolution.
    pub fn diagnostics(&self) -> &[RangeClamped] {
        &self.diagnostics
    }

    /// Whether the boost input stage (drop + efficiency table) is active.
    pub fn has_boost(&self) -> bool {
        self.algorithm & CNV_BOOST != 0
    }

    /// Whether the buck output stage (regulated drop) is active.
    pub fn has_buck(&self) -> bool {
        self.algorithm & CNV_BUCK != 0
    }

    /// Flattens the set, including both lookup tables, into the canonical
    /// wire order.
    ///
    /// The order is a compatibility boundary with the external runtime and
    /// must never be rearranged without a matching boundary change.
    pub fn export(&self) -> Vec<u32> {
        let mut out = vec![
            self.algorithm,
            self.startup_delay_n,
            self.v_input_max_uv,
            self.i_input_max_na,
            self.v_input_drop_uv,
            self.cap_gain_n28,
            self.v_intermediate_init_uv,
            self.v_intermediate_max_uv,
            self.i_leak_na,
            self.v_enable_threshold_uv,
            self.v_disable_threshold_uv,
            self.dv_enable_hysteresis_uv,
            self.v_pwr_good_enable_uv,
            self.v_pwr_good_disable_uv,
            u32::from(self.immediate_pwr_good),
            self.interval_check_thresholds_n,
            self.dv_output_drop_uv,
            self.dac_step_uv,
            self.lut_voltage_shift,
            self.lut_current_shift,
            self.lut_output_shift,
        ];
        for row in &self.lut_input_eta_n8 {
            out.extend_from_slice(row);
        }
        out.extend_from_slice(&self.lut_output_inv_n4);
        out
    }
}

/// Input to harvester resolution.
#[derive(Debug, Clone)]
pub enum HarvesterSpec {
    /// A catalog preset name.
    Preset(String),
    /// An explicit partial field map.
    Partial(PartialHarvesterConfig),
    /// An already-resolved set, returned as-is.
    Resolved(HarvesterParams),
}

/// Input to converter resolution.
#[derive(Debug, Clone)]
pub enum ConverterSpec {
    /// A catalog preset name.
    Preset(String),
    /// An explicit partial field map.
    Partial(PartialConverterConfig),
    /// An already-resolved set, returned as-is.
    Resolved(ConverterParams),
}

/// Resolves specs against a read-only preset catalog.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'c> {
    catalog: &'c PresetCatalog,
}

impl<'c> Resolver<'c> {
    /// Creates a resolver over the given catalog.
    pub fn new(catalog: &'c PresetCatalog) -> Self {
        Self { catalog }
    }

    /// Resolves a harvester spec into an immutable parameter set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unknown presets, inheritance cycles, or
    /// invalid field values. Out-of-range values clamp silently and are
    /// reported through [`HarvesterParams::diagnostics`].
    pub fn resolve_harvester(
        &self,
        spec: HarvesterSpec,
        timing: &SimTiming,
    ) -> Result<HarvesterParams, ConfigError> {
        let merged = match spec {
            HarvesterSpec::Resolved(params) => return Ok(params),
            HarvesterSpec::Preset(name) => self.flatten_harvester(&name)?,
            HarvesterSpec::Partial(partial) => {
                let base = partial.base.clone().unwrap_or_else(|| "neutral".into());
                let flat = self.flatten_harvester(&base)?;
                partial.merge_over(&flat)
            }
        };
        finish_harvester(&merged, timing)
    }

    /// Resolves a converter spec into an immutable parameter set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unknown presets, inheritance cycles, or
    /// invalid field values. Out-of-range values clamp silently and are
    /// reported through [`ConverterParams::diagnostics`].
    pub fn resolve_converter(
        &self,
        spec: ConverterSpec,
        timing: &SimTiming,
    ) -> Result<ConverterParams, ConfigError> {
        let merged = match spec {
            ConverterSpec::Resolved(params) => return Ok(params),
            ConverterSpec::Preset(name) => self.flatten_converter(&name)?,
            ConverterSpec::Partial(partial) => {
                let base = partial.base.clone().unwrap_or_else(|| "neutral".into());
                let flat = self.flatten_converter(&base)?;
                partial.merge_over(&flat)
            }
        };
        finish_converter(&merged, timing)
    }

    /// Walks the base chain to `"neutral"` and merges it root-down.
    fn flatten_harvester(&self, name: &str) -> Result<PartialHarvesterConfig, ConfigError> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut overlays: Vec<PartialHarvesterConfig> = Vec::new();
        let mut current = name.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return Err(ConfigError {
                    field: format!("harvester.{name}"),
                    message: format!("inheritance cycle through \"{current}\""),
                });
            }
            let partial = self.catalog.harvester(&current).ok_or_else(|| ConfigError {
                field: format!("harvester.{name}"),
                message: format!("unknown preset \"{current}\""),
            })?;
            let next = partial.base.clone();
            overlays.push(partial.clone());
            if current == "neutral" {
                break;
            }
            current = next.unwrap_or_else(|| "neutral".to_string());
        }
        Ok(merge_chain(overlays, PartialHarvesterConfig::merge_over))
    }

    /// Walks the base chain to `"neutral"` and merges it root-down.
    fn flatten_converter(&self, name: &str) -> Result<PartialConverterConfig, ConfigError> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut overlays: Vec<PartialConverterConfig> = Vec::new();
        let mut current = name.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return Err(ConfigError {
                    field: format!("converter.{name}"),
                    message: format!("inheritance cycle through \"{current}\""),
                });
            }
            let partial = self.catalog.converter(&current).ok_or_else(|| ConfigError {
                field: format!("converter.{name}"),
                message: format!("unknown preset \"{current}\""),
            })?;
            let next = partial.base.clone();
            overlays.push(partial.clone());
            if current == "neutral" {
                break;
            }
            current = next.unwrap_or_else(|| "neutral".to_string());
        }
        Ok(merge_chain(overlays, PartialConverterConfig::merge_over))
    }
}

/// Merges `[leaf, ..., root]` overlays root-down into one partial.
fn merge_chain<P>(mut overlays: Vec<P>, merge_over: impl Fn(P, &P) -> P) -> P {
    let mut merged = match overlays.pop() {
        Some(root) => root,
        None => unreachable!("chain walk pushes at least the root"),
    };
    while let Some(overlay) = overlays.pop() {
        merged = merge_over(overlay, &merged);
    }
    merged
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, ConfigError> {
    value.ok_or_else(|| ConfigError {
        field: field.into(),
        message: "missing after inheritance; catalog \"neutral\" entry is incomplete".into(),
    })
}

/// Clamps a physical value into its declared bounds. Out-of-range values
/// are applied silently but recorded; non-finite values are fatal.
fn clamp_f64(
    value: f64,
    min: f64,
    max: f64,
    field: &str,
    diags: &mut Vec<RangeClamped>,
) -> Result<f64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError {
            field: field.into(),
            message: format!("must be a finite number, got {value}"),
        });
    }
    // Clamping covers out-of-range magnitudes; a negative value for a
    // non-negative field is a type error, not a range excursion.
    if value < 0.0 && min >= 0.0 {
        return Err(ConfigError {
            field: field.into(),
            message: format!("must be non-negative, got {value}"),
        });
    }
    let applied = value.clamp(min, max);
    if applied != value {
        diags.push(RangeClamped {
            field: field.into(),
            requested: value,
            applied,
        });
    }
    Ok(applied)
}

fn clamp_u32(value: u32, min: u32, max: u32, field: &str, diags: &mut Vec<RangeClamped>) -> u32 {
    let applied = value.clamp(min, max);
    if applied != value {
        diags.push(RangeClamped {
            field: field.into(),
            requested: f64::from(value),
            applied: f64::from(applied),
        });
    }
    applied
}

/// Volts to saturated microvolts.
fn to_uv(volts: f64) -> u32 {
    (volts * 1e6).round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Amperes to saturated nanoamperes.
fn to_na(amperes: f64) -> u32 {
    (amperes * 1e9).round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Seconds to sample count at the given clock.
fn to_samples(seconds: f64, timing: &SimTiming) -> u32 {
    (seconds * f64::from(timing.sample_rate_hz))
        .round()
        .clamp(0.0, f64::from(u32::MAX)) as u32
}

fn finish_harvester(
    merged: &PartialHarvesterConfig,
    timing: &SimTiming,
) -> Result<HarvesterParams, ConfigError> {
    let mut diags = Vec::new();

    let algorithm = harvester_algorithm_code(&require(
        merged.algorithm.clone(),
        "harvester.algorithm",
    )?)?;
    let window_size = clamp_u32(
        require(merged.window_size, "harvester.window_size")?,
        1,
        4096,
        "harvester.window_size",
        &mut diags,
    );
    let voltage_min = clamp_f64(
        require(merged.voltage_min_v, "harvester.voltage_min_v")?,
        0.0,
        10.0,
        "harvester.voltage_min_v",
        &mut diags,
    )?;
    let voltage_max = clamp_f64(
        require(merged.voltage_max_v, "harvester.voltage_max_v")?,
        0.0,
        10.0,
        "harvester.voltage_max_v",
        &mut diags,
    )?;
    if voltage_min > voltage_max {
        return Err(ConfigError {
            field: "harvester.voltage_min_v".into(),
            message: format!("must be <= voltage_max_v ({voltage_min} > {voltage_max})"),
        });
    }
    let voltage = clamp_f64(
        require(merged.voltage_v, "harvester.voltage_v")?,
        voltage_min,
        voltage_max,
        "harvester.voltage_v",
        &mut diags,
    )?;
    let current_limit = clamp_f64(
        require(merged.current_limit_a, "harvester.current_limit_a")?,
        0.0,
        1.0,
        "harvester.current_limit_a",
        &mut diags,
    )?;
    let voltage_step = clamp_f64(
        require(merged.voltage_step_v, "harvester.voltage_step_v")?,
        0.0,
        1.0,
        "harvester.voltage_step_v",
        &mut diags,
    )?;
    let setpoint = clamp_f64(
        require(merged.setpoint_fraction, "harvester.setpoint_fraction")?,
        0.0,
        1.0,
        "harvester.setpoint_fraction",
        &mut diags,
    )?;
    let interval_s = clamp_f64(
        require(merged.interval_s, "harvester.interval_s")?,
        0.0,
        3600.0,
        "harvester.interval_s",
        &mut diags,
    )?;
    let duration_s = clamp_f64(
        require(merged.duration_s, "harvester.duration_s")?,
        0.0,
        3600.0,
        "harvester.duration_s",
        &mut diags,
    )?;
    let wait_cycles_n = clamp_u32(
        require(merged.wait_cycles, "harvester.wait_cycles")?,
        0,
        65_536,
        "harvester.wait_cycles",
        &mut diags,
    );
    let dac_bits = clamp_u32(
        require(merged.dac_bits, "harvester.dac_bits")?,
        4,
        24,
        "harvester.dac_bits",
        &mut diags,
    );
    let adc_bits = clamp_u32(
        require(merged.adc_bits, "harvester.adc_bits")?,
        4,
        24,
        "harvester.adc_bits",
        &mut diags,
    );

    let mut interval_n = to_samples(interval_s, timing).max(1);
    let mut duration_n = to_samples(duration_s, timing);

    // Derived minimums depend on already-resolved fields, so they are
    // re-checked only after every direct field is in place: one settle
    // sample per DAC bit plus the open-circuit wait must fit the interval,
    // and the hold must leave room for the wait.
    let interval_min = wait_cycles_n + dac_bits;
    if interval_n < interval_min {
        diags.push(RangeClamped {
            field: "harvester.interval_s".into(),
            requested: f64::from(interval_n),
            applied: f64::from(interval_min),
        });
        interval_n = interval_min;
    }
    let duration_max = interval_n - wait_cycles_n;
    if duration_n > duration_max {
        diags.push(RangeClamped {
            field: "harvester.duration_s".into(),
            requested: f64::from(duration_n),
            applied: f64::from(duration_max),
        });
        duration_n = duration_max;
    }

    let voltage_max_uv = to_uv(voltage_max);
    let current_limit_na = to_na(current_limit);
    Ok(HarvesterParams {
        algorithm,
        window_size,
        voltage_uv: to_uv(voltage),
        voltage_min_uv: to_uv(voltage_min),
        voltage_max_uv,
        current_limit_na,
        voltage_step_uv: to_uv(voltage_step),
        setpoint_n8: (setpoint * 256.0).round() as u32,
        interval_n,
        duration_n,
        wait_cycles_n,
        dac_step_uv: (voltage_max_uv >> dac_bits).max(1),
        adc_step_na: (current_limit_na >> adc_bits).max(1),
        diagnostics: diags,
    })
}

fn finish_converter(
    merged: &PartialConverterConfig,
    timing: &SimTiming,
) -> Result<ConverterParams, ConfigError> {
    let mut diags = Vec::new();

    let algorithm = converter_algorithm_code(&require(
        merged.algorithm.clone(),
        "converter.algorithm",
    )?)?;
    let c_intermediate = clamp_f64(
        require(merged.c_intermediate_f, "converter.c_intermediate_f")?,
        1e-12,
        1.0,
        "converter.c_intermediate_f",
        &mut diags,
    )?;
    let v_max = clamp_f64(
        require(merged.v_intermediate_max_v, "converter.v_intermediate_max_v")?,
        0.0,
        10.0,
        "converter.v_intermediate_max_v",
        &mut diags,
    )?;
    let v_init = clamp_f64(
        require(
            merged.v_intermediate_init_v,
            "converter.v_intermediate_init_v",
        )?,
        0.0,
        v_max,
        "converter.v_intermediate_init_v",
        &mut diags,
    )?;
    let i_leak = clamp_f64(
        require(merged.i_leak_a, "converter.i_leak_a")?,
        0.0,
        1.0,
        "converter.i_leak_a",
        &mut diags,
    )?;
    let v_input_max = clamp_f64(
        require(merged.v_input_max_v, "converter.v_input_max_v")?,
        0.0,
        10.0,
        "converter.v_input_max_v",
        &mut diags,
    )?;
    let i_input_max = clamp_f64(
        require(merged.i_input_max_a, "converter.i_input_max_a")?,
        0.0,
        1.0,
        "converter.i_input_max_a",
        &mut diags,
    )?;
    let v_input_drop = clamp_f64(
        require(merged.v_input_drop_v, "converter.v_input_drop_v")?,
        0.0,
        10.0,
        "converter.v_input_drop_v",
        &mut diags,
    )?;
    let v_enable = clamp_f64(
        require(merged.v_enable_threshold_v, "converter.v_enable_threshold_v")?,
        0.0,
        10.0,
        "converter.v_enable_threshold_v",
        &mut diags,
    )?;
    let v_disable = clamp_f64(
        require(
            merged.v_disable_threshold_v,
            "converter.v_disable_threshold_v",
        )?,
        0.0,
        10.0,
        "converter.v_disable_threshold_v",
        &mut diags,
    )?;
    if v_disable > v_enable {
        return Err(ConfigError {
            field: "converter.v_disable_threshold_v".into(),
            message: format!("must be <= v_enable_threshold_v ({v_disable} > {v_enable})"),
        });
    }
    let hysteresis = clamp_f64(
        require(merged.hysteresis_v, "converter.hysteresis_v")?,
        0.0,
        10.0,
        "converter.hysteresis_v",
        &mut diags,
    )?;
    let pg_enable = clamp_f64(
        require(merged.v_pwr_good_enable_v, "converter.v_pwr_good_enable_v")?,
        0.0,
        10.0,
        "converter.v_pwr_good_enable_v",
        &mut diags,
    )?;
    let pg_disable = clamp_f64(
        require(merged.v_pwr_good_disable_v, "converter.v_pwr_good_disable_v")?,
        0.0,
        10.0,
        "converter.v_pwr_good_disable_v",
        &mut diags,
    )?;
    if pg_disable > pg_enable {
        return Err(ConfigError {
            field: "converter.v_pwr_good_disable_v".into(),
            message: format!("must be <= v_pwr_good_enable_v ({pg_disable} > {pg_enable})"),
        });
    }
    let immediate_pwr_good = require(merged.immediate_pwr_good, "converter.immediate_pwr_good")?;
    let check_s = clamp_f64(
        require(
            merged.interval_check_thresholds_s,
            "converter.interval_check_thresholds_s",
        )?,
        0.0,
        3600.0,
        "converter.interval_check_thresholds_s",
        &mut diags,
    )?;
    let startup_s = clamp_f64(
        require(merged.startup_delay_s, "converter.startup_delay_s")?,
        0.0,
        3600.0,
        "converter.startup_delay_s",
        &mut diags,
    )?;
    let dv_output_drop = clamp_f64(
        require(merged.dv_output_drop_v, "converter.dv_output_drop_v")?,
        0.0,
        10.0,
        "converter.dv_output_drop_v",
        &mut diags,
    )?;
    let dac_bits = clamp_u32(
        require(merged.dac_bits, "converter.dac_bits")?,
        4,
        24,
        "converter.dac_bits",
        &mut diags,
    );
    let adc_bits = clamp_u32(
        require(merged.adc_bits, "converter.adc_bits")?,
        4,
        24,
        "converter.adc_bits",
        &mut diags,
    );

    let lut_input = require(
        merged.lut_input_efficiency.as_ref(),
        "converter.lut_input_efficiency",
    )?;
    let mut lut_input_eta_n8 = [[0u32; LUT_SIZE]; LUT_SIZE];
    if lut_input.len() != LUT_SIZE {
        return Err(ConfigError {
            field: "converter.lut_input_efficiency".into(),
            message: format!("must have {LUT_SIZE} rows, got {}", lut_input.len()),
        });
    }
    for (i, row) in lut_input.iter().enumerate() {
        if row.len() != LUT_SIZE {
            return Err(ConfigError {
                field: format!("converter.lut_input_efficiency[{i}]"),
                message: format!("must have {LUT_SIZE} entries, got {}", row.len()),
            });
        }
        for (j, &eta) in row.iter().enumerate() {
            let eta = clamp_f64(
                eta,
                0.0,
                1.0,
                &format!("converter.lut_input_efficiency[{i}][{j}]"),
                &mut diags,
            )?;
            lut_input_eta_n8[i][j] = (eta * 256.0).round() as u32;
        }
    }

    let lut_output = require(
        merged.lut_output_inv_efficiency.as_ref(),
        "converter.lut_output_inv_efficiency",
    )?;
    if lut_output.len() != LUT_SIZE {
        return Err(ConfigError {
            field: "converter.lut_output_inv_efficiency".into(),
            message: format!("must have {LUT_SIZE} entries, got {}", lut_output.len()),
        });
    }
    let mut lut_output_inv_n4 = [0u32; LUT_SIZE];
    for (i, &inv) in lut_output.iter().enumerate() {
        let inv = clamp_f64(
            inv,
            1.0,
            16.0,
            &format!("converter.lut_output_inv_efficiency[{i}]"),
            &mut diags,
        )?;
        lut_output_inv_n4[i] = (inv * 16.0).round() as u32;
    }

    // ΔV[µV·n20] per nA of mid-rail current over one sample.
    let c_nf = (c_intermediate * 1e9).round().max(1.0) as u64;
    let cap_gain = (timing.dt_ns << 28) / (1000 * c_nf);
    let cap_gain_n28 = u32::try_from(cap_gain).unwrap_or(u32::MAX);

    let v_input_max_uv = to_uv(v_input_max);
    let i_input_max_na = to_na(i_input_max);
    let v_intermediate_max_uv = to_uv(v_max);
    Ok(ConverterParams {
        algorithm,
        startup_delay_n: to_samples(startup_s, timing),
        v_input_max_uv,
        i_input_max_na,
        v_input_drop_uv: to_uv(v_input_drop),
        cap_gain_n28,
        v_intermediate_init_uv: to_uv(v_init),
        v_intermediate_max_uv,
        i_leak_na: to_na(i_leak),
        v_enable_threshold_uv: to_uv(v_enable),
        v_disable_threshold_uv: to_uv(v_disable),
        dv_enable_hysteresis_uv: to_uv(hysteresis),
        v_pwr_good_enable_uv: to_uv(pg_enable),
        v_pwr_good_disable_uv: to_uv(pg_disable),
        immediate_pwr_good,
        interval_check_thresholds_n: to_samples(check_s, timing).max(1),
        dv_output_drop_uv: to_uv(dv_output_drop),
        dac_step_uv: (v_intermediate_max_uv >> dac_bits).max(1),
        lut_voltage_shift: lut_shift(v_input_max_uv),
        lut_current_shift: lut_shift(i_input_max_na),
        lut_output_shift: lut_shift((1u32 << adc_bits) - 1),
        lut_input_eta_n8,
        lut_output_inv_n4,
        diagnostics: diags,
    })
}

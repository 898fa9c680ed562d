//! TOML-based partial parameter maps and the named preset catalog.
//!
//! Partial configurations carry physical units (volts, amperes, farads,
//! seconds) and an optional `base` naming the catalog entry they inherit
//! from. The catalog is rooted at a complete `"neutral"` entry per variant
//! and is consumed read-only by the resolver in [`crate::params`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Configuration error with field path and constraint description.
///
/// Raised for unknown presets, inheritance cycles, and invalid field
/// types/values at resolution time — always before a simulation starts.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"harvester.interval_s"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

/// Non-fatal diagnostic: a resolved field fell outside its declared bounds
/// and was silently clamped.
#[derive(Debug, Clone)]
pub struct RangeClamped {
    /// Dotted field path.
    pub field: String,
    /// Value as requested.
    pub requested: f64,
    /// Value actually applied.
    pub applied: f64,
}

impl fmt::Display for RangeClamped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clamped: {} {} -> {}",
            self.field, self.requested, self.applied
        )
    }
}

/// Partial harvester configuration in physical units.
///
/// Absent fields inherit from the `base` preset chain during resolution.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialHarvesterConfig {
    /// Catalog entry this partial inherits from (default `"neutral"`).
    pub base: Option<String>,
    /// Strategy name: `"direct"`, `"cv"`, `"mppt_voc"`, `"mppt_po"`,
    /// or `"mppt_opt"`.
    pub algorithm: Option<String>,
    /// Peak-tracking window length in samples.
    pub window_size: Option<u32>,
    /// Fixed operating voltage (V).
    pub voltage_v: Option<f64>,
    /// Lower operating-voltage bound (V).
    pub voltage_min_v: Option<f64>,
    /// Upper operating-voltage bound (V).
    pub voltage_max_v: Option<f64>,
    /// Harvest current limit (A).
    pub current_limit_a: Option<f64>,
    /// Perturbation step (V).
    pub voltage_step_v: Option<f64>,
    /// Open-circuit-voltage fraction (0.0-1.0).
    pub setpoint_fraction: Option<f64>,
    /// Re-evaluation interval (s).
    pub interval_s: Option<f64>,
    /// Hold duration inside each interval (s).
    pub duration_s: Option<f64>,
    /// Open-circuit settle samples at the start of each interval.
    pub wait_cycles: Option<u32>,
    /// Operating-point DAC width (bits).
    pub dac_bits: Option<u32>,
    /// Measurement ADC width (bits).
    pub adc_bits: Option<u32>,
}

impl PartialHarvesterConfig {
    /// Overlays `self` on top of `base`: present fields win, absent fields
    /// inherit.
    pub fn merge_over(self, base: &Self) -> Self {
        Self {
            base: None,
            algorithm: self.algorithm.or_else(|| base.algorithm.clone()),
            window_size: self.window_size.or(base.window_size),
            voltage_v: self.voltage_v.or(base.voltage_v),
            voltage_min_v: self.voltage_min_v.or(base.voltage_min_v),
            voltage_max_v: self.voltage_max_v.or(base.voltage_max_v),
            current_limit_a: self.current_limit_a.or(base.current_limit_a),
            voltage_step_v: self.voltage_step_v.or(base.voltage_step_v),
            setpoint_fraction: self.setpoint_fraction.or(base.setpoint_fraction),
            interval_s: self.interval_s.or(base.interval_s),
            duration_s: self.duration_s.or(base.duration_s),
            wait_cycles: self.wait_cycles.or(base.wait_cycles),
            dac_bits: self.dac_bits.or(base.dac_bits),
            adc_bits: self.adc_bits.or(base.adc_bits),
        }
    }
}

/// Partial converter configuration in physical units.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConverterConfig {
    /// Catalog entry this partial inherits from (default `"neutral"`).
    pub base: Option<String>,
    /// Topology name: `"feedthrough"`, `"boost"`, or `"buck_boost"`.
    pub algorithm: Option<String>,
    /// Intermediate (storage) capacitance (F).
    pub c_intermediate_f: Option<f64>,
    /// Intermediate voltage at simulation start (V).
    pub v_intermediate_init_v: Option<f64>,
    /// Hard ceiling of the intermediate rail (V).
    pub v_intermediate_max_v: Option<f64>,
    /// Storage leakage current (A).
    pub i_leak_a: Option<f64>,
    /// Input voltage ceiling after the drop (V).
    pub v_input_max_v: Option<f64>,
    /// Input current cap (A).
    pub i_input_max_a: Option<f64>,
    /// Input-side voltage drop (V).
    pub v_input_drop_v: Option<f64>,
    /// Output enable threshold (V).
    pub v_enable_threshold_v: Option<f64>,
    /// Output disable threshold (V).
    pub v_disable_threshold_v: Option<f64>,
    /// Mandatory hysteresis margin above the enable threshold (V).
    pub hysteresis_v: Option<f64>,
    /// Power-good assert threshold (V).
    pub v_pwr_good_enable_v: Option<f64>,
    /// Power-good deassert threshold (V).
    pub v_pwr_good_disable_v: Option<f64>,
    /// Evaluate power-good every sample instead of on the check interval.
    pub immediate_pwr_good: Option<bool>,
    /// Threshold check cadence (s).
    pub interval_check_thresholds_s: Option<f64>,
    /// Forced-disabled settle time after initialization (s).
    pub startup_delay_s: Option<f64>,
    /// Buck/boost output stage drop (V).
    pub dv_output_drop_v: Option<f64>,
    /// Operating-point DAC width (bits).
    pub dac_bits: Option<u32>,
    /// Measurement ADC width (bits).
    pub adc_bits: Option<u32>,
    /// 12x12 input efficiency table (fractions, voltage-major).
    pub lut_input_efficiency: Option<Vec<Vec<f64>>>,
    /// 12-entry output inverse-efficiency table (multipliers >= 1.0).
    pub lut_output_inv_efficiency: Option<Vec<f64>>,
}

impl PartialConverterConfig {
    /// Overlays `self` on top of `base`: present fields win, absent fields
    /// inherit.
    pub fn merge_over(self, base: &Self) -> Self {
        Self {
            base: None,
            algorithm: self.algorithm.or_else(|| base.algorithm.clone()),
            c_intermediate_f: self.c_intermediate_f.or(base.c_intermediate_f),
            v_intermediate_init_v: self.v_intermediate_init_v.or(base.v_intermediate_init_v),
            v_intermediate_max_v: self.v_intermediate_max_v.or(base.v_intermediate_max_v),
            i_leak_a: self.i_leak_a.or(base.i_leak_a),
            v_input_max_v: self.v_input_max_v.or(base.v_input_max_v),
            i_input_max_a: self.i_input_max_a.or(base.i_input_max_a),
            v_input_drop_v: self.v_input_drop_v.or(base.v_input_drop_v),
            v_enable_threshold_v: self.v_enable_threshold_v.or(base.v_enable_threshold_v),
            v_disable_threshold_v: self.v_disable_threshold_v.or(base.v_disable_threshold_v),
            hysteresis_v: self.hysteresis_v.or(base.hysteresis_v),
            v_pwr_good_enable_v: self.v_pwr_good_enable_v.or(base.v_pwr_good_enable_v),
            v_pwr_good_disable_v: self.v_pwr_good_disable_v.or(base.v_pwr_good_disable_v),
            immediate_pwr_good: self.immediate_pwr_good.or(base.immediate_pwr_good),
            interval_check_thresholds_s: self
                .interval_check_thresholds_s
                .or(base.interval_check_thresholds_s),
            startup_delay_s: self.startup_delay_s.or(base.startup_delay_s),
            dv_output_drop_v: self.dv_output_drop_v.or(base.dv_output_drop_v),
            dac_bits: self.dac_bits.or(base.dac_bits),
            adc_bits: self.adc_bits.or(base.adc_bits),
            lut_input_efficiency: self
                .lut_input_efficiency
                .or_else(|| base.lut_input_efficiency.clone()),
            lut_output_inv_efficiency: self
                .lut_output_inv_efficiency
                .or_else(|| base.lut_output_inv_efficiency.clone()),
        }
    }
}

/// Top-level run configuration parsed from TOML: one partial per model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Harvester overrides.
    pub harvester: PartialHarvesterConfig,
    /// Converter overrides.
    pub converter: PartialConverterConfig,
}

impl RunConfig {
    /// Parses a run configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".into(),
            message: e.to_string(),
        })
    }

    /// Parses a run configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".into(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }
}

/// Named preset catalog, rooted at a mandatory `"neutral"` entry per
/// variant. Consumed read-only by the resolver.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    harvesters: BTreeMap<String, PartialHarvesterConfig>,
    converters: BTreeMap<String, PartialConverterConfig>,
}

/// Built-in harvester preset names.
pub const HARVESTER_PRESETS: &[&str] =
    &["neutral", "direct", "cv20", "mppt_voc", "mppt_po", "mppt_opt"];

/// Built-in converter preset names.
pub const CONVERTER_PRESETS: &[&str] = &["neutral", "diode_capacitor", "bq25504", "bq25570"];

impl PresetCatalog {
    /// Returns the built-in catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();

        catalog.insert_harvester("neutral", neutral_harvester());
        catalog.insert_harvester(
            "direct",
            PartialHarvesterConfig {
                algorithm: Some("direct".into()),
                ..Default::default()
            },
        );
        catalog.insert_harvester(
            "cv20",
            PartialHarvesterConfig {
                algorithm: Some("cv".into()),
                voltage_v: Some(2.0),
                ..Default::default()
            },
        );
        catalog.insert_harvester(
            "mppt_voc",
            PartialHarvesterConfig {
                algorithm: Some("mppt_voc".into()),
                setpoint_fraction: Some(0.76),
                interval_s: Some(0.010),
                duration_s: Some(0.008),
                wait_cycles: Some(64),
                ..Default::default()
            },
        );
        catalog.insert_harvester(
            "mppt_po",
            PartialHarvesterConfig {
                base: Some("mppt_voc".into()),
                algorithm: Some("mppt_po".into()),
                voltage_step_v: Some(0.025),
                interval_s: Some(0.0025),
                ..Default::default()
            },
        );
        catalog.insert_harvester(
            "mppt_opt",
            PartialHarvesterConfig {
                algorithm: Some("mppt_opt".into()),
                window_size: Some(256),
                ..Default::default()
            },
        );

        catalog.insert_converter("neutral", neutral_converter());
        catalog.insert_converter(
            "diode_capacitor",
            PartialConverterConfig {
                v_input_drop_v: Some(0.3),
                c_intermediate_f: Some(1e-3),
                v_intermediate_max_v: Some(5.0),
                v_enable_threshold_v: Some(2.2),
                v_disable_threshold_v: Some(2.0),
                hysteresis_v: Some(0.05),
                v_pwr_good_enable_v: Some(2.2),
                v_pwr_good_disable_v: Some(1.9),
                ..Default::default()
            },
        );
        catalog.insert_converter(
            "bq25504",
            PartialConverterConfig {
                algorithm: Some("boost".into()),
                c_intermediate_f: Some(100e-6),
                v_intermediate_init_v: Some(3.0),
                v_intermediate_max_v: Some(5.25),
                i_leak_a: Some(330e-9),
                v_enable_threshold_v: Some(2.4),
                v_disable_threshold_v: Some(2.0),
                hysteresis_v: Some(0.1),
                v_pwr_good_enable_v: Some(2.8),
                v_pwr_good_disable_v: Some(2.4),
                immediate_pwr_good: Some(false),
                interval_check_thresholds_s: Some(0.001),
                startup_delay_s: Some(0.05),
                lut_input_efficiency: Some(boost_input_efficiency()),
                lut_output_inv_efficiency: Some(vec![
                    1.30, 1.30, 1.26, 1.22, 1.18, 1.15, 1.12, 1.10, 1.08, 1.08, 1.10, 1.14,
                ]),
                ..Default::default()
            },
        );
        catalog.insert_converter(
            "bq25570",
            PartialConverterConfig {
                base: Some("bq25504".into()),
                algorithm: Some("buck_boost".into()),
                v_intermediate_max_v: Some(5.5),
                v_enable_threshold_v: Some(2.95),
                v_disable_threshold_v: Some(2.3),
                dv_output_drop_v: Some(0.35),
                ..Default::default()
            },
        );

        catalog
    }

    /// Adds or replaces a harvester preset.
    pub fn insert_harvester(&mut self, name: &str, partial: PartialHarvesterConfig) {
        let _ = self.harvesters.insert(name.to_string(), partial);
    }

    /// Adds or replaces a converter preset.
    pub fn insert_converter(&mut self, name: &str, partial: PartialConverterConfig) {
        let _ = self.converters.insert(name.to_string(), partial);
    }

    /// Looks up a harvester preset by name.
    pub fn harvester(&self, name: &str) -> Option<&PartialHarvesterConfig> {
        self.harvesters.get(name)
    }

    /// Looks up a converter preset by name.
    pub fn converter(&self, name: &str) -> Option<&PartialConverterConfig> {
        self.converters.get(name)
    }
}

/// Complete root entry every harvester chain terminates at.
fn neutral_harvester() -> PartialHarvesterConfig {
    PartialHarvesterConfig {
        base: None,
        algorithm: Some("direct".into()),
        window_size: Some(128),
        voltage_v: Some(2.0),
        voltage_min_v: Some(0.1),
        voltage_max_v: Some(5.0),
        current_limit_a: Some(0.05),
        voltage_step_v: Some(0.025),
        setpoint_fraction: Some(0.76),
        interval_s: Some(0.010),
        duration_s: Some(0.008),
        wait_cycles: Some(64),
        dac_bits: Some(12),
        adc_bits: Some(18),
    }
}

/// Complete root entry every converter chain terminates at: a lossless
/// feedthrough stage that is always enabled.
fn neutral_converter() -> PartialConverterConfig {
    PartialConverterConfig {
        base: None,
        algorithm: Some("feedthrough".into()),
        c_intermediate_f: Some(1e-6),
        v_intermediate_init_v: Some(3.0),
        v_intermediate_max_v: Some(10.0),
        i_leak_a: Some(0.0),
        v_input_max_v: Some(10.0),
        i_input_max_a: Some(0.05),
        v_input_drop_v: Some(0.0),
        v_enable_threshold_v: Some(0.0),
        v_disable_threshold_v: Some(0.0),
        hysteresis_v: Some(0.0),
        v_pwr_good_enable_v: Some(0.0),
        v_pwr_good_disable_v: Some(0.0),
        immediate_pwr_good: Some(true),
        interval_check_thresholds_s: Some(0.001),
        startup_delay_s: Some(0.0),
        dv_output_drop_v: Some(0.0),
        dac_bits: Some(12),
        adc_bits: Some(18),
        lut_input_efficiency: Some(vec![vec![1.0; 12]; 12]),
        lut_output_inv_efficiency: Some(vec![1.0; 12]),
    }
}

/// Boost-charger input efficiency, voltage-major: low rows are starved
/// input voltages, low columns are starved input currents.
fn boost_input_efficiency() -> Vec<Vec<f64>> {
    vec![
        vec![
            0.05, 0.05, 0.08, 0.10, 0.12, 0.14, 0.15, 0.16, 0.16, 0.15, 0.14, 0.12,
        ],
        vec![
            0.10, 0.12, 0.18, 0.24, 0.30, 0.34, 0.37, 0.38, 0.38, 0.37, 0.35, 0.32,
        ],
        vec![
            0.18, 0.24, 0.35, 0.44, 0.51, 0.56, 0.59, 0.61, 0.61, 0.60, 0.57, 0.53,
        ],
        vec![
            0.26, 0.35, 0.48, 0.57, 0.64, 0.68, 0.71, 0.72, 0.72, 0.71, 0.68, 0.64,
        ],
        vec![
            0.34, 0.45, 0.58, 0.66, 0.72, 0.76, 0.78, 0.79, 0.79, 0.78, 0.75, 0.71,
        ],
        vec![
            0.42, 0.53, 0.65, 0.72, 0.77, 0.81, 0.83, 0.84, 0.84, 0.83, 0.80, 0.76,
        ],
        vec![
            0.50, 0.60, 0.70, 0.77, 0.81, 0.84, 0.86, 0.87, 0.87, 0.86, 0.84, 0.80,
        ],
        vec![
            0.56, 0.65, 0.74, 0.80, 0.84, 0.87, 0.89, 0.90, 0.90, 0.89, 0.87, 0.83,
        ],
        vec![
            0.61, 0.69, 0.77, 0.83, 0.87, 0.89, 0.91, 0.92, 0.92, 0.91, 0.89, 0.86,
        ],
        vec![
            0.65, 0.72, 0.80, 0.85, 0.88, 0.91, 0.92, 0.93, 0.93, 0.92, 0.90, 0.87,
        ],
        vec![
            0.67, 0.74, 0.81, 0.86, 0.89, 0.92, 0.93, 0.94, 0.94, 0.93, 0.91, 0.88,
        ],
        vec![
            0.68, 0.75, 0.82, 0.87, 0.90, 0.92, 0.94, 0.94, 0.94, 0.93, 0.91, 0.88,
        ],
    ]
}

//! Converter model: capacitor storage plus the power-stage state machine.
//!
//! The trait is the seam for backend selection: the harness drives any
//! conforming implementation through the same four per-sample operations,
//! always in the same order. None of them can fail; all arithmetic
//! saturates, mirroring firmware that cannot raise mid-loop.

use crate::calibration::CalPair;
use crate::models::numeric::{current_na, lut_index, power_fw, scale_n4, scale_n8};
use crate::params::ConverterParams;

/// Per-sample converter capability set.
///
/// Call order per sample is fixed: `calc_input_power`, `update_capacitor`,
/// `calc_output_power`, `update_output_stage`. Only `update_capacitor`
/// carries state forward, which makes the loop strictly sequential.
pub trait ConverterModel {
    /// Computes harvested input power (fW) from an operating point.
    fn calc_input_power(&mut self, voltage_uv: u32, current_na: u32) -> u64;

    /// Integrates the net mid-rail current into the intermediate voltage
    /// and returns it (µV).
    fn update_capacitor(&mut self) -> u32;

    /// Computes delivered output power (fW) from a raw output-current code.
    fn calc_output_power(&mut self, current_out_raw: u32) -> u64;

    /// Advances the enable/power-good state machine; returns the enable
    /// state.
    fn update_output_stage(&mut self) -> bool;

    /// Intermediate (capacitor) voltage (µV).
    fn v_intermediate_uv(&self) -> u32;

    /// Regulated output voltage (µV); zero while disabled.
    fn v_output_uv(&self) -> u32;

    /// Net mid-rail current of the last capacitor update (nA, signed).
    fn i_mid_na(&self) -> i64;

    /// Output stage enable state.
    fn output_enabled(&self) -> bool;

    /// Power-good latch state.
    fn power_good(&self) -> bool;

    /// Cumulative delivered energy in fW·samples.
    fn delivered_energy_fw_samples(&self) -> u128;

    /// The resolved parameter set this converter runs on.
    fn params(&self) -> &ConverterParams;
}

/// Portable fixed-point reference implementation.
///
/// Numerically matches the embedded real-time implementation bit for bit:
/// same unit domain, same saturation, same bucketing.
#[derive(Debug, Clone)]
pub struct ReferenceConverter {
    params: ConverterParams,
    cal_current: CalPair,
    /// Intermediate voltage, µV with 20 fractional bits.
    v_mid_uv_n20: u64,
    v_out_uv: u32,
    p_in_fw: u64,
    p_out_fw: u64,
    i_mid_na: i64,
    enabled: bool,
    pwr_good: bool,
    age_n: u64,
    check_pos: u32,
    energy_out: u128,
}

impl ReferenceConverter {
    /// Creates a converter at its configured initial rail voltage, output
    /// disabled.
    pub fn new(params: ConverterParams, cal_current: CalPair) -> Self {
        let v_mid_uv_n20 = u64::from(params.v_intermediate_init_uv) << 20;
        Self {
            params,
            cal_current,
            v_mid_uv_n20,
            v_out_uv: 0,
            p_in_fw: 0,
            p_out_fw: 0,
            i_mid_na: 0,
            enabled: false,
            pwr_good: false,
            age_n: 0,
            check_pos: 0,
            energy_out: 0,
        }
    }
}

impl ConverterModel for ReferenceConverter {
    fn calc_input_power(&mut self, voltage_uv: u32, current_na: u32) -> u64 {
        let p = &self.params;
        let v = voltage_uv
            .saturating_sub(p.v_input_drop_uv)
            .min(p.v_input_max_uv);
        let i = current_na.min(p.i_input_max_na);
        let raw_power = power_fw(v, i);
        self.p_in_fw = if p.has_boost() {
            let eta = p.lut_input_eta_n8[lut_index(v, p.lut_voltage_shift)]
                [lut_index(i, p.lut_current_shift)];
            scale_n8(raw_power, eta)
        } else {
            raw_power
        };
        self.p_in_fw
    }

    fn update_capacitor(&mut self) -> u32 {
        let p = &self.params;
        let v_mid_uv = (self.v_mid_uv_n20 >> 20) as u32;
        let i_charge = current_na(self.p_in_fw, v_mid_uv);
        let i_discharge =
            current_na(self.p_out_fw, v_mid_uv).saturating_add(u64::from(p.i_leak_na));
        self.i_mid_na = i64::try_from(i_charge).unwrap_or(i64::MAX)
            - i64::try_from(i_discharge).unwrap_or(i64::MAX);

        let delta_n20 = |i: u64| i.saturating_mul(u64::from(p.cap_gain_n28)) >> 8;
        if i_charge >= i_discharge {
            self.v_mid_uv_n20 = self.v_mid_uv_n20.saturating_add(delta_n20(i_charge - i_discharge));
        } else {
            self.v_mid_uv_n20 = self
                .v_mid_uv_n20
                .saturating_sub(delta_n20(i_discharge - i_charge));
        }
        let ceiling = u64::from(p.v_intermediate_max_uv) << 20;
        self.v_mid_uv_n20 = self.v_mid_uv_n20.min(ceiling);
        (self.v_mid_uv_n20 >> 20) as u32
    }

    fn calc_output_power(&mut self, current_out_raw: u32) -> u64 {
        let p = &self.params;
        let i_na = self.cal_current.raw_to_si(current_out_raw).max(0);
        let i_na = u32::try_from(i_na).unwrap_or(u32::MAX);
        let raw_power = power_fw(self.v_out_uv, i_na);
        self.p_out_fw = if p.has_buck() {
            let inv = p.lut_output_inv_n4[lut_index(current_out_raw, p.lut_output_shift)];
            scale_n4(raw_power, inv)
        } else {
            raw_power
        };
        self.energy_out = self.energy_out.saturating_add(u128::from(self.p_out_fw));
        self.p_out_fw
    }

    fn update_output_stage(&mut self) -> bool {
        let p = &self.params;
        self.age_n += 1;
        if self.age_n <= u64::from(p.startup_delay_n) {
            self.enabled = false;
            self.pwr_good = false;
            self.v_out_uv = 0;
            return false;
        }

        let v_mid_uv = (self.v_mid_uv_n20 >> 20) as u32;
        if self.enabled {
            if v_mid_uv < p.v_disable_threshold_uv {
                self.enabled = false;
            }
        } else if v_mid_uv >= p.v_enable_threshold_uv.saturating_add(p.dv_enable_hysteresis_uv) {
            self.enabled = true;
        }

        self.check_pos += 1;
        if p.immediate_pwr_good || self.check_pos >= p.interval_check_thresholds_n {
            self.check_pos = 0;
            if v_mid_uv >= p.v_pwr_good_enable_uv {
                self.pwr_good = true;
            } else if v_mid_uv < p.v_pwr_good_disable_uv {
                self.pwr_good = false;
            }
        }

        self.v_out_uv = if self.enabled {
            if p.has_buck() {
                v_mid_uv.saturating_sub(p.dv_output_drop_uv)
            } else {
                v_mid_uv
            }
        } else {
            0
        };
        self.enabled
    }

    fn v_intermediate_uv(&self) -> u32 {
        (self.v_mid_uv_n20 >> 20) as u32
    }

    fn v_output_uv(&self) -> u32 {
        self.v_out_uv
    }

    fn i_mid_na(&self) -> i64 {
        self.i_mid_na
    }

    fn output_enabled(&self) -> bool {
        self.enabled
    }

    fn power_good(&self) -> bool {
        self.pwr_good
    }

    fn delivered_energy_fw_samples(&self) -> u128 {
        self.energy_out
    }

    fn params(&self) -> &ConverterParams {
        &self.params
    }
}

//! Native floating-point converter backend.
//!
//! Implements the same capability set as the fixed-point reference, with
//! `f64` state for fast parameter sweeps. It shares the resolved parameter
//! set, the integer LUT contents, and the quantized capacitor gain, so the
//! two backends track each other closely enough for cross-validation.

use crate::calibration::CalPair;
use crate::models::converter::ConverterModel;
use crate::models::numeric::lut_index;
use crate::params::ConverterParams;

/// Accelerated `f64` implementation of [`ConverterModel`].
///
/// Selected explicitly by the caller; see [`crate::models::verify`] for
/// checking it against the reference backend.
#[derive(Debug, Clone)]
pub struct AcceleratedConverter {
    params: ConverterParams,
    cal_current: CalPair,
    v_mid_uv: f64,
    v_out_uv: f64,
    p_in_fw: f64,
    p_out_fw: f64,
    i_mid_na: f64,
    enabled: bool,
    pwr_good: bool,
    age_n: u64,
    check_pos: u32,
    energy_out_fw: f64,
}

impl AcceleratedConverter {
    /// Creates a converter at its configured initial rail voltage, output
    /// disabled.
    pub fn new(params: ConverterParams, cal_current: CalPair) -> Self {
        let v_mid_uv = f64::from(params.v_intermediate_init_uv);
        Self {
            params,
            cal_current,
            v_mid_uv,
            v_out_uv: 0.0,
            p_in_fw: 0.0,
            p_out_fw: 0.0,
            i_mid_na: 0.0,
            enabled: false,
            pwr_good: false,
            age_n: 0,
            check_pos: 0,
            energy_out_fw: 0.0,
        }
    }
}

impl ConverterModel for AcceleratedConverter {
    fn calc_input_power(&mut self, voltage_uv: u32, current_na: u32) -> u64 {
        let p = &self.params;
        let v = f64::from(voltage_uv.saturating_sub(p.v_input_drop_uv).min(p.v_input_max_uv));
        let i = f64::from(current_na.min(p.i_input_max_na));
        self.p_in_fw = if p.has_boost() {
            let v_idx = lut_index(
                voltage_uv.saturating_sub(p.v_input_drop_uv).min(p.v_input_max_uv),
                p.lut_voltage_shift,
            );
            let i_idx = lut_index(current_na.min(p.i_input_max_na), p.lut_current_shift);
            let eta = f64::from(p.lut_input_eta_n8[v_idx][i_idx]) / 256.0;
            v * i * eta
        } else {
            v * i
        };
        self.p_in_fw.round() as u64
    }

    fn update_capacitor(&mut self) -> u32 {
        let p = &self.params;
        let v_div = self.v_mid_uv.max(1.0);
        let i_charge = self.p_in_fw / v_div;
        let i_discharge = self.p_out_fw / v_div + f64::from(p.i_leak_na);
        self.i_mid_na = i_charge - i_discharge;
        // Same quantized gain constant as the reference backend.
        let gain_uv_per_na = f64::from(p.cap_gain_n28) / f64::from(1u32 << 28);
        self.v_mid_uv = (self.v_mid_uv + self.i_mid_na * gain_uv_per_na)
            .clamp(0.0, f64::from(p.v_intermediate_max_uv));
        self.v_mid_uv as u32
    }

    fn calc_output_power(&mut self, current_out_raw: u32) -> u64 {
        let p = &self.params;
        let i_na = self.cal_current.raw_to_si(current_out_raw).max(0) as f64;
        self.p_out_fw = if p.has_buck() {
            let inv =
                f64::from(p.lut_output_inv_n4[lut_index(current_out_raw, p.lut_output_shift)])
                    / 16.0;
            self.v_out_uv * i_na * inv
        } else {
            self.v_out_uv * i_na
        };
        self.energy_out_fw += self.p_out_fw;
        self.p_out_fw.round() as u64
    }

    fn update_output_stage(&mut self) -> bool {
        let p = &self.params;
        self.age_n += 1;
        if self.age_n <= u64::from(p.startup_delay_n) {
            self.enabled = false;
            self.pwr_good = false;
            self.v_out_uv = 0.0;
            return false;
        }

        let v_mid = self.v_mid_uv;
        if self.enabled {
            if v_mid < f64::from(p.v_disable_threshold_uv) {
                self.enabled = false;
            }
        } else if v_mid
            >= f64::from(p.v_enable_threshold_uv) + f64::from(p.dv_enable_hysteresis_uv)
        {
            self.enabled = true;
        }

        self.check_pos += 1;
        if p.immediate_pwr_good || self.check_pos >= p.interval_check_thresholds_n {
            self.check_pos = 0;
            if v_mid >= f64::from(p.v_pwr_good_enable_uv) {
                self.pwr_good = true;
            } else if v_mid < f64::from(p.v_pwr_good_disable_uv) {
                self.pwr_good = false;
            }
        }

        self.v_out_uv = if self.enabled {
            if p.has_buck() {
                (v_mid - f64::from(p.dv_output_drop_uv)).max(0.0)
            } else {
                v_mid
            }
        } else {
            0.0
        };
        self.enabled
    }

    fn v_intermediate_uv(&self) -> u32 {
        self.v_mid_uv as u32
    }

    fn v_output_uv(&self) -> u32 {
        self.v_out_uv as u32
    }

    fn i_mid_na(&self) -> i64 {
        self.i_mid_na as i64
    }

    fn output_enabled(&self) -> bool {
        self.enabled
    }

    fn power_good(&self) -> bool {
        self.pwr_good
    }

    fn delivered_energy_fw_samples(&self) -> u128 {
        self.energy_out_fw.max(0.0) as u128
    }

    fn params(&self) -> &ConverterParams {
        &self.params
    }
}

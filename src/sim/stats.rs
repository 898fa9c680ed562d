//! Aggregate energy reporting for completed runs.

use std::fmt;

use crate::sim::types::SimTiming;

/// Aggregate result of one simulation run.
///
/// Energies accumulate in the fixed-point fW·sample domain during the run
/// and convert to joules exactly once, here at the report boundary.
#[derive(Debug, Clone, Copy)]
pub struct EnergyReport {
    /// Samples processed.
    pub samples: u64,
    /// Simulated wall time (s).
    pub duration_s: f64,
    /// Total harvested input energy (J).
    pub energy_in_j: f64,
    /// Total delivered output energy (J).
    pub energy_out_j: f64,
    /// Mean harvested power (W).
    pub mean_power_in_w: f64,
    /// Mean delivered power (W).
    pub mean_power_out_w: f64,
    /// Fraction of samples with the output stage enabled.
    pub output_enabled_ratio: f64,
    /// Fraction of samples with power-good asserted.
    pub power_good_ratio: f64,
    /// Intermediate rail voltage at run end (V).
    pub v_intermediate_final_v: f64,
}

impl EnergyReport {
    /// Builds the report from the harness accumulators.
    pub fn from_accumulators(
        samples: u64,
        energy_in_fw_samples: u128,
        energy_out_fw_samples: u128,
        enabled_samples: u64,
        good_samples: u64,
        v_intermediate_final_uv: u32,
        timing: &SimTiming,
    ) -> Self {
        let dt_s = timing.dt_seconds();
        if samples == 0 {
            return Self {
                samples: 0,
                duration_s: 0.0,
                energy_in_j: 0.0,
                energy_out_j: 0.0,
                mean_power_in_w: 0.0,
                mean_power_out_w: 0.0,
                output_enabled_ratio: 0.0,
                power_good_ratio: 0.0,
                v_intermediate_final_v: f64::from(v_intermediate_final_uv) * 1e-6,
            };
        }

        let duration_s = samples as f64 * dt_s;
        let energy_in_j = energy_in_fw_samples as f64 * dt_s * 1e-15;
        let energy_out_j = energy_out_fw_samples as f64 * dt_s * 1e-15;
        Self {
            samples,
            duration_s,
            energy_in_j,
            energy_out_j,
            mean_power_in_w: energy_in_j / duration_s,
            mean_power_out_w: energy_out_j / duration_s,
            output_enabled_ratio: enabled_samples as f64 / samples as f64,
            power_good_ratio: good_samples as f64 / samples as f64,
            v_intermediate_final_v: f64::from(v_intermediate_final_uv) * 1e-6,
        }
    }
}

impl fmt::Display for EnergyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Energy Report ---")?;
        writeln!(
            f,
            "Samples:            {} ({:.3} s)",
            self.samples, self.duration_s
        )?;
        writeln!(
            f,
            "Harvested energy:   {:.6} mJ (mean {:.3} mW)",
            self.energy_in_j * 1e3,
            self.mean_power_in_w * 1e3
        )?;
        writeln!(
            f,
            "Delivered energy:   {:.6} mJ (mean {:.3} mW)",
            self.energy_out_j * 1e3,
            self.mean_power_out_w * 1e3
        )?;
        writeln!(
            f,
            "Output enabled:     {:.1}%",
            self.output_enabled_ratio * 100.0
        )?;
        writeln!(
            f,
            "Power good:         {:.1}%",
            self.power_good_ratio * 100.0
        )?;
        write!(
            f,
            "Final rail voltage: {:.4} V",
            self.v_intermediate_final_v
        )
    }
}

//! Cross-backend consistency checking.
//!
//! Two conforming converter backends driven over the same input must stay
//! within an agreed tolerance of each other; anything beyond it is a
//! [`ConsistencyError`]. Used only in verification contexts, never inside
//! a simulation run.

use std::fmt;

use crate::sim::types::OutputSample;

/// Divergence between two backend runs beyond the agreed tolerance.
#[derive(Debug, Clone)]
pub struct ConsistencyError {
    /// Index of the first offending sample (or the shorter length on a
    /// length mismatch).
    pub sample_index: usize,
    /// Name of the diverging quantity.
    pub quantity: &'static str,
    /// Reference backend value.
    pub reference: f64,
    /// Accelerated backend value.
    pub accelerated: f64,
    /// Relative tolerance that was exceeded.
    pub tolerance: f64,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backend divergence at sample {}: {} {} vs {} (tolerance {})",
            self.sample_index, self.quantity, self.reference, self.accelerated, self.tolerance
        )
    }
}

fn check(
    sample_index: usize,
    quantity: &'static str,
    reference: f64,
    accelerated: f64,
    tolerance: f64,
) -> Result<(), ConsistencyError> {
    let scale = reference.abs().max(accelerated.abs()).max(1.0);
    if (reference - accelerated).abs() <= tolerance * scale {
        Ok(())
    } else {
        Err(ConsistencyError {
            sample_index,
            quantity,
            reference,
            accelerated,
            tolerance,
        })
    }
}

/// Compares two backend runs sample-by-sample within a relative tolerance.
///
/// # Errors
///
/// Returns the first [`ConsistencyError`] encountered: a length mismatch,
/// or an intermediate/output voltage or output power outside the
/// tolerance.
pub fn cross_check(
    reference: &[OutputSample],
    accelerated: &[OutputSample],
    tolerance: f64,
) -> Result<(), ConsistencyError> {
    if reference.len() != accelerated.len() {
        return Err(ConsistencyError {
            sample_index: reference.len().min(accelerated.len()),
            quantity: "sample count",
            reference: reference.len() as f64,
            accelerated: accelerated.len() as f64,
            tolerance,
        });
    }
    for (i, (r, a)) in reference.iter().zip(accelerated.iter()).enumerate() {
        check(
            i,
            "v_intermediate_uv",
            f64::from(r.v_intermediate_uv),
            f64::from(a.v_intermediate_uv),
            tolerance,
        )?;
        check(
            i,
            "v_out_uv",
            f64::from(r.v_out_uv),
            f64::from(a.v_out_uv),
            tolerance,
        )?;
        check(
            i,
            "p_out_fw",
            r.p_out_fw as f64,
            a.p_out_fw as f64,
            tolerance,
        )?;
    }
    Ok(())
}

/// Compares two scalar energy totals within a relative tolerance.
///
/// # Errors
///
/// Returns a [`ConsistencyError`] with index 0 when the totals diverge.
pub fn cross_check_energy(
    reference_j: f64,
    accelerated_j: f64,
    tolerance: f64,
) -> Result<(), ConsistencyError> {
    if (reference_j - accelerated_j).abs()
        <= tolerance * reference_j.abs().max(accelerated_j.abs()).max(f64::MIN_POSITIVE)
    {
        Ok(())
    } else {
        Err(ConsistencyError {
            sample_index: 0,
            quantity: "total energy",
            reference: reference_j,
            accelerated: accelerated_j,
            tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v_mid: u32, v_out: u32, p_out: u64) -> OutputSample {
        OutputSample {
            timestamp_ns: 0,
            v_out_uv: v_out,
            i_out_na: 0,
            v_intermediate_uv: v_mid,
            p_in_fw: 0,
            p_out_fw: p_out,
            output_enabled: v_out > 0,
            power_good: false,
        }
    }

    #[test]
    fn identical_runs_pass() {
        let run = vec![sample(3_000_000, 2_950_000, 1_000_000); 16];
        assert!(cross_check(&run, &run, 1e-9).is_ok());
    }

    #[test]
    fn small_drift_within_tolerance_passes() {
        let a = vec![sample(3_000_000, 2_950_000, 1_000_000); 4];
        let b = vec![sample(3_000_100, 2_950_100, 1_000_030); 4];
        assert!(cross_check(&a, &b, 1e-3).is_ok());
    }

    #[test]
    fn divergence_names_the_first_offending_sample() {
        let a = vec![sample(3_000_000, 0, 0); 4];
        let mut b = a.clone();
        b[2] = sample(3_400_000, 0, 0);
        let err = cross_check(&a, &b, 1e-3).err();
        assert!(err.is_some());
        let err = err.as_ref();
        assert_eq!(err.map(|e| e.sample_index), Some(2));
        assert_eq!(err.map(|e| e.quantity), Some("v_intermediate_uv"));
    }

    #[test]
    fn length_mismatch_is_divergence() {
        let a = vec![sample(3_000_000, 0, 0); 4];
        let b = vec![sample(3_000_000, 0, 0); 5];
        let err = cross_check(&a, &b, 1e-3).err();
        assert!(err.is_some_and(|e| e.quantity == "sample count"));
    }

    #[test]
    fn energy_totals_compare_relatively() {
        assert!(cross_check_energy(1.0, 1.0005, 1e-3).is_ok());
        assert!(cross_check_energy(1.0, 1.1, 1e-3).is_err());
        assert!(cross_check_energy(0.0, 0.0, 1e-9).is_ok());
    }
}

//! Core simulation types: timing, trace samples, and load models.

use std::fmt;

use crate::calibration::CalibrationSet;

/// Centralized sampling-clock configuration.
///
/// All timing parameters resolve to sample counts against this clock, so
/// every model references the same derived sample interval.
///
/// # Examples
///
/// ```
/// use vsrc_sim::sim::types::SimTiming;
///
/// let timing = SimTiming::new(100_000);
/// assert_eq!(timing.dt_ns, 10_000);
/// assert_eq!(timing.samples_for_seconds(1.0), 100_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    /// Samples per second.
    pub sample_rate_hz: u32,
    /// Duration of one sample in nanoseconds, derived from the rate.
    pub dt_ns: u64,
}

impl SimTiming {
    /// Creates a sampling clock from a rate in Hz.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate_hz` is zero.
    pub fn new(sample_rate_hz: u32) -> Self {
        assert!(sample_rate_hz > 0, "sample_rate_hz must be > 0");
        Self {
            sample_rate_hz,
            dt_ns: 1_000_000_000 / u64::from(sample_rate_hz),
        }
    }

    /// Sample interval in seconds.
    pub fn dt_seconds(&self) -> f64 {
        self.dt_ns as f64 * 1e-9
    }

    /// Number of samples covering `seconds`, rounded to nearest.
    pub fn samples_for_seconds(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.sample_rate_hz)).round() as u64
    }
}

/// One calibrated trace sample: a timestamped (voltage, current) pair in
/// the fixed-point unit domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Timestamp in nanoseconds from trace start.
    pub timestamp_ns: u64,
    /// Harvested voltage in microvolts.
    pub voltage_uv: u32,
    /// Harvested current in nanoamperes.
    pub current_na: u32,
}

/// One uncalibrated trace sample as read from a device: raw ADC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// Timestamp in nanoseconds from trace start.
    pub timestamp_ns: u64,
    /// Raw voltage ADC code.
    pub voltage_raw: u32,
    /// Raw current ADC code.
    pub current_raw: u32,
}

impl RawSample {
    /// Converts raw codes into the fixed-point unit domain. Negative
    /// calibrated readings (offset overshoot on a noisy zero) clamp to 0.
    pub fn calibrate(&self, cal: &CalibrationSet) -> Sample {
        let uv = cal.voltage_in.raw_to_si(self.voltage_raw).max(0);
        let na = cal.current_in.raw_to_si(self.current_raw).max(0);
        Sample {
            timestamp_ns: self.timestamp_ns,
            voltage_uv: u32::try_from(uv).unwrap_or(u32::MAX),
            current_na: u32::try_from(na).unwrap_or(u32::MAX),
        }
    }
}

/// Output load drawn from the converter while its output stage is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadModel {
    /// No load attached.
    #[default]
    Off,
    /// Constant current sink.
    Constant {
        /// Load current in nanoamperes.
        current_na: u32,
    },
}

impl LoadModel {
    /// Load current drawn this sample given the output-enable state.
    pub fn current_na(&self, output_enabled: bool) -> u32 {
        match self {
            Self::Off => 0,
            Self::Constant { current_na } => {
                if output_enabled {
                    *current_na
                } else {
                    0
                }
            }
        }
    }
}

/// Complete record of one simulation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSample {
    /// Timestamp in nanoseconds from trace start.
    pub timestamp_ns: u64,
    /// Regulated output voltage (µV); zero while disabled.
    pub v_out_uv: u32,
    /// Output current actually drawn (nA).
    pub i_out_na: u32,
    /// Intermediate (capacitor) voltage (µV).
    pub v_intermediate_uv: u32,
    /// Harvested input power this sample (fW).
    pub p_in_fw: u64,
    /// Delivered output power this sample (fW).
    pub p_out_fw: u64,
    /// Output stage enable state after this sample.
    pub output_enabled: bool,
    /// Power-good latch state after this sample.
    pub power_good: bool,
}

impl fmt::Display for OutputSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>12} ns | v_mid={:>8.4} V  v_out={:>8.4} V  i_out={:>9.6} A | \
             p_in={:>10.6} mW  p_out={:>10.6} mW | out={} good={}",
            self.timestamp_ns,
            self.v_intermediate_uv as f64 * 1e-6,
            self.v_out_uv as f64 * 1e-6,
            f64::from(self.i_out_na) * 1e-9,
            self.p_in_fw as f64 * 1e-12,
            self.p_out_fw as f64 * 1e-12,
            self.output_enabled,
            self.power_good,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_derives_sample_interval() {
        let timing = SimTiming::new(100_000);
        assert_eq!(timing.dt_ns, 10_000);
        assert!((timing.dt_seconds() - 1e-5).abs() < 1e-12);
    }

    #[test]
    fn timing_sample_count_rounds() {
        let timing = SimTiming::new(1000);
        assert_eq!(timing.samples_for_seconds(0.5), 500);
        assert_eq!(timing.samples_for_seconds(0.0004), 0);
        assert_eq!(timing.samples_for_seconds(0.0006), 1);
    }

    #[test]
    #[should_panic]
    fn timing_zero_rate_panics() {
        let _ = SimTiming::new(0);
    }

    #[test]
    fn raw_sample_calibrates_through_the_channel_pairs() {
        let cal = CalibrationSet::default();
        let raw = RawSample {
            timestamp_ns: 10_000,
            voltage_raw: cal.voltage_in.raw_max(),
            current_raw: 0,
        };
        let s = raw.calibrate(&cal);
        assert!((i64::from(s.voltage_uv) - 5_000_000).abs() <= 1);
        assert_eq!(s.current_na, 0);
        assert_eq!(s.timestamp_ns, 10_000);
    }

    #[test]
    fn load_draws_nothing_while_output_disabled() {
        let load = LoadModel::Constant { current_na: 1_000 };
        assert_eq!(load.current_na(false), 0);
        assert_eq!(load.current_na(true), 1_000);
        assert_eq!(LoadModel::Off.current_na(true), 0);
    }

    #[test]
    fn output_sample_display_does_not_panic() {
        let s = OutputSample {
            timestamp_ns: 0,
            v_out_uv: 2_950_000,
            i_out_na: 10_000_000,
            v_intermediate_uv: 3_300_000,
            p_in_fw: 1_000_000_000,
            p_out_fw: 900_000_000,
            output_enabled: true,
            power_good: false,
        };
        let text = format!("{s}");
        assert!(!text.is_empty());
    }
}

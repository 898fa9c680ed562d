//! Bidirectional mapping between raw device codes and physical quantities.
//!
//! Each channel carries a linear (gain, offset) pair in fixed-point n20
//! form, with the inverse direction derived at construction so the two
//! stay consistent. Conversions are pure functions and bit-deterministic:
//! the same raw code always produces the same fixed-point reading.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// Fixed-point linear calibration for one channel.
///
/// `gain_n20` is the channel's physical unit per raw LSB (µV or nA, times
/// 2^20); `offset_n20` is the physical value of raw code zero. The raw
/// direction rounds to nearest and clamps into the code range, which keeps
/// `si_to_raw(raw_to_si(r))` within one LSB of `r` for every in-range code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalPair {
    gain_n20: i64,
    offset_n20: i64,
    raw_max: u32,
}

impl CalPair {
    /// Builds a channel calibration from physical-unit coefficients.
    ///
    /// # Arguments
    ///
    /// * `gain` - physical units (µV or nA) per raw LSB, must be > 0
    /// * `offset` - physical value of raw code zero
    /// * `bits` - ADC/DAC code width, 4..=31
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for a non-finite or non-positive gain or an
    /// unsupported bit width.
    pub fn from_units(gain: f64, offset: f64, bits: u32) -> Result<Self, ConfigError> {
        if !gain.is_finite() || gain <= 0.0 {
            return Err(ConfigError {
                field: "calibration.gain".into(),
                message: format!("must be a finite positive number, got {gain}"),
            });
        }
        if !offset.is_finite() {
            return Err(ConfigError {
                field: "calibration.offset".into(),
                message: "must be a finite number".into(),
            });
        }
        if !(4..=31).contains(&bits) {
            return Err(ConfigError {
                field: "calibration.bits".into(),
                message: format!("must be in [4, 31], got {bits}"),
            });
        }
        Ok(Self {
            gain_n20: (gain * f64::from(1u32 << 20)).round() as i64,
            offset_n20: (offset * f64::from(1u32 << 20)).round() as i64,
            raw_max: (1u32 << bits) - 1,
        })
    }

    /// Highest representable raw code for this channel.
    pub fn raw_max(&self) -> u32 {
        self.raw_max
    }

    /// Converts a raw code to the channel's physical unit (µV or nA).
    pub fn raw_to_si(&self, raw: u32) -> i64 {
        (i64::from(raw) * self.gain_n20 + self.offset_n20) >> 20
    }

    /// Converts a physical value (µV or nA) back to the nearest raw code,
    /// clamped into the representable range.
    pub fn si_to_raw(&self, si: i64) -> u32 {
        let numer = (si << 20) - self.offset_n20;
        if numer <= 0 {
            return 0;
        }
        let raw = (numer + self.gain_n20 / 2) / self.gain_n20;
        u32::try_from(raw).unwrap_or(self.raw_max).min(self.raw_max)
    }
}

/// Per-channel calibration for the trace boundary: harvesting-side current
/// and voltage ADCs plus the operating-point DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSet {
    /// Input (harvested) current ADC, nA per LSB.
    pub current_in: CalPair,
    /// Input (harvested) voltage ADC, µV per LSB.
    pub voltage_in: CalPair,
    /// Operating-point DAC, µV per LSB.
    pub voltage_dac: CalPair,
}

impl Default for CalibrationSet {
    /// Ideal 18-bit front end: 5 V and 50 mA full scale, zero offset.
    fn default() -> Self {
        let current_in = CalPair::from_units(50_000_000.0 / f64::from((1u32 << 18) - 1), 0.0, 18);
        let voltage_in = CalPair::from_units(5_000_000.0 / f64::from((1u32 << 18) - 1), 0.0, 18);
        let voltage_dac = CalPair::from_units(5_000_000.0 / f64::from((1u32 << 12) - 1), 0.0, 12);
        // The ideal coefficients are in range by construction.
        match (current_in, voltage_in, voltage_dac) {
            (Ok(current_in), Ok(voltage_in), Ok(voltage_dac)) => Self {
                current_in,
                voltage_in,
                voltage_dac,
            },
            _ => unreachable!("ideal calibration coefficients are valid"),
        }
    }
}

/// One channel as written in a calibration TOML file, SI units per LSB
/// (volts or amperes).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelFile {
    /// SI units (V or A) per raw LSB.
    pub gain: f64,
    /// Physical value of raw code zero (V or A).
    pub offset: f64,
    /// Code width in bits.
    pub bits: u32,
}

/// Calibration file layout: one `[channel]` table per channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationFile {
    /// Input current channel (A per LSB).
    pub current_in: ChannelFile,
    /// Input voltage channel (V per LSB).
    pub voltage_in: ChannelFile,
    /// DAC voltage channel (V per LSB).
    pub voltage_dac: ChannelFile,
}

impl CalibrationSet {
    /// Parses a calibration set from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or a coefficient is
    /// out of range.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: CalibrationFile = toml::from_str(s).map_err(|e| ConfigError {
            field: "calibration".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            current_in: CalPair::from_units(
                file.current_in.gain * 1e9,
                file.current_in.offset * 1e9,
                file.current_in.bits,
            )?,
            voltage_in: CalPair::from_units(
                file.voltage_in.gain * 1e6,
                file.voltage_in.offset * 1e6,
                file.voltage_in.bits,
            )?,
            voltage_dac: CalPair::from_units(
                file.voltage_dac.gain * 1e6,
                file.voltage_dac.offset * 1e6,
                file.voltage_dac.bits,
            )?,
        })
    }

    /// Parses a calibration set from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "calibration".into(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }
}

//! CSV import for recorded input traces.
//!
//! Input traces arrive as raw ADC codes; calibration into the fixed-point
//! unit domain happens here, at the trace boundary, so everything past
//! this point is bit-deterministic.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::calibration::CalibrationSet;
use crate::sim::types::{RawSample, Sample};

/// Expected column header of a raw input trace.
const HEADER: &[&str] = &["timestamp_ns", "voltage_raw", "current_raw"];

/// Trace parse error with record position and description.
#[derive(Debug, Clone)]
pub struct TraceError {
    /// 1-based record number (0 for header/file-level errors).
    pub record: u64,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace error at record {}: {}", self.record, self.message)
    }
}

/// Reads a raw input trace from a CSV file and calibrates it.
///
/// # Errors
///
/// Returns a `TraceError` if the file cannot be opened or a record is
/// malformed.
pub fn import_csv(path: &Path, cal: &CalibrationSet) -> Result<Vec<Sample>, TraceError> {
    let file = File::open(path).map_err(|e| TraceError {
        record: 0,
        message: format!("cannot open \"{}\": {e}", path.display()),
    })?;
    read_csv(io::BufReader::new(file), cal)
}

/// Reads a raw input trace from any reader and calibrates it.
///
/// # Errors
///
/// Returns a `TraceError` on a header mismatch, a short record, or an
/// unparseable field.
pub fn read_csv(reader: impl Read, cal: &CalibrationSet) -> Result<Vec<Sample>, TraceError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);

    let headers = rdr.headers().map_err(|e| TraceError {
        record: 0,
        message: e.to_string(),
    })?;
    let found: Vec<&str> = headers.iter().map(str::trim).collect();
    if found != HEADER {
        return Err(TraceError {
            record: 0,
            message: format!("expected header {HEADER:?}, found {found:?}"),
        });
    }

    let mut samples = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let number = index as u64 + 1;
        let record = record.map_err(|e| TraceError {
            record: number,
            message: e.to_string(),
        })?;
        if record.len() != HEADER.len() {
            return Err(TraceError {
                record: number,
                message: format!("expected {} fields, found {}", HEADER.len(), record.len()),
            });
        }
        let raw = RawSample {
            timestamp_ns: parse_field(&record[0], "timestamp_ns", number)?,
            voltage_raw: parse_field(&record[1], "voltage_raw", number)?,
            current_raw: parse_field(&record[2], "current_raw", number)?,
        };
        samples.push(raw.calibrate(cal));
    }
    Ok(samples)
}

fn parse_field<T: std::str::FromStr>(
    field: &str,
    name: &str,
    record: u64,
) -> Result<T, TraceError> {
    field.trim().parse().map_err(|_| TraceError {
        record,
        message: format!("field {name}: \"{field}\" is not a valid unsigned integer"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_trace_parses_and_calibrates() {
        let cal = CalibrationSet::default();
        let csv = "timestamp_ns,voltage_raw,current_raw\n\
                   0,131072,0\n\
                   10000,262143,52429\n";
        let samples = read_csv(csv.as_bytes(), &cal);
        assert!(samples.is_ok(), "should parse: {:?}", samples.err());
        let samples = samples.unwrap_or_default();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp_ns, 10_000);
        // full-scale voltage code calibrates to ~5 V
        assert!(i64::from(samples[1].voltage_uv).abs_diff(5_000_000) <= 1);
        // ~20% current code calibrates to ~10 mA
        assert!(i64::from(samples[1].current_na).abs_diff(10_000_000) < 1_000);
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let cal = CalibrationSet::default();
        let csv = "time,volts,amps\n1,2,3\n";
        let err = read_csv(csv.as_bytes(), &cal).err();
        assert!(err.is_some_and(|e| e.record == 0 && e.message.contains("header")));
    }

    #[test]
    fn malformed_field_reports_the_record_number() {
        let cal = CalibrationSet::default();
        let csv = "timestamp_ns,voltage_raw,current_raw\n\
                   0,100,100\n\
                   10000,not_a_number,100\n";
        let err = read_csv(csv.as_bytes(), &cal).err();
        assert!(err.is_some());
        let err = err.as_ref();
        assert_eq!(err.map(|e| e.record), Some(2));
        assert!(err.is_some_and(|e| e.message.contains("voltage_raw")));
    }

    #[test]
    fn empty_trace_is_just_the_header() {
        let cal = CalibrationSet::default();
        let csv = "timestamp_ns,voltage_raw,current_raw\n";
        let samples = read_csv(csv.as_bytes(), &cal);
        assert_eq!(samples.map(|s| s.len()).ok(), Some(0));
    }

    #[test]
    fn negative_code_is_rejected_not_wrapped() {
        let cal = CalibrationSet::default();
        let csv = "timestamp_ns,voltage_raw,current_raw\n0,-5,0\n";
        assert!(read_csv(csv.as_bytes(), &cal).is_err());
    }
}

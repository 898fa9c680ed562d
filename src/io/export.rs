//! CSV export for simulated output traces.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::OutputSample;

/// Schema v1 column header for output-trace export.
const HEADER: &str = "timestamp_ns,v_out_v,i_out_a,v_intermediate_v,\
                      p_in_w,p_out_w,output_enabled,power_good";

/// Exports an output trace to a CSV file at the given path.
///
/// Physical-unit conversion happens here, at the trace boundary: volts,
/// amperes, and watts with enough digits to keep the fixed-point values
/// exact. Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(samples: &[OutputSample], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(samples, buf)
}

/// Writes an output trace as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(samples: &[OutputSample], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for s in samples {
        wtr.write_record(&[
            s.timestamp_ns.to_string(),
            format!("{:.6}", f64::from(s.v_out_uv) * 1e-6),
            format!("{:.9}", f64::from(s.i_out_na) * 1e-9),
            format!("{:.6}", f64::from(s.v_intermediate_uv) * 1e-6),
            format!("{:.15}", s.p_in_fw as f64 * 1e-15),
            format!("{:.15}", s.p_out_fw as f64 * 1e-15),
            s.output_enabled.to_string(),
            s.power_good.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

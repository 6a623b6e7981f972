use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::record::{CanonicalRecord, RawRow};
use crate::sink::SinkOutcome;

pub const RECORD_HEADER: [&str; 12] = [
    "Company",
    "Property",
    "Street",
    "City",
    "State",
    "Zip",
    "Phone",
    "Email",
    "Units",
    "URL",
    "Association",
    "Member Type",
];

pub const OUTCOME_HEADER: [&str; 4] = ["Property", "Status", "Response", "Submitted At"];

/// Header first, even when there are no rows.
fn write_rows<W: io::Write, T: Serialize>(writer: W, header: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_records<W: io::Write>(writer: W, records: &[CanonicalRecord]) -> Result<()> {
    write_rows(writer, &RECORD_HEADER, records)
}

pub fn write_outcomes<W: io::Write>(writer: W, outcomes: &[SinkOutcome]) -> Result<()> {
    write_rows(writer, &OUTCOME_HEADER, outcomes)
}

pub fn save_records(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_records(file, records)?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

pub fn save_outcomes(path: &Path, outcomes: &[SinkOutcome]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_outcomes(file, outcomes)?;
    info!("Wrote {} import results to {}", outcomes.len(), path.display());
    Ok(())
}

/// Rows of a previously exported CSV, header skipped, fields trimmed.
pub fn read_csv_rows<R: io::Read>(reader: R) -> Vec<RawRow> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        match result {
            Ok(record) => {
                let fields = record.iter().map(str::to_string).collect();
                rows.push(RawRow::from_csv_fields(fields));
            }
            Err(e) => warn!("Skipping unreadable CSV record {}: {}", i + 1, e),
        }
    }
    rows
}

pub fn load_csv_rows(path: &Path) -> Result<Vec<RawRow>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let rows = read_csv_rows(file);
    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

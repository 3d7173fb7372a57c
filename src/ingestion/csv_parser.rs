//! CSV contact parsing.
//!
//! The header row names the columns; `name`, `email`, `company` and `phone` are
//! picked up by name, anything else is ignored and missing columns read as
//! empty. Both functions share one reader configuration so the row count taken
//! at upload time matches what the orchestrator later parses.

use crate::error::Result;
use crate::models::ContactRecord;
use tracing::debug;

fn reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes)
}

/// Parse every data row into a [`ContactRecord`], preserving input order
pub fn parse_contacts(bytes: &[u8]) -> Result<Vec<ContactRecord>> {
    let mut csv_reader = reader(bytes);
    let mut records = Vec::new();

    for result in csv_reader.deserialize::<ContactRecord>() {
        records.push(result?);
    }

    debug!(rows = records.len(), "Parsed contact rows");
    Ok(records)
}

/// Number of data records, header excluded
pub fn count_data_rows(bytes: &[u8]) -> Result<usize> {
    let mut csv_reader = reader(bytes);
    let mut count = 0;

    for result in csv_reader.byte_records() {
        result?;
        count += 1;
    }

    Ok(count)
}

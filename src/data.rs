//! Training data loading from CSV exports using Polars

use crate::error::{SegmentError, ValidationError};
use crate::record::RawRecord;
use polars::prelude::*;

/// Required attributes: snake_case name and the customer database header
const COLUMNS: [(&str, &str); 4] = [
    ("tier", "Loyalty Tier"),
    ("gender", "Gender"),
    ("location", "Location"),
    ("join_date", "Date Joined"),
];

/// Load a customer CSV into unvalidated rows
///
/// # Arguments
/// * `file_path` - Path to the CSV file with a header row
///
/// # Returns
/// * One `RawRecord` per data row, in file order. Empty cells come back as
///   missing fields so that validation can name them.
pub fn load_training_rows(file_path: &str) -> anyhow::Result<Vec<RawRecord>> {
    // every column is read as text; dates are parsed during validation
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(file_path.into()))?
        .finish()?;

    let mut columns = Vec::with_capacity(COLUMNS.len());
    for (name, legacy) in COLUMNS {
        let series = df
            .column(name)
            .or_else(|_| df.column(legacy))
            .map_err(|_| SegmentError::from(ValidationError::MissingColumn { column: name }))?;
        columns.push(text_values(series)?);
    }

    let rows = (0..df.height())
        .map(|i| RawRecord {
            tier: columns[0][i].clone(),
            gender: columns[1][i].clone(),
            location: columns[2][i].clone(),
            join_date: columns[3][i].clone(),
        })
        .collect::<Vec<_>>();

    log::info!("loaded {} rows from {}", rows.len(), file_path);
    Ok(rows)
}

/// Column cells as optional strings
fn text_values(series: &Series) -> anyhow::Result<Vec<Option<String>>> {
    let text = series.cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect())
}

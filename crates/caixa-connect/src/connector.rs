use serde::{Deserialize, Serialize};

use caixa_core::Record;

use crate::error::ConnectorError;

/// Column type as understood by destination structure setup. String is the
/// wire type of every record value; these describe what the values parse as.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// The contract every pluggable adapter implements against its concrete
/// system (CSV file, SQL table, SFTP drop, web API, ...). Connectors call
/// into the message box; the box never calls connectors.
pub trait Connector: Send {
    /// Read everything the source currently has: the header list and one
    /// record per row.
    fn read(&mut self) -> Result<(Vec<String>, Vec<Record>), ConnectorError>;

    /// Write a batch of records to the destination.
    fn write(&mut self, headers: &[String], records: &[Record]) -> Result<(), ConnectorError>;

    /// Describe the source's columns and inferred types.
    fn get_schema(&mut self) -> Result<Vec<Column>, ConnectorError>;

    /// Prepare the destination to accept records of the given shape
    /// (create the file/table/folder). Idempotent.
    fn ensure_destination_structure(&mut self, columns: &[Column]) -> Result<(), ConnectorError>;
}

/// Infer a column type per header from a sample of records.
///
/// Integer widens to Real when a float shows up; any other disagreement
/// (including Boolean mixed with numbers) falls back to Text. Empty values
/// are skipped; a column with no non-empty sample is Text.
pub fn infer_column_types(headers: &[String], sample: &[Record]) -> Vec<Column> {
    headers
        .iter()
        .map(|name| {
            let mut seen: Option<ColumnType> = None;
            for record in sample {
                let Some(value) = record.get(name) else { continue };
                if value.is_empty() {
                    continue;
                }
                let ty = infer_value(value);
                seen = Some(match seen {
                    None => ty,
                    Some(prev) => widen(prev, ty),
                });
            }
            Column {
                name: name.clone(),
                ty: seen.unwrap_or(ColumnType::Text),
            }
        })
        .collect()
}

fn infer_value(value: &str) -> ColumnType {
    if value.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if value.parse::<f64>().is_ok() {
        ColumnType::Real
    } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

fn widen(a: ColumnType, b: ColumnType) -> ColumnType {
    use ColumnType::*;
    match (a, b) {
        _ if a == b => a,
        (Integer, Real) | (Real, Integer) => Real,
        _ => Text,
    }
}

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing::debug;

use caixa_core::Record;

use crate::connector::{infer_column_types, Column, Connector};
use crate::error::ConnectorError;

/// How many rows `get_schema` samples for type inference.
const SCHEMA_SAMPLE_ROWS: usize = 100;

/// File-backed CSV adapter. Reading consumes the whole file; writing appends,
/// emitting the header row first when the file is new or empty.
pub struct CsvConnector {
    path: PathBuf,
}

impl CsvConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_new_or_empty(&self) -> bool {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        }
    }

    fn read_sample(&self, limit: usize) -> Result<(Vec<String>, Vec<Record>), ConnectorError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let record: Record = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect();
            records.push(record);
            if records.len() >= limit {
                break;
            }
        }
        Ok((headers, records))
    }
}

impl Connector for CsvConnector {
    fn read(&mut self) -> Result<(Vec<String>, Vec<Record>), ConnectorError> {
        let (headers, records) = self.read_sample(usize::MAX)?;
        debug!(path = %self.path.display(), rows = records.len(), "csv file read");
        Ok((headers, records))
    }

    fn write(&mut self, headers: &[String], records: &[Record]) -> Result<(), ConnectorError> {
        let write_header = self.is_new_or_empty();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if write_header {
            writer.write_record(headers)?;
        }
        for record in records {
            let row: Vec<&str> = headers
                .iter()
                .map(|h| record.get(h).map(String::as_str).unwrap_or(""))
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush().map_err(ConnectorError::Io)?;
        Ok(())
    }

    fn get_schema(&mut self) -> Result<Vec<Column>, ConnectorError> {
        let (headers, sample) = self.read_sample(SCHEMA_SAMPLE_ROWS)?;
        Ok(infer_column_types(&headers, &sample))
    }

    fn ensure_destination_structure(&mut self, columns: &[Column]) -> Result<(), ConnectorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if self.is_new_or_empty() {
            let mut writer = csv::Writer::from_path(&self.path)?;
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            writer.write_record(&names)?;
            writer.flush().map_err(ConnectorError::Io)?;
            debug!(path = %self.path.display(), "csv destination initialized");
        }
        Ok(())
    }
}

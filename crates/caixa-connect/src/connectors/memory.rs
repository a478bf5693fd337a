use std::sync::{Arc, Mutex};

use caixa_core::Record;

use crate::connector::{infer_column_types, Column, Connector};
use crate::error::ConnectorError;

#[derive(Debug, Default)]
struct MemoryTable {
    headers: Vec<String>,
    rows: Vec<Record>,
}

/// In-process adapter holding rows behind a shared handle. Clones see the
/// same table, which is how tests and demos inspect what a destination
/// received after a transport run.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    inner: Arc<Mutex<MemoryTable>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector pre-seeded with source data.
    pub fn with_rows(headers: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryTable { headers, rows })),
        }
    }

    /// Snapshot of the rows currently held.
    pub fn rows(&self) -> Vec<Record> {
        self.lock().rows.clone()
    }

    pub fn headers(&self) -> Vec<String> {
        self.lock().headers.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTable> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Connector for MemoryConnector {
    fn read(&mut self) -> Result<(Vec<String>, Vec<Record>), ConnectorError> {
        let table = self.lock();
        Ok((table.headers.clone(), table.rows.clone()))
    }

    fn write(&mut self, headers: &[String], records: &[Record]) -> Result<(), ConnectorError> {
        let mut table = self.lock();
        if table.headers.is_empty() {
            table.headers = headers.to_vec();
        }
        table.rows.extend(records.iter().cloned());
        Ok(())
    }

    fn get_schema(&mut self) -> Result<Vec<Column>, ConnectorError> {
        let table = self.lock();
        Ok(infer_column_types(&table.headers, &table.rows))
    }

    fn ensure_destination_structure(&mut self, columns: &[Column]) -> Result<(), ConnectorError> {
        let mut table = self.lock();
        if table.headers.is_empty() {
            table.headers = columns.iter().map(|c| c.name.clone()).collect();
        }
        Ok(())
    }
}

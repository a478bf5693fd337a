use tracing::info;
use uuid::Uuid;

use caixa_core::{AdapterRole, MessageBox};

use crate::connector::Connector;
use crate::error::SourceError;

/// Drives one source connector: read everything it has, debatch into the
/// message box in `batch_size` chunks. The chunk size only bounds per-call
/// memory; every record still becomes its own independently addressable
/// message.
pub struct SourceRunner {
    adapter_name: String,
    instance_id: Uuid,
    batch_size: usize,
}

impl SourceRunner {
    pub fn new(adapter_name: impl Into<String>, batch_size: usize) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            instance_id: Uuid::new_v4(),
            batch_size: batch_size.max(1),
        }
    }

    /// Read the source and persist its rows, returning message ids in row
    /// order. A storage failure mid-run reports every id already persisted;
    /// those messages stay and will be consumed, nothing is rolled back.
    pub fn run(
        &self,
        mbox: &MessageBox,
        interface_name: &str,
        connector: &mut dyn Connector,
    ) -> Result<Vec<Uuid>, SourceError> {
        let (headers, records) = connector.read()?;

        let mut ids = Vec::with_capacity(records.len());
        for chunk in records.chunks(self.batch_size) {
            match mbox.store().write(
                interface_name,
                &self.adapter_name,
                AdapterRole::Source,
                self.instance_id,
                &headers,
                chunk,
            ) {
                Ok(chunk_ids) => ids.extend(chunk_ids),
                Err(e) => {
                    ids.extend(e.persisted.iter().copied());
                    return Err(SourceError::Write {
                        persisted: ids,
                        source: e,
                    });
                }
            }
        }

        info!(
            interface = interface_name,
            adapter = %self.adapter_name,
            rows = ids.len(),
            "source debatched"
        );
        Ok(ids)
    }
}

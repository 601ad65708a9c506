// src/load/memory.rs

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::Destination;
use crate::record::NormalizedRecord;
use crate::source::WriteDisposition;

/// Keeps every table in memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    tables: Mutex<HashMap<String, Vec<NormalizedRecord>>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `table`, or `None` if it was never written.
    pub fn table(&self, table: &str) -> Option<Vec<NormalizedRecord>> {
        self.tables.lock().ok()?.get(table).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Destination for MemoryDestination {
    fn write(
        &self,
        table: &str,
        records: Vec<NormalizedRecord>,
        disposition: WriteDisposition,
    ) -> Result<usize> {
        let n = records.len();
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow!("memory destination lock poisoned"))?;
        match disposition {
            WriteDisposition::Replace => {
                tables.insert(table.to_string(), records);
            }
        }
        debug!(table, records = n, "replaced in-memory table");
        Ok(n)
    }
}

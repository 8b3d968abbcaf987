#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use entity_mapper_core::{DatasetDescriptor, InputTable, RemoteTable, Warehouse, WarehouseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch { table: String, ids: Vec<String> },
    Count { table: String },
    Close,
}

/// In-memory stand-in for the warehouse: filters stored rows by key the way
/// `CAST(key AS TEXT) = ANY($1)` would.
#[derive(Default)]
pub struct FakeWarehouse {
    tables: HashMap<String, Vec<Vec<(String, Option<String>)>>>,
    failing: HashSet<String>,
    pub calls: Vec<Call>,
}

impl FakeWarehouse {
    pub fn with_rows(mut self, table: &str, rows: &[&[(&str, Option<&str>)]]) -> Self {
        let stored = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| (column.to_string(), value.map(str::to_string)))
                    .collect()
            })
            .collect();
        self.tables.insert(table.to_string(), stored);
        self
    }

    pub fn failing(mut self, table: &str) -> Self {
        self.failing.insert(table.to_string());
        self
    }

    pub fn fetch_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Fetch { .. }))
            .collect()
    }

    pub fn count_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Count { .. }))
            .count()
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn fetch_matching(
        &mut self,
        dataset: &DatasetDescriptor,
        ids: &[String],
    ) -> Result<RemoteTable, WarehouseError> {
        self.calls.push(Call::Fetch {
            table: dataset.table.clone(),
            ids: ids.to_vec(),
        });

        if self.failing.contains(&dataset.table) {
            return Err(WarehouseError::Decode {
                table: dataset.table.clone(),
                message: "simulated failure".to_string(),
            });
        }

        let mut result = RemoteTable::empty(dataset.name.clone());
        for row in self.tables.get(&dataset.table).into_iter().flatten() {
            let key = row
                .iter()
                .find(|(column, _)| column == &dataset.key_column)
                .and_then(|(_, value)| value.clone());
            if key.is_some_and(|key| ids.contains(&key)) {
                result.push_row(row.iter().cloned());
            }
        }
        Ok(result)
    }

    async fn count_rows(&mut self, table: &str) -> Result<i64, WarehouseError> {
        self.calls.push(Call::Count {
            table: table.to_string(),
        });
        Ok(self.tables.get(table).map_or(0, |rows| rows.len() as i64))
    }

    async fn close(&mut self) {
        self.calls.push(Call::Close);
    }
}

pub fn input_table(pairs: &[(Option<&str>, Option<&str>)]) -> InputTable {
    let cells = pairs
        .iter()
        .map(|(primary, secondary)| {
            vec![
                primary.map(str::to_string),
                secondary.map(str::to_string),
            ]
        })
        .collect();
    InputTable::from_cells(
        Path::new("ids.csv"),
        vec!["pitchbook_id".to_string(), "bq_id".to_string()],
        cells,
    )
    .expect("input table")
}

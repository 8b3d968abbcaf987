//! Joins fetched datasets onto the input rows as one wide polars frame.

use std::collections::HashMap;

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{DatasetCatalog, DatasetDescriptor};
use crate::identifiers::{strip_quotes, FallbackChain, KeyMatch};
use crate::input::InputTable;
use crate::warehouse::{RemoteRecord, RemoteTable};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub rows: usize,
    pub columns: usize,
    pub primary_matched: usize,
    pub secondary_matched: usize,
    /// Rows whose secondary match needed a rule other than the exact one.
    pub secondary_fallback_matches: usize,
}

#[derive(Debug)]
pub struct MergedTable {
    pub frame: DataFrame,
    pub summary: MergeSummary,
}

/// Normalized key → record index for one fetched dataset.
struct DatasetLookup<'a> {
    descriptor: &'a DatasetDescriptor,
    table: &'a RemoteTable,
    chain: FallbackChain,
    index: HashMap<String, usize>,
}

impl<'a> DatasetLookup<'a> {
    fn build(descriptor: &'a DatasetDescriptor, table: &'a RemoteTable) -> Self {
        let chain = FallbackChain::for_policy(descriptor.match_policy);
        let mut index = HashMap::with_capacity(table.len());

        match table.key_column_index(&descriptor.key_column) {
            Some(key_idx) => {
                for (row_idx, record) in table.records().iter().enumerate() {
                    let Some(key) = record.cell(key_idx) else {
                        continue;
                    };
                    // Later records replace earlier ones with the same key.
                    index.insert(chain.index_key(key), row_idx);
                }
            }
            None if !table.is_empty() => warn!(
                dataset = %descriptor.name,
                key_column = %descriptor.key_column,
                "key column missing from fetched rows; nothing will match"
            ),
            None => {}
        }

        Self {
            descriptor,
            table,
            chain,
            index,
        }
    }

    fn resolve(&self, raw_id: Option<&str>) -> Option<(&'a RemoteRecord, KeyMatch<'_, usize>)> {
        let hit = self.chain.resolve(&self.index, raw_id?)?;
        let record = &self.table.records()[*hit.value];
        Some((record, hit))
    }

    fn output_names(&self) -> Vec<String> {
        self.table
            .columns()
            .iter()
            .map(|column| format!("{}{}", self.descriptor.output_prefix, column))
            .collect()
    }
}

/// Column-wise buffers for one dataset's prefixed output columns.
struct DatasetColumns {
    names: Vec<String>,
    values: Vec<Vec<String>>,
}

impl DatasetColumns {
    fn new(names: Vec<String>, height: usize) -> Self {
        let values = names.iter().map(|_| Vec::with_capacity(height)).collect();
        Self { names, values }
    }

    fn push(&mut self, record: Option<&RemoteRecord>) {
        for (idx, column) in self.values.iter_mut().enumerate() {
            let value = record
                .and_then(|record| record.cell(idx))
                .unwrap_or_default();
            column.push(value.to_string());
        }
    }

    fn into_columns(self) -> impl Iterator<Item = Column> {
        self.names
            .into_iter()
            .zip(self.values)
            .map(|(name, values)| Series::new(name.as_str().into(), values).into())
    }
}

/// Joins the fetched datasets onto the input rows.
///
/// Produces exactly one output row per input row, in input order. The column
/// set is the two identifier columns followed by every fetched column of each
/// dataset under that dataset's output prefix. Rows without a match carry
/// empty strings in that dataset's columns.
pub fn merge_datasets(
    input: &InputTable,
    catalog: &DatasetCatalog,
    primary: &RemoteTable,
    secondary: &RemoteTable,
) -> Result<MergedTable, PolarsError> {
    let height = input.len();
    let primary_lookup = DatasetLookup::build(&catalog.primary, primary);
    let secondary_lookup = DatasetLookup::build(&catalog.secondary, secondary);

    let mut primary_ids = Vec::with_capacity(height);
    let mut secondary_ids = Vec::with_capacity(height);
    let mut primary_columns = DatasetColumns::new(primary_lookup.output_names(), height);
    let mut secondary_columns = DatasetColumns::new(secondary_lookup.output_names(), height);
    let mut summary = MergeSummary {
        rows: height,
        ..MergeSummary::default()
    };

    for (row_idx, row) in input.rows.iter().enumerate() {
        let primary_id = row.primary_id.as_deref();
        let secondary_id = row.secondary_id.as_deref();

        primary_ids.push(primary_id.unwrap_or_default().to_string());
        secondary_ids.push(secondary_id.map(strip_quotes).unwrap_or_default());

        let primary_match = primary_lookup.resolve(primary_id);
        if primary_match.is_some() {
            summary.primary_matched += 1;
        }
        primary_columns.push(primary_match.map(|(record, _)| record));

        let secondary_match = secondary_lookup.resolve(secondary_id);
        if let Some((_, hit)) = secondary_match {
            summary.secondary_matched += 1;
            if hit.is_fallback() {
                summary.secondary_fallback_matches += 1;
                debug!(row = row_idx, id = ?secondary_id, rule = hit.rule, "secondary identifier matched by fallback");
            }
        }
        secondary_columns.push(secondary_match.map(|(record, _)| record));
    }

    let mut columns: Vec<Column> = Vec::with_capacity(
        2 + primary_columns.names.len() + secondary_columns.names.len(),
    );
    columns.push(Series::new(catalog.primary.input_label.as_str().into(), primary_ids).into());
    columns.push(Series::new(catalog.secondary.input_label.as_str().into(), secondary_ids).into());
    columns.extend(primary_columns.into_columns());
    columns.extend(secondary_columns.into_columns());

    let frame = DataFrame::new(columns)?;
    summary.columns = frame.width();

    info!(
        rows = summary.rows,
        columns = summary.columns,
        primary_columns = primary.columns().len(),
        secondary_columns = secondary.columns().len(),
        "merged datasets onto input rows"
    );

    Ok(MergedTable { frame, summary })
}

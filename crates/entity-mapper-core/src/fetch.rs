//! Bulk retrieval of one dataset's rows for a batch of input identifiers.

use tracing::{debug, error, info, warn};

use crate::config::DatasetDescriptor;
use crate::identifiers::{prepare_identifiers, FallbackChain};
use crate::warehouse::{RemoteTable, Warehouse};

/// Fetches every row of `dataset` keyed by one of `raw_ids`, or by one of
/// their fallback forms when the dataset matches through the fallback chain.
///
/// Never fails: unusable identifiers, query errors and decode errors all
/// yield an empty table so the run continues with that dataset's columns
/// left blank.
pub async fn fetch_dataset<W>(
    warehouse: &mut W,
    dataset: &DatasetDescriptor,
    raw_ids: &[&str],
) -> RemoteTable
where
    W: Warehouse + ?Sized,
{
    let cleaned = prepare_identifiers(raw_ids.iter().copied());
    if cleaned.is_empty() {
        warn!(
            dataset = %dataset.name,
            supplied = raw_ids.len(),
            "no usable identifiers after cleaning; skipping lookup"
        );
        return RemoteTable::empty(dataset.name.clone());
    }

    let ids = FallbackChain::for_policy(dataset.match_policy).expand_lookup_ids(&cleaned);
    info!(
        dataset = %dataset.name,
        table = %dataset.table,
        identifiers = cleaned.len(),
        lookup_keys = ids.len(),
        "querying dataset"
    );

    let mut table = match warehouse.fetch_matching(dataset, &ids).await {
        Ok(table) => table,
        Err(err) => {
            error!(
                dataset = %dataset.name,
                table = %dataset.table,
                identifiers = ids.len(),
                error = %err,
                "bulk lookup failed; continuing without this dataset"
            );
            return RemoteTable::empty(dataset.name.clone());
        }
    };

    if let Some(prefix) = dataset.strip_column_prefix.as_deref() {
        table.strip_column_prefix(prefix);
        debug!(dataset = %dataset.name, %prefix, "removed column prefix");
    }

    if table.is_empty() {
        probe_table_access(warehouse, dataset).await;
        return table;
    }

    info!(
        dataset = %dataset.name,
        rows = table.len(),
        columns = table.columns().len(),
        "retrieved dataset rows"
    );
    debug!(dataset = %dataset.name, columns = ?table.columns(), "dataset columns");

    table
}

/// Diagnostic only: tells an empty match apart from an unreachable table.
async fn probe_table_access<W>(warehouse: &mut W, dataset: &DatasetDescriptor)
where
    W: Warehouse + ?Sized,
{
    match warehouse.count_rows(&dataset.table).await {
        Ok(count) => info!(
            dataset = %dataset.name,
            table = %dataset.table,
            rows = count,
            "lookup matched nothing, but the table is accessible"
        ),
        Err(err) => warn!(
            dataset = %dataset.name,
            table = %dataset.table,
            error = %err,
            "lookup matched nothing and the table could not be counted"
        ),
    }
}

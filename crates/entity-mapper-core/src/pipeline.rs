//! End-to-end run: load the input, fetch both datasets, merge and write.

use std::future::Future;
use std::path::PathBuf;

use tracing::info;

use crate::config::{ConnectionSettings, DatasetCatalog};
use crate::error::{MapperError, Result};
use crate::fetch::fetch_dataset;
use crate::input::{load_input, InputTable};
use crate::merge::{merge_datasets, MergeSummary};
use crate::output::write_csv;
use crate::warehouse::{PgWarehouse, Warehouse, WarehouseError};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub datasets: DatasetCatalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub primary_rows_fetched: usize,
    pub secondary_rows_fetched: usize,
    pub merge: MergeSummary,
}

/// Fetches both datasets through `warehouse`, merges them onto `input` and
/// writes the result.
pub async fn run_with_warehouse<W>(
    warehouse: &mut W,
    input: &InputTable,
    options: &RunOptions,
) -> Result<RunSummary>
where
    W: Warehouse + ?Sized,
{
    let catalog = &options.datasets;
    let primary_ids = input.primary_ids();
    let secondary_ids = input.secondary_ids();
    info!(
        primary_ids = primary_ids.len(),
        secondary_ids = secondary_ids.len(),
        "extracted identifiers"
    );

    let primary = fetch_dataset(&mut *warehouse, &catalog.primary, &primary_ids).await;
    let secondary = fetch_dataset(&mut *warehouse, &catalog.secondary, &secondary_ids).await;

    let mut merged = merge_datasets(input, catalog, &primary, &secondary)?;
    write_csv(&mut merged, &options.output_path)?;

    info!(
        primary_filled = merged.summary.primary_matched,
        secondary_filled = merged.summary.secondary_matched,
        secondary_fallback = merged.summary.secondary_fallback_matches,
        "rows filled from each dataset"
    );

    Ok(RunSummary {
        output_path: options.output_path.clone(),
        primary_rows_fetched: primary.len(),
        secondary_rows_fetched: secondary.len(),
        merge: merged.summary,
    })
}

/// Runs the whole mapping against a live warehouse.
pub async fn execute(options: &RunOptions, connection: &ConnectionSettings) -> Result<RunSummary> {
    connection.checked_role()?;
    execute_with(options, || PgWarehouse::connect(connection)).await
}

/// Load, connect, fetch, merge, write. `connect` runs only once the input has
/// loaded; the warehouse it yields is closed whether or not the later stages
/// succeed.
pub async fn execute_with<W, F, Fut>(options: &RunOptions, connect: F) -> Result<RunSummary>
where
    W: Warehouse,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<W, WarehouseError>>,
{
    options.datasets.validate()?;
    let input = load_input(&options.input_path)?;

    let mut warehouse = connect().await.map_err(MapperError::Connection)?;
    let outcome = run_with_warehouse(&mut warehouse, &input, options).await;
    warehouse.close().await;

    outcome
}

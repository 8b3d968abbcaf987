//! Maps pairs of entity identifiers onto a company data feed and a
//! firmographics feed, producing one wide row per input pair.

pub mod config;
pub mod error;
pub mod fetch;
pub mod identifiers;
pub mod input;
pub mod logging;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod warehouse;

pub use config::{ConnectionSettings, DatasetCatalog, DatasetDescriptor, MatchPolicy};
pub use error::{MapperError, Result};
pub use input::{load_input, InputRow, InputTable};
pub use merge::{merge_datasets, MergeSummary, MergedTable};
pub use pipeline::{execute, execute_with, run_with_warehouse, RunOptions, RunSummary};
pub use warehouse::{PgWarehouse, RemoteRecord, RemoteTable, Warehouse, WarehouseError};

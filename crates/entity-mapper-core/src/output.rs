//! Writes the merged frame as a headed CSV file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::{MapperError, Result};
use crate::merge::MergedTable;

/// Writes the merged table as comma-separated text with a header row.
pub fn write_csv(merged: &mut MergedTable, path: &Path) -> Result<()> {
    let write_error = |source: Box<dyn std::error::Error + Send + Sync>| MapperError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|err| write_error(err.into()))?;
    let mut writer = BufWriter::new(file);

    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(&mut merged.frame)
        .map_err(|err| write_error(err.into()))?;
    writer.flush().map_err(|err| write_error(err.into()))?;

    info!(
        path = %path.display(),
        rows = merged.frame.height(),
        columns = merged.frame.width(),
        "wrote output file"
    );
    Ok(())
}

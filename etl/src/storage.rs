use common::Result;
use datafusion::dataframe::{DataFrame, DataFrameWriteOptions};
use futures::TryStreamExt;
use tracing::{debug, info};
use url::Url;

use crate::context::ExecutionContext;
use crate::paths::OutputPaths;

/// Writes analytic tables with full-overwrite semantics. The engine's
/// `write_parquet` only ever adds files to a location, so every object under
/// the table prefix is deleted first. A failed run can therefore leave a
/// table empty; the surrounding scheduler re-runs the whole pipeline.
pub struct TableWriter<'a> {
    ctx: &'a ExecutionContext,
    paths: OutputPaths,
}

impl<'a> TableWriter<'a> {
    pub fn new(ctx: &'a ExecutionContext, output_root: Url) -> Self {
        Self {
            ctx,
            paths: OutputPaths::new(output_root),
        }
    }

    /// Replaces an unpartitioned table with a single parquet file.
    pub async fn write(&self, df: DataFrame, table: &str) -> Result<()> {
        let target = self.paths.table_file(table)?;
        self.replace(df, table, &target, &[]).await
    }

    /// Replaces a table written as hive partitions under its directory.
    pub async fn write_partitioned(
        &self,
        df: DataFrame,
        table: &str,
        partition_by: &[&str],
    ) -> Result<()> {
        let target = self.paths.table_dir(table)?;
        self.replace(df, table, &target, partition_by).await
    }

    async fn replace(
        &self,
        df: DataFrame,
        table: &str,
        target: &Url,
        partition_by: &[&str],
    ) -> Result<()> {
        self.purge(table).await?;

        let mut options = DataFrameWriteOptions::new();
        if !partition_by.is_empty() {
            options =
                options.with_partition_by(partition_by.iter().map(|c| c.to_string()).collect());
        }

        info!(table, target = %target, "writing table");
        df.write_parquet(target.as_str(), options, None).await?;
        Ok(())
    }

    async fn purge(&self, table: &str) -> Result<()> {
        let prefix_url = self.paths.table_prefix(table)?;
        let (store, prefix) = self.ctx.store_for(&prefix_url)?;

        let stale = match store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect::<Vec<_>>()
            .await
        {
            Ok(locations) => locations,
            // Nothing written there yet.
            Err(object_store::Error::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        for location in stale {
            debug!(object = %location, "removing stale output object");
            store.delete(&location).await?;
        }

        Ok(())
    }
}

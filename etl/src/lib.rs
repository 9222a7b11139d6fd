pub mod context;
pub mod ingest;
pub mod logs;
pub mod paths;
pub mod schema;
pub mod songs;
pub mod storage;

use common::Result;
use common::config::Settings;
use tracing::info;

use context::ExecutionContext;
use storage::TableWriter;

/// Runs the full pipeline: the song dimensions first, then the log-derived
/// tables and the fact join. Each write completes (or fails) before the next
/// step begins; there are no retries, the scheduler re-runs the whole thing.
pub async fn run_etl_pipeline(config_path: &str) -> Result<()> {
    let settings = Settings::new(config_path)?;

    let ctx = ExecutionContext::new(&settings);
    let output_root = ctx.resolve(&settings.data.output_data)?;
    let writer = TableWriter::new(&ctx, output_root);

    songs::process_song_data(&ctx, &settings.data.input_song_data, &writer).await?;
    logs::process_log_data(
        &ctx,
        &settings.data.input_log_data,
        &settings.data.input_song_data,
        &writer,
    )
    .await?;

    info!("ETL pipeline complete");
    Ok(())
}

use arrow::datatypes::{DataType, TimeUnit};
use common::Result;
use datafusion::functions::expr_fn::date_part;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::JoinType;
use datafusion::prelude::*;
use tracing::info;

use crate::context::ExecutionContext;
use crate::ingest::NdjsonSource;
use crate::schema::{log_schema, song_schema};
use crate::storage::TableWriter;

/// Calendar component of the derived `timestamp` column. Components are
/// computed in UTC; `dow` follows the engine convention of 0 = Sunday.
fn calendar_component(part: &str, name: &str) -> Expr {
    cast(date_part(lit(part), col("timestamp")), DataType::Int32).alias(name)
}

/// Log pipeline: "NextSong" events become the `users` and `time` dimension
/// tables and, joined against the song metadata, the `songplays` fact table.
pub async fn process_log_data(
    ctx: &ExecutionContext,
    log_data: &str,
    song_data: &str,
    writer: &TableWriter<'_>,
) -> Result<()> {
    info!(source = log_data, "reading log data");
    let df = NdjsonSource::new(ctx, log_schema()).load(log_data).await?;

    let plays = df.filter(col("page").eq(lit("NextSong")))?;

    // One row per userId; only NextSong events contribute.
    let users = plays.clone().distinct_on(
        vec![ident("userId")],
        vec![
            ident("userId"),
            ident("firstName"),
            ident("lastName"),
            col("gender"),
            col("level"),
        ],
        None,
    )?;
    info!(rows = users.clone().count().await?, "user entries processed");
    writer.write(users, "users").await?;

    // ts holds epoch milliseconds; the cast reinterprets it as an instant.
    let plays = plays.with_column(
        "timestamp",
        cast(col("ts"), DataType::Timestamp(TimeUnit::Millisecond, None)),
    )?;

    // One row per calendar date; the components come from whichever event
    // on that date survives the dedup.
    let time = plays
        .clone()
        .with_column("start_time", cast(col("timestamp"), DataType::Date32))?
        .distinct_on(
            vec![col("start_time")],
            vec![
                col("start_time"),
                calendar_component("hour", "hour"),
                calendar_component("day", "day"),
                calendar_component("week", "week"),
                calendar_component("month", "month"),
                calendar_component("year", "year"),
                calendar_component("dow", "weekday"),
            ],
            None,
        )?;
    info!(rows = time.clone().count().await?, "time entries processed");
    writer.write_partitioned(time, "time", &["year", "month"]).await?;

    // The song side is projected down to the join key and the two foreign
    // keys the fact table needs, which also keeps the source's `year` and
    // `location` columns from colliding with the log-derived ones.
    info!(source = song_data, "re-reading song data for the fact join");
    let song_df = NdjsonSource::new(ctx, song_schema())
        .load(song_data)
        .await?
        .select(vec![col("title"), col("song_id"), col("artist_id")])?;

    // Left join on exact title equality: every play is retained, and plays
    // with no matching metadata surface with null song_id/artist_id. That
    // null-on-mismatch behavior is intended, not a defect.
    let joined = plays.join(song_df, JoinType::Left, &["song"], &["title"], None)?;

    let songplays = joined
        .window(vec![row_number().alias("songplay_id")])?
        .select(vec![
            col("songplay_id"),
            col("timestamp"),
            calendar_component("year", "year"),
            calendar_component("month", "month"),
            ident("userId"),
            col("level"),
            col("song_id"),
            col("artist_id"),
            ident("sessionId"),
            col("location"),
            ident("userAgent"),
        ])?;
    info!(rows = songplays.clone().count().await?, "songplay entries processed");
    writer
        .write_partitioned(songplays, "songplays", &["year", "month"])
        .await?;

    Ok(())
}

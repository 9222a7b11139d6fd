use common::Result;
use datafusion::prelude::*;
use tracing::info;

use crate::context::ExecutionContext;
use crate::ingest::NdjsonSource;
use crate::schema::song_schema;
use crate::storage::TableWriter;

/// Song pipeline: the song-metadata records become the `songs` and `artists`
/// dimension tables.
pub async fn process_song_data(
    ctx: &ExecutionContext,
    song_data: &str,
    writer: &TableWriter<'_>,
) -> Result<()> {
    info!(source = song_data, "reading song data");
    let df = NdjsonSource::new(ctx, song_schema()).load(song_data).await?;

    // Exact-duplicate rows are dropped across all five song columns.
    let songs = df
        .clone()
        .select(vec![
            col("song_id"),
            col("title"),
            col("artist_id"),
            col("year"),
            col("duration"),
        ])?
        .distinct()?;
    info!(rows = songs.clone().count().await?, "song entries processed");
    writer.write(songs, "songs").await?;

    // One row per artist_id; which source row survives is engine-dependent,
    // matching the source system.
    let artists = df.distinct_on(
        vec![col("artist_id")],
        vec![
            col("artist_id"),
            col("artist_name"),
            col("artist_location"),
            col("artist_latitude"),
            col("artist_longitude"),
        ],
        None,
    )?;
    info!(rows = artists.clone().count().await?, "artist entries processed");
    writer.write(artists, "artists").await?;

    Ok(())
}

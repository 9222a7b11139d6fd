use arrow::datatypes::SchemaRef;
use arrow::json::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use datafusion::prelude::DataFrame;
use futures::TryStreamExt;
use object_store::ObjectMeta;
use serde_json::Value;
use std::io::Cursor;
use tracing::{debug, warn};

use crate::context::ExecutionContext;

/// Splits a trailing glob off a configured input location. Everything from
/// the first `*` on is dropped; listing under the remaining prefix with the
/// `.json` extension filter covers the layouts such globs describe.
fn glob_prefix(location: &str) -> &str {
    match location.find('*') {
        Some(idx) => &location[..idx],
        None => location,
    }
}

/// Loads newline-delimited JSON records against a fixed schema.
///
/// Malformed lines are skipped and counted rather than failing the run; the
/// per-run count is logged at warn. Records missing a schema field decode
/// with nulls in that column. Zero valid records yields an empty frame that
/// still carries the schema.
pub struct NdjsonSource<'a> {
    ctx: &'a ExecutionContext,
    schema: SchemaRef,
}

impl<'a> NdjsonSource<'a> {
    pub fn new(ctx: &'a ExecutionContext, schema: SchemaRef) -> Self {
        Self { ctx, schema }
    }

    pub async fn load(&self, location: &str) -> Result<DataFrame> {
        let url = self.ctx.resolve(glob_prefix(location))?;
        let (store, prefix) = self.ctx.store_for(&url)?;

        // A location naming a single object is fetched directly; anything
        // else is listed as a prefix.
        let objects: Vec<ObjectMeta> = if prefix.extension() == Some("json") {
            vec![store.head(&prefix).await?]
        } else {
            let mut objects: Vec<ObjectMeta> = store.list(Some(&prefix)).try_collect().await?;
            objects.retain(|meta| meta.location.extension() == Some("json"));
            objects
        };

        let mut valid_lines: Vec<String> = Vec::new();
        let mut skipped = 0usize;

        for meta in &objects {
            debug!(object = %meta.location, size = meta.size, "fetching input object");
            let bytes = store.get(&meta.location).await?.bytes().await?;
            let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                Error::InvalidInput(format!("non-UTF8 input object {}: {}", meta.location, e))
            })?;

            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(_) => valid_lines.push(line.to_string()),
                    Err(e) => {
                        skipped += 1;
                        debug!(error = %e, object = %meta.location, "skipping malformed JSON line");
                    }
                }
            }
        }

        if skipped > 0 {
            warn!(skipped, location, "skipped malformed JSON lines during ingest");
        }
        debug!(records = valid_lines.len(), objects = objects.len(), location, "decoded input");

        let batch = self.decode_lines(&valid_lines)?;
        Ok(self.ctx.session().read_batch(batch)?)
    }

    fn decode_lines(&self, lines: &[String]) -> Result<RecordBatch> {
        if lines.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }

        let data = lines.join("\n");
        let reader = ReaderBuilder::new(self.schema.clone()).build(Cursor::new(data.into_bytes()))?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

        if batches.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }
        Ok(arrow::compute::concat_batches(&self.schema, &batches)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::song_schema;
    use arrow::array::Array;
    use common::config::{AwsSettings, DataSettings, Settings};
    use std::io::Write;

    fn test_context() -> ExecutionContext {
        ExecutionContext::new(&Settings {
            aws: AwsSettings {
                aws_access_key_id: "test".into(),
                aws_secret_access_key: "test".into(),
                s3_endpoint: None,
                s3_region: "us-east-1".into(),
            },
            data: DataSettings {
                input_song_data: String::new(),
                input_log_data: String::new(),
                output_data: String::new(),
            },
        })
    }

    #[test]
    fn glob_prefix_strips_from_first_star() {
        assert_eq!(
            glob_prefix("s3a://bucket/song_data/*/*/*/*.json"),
            "s3a://bucket/song_data/"
        );
        assert_eq!(glob_prefix("/data/log_data/"), "/data/log_data/");
    }

    #[tokio::test]
    async fn skips_and_counts_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("songs.json")).unwrap();
        writeln!(file, r#"{{"song_id":"SOAAA","title":"One","artist_id":"AR1","year":2001,"duration":100.5}}"#).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, r#"{{"song_id":"SOBBB","title":"Two","artist_id":"AR2","year":2002,"duration":200.5}}"#).unwrap();

        let ctx = test_context();
        let source = NdjsonSource::new(&ctx, song_schema());
        let df = source.load(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(df.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn absent_fields_decode_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("songs.json")).unwrap();
        writeln!(file, r#"{{"song_id":"SOAAA","title":"One","artist_id":"AR1"}}"#).unwrap();

        let ctx = test_context();
        let source = NdjsonSource::new(&ctx, song_schema());
        let df = source.load(dir.path().to_str().unwrap()).await.unwrap();
        let batches = df.collect().await.unwrap();

        let duration = batches[0]
            .column_by_name("duration")
            .unwrap();
        assert!(duration.is_null(0));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_frame_with_schema() {
        let dir = tempfile::tempdir().unwrap();

        let ctx = test_context();
        let source = NdjsonSource::new(&ctx, song_schema());
        let df = source.load(dir.path().to_str().unwrap()).await.unwrap();

        assert!(df.schema().has_column_with_unqualified_name("song_id"));
        assert_eq!(df.count().await.unwrap(), 0);
    }
}

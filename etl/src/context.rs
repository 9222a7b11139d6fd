use common::config::Settings;
use common::{Error, Result};
use dashmap::DashMap;
use datafusion::execution::context::SessionContext;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use std::sync::Arc;
use url::Url;

#[derive(Clone)]
struct S3Credentials {
    access_key: String,
    secret_key: String,
    region: String,
    endpoint: Option<String>,
}

/// One engine session for the process lifetime, read-only after construction.
/// Object stores are built on first use, cached per bucket, and registered
/// with the DataFusion runtime so the engine can read and write the same
/// locations the pipeline lists and purges. Credentials are passed in
/// explicitly rather than injected into the process environment.
pub struct ExecutionContext {
    ctx: SessionContext,
    credentials: S3Credentials,
    store_cache: DashMap<String, Arc<dyn ObjectStore>>,
}

impl ExecutionContext {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ctx: SessionContext::new(),
            credentials: S3Credentials {
                access_key: settings.aws.aws_access_key_id.clone(),
                secret_key: settings.aws.aws_secret_access_key.clone(),
                region: settings.aws.s3_region.clone(),
                endpoint: settings.aws.s3_endpoint.clone(),
            },
            store_cache: DashMap::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Resolves a configured location into a URL the engine understands.
    /// Hadoop-style `s3a`/`s3n` schemes map to `s3`; bare paths are treated
    /// as local filesystem directories.
    pub fn resolve(&self, location: &str) -> Result<Url> {
        if let Ok(mut url) = Url::parse(location) {
            match url.scheme() {
                "s3" | "file" => return Ok(url),
                "s3a" | "s3n" => {
                    url.set_scheme("s3")
                        .map_err(|_| Error::InvalidUri(location.to_string()))?;
                    return Ok(url);
                }
                _ => {}
            }
        }

        let path = std::path::Path::new(location);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Url::from_directory_path(&absolute).map_err(|_| Error::InvalidUri(location.to_string()))
    }

    /// Returns the object store serving `url` together with the object path
    /// inside it, registering S3 stores with the engine runtime on first use.
    pub fn store_for(&self, url: &Url) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
        let path = ObjectPath::from_url_path(url.path())
            .map_err(|e| Error::InvalidUri(format!("{}: {}", url, e)))?;

        let store = match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .ok_or_else(|| Error::InvalidUri(format!("missing bucket in {}", url)))?;
                self.s3_store(bucket)?
            }
            "file" => self.local_store(),
            other => {
                return Err(Error::InvalidUri(format!(
                    "unsupported scheme '{}' in {}",
                    other, url
                )));
            }
        };

        Ok((store, path))
    }

    fn local_store(&self) -> Arc<dyn ObjectStore> {
        if let Some(store) = self.store_cache.get("file") {
            return store.clone();
        }

        // The engine's default registry already serves file:// URLs; this
        // instance only backs the pipeline's own list/get/delete calls.
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
        self.store_cache.insert("file".to_string(), store.clone());
        store
    }

    fn s3_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.store_cache.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.credentials.region)
            .with_access_key_id(&self.credentials.access_key)
            .with_secret_access_key(&self.credentials.secret_key);

        if let Some(endpoint) = &self.credentials.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);

        let url = Url::parse(&format!("s3://{}", bucket))?;
        self.ctx.runtime_env().register_object_store(&url, store.clone());

        self.store_cache.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

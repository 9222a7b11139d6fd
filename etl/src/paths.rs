use common::Result;
use url::Url;

/// Builds the output location of each analytic table under the output root,
/// following the `<root>/<table>/<table>.parquet` layout.
pub struct OutputPaths {
    root: Url,
}

impl OutputPaths {
    pub fn new(root: Url) -> Self {
        Self { root }
    }

    /// Single-file location for an unpartitioned table.
    pub fn table_file(&self, table: &str) -> Result<Url> {
        self.join(&format!("{}/{}.parquet", table, table))
    }

    /// Directory location for a hive-partitioned table. The trailing slash
    /// makes the engine treat it as a directory sink.
    pub fn table_dir(&self, table: &str) -> Result<Url> {
        self.join(&format!("{}/{}.parquet/", table, table))
    }

    /// Prefix shared by every object of a table, used for the pre-write purge.
    pub fn table_prefix(&self, table: &str) -> Result<Url> {
        self.join(&format!("{}/", table))
    }

    fn join(&self, suffix: &str) -> Result<Url> {
        let mut base = self.root.as_str().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&format!("{}{}", base, suffix)).map_err(Into::into)
    }
}

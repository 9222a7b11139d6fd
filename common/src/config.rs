use config::{Config, ConfigError, FileFormat};
use serde::Deserialize;
use tracing::debug;

// The INI parser preserves key case, so the file's `[AWS]`/`[DATA]` sections
// arrive uppercase while `APP`-prefixed environment overrides arrive
// lowercase. Aliases (not renames) accept both spellings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(alias = "AWS")]
    pub aws: AwsSettings,
    #[serde(alias = "DATA")]
    pub data: DataSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsSettings {
    #[serde(alias = "AWS_ACCESS_KEY_ID")]
    pub aws_access_key_id: String,
    #[serde(alias = "AWS_SECRET_ACCESS_KEY")]
    pub aws_secret_access_key: String,
    /// Custom S3 endpoint, for MinIO-style deployments. Absent means AWS.
    #[serde(default, alias = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,
    #[serde(default = "default_s3_region", alias = "S3_REGION")]
    pub s3_region: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSettings {
    #[serde(alias = "INPUT_SONG_DATA")]
    pub input_song_data: String,
    #[serde(alias = "INPUT_LOG_DATA")]
    pub input_log_data: String,
    #[serde(alias = "OUTPUT_DATA")]
    pub output_data: String,
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

impl Settings {
    /// Loads the ini-style config file (`[AWS]` credentials, `[DATA]` paths).
    /// `APP`-prefixed environment variables override file values.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::new(path, FileFormat::Ini))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Build the configuration
        let config = builder.build()?;

        // Try to deserialize the entire configuration
        let settings: Settings = config.try_deserialize()?;

        debug!(
            song_data = %settings.data.input_song_data,
            log_data = %settings.data.input_log_data,
            output = %settings.data.output_data,
            "Parsed data locations"
        );

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_cfg(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_ini_sections() {
        let file = write_cfg(
            "[AWS]\n\
             AWS_ACCESS_KEY_ID = AKIAEXAMPLE\n\
             AWS_SECRET_ACCESS_KEY = secret\n\
             [DATA]\n\
             INPUT_SONG_DATA = s3a://bucket/song_data/\n\
             INPUT_LOG_DATA = s3a://bucket/log_data/\n\
             OUTPUT_DATA = s3a://bucket/analytics/\n",
        );

        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.aws.aws_access_key_id, "AKIAEXAMPLE");
        assert_eq!(settings.aws.aws_secret_access_key, "secret");
        assert_eq!(settings.aws.s3_region, "us-east-1");
        assert!(settings.aws.s3_endpoint.is_none());
        assert_eq!(settings.data.input_song_data, "s3a://bucket/song_data/");
        assert_eq!(settings.data.output_data, "s3a://bucket/analytics/");
    }

    #[test]
    fn lowercase_keys_also_deserialize() {
        // The spelling environment overrides arrive in.
        let file = write_cfg(
            "[aws]\n\
             aws_access_key_id = AKIAEXAMPLE\n\
             aws_secret_access_key = secret\n\
             [data]\n\
             input_song_data = s3a://bucket/song_data/\n\
             input_log_data = s3a://bucket/log_data/\n\
             output_data = s3a://bucket/analytics/\n",
        );

        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.aws.aws_access_key_id, "AKIAEXAMPLE");
        assert_eq!(settings.data.input_log_data, "s3a://bucket/log_data/");
    }

    #[test]
    fn missing_key_is_fatal() {
        let file = write_cfg(
            "[AWS]\n\
             AWS_ACCESS_KEY_ID = AKIAEXAMPLE\n\
             AWS_SECRET_ACCESS_KEY = secret\n\
             [DATA]\n\
             INPUT_SONG_DATA = s3a://bucket/song_data/\n",
        );

        assert!(Settings::new(file.path().to_str().unwrap()).is_err());
    }
}

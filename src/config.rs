use crate::{
    driver::RunOptions,
    error::ConfigError,
    ids::DataSourceId,
    service::RetryPolicy,
    store::CandidateScope,
};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path, time::Duration};

/// The configuration of a remap run, read from a TOML file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    /// Selects the audience service profile to push to.
    pub environment: String,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub audience_service: BTreeMap<String, AudienceServiceSettings>,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub operational: DatabaseSettings,
    pub warehouse: WarehouseSettings,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub batch_size: usize,
    pub progress_every: usize,
    pub batch_pause_ms: u64,
    pub scope: CandidateScope,
}

impl Default for RunSettings {
    fn default() -> Self {
        let options = RunOptions::default();
        Self {
            batch_size: options.batch_size,
            progress_every: options.progress_every,
            batch_pause_ms: 0,
            scope: options.scope,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AudienceServiceSettings {
    pub url: String,
    #[serde(default = "default_path")]
    pub path: String,
    pub user_id: String,
    /// Sent as the `Host` header when the service sits behind a shared gateway.
    pub host: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_path() -> String {
    "/audience/{audience_id}".to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

impl AudienceServiceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DatabaseSettings {
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WarehouseSettings {
    pub path: String,
    /// The category table of each data source, keyed by data source id.
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
}

impl WarehouseSettings {
    /// The configured tables, or the well-known ones when none are configured.
    pub fn tables(&self) -> Result<BTreeMap<DataSourceId, String>, ConfigError> {
        if self.tables.is_empty() {
            return Ok(default_tables());
        }

        self.tables
            .iter()
            .map(|(key, table)| {
                let data_source_id = key
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidDataSource(key.clone()))?;
                Ok((DataSourceId(data_source_id), table.clone()))
            })
            .collect()
    }
}

/// The warehouse category tables of the known data sources.
pub fn default_tables() -> BTreeMap<DataSourceId, String> {
    [
        (1, "oracle_categories"),
        (11, "liveramp_categories"),
        (17, "sharethis_categories"),
        (18, "dstillery_categories"),
        (20, "onaudience_categories"),
        (22, "experian_categories"),
    ]
    .into_iter()
    .map(|(id, table)| (DataSourceId(id), table.to_owned()))
    .collect()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The audience service profile of the configured environment.
    pub fn audience_service(&self) -> Result<&AudienceServiceSettings, ConfigError> {
        self.audience_service
            .get(&self.environment)
            .ok_or_else(|| ConfigError::UnknownEnvironment(self.environment.clone()))
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            batch_size: self.run.batch_size,
            progress_every: self.run.progress_every,
            batch_pause: Duration::from_millis(self.run.batch_pause_ms),
            scope: self.run.scope,
            dry_run: false,
        }
    }
}

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::DEFAULT_ATTEMPTS;

/// World Bank CCKP: annual mean temperature 1901-2024 (CRU TS4.09), all countries.
const WORLD_BANK_CLIMATE_URL: &str = concat!(
  "https://cckpapi.worldbank.org/api/v1/",
  "cru-x0.5_timeseries_tas_timeseries_annual_1901-2024_mean_historical_cru_ts4.09_mean/",
  "global_countries?_format=json",
);

/// OECD maritime transport CO2 emissions, world totals.
const OECD_MARITIME_WORLD_URL: &str = concat!(
  "https://sdmx.oecd.org/public/rest/data/",
  "OECD.SDD.NAD.SEEA,DSD_MARITIME_TRANSPORT@DF_MARITIME_TRANSPORT,2.0/",
  "W.M.....EMISSIONS_POD..",
  "BULK_CARRIER+CHEM_TANKER+CONTAINER+GEN_CARGO+LIQ_GAS_TANKER+OIL_TANKER+OTHER_LIQ_TANKER+",
  "FERRY_PAX+CRUISE+FERRY_ROPAX+REFRIG_BULK+RO_RO+VEHICLE+YACHT+",
  "SERVICE_TUG+OFFSHORE+SERVICE_OTHER+MISC_FISH+MISC_OTHER.",
  "TER_DOM+TER_INT?dimensionAtObservation=AllDimensions",
);

/// OECD maritime transport CO2 emissions, per OECD country.
const OECD_MARITIME_COUNTRIES_URL: &str = concat!(
  "https://sdmx.oecd.org/public/rest/data/",
  "OECD.SDD.NAD.SEEA,DSD_MARITIME_TRANSPORT@DF_MARITIME_TRANSPORT,/",
  ".M.....EMISSIONS_POD..",
  "BULK_CARRIER+CHEM_TANKER+CONTAINER+GEN_CARGO+LIQ_GAS_TANKER+OIL_TANKER+OTHER_LIQ_TANKER+",
  "FERRY_PAX+CRUISE+FERRY_ROPAX+REFRIG_BULK+RO_RO+VEHICLE+YACHT+",
  "SERVICE_TUG+OFFSHORE+SERVICE_OTHER+MISC_FISH+MISC_OTHER.",
  "TER_DOM+TER_INT?dimensionAtObservation=AllDimensions",
);

/// Accept header the OECD SDMX endpoints need to answer with SDMX-JSON.
pub const SDMX_JSON_ACCEPT: &str = "application/vnd.sdmx.data+json;version=1.0.0-wd";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Directory holding one cache file per dataset
  /// (defaults to $XDG_DATA_HOME/climate-sync)
  pub cache_dir: Option<PathBuf>,
  /// Also write logs to this file
  pub log_file: Option<PathBuf>,
  #[serde(default)]
  pub http: HttpConfig,
  #[serde(default = "default_datasets")]
  pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Fetch attempts per dataset before falling back to cached data
  #[serde(default = "default_retries")]
  pub retries: u32,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      retries: default_retries(),
      user_agent: default_user_agent(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  120
}

fn default_retries() -> u32 {
  DEFAULT_ATTEMPTS
}

fn default_user_agent() -> String {
  format!("climate-sync/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
  /// Detect from Content-Type, then URL suffix, then body
  #[default]
  Auto,
  Json,
  Csv,
  /// SDMX-JSON, flattened into rows
  Sdmx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
  pub name: String,
  pub url: String,
  pub description: Option<String>,
  #[serde(default)]
  pub format: DataFormat,
  /// Cache file (defaults to <cache_dir>/<name>.json)
  pub path: Option<PathBuf>,
  /// Accept header override
  pub accept: Option<String>,
  /// Per-dataset timeout override
  pub timeout_secs: Option<u64>,
  /// Value of the "Group" column added to every tabular row
  pub group: Option<String>,
}

impl DatasetConfig {
  fn builtin(name: &str, url: &str, description: &str, format: DataFormat) -> Self {
    Self {
      name: name.to_string(),
      url: url.to_string(),
      description: Some(description.to_string()),
      format,
      path: None,
      accept: None,
      timeout_secs: None,
      group: None,
    }
  }

  /// Accept header to send: explicit override, else one matching the format.
  pub fn accept_header(&self) -> Option<&str> {
    match (&self.accept, self.format) {
      (Some(accept), _) => Some(accept.as_str()),
      (None, DataFormat::Sdmx) => Some(SDMX_JSON_ACCEPT),
      (None, DataFormat::Json) => Some("application/json"),
      (None, DataFormat::Csv) => Some("text/csv"),
      (None, DataFormat::Auto) => None,
    }
  }
}

fn default_datasets() -> Vec<DatasetConfig> {
  let mut world = DatasetConfig::builtin(
    "maritime-world",
    OECD_MARITIME_WORLD_URL,
    "OECD maritime transport CO2 emissions, world total",
    DataFormat::Sdmx,
  );
  world.timeout_secs = Some(180);
  world.group = Some("World Total".to_string());

  let mut countries = DatasetConfig::builtin(
    "maritime-oecd",
    OECD_MARITIME_COUNTRIES_URL,
    "OECD maritime transport CO2 emissions, OECD countries",
    DataFormat::Sdmx,
  );
  countries.timeout_secs = Some(180);
  countries.group = Some("OECD Country".to_string());

  vec![
    DatasetConfig::builtin(
      "climate",
      WORLD_BANK_CLIMATE_URL,
      "World Bank CCKP annual mean temperature, 1901-2024",
      DataFormat::Json,
    ),
    world,
    countries,
  ]
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_dir: None,
      log_file: None,
      http: HttpConfig::default(),
      datasets: default_datasets(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./climate-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/climate-sync/config.yaml
  ///
  /// Falls back to the built-in datasets when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("climate-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("climate-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Reject empty or duplicate dataset names and non-HTTP URLs.
  fn validate(&self) -> Result<()> {
    if self.datasets.is_empty() {
      return Err(eyre!("No datasets configured"));
    }

    let mut seen = BTreeSet::new();
    for dataset in &self.datasets {
      if dataset.name.trim().is_empty() {
        return Err(eyre!("Dataset with url {} has an empty name", dataset.url));
      }
      if !seen.insert(dataset.name.as_str()) {
        return Err(eyre!("Duplicate dataset name '{}'", dataset.name));
      }

      let url = Url::parse(&dataset.url)
        .map_err(|e| eyre!("Dataset '{}' has an invalid url: {}", dataset.name, e))?;
      if !matches!(url.scheme(), "http" | "https") {
        return Err(eyre!(
          "Dataset '{}' url must be http or https, got {}",
          dataset.name,
          url.scheme()
        ));
      }
    }

    Ok(())
  }

  /// Directory for cache files.
  pub fn cache_dir(&self) -> PathBuf {
    if let Some(dir) = &self.cache_dir {
      return dir.clone();
    }

    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("climate-sync"))
      .unwrap_or_else(|| PathBuf::from("data"))
  }

  /// Cache file for a dataset.
  pub fn cache_path(&self, dataset: &DatasetConfig) -> PathBuf {
    match &dataset.path {
      Some(path) => path.clone(),
      None => self.cache_dir().join(format!("{}.json", dataset.name)),
    }
  }

  /// Request timeout for a dataset.
  pub fn timeout(&self, dataset: &DatasetConfig) -> Duration {
    Duration::from_secs(dataset.timeout_secs.unwrap_or(self.http.timeout_secs))
  }

  /// Datasets to process: the named one, or all of them in config order.
  pub fn select(&self, name: Option<&str>) -> Result<Vec<&DatasetConfig>> {
    match name {
      Some(name) => self
        .datasets
        .iter()
        .find(|d| d.name == name)
        .map(|d| vec![d])
        .ok_or_else(|| {
          let known: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();
          eyre!("Unknown dataset '{}' (known: {})", name, known.join(", "))
        }),
      None => Ok(self.datasets.iter().collect()),
    }
  }
}

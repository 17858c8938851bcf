use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::provider::{EndpointMap, ProviderDescriptor, ProviderRegistry};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub providers: ProvidersConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub transport: TransportConfig,
  #[serde(default)]
  pub registry: RegistryConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
  pub primary: ProviderConfig,
  #[serde(default)]
  pub fallbacks: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
  pub name: String,
  pub base_url: String,
  #[serde(default)]
  pub endpoints: EndpointsConfig,
  /// Static headers sent with every request
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  /// Header name -> environment variable holding its value (API keys)
  #[serde(default)]
  pub headers_from_env: BTreeMap<String, String>,
  /// Fallbacks with `active: false` wait on standby until the primary fails
  #[serde(default = "default_true")]
  pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
  pub list: String,
  pub detail: String,
  pub search: String,
}

impl Default for EndpointsConfig {
  fn default() -> Self {
    let defaults = EndpointMap::default();
    Self {
      list: defaults.list,
      detail: defaults.detail,
      search: defaults.search,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
  pub backoff_factor: f64,
  pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay_ms: 1000,
      max_delay_ms: 10_000,
      backoff_factor: 2.0,
      max_jitter_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Persist the cache to disk between runs
  pub persist: bool,
  /// SQLite file (defaults to the platform data directory)
  pub path: Option<PathBuf>,
  pub list_ttl_secs: u64,
  pub detail_ttl_secs: u64,
  pub search_ttl_secs: u64,
  /// Unbounded when unset
  pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persist: true,
      path: None,
      list_ttl_secs: 300,
      detail_ttl_secs: 600,
      search_ttl_secs: 120,
      max_entries: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
  pub timeout_ms: u64,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self { timeout_ms: 10_000 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  pub cooldown_secs: u64,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self { cooldown_secs: 300 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive, overridden by RUST_LOG
  pub level: String,
  /// Write logs to this file (rotated daily) instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./listing-feed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/listing-feed/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/listing-feed/config.yaml\n\
                 At minimum it needs providers.primary.name and providers.primary.base_url."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("listing-feed.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("listing-feed").join("config.yaml");
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
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    let mut names = HashSet::new();
    for provider in self.all_providers() {
      if provider.name.trim().is_empty() {
        return Err(eyre!("Provider names cannot be empty"));
      }
      if !names.insert(provider.name.as_str()) {
        return Err(eyre!("Duplicate provider name: {}", provider.name));
      }
      Url::parse(&provider.base_url)
        .map_err(|e| eyre!("Provider {} has an invalid base_url: {}", provider.name, e))?;
    }

    if self.retry.base_delay_ms == 0 {
      return Err(eyre!("retry.base_delay_ms must be greater than zero"));
    }
    if self.retry.backoff_factor.is_nan() || self.retry.backoff_factor < 1.0 {
      return Err(eyre!("retry.backoff_factor must be at least 1"));
    }
    let cache = &self.cache;
    if cache.list_ttl_secs == 0 || cache.detail_ttl_secs == 0 || cache.search_ttl_secs == 0 {
      return Err(eyre!("cache TTLs must be greater than zero"));
    }
    if self.transport.timeout_ms == 0 {
      return Err(eyre!("transport.timeout_ms must be greater than zero"));
    }

    Ok(())
  }

  fn all_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
    std::iter::once(&self.providers.primary).chain(self.providers.fallbacks.iter())
  }

  /// Build the provider registry, resolving `headers_from_env` now.
  pub fn build_registry(&self) -> Result<ProviderRegistry> {
    let primary = self.providers.primary.to_descriptor()?;
    let registry = self
      .providers
      .fallbacks
      .iter()
      .try_fold(ProviderRegistry::new(primary), |registry, fallback| {
        Ok::<_, color_eyre::Report>(registry.with_fallback(fallback.to_descriptor()?, fallback.active))
      })?;

    Ok(registry.with_cooldown(Duration::from_secs(self.registry.cooldown_secs)))
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.retry.max_retries,
      base_delay: Duration::from_millis(self.retry.base_delay_ms),
      max_delay: Duration::from_millis(self.retry.max_delay_ms),
      backoff_factor: self.retry.backoff_factor,
      max_jitter: Duration::from_millis(self.retry.max_jitter_ms),
    }
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_millis(self.transport.timeout_ms)
  }
}

impl ProviderConfig {
  pub fn to_descriptor(&self) -> Result<ProviderDescriptor> {
    let base_url = Url::parse(&self.base_url)
      .map_err(|e| eyre!("Provider {} has an invalid base_url: {}", self.name, e))?;

    let mut descriptor = ProviderDescriptor::new(self.name.clone(), base_url);
    descriptor.endpoints = EndpointMap {
      list: self.endpoints.list.clone(),
      detail: self.endpoints.detail.clone(),
      search: self.endpoints.search.clone(),
    };
    for (name, value) in &self.headers {
      descriptor = descriptor.with_header(name, value);
    }
    for (name, var) in &self.headers_from_env {
      let value = std::env::var(var).map_err(|_| {
        eyre!(
          "Provider {} needs environment variable {} for header {}",
          self.name,
          var,
          name
        )
      })?;
      descriptor = descriptor.with_header(name, value);
    }

    Ok(descriptor)
  }
}

//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::visibility::RootMargin;

mod cli;

pub use cli::{BrowseArgs, BrowseOverrides, CliArgs, Command, GlobalOverrides, LikeArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "atelier";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_DESIGNS_TTL_MS: u64 = 2 * 60 * 1000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60 * 1000;
const DEFAULT_VIEW_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_LIKE_DEBOUNCE_MS: u64 = 300;
const DEFAULT_CARD_THRESHOLD: f64 = 0.5;
const DEFAULT_VIEWPORT_WIDTH: f64 = 1280.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 800.0;
const DEFAULT_COLUMNS: usize = 3;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_THROTTLE_SECS: u64 = 5;
const DEFAULT_SUMMARY_INTERVAL_SECS: u64 = 30;
const DEFAULT_STATE_PATH: &str = ".atelier/state.json";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub engagement: EngagementSettings,
    pub refresh: RefreshSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: NonZeroUsize,
    pub designs_ttl: Duration,
    /// `None` disables the background purge.
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct EngagementSettings {
    pub view_debounce: Duration,
    pub like_debounce: Duration,
    /// Fraction of a card that must be inside the viewport.
    pub card_threshold: f64,
    pub root_margin: RootMargin,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub columns: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub poll_interval: Duration,
    pub throttle: Duration,
    pub summary_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("ATELIER").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(&cli.overrides);
    if let Some(Command::Browse(args)) = cli.command.as_ref() {
        raw.apply_browse_overrides(&args.overrides);
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    engagement: RawEngagementSettings,
    refresh: RawRefreshSettings,
    storage: RawStorageSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(site) = overrides.site.as_ref() {
            self.api.base_url = Some(site.clone());
        }
        if let Some(timeout) = overrides.request_timeout_ms {
            self.api.request_timeout_ms = Some(timeout);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.state_file.as_ref() {
            self.storage.path = Some(path.clone());
        }
    }

    fn apply_browse_overrides(&mut self, overrides: &BrowseOverrides) {
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_designs_ttl_ms {
            self.cache.designs_ttl_ms = Some(ttl);
        }
        if let Some(wait) = overrides.view_debounce_ms {
            self.engagement.view_debounce_ms = Some(wait);
        }
        if let Some(wait) = overrides.like_debounce_ms {
            self.engagement.like_debounce_ms = Some(wait);
        }
        if let Some(threshold) = overrides.card_threshold {
            self.engagement.card_threshold = Some(threshold);
        }
        if let Some(margin) = overrides.root_margin.as_ref() {
            self.engagement.root_margin = Some(margin.clone());
        }
        if let Some(height) = overrides.viewport_height {
            self.engagement.viewport_height = Some(height);
        }
        if let Some(seconds) = overrides.poll_interval_secs {
            self.refresh.poll_interval_secs = Some(seconds);
        }
        if let Some(seconds) = overrides.throttle_secs {
            self.refresh.throttle_secs = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            logging,
            cache,
            engagement,
            refresh,
            storage,
        } = raw;

        Ok(Self {
            api: build_api_settings(api)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            engagement: build_engagement_settings(engagement)?,
            refresh: build_refresh_settings(refresh)?,
            storage: build_storage_settings(storage)?,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api
        .base_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("api.base_url", format!("`{raw_url}`: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.base_url",
            "scheme must be http or https",
        ));
    }

    let timeout_ms = api.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
    let request_timeout = positive_millis(timeout_ms, "api.request_timeout_ms")?;

    Ok(ApiSettings {
        base_url,
        request_timeout,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = NonZeroUsize::new(cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY))
        .ok_or_else(|| LoadError::invalid("cache.capacity", "must be greater than zero"))?;

    let designs_ttl = positive_millis(
        cache.designs_ttl_ms.unwrap_or(DEFAULT_DESIGNS_TTL_MS),
        "cache.designs_ttl_ms",
    )?;

    let sweep_ms = cache
        .sweep_interval_ms
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS);
    let sweep_interval = (sweep_ms > 0).then(|| Duration::from_millis(sweep_ms));

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        capacity,
        designs_ttl,
        sweep_interval,
    })
}

fn build_engagement_settings(
    engagement: RawEngagementSettings,
) -> Result<EngagementSettings, LoadError> {
    let card_threshold = engagement.card_threshold.unwrap_or(DEFAULT_CARD_THRESHOLD);
    if !(0.0..=1.0).contains(&card_threshold) {
        return Err(LoadError::invalid(
            "engagement.card_threshold",
            "must be between 0 and 1",
        ));
    }

    let root_margin = match engagement.root_margin {
        Some(raw) => RootMargin::from_str(&raw)
            .map_err(|err| LoadError::invalid("engagement.root_margin", err.to_string()))?,
        None => RootMargin::ZERO,
    };

    let viewport_width = positive_px(
        engagement.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
        "engagement.viewport_width",
    )?;
    let viewport_height = positive_px(
        engagement.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
        "engagement.viewport_height",
    )?;

    let columns = NonZeroUsize::new(engagement.columns.unwrap_or(DEFAULT_COLUMNS))
        .ok_or_else(|| LoadError::invalid("engagement.columns", "must be greater than zero"))?;

    Ok(EngagementSettings {
        view_debounce: Duration::from_millis(
            engagement
                .view_debounce_ms
                .unwrap_or(DEFAULT_VIEW_DEBOUNCE_MS),
        ),
        like_debounce: Duration::from_millis(
            engagement
                .like_debounce_ms
                .unwrap_or(DEFAULT_LIKE_DEBOUNCE_MS),
        ),
        card_threshold,
        root_margin,
        viewport_width,
        viewport_height,
        columns,
    })
}

fn build_refresh_settings(refresh: RawRefreshSettings) -> Result<RefreshSettings, LoadError> {
    let poll_secs = refresh
        .poll_interval_secs
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    let summary_secs = refresh
        .summary_interval_secs
        .unwrap_or(DEFAULT_SUMMARY_INTERVAL_SECS);

    Ok(RefreshSettings {
        poll_interval: positive_secs(poll_secs, "refresh.poll_interval_secs")?,
        throttle: Duration::from_secs(refresh.throttle_secs.unwrap_or(DEFAULT_THROTTLE_SECS)),
        summary_interval: positive_secs(summary_secs, "refresh.summary_interval_secs")?,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let path = storage
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("storage.path", "path must not be empty"));
    }

    Ok(StorageSettings { path })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    capacity: Option<usize>,
    designs_ttl_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngagementSettings {
    view_debounce_ms: Option<u64>,
    like_debounce_ms: Option<u64>,
    card_threshold: Option<f64>,
    root_margin: Option<String>,
    viewport_width: Option<f64>,
    viewport_height: Option<f64>,
    columns: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRefreshSettings {
    poll_interval_secs: Option<u64>,
    throttle_secs: Option<u64>,
    summary_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    path: Option<PathBuf>,
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn positive_px(value: f64, key: &'static str) -> Result<f64, LoadError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(LoadError::invalid(key, "must be a positive number of pixels"));
    }
    Ok(value)
}

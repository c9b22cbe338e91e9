use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Atelier binary.
#[derive(Debug, Parser)]
#[command(name = "atelier", version, about = "Portfolio gallery client")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ATELIER_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the published designs.
    Designs,
    /// Print per-design like and view counters.
    Stats,
    /// Print engagement totals from the analytics endpoint.
    Summary,
    /// Toggle the like state of a design.
    Like(LikeArgs),
    /// List the designs liked from this machine.
    Liked,
    /// Scroll through the gallery, reporting views and refreshing counters.
    Browse(Box<BrowseArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the portfolio API base URL, e.g. <https://example.com>.
    #[arg(long = "site", env = "ATELIER_SITE_URL", value_name = "URL", global = true)]
    pub site: Option<String>,

    /// Override the request timeout.
    #[arg(long = "request-timeout-ms", value_name = "MS", global = true)]
    pub request_timeout_ms: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the file holding persisted client state.
    #[arg(
        long = "state-file",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct LikeArgs {
    /// Design identifier (`_id`).
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Args, Clone)]
pub struct BrowseArgs {
    #[command(flatten)]
    pub overrides: BrowseOverrides,

    /// Pixels scrolled per step.
    #[arg(long, default_value_t = 240.0, value_name = "PX")]
    pub scroll_step: f64,

    /// Pause between scroll steps.
    #[arg(long, default_value_t = 400, value_name = "MS")]
    pub scroll_interval_ms: u64,

    /// Keep the session open this long after reaching the bottom.
    #[arg(long, default_value_t = 0, value_name = "SECONDS")]
    pub linger_secs: u64,

    /// Designs to toggle once the gallery is loaded.
    #[arg(long = "like", value_name = "ID")]
    pub like: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BrowseOverrides {
    /// Enable the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the design list cache TTL.
    #[arg(long = "cache-designs-ttl-ms", value_name = "MS")]
    pub cache_designs_ttl_ms: Option<u64>,

    /// Override the view report debounce window.
    #[arg(long = "view-debounce-ms", value_name = "MS")]
    pub view_debounce_ms: Option<u64>,

    /// Override the like confirmation debounce window.
    #[arg(long = "like-debounce-ms", value_name = "MS")]
    pub like_debounce_ms: Option<u64>,

    /// Override the fraction of a card that must be visible to count as viewed.
    #[arg(long = "card-threshold", value_name = "RATIO")]
    pub card_threshold: Option<f64>,

    /// Override the viewport margin, CSS shorthand (e.g. "0px 0px -10% 0px").
    #[arg(long = "root-margin", value_name = "MARGIN", allow_hyphen_values = true)]
    pub root_margin: Option<String>,

    /// Override the viewport height.
    #[arg(long = "viewport-height", value_name = "PX")]
    pub viewport_height: Option<f64>,

    /// Override the stats refresh interval.
    #[arg(long = "refresh-poll-interval-secs", value_name = "SECONDS")]
    pub poll_interval_secs: Option<u64>,

    /// Override the stats refresh throttle window.
    #[arg(long = "refresh-throttle-secs", value_name = "SECONDS")]
    pub throttle_secs: Option<u64>,
}

use anyhow::anyhow;
use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use log::LevelFilter;
use pws_weather_core::{
    find_config_file, get_xdg_data_dir, load_config, pws::DEFAULT_BASE_URL, ConfigSource,
    StationSpec, Units, DEFAULT_DASHBOARD_PORT,
};
use std::env;
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "PWS Weather Dashboard - Summaries and graphs over stored station data"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $PWS_DASHBOARD_CONFIG, ./dashboard.toml,
    /// $XDG_CONFIG_HOME/pws-weather/dashboard.toml, /etc/pws-weather/dashboard.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "PWS_DASHBOARD_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 0.0.0.0 for all interfaces)
    #[arg(short, long, env = "PWS_DASHBOARD_HOST")]
    #[serde(alias = "host")]
    pub domain: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PWS_DASHBOARD_PORT")]
    pub port: Option<String>,

    /// Public URL for links in the UI
    #[arg(short, long, env = "PWS_DASHBOARD_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Directory containing UI static files
    #[arg(short, long, env = "PWS_DASHBOARD_UI_DIR")]
    pub ui_dir: Option<String>,

    /// Directory holding the SQLite database written by the daemon
    #[arg(long, env = "PWS_DASHBOARD_DB_DIR")]
    pub db_dir: Option<String>,

    /// weather.com API key, enables live current conditions
    #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the PWS API
    #[arg(long, env = "PWS_DASHBOARD_BASE_URL")]
    pub base_url: Option<String>,

    /// Units requested for live conditions: e, m or h
    #[arg(long, env = "PWS_DASHBOARD_UNITS")]
    pub units: Option<String>,

    /// Stations to resolve, repeatable: --station propdada=KORMCMIN133
    #[arg(long = "station")]
    pub stations: Option<Vec<StationSpec>>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn host(&self) -> String {
        self.domain
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| DEFAULT_DASHBOARD_PORT.to_string())
    }

    pub fn remote_url(&self) -> String {
        self.remote_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host(), self.port()))
    }

    pub fn static_dir(&self) -> String {
        self.ui_dir
            .clone()
            .unwrap_or_else(|| "./static".to_string())
    }

    pub fn db_dir(&self) -> String {
        self.db_dir
            .clone()
            .unwrap_or_else(|| get_xdg_data_dir().to_string_lossy().to_string())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn units(&self) -> Result<Units, anyhow::Error> {
        match &self.units {
            Some(units) => units.parse().map_err(|e: String| anyhow!(e)),
            None => Ok(Units::default()),
        }
    }

    pub fn user_agent(&self) -> String {
        format!("pws-weather-dashboard/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn stations(&self) -> Vec<StationSpec> {
        self.stations.clone().unwrap_or_default()
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    merge_config(Cli::parse())
}

fn merge_config(cli_args: Cli) -> Cli {
    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("PWS_DASHBOARD_CONFIG", "dashboard.toml")
    };

    if let Some(path) = source.path() {
        log::info!("Loading config from: {}", path.display());
    }

    let file_config: Cli = load_config(&source).unwrap_or_default();
    merge(cli_args, file_config)
}

/// CLI args override file config (env vars are handled by clap)
fn merge(cli_args: Cli, file_config: Cli) -> Cli {
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        domain: cli_args.domain.or(file_config.domain),
        port: cli_args.port.or(file_config.port),
        remote_url: cli_args.remote_url.or(file_config.remote_url),
        ui_dir: cli_args.ui_dir.or(file_config.ui_dir),
        db_dir: cli_args.db_dir.or(file_config.db_dir),
        api_key: cli_args.api_key.or(file_config.api_key),
        base_url: cli_args.base_url.or(file_config.base_url),
        units: cli_args.units.or(file_config.units),
        stations: cli_args.stations.or(file_config.stations),
    }
}

pub fn get_log_level(cli: &Cli) -> LevelFilter {
    let level_str = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}

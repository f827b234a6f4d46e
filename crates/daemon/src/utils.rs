use anyhow::{anyhow, Error};
use clap::Parser;
use pws_weather_core::{
    find_config_file, get_xdg_data_dir, load_config, pws::DEFAULT_BASE_URL, ConfigSource,
    StationSpec, Units, DEFAULT_FETCH_INTERVAL,
};
use slog::{o, Drain, Level, Logger};
use std::{
    env,
    time::{Duration, Instant},
};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "PWS Weather Daemon - Ingests station observations and rolls them up"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $PWS_DAEMON_CONFIG, ./daemon.toml,
    /// $XDG_CONFIG_HOME/pws-weather/daemon.toml, /etc/pws-weather/daemon.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "PWS_DAEMON_LEVEL")]
    pub level: Option<String>,

    /// weather.com API key
    #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the PWS API
    #[arg(long, env = "PWS_DAEMON_BASE_URL")]
    pub base_url: Option<String>,

    /// Stations to track, repeatable: --station propdada=KORMCMIN133
    #[arg(long = "station")]
    pub stations: Option<Vec<StationSpec>>,

    /// Directory holding the SQLite database
    #[arg(long, env = "PWS_DAEMON_DB_DIR")]
    pub db_dir: Option<String>,

    /// Directory for cached history downloads
    #[arg(short, long, env = "PWS_DAEMON_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Fetch interval in seconds
    #[arg(short, long, env = "PWS_DAEMON_SLEEP_INTERVAL")]
    pub sleep_interval: Option<u64>,

    /// Rate limiter refill rate in tokens per second
    #[arg(long, env = "PWS_DAEMON_REFILL_RATE")]
    pub refill_rate: Option<f64>,

    /// Rate limiter token capacity
    #[arg(long, env = "PWS_DAEMON_TOKEN_CAPACITY")]
    pub token_capacity: Option<usize>,

    /// HTTP User-Agent header for PWS API requests
    #[arg(long, env = "PWS_DAEMON_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Units requested from the provider: e (imperial), m (metric), h (uk hybrid)
    #[arg(long, env = "PWS_DAEMON_UNITS")]
    pub units: Option<String>,

    /// Drop raw observations older than this many days (rollups are kept)
    #[arg(long, env = "PWS_DAEMON_RAW_RETENTION_DAYS")]
    pub raw_retention_days: Option<u32>,

    /// Fetch hourly history for this many days before the first run
    #[arg(long)]
    pub backfill_days: Option<u32>,

    /// Rebuild every hourly and daily rollup from the raw table on startup
    #[arg(long)]
    #[serde(skip)]
    pub rebuild: bool,

    /// Run a single fetch and rollup pass, then exit
    #[arg(long)]
    #[serde(skip)]
    pub once: bool,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn api_key(&self) -> Result<String, Error> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("no API key, set WEATHER_API_KEY or api_key in the config"))
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn stations(&self) -> Vec<StationSpec> {
        self.stations.clone().unwrap_or_default()
    }

    pub fn db_dir(&self) -> String {
        self.db_dir
            .clone()
            .unwrap_or_else(|| get_xdg_data_dir().to_string_lossy().to_string())
    }

    pub fn data_dir(&self) -> String {
        self.data_dir
            .clone()
            .unwrap_or_else(|| "./data".to_string())
    }

    /// At least one second; a zero interval would make the fetch loop spin
    pub fn sleep_interval(&self) -> u64 {
        self.sleep_interval.unwrap_or(DEFAULT_FETCH_INTERVAL).max(1)
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate.unwrap_or(0.5)
    }

    pub fn token_capacity(&self) -> usize {
        self.token_capacity.unwrap_or(5)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("pws-weather-daemon/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn units(&self) -> Result<Units, Error> {
        match &self.units {
            Some(units) => units.parse().map_err(|e: String| anyhow!(e)),
            None => Ok(Units::default()),
        }
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
        find_config_file("PWS_DAEMON_CONFIG", "daemon.toml")
    };

    let file_config: Cli = load_config(&source).unwrap_or_default();
    merge(cli_args, file_config)
}

/// CLI args override file config (env vars are handled by clap)
fn merge(cli_args: Cli, file_config: Cli) -> Cli {
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        api_key: cli_args.api_key.or(file_config.api_key),
        base_url: cli_args.base_url.or(file_config.base_url),
        stations: cli_args.stations.or(file_config.stations),
        db_dir: cli_args.db_dir.or(file_config.db_dir),
        data_dir: cli_args.data_dir.or(file_config.data_dir),
        sleep_interval: cli_args.sleep_interval.or(file_config.sleep_interval),
        refill_rate: cli_args.refill_rate.or(file_config.refill_rate),
        token_capacity: cli_args.token_capacity.or(file_config.token_capacity),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
        units: cli_args.units.or(file_config.units),
        raw_retention_days: cli_args.raw_retention_days.or(file_config.raw_retention_days),
        backfill_days: cli_args.backfill_days.or(file_config.backfill_days),
        rebuild: cli_args.rebuild,
        once: cli_args.once,
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let log_level = match cli.level.as_ref() {
        Some(level) => parse_level(level),
        None => parse_level(&env::var("RUST_LOG").unwrap_or_default()),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

/// Token bucket throttling calls to the provider
pub struct RateLimiter {
    capacity: usize,
    tokens: f64,
    last_refill: Instant,
    /// tokens added per second
    refill_rate: f64,
}

impl RateLimiter {
    pub fn new(capacity: usize, refill_rate: f64) -> Self {
        RateLimiter {
            capacity,
            tokens: capacity as f64,
            last_refill: Instant::now(),
            refill_rate,
        }
    }

    fn refill_tokens(&mut self) {
        let now = Instant::now();
        let elapsed_time = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_time * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Take one token, sleeping until one is available; gives up after three waits
    pub async fn acquire(&mut self) -> Result<(), Error> {
        let mut retries = 0;

        loop {
            self.refill_tokens();

            if self.tokens >= 1.0 {
                self.tokens -= 1.0;
                return Ok(());
            }
            if retries >= 3 || self.refill_rate <= 0.0 {
                return Err(anyhow!("Rate limit exceeded after retries"));
            }
            retries += 1;
            let wait = Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate)
                .map_err(|e| anyhow!("invalid rate limiter wait: {}", e))?;
            tokio::time::sleep(wait).await;
        }
    }
}

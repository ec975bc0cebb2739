use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `TUTORSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Directory holding the journal file.
    pub data_dir: PathBuf,
    /// Prometheus listener port; disabled when unset.
    pub metrics_port: Option<u16>,
    /// How long an order-less pending hold lives before the sweeper expires it.
    pub hold_ttl: Duration,
    pub sweep_interval: Duration,
    /// Journal appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be positive")]
    NotPositive { var: &'static str },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            hold_ttl: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(30),
            compact_threshold: 1000,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match parsed::<u64>(lookup, var)? {
        None => Ok(default),
        Some(0) => Err(ConfigError::NotPositive { var }),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind: lookup("TUTORSLOT_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "TUTORSLOT_PORT")?.unwrap_or(defaults.port),
            data_dir: lookup("TUTORSLOT_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "TUTORSLOT_METRICS_PORT")?,
            hold_ttl: positive_secs(&lookup, "TUTORSLOT_HOLD_TTL_SECS", defaults.hold_ttl)?,
            sweep_interval: positive_secs(&lookup, "TUTORSLOT_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            compact_threshold: parsed(&lookup, "TUTORSLOT_COMPACT_THRESHOLD")?.unwrap_or(defaults.compact_threshold),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

// src/config/pipeline.rs
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ingest::extract::{parse_time, DEFAULT_TITLE_MAGNITUDE_WORD};
use crate::ingest::types::Point;

pub const ENV_CONFIG_PATH: &str = "SEISMIC_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/seismic.toml";
pub const DEFAULT_JSON_PATH: &str = "config/seismic.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Windowed FDSN/QuakeML date-range queries
    #[default]
    Catalog,
    /// Single Atom-geo feed snapshot, distance filtered
    AtomFeed,
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "catalog" => Ok(Mode::Catalog),
            "atom_feed" | "atom" | "feed" => Ok(Mode::AtomFeed),
            other => Err(Error::config(format!("unknown mode {other:?}"), "mode")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub base_url: String,
    pub atom_feed_url: String,
    #[serde(deserialize_with = "de_utc")]
    pub start_date: DateTime<Utc>,
    #[serde(deserialize_with = "de_utc")]
    pub end_date: DateTime<Utc>,
    pub window_hours: u32,
    pub output_dir: PathBuf,
    /// Windows in flight at once; 1 = sequential.
    pub max_concurrency: usize,
    pub request_timeout_ms: u64,
    pub reference_point: Point,
    pub distance_radius_km: f64,
    /// Minimum spacing between request starts (politeness toward the service).
    pub min_request_interval_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Span covered by one feed snapshot ("all_week" feed = 168h).
    pub atom_feed_span_hours: u32,
    pub title_magnitude_word: usize,
    pub csv_time_column: bool,
    /// Write `error.log` into the output dir when windows fail.
    pub error_log: bool,
    /// Prometheus exposition text written at run end.
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Catalog,
            base_url: "http://webservices.ingv.it/fdsnws/event/1/query".to_string(),
            atom_feed_url: "http://cnt.rm.ingv.it/feed/atom/all_week".to_string(),
            start_date: Utc
                .with_ymd_and_hms(2010, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            end_date: Utc
                .with_ymd_and_hms(2010, 1, 10, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            window_hours: 6,
            output_dir: PathBuf::from("./csv_data/"),
            max_concurrency: 1,
            request_timeout_ms: 30_000,
            reference_point: Point::new(42.53, 13.28),
            distance_radius_km: 200.0,
            min_request_interval_ms: 250,
            max_retries: 2,
            retry_backoff_ms: 500,
            atom_feed_span_hours: 168,
            title_magnitude_word: DEFAULT_TITLE_MAGNITUDE_WORD,
            csv_time_column: false,
            error_log: true,
            metrics_textfile: None,
        }
    }
}

fn de_utc<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_time(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
}

impl PipelineConfig {
    /// Load from an explicit path. TOML or JSON, chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("reading {}: {e}", path.display()), "config_path")
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext)
    }

    /// Resolution order:
    /// 1) $SEISMIC_CONFIG_PATH
    /// 2) config/seismic.toml
    /// 3) config/seismic.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(Error::config(
                    format!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()),
                    "config_path",
                ));
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default())
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        let toml_err = match hint_ext {
            "json" => None,
            _ => match toml::from_str::<Self>(s) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => Some(e),
            },
        };
        match serde_json::from_str::<Self>(s) {
            Ok(cfg) => Ok(cfg),
            Err(json_err) => {
                let message = match toml_err {
                    Some(t) if hint_ext == "toml" => format!("invalid TOML: {t}"),
                    _ => format!("invalid config: {json_err}"),
                };
                Err(Error::Config {
                    message,
                    key: None,
                })
            }
        }
    }

    /// Apply `SEISMIC_*` environment overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_var("SEISMIC_MODE") {
            self.mode = v.parse()?;
        }
        if let Some(v) = env_var("SEISMIC_START_DATE") {
            self.start_date = parse_time(&v)
                .ok_or_else(|| Error::config(format!("invalid SEISMIC_START_DATE {v:?}"), "start_date"))?;
        }
        if let Some(v) = env_var("SEISMIC_END_DATE") {
            self.end_date = parse_time(&v)
                .ok_or_else(|| Error::config(format!("invalid SEISMIC_END_DATE {v:?}"), "end_date"))?;
        }
        if let Some(v) = env_var("SEISMIC_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("SEISMIC_WINDOW_HOURS") {
            self.window_hours = parse_env(&v, "window_hours")?;
        }
        if let Some(v) = env_var("SEISMIC_MAX_CONCURRENCY") {
            self.max_concurrency = parse_env(&v, "max_concurrency")?;
        }
        Ok(())
    }

    /// Reject anything that would make the run meaningless before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.window_hours == 0 {
            return Err(Error::config("window_hours must be > 0", "window_hours"));
        }
        if self.mode == Mode::Catalog && self.end_date <= self.start_date {
            return Err(Error::config("end_date must be after start_date", "end_date"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be >= 1", "max_concurrency"));
        }
        if self.max_concurrency > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(Error::config(
                format!(
                    "max_concurrency must be <= {}",
                    tokio::sync::Semaphore::MAX_PERMITS
                ),
                "max_concurrency",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::config("request_timeout_ms must be > 0", "request_timeout_ms"));
        }
        if self.atom_feed_span_hours == 0 {
            return Err(Error::config("atom_feed_span_hours must be > 0", "atom_feed_span_hours"));
        }
        let Point { lat, long } = self.reference_point;
        if !(lat.is_finite() && (-90.0..=90.0).contains(&lat))
            || !(long.is_finite() && (-180.0..=180.0).contains(&long))
        {
            return Err(Error::config(
                format!("reference_point ({lat}, {long}) is not a valid coordinate"),
                "reference_point",
            ));
        }
        if !(self.distance_radius_km.is_finite() && self.distance_radius_km > 0.0) {
            return Err(Error::config("distance_radius_km must be > 0", "distance_radius_km"));
        }
        let (key, raw) = match self.mode {
            Mode::Catalog => ("base_url", &self.base_url),
            Mode::AtomFeed => ("atom_feed_url", &self.atom_feed_url),
        };
        let parsed =
            url::Url::parse(raw).map_err(|e| Error::config(format!("{key} {raw:?}: {e}"), key))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!("{key} must be http(s)"), key));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::config(format!("invalid value {raw:?}"), key))
}

//! Run configuration.
//!
//! Everything lives in a single TOML file, `eventfeeds.toml` in the working
//! directory by default:
//!
//! ```toml
//! [output]
//! dir = "feeds"
//! combined = true
//!
//! [time]
//! timezone = "America/New_York"
//! lookahead_days = 120
//!
//! [classify]
//! default_tag = "adult"
//!
//! [[sources]]
//! id = "library"
//! kind = "ics"
//! url = "https://library.example/events.ics"
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use eventfeeds_core::{ClassifierConfig, DedupeConfig, TimeWindow, resolve_timezone};
use eventfeeds_sources::{CacheConfig, HttpConfig, SourceSpec};
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "EVENTFEEDS_CONFIG";

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "eventfeeds.toml";

/// Horizon used for a side of the window that is not configured.
const UNBOUNDED_DAYS: i64 = 3650;

// ---------------------------------------------------------------------------
// FeedsConfig (eventfeeds.toml)
// ---------------------------------------------------------------------------

/// Configuration for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    /// Where and how feeds are written.
    pub output: OutputSettings,

    /// HTTP cache file.
    pub cache: CacheConfig,

    /// HTTP client, robots and politeness.
    pub http: HttpConfig,

    /// Timezone, default duration and horizon.
    pub time: TimeSettings,

    /// Duplicate detection thresholds.
    pub dedupe: DedupeConfig,

    /// Category rules.
    pub classify: ClassifierConfig,

    /// Configured sources, in fetch order.
    pub sources: Vec<SourceSpec>,
}

/// Feed output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory receiving the `.ics` files.
    pub dir: PathBuf,

    /// Also write `all.ics` with every event.
    pub combined: bool,

    /// Prefix of each feed's calendar name.
    pub calendar_name: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("feeds"),
            combined: true,
            calendar_name: "Fredericksburg Events".to_string(),
        }
    }
}

/// Time handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSettings {
    /// IANA name used for times without an offset.
    pub timezone: String,

    /// Length of events without an end.
    pub default_duration_minutes: i64,

    /// Drop events that ended more than this many days ago.
    pub lookbehind_days: Option<i64>,

    /// Drop events starting more than this many days ahead.
    pub lookahead_days: Option<i64>,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            default_duration_minutes: eventfeeds_sources::normalize::DEFAULT_DURATION_MINUTES,
            lookbehind_days: None,
            lookahead_days: None,
        }
    }
}

impl TimeSettings {
    /// Resolves the configured timezone.
    pub fn tz(&self) -> FeedResult<Tz> {
        resolve_timezone(&self.timezone)
            .ok_or_else(|| FeedError::Config(format!("unknown timezone {:?}", self.timezone)))
    }

    pub fn default_duration(&self) -> Duration {
        Duration::minutes(self.default_duration_minutes.max(1))
    }

    /// The horizon around `now`, when either side is configured.
    pub fn window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        if self.lookbehind_days.is_none() && self.lookahead_days.is_none() {
            return None;
        }
        let behind = self.lookbehind_days.unwrap_or(UNBOUNDED_DAYS);
        let ahead = self.lookahead_days.unwrap_or(UNBOUNDED_DAYS);
        Some(TimeWindow::around(now, Duration::days(behind), Duration::days(ahead)))
    }
}

impl FeedsConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing default file gives the default configuration, which has
    /// no sources.
    pub fn load() -> FeedResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> FeedResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> FeedResult<Self> {
        toml::from_str(content).map_err(|source| FeedError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the default configuration file path.
    ///
    /// `eventfeeds.toml` in the working directory, else the copy in the
    /// user's config directory when one exists.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }
        Self::default_config_dir()
            .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
            .filter(|path| path.exists())
            .unwrap_or(local)
    }

    /// Returns the per-user configuration directory.
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eventfeeds"))
    }

    /// Sources that will run.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Checks what can be checked without touching the network.
    pub fn validate(&self) -> FeedResult<()> {
        self.time.tz()?;
        eventfeeds_core::Classifier::new(&self.classify)?;

        let mut seen = std::collections::BTreeSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(FeedError::Config("source with an empty id".to_string()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(FeedError::Config(format!("duplicate source id {:?}", source.id)));
            }
        }
        if self.http.throttle_min_ms > self.http.throttle_max_ms {
            return Err(FeedError::Config(
                "http.throttle_min_ms must not exceed http.throttle_max_ms".to_string(),
            ));
        }
        Ok(())
    }
}

//! Per-site adapters and the `[[sources]]` configuration that selects them.
//!
//! ```toml
//! [[sources]]
//! id = "library"
//! kind = "ics"
//! url = "https://library.example/events.ics"
//! priority = 2
//!
//! [[sources]]
//! id = "brewery"
//! kind = "html"
//! url = "https://brewery.example/events"
//! hints = { item = ".event", title = "h3", date = ".date", time = ".time" }
//! ```

mod bandsintown;
mod eventbrite;
mod html;
mod ics;
mod macaronikid;
mod rss;
mod schema_org;
mod thrillshare;

pub use bandsintown::BandsintownSource;
pub use eventbrite::EventbriteSource;
pub use html::HtmlSource;
pub use ics::IcsSource;
pub use macaronikid::MacaroniKidSource;
pub use rss::RssSource;
pub use schema_org::SchemaOrgSource;
pub use thrillshare::ThrillshareSource;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SourceError;
use crate::extract::html::CssHints;
use crate::source::{ErrorSource, EventSource};

pub const DEFAULT_EVENTBRITE_PAGES: u32 = 10;
pub const DEFAULT_EVENTBRITE_TOKEN_ENV: &str = "EVENTBRITE_TOKEN";
pub const DEFAULT_BANDSINTOWN_APP_ID_ENV: &str = "BANDSINTOWN_APP_ID";
pub const DEFAULT_MACARONIKID_BASE_URL: &str = "https://fredericksburg.macaronikid.com";
pub const DEFAULT_MACARONIKID_LIST_PAGES: u32 = 8;
/// Environment override for the Macaroni KID user agent.
pub const MACARONIKID_UA_ENV: &str = "MAC_KID_UA";

const ICS_ACCEPT: &str = "text/calendar, text/plain;q=0.9, */*;q=0.5";

fn default_enabled() -> bool {
    true
}

fn default_eventbrite_pages() -> u32 {
    DEFAULT_EVENTBRITE_PAGES
}

fn default_eventbrite_token_env() -> String {
    DEFAULT_EVENTBRITE_TOKEN_ENV.to_string()
}

fn default_bandsintown_app_id_env() -> String {
    DEFAULT_BANDSINTOWN_APP_ID_ENV.to_string()
}

fn default_macaronikid_base_url() -> String {
    DEFAULT_MACARONIKID_BASE_URL.to_string()
}

fn default_macaronikid_list_pages() -> u32 {
    DEFAULT_MACARONIKID_LIST_PAGES
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher wins when duplicates are merged.
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// The adapter kind and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Ics {
        url: String,
    },
    Rss {
        url: String,
    },
    Html {
        url: String,
        #[serde(default)]
        hints: CssHints,
    },
    SchemaOrg {
        url: String,
    },
    Eventbrite {
        url: String,
        #[serde(default = "default_eventbrite_pages")]
        pages: u32,
        #[serde(default = "default_eventbrite_token_env")]
        token_env: String,
    },
    Bandsintown {
        url: String,
        #[serde(default = "default_bandsintown_app_id_env")]
        app_id_env: String,
    },
    Thrillshare {
        url: String,
    },
    Macaronikid {
        #[serde(default = "default_macaronikid_base_url")]
        base_url: String,
        #[serde(default = "default_macaronikid_list_pages")]
        max_list_pages: u32,
        #[serde(default)]
        user_agent: Option<String>,
    },
}

impl SourceKind {
    /// The kind as written in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ics { .. } => "ics",
            Self::Rss { .. } => "rss",
            Self::Html { .. } => "html",
            Self::SchemaOrg { .. } => "schema_org",
            Self::Eventbrite { .. } => "eventbrite",
            Self::Bandsintown { .. } => "bandsintown",
            Self::Thrillshare { .. } => "thrillshare",
            Self::Macaronikid { .. } => "macaronikid",
        }
    }

    fn url(&self) -> &str {
        match self {
            Self::Ics { url }
            | Self::Rss { url }
            | Self::Html { url, .. }
            | Self::SchemaOrg { url }
            | Self::Eventbrite { url, .. }
            | Self::Bandsintown { url, .. }
            | Self::Thrillshare { url } => url,
            Self::Macaronikid { base_url, .. } => base_url,
        }
    }
}

/// Reads an environment variable, treating blank values as unset.
pub(crate) fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Builds the adapter for a configured source.
///
/// Invalid settings produce an [`ErrorSource`], so the problem is reported
/// in the run summary instead of aborting the run.
pub fn build_source(spec: &SourceSpec) -> Box<dyn EventSource> {
    if spec.kind.url().trim().is_empty() {
        let error = SourceError::configuration(format!("source {} has no url", spec.id));
        warn!(source = %spec.id, error = %error, "invalid source configuration");
        return Box::new(ErrorSource::new(&spec.id, error));
    }

    let id = spec.id.clone();
    match &spec.kind {
        SourceKind::Ics { url } => Box::new(IcsSource::new(id, url)),
        SourceKind::Rss { url } => Box::new(RssSource::new(id, url)),
        SourceKind::Html { url, hints } => match HtmlSource::new(&id, url, hints) {
            Ok(source) => Box::new(source),
            Err(error) => {
                warn!(source = %spec.id, error = %error, "invalid source configuration");
                Box::new(ErrorSource::new(id, error))
            }
        },
        SourceKind::SchemaOrg { url } => Box::new(SchemaOrgSource::new(id, url)),
        SourceKind::Eventbrite {
            url,
            pages,
            token_env,
        } => {
            let mut source = EventbriteSource::new(id, url).with_pages(*pages);
            if let Some(token) = env_value(token_env) {
                source = source.with_token(token);
            }
            Box::new(source)
        }
        SourceKind::Bandsintown { url, app_id_env } => {
            Box::new(BandsintownSource::new(id, url, env_value(app_id_env)))
        }
        SourceKind::Thrillshare { url } => Box::new(ThrillshareSource::new(id, url)),
        SourceKind::Macaronikid {
            base_url,
            max_list_pages,
            user_agent,
        } => {
            let mut source = MacaroniKidSource::new(id, base_url).with_max_list_pages(*max_list_pages);
            if let Some(ua) = env_value(MACARONIKID_UA_ENV).or_else(|| user_agent.clone()) {
                source = source.with_user_agent(ua);
            }
            Box::new(source)
        }
    }
}

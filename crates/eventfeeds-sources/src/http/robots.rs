//! A small robots.txt guard.
//!
//! Rules are fetched once per origin and matched by longest path prefix
//! (`*` and `$` wildcards supported). Anything that goes wrong while
//! fetching or reading robots.txt allows the request.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use super::data_url::is_data_url;

/// Endpoints that are always allowed: feeds the sites publish for
/// subscription even when their robots.txt is broad.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "/common/modules/iCalendar/iCalendar.aspx",
    "/calendar/1.xml",
    "/events/?ical=1",
    "/events/feed",
];

static EVENTBRITE_PAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:[^/]+\.)?eventbrite\.com/(?:.*/)?(?:d|e)/").expect("Invalid eventbrite page regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        wildcard_match(&self.pattern, path)
    }
}

/// Parsed rules that apply to one user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    rules: Vec<Rule>,
}

impl RobotsRules {
    /// Parses robots.txt, keeping the group for `agent` or, failing that, `*`.
    pub fn parse(content: &str, agent: &str) -> Self {
        let token = agent
            .split('/')
            .next()
            .unwrap_or(agent)
            .trim()
            .to_ascii_lowercase();

        let mut specific = Vec::new();
        let mut wildcard = Vec::new();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow allows everything.
                    if value.is_empty() {
                        continue;
                    }
                    let rule = Rule {
                        allow: field == "allow",
                        pattern: value.to_string(),
                    };
                    if !token.is_empty() && group_agents.iter().any(|a| a != "*" && token.contains(a.as_str())) {
                        specific.push(rule.clone());
                    }
                    if group_agents.iter().any(|a| a == "*") {
                        wildcard.push(rule);
                    }
                }
                _ => {}
            }
        }

        Self {
            rules: if specific.is_empty() { wildcard } else { specific },
        }
    }

    /// Returns true if `path` (with query) may be fetched.
    pub fn allows(&self, path: &str) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| (rule.pattern.len(), rule.allow))
            .is_none_or(|rule| rule.allow)
    }
}

fn wildcard_match(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let escaped = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    let re = format!("^{}{}", escaped, if anchored { "$" } else { "" });
    Regex::new(&re).is_ok_and(|re| re.is_match(path))
}

/// Returns true for URLs that skip the robots check entirely.
pub fn is_allowlisted(url: &str, allowlist: &[String]) -> bool {
    if is_data_url(url) {
        return true;
    }
    if let Ok(parsed) = Url::parse(url) {
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        if host.ends_with("macaronikid.com") && parsed.path().to_ascii_lowercase().ends_with(".ics") {
            return true;
        }
    }
    if EVENTBRITE_PAGE_REGEX.is_match(url) {
        return true;
    }
    allowlist.iter().any(|sub| url.contains(sub.as_str()))
}

/// Caches robots.txt rules per origin for the duration of a run.
#[derive(Debug, Default)]
pub struct RobotsGuard {
    allowlist: Vec<String>,
    origins: Mutex<HashMap<String, Option<RobotsRules>>>,
}

impl RobotsGuard {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self {
            allowlist,
            origins: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether `url` may be fetched by `user_agent`.
    pub async fn allowed(&self, client: &Client, url: &str, user_agent: &str) -> bool {
        if is_allowlisted(url, &self.allowlist) {
            trace!(url = %url, "robots: allowlisted");
            return true;
        }
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let origin = parsed.origin().ascii_serialization();

        let mut origins = self.origins.lock().await;
        if !origins.contains_key(&origin) {
            let rules = fetch_rules(client, &origin, user_agent).await;
            origins.insert(origin.clone(), rules);
        }

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        let allowed = origins
            .get(&origin)
            .and_then(Option::as_ref)
            .is_none_or(|rules| rules.allows(&path));
        if !allowed {
            debug!(url = %url, "robots.txt disallows");
        }
        allowed
    }
}

async fn fetch_rules(client: &Client, origin: &str, user_agent: &str) -> Option<RobotsRules> {
    let robots_url = format!("{}/robots.txt", origin);
    let response = match client.get(&robots_url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(url = %robots_url, error = %e, "robots.txt unavailable, allowing");
            return None;
        }
    };
    if response.status() != StatusCode::OK {
        debug!(url = %robots_url, status = %response.status(), "no robots.txt, allowing");
        return None;
    }
    let body = response.text().await.ok()?;
    Some(RobotsRules::parse(&body, user_agent))
}

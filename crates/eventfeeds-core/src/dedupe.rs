//! Near-duplicate detection and merging.
//!
//! Two records are considered the same real-world event when their
//! normalized titles are similar enough, their start times agree, and their
//! locations (when both are known) do not contradict each other. Merging keeps
//! the record from the more authoritative source and fills its gaps from the
//! other.
//!
//! Passes repeat until nothing merges and the output is sorted, so running
//! [`Deduplicator::dedupe`] on its own output returns the same records.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{EventRecord, UNTITLED};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "in", "of", "on", "the", "to", "with",
];

/// Tuning for duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    /// Minimum title token similarity (0.0 to 1.0).
    pub title_threshold: f64,
    /// Maximum start difference, in minutes, when both records have clock times.
    pub start_tolerance_minutes: i64,
    /// Minimum location token similarity when both records have a location.
    pub location_threshold: f64,
}

impl DedupeConfig {
    /// Default title similarity threshold.
    pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.8;

    /// Default start tolerance in minutes.
    pub const DEFAULT_START_TOLERANCE_MINUTES: i64 = 120;

    /// Default location similarity threshold.
    pub const DEFAULT_LOCATION_THRESHOLD: f64 = 0.2;
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            title_threshold: Self::DEFAULT_TITLE_THRESHOLD,
            start_tolerance_minutes: Self::DEFAULT_START_TOLERANCE_MINUTES,
            location_threshold: Self::DEFAULT_LOCATION_THRESHOLD,
        }
    }
}

/// Lowercases, strips punctuation, and drops years and stop words.
///
/// Falls back to the plain word tokens when filtering would leave nothing.
pub fn title_tokens(title: &str) -> BTreeSet<String> {
    let words = word_tokens(title);
    let filtered: BTreeSet<String> = words
        .iter()
        .filter(|w| !is_year(w) && !STOP_WORDS.contains(&w.as_str()))
        .cloned()
        .collect();
    if filtered.is_empty() { words } else { filtered }
}

fn word_tokens(s: &str) -> BTreeSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_year(word: &str) -> bool {
    word.len() == 4
        && (word.starts_with("19") || word.starts_with("20"))
        && word.chars().all(|c| c.is_ascii_digit())
}

/// Jaccard similarity of two token sets; two empty sets score 0.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Title similarity in `[0.0, 1.0]`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaccard(&title_tokens(a), &title_tokens(b))
}

/// Merges near-duplicate event records.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    config: DedupeConfig,
    tz: Tz,
}

impl Deduplicator {
    /// Creates a deduplicator comparing calendar dates in `tz`.
    pub fn new(config: DedupeConfig, tz: Tz) -> Self {
        Self { config, tz }
    }

    /// Returns true if `a` and `b` describe the same event.
    pub fn is_duplicate(&self, a: &EventRecord, b: &EventRecord) -> bool {
        if !self.same_time(a, b) {
            return false;
        }
        if a.id == b.id {
            return true;
        }
        if self.separate_sessions(a, b) {
            return false;
        }
        if title_similarity(&a.title, &b.title) < self.config.title_threshold {
            return false;
        }
        self.compatible_locations(a, b)
    }

    fn same_time(&self, a: &EventRecord, b: &EventRecord) -> bool {
        if a.start.is_datetime() && b.start.is_datetime() {
            let tolerance = Duration::minutes(self.config.start_tolerance_minutes.max(0));
            a.start.distance(&b.start) <= tolerance
        } else {
            a.start.local_date(&self.tz) == b.start.local_date(&self.tz)
        }
    }

    /// One source listing the same title at two different starts, under
    /// different ids or links, is a repeated session, not a duplicate.
    fn separate_sessions(&self, a: &EventRecord, b: &EventRecord) -> bool {
        a.source == b.source && a.start != b.start && (a.id != b.id || a.url != b.url)
    }

    fn compatible_locations(&self, a: &EventRecord, b: &EventRecord) -> bool {
        let (Some(la), Some(lb)) = (a.location.as_deref(), b.location.as_deref()) else {
            return true;
        };
        let (ta, tb) = (word_tokens(la), word_tokens(lb));
        if ta.is_empty() || tb.is_empty() || ta.is_subset(&tb) || tb.is_subset(&ta) {
            return true;
        }
        jaccard(&ta, &tb) >= self.config.location_threshold
    }

    /// Collapses duplicates and returns the records in a stable order.
    pub fn dedupe(&self, records: Vec<EventRecord>) -> Vec<EventRecord> {
        let input = records.len();
        let mut current = records;
        sort_records(&mut current);

        loop {
            let (next, merges) = self.pass(current);
            current = next;
            if merges == 0 {
                break;
            }
        }

        debug!(input, output = current.len(), "Deduplicated events");
        current
    }

    fn pass(&self, records: Vec<EventRecord>) -> (Vec<EventRecord>, usize) {
        let mut out: Vec<EventRecord> = Vec::with_capacity(records.len());
        let mut merges = 0;

        'records: for record in records {
            for existing in out.iter_mut() {
                if self.is_duplicate(existing, &record) {
                    debug!(
                        kept = %existing.title,
                        dropped = %record.title,
                        source = %record.source,
                        "Merging duplicate event"
                    );
                    let current = std::mem::replace(existing, record.clone());
                    *existing = merge(current, record);
                    merges += 1;
                    continue 'records;
                }
            }
            out.push(record);
        }

        sort_records(&mut out);
        (out, merges)
    }
}

fn sort_records(records: &mut [EventRecord]) {
    records.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn rank(r: &EventRecord) -> (i32, usize, usize, Reverse<&str>, Reverse<&str>) {
    (
        r.priority,
        r.completeness(),
        r.description.as_deref().map_or(0, str::len),
        Reverse(r.source.as_str()),
        Reverse(r.id.as_str()),
    )
}

/// Merges two records describing the same event.
///
/// The higher-ranked record (source priority, then completeness, then
/// description length) is kept; its missing fields are filled from the
/// other, and tags and contributing sources are unioned.
pub fn merge(a: EventRecord, b: EventRecord) -> EventRecord {
    let (mut primary, other) = if rank(&a) >= rank(&b) { (a, b) } else { (b, a) };

    if primary.start.is_all_day() && other.start.is_datetime() {
        primary.start = other.start;
        if primary.end.is_none_or(|end| end.is_all_day()) {
            primary.end = other.end;
        }
    }
    if primary.title == UNTITLED && other.title != UNTITLED {
        primary.title = other.title;
    }
    if primary.end.is_none() {
        primary.end = other.end;
    }
    if primary.location.is_none() {
        primary.location = other.location;
    }
    if primary.description.is_none() {
        primary.description = other.description;
        if primary.description_html.is_none() {
            primary.description_html = other.description_html;
        }
    }
    if primary.url.is_none() {
        primary.url = other.url;
    }
    primary.tags.extend(other.tags);
    primary.merged_sources.extend(other.merged_sources);
    primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CategoryTag;
    use crate::time::{DEFAULT_TIMEZONE, EventTime};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(d: u32, h: u32, m: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2024, 10, d, h, m, 0).unwrap())
    }

    fn day(d: u32) -> EventTime {
        EventTime::from_date(NaiveDate::from_ymd_opt(2024, 10, d).unwrap())
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(DedupeConfig::default(), DEFAULT_TIMEZONE)
    }

    mod similarity {
        use super::*;

        #[test]
        fn years_and_stop_words_are_ignored() {
            assert_eq!(title_similarity("Fall Festival", "Fall Festival 2024"), 1.0);
            assert_eq!(title_similarity("The Fall Festival!", "fall festival"), 1.0);
        }

        #[test]
        fn partial_overlap_scores_below_default() {
            let score = title_similarity("Story Time", "Story Time: Toddlers");
            assert!(score < DedupeConfig::DEFAULT_TITLE_THRESHOLD);
        }

        #[test]
        fn stop_word_only_titles_keep_their_words() {
            assert_eq!(title_tokens("The End").len(), 1);
            assert_eq!(title_tokens("The"), BTreeSet::from(["the".to_string()]));
        }

        #[test]
        fn empty_sets_never_match() {
            assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
        }
    }

    mod detection {
        use super::*;

        #[test]
        fn fall_festival_collapses() {
            let a = EventRecord::new("a", "Fall Festival", day(12), "parks");
            let b = EventRecord::new("b", "Fall Festival 2024", day(12), "chamber")
                .with_location("Market Square");
            let out = dedup().dedupe(vec![a, b]);

            assert_eq!(out.len(), 1);
            assert_eq!(
                out[0].merged_sources,
                BTreeSet::from(["chamber".to_string(), "parks".to_string()])
            );
            assert_eq!(out[0].location.as_deref(), Some("Market Square"));
        }

        #[test]
        fn datetime_within_tolerance_matches_all_day() {
            let a = EventRecord::new("a", "Fall Festival", at(12, 14, 0), "parks");
            let b = EventRecord::new("b", "Fall Festival", at(12, 15, 30), "chamber");
            let c = EventRecord::new("c", "Fall Festival", day(12), "blog");
            let d = dedup();
            assert!(d.is_duplicate(&a, &b));
            assert!(d.is_duplicate(&a, &c));
        }

        #[test]
        fn far_apart_times_do_not_match() {
            let a = EventRecord::new("a", "Open Mic", at(12, 14, 0), "x");
            let b = EventRecord::new("b", "Open Mic", at(12, 23, 0), "y");
            assert!(!dedup().is_duplicate(&a, &b));
        }

        #[test]
        fn different_dates_do_not_match() {
            let a = EventRecord::new("a", "Fall Festival", day(12), "x");
            let b = EventRecord::new("b", "Fall Festival", day(13), "y");
            assert!(!dedup().is_duplicate(&a, &b));
        }

        #[test]
        fn distinct_locations_block_merge() {
            let a = EventRecord::new("a", "Pumpkin Patch", day(12), "x")
                .with_location("Hartwood Farm");
            let b = EventRecord::new("b", "Pumpkin Patch", day(12), "y")
                .with_location("Downtown Library");
            assert_eq!(dedup().dedupe(vec![a, b]).len(), 2);
        }

        #[test]
        fn contained_location_still_matches() {
            let a = EventRecord::new("a", "Pumpkin Patch", day(12), "x")
                .with_location("Hartwood Farm");
            let b = EventRecord::new("b", "Pumpkin Patch", day(12), "y")
                .with_location("Hartwood Farm, 123 Farm Rd, Fredericksburg VA");
            assert!(dedup().is_duplicate(&a, &b));
        }

        #[test]
        fn repeated_sessions_from_one_source_stay_apart() {
            let first = EventRecord::new("s1", "Story Time", at(12, 14, 0), "library")
                .with_url("https://library.example/events/s1");
            let second = EventRecord::new("s2", "Story Time", at(12, 15, 0), "library")
                .with_url("https://library.example/events/s2");
            let out = dedup().dedupe(vec![first, second]);
            let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["s1", "s2"]);
        }

        #[test]
        fn same_session_listed_by_two_sources_still_merges() {
            let a = EventRecord::new("s1", "Story Time", at(12, 14, 0), "library");
            let b = EventRecord::new("x9", "Story Time", at(12, 15, 0), "calendar");
            assert!(dedup().is_duplicate(&a, &b));
        }

        #[test]
        fn same_uid_matches_even_with_retitled_event() {
            let a = EventRecord::new("uid-1", "Concert", at(12, 19, 0), "x");
            let b = EventRecord::new("uid-1", "Concert (rescheduled)", at(12, 19, 0), "y");
            assert!(dedup().is_duplicate(&a, &b));
        }

        #[test]
        fn idempotent() {
            let records = vec![
                EventRecord::new("1", "Fall Festival", day(12), "a"),
                EventRecord::new("2", "Fall Festival 2024", day(12), "b"),
                EventRecord::new("3", "fall festival", at(12, 14, 0), "c"),
                EventRecord::new("4", "Trivia Night", at(15, 23, 0), "a"),
                EventRecord::new("5", "Trivia Night", at(22, 23, 0), "b"),
                EventRecord::new("6", "Story Time", at(15, 14, 0), "c"),
            ];
            let d = dedup();
            let once = d.dedupe(records);
            let twice = d.dedupe(once.clone());
            assert_eq!(once, twice);
            assert_eq!(once.len(), 4);
        }

        #[test]
        fn order_of_input_does_not_matter() {
            let records = vec![
                EventRecord::new("1", "Fall Festival", day(12), "a"),
                EventRecord::new("2", "Fall Festival 2024", day(12), "b").with_priority(5),
                EventRecord::new("3", "Craft Fair", day(12), "c"),
            ];
            let mut reversed = records.clone();
            reversed.reverse();
            assert_eq!(dedup().dedupe(records), dedup().dedupe(reversed));
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn higher_priority_wins_and_gaps_are_filled() {
            let low = EventRecord::new("low", "Fall Festival 2024", at(12, 14, 0), "blog")
                .with_description("Hayrides, cider and a corn maze")
                .with_url("https://blog.example/fest")
                .with_tag(CategoryTag::Family);
            let high = EventRecord::new("high", "Fall Festival", at(12, 14, 0), "city")
                .with_priority(10)
                .with_location("Market Square")
                .with_tag(CategoryTag::Adult);

            let merged = merge(low, high);
            assert_eq!(merged.id, "high");
            assert_eq!(merged.title, "Fall Festival");
            assert_eq!(merged.location.as_deref(), Some("Market Square"));
            assert_eq!(merged.url.as_deref(), Some("https://blog.example/fest"));
            assert!(merged.description.is_some());
            assert_eq!(
                merged.tags,
                BTreeSet::from([CategoryTag::Family, CategoryTag::Adult])
            );
        }

        #[test]
        fn completeness_breaks_priority_ties() {
            let sparse = EventRecord::new("s", "Fall Festival", day(12), "a");
            let rich = EventRecord::new("r", "Fall Festival", at(12, 14, 0), "b")
                .with_end(at(12, 18, 0))
                .with_location("Market Square");
            assert_eq!(merge(sparse.clone(), rich.clone()).id, "r");
            assert_eq!(merge(rich, sparse).id, "r");
        }

        #[test]
        fn precise_start_replaces_all_day() {
            let primary = EventRecord::new("p", "Fall Festival", day(12), "a")
                .with_priority(1)
                .with_description("Long description wins priority");
            let timed = EventRecord::new("t", "Fall Festival", at(12, 14, 0), "b")
                .with_end(at(12, 18, 0));
            let merged = merge(primary, timed);
            assert_eq!(merged.id, "p");
            assert_eq!(merged.start, at(12, 14, 0));
            assert_eq!(merged.end, Some(at(12, 18, 0)));
        }
    }
}

//! Rule-based event classification.
//!
//! A [`Classifier`] is built from an ordered list of [`ClassifierRule`]s. Every
//! rule whose keywords or patterns match an event's title and description
//! contributes its tag; the result is a sorted set, so rule order never changes
//! the outcome. A weekday heuristic ("every Tuesday", "weekly ... Fridays")
//! contributes `recurring`, and an optional default tag is applied only when
//! nothing else matched.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::event::{CategoryTag, EventRecord};

static WEEKDAY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(mon|tues|wednes|thurs|fri|satur|sun)days?\b").expect("Invalid weekday regex")
});

static REPEAT_WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(every|weekly)\b").expect("Invalid repeat word regex"));

/// Errors raised while compiling classifier rules.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A rule pattern is not a valid regular expression.
    #[error("invalid pattern {pattern:?} for tag {tag}: {source}")]
    InvalidPattern {
        tag: CategoryTag,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRule {
    /// Tag contributed when the rule matches.
    pub tag: CategoryTag,
    /// Phrases matched case-insensitively on word boundaries.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Case-insensitive regular expressions.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl ClassifierRule {
    /// Creates a keyword rule.
    pub fn keywords(tag: CategoryTag, keywords: &[&str]) -> Self {
        Self {
            tag,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            patterns: Vec::new(),
        }
    }

    /// Builder method to add regular expression patterns.
    pub fn with_patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns.extend(patterns.iter().map(|p| p.to_string()));
        self
    }
}

/// Classifier settings, usually read from the `[classify]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Ordered rules; the built-in set is used when empty.
    pub rules: Vec<ClassifierRule>,
    /// Tag applied when no rule matched. Unset means untagged.
    pub default_tag: Option<CategoryTag>,
    /// Whether "every"/"weekly" next to a weekday marks an event recurring.
    pub weekday_heuristic: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_tag: None,
            weekday_heuristic: true,
        }
    }
}

/// The rules used when configuration provides none.
pub fn builtin_rules() -> Vec<ClassifierRule> {
    vec![
        ClassifierRule::keywords(
            CategoryTag::Recurring,
            &[
                "weekly",
                "every week",
                "each week",
                "biweekly",
                "bi-weekly",
                "monthly",
                "every month",
                "recurring",
            ],
        )
        .with_patterns(&[
            r"\bevery\s+(mon|tues|wednes|thurs|fri|satur|sun)day",
            r"\b(first|second|third|fourth|last)\s+(mon|tues|wednes|thurs|fri|satur|sun)day\s+of\s+(each|every)\s+month",
        ]),
        ClassifierRule::keywords(
            CategoryTag::Family,
            &[
                "family",
                "families",
                "kid",
                "kids",
                "child",
                "children",
                "toddler",
                "toddlers",
                "baby",
                "babies",
                "preschool",
                "story time",
                "storytime",
                "all ages",
                "youth",
                "teen",
                "teens",
                "puppet",
                "petting zoo",
                "trick-or-treat",
                "egg hunt",
                "camp",
            ],
        ),
        ClassifierRule::keywords(
            CategoryTag::Adult,
            &[
                "happy hour",
                "brew",
                "brewery",
                "brewing",
                "beer",
                "wine",
                "winery",
                "cocktail",
                "cocktails",
                "distillery",
                "tasting",
                "pub",
                "bar crawl",
                "21+",
                "adults",
                "adults only",
                "nightlife",
                "comedy",
                "burlesque",
            ],
        ),
    ]
}

#[derive(Debug)]
struct CompiledRule {
    tag: CategoryTag,
    matchers: Vec<Regex>,
}

impl CompiledRule {
    fn compile(rule: &ClassifierRule) -> Result<Self, ClassifyError> {
        let mut matchers = Vec::new();

        let keywords: Vec<String> = rule
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if !keywords.is_empty() {
            let pattern = format!(
                r"(?:^|[^\p{{L}}\p{{N}}_])(?:{})(?:$|[^\p{{L}}\p{{N}}_])",
                keywords.join("|")
            );
            matchers.push(case_insensitive(&pattern).map_err(|source| {
                ClassifyError::InvalidPattern {
                    tag: rule.tag,
                    pattern: pattern.clone(),
                    source,
                }
            })?);
        }

        for pattern in &rule.patterns {
            matchers.push(case_insensitive(pattern).map_err(|source| {
                ClassifyError::InvalidPattern {
                    tag: rule.tag,
                    pattern: pattern.clone(),
                    source,
                }
            })?);
        }

        Ok(Self {
            tag: rule.tag,
            matchers,
        })
    }

    fn matches(&self, text: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(text))
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Assigns category tags to event records.
#[derive(Debug)]
pub struct Classifier {
    rules: Vec<CompiledRule>,
    default_tag: Option<CategoryTag>,
    weekday_heuristic: bool,
}

impl Classifier {
    /// Compiles a classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any rule pattern is not a valid regular expression.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let builtin;
        let rules = if config.rules.is_empty() {
            builtin = builtin_rules();
            &builtin
        } else {
            &config.rules
        };

        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            default_tag: config.default_tag,
            weekday_heuristic: config.weekday_heuristic,
        })
    }

    /// Classifies free text.
    pub fn classify_text(&self, text: &str) -> BTreeSet<CategoryTag> {
        let mut tags: BTreeSet<CategoryTag> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(text))
            .map(|rule| rule.tag)
            .collect();

        if self.weekday_heuristic && WEEKDAY_REGEX.is_match(text) && REPEAT_WORD_REGEX.is_match(text)
        {
            tags.insert(CategoryTag::Recurring);
        }

        if tags.is_empty()
            && let Some(tag) = self.default_tag
        {
            tags.insert(tag);
        }

        tags
    }

    /// Classifies a record from its title and description.
    pub fn classify(&self, record: &EventRecord) -> BTreeSet<CategoryTag> {
        self.classify_text(&record.classification_text())
    }

    /// Tags every record in place.
    pub fn tag_all(&self, records: &mut [EventRecord]) {
        for record in records.iter_mut() {
            let tags = self.classify(record);
            debug!(title = %record.title, tags = ?tags, "Classified event");
            record.tags.extend(tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::EventTime;
    use chrono::{TimeZone, Utc};

    fn classifier() -> Classifier {
        Classifier::new(&ClassifierConfig {
            default_tag: Some(CategoryTag::Adult),
            ..ClassifierConfig::default()
        })
        .unwrap()
    }

    fn tags(list: &[CategoryTag]) -> BTreeSet<CategoryTag> {
        list.iter().copied().collect()
    }

    mod builtin {
        use super::*;

        #[test]
        fn family_fun_day() {
            assert_eq!(
                classifier().classify_text("Family Fun Day at the Farm"),
                tags(&[CategoryTag::Family])
            );
        }

        #[test]
        fn happy_hour() {
            assert_eq!(
                classifier().classify_text("Happy Hour at Brew Co."),
                tags(&[CategoryTag::Adult])
            );
        }

        #[test]
        fn weekly_trivia() {
            assert_eq!(
                classifier().classify_text("Every Tuesday Trivia Night"),
                tags(&[CategoryTag::Recurring])
            );
        }

        #[test]
        fn multiple_rules_contribute() {
            assert_eq!(
                classifier().classify_text("Weekly family story time with a wine social for parents"),
                tags(&[CategoryTag::Adult, CategoryTag::Family, CategoryTag::Recurring])
            );
        }

        #[test]
        fn keywords_respect_word_boundaries() {
            // "kid" inside "kidney" and "bar" inside "barbecue" must not match
            let c = Classifier::new(&ClassifierConfig::default()).unwrap();
            assert!(c.classify_text("Kidney health seminar").is_empty());
            assert_eq!(c.classify_text("Ages 21+ only"), tags(&[CategoryTag::Adult]));
        }

        #[test]
        fn default_tag_applies_only_without_matches() {
            assert_eq!(
                classifier().classify_text("Town council meeting"),
                tags(&[CategoryTag::Adult])
            );
        }

        #[test]
        fn no_default_tag_unless_configured() {
            let c = Classifier::new(&ClassifierConfig::default()).unwrap();
            assert!(c.classify_text("Town council meeting").is_empty());
        }

        #[test]
        fn deterministic() {
            let c = classifier();
            let text = "Kids craft hour every Saturday at the library";
            let first = c.classify_text(text);
            for _ in 0..5 {
                assert_eq!(c.classify_text(text), first);
            }
            assert_eq!(first, tags(&[CategoryTag::Family, CategoryTag::Recurring]));
        }
    }

    mod configured {
        use super::*;

        #[test]
        fn custom_rules_replace_builtin() {
            let config = ClassifierConfig {
                rules: vec![
                    ClassifierRule::keywords(CategoryTag::Family, &["scouts"]),
                    ClassifierRule::keywords(CategoryTag::Adult, &[]).with_patterns(&[r"\bipa\b"]),
                ],
                default_tag: None,
                weekday_heuristic: false,
            };
            let c = Classifier::new(&config).unwrap();
            assert_eq!(c.classify_text("Scouts jamboree"), tags(&[CategoryTag::Family]));
            assert_eq!(c.classify_text("Hazy IPA release"), tags(&[CategoryTag::Adult]));
            assert!(c.classify_text("Family picnic every Sunday").is_empty());
        }

        #[test]
        fn invalid_pattern_is_reported() {
            let config = ClassifierConfig {
                rules: vec![ClassifierRule::keywords(CategoryTag::Adult, &[]).with_patterns(&["(unclosed"])],
                ..ClassifierConfig::default()
            };
            let err = Classifier::new(&config).unwrap_err();
            assert!(err.to_string().contains("(unclosed"));
        }

        #[test]
        fn rules_deserialize_from_toml_shape() {
            let json = r#"{"rules":[{"tag":"recurring","keywords":["open mic"]}],"default_tag":null}"#;
            let config: ClassifierConfig = serde_json::from_str(json).unwrap();
            assert_eq!(config.rules[0].tag, CategoryTag::Recurring);
            assert!(config.default_tag.is_none());
            assert!(config.weekday_heuristic);
        }
    }

    #[test]
    fn tag_all_uses_title_and_description() {
        let start = EventTime::from_utc(Utc.with_ymd_and_hms(2025, 10, 4, 14, 0, 0).unwrap());
        let mut records = vec![
            EventRecord::new("a", "Saturday Market", start, "src")
                .with_description("Fun for kids of all ages"),
            EventRecord::new("b", "Tasting Flight", start, "src"),
        ];
        classifier().tag_all(&mut records);
        assert_eq!(records[0].tags, tags(&[CategoryTag::Family]));
        assert_eq!(records[1].tags, tags(&[CategoryTag::Adult]));
    }
}

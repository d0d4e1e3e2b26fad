//! Ranking discovered peripherals by how likely they are to be a TV.
//!
//! Scoring is a declarative table of `(condition, bonus)` rules evaluated
//! uniformly against a [`PeripheralRecord`]; a record's score is the sum of
//! the bonuses of every rule it matches. The default table favors strong
//! signals, named devices and names that look like TV platforms, and
//! penalizes phones, wearables and input devices.
//!
//! # Example
//!
//! ```
//! use time::OffsetDateTime;
//! use tvremote_core::scoring::{self, RankOptions};
//! use tvremote_types::{PeripheralRecord, Sighting};
//!
//! let now = OffsetDateTime::now_utc();
//! let tv = PeripheralRecord::from_sighting(
//!     Sighting::new("AA:BB:CC:DD:EE:01", Some("Android TV".into()), Some(-45)),
//!     now,
//!     1,
//! );
//! let unknown = PeripheralRecord::from_sighting(
//!     Sighting::new("AA:BB:CC:DD:EE:02", None, Some(-90)),
//!     now,
//!     1,
//! );
//!
//! assert_eq!(scoring::score(&tv), 170);
//! assert_eq!(scoring::score(&unknown), 0);
//!
//! let ranked = scoring::rank(&[tv, unknown], false);
//! assert_eq!(ranked.len(), 1);
//! assert!(ranked[0].is_likely_target);
//! ```

use std::cmp::Ordering;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use tvremote_types::PeripheralRecord;

/// Default cap on the number of ranked results.
pub const DEFAULT_RANK_LIMIT: usize = 50;

/// Name fragments used by TV platforms and streaming boxes.
pub const TV_INDICATORS: &[&str] = &[
    "android tv",
    "google tv",
    "chromecast",
    "shield",
    "mi box",
    "fire tv",
    "roku",
    "smart tv",
    "tv box",
    "kodi",
    "media player",
    "streaming",
];

/// Manufacturers that make TVs or TV boxes.
pub const BRANDS: &[&str] = &[
    "google", "android", "nvidia", "xiaomi", "samsung", "lg", "sony", "tcl",
];

/// Name fragments of devices that are certainly not TVs.
pub const NEGATIVE_INDICATORS: &[&str] = &[
    "phone",
    "headphone",
    "earbud",
    "watch",
    "fitness",
    "mouse",
    "keyboard",
    "tablet",
];

/// A case-insensitive keyword list matched against device names.
///
/// Keywords shorter than three characters only match whole words, so `lg`
/// matches "LG OLED" but not "Bulgarian Radio".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Build a keyword set; keywords are lowercased.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    /// Whether any keyword occurs in `name_lower` (already lowercased).
    pub fn matches(&self, name_lower: &str) -> bool {
        self.0.iter().any(|keyword| {
            if keyword.chars().count() < 3 {
                name_lower
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == keyword)
            } else {
                name_lower.contains(keyword.as_str())
            }
        })
    }

    /// The keywords.
    pub fn keywords(&self) -> &[String] {
        &self.0
    }
}

/// What a rule checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Best observed RSSI is `>= min` and, if set, `< below`.
    RssiInRange { min: i16, below: Option<i16> },
    /// A real name was advertised.
    NameKnown,
    /// The name contains any keyword.
    NameMatches { keywords: KeywordSet },
    /// The name contains any keyword and none of `except`.
    NameMatchesExcept {
        keywords: KeywordSet,
        except: KeywordSet,
    },
}

impl Condition {
    fn holds(&self, record: &PeripheralRecord, name_lower: Option<&str>) -> bool {
        match self {
            Condition::RssiInRange { min, below } => record
                .best_rssi()
                .is_some_and(|rssi| rssi >= *min && below.is_none_or(|b| rssi < b)),
            Condition::NameKnown => record.has_name(),
            Condition::NameMatches { keywords } => name_lower.is_some_and(|n| keywords.matches(n)),
            Condition::NameMatchesExcept { keywords, except } => {
                name_lower.is_some_and(|n| keywords.matches(n) && !except.matches(n))
            }
        }
    }
}

/// One row of the scoring table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Short label used in logs.
    pub label: String,
    /// What the rule checks.
    pub condition: Condition,
    /// Added to the score when the condition holds (may be negative).
    pub bonus: i32,
    /// A match marks the peripheral as a likely target.
    #[serde(default)]
    pub marks_target: bool,
}

impl Rule {
    /// Create a rule that does not mark targets.
    pub fn new(label: impl Into<String>, condition: Condition, bonus: i32) -> Self {
        Self {
            label: label.into(),
            condition,
            bonus,
            marks_target: false,
        }
    }

    /// Mark matching peripherals as likely targets.
    #[must_use]
    pub fn marks_target(mut self) -> Self {
        self.marks_target = true;
        self
    }
}

/// An ordered list of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringTable {
    rules: Vec<Rule>,
}

impl Default for ScoringTable {
    fn default() -> Self {
        let tv = KeywordSet::new(TV_INDICATORS);
        Self::with_rules(vec![
            Rule::new(
                "strong signal",
                Condition::RssiInRange {
                    min: -50,
                    below: None,
                },
                50,
            ),
            Rule::new(
                "good signal",
                Condition::RssiInRange {
                    min: -70,
                    below: Some(-50),
                },
                30,
            ),
            Rule::new(
                "fair signal",
                Condition::RssiInRange {
                    min: -85,
                    below: Some(-70),
                },
                10,
            ),
            Rule::new("named", Condition::NameKnown, 20),
            Rule::new(
                "tv indicator",
                Condition::NameMatches {
                    keywords: tv.clone(),
                },
                100,
            )
            .marks_target(),
            Rule::new(
                "tv brand",
                Condition::NameMatchesExcept {
                    keywords: KeywordSet::new(BRANDS),
                    except: tv,
                },
                25,
            ),
            Rule::new(
                "not a tv",
                Condition::NameMatches {
                    keywords: KeywordSet::new(NEGATIVE_INDICATORS),
                },
                -50,
            ),
        ])
    }
}

impl ScoringTable {
    /// Build a table from custom rules.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rules, in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules matched by `record`.
    pub fn matching<'a>(&'a self, record: &PeripheralRecord) -> impl Iterator<Item = &'a Rule> {
        let name_lower = record
            .has_name()
            .then(|| record.display_name().to_lowercase());
        self.rules
            .iter()
            .filter(move |rule| rule.condition.holds(record, name_lower.as_deref()))
    }

    /// Score `record` and decide whether it is a likely target.
    pub fn evaluate(&self, record: &PeripheralRecord) -> Evaluation {
        self.matching(record)
            .fold(Evaluation::default(), |mut acc, rule| {
                acc.score = acc.score.saturating_add(rule.bonus);
                acc.is_likely_target |= rule.marks_target;
                acc
            })
    }
}

/// Outcome of scoring one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Sum of matched bonuses.
    pub score: i32,
    /// A target-marking rule matched.
    pub is_likely_target: bool,
}

/// A scored peripheral, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPeripheral {
    /// Address to connect to.
    pub address: String,
    /// Display name (`"Unknown"` when none was advertised).
    pub name: String,
    /// Best RSSI observed.
    pub rssi: Option<i16>,
    /// Quality score.
    pub score: i32,
    /// Whether the name looks like a TV platform.
    pub is_likely_target: bool,
}

/// Options for [`QualityScorer::rank`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankOptions {
    /// Keep records scoring `<= 0`. `limit` still applies to the result.
    pub include_all: bool,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            include_all: false,
            limit: Some(DEFAULT_RANK_LIMIT),
        }
    }
}

impl RankOptions {
    /// Keep or drop non-positive scores.
    #[must_use]
    pub fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }

    /// Set the result cap (`None` for unlimited).
    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Scores and ranks peripherals with a [`ScoringTable`].
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    table: ScoringTable,
}

impl QualityScorer {
    /// Create a scorer with a custom table.
    pub fn new(table: ScoringTable) -> Self {
        Self { table }
    }

    /// The table in use.
    pub fn table(&self) -> &ScoringTable {
        &self.table
    }

    /// Score one record.
    pub fn score(&self, record: &PeripheralRecord) -> i32 {
        self.table.evaluate(record).score
    }

    /// Score, filter, sort and cap `records`.
    pub fn rank(&self, records: &[PeripheralRecord], options: &RankOptions) -> Vec<RankedPeripheral> {
        let mut ranked: Vec<RankedPeripheral> = records
            .iter()
            .map(|record| {
                let eval = self.table.evaluate(record);
                RankedPeripheral {
                    address: record.address.clone(),
                    name: record.display_name().to_string(),
                    rssi: record.best_rssi(),
                    score: eval.score,
                    is_likely_target: eval.is_likely_target,
                }
            })
            .filter(|p| options.include_all || p.score > 0)
            .collect();

        ranked.sort_by(compare_ranked);
        if let Some(limit) = options.limit {
            ranked.truncate(limit);
        }
        ranked
    }
}

/// Score descending, then RSSI descending (missing last), then name, then address.
fn compare_ranked(a: &RankedPeripheral, b: &RankedPeripheral) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.rssi, b.rssi) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.address.cmp(&b.address))
}

static DEFAULT_SCORER: LazyLock<QualityScorer> = LazyLock::new(QualityScorer::default);

/// Score a record with the default table.
pub fn score(record: &PeripheralRecord) -> i32 {
    DEFAULT_SCORER.score(record)
}

/// Rank records with the default table and result cap.
pub fn rank(records: &[PeripheralRecord], include_all: bool) -> Vec<RankedPeripheral> {
    DEFAULT_SCORER.rank(records, &RankOptions::default().include_all(include_all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use tvremote_types::Sighting;

    fn record(address: &str, name: Option<&str>, rssi: &[i16]) -> PeripheralRecord {
        let now = OffsetDateTime::now_utc();
        let mut rec = PeripheralRecord::from_sighting(
            Sighting::new(address, name.map(String::from), rssi.first().copied()),
            now,
            1,
        );
        for value in rssi.iter().skip(1) {
            rec.observe(Sighting::new(address, None, Some(*value)), now);
        }
        rec
    }

    #[test]
    fn test_rssi_tiers_are_exclusive() {
        assert_eq!(score(&record("A", None, &[-40])), 50);
        assert_eq!(score(&record("A", None, &[-50])), 50);
        assert_eq!(score(&record("A", None, &[-51])), 30);
        assert_eq!(score(&record("A", None, &[-70])), 30);
        assert_eq!(score(&record("A", None, &[-85])), 10);
        assert_eq!(score(&record("A", None, &[-86])), 0);
        assert_eq!(score(&record("A", None, &[])), 0);
    }

    #[test]
    fn test_tier_uses_best_rssi() {
        assert_eq!(score(&record("A", None, &[-90, -45, -80])), 50);
    }

    #[test]
    fn test_tv_indicator_suppresses_brand() {
        // named 20 + tv 100, the "android" brand bonus does not stack
        assert_eq!(score(&record("A", Some("Android TV"), &[])), 120);
        // named 20 + brand 25
        assert_eq!(score(&record("A", Some("Samsung Q80"), &[])), 45);
    }

    #[test]
    fn test_negative_indicator() {
        // named 20 + brand 25 - 50
        assert_eq!(score(&record("A", Some("Samsung Galaxy Watch"), &[])), -5);
        assert_eq!(score(&record("A", Some("Logitech Mouse"), &[-60])), 0);
    }

    #[test]
    fn test_short_brand_matches_whole_word_only() {
        assert_eq!(score(&record("A", Some("LG OLED55"), &[])), 45);
        assert_eq!(score(&record("A", Some("[LG] webOS"), &[])), 45);
        assert_eq!(score(&record("A", Some("Bulgaria Radio"), &[])), 20);
    }

    #[test]
    fn test_unknown_sentinel_is_not_a_name() {
        assert_eq!(score(&record("A", Some("Unknown"), &[])), 0);
    }

    #[test]
    fn test_case_insensitive() {
        let eval = ScoringTable::default().evaluate(&record("A", Some("NVIDIA SHIELD"), &[]));
        assert_eq!(eval.score, 120);
        assert!(eval.is_likely_target);
    }

    #[test]
    fn test_rank_filters_and_sorts() {
        let records = vec![
            record("03", None, &[-90]),
            record("01", Some("Living Room Chromecast"), &[-80]),
            record("02", Some("Fire TV Stick"), &[-60]),
            record("04", Some("Pixel Phone"), &[-40]),
        ];

        let ranked = rank(&records, false);
        let order: Vec<&str> = ranked.iter().map(|p| p.address.as_str()).collect();
        // 02: 30+20+100, 01: 10+20+100, 04: 50+20-50
        assert_eq!(order, vec!["02", "01", "04"]);

        let all = rank(&records, true);
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].address, "03");
        assert_eq!(all[3].name, "Unknown");
    }

    #[test]
    fn test_rank_tie_breaks() {
        let records = vec![
            record("B", Some("Roku"), &[]),
            record("A", Some("Roku"), &[]),
            record("C", Some("Kodi"), &[]),
            record("D", Some("Kodi"), &[-95]),
        ];
        let ranked = rank(&records, true);
        let order: Vec<&str> = ranked.iter().map(|p| p.address.as_str()).collect();
        // equal scores: RSSI first (missing last), then name, then address
        assert_eq!(order, vec!["D", "C", "A", "B"]);
    }

    #[test]
    fn test_rank_limit() {
        let records: Vec<_> = (0..60)
            .map(|i| record(&format!("{:02}", i), Some("Smart TV"), &[-60]))
            .collect();
        assert_eq!(rank(&records, false).len(), DEFAULT_RANK_LIMIT);

        let scorer = QualityScorer::default();
        let unlimited = scorer.rank(&records, &RankOptions::default().limit(None));
        assert_eq!(unlimited.len(), 60);
    }

    #[test]
    fn test_include_all_still_capped() {
        let records: Vec<_> = (0..60)
            .map(|i| record(&format!("{:02}", i), None, &[]))
            .collect();
        let scorer = QualityScorer::default();

        assert!(rank(&records, false).is_empty());
        let ranked = rank(&records, true);
        assert_eq!(ranked.len(), DEFAULT_RANK_LIMIT);
        assert_eq!(ranked[0].address, "00");
        assert_eq!(ranked[DEFAULT_RANK_LIMIT - 1].address, "49");

        let options = RankOptions::default().include_all(true).limit(None);
        assert_eq!(scorer.rank(&records, &options).len(), 60);
    }

    #[test]
    fn test_custom_table() {
        let table = ScoringTable::with_rules(vec![
            Rule::new(
                "bedroom",
                Condition::NameMatches {
                    keywords: KeywordSet::new(["bedroom"]),
                },
                7,
            )
            .marks_target(),
        ]);
        let scorer = QualityScorer::new(table);
        let ranked = scorer.rank(
            &[record("A", Some("Bedroom"), &[-30]), record("B", Some("Hall"), &[])],
            &RankOptions::default(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 7);
        assert!(ranked[0].is_likely_target);
    }

    #[test]
    fn test_table_serializes() {
        let json = serde_json::to_string(&ScoringTable::default()).unwrap();
        assert!(json.contains("rssi_in_range"));
        let back: ScoringTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ScoringTable::default());
    }
}

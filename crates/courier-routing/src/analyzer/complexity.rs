use crate::config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Maximum complexity score.
pub const MAX_SCORE: u8 = 100;

/// Distance from a threshold at which confidence saturates.
const CONFIDENCE_SPAN: f64 = 15.0;

/// Words that push a request towards a more capable backend.
const HIGH_COMPLEXITY_KEYWORDS: &[&str] = &[
    "algorithm",
    "analyze",
    "analyse",
    "architecture",
    "complex",
    "concurrency",
    "concurrent",
    "debug",
    "design",
    "distributed",
    "migrate",
    "optimise",
    "optimize",
    "performance",
    "prove",
    "refactor",
    "scalable",
    "security",
    "tradeoff",
    "tradeoffs",
];

/// Words typical of small requests.
const LOW_COMPLEXITY_KEYWORDS: &[&str] = &[
    "capitalize",
    "format",
    "hello",
    "hey",
    "hi",
    "reformat",
    "rename",
    "spelling",
    "thank",
    "thanks",
    "typo",
];

/// Backend capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Cheap backends for small requests
    Low,
    /// General purpose backends
    Medium,
    /// Most capable backends
    High,
}

impl Tier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown tier '{other}' (expected low, medium or high)")),
        }
    }
}

/// Outcome of classifying one request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Complexity on a 0-100 scale
    pub complexity: u8,
    /// Share of the chosen tier's capability the request uses (0.0-1.0)
    pub efficiency: f64,
    /// Distance-from-threshold confidence (0.5-1.0)
    pub confidence: f64,
    /// Cheapest tier covering the complexity
    pub tier: Tier,
    /// Human readable summary of the signals found
    pub reasoning: String,
    /// Whether the result came out of the routing cache
    #[serde(default)]
    pub from_cache: bool,
}

/// Structural signals extracted from a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Signals {
    words: usize,
    high_keywords: BTreeSet<&'static str>,
    low_keywords: BTreeSet<&'static str>,
    code_blocks: usize,
    sentences: usize,
    list_items: usize,
}

impl Signals {
    fn extract(text: &str) -> Self {
        let mut signals = Self::default();

        for token in text
            .split(|character: char| !character.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            signals.words += 1;
            let lowered = token.to_lowercase();
            if let Some(keyword) = HIGH_COMPLEXITY_KEYWORDS
                .iter()
                .find(|keyword| **keyword == lowered)
            {
                signals.high_keywords.insert(*keyword);
            }
            if let Some(keyword) = LOW_COMPLEXITY_KEYWORDS
                .iter()
                .find(|keyword| **keyword == lowered)
            {
                signals.low_keywords.insert(*keyword);
            }
        }

        signals.code_blocks = text.matches("```").count().div_ceil(2);
        signals.sentences = text
            .split(['.', '!', '?'])
            .filter(|sentence| sentence.chars().any(char::is_alphanumeric))
            .count();
        signals.list_items = text.lines().filter(|line| is_list_item(line)).count();

        signals
    }

    fn score(&self) -> u8 {
        let words = self.words.min(200) / 4;
        let keywords = (self.high_keywords.len() * 10).min(50);
        let code = (self.code_blocks * 10).min(20);
        let sentences = (self.sentences.saturating_sub(1) * 3).min(10);
        let lists = (self.list_items * 3).min(15);
        let penalty = (self.low_keywords.len() * 10).min(20);

        let total = (words + keywords + code + sentences + lists).saturating_sub(penalty);
        total.min(usize::from(MAX_SCORE)) as u8
    }

    fn describe(&self) -> String {
        let mut parts = vec![format!("{} words", self.words)];
        if !self.high_keywords.is_empty() {
            parts.push(format!(
                "complex terms: {}",
                self.high_keywords.iter().copied().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.low_keywords.is_empty() {
            parts.push(format!(
                "simple terms: {}",
                self.low_keywords.iter().copied().collect::<Vec<_>>().join(", ")
            ));
        }
        if self.code_blocks > 0 {
            parts.push(format!("{} code block(s)", self.code_blocks));
        }
        if self.sentences > 1 {
            parts.push(format!("{} sentences", self.sentences));
        }
        if self.list_items > 0 {
            parts.push(format!("{} list item(s)", self.list_items));
        }
        parts.join("; ")
    }
}

/// Canonical form of a request: lowercase, whitespace collapsed within each
/// line, blank lines dropped. Line breaks are kept since list items are read
/// per line.
///
/// Scoring and cache fingerprints both work on this form, so two texts that
/// share a fingerprint always score the same.
pub fn canonical_text(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
        return true;
    }
    let digits = trimmed
        .chars()
        .take_while(char::is_ascii_digit)
        .count();
    digits > 0 && trimmed[digits..].starts_with(['.', ')'])
}

/// Pure, offline complexity scorer.
///
/// Signals are matched on whole tokens, so appending text never removes a
/// signal already present and the score never drops when complexity terms are
/// appended.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityScorer {
    low_threshold: u8,
    high_threshold: u8,
}

impl Default for ComplexityScorer {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl ComplexityScorer {
    /// Creates a scorer with the thresholds of `config`.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
        }
    }

    /// Complexity of `text` on the 0-100 scale.
    pub fn score(&self, text: &str) -> u8 {
        Signals::extract(&canonical_text(text)).score()
    }

    /// Cheapest tier whose ceiling covers `score`. Threshold ties go to the cheaper tier.
    pub fn tier_for(&self, score: u8) -> Tier {
        if score <= self.low_threshold {
            Tier::Low
        } else if score <= self.high_threshold {
            Tier::Medium
        } else {
            Tier::High
        }
    }

    /// Share of `tier`'s ceiling a request of `score` uses.
    pub fn efficiency(&self, score: u8, tier: Tier) -> f64 {
        let ceiling = match tier {
            Tier::Low => self.low_threshold,
            Tier::Medium => self.high_threshold,
            Tier::High => MAX_SCORE,
        };
        if ceiling == 0 {
            return 1.0;
        }
        (f64::from(score) / f64::from(ceiling)).clamp(0.0, 1.0)
    }

    /// Confidence grows with the distance to the nearest threshold.
    pub fn confidence(&self, score: u8) -> f64 {
        let distance = score
            .abs_diff(self.low_threshold)
            .min(score.abs_diff(self.high_threshold));
        0.5 + 0.5 * (f64::from(distance) / CONFIDENCE_SPAN).min(1.0)
    }

    /// Scores `text` and picks its tier.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let signals = Signals::extract(&canonical_text(text));
        let complexity = signals.score();
        let tier = self.tier_for(complexity);

        ClassificationResult {
            complexity,
            efficiency: self.efficiency(complexity, tier),
            confidence: self.confidence(complexity),
            tier,
            reasoning: format!(
                "complexity {complexity} ({}) -> {tier} tier",
                signals.describe()
            ),
            from_cache: false,
        }
    }

    /// Re-targets a result at an explicitly requested tier.
    pub fn with_tier(&self, result: &ClassificationResult, tier: Tier) -> ClassificationResult {
        if result.tier == tier {
            return result.clone();
        }
        ClassificationResult {
            efficiency: self.efficiency(result.complexity, tier),
            reasoning: format!("{}; {tier} tier requested", result.reasoning),
            tier,
            ..result.clone()
        }
    }
}

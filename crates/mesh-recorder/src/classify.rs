//! Event classification.
//!
//! Classification is a pure function of the sender role, the payload and
//! a set of data tables. The tables are plain data (serializable, so they
//! can be supplied as configuration); [`Classifier`] is their compiled
//! form with the highlight patterns turned into regexes.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use mesh_types::{EventMetadata, Tier};

use crate::error::RecorderError;

/// Keywords identifying one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub name: String,
    pub keywords: Vec<String>,
}

/// A highlight label applied when `pattern` matches the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRule {
    pub tag: String,
    pub pattern: String,
}

/// Data tables driving classification.
///
/// Order matters: domain ties go to the earlier domain, and highlight
/// tags are emitted in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierTables {
    pub domains: Vec<DomainRule>,
    /// Events from a role containing one of these are always architectural
    /// (case-insensitive substring match)
    pub architect_roles: Vec<String>,
    pub architectural_keywords: Vec<String>,
    pub collaborative_keywords: Vec<String>,
    pub highlights: Vec<HighlightRule>,
    /// Domain used when no domain keyword matches
    pub default_domain: String,
    pub max_keywords: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn domain(name: &str, keywords: &[&str]) -> DomainRule {
    DomainRule {
        name: name.to_string(),
        keywords: strings(keywords),
    }
}

fn highlight(tag: &str, pattern: &str) -> HighlightRule {
    HighlightRule {
        tag: tag.to_string(),
        pattern: pattern.to_string(),
    }
}

impl Default for ClassifierTables {
    fn default() -> Self {
        Self {
            domains: vec![
                domain(
                    "photo_capture",
                    &["photo", "image", "camera", "capture", "upload", "scan"],
                ),
                domain(
                    "reconstruction",
                    &["nerf", "gaussian", "mesh", "3d model", "reconstruction", "training"],
                ),
                domain(
                    "quality_assessment",
                    &["quality", "f1 score", "artifacts", "accuracy", "validation"],
                ),
                domain(
                    "unity_integration",
                    &["unity", "gameobject", "import", "export", "lod", "material"],
                ),
                domain(
                    "token_optimization",
                    &["token", "cost", "optimization", "efficiency", "budget"],
                ),
                domain(
                    "system_architecture",
                    &["architecture", "design", "framework", "pattern", "strategy"],
                ),
                domain(
                    "agent_collaboration",
                    &["agent", "collaboration", "coordination", "handshake", "sync"],
                ),
                domain(
                    "data_management",
                    &["database", "storage", "persistence", "cache", "index"],
                ),
                domain(
                    "ui_ux",
                    &["ui", "ux", "interface", "user", "display", "interaction"],
                ),
                domain(
                    "testing_validation",
                    &["test", "validation", "qa", "benchmark", "metrics"],
                ),
            ],
            architect_roles: strings(&["architect"]),
            architectural_keywords: strings(&[
                "architecture",
                "design decision",
                "framework",
                "strategy",
                "long-term",
            ]),
            collaborative_keywords: strings(&[
                "should we",
                "what do you think",
                "consensus",
                "review needed",
            ]),
            highlights: vec![
                highlight(
                    "Status-Ready",
                    r"\b(ready|complete|done|finished|approved)\b",
                ),
                highlight(
                    "Status-Blocked",
                    r"\b(blocked|waiting|issue|problem|error)\b",
                ),
                highlight("Decision-Made", r"\b(decided|approved|finalized|confirmed)\b"),
                highlight("Question-Open", r"\?|how should|which|what if"),
                highlight("Action-Required", r"\b(todo|fixme|implement|build|create)\b"),
            ],
            default_domain: "system_architecture".to_string(),
            max_keywords: 10,
        }
    }
}

impl ClassifierTables {
    pub fn with_default_domain(mut self, domain: impl Into<String>) -> Self {
        self.default_domain = domain.into();
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledDomain {
    name: String,
    /// Keywords in normalized form
    keywords: Vec<String>,
}

/// Compiled classification tables.
#[derive(Debug, Clone)]
pub struct Classifier {
    domains: Vec<CompiledDomain>,
    architect_roles: Vec<String>,
    architectural_keywords: Vec<String>,
    collaborative_keywords: Vec<String>,
    highlights: Vec<(String, Regex)>,
    default_domain: String,
    max_keywords: usize,
}

impl Classifier {
    /// Validate and compile `tables`.
    pub fn new(tables: ClassifierTables) -> Result<Self, RecorderError> {
        if tables.default_domain.trim().is_empty() {
            return Err(RecorderError::Classifier(
                "default domain must not be empty".to_string(),
            ));
        }

        let mut domains = Vec::with_capacity(tables.domains.len());
        for rule in tables.domains {
            if rule.name.trim().is_empty() {
                return Err(RecorderError::Classifier(
                    "domain name must not be empty".to_string(),
                ));
            }
            domains.push(CompiledDomain {
                name: rule.name,
                keywords: normalize_all(&rule.keywords),
            });
        }

        let mut highlights = Vec::with_capacity(tables.highlights.len());
        for rule in tables.highlights {
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| RecorderError::Classifier(format!("{}: {e}", rule.tag)))?;
            highlights.push((rule.tag, regex));
        }

        Ok(Self {
            domains,
            architect_roles: tables
                .architect_roles
                .iter()
                .map(|r| r.trim().to_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
            architectural_keywords: normalize_all(&tables.architectural_keywords),
            collaborative_keywords: normalize_all(&tables.collaborative_keywords),
            highlights,
            default_domain: tables.default_domain,
            max_keywords: tables.max_keywords,
        })
    }

    /// Classify one event. Sequence and duplicate marking are left to the
    /// writer.
    pub fn classify(&self, role: Option<&str>, payload: &str) -> EventMetadata {
        let words = Words::new(payload);
        let domain_tag = self.domain_for(&words);
        let tier = self.tier_for(role, &words);

        let mut highlight_tags: Vec<String> = self
            .highlights
            .iter()
            .filter(|(_, regex)| regex.is_match(payload))
            .map(|(tag, _)| format!("@{tag}"))
            .collect();
        highlight_tags.push(format!("@Domain-{domain_tag}"));

        EventMetadata {
            sequence: 0,
            domain_tag,
            tier,
            highlight_tags,
            keywords: self.keywords_for(&words),
            content_hash: content_hash(payload),
            word_count: payload.split_whitespace().count(),
            char_count: payload.chars().count(),
            duplicate_of: None,
        }
    }

    fn domain_for(&self, words: &Words) -> String {
        let mut best: Option<(&str, usize)> = None;
        for domain in &self.domains {
            let score = domain.keywords.iter().filter(|kw| words.contains(kw)).count();
            // Strictly greater keeps the earliest domain on ties
            if score > 0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((&domain.name, score));
            }
        }
        best.map(|(name, _)| name.to_string())
            .unwrap_or_else(|| self.default_domain.clone())
    }

    fn tier_for(&self, role: Option<&str>, words: &Words) -> Tier {
        if let Some(role) = role {
            let role = role.to_lowercase();
            if self.architect_roles.iter().any(|r| role.contains(r.as_str())) {
                return Tier::Architectural;
            }
        }
        if self.architectural_keywords.iter().any(|kw| words.contains(kw)) {
            return Tier::Architectural;
        }
        if self.collaborative_keywords.iter().any(|kw| words.contains(kw)) {
            return Tier::Collaborative;
        }
        Tier::Execution
    }

    fn keywords_for(&self, words: &Words) -> Vec<String> {
        let mut found: Vec<String> = self
            .domains
            .iter()
            .flat_map(|d| d.keywords.iter())
            .filter(|kw| words.contains(kw))
            .cloned()
            .collect();
        found.sort();
        found.dedup();
        found.truncate(self.max_keywords);
        found
    }
}

/// Payload reduced to space-separated lowercase alphanumeric words, padded
/// so that whole-word and phrase lookups are a substring test.
struct Words(String);

impl Words {
    fn new(text: &str) -> Self {
        Words(format!(" {} ", normalize(text)))
    }

    /// Whether a normalized keyword or phrase occurs as whole words.
    fn contains(&self, keyword: &str) -> bool {
        !keyword.is_empty() && self.0.contains(&format!(" {keyword} "))
    }
}

fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| normalize(s)).collect()
}

/// SHA-256 hex digest of the payload lowercased, stripped of punctuation
/// and with whitespace collapsed.
pub fn content_hash(payload: &str) -> String {
    let stripped: String = payload
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(ClassifierTables::default()).unwrap()
    }

    #[test]
    fn test_domain_by_highest_score() {
        let meta = classifier().classify(None, "Upload the camera photo for the scan");
        assert_eq!(meta.domain_tag, "photo_capture");
        assert!(meta.highlight_tags.contains(&"@Domain-photo_capture".to_string()));
    }

    #[test]
    fn test_domain_tie_goes_to_first_in_table() {
        // reconstruction (mesh) and data_management (cache) both score 1
        let meta = classifier().classify(None, "the mesh cache is stale");
        assert_eq!(meta.domain_tag, "reconstruction");
    }

    #[test]
    fn test_default_domain_when_nothing_matches() {
        let meta = classifier().classify(None, "lunch at noon");
        assert_eq!(meta.domain_tag, "system_architecture");

        let custom = Classifier::new(ClassifierTables::default().with_default_domain("general"))
            .unwrap();
        assert_eq!(custom.classify(None, "lunch at noon").domain_tag, "general");
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        // "ui" must not match inside "build"
        let meta = classifier().classify(None, "build it");
        assert!(!meta.keywords.contains(&"ui".to_string()));
        assert_ne!(meta.domain_tag, "ui_ux");
    }

    #[test]
    fn test_multiword_keywords() {
        let meta = classifier().classify(None, "Exported a 3D model; F1-score looks fine");
        assert!(meta.keywords.contains(&"3d model".to_string()));
        assert!(meta.keywords.contains(&"f1 score".to_string()));
    }

    #[test]
    fn test_tier_from_role() {
        let c = classifier();
        assert_eq!(c.classify(Some("Architect"), "ok").tier, Tier::Architectural);
        assert_eq!(c.classify(Some("architect"), "ok").tier, Tier::Architectural);
        assert_eq!(c.classify(Some("Agent"), "ok").tier, Tier::Execution);
    }

    #[test]
    fn test_tier_from_role_substring() {
        let c = classifier();
        assert_eq!(c.classify(Some("Lead Architect"), "ok").tier, Tier::Architectural);
        assert_eq!(c.classify(Some("system_architect"), "ok").tier, Tier::Architectural);
        assert_eq!(c.classify(Some("ARCHITECTURE-REVIEWER"), "ok").tier, Tier::Architectural);
        assert_eq!(c.classify(Some("arch"), "ok").tier, Tier::Execution);
    }

    #[test]
    fn test_tier_from_keywords() {
        let c = classifier();
        assert_eq!(
            c.classify(None, "This is a long-term strategy").tier,
            Tier::Architectural
        );
        assert_eq!(
            c.classify(None, "Should we merge today?").tier,
            Tier::Collaborative
        );
        assert_eq!(c.classify(None, "Merged.").tier, Tier::Execution);
        // Architectural wins over collaborative
        assert_eq!(
            c.classify(None, "What do you think of the framework?").tier,
            Tier::Architectural
        );
    }

    #[test]
    fn test_highlight_tags_in_table_order() {
        let meta = classifier().classify(None, "Blocked on the upload, how should we proceed?");
        assert_eq!(
            meta.highlight_tags,
            vec![
                "@Status-Blocked".to_string(),
                "@Question-Open".to_string(),
                "@Domain-photo_capture".to_string(),
            ]
        );
    }

    #[test]
    fn test_domain_tag_always_present() {
        let meta = classifier().classify(None, "");
        assert_eq!(meta.highlight_tags, vec!["@Domain-system_architecture".to_string()]);
        assert_eq!(meta.word_count, 0);
        assert_eq!(meta.char_count, 0);
    }

    #[test]
    fn test_keywords_sorted_and_capped() {
        let payload = "photo image camera capture upload scan nerf gaussian mesh \
                       unity token cost agent sync database";
        let meta = classifier().classify(None, payload);
        assert_eq!(meta.keywords.len(), 10);
        let mut sorted = meta.keywords.clone();
        sorted.sort();
        assert_eq!(meta.keywords, sorted);
    }

    #[test]
    fn test_content_hash_normalization() {
        assert_eq!(
            content_hash("Ready  for REVIEW!"),
            content_hash("ready for review")
        );
        assert_ne!(content_hash("ready for review"), content_hash("ready for merge"));
        assert_eq!(content_hash("x").len(), 64);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        let a = c.classify(Some("Agent"), "Decided: implement the cache index today");
        let b = c.classify(Some("Agent"), "Decided: implement the cache index today");
        assert_eq!(a, b);
        assert_eq!(a.word_count, 6);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut tables = ClassifierTables::default();
        tables.highlights.push(highlight("Broken", "(unclosed"));
        assert!(matches!(
            Classifier::new(tables),
            Err(RecorderError::Classifier(_))
        ));
    }
}

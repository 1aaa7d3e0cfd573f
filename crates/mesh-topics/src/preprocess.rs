//! Thread text cleaning.
//!
//! Strips structural noise before vectorizing: ISO timestamps, UUIDs,
//! anything that is not a letter, short tokens, English stop words and a
//! list of words that show up in almost every agent payload.

use regex::Regex;

use crate::error::TopicsError;

/// Frequent in agent payloads but useless for telling topics apart.
const STRUCTURAL_STOP_WORDS: &[&str] = &[
    "message",
    "consolidated",
    "true",
    "original_count",
    "time_window",
    "keywords",
    "contextid",
    "updatedat",
    "phases",
    "timestamp",
    "phase",
    "data",
    "length",
    "domain",
    "confidence",
    "commandcount",
    "routing",
    "lease",
    "context",
    "activated",
    "manager",
];

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "ain", "all", "also", "am", "an", "and",
    "any", "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "couldn", "did", "didn", "do", "does",
    "doesn", "doing", "don", "down", "during", "each", "else", "every", "few", "for", "from",
    "further", "had", "hadn", "has", "hasn", "have", "haven", "having", "he", "her", "here",
    "hers", "herself", "him", "himself", "his", "how", "if", "in", "into", "is", "isn", "it",
    "its", "itself", "just", "let", "ll", "me", "might", "more", "most", "must", "mustn", "my",
    "myself", "needn", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or",
    "other", "our", "ours", "ourselves", "out", "over", "own", "same", "shall", "shan", "she",
    "should", "shouldn", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "wasn", "we", "were", "weren", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "won", "would", "wouldn",
    "you", "your", "yours", "yourself", "yourselves",
];

const MIN_TOKEN_CHARS: usize = 3;

/// Compiled cleaning rules.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    timestamp: Regex,
    uuid: Regex,
    non_letters: Regex,
}

impl Preprocessor {
    pub fn new() -> Result<Self, TopicsError> {
        Ok(Self {
            timestamp: Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+Z?")?,
            uuid: Regex::new(
                r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
            )?,
            non_letters: Regex::new(r"[^a-zA-Z\s]")?,
        })
    }

    /// Tokens of `text` that survive cleaning, in order.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let text = self.timestamp.replace_all(text, "");
        let text = self.uuid.replace_all(&text, "");
        let text = self.non_letters.replace_all(&text, "").to_lowercase();

        text.split_whitespace()
            .filter(|word| word.len() >= MIN_TOKEN_CHARS)
            .filter(|word| !is_stop_word(word))
            .map(String::from)
            .collect()
    }
}

fn is_stop_word(word: &str) -> bool {
    STRUCTURAL_STOP_WORDS.contains(&word) || ENGLISH_STOP_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_timestamps_and_uuids() {
        let p = Preprocessor::new().unwrap();
        let tokens = p.tokens(
            "Mesh ready at 2025-10-15T22:07:49.2368354Z for job \
             3F2504E0-4F89-11D3-9A0C-0305E82C3301 gaussian",
        );
        assert_eq!(tokens, vec!["mesh", "ready", "job", "gaussian"]);
    }

    #[test]
    fn test_letters_only_and_short_tokens_dropped() {
        let p = Preprocessor::new().unwrap();
        assert_eq!(p.tokens("F1-score: 0.93 ok!"), vec!["fscore"]);
    }

    #[test]
    fn test_stop_words_removed() {
        let p = Preprocessor::new().unwrap();
        let tokens = p.tokens("The routing manager should update the unity importer");
        assert_eq!(tokens, vec!["update", "unity", "importer"]);
    }
}

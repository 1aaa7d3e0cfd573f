//! TF-IDF document vectors.
//!
//! Each document is a token list. Weights are raw term counts times the
//! smoothed IDF `ln((n + 1) / (df + 1)) + 1`, rows L2-normalized. The
//! vocabulary is sorted so that column order never depends on hashing.

use std::collections::{BTreeMap, HashSet};

/// Dense document-term matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TfIdfMatrix {
    /// Column terms, sorted
    pub vocabulary: Vec<String>,
    /// One row per document
    pub rows: Vec<Vec<f64>>,
}

impl TfIdfMatrix {
    /// Vectorize `documents`.
    ///
    /// Terms found in fewer than `min_df` documents, or in more than
    /// `max_df_ratio` of them, are left out of the vocabulary.
    pub fn build(documents: &[Vec<String>], min_df: usize, max_df_ratio: f64) -> Self {
        let n = documents.len();

        let mut doc_frequencies: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in documents {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                *doc_frequencies.entry(term).or_insert(0) += 1;
            }
        }

        let max_df = max_df_ratio * n as f64;
        let kept: Vec<(&str, usize)> = doc_frequencies
            .into_iter()
            .filter(|(_, df)| *df >= min_df.max(1) && (*df as f64) <= max_df)
            .collect();

        let column: BTreeMap<&str, usize> = kept
            .iter()
            .enumerate()
            .map(|(i, (term, _))| (*term, i))
            .collect();
        let idf: Vec<f64> = kept
            .iter()
            .map(|(_, df)| ((n as f64 + 1.0) / (*df as f64 + 1.0)).ln() + 1.0)
            .collect();

        let rows = documents
            .iter()
            .map(|doc| {
                let mut row = vec![0.0; kept.len()];
                for term in doc {
                    if let Some(&j) = column.get(term.as_str()) {
                        row[j] += 1.0;
                    }
                }
                for (weight, idf) in row.iter_mut().zip(&idf) {
                    *weight *= idf;
                }
                normalize(&mut row);
                row
            })
            .collect();

        Self {
            vocabulary: kept.into_iter().map(|(term, _)| term.to_string()).collect(),
            rows,
        }
    }

    /// Whether document `i` has no weight on any kept term.
    pub fn is_empty_row(&self, i: usize) -> bool {
        self.rows
            .get(i)
            .map_or(true, |row| row.iter().all(|w| *w == 0.0))
    }
}

fn normalize(row: &mut [f64]) {
    let norm = row.iter().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in row.iter_mut() {
            *w /= norm;
        }
    }
}

//! Superthread clustering.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use mesh_threads::read_threads;
use mesh_types::{ClusterSettings, Superthread, Thread};
use tracing::{debug, info};

use crate::error::TopicsError;
use crate::nmf::Nmf;
use crate::preprocess::Preprocessor;
use crate::tfidf::TfIdfMatrix;

/// Counters and exclusions for one clustering run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterReport {
    pub threads_in: usize,
    pub clustered: usize,
    /// Ids of threads with no usable terms left after cleaning
    pub excluded: Vec<String>,
    /// Non-empty superthreads produced
    pub topics: usize,
    pub vocabulary_size: usize,
    pub iterations: usize,
    /// Unreadable lines in the thread input
    pub malformed_lines: usize,
}

/// Groups threads into at most `k` named superthreads.
#[derive(Debug, Clone)]
pub struct Clusterer {
    settings: ClusterSettings,
    preprocessor: Preprocessor,
}

impl Clusterer {
    pub fn new(settings: ClusterSettings) -> Result<Self, TopicsError> {
        settings.validate().map_err(TopicsError::InvalidSettings)?;
        Ok(Self {
            settings,
            preprocessor: Preprocessor::new()?,
        })
    }

    /// Assign every thread to exactly one superthread, or exclude it when
    /// its text vectorizes to nothing.
    ///
    /// Superthreads are returned in topic order; empty topics are omitted.
    pub fn cluster(&self, threads: Vec<Thread>) -> (Vec<Superthread>, ClusterReport) {
        let mut report = ClusterReport {
            threads_in: threads.len(),
            ..Default::default()
        };

        let documents: Vec<Vec<String>> = threads
            .iter()
            .map(|t| self.preprocessor.tokens(&t.text()))
            .collect();
        let matrix = TfIdfMatrix::build(
            &documents,
            self.settings.min_df,
            self.settings.max_df_ratio,
        );
        report.vocabulary_size = matrix.vocabulary.len();

        let mut included = Vec::new();
        let mut rows = Vec::new();
        for (i, thread) in threads.into_iter().enumerate() {
            if matrix.is_empty_row(i) {
                debug!(thread_id = %thread.thread_id, "Thread has no usable terms");
                report.excluded.push(thread.thread_id);
            } else {
                rows.push(matrix.rows[i].clone());
                included.push(thread);
            }
        }
        if included.is_empty() {
            return (Vec::new(), report);
        }

        let factorization =
            Nmf::new(self.settings.k, self.settings.max_iterations, self.settings.seed)
                .factorize(&rows);
        report.iterations = factorization.iterations;

        let mut members: BTreeMap<usize, Vec<Thread>> = BTreeMap::new();
        for (thread, weights) in included.into_iter().zip(&factorization.w) {
            members.entry(argmax(weights)).or_default().push(thread);
        }

        let superthreads: Vec<Superthread> = members
            .into_iter()
            .map(|(topic, member_threads)| Superthread {
                name: topic_name(
                    topic,
                    &factorization.h[topic],
                    &matrix.vocabulary,
                    self.settings.top_terms,
                ),
                member_threads,
            })
            .collect();

        report.clustered = superthreads.iter().map(|s| s.member_threads.len()).sum();
        report.topics = superthreads.len();
        (superthreads, report)
    }

    /// Read threads from `input`, cluster, and write the superthread map to
    /// `output` plus the excluded ids to `<output>.excluded.json`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<ClusterReport, TopicsError> {
        let (threads, malformed) = read_threads(input)?;
        let (superthreads, mut report) = self.cluster(threads);
        report.malformed_lines = malformed;

        let map: BTreeMap<&str, &Vec<Thread>> = superthreads
            .iter()
            .map(|s| (s.name.as_str(), &s.member_threads))
            .collect();
        write_json(output, &serde_json::to_vec_pretty(&map)?)?;
        write_json(
            &excluded_path(output),
            &serde_json::to_vec_pretty(&report.excluded)?,
        )?;

        info!(
            input = %input.display(),
            output = %output.display(),
            threads = report.threads_in,
            topics = report.topics,
            excluded = report.excluded.len(),
            "Clustering complete"
        );
        Ok(report)
    }
}

/// Sibling file holding the ids of excluded threads.
pub fn excluded_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "superthreads.json".to_string());
    output.with_file_name(format!("{name}.excluded.json"))
}

/// Index of the largest weight; lowest index wins ties.
fn argmax(weights: &[f64]) -> usize {
    let mut best = 0;
    for (i, w) in weights.iter().enumerate() {
        if *w > weights[best] {
            best = i;
        }
    }
    best
}

/// `Topic <n>: w1, w2, ...` from the heaviest terms of one component.
fn topic_name(topic: usize, weights: &[f64], vocabulary: &[String], top_terms: usize) -> String {
    let mut ranked: Vec<(usize, f64)> = weights
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, w)| *w > 0.0)
        .collect();
    // Stable sort keeps vocabulary order among equal weights
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let words: Vec<&str> = ranked
        .into_iter()
        .take(top_terms)
        .filter_map(|(j, _)| vocabulary.get(j).map(String::as_str))
        .collect();
    format!("Topic {}: {}", topic + 1, words.join(", "))
}

fn write_json(path: &Path, bytes: &[u8]) -> Result<(), TopicsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{name}.tmp"));
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

//! # mesh-topics
//!
//! Clusters reconstructed threads into named superthreads.
//!
//! Thread text is cleaned, vectorized with TF-IDF and factorized with
//! NMF; each thread joins the topic with its largest weight. Threads whose
//! text leaves no usable terms are reported as excluded rather than
//! forced into a topic. This stage only reads thread output and can be
//! rerun with a different `k` at any time.

pub mod cluster;
pub mod error;
pub mod nmf;
pub mod preprocess;
pub mod tfidf;

pub use cluster::{excluded_path, ClusterReport, Clusterer};
pub use error::TopicsError;
pub use nmf::{Factorization, Nmf};
pub use preprocess::Preprocessor;
pub use tfidf::TfIdfMatrix;

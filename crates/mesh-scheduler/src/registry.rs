//! Run-state bookkeeping for registered jobs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    /// Nothing to do, or the previous run was still active
    Skipped(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct JobStatus {
    pub(crate) is_running: bool,
    pub(crate) run_count: u64,
    pub(crate) error_count: u64,
    pub(crate) skip_count: u64,
    pub(crate) last_result: Option<JobResult>,
}

/// Tracks which jobs are mid-run so shutdown can wait for them.
#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a job, replacing any previous entry with the same name.
    pub(crate) fn register(&self, job_name: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job_name.to_string(), JobStatus::default());
    }

    pub(crate) fn record_start(&self, job_name: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = jobs.get_mut(job_name) {
            status.is_running = true;
        }
    }

    /// Record the outcome of a run and clear the running flag.
    ///
    /// A `Skipped` result counts toward `skip_count` rather than `run_count`.
    pub(crate) fn record_complete(&self, job_name: &str, result: JobResult) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = jobs.get_mut(job_name) {
            status.is_running = false;
            match &result {
                JobResult::Success => status.run_count += 1,
                JobResult::Failed(_) => {
                    status.run_count += 1;
                    status.error_count += 1;
                }
                JobResult::Skipped(_) => status.skip_count += 1,
            }
            status.last_result = Some(result);
        }
    }

    /// Record a tick dropped because the previous run is still active.
    ///
    /// Leaves the running flag of the active run untouched.
    pub(crate) fn record_overlap(&self, job_name: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = jobs.get_mut(job_name) {
            status.skip_count += 1;
            status.last_result = Some(JobResult::Skipped("previous run still active".into()));
        }
    }

    /// Whether any registered job is mid-run.
    pub(crate) fn any_running(&self) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|s| s.is_running)
    }

    pub(crate) fn job_count(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub(crate) fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let registry = JobRegistry::new();
        registry.register("checkpoint");

        let status = registry.get_status("checkpoint").unwrap();
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running);
        assert_eq!(registry.job_count(), 1);
    }

    #[test]
    fn test_running_flag_tracks_start_and_complete() {
        let registry = JobRegistry::new();
        registry.register("checkpoint");
        registry.register("cleanup");
        assert!(!registry.any_running());

        registry.record_start("checkpoint");
        assert!(registry.any_running());

        registry.record_complete("checkpoint", JobResult::Success);
        assert!(!registry.any_running());
    }

    #[test]
    fn test_record_failure() {
        let registry = JobRegistry::new();
        registry.register("checkpoint");
        registry.record_start("checkpoint");
        registry.record_complete("checkpoint", JobResult::Failed("disk full".into()));

        let status = registry.get_status("checkpoint").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 1);
    }

    #[test]
    fn test_overlap_does_not_clear_running_flag() {
        let registry = JobRegistry::new();
        registry.register("checkpoint");
        registry.record_start("checkpoint");

        registry.record_overlap("checkpoint");

        let status = registry.get_status("checkpoint").unwrap();
        assert!(status.is_running);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.run_count, 0);
        assert!(registry.any_running());
    }

    #[test]
    fn test_skipped_result_counts_as_skip() {
        let registry = JobRegistry::new();
        registry.register("checkpoint");
        registry.record_start("checkpoint");
        registry.record_complete("checkpoint", JobResult::Skipped("no new events".into()));

        let status = registry.get_status("checkpoint").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.run_count, 0);
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let registry = JobRegistry::new();
        registry.record_start("missing");
        registry.record_complete("missing", JobResult::Success);
        assert!(registry.get_status("missing").is_none());
        assert!(!registry.any_running());
        assert_eq!(registry.job_count(), 0);
    }
}

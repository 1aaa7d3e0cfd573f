//! Scheduler service wrapper around tokio-cron-scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::overlap::OverlapGuard;
use crate::registry::{JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression (sec min hour day-of-month month day-of-week).
///
/// ```
/// use mesh_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 */5 * * * *").is_ok());
/// assert!(validate_cron_expression("every five minutes").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{expr}': {e}")))
}

/// Owns the job scheduler, its registry and the shutdown token handed to jobs.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create the service. Jobs run only after [`start`](Self::start).
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;

        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Cancel the shared token, wait up to the grace period for running
    /// jobs to finish, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_grace_ms);
        while self.registry.any_running() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if self.registry.any_running() {
            warn!("Jobs still running after shutdown grace period");
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Run `job_fn` every `interval`, first run one interval after start.
    pub async fn add_interval_job<F, Fut>(
        &self,
        name: &str,
        interval: Duration,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(format!(
                "job '{name}' needs a non-zero interval"
            )));
        }

        let schedule = format!("every {}s", interval.as_secs_f64());
        self.registry.register(name);

        let run = self.tracked(name, job_fn);
        let job = Job::new_repeated_async(interval, move |_uuid, _lock| run())?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, schedule = %schedule, "Job registered");
        Ok(uuid)
    }

    /// Run `job_fn` on a cron schedule in `timezone` (or the configured default).
    pub async fn add_cron_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let tz: Tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        self.registry.register(name);

        let run = self.tracked(name, job_fn);
        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| run())
            .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }

    /// Wrap `job_fn` with overlap prevention and registry bookkeeping.
    fn tracked<F, Fut>(
        &self,
        name: &str,
        job_fn: F,
    ) -> impl Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let name = name.to_string();
        let registry = self.registry.clone();
        let token = self.shutdown_token.clone();
        let guard = OverlapGuard::new();

        move || {
            let name = name.clone();
            let registry = registry.clone();
            let token = token.clone();
            let guard = guard.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                if token.is_cancelled() {
                    return;
                }
                let Some(_run) = guard.try_acquire() else {
                    debug!(job = %name, "Previous run still active, skipping tick");
                    registry.record_overlap(&name);
                    return;
                };

                registry.record_start(&name);
                let start = Instant::now();
                let result = job_fn(token).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    JobResult::Success => debug!(job = %name, duration_ms, "Job completed"),
                    JobResult::Skipped(reason) => debug!(job = %name, %reason, "Job skipped"),
                    JobResult::Failed(error) => warn!(job = %name, duration_ms, %error, "Job failed"),
                }
                registry.record_complete(&name, result);
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_grace_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_stop() {
        let mut scheduler = SchedulerService::new(fast_config()).await.unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        let token = scheduler.shutdown_token();
        scheduler.shutdown().await.unwrap();
        assert!(token.is_cancelled());
        assert!(!scheduler.is_running());
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interval_job_runs_and_is_recorded() {
        let mut scheduler = SchedulerService::new(fast_config()).await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        scheduler
            .add_interval_job("tick", Duration::from_secs(1), move |_token| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    JobResult::Success
                }
            })
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(counter.load(Ordering::SeqCst) >= 1);
        let status = scheduler.registry.get_status("tick").unwrap();
        assert!(status.run_count >= 1);
        assert_eq!(status.last_result, Some(JobResult::Success));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_interval_rejected() {
        let scheduler = SchedulerService::new(fast_config()).await.unwrap();
        let result = scheduler
            .add_interval_job("bad", Duration::ZERO, |_token| async { JobResult::Success })
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidInterval(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cron_job_validation() {
        let scheduler = SchedulerService::new(fast_config()).await.unwrap();

        let result = scheduler
            .add_cron_job("bad", "not-cron", None, |_token| async { JobResult::Success })
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));

        let result = scheduler
            .add_cron_job("bad-tz", "0 0 * * * *", Some("Nowhere/City"), |_token| async {
                JobResult::Success
            })
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));

        let uuid = scheduler
            .add_cron_job("ok", "0 */5 * * * *", Some("Europe/Berlin"), |_token| async {
                JobResult::Success
            })
            .await
            .unwrap();
        assert!(!uuid.is_nil());
        assert!(scheduler.registry.get_status("ok").is_some());
        assert!(scheduler.registry.get_status("bad").is_none());
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 0 * * * *").is_ok());
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("* * *").is_err());
    }
}

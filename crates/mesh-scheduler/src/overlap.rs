//! Overlap prevention for periodic jobs.
//!
//! A tick that fires while the previous run of the same job is still active
//! is skipped rather than queued, so a slow checkpoint never stacks up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether a job is currently running.
#[derive(Debug, Clone, Default)]
pub struct OverlapGuard {
    is_running: Arc<AtomicBool>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the job for one run.
    ///
    /// Returns `None` if a run is already in progress.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: self.is_running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Releases the running flag when dropped, including on panic.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_second_acquire_is_refused() {
        let guard = OverlapGuard::new();

        let run = guard.try_acquire();
        assert!(run.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(run);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = OverlapGuard::new();
        let other = guard.clone();

        let _run = guard.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[test]
    fn test_concurrent_threads_release_flag() {
        let guard = OverlapGuard::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                thread::spawn(move || {
                    if let Some(_run) = guard.try_acquire() {
                        thread::sleep(Duration::from_millis(5));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!guard.is_running());
    }
}

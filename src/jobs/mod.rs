//! Background job scheduling.
//!
//! - [`BackgroundJob`] — a named task re-invoked periodically with its
//!   original argument until it deregisters itself
//! - [`JobList`] — the scheduling seam the provisioning flow talks to
//! - [`InProcessJobList`] — tokio-based implementation with one loop task per
//!   registered job

pub mod post_setup;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// A periodically re-invoked task.
///
/// Invocations of a given job never overlap: the schedule loop awaits each
/// `run` before ticking again. A job that is finished for good removes itself
/// from the [`JobList`] as its final action.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, argument: &str);
}

/// Registration seam for background jobs.
#[async_trait]
pub trait JobList: Send + Sync {
    /// Register a job. The scheduler re-invokes it with `argument` until it
    /// is removed.
    async fn add(&self, job: Arc<dyn BackgroundJob>, argument: &str);

    /// Deregister a job by name. Safe to call from within the job's own
    /// `run` as its last action.
    async fn remove(&self, name: &str);
}

/// In-process job list: each registered job gets a tokio task that invokes it
/// at a fixed interval.
pub struct InProcessJobList {
    interval: Duration,
    entries: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl InProcessJobList {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }
}

#[async_trait]
impl JobList for InProcessJobList {
    async fn add(&self, job: Arc<dyn BackgroundJob>, argument: &str) {
        let mut entries = self.entries.write().await;
        if entries.contains_key(job.name()) {
            warn!(job = job.name(), "job is already scheduled, skipping");
            return;
        }
        debug!(job = job.name(), interval = ?self.interval, "scheduling background job");

        let interval = self.interval;
        let argument = argument.to_string();
        let name = job.name().to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                job.run(&argument).await;
            }
        });
        entries.insert(name, handle);
    }

    async fn remove(&self, name: &str) {
        let handle = self.entries.write().await.remove(name);
        if let Some(handle) = handle {
            debug!(job = name, "removing background job");
            // When a job removes itself this aborts the calling task; the
            // cancellation lands at its next await point.
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        runs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackgroundJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _argument: &str) {
            self.runs.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct SelfRemovingJob {
        runs: Arc<AtomicU32>,
        list: Arc<InProcessJobList>,
    }

    #[async_trait]
    impl BackgroundJob for SelfRemovingJob {
        fn name(&self) -> &'static str {
            "self_removing"
        }

        async fn run(&self, _argument: &str) {
            if self.runs.fetch_add(1, Ordering::Relaxed) + 1 >= 2 {
                self.list.remove(self.name()).await;
            }
        }
    }

    #[tokio::test]
    async fn job_is_reinvoked_until_removed() {
        let list = InProcessJobList::new(Duration::from_millis(5));
        let runs = Arc::new(AtomicU32::new(0));
        list.add(Arc::new(CountingJob { runs: runs.clone() }), "arg")
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(runs.load(Ordering::Relaxed) >= 2);

        list.remove("counting").await;
        let after_remove = runs.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::Relaxed), after_remove);
        assert!(!list.contains("counting").await);
    }

    #[tokio::test]
    async fn duplicate_registration_is_ignored() {
        let list = InProcessJobList::new(Duration::from_millis(5));
        let runs = Arc::new(AtomicU32::new(0));
        list.add(Arc::new(CountingJob { runs: runs.clone() }), "a")
            .await;
        list.add(Arc::new(CountingJob { runs: runs.clone() }), "b")
            .await;
        assert!(list.contains("counting").await);
        list.remove("counting").await;
    }

    #[tokio::test]
    async fn job_can_remove_itself() {
        let list = Arc::new(InProcessJobList::new(Duration::from_millis(5)));
        let runs = Arc::new(AtomicU32::new(0));
        list.add(
            Arc::new(SelfRemovingJob {
                runs: runs.clone(),
                list: list.clone(),
            }),
            "",
        )
        .await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::Relaxed), 2);
        assert!(!list.contains("self_removing").await);
    }
}

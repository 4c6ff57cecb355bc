use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::services::session_tokens::{ExpiredSession, SessionTokenManager};

/// Periodically closes sessions that went idle without a details call.
pub struct SessionSweeper {
    sessions: Arc<SessionTokenManager>,
    config: SessionConfig,
    running: Arc<RwLock<bool>>,
}

impl SessionSweeper {
    #[must_use]
    pub fn new(sessions: Arc<SessionTokenManager>, config: SessionConfig) -> Self {
        Self {
            sessions,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<()> {
        *self.running.write().await = true;
        info!("Starting session sweeper");

        if let Some(cron_expr) = &self.config.sweep_cron {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let sessions = Arc::clone(&self.sessions);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let sessions = Arc::clone(&sessions);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                sweep(&sessions);
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!(cron = cron_expr, "Session sweeper running on cron");

        let mut poll = interval(std::time::Duration::from_secs(1));
        loop {
            poll.tick().await;
            if !*self.running.read().await {
                break;
            }
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let period = self.config.sweep_interval();
        info!(
            interval_seconds = period.as_secs(),
            "Session sweeper running on interval"
        );

        let mut ticker = interval(period);
        // The first tick completes immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                break;
            }
            sweep(&self.sessions);
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping session sweeper...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One sweep, outside the schedule.
    pub fn run_once(&self) -> Vec<ExpiredSession> {
        sweep(&self.sessions)
    }
}

fn sweep(sessions: &SessionTokenManager) -> Vec<ExpiredSession> {
    let start = std::time::Instant::now();
    debug!(event = "job_started", job_name = "sweep_sessions");

    let expired = sessions.sweep_expired();

    info!(
        event = "job_finished",
        job_name = "sweep_sessions",
        expired = expired.len(),
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Session sweep finished"
    );
    expired
}

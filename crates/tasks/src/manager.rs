//! Cron-style scheduler with one independent run loop per job.
//!
//! Every loop waits one period, invokes its handler, and repeats. A handler
//! error or panic is logged and the loop carries on; one failing job never
//! affects another. [`TaskManager::stop`] cancels every loop and awaits it,
//! so no handler is executing once it returns.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::job::CronJob;

struct JobLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, CronJob>,
    /// Parent token of every loop; `Some` while the manager runs.
    master: Option<CancellationToken>,
    loops: HashMap<String, JobLoop>,
}

#[derive(Default)]
pub struct TaskManager {
    state: Mutex<State>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job`, replacing any job with the same name.
    ///
    /// When the manager is running the job's loop starts right away; a
    /// replaced job's loop is cancelled and awaited first.
    pub async fn register(&self, job: CronJob) -> Result<(), TaskError> {
        job.validate()?;

        let mut state = self.state.lock().await;
        let name = job.name().to_string();
        if let Some(old) = state.loops.remove(&name) {
            stop_loop(&name, old).await;
        }

        if let Some(cancel) = state.master.as_ref().map(CancellationToken::child_token) {
            state.loops.insert(name.clone(), spawn_loop(job.clone(), cancel));
        }
        let replaced = state.jobs.insert(name.clone(), job).is_some();
        tracing::info!(job = %name, replaced, "Cron job registered");
        Ok(())
    }

    /// Start one loop per registered job. A no-op when already running.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.master.is_some() {
            return;
        }

        let master = CancellationToken::new();
        let loops: HashMap<String, JobLoop> = state
            .jobs
            .iter()
            .map(|(name, job)| (name.clone(), spawn_loop(job.clone(), master.child_token())))
            .collect();
        let count = loops.len();
        state.loops = loops;
        state.master = Some(master);
        tracing::info!(jobs = count, "Task manager started");
    }

    /// Cancel every loop and wait until all of them have exited.
    ///
    /// Registrations are kept for the next [`start`](Self::start).
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(master) = state.master.take() else {
            return;
        };

        master.cancel();
        let loops: Vec<(String, JobLoop)> = state.loops.drain().collect();
        for (name, job_loop) in loops {
            stop_loop(&name, job_loop).await;
        }
        tracing::info!("Task manager stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.master.is_some()
    }

    /// Names of all registered jobs, sorted.
    pub async fn jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.jobs.keys().cloned().collect();
        names.sort();
        names
    }
}

fn spawn_loop(job: CronJob, cancel: CancellationToken) -> JobLoop {
    let handle = tokio::spawn(run_loop(job, cancel.clone()));
    JobLoop { cancel, handle }
}

async fn stop_loop(name: &str, job_loop: JobLoop) {
    job_loop.cancel.cancel();
    if let Err(e) = job_loop.handle.await {
        tracing::error!(job = %name, error = %e, "Cron job loop panicked");
    }
}

async fn run_loop(job: CronJob, cancel: CancellationToken) {
    let period = job.period();
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = job.run_once() => result,
        };

        match result {
            Ok(()) => tracing::debug!(job = %job.name(), "Cron job completed"),
            Err(e) => {
                let error = format!("{e:#}");
                tracing::error!(job = %job.name(), error = %error, "Cron job failed");
            }
        }
    }
    tracing::debug!(job = %job.name(), "Cron job loop exited");
}

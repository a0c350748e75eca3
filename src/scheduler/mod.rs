//! Recurring background jobs
//!
//! Jobs are registered explicitly during start-up and only begin running when
//! [`Scheduler::start`] is called. Each job owns its dependencies, so its
//! `run` can be exercised directly without starting the scheduler.

pub mod jobs;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use jobs::{ProbeUpstreams, RefreshSigningKeys};

/// A unit of recurring work
#[async_trait]
pub trait Job: Send + Sync {
    /// Job name for logging
    fn name(&self) -> &'static str;

    /// Run the job once
    async fn run(&self) -> anyhow::Result<()>;
}

/// When a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub every: Duration,
    pub run_immediately: bool,
}

impl Schedule {
    /// First run after one full period
    pub fn every(every: Duration) -> Self {
        Self {
            every,
            run_immediately: false,
        }
    }

    /// First run as soon as the scheduler starts
    pub fn starting_now(mut self) -> Self {
        self.run_immediately = true;
        self
    }
}

struct Registration {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

/// Collects job registrations and runs them on tokio intervals
#[derive(Default)]
pub struct Scheduler {
    registrations: Vec<Registration>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job
    pub fn register<J>(&mut self, job: J, schedule: Schedule) -> &mut Self
    where
        J: Job + 'static,
    {
        info!(
            job = job.name(),
            every_secs = schedule.every.as_secs_f64(),
            "Registered job"
        );
        self.registrations.push(Registration {
            job: Arc::new(job),
            schedule,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Spawn one task per registered job
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .registrations
            .into_iter()
            .map(|registration| tokio::spawn(run_loop(registration, shutdown_rx.clone())))
            .collect();

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

async fn run_loop(registration: Registration, mut shutdown: watch::Receiver<bool>) {
    let Registration { job, schedule } = registration;

    let first = if schedule.run_immediately {
        Instant::now()
    } else {
        Instant::now() + schedule.every
    };
    let mut ticker = time::interval_at(first, schedule.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                match job.run().await {
                    Ok(()) => debug!(
                        job = job.name(),
                        elapsed_ms = %started.elapsed().as_millis(),
                        "Job completed"
                    ),
                    // Keep running; the next tick retries
                    Err(e) => warn!(job = job.name(), error = %e, "Job failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(job = job.name(), "Job stopped");
                    break;
                }
            }
        }
    }
}

/// Handle to running jobs
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop all jobs and wait for in-flight runs to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Job task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

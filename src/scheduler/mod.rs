//! Periodic background tasks with jittered timers.

use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Context handed to a background task on each run
pub struct Context {
    pub task_name: &'static str,
    pub run_id: u64,
    pub shutdown: broadcast::Receiver<()>,
}

/// A task the scheduler fires periodically
#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    /// Base interval between runs
    fn interval(&self) -> Duration;

    /// Random extra delay per round, as a fraction of the interval. The
    /// default is no jitter; the sync timer uses 1.0 so peer workers do not
    /// rewrite their hash files in lockstep.
    fn jitter_frac(&self) -> f64 {
        0.0
    }

    /// Execute one run of the task
    async fn execute(&self, ctx: Context) -> Result<()>;
}

/// Runs registered tasks on their timers until shutdown
pub struct Scheduler {
    tasks: RwLock<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tasks: RwLock::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Register a periodic background task
    pub fn register<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> &Self {
        let handle = self.spawn_timer_loop(task);
        self.tasks.write().unwrap().push(handle);
        self
    }

    fn spawn_timer_loop<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut run_id = 0u64;

        tokio::spawn(async move {
            loop {
                // Each round draws a fresh delay so the jitter never settles
                // into a fixed phase.
                let delay = jittered(task.interval(), task.jitter_frac());

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        run_id += 1;
                        let ctx = Context {
                            task_name: task.name(),
                            run_id,
                            shutdown: shutdown_rx.resubscribe(),
                        };

                        if let Err(e) = task.execute(ctx).await {
                            tracing::error!(
                                task = task.name(),
                                error = %e,
                                "background task failed"
                            );
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = task.name(), "task shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Signal all tasks to stop and wait for them to finish
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx.send(()).ok();

        let tasks: Vec<_> = self.tasks.write().unwrap().drain(..).collect();
        for task in tasks {
            task.await?;
        }

        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn jittered(interval: Duration, frac: f64) -> Duration {
    if frac <= 0.0 {
        return interval;
    }
    interval.mul_f64(1.0 + frac * rand::random::<f64>())
}

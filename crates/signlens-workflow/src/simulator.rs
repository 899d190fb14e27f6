//! Staged progress animation for the Processing stage.
//!
//! Nothing here observes the real analysis call. [`snapshot`] maps elapsed
//! time to task states; [`ProgressSimulator`] samples it on a fixed tick and
//! publishes the result until the timeline plus grace period has passed or
//! it is cancelled.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use signlens_config::SimulatorConfig;
use signlens_types::{AgentStatus, AgentTask};

/// Static description of one simulated sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTaskDef {
    pub id: &'static str,
    pub name: &'static str,
    /// Shown while pending.
    pub idle_message: &'static str,
    /// Shown while working.
    pub active_message: &'static str,
}

pub const DONE_MESSAGE: &str = "Complete";

/// The six tasks, in display order.
pub const AGENT_TASKS: [AgentTaskDef; 6] = [
    AgentTaskDef {
        id: "vision",
        name: "Vision Agent",
        idle_message: "Waiting to analyze...",
        active_message: "Analyzing image...",
    },
    AgentTaskDef {
        id: "lang",
        name: "Language Agent",
        idle_message: "Ready to detect...",
        active_message: "Detecting languages...",
    },
    AgentTaskDef {
        id: "local",
        name: "Localization Agent",
        idle_message: "Locating context...",
        active_message: "Getting local context...",
    },
    AgentTaskDef {
        id: "video",
        name: "Video Agent",
        idle_message: "Queued for generation...",
        active_message: "Preparing video generation...",
    },
    AgentTaskDef {
        id: "know",
        name: "Knowledge Agent",
        idle_message: "Database standby...",
        active_message: "Building database...",
    },
    AgentTaskDef {
        id: "dist",
        name: "Distribution Agent",
        idle_message: "Sharing optimized...",
        active_message: "Optimizing sharing...",
    },
];

fn task(agent: &AgentTaskDef, status: AgentStatus, progress: f64) -> AgentTask {
    let message = match status {
        AgentStatus::Pending => agent.idle_message,
        AgentStatus::Working => agent.active_message,
        AgentStatus::Done => DONE_MESSAGE,
    };
    AgentTask {
        id: agent.id.to_string(),
        name: agent.name.to_string(),
        status,
        progress,
        message: message.to_string(),
    }
}

/// All tasks pending, as shown when a run starts.
pub fn initial_snapshot(tasks: &[AgentTaskDef]) -> Vec<AgentTask> {
    tasks
        .iter()
        .map(|agent| task(agent, AgentStatus::Pending, 0.0))
        .collect()
}

/// Fraction of the timeline covered after `elapsed`, in `[0, 1]`.
pub fn overall_progress(elapsed: Duration, config: &SimulatorConfig) -> f64 {
    if config.total_ms == 0 {
        return 1.0;
    }
    let elapsed_ms = elapsed.as_micros() as f64 / 1000.0;
    (elapsed_ms / config.total_ms as f64).min(1.0)
}

/// Task states after `elapsed` time.
///
/// Task `i` works during `[i * step, i * step + window)` of the normalized
/// timeline, with `step` from [`SimulatorConfig::stagger_for`].
/// Every task is done once the timeline reaches 1. Before any time has
/// elapsed every task is pending.
pub fn snapshot(
    elapsed: Duration,
    config: &SimulatorConfig,
    tasks: &[AgentTaskDef],
) -> Vec<AgentTask> {
    if elapsed.is_zero() {
        return initial_snapshot(tasks);
    }

    let overall = overall_progress(elapsed, config);
    let step = config.stagger_for(tasks.len());
    let window = config.window_fraction();
    tasks
        .iter()
        .enumerate()
        .map(|(index, agent)| {
            let start = index as f64 * step;
            let end = (start + window).min(1.0);
            if overall < start {
                task(agent, AgentStatus::Pending, 0.0)
            } else if overall < end {
                let progress = ((overall - start) / window * 100.0).clamp(0.0, 100.0);
                task(agent, AgentStatus::Working, progress)
            } else {
                task(agent, AgentStatus::Done, 100.0)
            }
        })
        .collect()
}

/// How a simulator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorOutcome {
    /// Timeline and grace period elapsed.
    Finished,
    /// Torn down before finishing.
    Cancelled,
}

/// Fixed-rate sampler of [`snapshot`].
pub struct ProgressSimulator {
    config: SimulatorConfig,
    tasks: Vec<AgentTaskDef>,
}

impl ProgressSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_tasks(config, AGENT_TASKS.to_vec())
    }

    pub fn with_tasks(config: SimulatorConfig, tasks: Vec<AgentTaskDef>) -> Self {
        Self { config, tasks }
    }

    /// Tick until finished or cancelled, publishing every sample on `updates`.
    pub async fn run(
        self,
        updates: watch::Sender<Vec<AgentTask>>,
        cancel: CancellationToken,
    ) -> SimulatorOutcome {
        let started = Instant::now();
        let finish_after = self.config.finish_after();
        updates.send_replace(initial_snapshot(&self.tasks));

        let mut ticker = tokio::time::interval_at(started + self.config.tick(), self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Progress simulator cancelled");
                    return SimulatorOutcome::Cancelled;
                }
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    updates.send_replace(snapshot(elapsed, &self.config, &self.tasks));
                    if elapsed >= finish_after {
                        debug!("Progress simulator finished");
                        return SimulatorOutcome::Finished;
                    }
                }
            }
        }
    }

    /// Run on the current runtime. Dropping the handle cancels the run.
    pub fn spawn(self, updates: watch::Sender<Vec<AgentTask>>) -> SimulatorHandle {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.run(updates, cancel.clone()));
        SimulatorHandle {
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            join,
        }
    }
}

/// Running simulator. Cancelled when dropped.
pub struct SimulatorHandle {
    cancel: CancellationToken,
    _guard: DropGuard,
    join: JoinHandle<SimulatorOutcome>,
}

impl SimulatorHandle {
    /// Cancel and wait for the task to exit.
    pub async fn stop(self) -> SimulatorOutcome {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait without cancelling.
    pub async fn wait(self) -> SimulatorOutcome {
        let SimulatorHandle { join, _guard, .. } = self;
        let outcome = join.await.unwrap_or(SimulatorOutcome::Cancelled);
        drop(_guard);
        outcome
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

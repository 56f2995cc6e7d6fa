//! Simulated analysis pipeline timeline.
//!
//! The backend job has an unknown duration; this module renders a fixed
//! five-stage narrative over it. Each stage holds a scripted minimum dwell so
//! short jobs still feel thorough, while stage 2 gates on the real readiness
//! signal so long jobs visibly keep working instead of freezing. Progress is
//! published through a watch channel; tearing the handle down cancels every
//! pending timer so nothing fires afterwards.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::constants::{FIRST_STEP_DWELL, READINESS_POLL_INTERVAL, STEP_DWELL};

pub const STEP_COUNT: usize = 5;

/// One narrative step of the pipeline screen.
#[derive(Debug, Clone, Copy)]
pub struct StepSpec {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// The fixed step sequence, in completion order.
pub const STEPS: [StepSpec; STEP_COUNT] = [
    StepSpec {
        id: "query-framework",
        title: "Query Framework Structured",
        description: "Building the prompt set used to probe each AI assistant",
    },
    StepSpec {
        id: "ai-responses",
        title: "AI Responses Collected",
        description: "Waiting for every assistant to answer the probe set",
    },
    StepSpec {
        id: "source-attribution",
        title: "Sources Attributed",
        description: "Mapping citations back to the pages they came from",
    },
    StepSpec {
        id: "competitor-benchmarks",
        title: "Competitors Benchmarked",
        description: "Scoring rival brands on the same probe set",
    },
    StepSpec {
        id: "report-assembly",
        title: "Visibility Report Assembled",
        description: "Packaging scores, sentiment and citations",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Complete,
}

/// Snapshot of the timeline published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineProgress {
    pub statuses: [StepStatus; STEP_COUNT],
    /// True once step 5 has completed; only then does the embedder show the
    /// snapshot-stats panel and the dashboard call-to-action.
    pub all_done: bool,
    /// True if the optional poll timeout expired before the readiness signal
    /// arrived (step 2 was force-completed).
    pub timed_out: bool,
}

impl PipelineProgress {
    fn initial() -> Self {
        let mut statuses = [StepStatus::Pending; STEP_COUNT];
        statuses[0] = StepStatus::Active;
        Self {
            statuses,
            all_done: false,
            timed_out: false,
        }
    }

    /// Index of the currently active step, if any.
    pub fn active_step(&self) -> Option<usize> {
        self.statuses.iter().position(|s| *s == StepStatus::Active)
    }
}

/// Timing knobs, defaulting to the production script. Tests shrink nothing:
/// they run on a paused tokio clock instead.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub first_step_dwell: Duration,
    pub step_dwell: Duration,
    pub poll_interval: Duration,
    /// `None` polls until the readiness signal arrives or the handle is torn
    /// down. `Some` force-completes step 2 at expiry with `timed_out` raised.
    pub poll_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            first_step_dwell: FIRST_STEP_DWELL,
            step_dwell: STEP_DWELL,
            poll_interval: READINESS_POLL_INTERVAL,
            poll_timeout: None,
        }
    }
}

/// Owns the driving task. Dropping (or calling [`teardown`](Self::teardown))
/// aborts it; no progress update is published afterwards.
pub struct PipelineHandle {
    progress: watch::Receiver<PipelineProgress>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn progress(&self) -> watch::Receiver<PipelineProgress> {
        self.progress.clone()
    }

    pub fn snapshot(&self) -> PipelineProgress {
        self.progress.borrow().clone()
    }

    pub fn teardown(&self) {
        self.task.abort();
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the timeline. `ready` mirrors the backend readiness signal; step 2
/// will not complete before it turns true (or the optional timeout fires).
pub fn spawn(config: PipelineConfig, ready: watch::Receiver<bool>) -> PipelineHandle {
    let (tx, rx) = watch::channel(PipelineProgress::initial());
    let task = tokio::spawn(run(config, ready, tx));
    PipelineHandle { progress: rx, task }
}

async fn run(
    config: PipelineConfig,
    ready: watch::Receiver<bool>,
    progress: watch::Sender<PipelineProgress>,
) {
    // Step 1 always dwells its full floor, regardless of backend state.
    tokio::time::sleep(config.first_step_dwell).await;
    complete_step(&progress, 0, false);

    // Step 2 gates on the readiness signal, then still dwells once so an
    // already-ready backend doesn't produce a jarring instant-complete flash.
    let timed_out = wait_for_ready(&config, &ready).await;
    tokio::time::sleep(config.step_dwell).await;
    complete_step(&progress, 1, timed_out);

    // Steps 3-5 are purely cosmetic and unconditional.
    for index in 2..STEP_COUNT {
        tokio::time::sleep(config.step_dwell).await;
        complete_step(&progress, index, timed_out);
    }
}

/// Returns true if the poll timeout expired before the signal arrived.
async fn wait_for_ready(config: &PipelineConfig, ready: &watch::Receiver<bool>) -> bool {
    if *ready.borrow() {
        return false;
    }
    let deadline = config.poll_timeout.map(|t| tokio::time::Instant::now() + t);
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.tick().await; // first tick is immediate
    loop {
        interval.tick().await;
        if *ready.borrow() {
            return false;
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("readiness signal never arrived, force-completing collection step");
                return true;
            }
        }
    }
}

fn complete_step(progress: &watch::Sender<PipelineProgress>, index: usize, timed_out: bool) {
    progress.send_modify(|p| {
        p.statuses[index] = StepStatus::Complete;
        p.timed_out = timed_out;
        if index + 1 < STEP_COUNT {
            p.statuses[index + 1] = StepStatus::Active;
        } else {
            p.all_done = true;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::yield_now;
    use tokio::time::{advance, Instant};

    async fn settle() {
        // Let the driving task observe any timers that just fired.
        for _ in 0..5 {
            yield_now().await;
        }
    }

    fn ready_signal(initial: bool) -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(initial)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_backend_still_walks_the_full_script() {
        // Scenario D: readiness true from the start; total simulated time is
        // 10s + 4 * 4s.
        let (_tx, rx) = ready_signal(true);
        let started = Instant::now();
        let handle = spawn(PipelineConfig::default(), rx);
        let mut progress = handle.progress();

        while !progress.borrow().all_done {
            progress.changed().await.unwrap();
        }
        assert_eq!(started.elapsed(), Duration::from_secs(26));
        let snapshot = handle.snapshot();
        assert!(snapshot.statuses.iter().all(|s| *s == StepStatus::Complete));
        assert!(!snapshot.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_complete_strictly_in_order() {
        // P6: completion timestamps are monotone across the sequence.
        let (_tx, rx) = ready_signal(true);
        let handle = spawn(PipelineConfig::default(), rx);
        let mut progress = handle.progress();

        let mut completion_times = Vec::new();
        while !progress.borrow().all_done {
            progress.changed().await.unwrap();
            completion_times.push(Instant::now());
        }
        assert_eq!(completion_times.len(), STEP_COUNT);
        for pair in completion_times.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_two_waits_for_readiness() {
        let (tx, rx) = ready_signal(false);
        let handle = spawn(PipelineConfig::default(), rx);

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(handle.snapshot().active_step(), Some(1));

        // A minute of polling without the signal: still on step 2.
        advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(handle.snapshot().active_step(), Some(1));

        // Signal arrives; step 2 dwells once more, then completes.
        tx.send(true).unwrap();
        advance(Duration::from_millis(300)).await; // next poll tick observes it
        settle().await;
        advance(Duration::from_secs(4)).await;
        settle().await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.statuses[1], StepStatus::Complete);
        assert_eq!(snapshot.active_step(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_every_pending_timer() {
        // P7: no progress callback fires after teardown.
        let (_tx, rx) = ready_signal(false);
        let handle = spawn(PipelineConfig::default(), rx);

        advance(Duration::from_secs(10)).await;
        settle().await;
        let before = handle.snapshot();
        assert_eq!(before.active_step(), Some(1));

        handle.teardown();
        settle().await;
        advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(handle.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_force_completes_collection() {
        let (_tx, rx) = ready_signal(false);
        let config = PipelineConfig {
            poll_timeout: Some(Duration::from_secs(30)),
            ..PipelineConfig::default()
        };
        let handle = spawn(config, rx);
        let mut progress = handle.progress();

        while !progress.borrow().all_done {
            progress.changed().await.unwrap();
        }
        let snapshot = handle.snapshot();
        assert!(snapshot.timed_out);
        assert!(snapshot.statuses.iter().all(|s| *s == StepStatus::Complete));
    }

    #[test]
    fn test_initial_progress_has_step_one_active() {
        let progress = PipelineProgress::initial();
        assert_eq!(progress.active_step(), Some(0));
        assert!(!progress.all_done);
    }

    #[test]
    fn test_step_specs_are_unique() {
        for (i, a) in STEPS.iter().enumerate() {
            for b in STEPS.iter().skip(i + 1) {
                assert_ne!(a.id, b.id);
            }
        }
    }
}

//! Debounced recomputation. Parameter changes are coalesced and only the
//! newest set is simulated once no further change has arrived for the quiet
//! window.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{HistoricalReturnSeries, SimulationParameters, SimulationResult, run_projection};

pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub generation: u64,
    pub parameters: SimulationParameters,
    #[serde(flatten)]
    pub result: SimulationResult,
}

#[derive(Debug)]
struct ParameterChange {
    generation: u64,
    parameters: SimulationParameters,
}

pub type OutcomeReceiver = watch::Receiver<Option<Arc<SessionOutcome>>>;

pub struct Debouncer {
    changes: mpsc::UnboundedSender<ParameterChange>,
    outcomes: OutcomeReceiver,
    next_generation: AtomicU64,
    worker: JoinHandle<()>,
}

impl Debouncer {
    /// Starts the background task. Must be called inside a tokio runtime.
    pub fn spawn(quiet_window: Duration, history: Arc<HistoricalReturnSeries>) -> Self {
        let (changes, receiver) = mpsc::unbounded_channel();
        let (publisher, outcomes) = watch::channel(None);
        let worker = tokio::spawn(run_worker(quiet_window, history, receiver, publisher));

        Self {
            changes,
            outcomes,
            next_generation: AtomicU64::new(1),
            worker,
        }
    }

    /// Queues a parameter change, superseding any change still waiting out
    /// its quiet window. Returns the generation assigned to the change.
    pub fn submit(&self, parameters: SimulationParameters) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if self
            .changes
            .send(ParameterChange {
                generation,
                parameters,
            })
            .is_err()
        {
            warn!(generation, "debounce worker has stopped; change dropped");
        }
        generation
    }

    pub fn subscribe(&self) -> OutcomeReceiver {
        self.outcomes.clone()
    }

    pub fn latest(&self) -> Option<Arc<SessionOutcome>> {
        self.outcomes.borrow().clone()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    quiet_window: Duration,
    history: Arc<HistoricalReturnSeries>,
    mut changes: mpsc::UnboundedReceiver<ParameterChange>,
    publisher: watch::Sender<Option<Arc<SessionOutcome>>>,
) {
    while let Some(mut pending) = changes.recv().await {
        loop {
            tokio::select! {
                newer = changes.recv() => match newer {
                    Some(change) => {
                        debug!(
                            superseded = pending.generation,
                            generation = change.generation,
                            "parameter change superseded"
                        );
                        pending = change;
                    }
                    None => return,
                },
                () = tokio::time::sleep(quiet_window) => break,
            }
        }

        let ParameterChange {
            generation,
            parameters,
        } = pending;
        let result = run_projection(&parameters, &history);
        info!(
            generation,
            years = parameters.investment_years,
            snapshots = result.yearly_data.len(),
            "recomputed projection"
        );
        publisher.send_replace(Some(Arc::new(SessionOutcome {
            generation,
            parameters,
            result,
        })));
    }
}

// State-changed observers.
//
// After every mutation the orchestrator hands the new `GameState` and phase
// to each registered `StateObserver`. Observers must return quickly: the
// orchestrator calls them inline and does not wait for any I/O they start.
//
// - `BroadcastObserver` queues a redacted `game-state` for every connection
//   (queueing is non-blocking; the per-connection writer threads do the I/O).
// - `PersistObserver` hands a clone to its own persistence thread, which
//   saves only the latest snapshot if several queued up while it was busy.

use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use saboteur_game::{GameState, StateStore};
use saboteur_protocol::{Phase, ServerMessage};
use tracing::{debug, warn};

use crate::registry::Registry;

pub trait StateObserver: Send {
    fn state_changed(&mut self, state: &GameState, phase: Phase);
}

/// Sends each connected player the snapshot as they are allowed to see it.
pub struct BroadcastObserver {
    registry: Arc<Registry>,
}

impl BroadcastObserver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl StateObserver for BroadcastObserver {
    fn state_changed(&mut self, state: &GameState, phase: Phase) {
        self.registry.broadcast_with(|player_id| ServerMessage::GameState {
            state: state.view_for(Some(player_id), phase),
        });
    }
}

/// Saves snapshots through a `StateStore` on a dedicated thread. Dropping the
/// observer saves whatever is still queued and joins the thread.
pub struct PersistObserver {
    queue: Option<Sender<GameState>>,
    thread: Option<JoinHandle<()>>,
}

impl PersistObserver {
    pub fn spawn(mut store: Box<dyn StateStore>) -> Self {
        let (queue, rx) = mpsc::channel::<GameState>();
        let thread = thread::Builder::new()
            .name("persist".into())
            .spawn(move || {
                while let Ok(mut latest) = rx.recv() {
                    while let Ok(newer) = rx.try_recv() {
                        latest = newer;
                    }
                    match store.save(&latest) {
                        Ok(()) => debug!(round = latest.current_round, "state saved"),
                        Err(e) => warn!(error = %e, "failed to save state"),
                    }
                }
            });
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "persistence thread failed to start; state will not be saved");
                None
            }
        };
        Self {
            queue: thread.as_ref().map(|_| queue),
            thread,
        }
    }
}

impl StateObserver for PersistObserver {
    fn state_changed(&mut self, state: &GameState, _phase: Phase) {
        if let Some(queue) = &self.queue {
            let _ = queue.send(state.clone());
        }
    }
}

impl Drop for PersistObserver {
    fn drop(&mut self) {
        self.queue = None;
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

// Persistence collaborator for `GameState`.
//
// The server never writes state itself: a persistence observer hands cloned
// snapshots to a `StateStore` on its own thread. `JsonFileStore` is the one
// used by the binary; `MemoryStore` backs tests and embedders that want to
// inspect what was saved.
//
// File writes go to a sibling `.tmp` file first and are renamed into place,
// so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreError;
use crate::state::GameState;

/// Somewhere a `GameState` snapshot can be saved and loaded back.
pub trait StateStore: Send {
    fn save(&mut self, state: &GameState) -> Result<(), StoreError>;

    /// The last saved state, or `None` if nothing has been saved.
    fn load(&self) -> Result<Option<GameState>, StoreError>;
}

/// Pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn save(&mut self, state: &GameState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<GameState>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// In-memory store. Clones share the same slot, so a test can keep one
/// handle and give the other to the server.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<GameState>>>,
    saves: Arc<Mutex<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state`.
    pub fn with_state(state: GameState) -> Self {
        let store = Self::default();
        *store.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        store
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStore {
    fn save(&mut self, state: &GameState) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<GameState>, StoreError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

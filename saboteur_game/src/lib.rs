// saboteur_game: the authoritative model of one Saboteur game.
//
// Pure data and pure transitions: no sockets, no threads, no clocks. The
// server's orchestrator owns the only mutable `GameState` and drives it phase
// by phase; everything here can be exercised directly from unit tests.
//
// Module overview:
// - `rules.rs`:  per-table-size rule table (infiltrator count, mission sizes,
//                sabotages required), plus the approval and mission-result
//                predicates.
// - `state.rs`:  `GameState` and its transitions (deal, propose, vote,
//                mission, outcome) and the redacted `GameView` projection.
// - `store.rs`:  `StateStore` trait, `JsonFileStore`, `MemoryStore`.
// - `error.rs`:  `RulesError`, `ProposalError`, `StoreError`.
//
// Randomness comes from `saboteur_prng::DealerRng`, passed in by the caller,
// so a seeded server deals the same roles every run.

pub mod error;
pub mod rules;
pub mod state;
pub mod store;

pub use error::{ProposalError, RulesError, StoreError};
pub use rules::{TableRules, mission_succeeds, rules_for, team_approved};
pub use state::{GameOutcome, GameState, MissionResult, VoteTally};
pub use store::{JsonFileStore, MemoryStore, StateStore};

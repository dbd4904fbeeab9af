// saboteur_server: authoritative server for the Saboteur hidden-role game.
//
// Players connect over TCP, receive a player id, and are driven through the
// game by request/response exchanges: the leader is asked for a team, every
// seat is asked for a vote, infiltrators on the mission are asked whether to
// sabotage. The server owns the only copy of the game state that matters;
// clients only ever see redacted snapshots.
//
// Module overview:
// - `server.rs`:        `start_server`, listener and reader threads,
//                       `ServerHandle`.
// - `registry.rs`:      connected sessions, id allocation, per-connection
//                       writer threads, `send` / `broadcast`.
// - `bus.rs`:           the ordered event queue into the orchestrator.
// - `dispatch.rs`:      routes client messages to control or phase responses.
// - `slots.rs`:         generation-tagged response slots with deadlines.
// - `orchestrator.rs`:  the phase state machine; sole writer of `GameState`.
// - `observer.rs`:      state-changed observers (broadcast, persistence).
// - `config.rs`:        `ServerConfig`, TOML loading and validation.
// - `client.rs`:        `NetClient`, a blocking-free client for bots and tests.
// - `error.rs`:         error types.
//
// Dependencies: `saboteur_protocol` (wire types and framing), `saboteur_game`
// (rules and state), `saboteur_prng` (role dealing). Networking is plain
// `std::net` with one thread per reader and writer.

pub mod bus;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod slots;

pub use config::ServerConfig;
pub use error::{ClientError, ConfigError, RegistryError, ServerError};
pub use server::{ServerHandle, start_server};

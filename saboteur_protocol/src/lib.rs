// saboteur_protocol: wire protocol for the Saboteur game server.
//
// Shared by the server (`saboteur_server`) and any client, including the test
// players in `multiplayer_tests`. No dependency on the game model or on any
// networking runtime.
//
// Module overview:
// - `types.rs`:    `PlayerId`, `Generation`, and the game vocabulary enums
//                  (`Role`, `Winner`, `GameOverReason`, `Phase`).
// - `message.rs`:  `ClientMessage` / `ServerMessage`, tagged by `"kind"`.
// - `view.rs`:     `GameView`, the per-player redacted state snapshot.
// - `framing.rs`:  4-byte big-endian length prefix + JSON payload over any
//                  `Read`/`Write` stream.

pub mod framing;
pub mod message;
pub mod types;
pub mod view;

pub use framing::{MAX_FRAME_SIZE, decode, read_frame, write_frame, write_message};
pub use message::{ClientMessage, ServerMessage, VoteEntry};
pub use types::{GameOverReason, Generation, Phase, PlayerId, Role, Winner};
pub use view::{GameView, SeatView};

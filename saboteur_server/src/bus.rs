// Message bus: the single ordered queue into the orchestrator.
//
// The listener and every reader thread hold a `BusSender`; the orchestrator
// holds the only receiver. Nothing else mutates game state, so the order of
// events on this channel is the order in which they take effect.

use std::sync::mpsc::{self, Receiver, Sender};

use saboteur_protocol::{ClientMessage, PlayerId};

#[derive(Debug)]
pub enum BusEvent {
    /// A connection was registered and has been sent `connect-ack`.
    Joined(PlayerId),
    /// A decoded message from a connection. `goodbye` never appears here.
    Message {
        from: PlayerId,
        message: ClientMessage,
    },
    /// A connection ended (goodbye, EOF, reset, or unreadable stream).
    Left(PlayerId),
}

pub type BusSender = Sender<BusEvent>;
pub type BusReceiver = Receiver<BusEvent>;

pub fn channel() -> (BusSender, BusReceiver) {
    mpsc::channel()
}

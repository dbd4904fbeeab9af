// Session registry: the set of live connections and their outboxes.
//
// Each registered connection gets a `PlayerId` from a monotonic counter
// (starting at 1, never reused) and a writer thread that drains an unbounded
// outbox onto the socket. Everyone else talks to a connection only by
// queueing a `ServerMessage` here, so no thread but the writer ever writes to
// a given `TcpStream`, and a slow client never blocks the orchestrator.
//
// The registry lock is held only to look up or mutate the session map.
// `broadcast` / `broadcast_with` snapshot the id list first and then send to
// each id in turn; a connection that closes in between is skipped.
//
// Removal (on `Left`, or on a send into a dead outbox) drops the outbox
// sender, which ends the writer thread, and shuts the socket down, which
// ends the reader thread.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use saboteur_protocol::{PlayerId, ServerMessage, write_message};
use tracing::{debug, warn};

use crate::error::RegistryError;

struct Session {
    outbox: Sender<ServerMessage>,
    stream: TcpStream,
}

pub struct Registry {
    sessions: Mutex<BTreeMap<PlayerId, Session>>,
    next_id: AtomicU32,
    capacity: usize,
}

impl Registry {
    /// A registry that admits at most `capacity` simultaneous connections.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PlayerId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `stream`: assign the next id, start its writer thread and queue
    /// `connect-ack` as the first message. A full table is refused without
    /// using up an id.
    pub fn register(&self, stream: TcpStream) -> Result<PlayerId, RegistryError> {
        let mut sessions = self.lock();
        if sessions.len() >= self.capacity {
            return Err(RegistryError::Full);
        }
        let write_half = stream.try_clone()?;
        let player_id = PlayerId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let (outbox, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("writer-{player_id}"))
            .spawn(move || writer_loop(write_half, rx, player_id))?;

        // The writer is already waiting on this channel.
        let _ = outbox.send(ServerMessage::ConnectAck { player_id });
        sessions.insert(player_id, Session { outbox, stream });
        debug!(%player_id, connected = sessions.len(), "registered");
        Ok(player_id)
    }

    /// Queue `msg` for one connection. A send into a closed outbox removes
    /// the session.
    pub fn send(&self, player_id: PlayerId, msg: &ServerMessage) -> Result<(), RegistryError> {
        let mut sessions = self.lock();
        let session = sessions
            .get(&player_id)
            .ok_or(RegistryError::NotConnected(player_id))?;
        if session.outbox.send(msg.clone()).is_err() {
            if let Some(session) = sessions.remove(&player_id) {
                let _ = session.stream.shutdown(Shutdown::Both);
            }
            return Err(RegistryError::Closed(player_id));
        }
        Ok(())
    }

    /// Send the same message to every connection, best effort.
    pub fn broadcast(&self, msg: &ServerMessage) {
        self.broadcast_with(|_| msg.clone());
    }

    /// Send a per-recipient message to every connection, best effort.
    pub fn broadcast_with(&self, mut make: impl FnMut(PlayerId) -> ServerMessage) {
        for player_id in self.connected_ids() {
            if let Err(e) = self.send(player_id, &make(player_id)) {
                debug!(%player_id, error = %e, "broadcast skipped connection");
            }
        }
    }

    /// Drop a connection. Returns whether it was still registered.
    pub fn remove(&self, player_id: PlayerId) -> bool {
        match self.lock().remove(&player_id) {
            Some(session) => {
                let _ = session.stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    /// Drop every connection (server shutdown).
    pub fn close_all(&self) {
        let sessions = std::mem::take(&mut *self.lock());
        for session in sessions.into_values() {
            let _ = session.stream.shutdown(Shutdown::Both);
        }
    }

    /// Connected ids in ascending order.
    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.lock().keys().copied().collect()
    }

    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.lock().contains_key(&player_id)
    }

    /// Lowest connected id; this player may start games.
    pub fn host(&self) -> Option<PlayerId> {
        self.lock().keys().next().copied()
    }

}

/// Drain the outbox onto the socket until the session is removed or a write
/// fails. A failed write shuts the socket down so the reader notices.
fn writer_loop(stream: TcpStream, outbox: Receiver<ServerMessage>, player_id: PlayerId) {
    let mut writer = BufWriter::new(stream);
    for msg in outbox {
        if let Err(e) = write_message(&mut writer, &msg) {
            warn!(%player_id, error = %e, "write failed, closing connection");
            let _ = writer.get_ref().shutdown(Shutdown::Both);
            break;
        }
    }
}

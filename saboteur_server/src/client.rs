// TCP client for the game server.
//
// Used by bots and by the integration tests. Architecture:
// - `connect()` opens the socket on the calling thread and reads the first
//   frame, which is `connect-ack` (or `rejected` when the table is full).
// - A background reader thread decodes `ServerMessage`s and pushes them into
//   an `mpsc` inbox.
// - The caller holds a `BufWriter<TcpStream>` for sending; each send is one
//   frame and is flushed immediately.
// - `recv_timeout()` waits for the next message.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use saboteur_protocol::{
    ClientMessage, Generation, PlayerId, ServerMessage, decode, read_frame, write_frame,
    write_message,
};

use crate::error::ClientError;

pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    player_id: PlayerId,
}

impl NetClient {
    /// Connect and wait for `connect-ack`.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let mut reader = BufReader::new(stream.try_clone()?);

        let first: ServerMessage = decode(&read_frame(&mut reader)?)
            .map_err(|e| ClientError::Handshake(e.to_string()))?;
        let player_id = match first {
            ServerMessage::ConnectAck { player_id } => player_id,
            ServerMessage::Rejected { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::Handshake(format!("{other:?}"))),
        };

        // Clear the handshake timeout for the long-lived reader loop.
        reader.get_ref().set_read_timeout(None)?;
        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Self {
            writer: BufWriter::new(stream),
            inbox: rx,
            _reader_thread: Some(reader_thread),
            player_id,
        })
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        write_message(&mut self.writer, msg)?;
        Ok(())
    }

    /// Send raw bytes as one frame, bypassing JSON encoding.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        write_frame(&mut self.writer, payload)?;
        Ok(())
    }

    pub fn send_start_game(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::StartGame)
    }

    pub fn propose_team(
        &mut self,
        team: Vec<PlayerId>,
        generation: Generation,
    ) -> Result<(), ClientError> {
        let player_id = self.player_id;
        self.send(&ClientMessage::TeamProposed {
            player_id,
            team,
            generation,
        })
    }

    pub fn cast_vote(&mut self, approve: bool, generation: Generation) -> Result<(), ClientError> {
        let player_id = self.player_id;
        self.send(&ClientMessage::VoteCast {
            player_id,
            approve,
            generation,
        })
    }

    pub fn choose_sabotage(
        &mut self,
        sabotage: bool,
        generation: Generation,
    ) -> Result<(), ClientError> {
        let player_id = self.player_id;
        self.send(&ClientMessage::SabotageChoice {
            player_id,
            sabotage,
            generation,
        })
    }

    /// Send `goodbye` and close the socket.
    pub fn disconnect(&mut self) {
        let _ = self.send(&ClientMessage::Goodbye);
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// Close the socket without saying goodbye.
    pub fn drop_connection(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// Next server message, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ServerMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    while let Ok(payload) = read_frame(&mut reader) {
        let Ok(msg) = decode::<ServerMessage>(&payload) else {
            continue;
        };
        if tx.send(msg).is_err() {
            break;
        }
    }
}

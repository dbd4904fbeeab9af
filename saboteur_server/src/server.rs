// TCP listener, per-connection reader threads, and server startup.
//
// Architecture: thread-per-reader feeding a central `mpsc` bus.
//
// - **Listener thread** (`TcpListener::accept()` loop, non-blocking with a
//   short sleep so it can see the stop flag): registers each connection with
//   the `Registry`, which starts its writer thread and queues `connect-ack`.
//   The listener then posts `Joined` and starts the reader thread. A full
//   table gets `rejected` and is closed.
// - **Reader threads** (one per connection): read one frame at a time and
//   post decoded messages to the bus. A frame that does not decode is logged
//   and dropped; the connection stays open. EOF, reset, an oversized frame or
//   `goodbye` ends the loop and posts `Left`.
// - **Orchestrator thread**: the only bus receiver and the only writer of
//   game state (see `orchestrator.rs`).
//
// Shutdown: `ServerHandle::stop` clears the shared `keep_running` flag, joins
// the orchestrator and listener, and shuts every socket down so the reader
// and writer threads end on their own.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use saboteur_game::{GameState, StateStore};
use saboteur_prng::DealerRng;
use saboteur_protocol::{ClientMessage, Phase, PlayerId, ServerMessage, decode, read_frame, write_message};
use tracing::{debug, info, warn};

use crate::bus::{self, BusEvent, BusSender};
use crate::config::ServerConfig;
use crate::error::{ConfigError, RegistryError, ServerError};
use crate::observer::{BroadcastObserver, PersistObserver, StateObserver};
use crate::orchestrator::{Orchestrator, PhaseTimeouts, Shared};
use crate::registry::Registry;

/// Handle returned by `start_server` to inspect and stop the running server.
pub struct ServerHandle {
    shared: Shared,
    registry: Arc<Registry>,
    orchestrator: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down. Pending state
    /// is saved before this returns.
    pub fn stop(mut self) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Block until the server stops on its own.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.orchestrator.take() {
            let _ = handle.join();
        }
        self.shared.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        self.registry.close_all();
    }

    /// Clone of the current game state, taken under the mutation lock.
    pub fn state(&self) -> GameState {
        self.shared.state().clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn connected(&self) -> Vec<PlayerId> {
        self.registry.connected_ids()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }
}

/// Bind, restore any saved game from `store`, and start the listener and
/// orchestrator threads. Returns the handle and the bound address (useful
/// with port 0).
pub fn start_server(
    config: ServerConfig,
    store: Box<dyn StateStore>,
) -> Result<(ServerHandle, SocketAddr), ServerError> {
    config.validate()?;
    let bind_addr = config.bind_addr();
    let listener =
        TcpListener::bind(&bind_addr).map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    let addr = listener.local_addr().map_err(ServerError::Listener)?;

    let (state, phase) = restore(&config, store.as_ref())?;
    let shared = Shared::new(state, phase);
    let registry = Arc::new(Registry::new(config.num_players));
    let (bus_tx, bus_rx) = bus::channel();

    let observers: Vec<Box<dyn StateObserver>> = vec![
        Box::new(BroadcastObserver::new(registry.clone())),
        Box::new(PersistObserver::spawn(store)),
    ];
    let rng = match config.seed {
        Some(seed) => DealerRng::new(seed),
        None => DealerRng::from_clock(),
    };
    let orchestrator = Orchestrator::new(
        shared.clone(),
        registry.clone(),
        bus_rx,
        observers,
        PhaseTimeouts::from(&config),
        rng,
    );
    let orchestrator = spawn_named("orchestrator", move || orchestrator.run())?;

    listener
        .set_nonblocking(true)
        .map_err(ServerError::Listener)?;
    let listener = {
        let registry = registry.clone();
        let keep_running = shared.keep_running.clone();
        spawn_named("listener", move || {
            listener_loop(listener, registry, bus_tx, keep_running);
        })?
    };

    info!(%addr, players = config.num_players, %phase, "server listening");
    Ok((
        ServerHandle {
            shared,
            registry,
            orchestrator: Some(orchestrator),
            listener: Some(listener),
        },
        addr,
    ))
}

/// Pick up a saved game if there is a usable one. A game in progress comes
/// back paused until its players reconnect; anything else starts a fresh
/// lobby. Load failures are logged, not fatal.
fn restore(config: &ServerConfig, store: &dyn StateStore) -> Result<(GameState, Phase), ServerError> {
    let fresh = GameState::new(config.num_players).map_err(ConfigError::from)?;
    let saved = match store.load() {
        Ok(saved) => saved,
        Err(e) => {
            warn!(error = %e, "could not load saved game, starting fresh");
            None
        }
    };
    Ok(match saved {
        Some(mut state)
            if state.started && !state.is_terminal() && state.num_players == config.num_players =>
        {
            state.prepare_resume();
            info!(
                round = state.current_round,
                seats = ?state.roster,
                "restored game in progress"
            );
            (state, Phase::Paused)
        }
        Some(state) if state.num_players != config.num_players => {
            warn!(
                saved = state.num_players,
                configured = config.num_players,
                "saved game is for a different table size, ignoring it"
            );
            (fresh, Phase::Lobby)
        }
        _ => (fresh, Phase::Lobby),
    })
}

fn spawn_named(
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, ServerError> {
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|source| ServerError::Spawn { name, source })
}

fn listener_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    bus: BusSender,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false).ok();
                admit(stream, peer, &registry, &bus, &keep_running);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                warn!(error = %e, "accept failed, listener stopping");
                break;
            }
        }
    }
}

/// Register one accepted connection and start its reader.
fn admit(
    stream: TcpStream,
    peer: SocketAddr,
    registry: &Registry,
    bus: &BusSender,
    keep_running: &Arc<AtomicBool>,
) {
    let read_half = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(%peer, error = %e, "could not clone stream");
            return;
        }
    };
    match registry.register(stream) {
        Ok(player_id) => {
            info!(%player_id, %peer, "connection accepted");
            if bus.send(BusEvent::Joined(player_id)).is_err() {
                return;
            }
            let bus = bus.clone();
            let keep_running = keep_running.clone();
            let reader = BufReader::new(read_half);
            let spawned = thread::Builder::new()
                .name(format!("reader-{player_id}"))
                .spawn(move || reader_loop(reader, player_id, bus, keep_running));
            if let Err(e) = spawned {
                warn!(%player_id, error = %e, "could not start reader");
                registry.remove(player_id);
            }
        }
        Err(RegistryError::Full) => {
            info!(%peer, "table full, refusing connection");
            let mut writer = BufWriter::new(read_half);
            let _ = write_message(
                &mut writer,
                &ServerMessage::Rejected {
                    reason: "session is full".into(),
                },
            );
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
        Err(e) => warn!(%peer, error = %e, "could not register connection"),
    }
}

/// Reader loop for a single connection. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    player_id: PlayerId,
    bus: BusSender,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        let payload = match read_frame(&mut reader) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(%player_id, error = %e, "connection closed");
                break;
            }
        };
        match decode::<ClientMessage>(&payload) {
            Ok(ClientMessage::Goodbye) => {
                debug!(%player_id, "goodbye");
                break;
            }
            Ok(message) => {
                if bus
                    .send(BusEvent::Message {
                        from: player_id,
                        message,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                warn!(%player_id, error = %e, "dropping malformed message");
            }
        }
    }
    let _ = bus.send(BusEvent::Left(player_id));
}

//! Contrôleur de session : accept, supervision et boucle de streaming.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use splsignal::ChunkSource;
use splwire::WireError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{PairPublisher, SpectrumPair};
use crate::session::Session;
use crate::SessionError;

/// Fraction de la durée nominale d'un bloc dormie entre deux cycles, pour
/// absorber la latence de traitement déjà écoulée.
const PACING_FRACTION: f64 = 0.9;

/// Pause avant de réessayer quand la source n'a pas encore de données.
const SOURCE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Période de la sonde de vie du pair en état Connected.
const IDLE_PROBE_PERIOD: Duration = Duration::from_millis(500);

/// Lifecycle states of the generator side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Connected,
    Streaming,
    Closing,
}

/// Static settings of a controller, fixed for its whole lifetime.
///
/// The block length is a protocol constant both ends agree on out of band;
/// it never changes mid-connection. The sample rate is owned by the source
/// (a loaded WAV file imposes its own), not by the controller.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Adresse d'écoute ; le port 0 délègue le choix au système.
    pub listen_addr: SocketAddr,
    /// Nombre d'échantillons par bloc (N).
    pub block_len: usize,
}

enum SessionCommand {
    StartStreaming,
    StopStreaming,
}

/// Server-side session controller.
///
/// Accepts one compute-node connection at a time and, on command, drives the
/// streaming loop: pull a block from the source, send it, block for the
/// spectrum reply, publish the pair, pace. Exactly one session may be
/// streaming system-wide; there is no fan-out and no multiplexing.
pub struct SessionController {
    state_rx: watch::Receiver<SessionState>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    stop_token: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl SessionController {
    /// Opens the listening endpoint and spawns the supervisor task.
    ///
    /// The controller is in Listening state as soon as this returns.
    pub async fn start(
        settings: SessionSettings,
        source: Box<dyn ChunkSource>,
        publisher: PairPublisher,
    ) -> Result<Self, SessionError> {
        // Un bloc vide ferait tourner les deux bouts à vide, et un taux nul
        // rendrait la cadence incalculable.
        if settings.block_len == 0 {
            return Err(SessionError::InvalidBlockLen);
        }
        if source.sample_rate() == 0 {
            return Err(SessionError::InvalidSampleRate);
        }

        let listener = TcpListener::bind(settings.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "session controller listening on {} ({} samples per block)",
            local_addr, settings.block_len
        );

        let (state_tx, state_rx) = watch::channel(SessionState::Listening);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let stop_token = CancellationToken::new();

        let supervisor = Supervisor {
            listener,
            source,
            publisher,
            block_len: settings.block_len,
            state: state_tx,
            commands: cmd_rx,
            stop: stop_token.clone(),
        };
        let handle = tokio::spawn(supervisor.run());

        Ok(Self {
            state_rx,
            cmd_tx,
            stop_token,
            supervisor: Some(handle),
            local_addr,
        })
    }

    /// Adresse effectivement liée (utile avec le port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Watch channel publishing every state transition.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// État courant.
    pub fn current_state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Requests the streaming loop to start.
    ///
    /// Only legal from the Connected state; from anywhere else the request is
    /// rejected with [`SessionError::NotConnected`].
    pub fn start_streaming(&self) -> Result<(), SessionError> {
        let state = self.current_state();
        if state != SessionState::Connected {
            return Err(SessionError::NotConnected(state));
        }
        self.cmd_tx
            .try_send(SessionCommand::StartStreaming)
            .map_err(|_| SessionError::ControllerGone)
    }

    /// Requests the streaming loop to pause, back to Connected.
    pub fn stop_streaming(&self) -> Result<(), SessionError> {
        let state = self.current_state();
        if state != SessionState::Streaming {
            return Err(SessionError::NotStreaming(state));
        }
        self.cmd_tx
            .try_send(SessionCommand::StopStreaming)
            .map_err(|_| SessionError::ControllerGone)
    }

    /// Stops the controller from any state: Closing, then Idle.
    ///
    /// Cancels the supervisor (unblocking a pending accept or a blocked
    /// reply read), closes the active session and the listener, and waits
    /// for the task to finish. No task is left blocked.
    pub async fn stop(mut self) -> Result<(), SessionError> {
        self.stop_token.cancel();
        if let Some(handle) = self.supervisor.take() {
            handle.await.map_err(|_| SessionError::ControllerGone)?;
        }
        Ok(())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Un contrôleur lâché sans stop() ne doit pas laisser la tâche vivre.
        self.stop_token.cancel();
    }
}

/// Issue d'une session servie.
enum SessionOutcome {
    /// Le pair a disparu ; on retourne écouter.
    PeerGone,
    /// Un stop() global est en cours.
    Stop,
}

/// Issue de la boucle de streaming.
enum StreamEnd {
    /// stop_streaming() reçu ; retour en Connected sur la même session.
    Paused,
    PeerGone,
    Stop,
}

struct Supervisor {
    listener: TcpListener,
    source: Box<dyn ChunkSource>,
    publisher: PairPublisher,
    block_len: usize,
    state: watch::Sender<SessionState>,
    commands: mpsc::Receiver<SessionCommand>,
    stop: CancellationToken,
}

impl Supervisor {
    /// Boucle accept/supervision : une connexion à la fois.
    async fn run(mut self) {
        loop {
            self.set_state(SessionState::Listening);

            tokio::select! {
                _ = self.stop.cancelled() => break,

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("accept failed: {}", err);
                            break;
                        }
                    };
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed for {}: {}", peer, err);
                    }
                    info!("compute node attached from {}", peer);

                    // Des commandes émises entre deux sessions visaient la
                    // précédente ; elles ne valent rien pour celle-ci.
                    while self.commands.try_recv().is_ok() {}

                    let mut session = Session::new(stream, peer);
                    let outcome = self.serve(&mut session).await;
                    session.close().await;

                    match outcome {
                        SessionOutcome::PeerGone => {
                            info!("session with {} over, listening again", peer);
                        }
                        SessionOutcome::Stop => break,
                    }
                }
            }
        }

        self.set_state(SessionState::Closing);
        // Le listener et la session sont fermés avec le Supervisor.
        self.set_state(SessionState::Idle);
        debug!("session supervisor terminated");
    }

    /// Sert une session attachée : attend les commandes, sonde la vie du
    /// pair, et délègue à la boucle de streaming sur demande.
    async fn serve(&mut self, session: &mut Session) -> SessionOutcome {
        self.set_state(SessionState::Connected);

        let mut probe = time::interval(IDLE_PROBE_PERIOD);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Le premier tick part immédiatement ; on le consomme.
        probe.tick().await;

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return SessionOutcome::Stop,

                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::StartStreaming) => {
                        match self.stream_blocks(session).await {
                            StreamEnd::Paused => {
                                self.set_state(SessionState::Connected);
                                probe.reset();
                            }
                            StreamEnd::PeerGone => return SessionOutcome::PeerGone,
                            StreamEnd::Stop => return SessionOutcome::Stop,
                        }
                    }
                    // Pas de streaming en cours : rien à arrêter.
                    Some(SessionCommand::StopStreaming) => {}
                    None => return SessionOutcome::Stop,
                },

                _ = probe.tick() => {
                    if peer_closed(session.stream_mut()) {
                        info!("peer {} left while idle", session.peer());
                        return SessionOutcome::PeerGone;
                    }
                }
            }
        }
    }

    /// La boucle de streaming proprement dite.
    ///
    /// Les commandes sont relevées entre deux cycles seulement, jamais au
    /// milieu d'un cycle : l'alternance stricte requête/réponse du protocole
    /// est ainsi préservée quand le streaming reprend sur la même session.
    async fn stream_blocks(&mut self, session: &mut Session) -> StreamEnd {
        self.set_state(SessionState::Streaming);

        let sample_rate = self.source.sample_rate();
        let pacing = Duration::from_secs_f64(
            PACING_FRACTION * self.block_len as f64 / sample_rate as f64,
        );
        info!(
            "streaming to {}: {} samples per block at {} Hz",
            session.peer(),
            self.block_len,
            sample_rate
        );

        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::StopStreaming) => {
                    info!("streaming paused");
                    return StreamEnd::Paused;
                }
                Ok(SessionCommand::StartStreaming) => {} // déjà en cours
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => return StreamEnd::Stop,
            }

            tokio::select! {
                _ = self.stop.cancelled() => return StreamEnd::Stop,

                cycle = run_cycle(
                    self.source.as_mut(),
                    session,
                    &self.publisher,
                    self.block_len,
                    sample_rate,
                    pacing,
                ) => match cycle {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("compute node closed the stream");
                        return StreamEnd::PeerGone;
                    }
                    Err(err) => {
                        warn!("transport error during streaming: {}", err);
                        return StreamEnd::PeerGone;
                    }
                }
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state.send(state);
    }
}

/// Un cycle de streaming : bloc → envoi → réponse → publication → cadence.
///
/// `Ok(false)` signale la fin de flux côté pair (réponse vide ou partielle
/// suivie d'une fermeture), jamais un bloc corrompu.
async fn run_cycle(
    source: &mut dyn ChunkSource,
    session: &mut Session,
    publisher: &PairPublisher,
    block_len: usize,
    sample_rate: u32,
    pacing: Duration,
) -> Result<bool, WireError> {
    let Some(block) = source.next_block() else {
        // Pas encore de données : on attend, ce n'est pas une erreur.
        time::sleep(SOURCE_RETRY_DELAY).await;
        return Ok(true);
    };
    debug_assert_eq!(block.len(), block_len);

    let stream = session.stream_mut();
    splwire::write_sample_block(stream, &block).await?;

    let Some(spectrum) = splwire::read_spectrum_block(stream, block_len).await? else {
        return Ok(false);
    };

    publisher.publish(SpectrumPair {
        samples: Arc::new(block),
        spectrum: Arc::new(spectrum),
        sample_rate,
    });

    time::sleep(pacing).await;
    Ok(true)
}

/// Sonde de vie non bloquante du pair en état Connected.
///
/// Le protocole garantit qu'un pair au repos n'envoie rien : une lecture de
/// zéro octet signifie qu'il a fermé, et des octets inattendus sont une
/// violation de protocole qui condamne la session de la même façon.
fn peer_closed(stream: &mut TcpStream) -> bool {
    let mut byte = [0u8; 1];
    match stream.try_read(&mut byte) {
        Ok(0) => true,
        Ok(_) => {
            warn!("unexpected data from an idle peer, discarding the session");
            true
        }
        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => false,
        Err(err) => {
            warn!("liveness probe failed: {}", err);
            true
        }
    }
}

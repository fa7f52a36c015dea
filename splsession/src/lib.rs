//! # SplSession - Machine à états de session du générateur
//!
//! Ce module héberge le côté générateur du protocole : il accepte une
//! connexion du nœud de calcul à la fois, puis pilote la boucle de streaming
//! qui tire les blocs d'une [`ChunkSource`](splsignal::ChunkSource), les
//! envoie sur le fil et publie chaque paire (bloc, spectre) au visualiseur.
//!
//! # États
//!
//! ```text
//! Idle → Listening → Connected → Streaming
//!                  ↑___________↓
//! ```
//!
//! `Closing` est atteignable depuis n'importe quel état via
//! [`SessionController::stop`]. Une déconnexion du pair ramène en Listening :
//! il n'existe aucun protocole de reconnexion, une session rompue exige un
//! nouvel accept (simplification assumée, pas un défaut).
//!
//! # Arrêt
//!
//! Tout le mécanisme d'arrêt repose sur un `CancellationToken` couplé à
//! `select!` : un accept ou une lecture bloqués sont débloqués par
//! l'annulation, jamais par des drapeaux partagés scrutés en boucle.

use std::io;

pub mod controller;
pub mod events;
pub mod session;

pub use controller::{SessionController, SessionSettings, SessionState};
pub use events::{PairPublisher, SpectrumPair};
pub use session::Session;

/// Errors surfaced by the session layer.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("streaming can only start from the Connected state (currently {0:?})")]
    NotConnected(SessionState),
    #[error("no streaming in progress (currently {0:?})")]
    NotStreaming(SessionState),
    #[error("the session supervisor is no longer running")]
    ControllerGone,
    #[error("block length must be greater than zero")]
    InvalidBlockLen,
    #[error("the source sample rate must be greater than zero")]
    InvalidSampleRate,
}

//! # SplSignal - Sources de blocs d'échantillons
//!
//! Deux sources interchangeables produisent les blocs de N échantillons
//! envoyés au nœud de calcul :
//!
//! - [`SineSource`] : oscillateur sinusoïdal à phase continue
//! - [`WavSource`] : lecture bouclée d'un fichier WAV mono 16 bits
//!
//! Les deux partagent le contrat [`ChunkSource`]. La validation d'un fichier
//! se fait entièrement au chargement : une source invalide n'existe jamais,
//! et aucun état de session n'est modifié par un échec de chargement.

use std::io;

pub mod sine;
pub mod wav;

pub use sine::SineSource;
pub use wav::WavSource;

/// Errors raised while building or validating a signal source.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed WAV file: {0}")]
    Malformed(String),
    #[error("unsupported channel count: {0} (the file must be mono)")]
    UnsupportedChannels(u16),
    #[error("unsupported bit depth: {0} (the file must be 16-bit PCM)")]
    UnsupportedBitDepth(u16),
    #[error("unsupported WAV encoding: {0} (only integer PCM is accepted)")]
    UnsupportedEncoding(u16),
    #[error("file holds {samples} samples, shorter than one block of {block_len}")]
    ShorterThanBlock { samples: usize, block_len: usize },
}

/// Contract shared by all block producers.
///
/// `next_block` returns `None` when the source has no data ready yet; the
/// caller pauses briefly and retries, it is not an error. When a block is
/// returned it always holds exactly the source's block length.
pub trait ChunkSource: Send {
    /// Produces the next block of samples, or `None` if no data is ready.
    fn next_block(&mut self) -> Option<Vec<i16>>;

    /// Sample rate of the produced signal, in Hz.
    ///
    /// Drives both the streaming pacing and the frequency-axis mapping of
    /// the returned spectra.
    fn sample_rate(&self) -> u32;
}

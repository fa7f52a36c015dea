//! # SplDSP - Pipeline spectral de SpectroLink
//!
//! Cette crate fournit les deux moitiés du traitement distant :
//!
//! - [`SpectrumAnalyzer`] : fenêtre de Hann + FFT + magnitude normalisée,
//!   la passe DSP appliquée à chaque bloc d'échantillons.
//! - [`ComputeNode`] : la boucle réception → traitement → envoi exécutée sur
//!   le nœud de calcul distant, avec ses deux registres internes (un bloc
//!   d'entrée, un bloc de sortie) écrasés à chaque cycle.
//!
//! La taille de bloc est fixée à la construction et ne change jamais pendant
//! la vie d'une connexion.

pub mod analyzer;
pub mod node;

pub use analyzer::SpectrumAnalyzer;
pub use node::{ComputeError, ComputeNode};

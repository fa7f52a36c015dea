//! Oscillateur sinusoïdal à phase continue.

use std::f64::consts::PI;

use crate::ChunkSource;

/// Synthetic sine oscillator.
///
/// The phase counter is a monotonically increasing sample index, advanced by
/// one block length per call and never reset. Successive blocks are therefore
/// samples of one continuous sine: there is no discontinuity at block
/// boundaries.
pub struct SineSource {
    frequency: f64,
    amplitude: f64,
    sample_rate: u32,
    block_len: usize,
    phase: u64,
}

impl SineSource {
    /// Crée un oscillateur.
    ///
    /// * `frequency` - fréquence du signal en Hz
    /// * `amplitude` - amplitude crête, en unités d'échantillon i16
    /// * `sample_rate` - taux d'échantillonnage en Hz
    /// * `block_len` - nombre d'échantillons par bloc
    pub fn new(frequency: f64, amplitude: f64, sample_rate: u32, block_len: usize) -> Self {
        Self {
            frequency,
            amplitude,
            sample_rate,
            block_len,
            phase: 0,
        }
    }

    fn sample_at(&self, index: u64) -> i16 {
        let t = index as f64 / self.sample_rate as f64;
        let value = (self.amplitude * (2.0 * PI * self.frequency * t).sin()).round();
        value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

impl ChunkSource for SineSource {
    fn next_block(&mut self) -> Option<Vec<i16>> {
        let block = (0..self.block_len as u64)
            .map(|n| self.sample_at(self.phase + n))
            .collect();
        self.phase += self.block_len as u64;
        Some(block)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_have_the_requested_length() {
        let mut source = SineSource::new(440.0, 15_000.0, 44_100, 2048);
        assert_eq!(source.next_block().unwrap().len(), 2048);
        assert_eq!(source.next_block().unwrap().len(), 2048);
    }

    #[test]
    fn phase_is_continuous_across_block_boundaries() {
        let n = 256;
        let mut source = SineSource::new(997.0, 12_000.0, 8_000, n);
        let first = source.next_block().unwrap();
        let second = source.next_block().unwrap();

        // Les deux blocs doivent être la même sinusoïde évaluée aux indices
        // entiers consécutifs 0..2N.
        let reference = SineSource::new(997.0, 12_000.0, 8_000, n);
        for (i, &sample) in first.iter().chain(second.iter()).enumerate() {
            assert_eq!(sample, reference.sample_at(i as u64), "sample {}", i);
        }
    }

    #[test]
    fn amplitude_is_clipped_to_the_i16_range() {
        let n = 64;
        let mut source = SineSource::new(100.0, 100_000.0, 8_000, n);
        let block = source.next_block().unwrap();
        assert!(block.iter().any(|&s| s == i16::MAX || s == i16::MIN));
    }
}

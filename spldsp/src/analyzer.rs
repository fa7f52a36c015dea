//! Analyse spectrale d'un bloc : fenêtre de Hann, FFT, magnitude.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// One-block spectrum analysis: Hann taper, forward FFT, magnitude / N.
///
/// The analyzer is planned once for a fixed block length and reused for every
/// block of the connection. It is deterministic: the internal FFT buffers are
/// fully overwritten on each call, so identical input blocks always produce
/// identical output blocks.
///
/// Output ordering follows the standard transform convention: index 0 is DC,
/// indices `1..N/2` are ascending positive frequencies, indices `N/2+1..N-1`
/// mirror them as descending negative frequencies.
pub struct SpectrumAnalyzer {
    block_len: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// Plans a forward FFT and precomputes the Hann window for `block_len`.
    pub fn new(block_len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_len);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let window = (0..block_len)
            .map(|n| hann_window(n, block_len))
            .collect();
        Self {
            block_len,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); block_len],
            scratch,
        }
    }

    /// Longueur de bloc pour laquelle l'analyseur a été planifié.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Runs one DSP pass: taper `samples`, transform, write the normalized
    /// magnitudes into `spectrum`.
    ///
    /// # Panics
    ///
    /// Panics if `samples` or `spectrum` does not match the planned block
    /// length; both ends of the protocol agree on it out of band.
    pub fn analyze_into(&mut self, samples: &[i16], spectrum: &mut [f32]) {
        assert_eq!(samples.len(), self.block_len, "sample block length mismatch");
        assert_eq!(spectrum.len(), self.block_len, "spectrum block length mismatch");

        for (slot, (&sample, &w)) in self
            .buffer
            .iter_mut()
            .zip(samples.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample as f32 * w, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = self.block_len as f32;
        for (out, c) in spectrum.iter_mut().zip(self.buffer.iter()) {
            *out = c.norm() / norm;
        }
    }

    /// Variante allouante de [`analyze_into`](Self::analyze_into).
    pub fn analyze(&mut self, samples: &[i16]) -> Vec<f32> {
        let mut spectrum = vec![0f32; self.block_len];
        self.analyze_into(samples, &mut spectrum);
        spectrum
    }
}

/// Hann window coefficient: `0.5 - 0.5 * cos(2π n / (N - 1))`.
pub fn hann_window(index: usize, size: usize) -> f32 {
    0.5 - 0.5 * ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos()
}

//! Lecture bouclée d'un fichier WAV mono 16 bits.
//!
//! Le fichier entier est décodé en mémoire au chargement : la lecture bouclée
//! impose de garder tous les échantillons de toute façon, et toute la
//! validation de format a lieu avant qu'une source n'existe.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::{ChunkSource, SignalError};

// Format PCM entier du chunk `fmt `.
const WAVE_FORMAT_PCM: u16 = 0x0001;

/// Looped playback of a mono 16-bit PCM WAV file.
///
/// `next_block` returns `block_len` samples starting at the cursor and
/// advances it. When fewer than a full block remains, the cursor wraps to the
/// start *before* reading, so every call returns exactly one full block and
/// the file content repeats every `⌈len/N⌉` calls. A trailing partial block
/// of a non-multiple file is skipped on wrap, as in the reference player.
pub struct WavSource {
    samples: Vec<i16>,
    sample_rate: u32,
    block_len: usize,
    cursor: usize,
}

impl WavSource {
    /// Loads and validates a WAV file.
    ///
    /// Rejects anything that is not single-channel 16-bit integer PCM, and
    /// files shorter than one block. A rejected file leaves no trace: no
    /// session state is created or modified.
    pub fn load<P: AsRef<Path>>(path: P, block_len: usize) -> Result<Self, SignalError> {
        let bytes = fs::read(path.as_ref())?;
        let (sample_rate, samples) = parse_wav(&bytes)?;

        if samples.len() < block_len {
            return Err(SignalError::ShorterThanBlock {
                samples: samples.len(),
                block_len,
            });
        }

        info!(
            "loaded {:?}: {} samples at {} Hz",
            path.as_ref(),
            samples.len(),
            sample_rate
        );

        Ok(Self {
            samples,
            sample_rate,
            block_len,
            cursor: 0,
        })
    }

    /// Nombre total d'échantillons du fichier.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl ChunkSource for WavSource {
    fn next_block(&mut self) -> Option<Vec<i16>> {
        if self.cursor + self.block_len > self.samples.len() {
            self.cursor = 0;
        }
        let block = self.samples[self.cursor..self.cursor + self.block_len].to_vec();
        self.cursor += self.block_len;
        Some(block)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// PCM format metadata extracted from the WAV `fmt ` chunk.
struct FmtChunk {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn validate(&self) -> Result<(), SignalError> {
        if self.audio_format != WAVE_FORMAT_PCM {
            return Err(SignalError::UnsupportedEncoding(self.audio_format));
        }
        if self.channels != 1 {
            return Err(SignalError::UnsupportedChannels(self.channels));
        }
        if self.bits_per_sample != 16 {
            return Err(SignalError::UnsupportedBitDepth(self.bits_per_sample));
        }
        if self.sample_rate == 0 {
            return Err(SignalError::Malformed("sample rate must be > 0".into()));
        }
        Ok(())
    }
}

/// Walks the RIFF container and returns `(sample_rate, samples)`.
fn parse_wav(bytes: &[u8]) -> Result<(u32, Vec<i16>), SignalError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" {
        return Err(SignalError::Malformed("missing RIFF header".into()));
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(SignalError::Malformed("missing WAVE signature".into()));
    }

    let mut fmt_chunk: Option<FmtChunk> = None;
    let mut offset = 12usize;

    while offset + 8 <= bytes.len() {
        let chunk_id = &bytes[offset..offset + 4];
        let chunk_size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body = offset + 8;
        if body + chunk_size > bytes.len() {
            return Err(SignalError::Malformed(format!(
                "chunk {:?} overruns the file",
                String::from_utf8_lossy(chunk_id)
            )));
        }

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err(SignalError::Malformed("fmt chunk too small".into()));
                }
                let fmt = FmtChunk {
                    audio_format: u16::from_le_bytes([bytes[body], bytes[body + 1]]),
                    channels: u16::from_le_bytes([bytes[body + 2], bytes[body + 3]]),
                    sample_rate: u32::from_le_bytes([
                        bytes[body + 4],
                        bytes[body + 5],
                        bytes[body + 6],
                        bytes[body + 7],
                    ]),
                    bits_per_sample: u16::from_le_bytes([bytes[body + 14], bytes[body + 15]]),
                };
                fmt.validate()?;
                fmt_chunk = Some(fmt);
            }
            b"data" => {
                let fmt = fmt_chunk
                    .as_ref()
                    .ok_or_else(|| SignalError::Malformed("data chunk before fmt chunk".into()))?;
                if chunk_size % 2 != 0 {
                    return Err(SignalError::Malformed(
                        "data chunk holds a truncated sample".into(),
                    ));
                }
                let samples = bytes[body..body + chunk_size]
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                return Ok((fmt.sample_rate, samples));
            }
            _ => {}
        }

        // Les chunks RIFF sont alignés sur des tailles paires.
        let padded_size = (chunk_size + 1) & !1;
        offset = body + padded_size;
    }

    Err(SignalError::Malformed("no data chunk found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Assemble un fichier WAV minimal en mémoire.
    fn build_wav(channels: u16, bits: u16, sample_rate: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let block_align = channels * (bits / 8).max(1);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    fn write_temp_wav(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn file_content_repeats_exactly_once_per_pass() {
        let samples: Vec<i16> = (0..12).map(|i| i * 111).collect();
        let file = write_temp_wav(&build_wav(1, 16, 8_000, &pcm_bytes(&samples)));

        let mut source = WavSource::load(file.path(), 4).unwrap();
        assert_eq!(source.len(), 12);
        assert!(!source.is_empty());
        assert_eq!(source.sample_rate(), 8_000);

        // ⌈12/4⌉ = 3 appels pour rejouer le fichier entier, puis rebouclage.
        let mut replay = Vec::new();
        for _ in 0..3 {
            replay.extend(source.next_block().unwrap());
        }
        assert_eq!(replay, samples);
        assert_eq!(source.next_block().unwrap(), samples[0..4].to_vec());
    }

    #[test]
    fn non_multiple_file_skips_the_tail_on_wrap() {
        let samples: Vec<i16> = (0..10).map(|i| i as i16).collect();
        let file = write_temp_wav(&build_wav(1, 16, 8_000, &pcm_bytes(&samples)));

        let mut source = WavSource::load(file.path(), 4).unwrap();
        assert_eq!(source.next_block().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(source.next_block().unwrap(), vec![4, 5, 6, 7]);
        // 2 samples left: the cursor wraps before reading.
        assert_eq!(source.next_block().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn stereo_files_are_rejected() {
        let file = write_temp_wav(&build_wav(2, 16, 44_100, &[0u8; 64]));
        match WavSource::load(file.path(), 4) {
            Err(SignalError::UnsupportedChannels(2)) => {}
            other => panic!("expected UnsupportedChannels, got {:?}", other.err()),
        }
    }

    #[test]
    fn eight_bit_files_are_rejected() {
        let file = write_temp_wav(&build_wav(1, 8, 44_100, &[0u8; 64]));
        match WavSource::load(file.path(), 4) {
            Err(SignalError::UnsupportedBitDepth(8)) => {}
            other => panic!("expected UnsupportedBitDepth, got {:?}", other.err()),
        }
    }

    #[test]
    fn files_shorter_than_one_block_are_rejected() {
        let samples: Vec<i16> = vec![1, 2, 3];
        let file = write_temp_wav(&build_wav(1, 16, 44_100, &pcm_bytes(&samples)));
        match WavSource::load(file.path(), 8) {
            Err(SignalError::ShorterThanBlock {
                samples: 3,
                block_len: 8,
            }) => {}
            other => panic!("expected ShorterThanBlock, got {:?}", other.err()),
        }
    }

    #[test]
    fn garbage_is_rejected_as_malformed() {
        let file = write_temp_wav(b"definitely not a RIFF container");
        assert!(matches!(
            WavSource::load(file.path(), 4),
            Err(SignalError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_chunks_before_data_are_skipped() {
        let samples: Vec<i16> = (0..8).collect();
        let mut wav = build_wav(1, 16, 22_050, &pcm_bytes(&samples));
        // Insère un chunk LIST (taille impaire, donc paddé) entre fmt et data.
        let list: &[u8] = b"LIST\x05\x00\x00\x00INFOx\x00";
        let data_at = wav.windows(4).position(|w| w == b"data").unwrap();
        wav.splice(data_at..data_at, list.iter().copied());

        let file = write_temp_wav(&wav);
        let mut source = WavSource::load(file.path(), 8).unwrap();
        assert_eq!(source.sample_rate(), 22_050);
        assert_eq!(source.next_block().unwrap(), samples);
    }
}

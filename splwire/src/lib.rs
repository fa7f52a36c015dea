//! # SplWire - Block framing for the analysis protocol
//!
//! The SpectroLink wire protocol exchanges fixed-size blocks over a stream
//! socket: N little-endian `i16` samples in one direction, N little-endian
//! `f32` magnitudes in the other. There is no length prefix and no handshake;
//! both ends agree on N out of band and the first message on a new connection
//! is immediately a sample block.
//!
//! Reads and writes are exact-length: a read never surfaces a partial block
//! to the caller. The only way a read returns less than a full block is when
//! the peer has closed the connection, and that is reported as end of stream,
//! never as a malformed block.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Nombre d'octets par échantillon sur le fil (i16 little-endian).
pub const SAMPLE_BYTES: usize = 2;
/// Nombre d'octets par magnitude sur le fil (f32 little-endian).
pub const MAGNITUDE_BYTES: usize = 4;

/// Errors that can occur while framing blocks on the wire.
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fills `buf` completely, accumulating across partial reads.
///
/// Returns `Ok(false)` if the peer closed the connection before `buf` was
/// full. A clean close (zero bytes read) and a close after a short read are
/// both end of stream; the caller never sees the partial bytes.
async fn read_block_bytes<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            if filled > 0 {
                trace!(
                    "peer closed mid-block after {} of {} bytes",
                    filled,
                    buf.len()
                );
            }
            return Ok(false);
        }
        filled += read;
    }
    Ok(true)
}

/// Reads exactly `block.len() * 2` bytes and decodes them into `block`.
///
/// Returns `Ok(false)` on end of stream; `block` content is then unspecified.
pub async fn read_sample_block_into<R>(
    reader: &mut R,
    block: &mut [i16],
) -> Result<bool, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = vec![0u8; block.len() * SAMPLE_BYTES];
    if !read_block_bytes(reader, &mut bytes).await? {
        return Ok(false);
    }
    for (sample, pair) in block.iter_mut().zip(bytes.chunks_exact(SAMPLE_BYTES)) {
        *sample = i16::from_le_bytes([pair[0], pair[1]]);
    }
    Ok(true)
}

/// Reads one sample block of `block_len` samples.
///
/// Returns `Ok(None)` when the peer has closed the connection.
pub async fn read_sample_block<R>(
    reader: &mut R,
    block_len: usize,
) -> Result<Option<Vec<i16>>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut block = vec![0i16; block_len];
    if read_sample_block_into(reader, &mut block).await? {
        Ok(Some(block))
    } else {
        Ok(None)
    }
}

/// Writes a sample block as `block.len() * 2` little-endian bytes.
///
/// A partial write is always completed before returning; failure to complete
/// it is fatal to the session.
pub async fn write_sample_block<W>(writer: &mut W, block: &[i16]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = Vec::with_capacity(block.len() * SAMPLE_BYTES);
    for sample in block {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly `block.len() * 4` bytes and decodes them into `block`.
///
/// Returns `Ok(false)` on end of stream; `block` content is then unspecified.
pub async fn read_spectrum_block_into<R>(
    reader: &mut R,
    block: &mut [f32],
) -> Result<bool, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = vec![0u8; block.len() * MAGNITUDE_BYTES];
    if !read_block_bytes(reader, &mut bytes).await? {
        return Ok(false);
    }
    for (value, quad) in block.iter_mut().zip(bytes.chunks_exact(MAGNITUDE_BYTES)) {
        *value = f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
    }
    Ok(true)
}

/// Reads one spectrum block of `block_len` magnitudes.
///
/// Returns `Ok(None)` when the peer has closed the connection.
pub async fn read_spectrum_block<R>(
    reader: &mut R,
    block_len: usize,
) -> Result<Option<Vec<f32>>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut block = vec![0f32; block_len];
    if read_spectrum_block_into(reader, &mut block).await? {
        Ok(Some(block))
    } else {
        Ok(None)
    }
}

/// Writes a spectrum block as `block.len() * 4` little-endian bytes.
pub async fn write_spectrum_block<W>(writer: &mut W, block: &[f32]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = Vec::with_capacity(block.len() * MAGNITUDE_BYTES);
    for value in block {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exact_bytes_make_exactly_one_block() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent: Vec<i16> = (0..8).map(|i| i * 100 - 300).collect();
        write_sample_block(&mut client, &sent).await.unwrap();

        let received = read_sample_block(&mut server, 8).await.unwrap();
        assert_eq!(received, Some(sent));
    }

    #[tokio::test]
    async fn short_read_then_close_is_end_of_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        // 5 bytes is not even a whole number of samples.
        client.write_all(&[1, 2, 3, 4, 5]).await.unwrap();
        drop(client);

        let received = read_sample_block(&mut server, 8).await.unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn clean_close_is_end_of_stream() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);

        assert_eq!(read_sample_block(&mut server, 8).await.unwrap(), None);
        assert_eq!(read_spectrum_block(&mut server, 8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn split_writes_accumulate_into_one_block() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent: Vec<i16> = (0..16).map(|i| i as i16).collect();
        let mut bytes = Vec::new();
        for sample in &sent {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let writer = tokio::spawn(async move {
            // Dribble the block out in 3 pieces.
            client.write_all(&bytes[..7]).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            client.write_all(&bytes[7..20]).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            client.write_all(&bytes[20..]).await.unwrap();
        });

        let received = read_sample_block(&mut server, 16).await.unwrap();
        assert_eq!(received, Some(sent));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn spectrum_block_survives_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent: Vec<f32> = vec![0.0, 1.5, 3.25, 0.125];
        write_spectrum_block(&mut client, &sent).await.unwrap();

        let mut received = vec![0f32; 4];
        assert!(read_spectrum_block_into(&mut server, &mut received)
            .await
            .unwrap());
        assert_eq!(received, sent);
    }
}

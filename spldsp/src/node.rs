//! Boucle du nœud de calcul distant.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use splwire::WireError;

use crate::analyzer::SpectrumAnalyzer;

/// Errors terminating a compute-node loop.
#[derive(thiserror::Error, Debug)]
pub enum ComputeError {
    #[error("transport error: {0}")]
    Wire(#[from] WireError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Remote compute node: receives sample blocks, returns magnitude spectra.
///
/// The node owns exactly one input register and one output register, both
/// overwritten on every cycle. There is no history and no accumulation: the
/// reply to a block depends only on that block.
pub struct ComputeNode {
    analyzer: SpectrumAnalyzer,
    input: Vec<i16>,
    output: Vec<f32>,
}

impl ComputeNode {
    /// Crée un nœud de calcul pour des blocs de `block_len` échantillons.
    pub fn new(block_len: usize) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(block_len),
            input: vec![0i16; block_len],
            output: vec![0f32; block_len],
        }
    }

    /// Taille de bloc du protocole.
    pub fn block_len(&self) -> usize {
        self.input.len()
    }

    /// Runs the receive → process → send loop until the peer closes the
    /// connection or a transport error occurs.
    ///
    /// End of stream is a normal termination and returns `Ok(())`. Either
    /// outcome ends this loop only, never the host process.
    pub async fn run<S>(&mut self, stream: &mut S) -> Result<(), ComputeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut cycles = 0u64;
        loop {
            if !splwire::read_sample_block_into(stream, &mut self.input).await? {
                debug!("peer closed the connection after {} cycles", cycles);
                return Ok(());
            }

            self.analyzer.analyze_into(&self.input, &mut self.output);

            splwire::write_spectrum_block(stream, &self.output).await?;
            cycles += 1;
        }
    }

    /// Connects to the generator at `addr` and runs the loop to completion.
    ///
    /// Supplement au protocole proprement dit : c'est le `main` du binaire
    /// nœud. Pas de reconnexion automatique, une connexion rompue termine
    /// simplement la boucle.
    pub async fn connect_and_run(&mut self, addr: &str) -> Result<(), ComputeError> {
        info!("connecting to generator at {}", addr);
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("connected, block length {} samples", self.block_len());

        match self.run(&mut stream).await {
            Ok(()) => {
                info!("generator closed the stream, compute loop done");
                Ok(())
            }
            Err(err) => {
                warn!("compute loop aborted: {}", err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_block_in_one_spectrum_out() {
        let n = 64;
        let (mut generator, mut node_side) = tokio::io::duplex(n * 8);

        let node = tokio::spawn(async move {
            let mut node = ComputeNode::new(n);
            node.run(&mut node_side).await.unwrap();
        });

        let block: Vec<i16> = (0..n as i16).collect();
        splwire::write_sample_block(&mut generator, &block)
            .await
            .unwrap();

        let spectrum = splwire::read_spectrum_block(&mut generator, n)
            .await
            .unwrap()
            .expect("node should reply with a spectrum block");
        assert_eq!(spectrum.len(), n);
        assert!(spectrum.iter().all(|&m| m >= 0.0));

        drop(generator);
        node.await.unwrap();
    }

    #[tokio::test]
    async fn requests_and_replies_strictly_alternate() {
        let n = 32;
        let (mut generator, mut node_side) = tokio::io::duplex(n * 8);

        let node = tokio::spawn(async move {
            let mut node = ComputeNode::new(n);
            node.run(&mut node_side).await.unwrap();
        });

        for value in [0i16, 100, -100] {
            splwire::write_sample_block(&mut generator, &vec![value; n])
                .await
                .unwrap();
            let spectrum = splwire::read_spectrum_block(&mut generator, n)
                .await
                .unwrap()
                .expect("one reply per request");
            assert_eq!(spectrum.len(), n);
        }

        drop(generator);
        node.await.unwrap();
    }

    #[tokio::test]
    async fn partial_block_then_close_ends_loop_cleanly() {
        let n = 32;
        let (mut generator, mut node_side) = tokio::io::duplex(n * 8);

        let node = tokio::spawn(async move {
            let mut node = ComputeNode::new(n);
            node.run(&mut node_side).await
        });

        use tokio::io::AsyncWriteExt;
        generator.write_all(&[0u8; 11]).await.unwrap();
        drop(generator);

        // Never treated as a malformed block.
        node.await.unwrap().unwrap();
    }
}

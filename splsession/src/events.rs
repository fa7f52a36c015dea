//! Livraison des paires (bloc, spectre) au visualiseur.
//!
//! Le cœur ne connaît aucune affinité de thread : les paires partent dans des
//! channels MPSC et le visualiseur les consomme où bon lui semble. Un abonné
//! lent ne doit jamais bloquer la boucle de streaming, d'où `try_send`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

/// One streaming cycle's worth of data for the visualizer.
#[derive(Debug, Clone)]
pub struct SpectrumPair {
    /// Le bloc d'échantillons tel qu'envoyé au nœud de calcul.
    pub samples: Arc<Vec<i16>>,
    /// Le spectre de magnitudes renvoyé pour ce bloc.
    pub spectrum: Arc<Vec<f32>>,
    /// Taux d'échantillonnage actif, pour l'axe des fréquences.
    pub sample_rate: u32,
}

/// Fan-out of [`SpectrumPair`]s to any number of subscribers.
///
/// Publishing uses `try_send`: a subscriber whose channel is full simply
/// misses that pair. Visualization is best-effort display, the protocol loop
/// must keep its pacing.
pub struct PairPublisher {
    subscribers: Vec<mpsc::Sender<SpectrumPair>>,
}

impl PairPublisher {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Ajoute un abonné via son channel.
    pub fn subscribe(&mut self, tx: mpsc::Sender<SpectrumPair>) {
        self.subscribers.push(tx);
    }

    /// Publie une paire à tous les abonnés, sans jamais bloquer.
    pub fn publish(&self, pair: SpectrumPair) {
        for tx in &self.subscribers {
            if tx.try_send(pair.clone()).is_err() {
                debug!("visualizer subscriber is behind, dropping one pair");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for PairPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(rate: u32) -> SpectrumPair {
        SpectrumPair {
            samples: Arc::new(vec![1, 2, 3, 4]),
            spectrum: Arc::new(vec![0.0, 0.5, 0.25, 0.5]),
            sample_rate: rate,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_pair() {
        let mut publisher = PairPublisher::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        publisher.subscribe(tx1);
        publisher.subscribe(tx2);
        assert_eq!(publisher.subscriber_count(), 2);

        publisher.publish(pair(44_100));

        assert_eq!(rx1.recv().await.unwrap().sample_rate, 44_100);
        assert_eq!(rx2.recv().await.unwrap().sample_rate, 44_100);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_pairs_without_blocking() {
        let mut publisher = PairPublisher::new();
        let (tx, mut rx) = mpsc::channel(1);
        publisher.subscribe(tx);

        publisher.publish(pair(8_000));
        publisher.publish(pair(16_000)); // channel plein : perdue, sans blocage

        assert_eq!(rx.recv().await.unwrap().sample_rate, 8_000);
        assert!(rx.try_recv().is_err());
    }
}

//! Serveur générateur SpectroLink (sans interface graphique).
//!
//! Charge la configuration, construit la source de signal, démarre le
//! contrôleur de session et lance le streaming dès qu'un nœud de calcul
//! s'attache. Les spectres reçus sont résumés dans les logs : le panneau de
//! contrôle graphique est un collaborateur externe branché sur le même
//! channel de paires.

use anyhow::Result;
use splconfig::Config;
use splsession::{PairPublisher, SessionController, SessionSettings, SessionState, SpectrumPair};
use splsignal::{ChunkSource, SineSource, WavSource};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // ========== PHASE 1 : Configuration et source ==========

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    let source: Box<dyn ChunkSource> = match &config.wav_path {
        Some(path) => {
            let wav = WavSource::load(path, config.block_len)?;
            info!(
                "🎵 WAV source: {} samples at {} Hz, looped",
                wav.len(),
                wav.sample_rate()
            );
            Box::new(wav)
        }
        None => {
            info!(
                "🎵 Sine source: {} Hz, amplitude {}, {} Hz sample rate",
                config.sine.frequency, config.sine.amplitude, config.sample_rate
            );
            Box::new(SineSource::new(
                config.sine.frequency,
                config.sine.amplitude,
                config.sample_rate,
                config.block_len,
            ))
        }
    };

    // ========== PHASE 2 : Contrôleur de session ==========

    let mut publisher = PairPublisher::new();
    let (pairs_tx, mut pairs_rx) = mpsc::channel(64);
    publisher.subscribe(pairs_tx);

    let settings = SessionSettings {
        listen_addr: config.listen_addr()?,
        block_len: config.block_len,
    };
    let controller = SessionController::start(settings, source, publisher).await?;
    info!("📡 Waiting for a compute node on {}", controller.local_addr());

    // Visualiseur console : résume chaque spectre reçu.
    let visualizer = tokio::spawn(async move {
        while let Some(pair) = pairs_rx.recv().await {
            log_spectrum(&pair);
        }
    });

    // ========== PHASE 3 : Boucle de contrôle ==========

    // Dès qu'un nœud s'attache, le streaming démarre ; Ctrl+C arrête tout.
    info!("Press Ctrl+C to stop...");
    let mut state = controller.state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == SessionState::Connected {
                    if let Err(err) = controller.start_streaming() {
                        warn!("⚠️ Failed to start streaming: {}", err);
                    }
                }
            }
        }
    }

    info!("🌐 Shutting down...");
    controller.stop().await?;
    visualizer.await?;
    info!("✅ SpectroLink stopped cleanly");
    Ok(())
}

/// Logge le bin dominant de la moitié utile du spectre.
fn log_spectrum(pair: &SpectrumPair) {
    let n = pair.spectrum.len();
    let Some(peak_bin) = (1..n / 2).max_by(|&a, &b| {
        pair.spectrum[a]
            .partial_cmp(&pair.spectrum[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return;
    };
    let freq = peak_bin as f64 * pair.sample_rate as f64 / n as f64;
    info!(
        "spectrum: dominant bin {} (~{:.0} Hz), magnitude {:.1}",
        peak_bin, freq, pair.spectrum[peak_bin]
    );
}

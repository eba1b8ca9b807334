use noisewatch_meter::{DisplayUpdate, PresentationSink};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Fans display updates out to every subscribed view.
pub struct BroadcastSink {
    tx: broadcast::Sender<DisplayUpdate>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<DisplayUpdate>) -> Self {
        Self { tx }
    }
}

impl PresentationSink for BroadcastSink {
    fn publish(&mut self, update: DisplayUpdate) {
        match self.tx.send(update) {
            Ok(receivers) => {
                tracing::trace!(receivers, "Display update published");
            }
            Err(_) => {
                tracing::trace!("No display subscribers, update dropped");
            }
        }
    }
}

/// Console view: renders updates into the structured log. Per-tick updates
/// land at trace so the default filter shows only interval results and
/// warnings. Exits when the sender side is dropped.
pub fn spawn_console_presenter(mut rx: broadcast::Receiver<DisplayUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(DisplayUpdate::Series(sample)) => {
                    tracing::trace!(
                        t = sample.timestamp,
                        db = sample.value_db,
                        "Loudness sample"
                    );
                }
                Ok(DisplayUpdate::Interval(average)) => {
                    tracing::info!(
                        interval = average.index,
                        mean_db = average.mean_db,
                        "Interval average"
                    );
                }
                Ok(DisplayUpdate::Warning(warning)) => {
                    tracing::warn!("{}", warning.message);
                }
                Ok(DisplayUpdate::Scale(band)) => {
                    tracing::trace!(level = band.level, color = band.color.name(), "Intensity band");
                }
                Ok(DisplayUpdate::Status(message)) => {
                    tracing::warn!("{}", message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Console presenter lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

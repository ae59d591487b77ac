//! Background services.

use crate::types::Event;

use super::MediaRelay;

impl MediaRelay {
    /// Start the task that evicts expired terminal jobs from the registry
    ///
    /// Sweeps every `registry.sweep_interval` until shutdown completes.
    pub(crate) fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let relay = self.clone();
        let shutdown = self.tracking.shutdown.clone();
        let period = self.config.registry.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = relay.registry.sweep().await;
                        if !evicted.is_empty() {
                            tracing::debug!(count = evicted.len(), "Evicted expired jobs");
                        }
                        for id in evicted {
                            relay.emit_event(Event::Evicted { id });
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Registry sweeper stopped");
                        break;
                    }
                }
            }
        });

        tracing::info!(interval = ?period, "Registry sweeper started");
        handle
    }
}

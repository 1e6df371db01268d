//! Async-sync bridge for layout ticks
//!
//! The periodic driver runs on the tokio runtime while the host scheduler consumes
//! reflows synchronously. Engines publish every completed step into a bounded
//! crossbeam channel; the stage drains it from the host side.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use uuid::Uuid;

use crate::events::{TickCompleted, TickEvent};
use crate::layout::TickListener;

pub mod ticker;

pub use ticker::Ticker;

/// Capacity of the tick channel
const CHANNEL_CAPACITY: usize = 1000;

/// Maximum number of tick messages handed out per drain
const DRAIN_BATCH: usize = 100;

/// Channel carrying tick notifications from the simulation to the host
pub struct TickBridge {
    tick_tx: Sender<TickCompleted>,
    tick_rx: Receiver<TickCompleted>,
}

impl TickBridge {
    pub fn new() -> Self {
        let (tick_tx, tick_rx) = bounded(CHANNEL_CAPACITY);
        Self { tick_tx, tick_rx }
    }

    /// Listener to install on the engine; it never blocks the simulation
    pub fn listener(&self, stage_id: Uuid) -> TickListener {
        let tx = self.tick_tx.clone();
        Box::new(move |event: &TickEvent| {
            match tx.try_send(TickCompleted::new(stage_id, event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        %stage_id,
                        tick = event.tick,
                        "tick channel full, notification dropped"
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!(%stage_id, "tick channel closed");
                }
            }
        })
    }

    /// Receive pending tick notifications (sync side)
    pub fn receive(&self) -> Vec<TickCompleted> {
        let mut ticks = Vec::new();

        while let Ok(tick) = self.tick_rx.try_recv() {
            ticks.push(tick);

            // Limit batch size so one drain cannot starve the host
            if ticks.len() >= DRAIN_BATCH {
                break;
            }
        }

        ticks
    }

    /// Discard pending notifications
    pub fn clear(&self) -> usize {
        self.tick_rx.try_iter().count()
    }

    pub fn pending(&self) -> usize {
        self.tick_rx.len()
    }
}

impl Default for TickBridge {
    fn default() -> Self {
        Self::new()
    }
}

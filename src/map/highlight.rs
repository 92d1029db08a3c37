use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::mapper::MapperChannels;

/// Number of visibility toggles before the highlight clears itself.
pub const BLINK_TOGGLES: usize = 7;
pub const BLINK_INTERVAL: Duration = Duration::from_millis(160);

/// Runs at most one blink sequence; starting a new one cancels the old.
#[derive(Default)]
pub(crate) struct Blinker {
    task: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
}

impl Blinker {
    pub(crate) fn restart(&self, channels: Arc<MapperChannels>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no async runtime, highlight will not blink or clear itself");
                return;
            }
        };

        let current = Arc::clone(&self.generation);
        *task = Some(handle.spawn(async move {
            for _ in 0..BLINK_TOGGLES {
                tokio::time::sleep(BLINK_INTERVAL).await;
                if current.load(Ordering::Acquire) != generation {
                    return;
                }
                channels.highlight.send_modify(|highlight| {
                    if let Some(highlight) = highlight {
                        highlight.visible = !highlight.visible;
                    }
                });
            }
            if current.load(Ordering::Acquire) == generation {
                debug!("highlight sequence finished");
                channels.highlight.send_replace(None);
                channels.highlight_target.send_replace(None);
            }
        }));
    }

    /// Stop any running sequence without touching the published state.
    pub(crate) fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(previous) = self.task.lock().take() {
            previous.abort();
        }
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use msgwire_frame::Frame;
use tracing::warn;

use crate::config::{OverflowPolicy, QueueConfig};

/// Inbound queue of completed frames shared by the I/O and consumer threads.
///
/// Frames leave in arrival order. Frames from one connection keep their wire
/// order; frames from different connections interleave as they complete.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    ready: Condvar,
    config: QueueConfig,
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Create an empty queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            config,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame. Returns `false` if the overflow policy discarded a frame.
    pub fn push(&self, frame: Frame) -> bool {
        let mut frames = self.lock();
        let mut accepted = true;

        if let Some(max) = self.config.max_frames {
            if frames.len() >= max {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                accepted = false;
                match self.config.overflow {
                    OverflowPolicy::DropNewest => {
                        warn!(origin = %frame.origin(), max, "inbound queue full; dropping frame");
                        return false;
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(oldest) = frames.pop_front() {
                            warn!(origin = %oldest.origin(), max, "inbound queue full; dropping oldest frame");
                        }
                    }
                }
            }
        }

        frames.push_back(frame);
        drop(frames);
        self.ready.notify_all();
        accepted
    }

    /// Take every queued frame without waiting.
    pub fn drain(&self) -> VecDeque<Frame> {
        std::mem::take(&mut *self.lock())
    }

    /// Take every queued frame, waiting up to `timeout` for the first one.
    pub fn wait_drain(&self, timeout: Duration) -> VecDeque<Frame> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.lock();
        while frames.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            frames = self
                .ready
                .wait_timeout(frames, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        std::mem::take(&mut *frames)
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard every queued frame.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Frames discarded by the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue bounds.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

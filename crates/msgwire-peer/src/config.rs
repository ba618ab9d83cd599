use std::time::Duration;

use msgwire_frame::DEFAULT_FRAME_CAPACITY;

/// Default upper bound on frames waiting in the inbound queue.
pub const DEFAULT_MAX_QUEUED_FRAMES: usize = 64 * 1024;

/// Default size of each socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4 * 1024;

/// What the inbound queue does with a frame that arrives while it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the arriving frame.
    #[default]
    DropNewest,
    /// Discard the oldest queued frame to make room.
    DropOldest,
}

/// Inbound queue bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum queued frames. `None` leaves the queue unbounded.
    pub max_frames: Option<usize>,
    /// Policy applied once `max_frames` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_frames: Some(DEFAULT_MAX_QUEUED_FRAMES),
            overflow: OverflowPolicy::DropNewest,
        }
    }
}

/// Configuration shared by [`Client`](crate::Client) and [`Server`](crate::Server).
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Frame buffer capacity in bytes, header included. Default: 4096.
    pub frame_capacity: usize,
    /// Inbound queue bounds.
    pub queue: QueueConfig,
    /// Bytes requested per socket read on the I/O thread.
    pub read_chunk_size: usize,
    /// Bound on each outbound connect attempt.
    pub connect_timeout: Option<Duration>,
    /// Bound on time spent waiting for socket writability during a send.
    pub write_timeout: Option<Duration>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            queue: QueueConfig::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            connect_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

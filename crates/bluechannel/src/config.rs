//! Manager configuration

use crate::l2cap::session::DEFAULT_READ_BUFFER_SIZE;

/// Default number of channel events buffered per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for an [`L2capManager`](crate::l2cap::L2capManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Bytes fetched by a single `read`
    pub read_buffer_size: usize,
    /// Channel events buffered per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerConfig {
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

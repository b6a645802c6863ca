use std::time::Duration;

/// Configuration descriptor for one streaming playback instance
#[derive(Debug, Clone)]
pub struct StreamingDesc {
    /// Number of buffers in the ring, which is also the maximum number of buffers
    /// queued on the device at any time. Small values starve the device, large
    /// values waste memory and lengthen seek latency.
    pub ring_capacity: usize,
    /// Upper bound on every blocking wait of the streaming thread. Disposal and
    /// pause are observed at least this often.
    pub poll_interval: Duration,
    /// How long `play` waits for the first decoded buffer before returning anyway.
    pub first_buffer_timeout: Duration,
    /// Position that looped playback restarts from.
    pub loop_start: Duration,
}

impl Default for StreamingDesc {
    fn default() -> Self {
        Self {
            ring_capacity: 3,
            poll_interval: Duration::from_millis(1),
            first_buffer_timeout: Duration::from_secs(2),
            loop_start: Duration::ZERO,
        }
    }
}

impl StreamingDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_first_buffer_timeout(mut self, timeout: Duration) -> Self {
        self.first_buffer_timeout = timeout;
        self
    }

    pub fn with_loop_start(mut self, loop_start: Duration) -> Self {
        self.loop_start = loop_start;
        self
    }
}

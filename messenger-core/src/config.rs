//! Session tunables.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Incoming delivery window; settled deliveries beyond it are forgotten.
    pub incoming_window: i32,

    /// Outgoing delivery window.
    pub outgoing_window: i32,

    /// Bytes the transport accepts from push before applying backpressure.
    pub input_capacity: usize,

    /// Credit granted to receiver links the remote opened, topped up on each receive pass.
    pub receive_credit: u32,

    /// Idle timeout advertised in Open. `Duration::ZERO` disables remote heartbeats.
    pub idle_timeout: Duration,

    /// Largest encoded frame accepted for sending.
    pub max_frame_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            incoming_window: i32::MAX,
            outgoing_window: i32::MAX,
            input_capacity: 1024 * 1024,
            receive_credit: 1024,
            idle_timeout: Duration::ZERO,
            max_frame_size: crate::wire::MAX_FRAME_LEN,
        }
    }
}

impl SessionConfig {
    pub fn with_windows(mut self, incoming: i32, outgoing: i32) -> Self {
        self.incoming_window = incoming;
        self.outgoing_window = outgoing;
        self
    }

    pub fn with_input_capacity(mut self, bytes: usize) -> Self {
        self.input_capacity = bytes;
        self
    }

    pub fn with_receive_credit(mut self, credit: u32) -> Self {
        self.receive_credit = credit;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, bytes: u32) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub(crate) fn idle_timeout_ms(&self) -> u32 {
        self.idle_timeout.as_millis().min(u32::MAX as u128) as u32
    }
}

/// Window as a queue bound; negative means unbounded.
pub(crate) fn window_len(window: i32) -> usize {
    if window < 0 {
        usize::MAX
    } else {
        window as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let c = SessionConfig::default()
            .with_receive_credit(5)
            .with_idle_timeout(Duration::from_secs(3))
            .with_windows(10, 20);
        assert_eq!(c.receive_credit, 5);
        assert_eq!(c.idle_timeout_ms(), 3000);
        assert_eq!(c.incoming_window, 10);
        assert_eq!(c.outgoing_window, 20);
        assert_eq!(c.input_capacity, SessionConfig::default().input_capacity);
    }

    #[test]
    fn negative_window_is_unbounded() {
        assert_eq!(window_len(-1), usize::MAX);
        assert_eq!(window_len(3), 3);
    }
}

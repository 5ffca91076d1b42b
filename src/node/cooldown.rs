//! Cooldown guard - per-node throttles
//!
//! Lives inside the node's mutex next to the state it protects, so a check and
//! the write that follows it can never interleave with another request.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::NodeConfig;

#[derive(Debug, Clone)]
pub struct CooldownGuard {
    collect_interval: Duration,
    send_interval: Duration,
    next_collect: Option<Instant>,
    next_send: Option<Instant>,
}

impl CooldownGuard {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            collect_interval: config.collect_cooldown(),
            send_interval: config.send_cooldown(),
            next_collect: None,
            next_send: None,
        }
    }

    /// Time left before the next manual collection, `None` when allowed
    pub fn collect_remaining(&self, now: Instant) -> Option<Duration> {
        remaining(self.next_collect, now)
    }

    pub fn start_collect(&mut self, now: Instant) {
        self.next_collect = Some(now + self.collect_interval);
    }

    /// Time left before the next outbound resource send, `None` when allowed
    pub fn send_remaining(&self, now: Instant) -> Option<Duration> {
        remaining(self.next_send, now)
    }

    pub fn start_send(&mut self, now: Instant) {
        self.next_send = Some(now + self.send_interval);
    }

    pub fn clear(&mut self) {
        self.next_collect = None;
        self.next_send = None;
    }
}

fn remaining(ready_at: Option<Instant>, now: Instant) -> Option<Duration> {
    let ready_at = ready_at?;
    (ready_at > now).then(|| ready_at - now)
}

/// Round a wait up to whole seconds for display
pub fn whole_seconds(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

//! Inbound message limits.
//!
//! Each connection owns a [`ConnectionIngress`]: a token bucket for message
//! rate and a counter of consecutive invalid frames. New connections from
//! one address are throttled separately by [`ConnectionThrottle`].

use crate::config::IngressLimits;
use crate::error::IngressError;
use log::warn;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_second: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_per_second,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Takes one token if available.
    pub fn try_take(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Consecutive invalid frames. Any valid frame clears the count.
#[derive(Debug, Clone)]
pub struct InvalidCounter {
    threshold: u32,
    count: u32,
}

impl InvalidCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            count: 0,
        }
    }

    /// Returns true once the threshold is reached.
    pub fn record_invalid(&mut self) -> bool {
        self.count += 1;
        self.count >= self.threshold
    }

    pub fn record_valid(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// What the reader should do with a frame that failed a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Drop,
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct ConnectionIngress {
    max_frame_bytes: usize,
    bucket: TokenBucket,
    invalid: InvalidCounter,
}

impl ConnectionIngress {
    pub fn new(limits: &IngressLimits, now: Instant) -> Self {
        Self {
            max_frame_bytes: limits.max_frame_bytes,
            bucket: TokenBucket::new(limits.bucket_capacity, limits.refill_per_second, now),
            invalid: InvalidCounter::new(limits.invalid_threshold),
        }
    }

    /// Checks a frame header before its payload is read.
    pub fn admit(&mut self, len: usize, now: Instant) -> Result<(), IngressError> {
        if len > self.max_frame_bytes {
            return Err(IngressError::Oversized(len));
        }
        if !self.bucket.try_take(now) {
            return Err(IngressError::RateLimited);
        }
        Ok(())
    }

    pub fn accept(&mut self) {
        self.invalid.record_valid();
    }

    /// Records a failed frame and decides what happens to the connection.
    pub fn reject(&mut self, conn_id: u32, error: &IngressError) -> Verdict {
        if !error.counts_as_invalid() {
            return Verdict::Drop;
        }
        if self.invalid.record_invalid() {
            warn!(
                "Connection {} sent {} invalid messages in a row, last: {}",
                conn_id,
                self.invalid.count(),
                error
            );
            Verdict::Disconnect
        } else {
            Verdict::Drop
        }
    }
}

/// Sliding-window limit on new connections per source address.
#[derive(Debug, Clone)]
pub struct ConnectionThrottle {
    burst: usize,
    window: Duration,
    recent: HashMap<IpAddr, VecDeque<Instant>>,
}

impl ConnectionThrottle {
    pub fn new(burst: usize, window: Duration) -> Self {
        Self {
            burst,
            window,
            recent: HashMap::new(),
        }
    }

    pub fn from_limits(limits: &IngressLimits) -> Self {
        Self::new(limits.connection_burst, limits.connection_window)
    }

    /// Records an attempt from `ip`. Returns false if it exceeds the burst.
    pub fn allow(&mut self, ip: IpAddr, now: Instant) -> bool {
        let window = self.window;
        let attempts = self.recent.entry(ip).or_default();
        while attempts
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            attempts.pop_front();
        }
        if attempts.len() >= self.burst {
            return false;
        }
        attempts.push_back(now);
        true
    }

    /// Forgets addresses with no attempts inside the window.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.recent.retain(|_, attempts| {
            attempts
                .back()
                .is_some_and(|&t| now.saturating_duration_since(t) < window)
        });
    }

    pub fn tracked(&self) -> usize {
        self.recent.len()
    }
}

// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Client-side request throttling.
//!
//! A single token bucket shared by every API call the process makes, so that
//! aggregating many categories across many namespaces cannot flood the API
//! server.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Sustained requests per second
pub const DEFAULT_QPS: u32 = 100;

/// Requests allowed in a burst above the sustained rate
pub const DEFAULT_BURST: u32 = 200;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub qps: u32,
    pub burst: u32,
}

impl RateLimit {
    pub fn new(qps: u32, burst: u32) -> Self {
        Self { qps, burst }
    }

    /// No limit.
    pub fn unlimited() -> Self {
        Self { qps: 0, burst: 0 }
    }

    pub fn is_limited(&self) -> bool {
        self.qps > 0
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(DEFAULT_QPS, DEFAULT_BURST)
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket limiter, cheap to clone (clones share the bucket).
#[derive(Clone)]
pub struct RequestLimiter {
    limiter: Option<Arc<DirectLimiter>>,
    limit: RateLimit,
}

impl RequestLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let limiter = NonZeroU32::new(limit.qps).map(|qps| {
            // Burst never drops below the sustained rate
            let burst = NonZeroU32::new(limit.burst.max(limit.qps)).unwrap_or(qps);
            Arc::new(RateLimiter::direct(Quota::per_second(qps).allow_burst(burst)))
        });
        Self { limiter, limit }
    }

    pub fn unlimited() -> Self {
        Self::new(RateLimit::unlimited())
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Wait until one more request may be sent.
    /// This is a no-op if no limit is set.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

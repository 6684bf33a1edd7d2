//! Fixed-window rate limiter.
//!
//! Each key owns a counter and a reset instant. The first hit opens a window
//! of `decay`; hits inside the window increment the counter; once the window
//! has passed the key starts over.
//!
//! Expired windows are dropped when their key is touched again, by
//! [`RateLimiter::sweep`], and whenever the table grows past its high-water
//! mark, so keys that are never seen twice do not pile up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use pktracker_core::UserId;

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    attempts: u32,
    reset_at: DateTime<Utc>,
}

/// Table size that triggers the first automatic sweep.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct Windows {
    by_key: HashMap<String, Window>,
    /// Next table size at which expired windows are swept.
    high_water: usize,
}

impl Windows {
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.by_key.len();
        self.by_key.retain(|_, w| w.reset_at > now);
        // Live keys are legitimately held; only sweep again once they double.
        self.high_water = (self.by_key.len() * 2).max(SWEEP_THRESHOLD);
        before - self.by_key.len()
    }
}

#[derive(Debug)]
pub struct RateLimiter<C = SystemClock> {
    windows: Mutex<Windows>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            windows: Mutex::new(Windows {
                by_key: HashMap::new(),
                high_water: SWEEP_THRESHOLD,
            }),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn live_window(&self, windows: &mut Windows, key: &str) -> Option<Window> {
        let now = self.clock.now();
        match windows.by_key.get(key) {
            Some(w) if w.reset_at > now => Some(*w),
            Some(_) => {
                windows.by_key.remove(key);
                None
            }
            None => None,
        }
    }

    /// Count one attempt against `key`; returns the attempts in the current window.
    pub fn hit(&self, key: &str, decay: Duration) -> u32 {
        let Ok(mut map) = self.windows.lock() else {
            return 0;
        };
        let now = self.clock.now();

        let window = match self.live_window(&mut map, key) {
            Some(w) => Window {
                attempts: w.attempts.saturating_add(1),
                reset_at: w.reset_at,
            },
            None => {
                if map.by_key.len() >= map.high_water {
                    let dropped = map.sweep(now);
                    tracing::debug!(dropped, live = map.by_key.len(), "rate limiter swept");
                }
                Window {
                    attempts: 1,
                    reset_at: now + decay,
                }
            }
        };
        map.by_key.insert(key.to_string(), window);
        window.attempts
    }

    pub fn attempts(&self, key: &str) -> u32 {
        let Ok(mut map) = self.windows.lock() else {
            return 0;
        };
        self.live_window(&mut map, key).map_or(0, |w| w.attempts)
    }

    pub fn too_many_attempts(&self, key: &str, max_attempts: u32) -> bool {
        self.attempts(key) >= max_attempts
    }

    pub fn remaining(&self, key: &str, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.attempts(key))
    }

    /// Whole seconds until the window for `key` resets (0 when there is none).
    pub fn available_in(&self, key: &str) -> u64 {
        let Ok(mut map) = self.windows.lock() else {
            return 0;
        };
        let now = self.clock.now();
        match self.live_window(&mut map, key) {
            Some(w) => {
                let millis = (w.reset_at - now).num_milliseconds().max(0) as u64;
                millis.div_ceil(1000)
            }
            None => 0,
        }
    }

    pub fn clear(&self, key: &str) {
        if let Ok(mut map) = self.windows.lock() {
            map.by_key.remove(key);
        }
    }

    /// Drop every expired window; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        self.windows.lock().map_or(0, |mut map| map.sweep(now))
    }

    /// Keys currently holding a window, expired or not.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().map_or(0, |map| map.by_key.len())
    }
}

/// Build the limiter key for a named limit.
///
/// `api` and `global` limits follow the user when authenticated and the
/// client IP otherwise; `auth` is always per IP.
pub fn limiter_key(kind: &str, user_id: Option<UserId>, ip: &str) -> String {
    match (kind, user_id) {
        ("api", Some(id)) => format!("api:user:{id}"),
        ("api", None) => format!("api:ip:{ip}"),
        ("auth", _) => format!("auth:ip:{ip}"),
        ("global", Some(id)) => format!("global:user:{id}"),
        ("global", None) => format!("global:ip:{ip}"),
        (other, _) => format!("{other}:ip:{ip}"),
    }
}

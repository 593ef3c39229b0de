use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(60 * 60);

/// Lazy eviction runs at most this often; between runs, expired entries
/// may still suppress a resend, which errs on the quiet side.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Bounded, time-windowed cache of recently delivered notification texts.
///
/// Membership is hash-only (two colliding texts count as duplicates — an
/// accepted false-positive). Entries fall out either by ring capacity or
/// once older than the horizon. State is process-local and lost on
/// restart; the worst case after a restart is a single duplicate
/// notification.
///
/// Not safe for concurrent mutation; callers on multiple tasks must wrap
/// it in a mutex.
pub struct DuplicateSendCache {
    entries: VecDeque<(u64, Instant)>,
    capacity: usize,
    horizon: Duration,
    last_eviction: Instant,
}

impl DuplicateSendCache {
    pub fn new(capacity: usize, horizon: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            horizon,
            last_eviction: Instant::now(),
        }
    }

    fn hash(text: &str) -> u64 {
        let digest = Sha256::digest(text.as_bytes());
        u64::from_be_bytes(digest[..8].try_into().expect("digest is at least 8 bytes"))
    }

    fn evict_expired(&mut self, now: Instant) {
        if now.duration_since(self.last_eviction) < EVICTION_INTERVAL {
            return;
        }
        self.last_eviction = now;
        while let Some((_, sent_at)) = self.entries.front() {
            if now.duration_since(*sent_at) > self.horizon {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn should_suppress(&mut self, text: &str) -> bool {
        self.should_suppress_at(text, Instant::now())
    }

    pub fn record_sent(&mut self, text: &str) {
        self.record_sent_at(text, Instant::now());
    }

    fn should_suppress_at(&mut self, text: &str, now: Instant) -> bool {
        self.evict_expired(now);
        let hash = Self::hash(text);
        self.entries.iter().any(|(h, _)| *h == hash)
    }

    fn record_sent_at(&mut self, text: &str, now: Instant) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((Self::hash(text), now));
    }
}

impl Default for DuplicateSendCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_HORIZON)
    }
}

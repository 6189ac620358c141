use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Receives byte deltas from both relay phases.
///
/// Called concurrently from in-flight parts, so implementations must be
/// additive and thread-safe.
pub trait ProgressSink: Send + Sync {
    fn add(&self, delta: i64);
}

impl ProgressSink for AtomicI64 {
    fn add(&self, delta: i64) {
        self.fetch_add(delta, Ordering::Relaxed);
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn add(&self, delta: i64) {
        (**self).add(delta);
    }
}

// ---------------------------------------------------------------------------
// ProgressCounter
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: i64,
    timestamp: Instant,
}

/// Running byte total with a sliding-window speed estimate, for UI display.
pub struct ProgressCounter {
    total: AtomicI64,
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl ProgressCounter {
    /// Creates a new counter.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            total: AtomicI64::new(0),
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Bytes accumulated so far.
    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap();
        if s.samples.len() < 2 {
            return 0.0;
        }

        let first = &s.samples[0];
        let last = &s.samples[s.samples.len() - 1];
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: i64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates the time left until the total reaches `expected`.
    ///
    /// A relay of `size` bytes is complete at `expected = 2 * size`.
    /// Returns `None` if speed is zero.
    pub fn eta(&self, expected: i64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        let remaining = (expected - self.total()).max(0);
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    /// Clears recorded samples; the total is kept.
    pub fn reset_speed(&self) {
        self.inner.lock().unwrap().samples.clear();
    }

    fn add_sample(&self, bytes: i64) {
        let mut s = self.inner.lock().unwrap();
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }
}

impl ProgressSink for ProgressCounter {
    fn add(&self, delta: i64) {
        self.total.fetch_add(delta, Ordering::SeqCst);
        self.add_sample(delta);
    }
}

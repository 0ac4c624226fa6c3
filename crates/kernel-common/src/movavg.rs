//! Multi-window simple moving averages.
//!
//! A series tracks several windows at once over a single ring buffer sized
//! to the largest window. Each window keeps a running sum so that adding a
//! sample and reading back every window mean are both O(windows).
//!
//! The buffer grows on demand up to its capacity, so a series configured
//! with a million-sample window costs nothing until samples arrive.

use crate::error::{KernelError, KernelResult};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default window sizes, in samples.
pub const DEFAULT_WINDOWS: [usize; 6] = [10, 100, 1_000, 10_000, 100_000, 1_000_000];

/// Initial buffer reservation; the buffer grows past this only as samples arrive.
const INITIAL_RESERVE: usize = 1024;

/// A scalar series averaged over a fixed list of windows.
///
/// Implementations must tolerate `add` and `averages` being called
/// concurrently from different threads. A reader racing a writer may
/// observe the series with or without the in-flight sample.
pub trait MovingAverage: Send + Sync {
    /// Create a series over the given window sizes.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] if the window list is empty or
    /// contains a zero-sized window.
    fn with_windows(windows: &[usize]) -> KernelResult<Self>
    where
        Self: Sized;

    /// Append a sample.
    fn add(&self, value: f64);

    /// Mean of the most recent samples for each window, shortest window first.
    ///
    /// A window larger than the number of samples seen averages over all of
    /// them. Every window reports `0.0` before the first sample.
    fn averages(&self) -> Vec<f64>;

    /// Window sizes, ascending.
    fn windows(&self) -> &[usize];

    /// Total number of samples appended.
    fn count(&self) -> u64;
}

/// Validate and normalize a window list: sorted ascending, deduplicated.
///
/// # Errors
///
/// Returns [`KernelError::Config`] for an empty list or a zero window.
pub fn normalize_windows(windows: &[usize]) -> KernelResult<Vec<usize>> {
    if windows.is_empty() {
        return Err(KernelError::Config(
            "at least one moving average window is required".into(),
        ));
    }
    if windows.contains(&0) {
        return Err(KernelError::Config(
            "moving average windows must be non-zero".into(),
        ));
    }
    let mut normalized = windows.to_vec();
    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

/// Ring buffer state guarded by the series mutex.
#[derive(Debug)]
struct SmaState {
    /// Sample storage; sample `k` lives at `k % capacity`.
    samples: Vec<f64>,
    /// Running sum per window.
    sums: Vec<f64>,
    /// Total samples appended.
    count: u64,
}

/// Simple moving average set backed by one shared ring buffer.
#[derive(Debug)]
pub struct SmaSet {
    windows: Vec<usize>,
    capacity: usize,
    state: Mutex<SmaState>,
}

impl SmaSet {
    /// Create a series over the given window sizes.
    ///
    /// # Errors
    ///
    /// See [`normalize_windows`].
    pub fn new(windows: &[usize]) -> KernelResult<Self> {
        let windows = normalize_windows(windows)?;
        let capacity = windows.last().copied().unwrap_or(1);
        Ok(Self {
            state: Mutex::new(SmaState {
                samples: Vec::with_capacity(capacity.min(INITIAL_RESERVE)),
                sums: vec![0.0; windows.len()],
                count: 0,
            }),
            windows,
            capacity,
        })
    }

    /// Most recently appended sample.
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        let state = self.lock();
        if state.count == 0 {
            return None;
        }
        let idx = ((state.count - 1) % self.capacity as u64) as usize;
        state.samples.get(idx).copied()
    }

    // Poisoning is ignored: recording never panics while holding the lock.
    fn lock(&self) -> MutexGuard<'_, SmaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, sample: u64) -> usize {
        (sample % self.capacity as u64) as usize
    }
}

impl MovingAverage for SmaSet {
    fn with_windows(windows: &[usize]) -> KernelResult<Self> {
        Self::new(windows)
    }

    fn add(&self, value: f64) {
        let mut state = self.lock();
        let k = state.count;

        // Retire the sample leaving each full window before its slot is reused.
        for (i, &w) in self.windows.iter().enumerate() {
            if k >= w as u64 {
                let leaving = state.samples[self.slot(k - w as u64)];
                state.sums[i] -= leaving;
            }
            state.sums[i] += value;
        }

        let slot = self.slot(k);
        if slot < state.samples.len() {
            state.samples[slot] = value;
        } else {
            state.samples.push(value);
        }
        state.count = k + 1;

        // Re-sum each window once per full turnover to bound floating-point drift.
        for (i, &w) in self.windows.iter().enumerate() {
            if state.count % w as u64 == 0 {
                let exact: f64 = (state.count - w as u64..state.count)
                    .map(|s| state.samples[self.slot(s)])
                    .sum();
                state.sums[i] = exact;
            }
        }
    }

    fn averages(&self) -> Vec<f64> {
        let state = self.lock();
        self.windows
            .iter()
            .zip(&state.sums)
            .map(|(&w, &sum)| {
                let n = state.count.min(w as u64);
                if n == 0 {
                    0.0
                } else {
                    sum / n as f64
                }
            })
            .collect()
    }

    fn windows(&self) -> &[usize] {
        &self.windows
    }

    fn count(&self) -> u64 {
        self.lock().count
    }
}

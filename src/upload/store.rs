//! Per-file part bookkeeping.
//!
//! [`PartStore`] tracks every part of one file through its lifecycle buckets:
//! waiting to be sent, on duty (an upload call outstanding), failed, or
//! passed. It performs no I/O and holds no references to the transport; the
//! controller and its part jobs drive it. Parts are enumerated lazily so a
//! very large file never materializes its full part list up front; identity
//! is the 1-based index, which maps to a stable byte range.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

// ─────────────────────────────────────────────────────────────────────────────
// Part
// ─────────────────────────────────────────────────────────────────────────────

/// A contiguous byte range of the source file plus its 1-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Part {
    index: u32,
    start: u64,
    end: u64,
}

impl Part {
    /// The 1-based index identifying this part within its upload.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// First byte offset covered by this part (inclusive).
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last byte offset covered by this part.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Byte length of this part.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the part covers no bytes. Never true for parts produced by an
    /// initialized store.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PartStore
// ─────────────────────────────────────────────────────────────────────────────

struct StoreState {
    initialized: bool,
    file_size: u64,
    part_size: u64,
    part_count: u32,
    /// Index of the next part that has never been handed out.
    next_fresh: u32,
    /// Parts returned to the send queue by `pause` or `retry`.
    requeued: VecDeque<Part>,
    /// Parts with an outstanding upload call, keyed by index.
    on_duty: HashMap<u32, Part>,
    /// Parts whose last attempt was rejected or errored.
    failed: HashMap<u32, Part>,
    done_bytes: u64,
    passed: u32,
}

impl StoreState {
    fn part_at(&self, index: u32) -> Part {
        let start = u64::from(index - 1) * self.part_size;
        let end = (start + self.part_size).min(self.file_size);
        Part { index, start, end }
    }

    fn to_send_len(&self) -> usize {
        let fresh = self.part_count.saturating_sub(self.next_fresh - 1);
        self.requeued.len() + fresh as usize
    }
}

/// Lifecycle bookkeeping for the parts of one file.
///
/// Internally synchronized; every method takes `&self` and may be called from
/// any part job. Mutations are atomic per call, so an observer always sees a
/// state in which each part occupies exactly one bucket.
pub struct PartStore {
    state: Mutex<StoreState>,
}

impl PartStore {
    /// Creates an uninitialized store. [`PartStore::init`] must run before
    /// any other operation.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                initialized: false,
                file_size: 0,
                part_size: 0,
                part_count: 0,
                next_fresh: 1,
                requeued: VecDeque::new(),
                on_duty: HashMap::new(),
                failed: HashMap::new(),
                done_bytes: 0,
                passed: 0,
            }),
        }
    }

    /// Lays out `ceil(file_size / part_size)` parts with contiguous byte
    /// ranges; the last part may be short. Idempotent: calls after the first
    /// are no-ops.
    ///
    /// # Panics
    ///
    /// Panics if `part_size` is zero.
    pub async fn init(&self, file_size: u64, part_size: u64) {
        assert!(part_size > 0, "part size must be positive");

        let mut state = self.state.lock().await;
        if state.initialized {
            return;
        }
        state.initialized = true;
        state.file_size = file_size;
        state.part_size = part_size;
        state.part_count = (file_size.div_ceil(part_size)) as u32;
    }

    /// Moves one part from the send queue onto duty and returns it, or
    /// `None` when nothing is waiting. Re-queued parts are drained before
    /// fresh ones; across a full drain the delivery is a permutation of all
    /// parts.
    ///
    /// # Panics
    ///
    /// Panics if called before [`PartStore::init`].
    pub async fn next_part(&self) -> Option<Part> {
        let mut state = self.state.lock().await;
        assert!(state.initialized, "next_part before init");

        let part = match state.requeued.pop_front() {
            Some(part) => part,
            None if state.next_fresh <= state.part_count => {
                let part = state.part_at(state.next_fresh);
                state.next_fresh += 1;
                part
            }
            None => return None,
        };
        state.on_duty.insert(part.index, part.clone());
        Some(part)
    }

    /// Records a successful upload of `part`, crediting its bytes.
    ///
    /// Returns whether the part was actually on duty; a late call after
    /// `pause` finds the part re-homed and changes nothing.
    pub async fn pass_part(&self, part: &Part) -> bool {
        let mut state = self.state.lock().await;
        if state.on_duty.remove(&part.index).is_none() {
            return false;
        }
        state.done_bytes += part.len();
        state.passed += 1;
        true
    }

    /// Records a rejected or errored upload of `part`, moving it to the
    /// failed bucket. Same no-op rule as [`PartStore::pass_part`].
    pub async fn fail_part(&self, part: &Part) -> bool {
        let mut state = self.state.lock().await;
        let Some(part) = state.on_duty.remove(&part.index) else {
            return false;
        };
        state.failed.insert(part.index, part);
        true
    }

    /// Returns every on-duty part to the send queue, leaving the store
    /// quiescent. Order among the returned parts is unspecified.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        let benched: Vec<Part> = state.on_duty.drain().map(|(_, part)| part).collect();
        state.requeued.extend(benched);
    }

    /// Moves every failed part back into the send queue.
    pub async fn retry(&self) {
        let mut state = self.state.lock().await;
        let retriable: Vec<Part> = state.failed.drain().map(|(_, part)| part).collect();
        state.requeued.extend(retriable);
    }

    // ── Inspectors ────────────────────────────────────────────────────────────

    /// Total bytes of all passed parts. Monotonically non-decreasing.
    pub async fn done_bytes(&self) -> u64 {
        self.state.lock().await.done_bytes
    }

    /// Whether no part is on duty.
    pub async fn quiescent(&self) -> bool {
        self.state.lock().await.on_duty.is_empty()
    }

    /// Whether every produced part has settled: nothing waiting to be sent
    /// and nothing on duty. Unlike [`PartStore::quiescent`], this cannot hold
    /// while a drain is still handing out parts.
    pub async fn drained(&self) -> bool {
        let state = self.state.lock().await;
        state.on_duty.is_empty() && state.to_send_len() == 0
    }

    /// Number of parts whose last attempt was not successful.
    pub async fn failed_parts(&self) -> usize {
        self.state.lock().await.failed.len()
    }

    // ── Test-only inspectors ──────────────────────────────────────────────────

    /// Number of parts the file divides into.
    #[cfg(test)]
    pub(crate) async fn part_count(&self) -> u32 {
        self.state.lock().await.part_count
    }

    /// Number of parts waiting to be sent.
    #[cfg(test)]
    pub(crate) async fn pending_parts(&self) -> usize {
        self.state.lock().await.to_send_len()
    }

    /// Number of parts with an outstanding upload call.
    #[cfg(test)]
    pub(crate) async fn on_duty_parts(&self) -> usize {
        self.state.lock().await.on_duty.len()
    }

    /// Number of parts uploaded successfully.
    #[cfg(test)]
    pub(crate) async fn passed_parts(&self) -> u32 {
        self.state.lock().await.passed
    }
}

impl Default for PartStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn test_part(index: u32, start: u64, end: u64) -> Part {
    Part { index, start, end }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

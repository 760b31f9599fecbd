//! Pre-trigger frame history.
//!
//! [`FrameHistory`] is a fixed ring of `capacity` pre-allocated frames. The
//! processing thread decodes into [`FrameHistory::current`], then commits the
//! slot with [`FrameHistory::advance`]. The working slot is one of the ring's
//! buffers: once the ring is full, taking it drops the oldest committed frame,
//! so while a frame is being processed the history holds at most
//! `capacity - 1` earlier frames.
//!
//! The most recently committed frame is also published to a [`RecentFrame`]
//! handle that other threads can read without touching the ring.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::{CameraSpec, Frame};

/// Thread-safe holder of the most recently committed frame.
///
/// The lock is only held while a frame is copied in or out, so readers never
/// observe a partially written frame and never stall the processing thread
/// for longer than one copy.
#[derive(Debug, Clone, Default)]
pub struct RecentFrame {
    inner: Arc<Mutex<Option<Frame>>>,
}

impl RecentFrame {
    /// Create an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame with a deep copy of `frame`.
    pub fn publish(&self, frame: &Frame) {
        let mut guard = self.inner.lock();
        match guard.as_mut() {
            Some(held) => held.copy_from(frame),
            None => *guard = Some(frame.clone()),
        }
    }

    /// A deep copy of the held frame, or `None` if nothing was committed yet.
    #[must_use]
    pub fn snapshot(&self) -> Option<Frame> {
        self.inner.lock().clone()
    }
}

/// Fixed-capacity ring of reusable frame buffers.
#[derive(Debug)]
pub struct FrameHistory {
    /// `capacity` buffers, at least one.
    slots: Vec<Frame>,
    capacity: usize,
    /// Index of the working slot, the next frame to be filled.
    cursor: usize,
    /// Number of committed frames available for replay.
    committed: usize,
    recent: RecentFrame,
}

impl FrameHistory {
    /// Allocate a history holding up to `capacity` committed frames.
    #[must_use]
    pub fn new(capacity: usize, camera: &CameraSpec) -> Self {
        Self::with_recent(capacity, camera, RecentFrame::new())
    }

    /// Allocate a history that publishes into an existing [`RecentFrame`].
    #[must_use]
    pub fn with_recent(capacity: usize, camera: &CameraSpec, recent: RecentFrame) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| Frame::for_camera(camera))
            .collect();
        Self {
            slots,
            capacity,
            cursor: 0,
            committed: 0,
            recent,
        }
    }

    /// Maximum number of committed frames kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of committed frames currently available.
    #[must_use]
    pub fn len(&self) -> usize {
        self.committed
    }

    /// Whether there are no committed frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// The working slot that the next frame should be written into.
    ///
    /// When every buffer holds a committed frame this is the oldest one, and
    /// it leaves the history.
    pub fn current(&mut self) -> &mut Frame {
        if self.committed == self.slots.len() {
            self.committed -= 1;
        }
        &mut self.slots[self.cursor]
    }

    /// Commit the working slot and move on to the next buffer.
    pub fn advance(&mut self) {
        self.recent.publish(&self.slots[self.cursor]);
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.committed = (self.committed + 1).min(self.capacity);
    }

    /// Committed frames, oldest first.
    ///
    /// The iterator borrows the ring, so calling this again starts over.
    #[must_use]
    pub fn history(&self) -> History<'_> {
        let len = self.slots.len();
        History {
            slots: &self.slots,
            next: (self.cursor + len - self.committed) % len,
            remaining: self.committed,
        }
    }

    /// A deep copy of the most recently committed frame.
    #[must_use]
    pub fn most_recent_copy(&self) -> Option<Frame> {
        self.recent.snapshot()
    }

    /// A handle for reading the most recent frame from other threads.
    #[must_use]
    pub fn recent_handle(&self) -> RecentFrame {
        self.recent.clone()
    }

    /// Forget all committed frames.
    ///
    /// Called when a recording stops so that a restart shortly afterwards does
    /// not replay frames the previous clip already contains.
    pub fn reset_oldest(&mut self) {
        self.committed = 0;
    }
}

/// Iterator over committed frames from oldest to newest.
#[derive(Debug, Clone)]
pub struct History<'a> {
    slots: &'a [Frame],
    next: usize,
    remaining: usize,
}

impl<'a> Iterator for History<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let frame = &self.slots[self.next];
        self.next = (self.next + 1) % self.slots.len();
        self.remaining -= 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for History<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraSpec {
        CameraSpec::new(2, 2, 8)
    }

    fn push(history: &mut FrameHistory, value: u16) {
        history.current().fill(value);
        history.advance();
    }

    fn values(history: &FrameHistory) -> Vec<u16> {
        history.history().map(|f| f.get(0, 0)).collect()
    }

    #[test]
    fn test_empty_history() {
        let history = FrameHistory::new(3, &camera());
        assert!(history.is_empty());
        assert_eq!(history.history().count(), 0);
        assert!(history.most_recent_copy().is_none());
    }

    #[test]
    fn test_history_before_full() {
        let mut history = FrameHistory::new(4, &camera());
        push(&mut history, 1);
        push(&mut history, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(values(&history), vec![1, 2]);
    }

    #[test]
    fn test_history_wraps_oldest_first() {
        let mut history = FrameHistory::new(3, &camera());
        for v in 1..=7 {
            push(&mut history, v);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(values(&history), vec![5, 6, 7]);
    }

    #[test]
    fn test_history_is_restartable() {
        let mut history = FrameHistory::new(3, &camera());
        push(&mut history, 1);
        push(&mut history, 2);
        let iter = history.history();
        assert_eq!(iter.len(), 2);
        let first: Vec<_> = iter.clone().map(|f| f.get(0, 0)).collect();
        let second: Vec<_> = iter.map(|f| f.get(0, 0)).collect();
        assert_eq!(first, second);
        assert_eq!(values(&history), vec![1, 2]);
    }

    #[test]
    fn test_ring_allocates_exactly_capacity() {
        let history = FrameHistory::new(3, &camera());
        assert_eq!(history.slots.len(), 3);
        assert_eq!(FrameHistory::new(0, &camera()).slots.len(), 1);
    }

    #[test]
    fn test_full_history_after_capacity_advances() {
        let mut history = FrameHistory::new(3, &camera());
        for v in 1..=3 {
            history.current().fill(v);
            history.advance();
        }
        assert_eq!(history.len(), 3);
        assert_eq!(values(&history), vec![1, 2, 3]);
    }

    #[test]
    fn test_current_takes_oldest_slot_when_full() {
        let mut history = FrameHistory::new(3, &camera());
        for v in 1..=3 {
            push(&mut history, v);
        }
        history.current().fill(4);
        // The working slot reuses frame 1's buffer.
        assert_eq!(values(&history), vec![2, 3]);
        // Asking again does not drop another frame.
        history.current();
        assert_eq!(values(&history), vec![2, 3]);

        history.advance();
        assert_eq!(values(&history), vec![2, 3, 4]);
    }

    #[test]
    fn test_current_keeps_history_before_full() {
        let mut history = FrameHistory::new(3, &camera());
        push(&mut history, 1);
        push(&mut history, 2);
        history.current().fill(3);
        assert_eq!(values(&history), vec![1, 2]);
    }

    #[test]
    fn test_reset_oldest_discards_history() {
        let mut history = FrameHistory::new(3, &camera());
        push(&mut history, 1);
        push(&mut history, 2);
        history.reset_oldest();
        assert!(history.is_empty());
        assert_eq!(history.history().count(), 0);

        push(&mut history, 3);
        assert_eq!(values(&history), vec![3]);
        // The latest committed frame is still available to readers.
        assert_eq!(history.most_recent_copy().unwrap().get(0, 0), 3);
    }

    #[test]
    fn test_most_recent_copy_is_deep() {
        let mut history = FrameHistory::new(2, &camera());
        push(&mut history, 10);
        let copy = history.most_recent_copy().unwrap();
        push(&mut history, 20);
        assert_eq!(copy.get(0, 0), 10);
        assert_eq!(history.most_recent_copy().unwrap().get(0, 0), 20);
    }

    #[test]
    fn test_zero_capacity_keeps_no_history() {
        let mut history = FrameHistory::new(0, &camera());
        push(&mut history, 1);
        assert!(history.is_empty());
        assert_eq!(history.most_recent_copy().unwrap().get(0, 0), 1);
    }

    #[test]
    fn test_recent_handle_is_never_torn() {
        let camera = CameraSpec::new(24, 32, 8);
        let mut history = FrameHistory::new(4, &camera);
        let handle = history.recent_handle();

        let reader = std::thread::spawn(move || {
            for _ in 0..2_000 {
                if let Some(frame) = handle.snapshot() {
                    let first = frame.get(0, 0);
                    assert!(frame.pixels().iter().all(|v| *v == first));
                }
            }
        });

        for v in 0..2_000u16 {
            push(&mut history, v);
        }
        reader.join().unwrap();
    }
}

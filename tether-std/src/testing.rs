//! Testing utilities for Tether.
//!
//! # Features
//!
//! - [`RecordingSink`]: A frame sink that records everything written to it
//! - [`FailingSink`] / [`PanickingSink`]: Sinks whose writes always fail
//! - [`CountingAction`]: An action that counts invocations and returns fixed markup

use crate::{
    action::{Action, ActionResult, Html},
    context::Context,
    hub::FrameSink,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tether_core::BoxError;

// ============================================================================
// Recording Sink
// ============================================================================

/// A sink that records every frame it receives.
///
/// # Example
///
/// ```rust,ignore
/// let sink = RecordingSink::new();
/// hub.open(session, sink.clone());
///
/// hub.push(ops).await?;
/// assert_eq!(sink.frames().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the recorded frames.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Clear all recorded frames.
    pub fn clear(&self) {
        self.frames.lock().unwrap().clear();
    }
}

impl FrameSink for RecordingSink {
    async fn send(&self, frame: Arc<str>) -> Result<(), BoxError> {
        if self.is_closed() {
            return Err("sink closed".into());
        }
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Failing Sinks
// ============================================================================

/// A sink whose writes always return an error.
#[derive(Clone, Copy, Default)]
pub struct FailingSink;

impl FrameSink for FailingSink {
    async fn send(&self, _frame: Arc<str>) -> Result<(), BoxError> {
        Err("connection reset".into())
    }

    async fn close(&self) {}
}

/// A sink whose writes panic.
#[derive(Clone, Copy, Default)]
pub struct PanickingSink;

impl FrameSink for PanickingSink {
    async fn send(&self, _frame: Arc<str>) -> Result<(), BoxError> {
        panic!("sink exploded")
    }

    async fn close(&self) {}
}

// ============================================================================
// Counting Action
// ============================================================================

/// An action that counts invocations.
///
/// Clones share the counter.
///
/// # Example
///
/// ```rust,ignore
/// let guard = CountingAction::returning("");
/// registry.register_chain("guarded", None, vec![shared(guard.clone()), shared(page)]);
///
/// registry.dispatch(path, ctx).await?;
/// assert_eq!(guard.count(), 1);
/// ```
#[derive(Clone)]
pub struct CountingAction {
    count: Arc<AtomicUsize>,
    markup: Arc<str>,
}

impl CountingAction {
    /// An action returning empty markup.
    pub fn new() -> Self {
        Self::returning("")
    }

    /// An action returning `markup`.
    pub fn returning(markup: &str) -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            markup: markup.into(),
        }
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Default for CountingAction {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for CountingAction {
    async fn call(&self, _ctx: Context) -> ActionResult {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(Html::from(&*self.markup))
    }
}

//! Error-context frames
//!
//! A frame describes the persisted record an operation is working on. While
//! an [`ErrorContext`] guard is alive its frame sits on a thread-local stack
//! and inside a `tracing` span; errors passed through [`decorate`] pick up
//! every active frame. Dropping the guard detaches its own frame on every
//! exit path, even when guards are dropped out of nesting order.

use filespace_common::{Error, FilespaceOid, Locator};
use std::cell::{Cell, RefCell};
use std::fmt;
use tracing::span::EnteredSpan;

struct ActiveFrame {
    id: u64,
    frame: ContextFrame,
}

thread_local! {
    static FRAMES: RefCell<Vec<ActiveFrame>> = const { RefCell::new(Vec::new()) };
    static NEXT_FRAME_ID: Cell<u64> = const { Cell::new(0) };
}

/// Diagnostic description of one persisted record access
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextFrame {
    /// Logical object name, e.g. "persistent filespace node"
    pub object: &'static str,
    pub oid: FilespaceOid,
    pub locator: Locator,
    pub serial_num: u64,
}

impl fmt::Display for ContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reading {} record for filespace {} at {}, serial number {}",
            self.object, self.oid, self.locator, self.serial_num
        )
    }
}

/// Scoped error-context frame
#[must_use = "the context frame is removed as soon as the guard is dropped"]
pub struct ErrorContext {
    id: u64,
    _span: EnteredSpan,
}

impl ErrorContext {
    /// Push `frame` for as long as the returned guard lives
    pub fn enter(frame: ContextFrame) -> Self {
        let span = tracing::debug_span!(
            "persisted_read",
            object = frame.object,
            oid = %frame.oid,
            locator = %frame.locator,
            serial_num = frame.serial_num,
        )
        .entered();

        let id = NEXT_FRAME_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        FRAMES.with(|frames| frames.borrow_mut().push(ActiveFrame { id, frame }));

        Self { id, _span: span }
    }

    /// Annotate `err` with every frame active on this thread
    pub fn decorate(&self, err: Error) -> Error {
        decorate(err)
    }
}

impl Drop for ErrorContext {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            if let Some(pos) = frames.iter().rposition(|active| active.id == self.id) {
                frames.remove(pos);
            }
        });
    }
}

/// Frames active on this thread, outermost first
#[must_use]
pub fn active_frames() -> Vec<ContextFrame> {
    FRAMES.with(|frames| {
        frames
            .borrow()
            .iter()
            .map(|active| active.frame.clone())
            .collect()
    })
}

/// Annotate `err` with every active frame, innermost frame closest to the error
#[must_use]
pub fn decorate(err: Error) -> Error {
    FRAMES.with(|frames| {
        frames
            .borrow()
            .iter()
            .rev()
            .fold(err, |err, active| err.with_context(active.frame.to_string()))
    })
}

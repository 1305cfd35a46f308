//! Column-resize drags.
//!
//! A drag owns the pointer capture from `begin` until the handle goes away.
//! Release is tied to `Drop`, so an aborted drag (Esc, terminal resize, an
//! early return or a panic) frees the capture just like a completed one.

use std::cell::Cell;
use std::rc::Rc;
use tracing::trace;

use crate::layout::{MAX_COLUMN_WIDTH, MIN_COLUMN_WIDTH};

/// Single-owner slot: at most one gesture holds the pointer at a time.
#[derive(Debug, Default, Clone)]
pub struct PointerCapture {
    held: Rc<Cell<bool>>,
}

impl PointerCapture {
    pub fn is_held(&self) -> bool {
        self.held.get()
    }
}

#[derive(Debug)]
pub struct ResizeGesture {
    capture: PointerCapture,
    column: usize,
    start_x: u16,
    start_width: u16,
    width: u16,
}

impl ResizeGesture {
    /// Acquire the capture and start resizing `column`. `None` if another gesture holds it.
    pub fn begin(capture: &PointerCapture, column: usize, pointer_x: u16, start_width: u16) -> Option<Self> {
        if capture.is_held() {
            return None;
        }
        capture.held.set(true);
        trace!("Begin resize of column {column} at x={pointer_x}");
        Some(Self {
            capture: capture.clone(),
            column,
            start_x: pointer_x,
            start_width,
            width: start_width,
        })
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Follow the pointer and return the width the column should have now.
    pub fn update(&mut self, pointer_x: u16) -> u16 {
        let delta = i32::from(pointer_x) - i32::from(self.start_x);
        let width = (i32::from(self.start_width) + delta)
            .clamp(i32::from(MIN_COLUMN_WIDTH), i32::from(MAX_COLUMN_WIDTH));
        self.width = width as u16;
        self.width
    }

    /// Finish the drag and hand back `(column, width)`. The capture is released on return.
    pub fn end(self) -> (usize, u16) {
        trace!("End resize of column {} at width {}", self.column, self.width);
        (self.column, self.width)
    }
}

impl Drop for ResizeGesture {
    fn drop(&mut self) {
        self.capture.held.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_widens_and_narrows() {
        let capture = PointerCapture::default();
        let mut gesture = ResizeGesture::begin(&capture, 2, 40, 16).unwrap();
        assert_eq!(gesture.update(50), 26);
        assert_eq!(gesture.update(35), 11);
        assert_eq!(gesture.update(0), MIN_COLUMN_WIDTH);
        assert_eq!(gesture.end(), (2, MIN_COLUMN_WIDTH));
        assert!(!capture.is_held());
    }

    #[test]
    fn only_one_gesture_at_a_time() {
        let capture = PointerCapture::default();
        let first = ResizeGesture::begin(&capture, 0, 10, 16).unwrap();
        assert!(capture.is_held());
        assert!(ResizeGesture::begin(&capture, 1, 20, 16).is_none());
        drop(first);
        assert!(ResizeGesture::begin(&capture, 1, 20, 16).is_some());
    }

    #[test]
    fn capture_released_on_unwind() {
        let capture = PointerCapture::default();
        let inner = capture.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut gesture = ResizeGesture::begin(&inner, 0, 10, 16).unwrap();
            gesture.update(12);
            panic!("drag handler failed");
        }));
        assert!(result.is_err());
        assert!(!capture.is_held());
    }
}

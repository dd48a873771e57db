//! In-memory terminal screen with change tracking.
//!
//! A [`Screen`] keeps two byte grids: the one being drawn ("current") and the
//! last one shipped to the client ("previous"). [`Screen::delta`] returns the
//! runs of cells that differ, which is all the client needs to catch up.
//!
//! Drawing goes through the [`Canvas`] trait so the same code can target the
//! whole screen or a clipped [`RegionView`] of it:
//!
//! ```
//! # use mmorogue::screen::{Canvas, Screen};
//! let mut screen = Screen::new(10, 2);
//! {
//!     let mut status = screen.region(2, 1, 4, 1);
//!     status.goto(0, 0);
//!     status.write(b"hello world");
//! }
//! let delta = screen.delta();
//! assert_eq!(delta.len(), 1);
//! assert_eq!((delta[0].row, delta[0].col), (1, 2));
//! assert_eq!(delta[0].bytes, b"hell");
//! ```
//!
//! Writes never wrap and never fail: anything past the right edge (or below
//! the bottom) of the target is dropped.

mod buffer;
mod delta;
mod region;

pub use buffer::Screen;
pub use delta::{encode_deltas, ScreenDelta};
pub use region::RegionView;

/// A rectangle in the coordinates of whatever canvas it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Cursor-addressed byte drawing surface.
pub trait Canvas {
    /// `(width, height)`.
    fn size(&self) -> (usize, usize);

    fn cursor(&self) -> (usize, usize);

    /// Place the write cursor. Positions outside the canvas are allowed; writes
    /// from there are dropped.
    fn goto(&mut self, x: usize, y: usize);

    /// Write at the cursor without wrapping and advance the cursor. Returns the
    /// number of bytes that landed on the canvas.
    fn write(&mut self, bytes: &[u8]) -> usize;

    fn put(&mut self, bytes: &[u8]) -> usize {
        self.write(bytes)
    }

    /// Fill a rectangle with `fill`, clipped to the canvas. The cursor is left
    /// where it was.
    fn clear(&mut self, x: usize, y: usize, width: usize, height: usize, fill: u8) {
        let (canvas_width, canvas_height) = self.size();
        let saved = self.cursor();
        let row_len = width.min(canvas_width.saturating_sub(x));
        let row = vec![fill; row_len];
        for r in y..(y + height).min(canvas_height) {
            self.goto(x, r);
            self.write(&row);
        }
        self.goto(saved.0, saved.1);
    }

    /// A child view at `(x, y)` of this canvas; see [`RegionView`].
    fn region(&mut self, x: usize, y: usize, width: usize, height: usize) -> RegionView<'_, Self>
    where
        Self: Sized,
    {
        RegionView::new(self, Rect::new(x, y, width, height))
    }
}

use super::{Canvas, Rect};

/// A rectangular window onto a parent canvas. Owns no storage: every write is
/// clipped to the region, translated by its offset and forwarded, so nested
/// regions always end up on the root buffer.
pub struct RegionView<'a, C: Canvas> {
    parent: &'a mut C,
    rect: Rect,
    cursor: (usize, usize),
}

impl<'a, C: Canvas> RegionView<'a, C> {
    pub fn new(parent: &'a mut C, rect: Rect) -> Self {
        Self {
            parent,
            rect,
            cursor: (0, 0),
        }
    }

    /// Bounds in the parent's coordinates.
    pub fn rect(&self) -> Rect {
        self.rect
    }
}

impl<C: Canvas> Canvas for RegionView<'_, C> {
    fn size(&self) -> (usize, usize) {
        (self.rect.width, self.rect.height)
    }

    fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    fn goto(&mut self, x: usize, y: usize) {
        self.cursor = (x, y);
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let (x, y) = self.cursor;
        if y >= self.rect.height {
            return 0;
        }
        let n = bytes.len().min(self.rect.width.saturating_sub(x));
        if n == 0 {
            return 0;
        }
        self.parent.goto(self.rect.x + x, self.rect.y + y);
        let written = self.parent.write(&bytes[..n]);
        self.cursor.0 += written;
        written
    }
}

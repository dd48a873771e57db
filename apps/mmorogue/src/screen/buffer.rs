use super::{Canvas, ScreenDelta};

/// Fixed-size double-buffered byte grid.
///
/// `current` receives all drawing; `previous` is the baseline the client is
/// known to display. [`Screen::flip`] makes the current contents the new
/// baseline.
#[derive(Debug, Clone)]
pub struct Screen {
    width: usize,
    height: usize,
    cursor: (usize, usize),
    buffers: [Vec<u8>; 2],
    current: usize,
    /// Scratch space for `delta`, reused across calls.
    diff: Vec<u8>,
}

impl Screen {
    /// Both buffers start zeroed, so the first delta covers every cell drawn.
    pub fn new(width: usize, height: usize) -> Self {
        let cells = width * height;
        Self {
            width,
            height,
            cursor: (0, 0),
            buffers: [vec![0; cells], vec![0; cells]],
            current: 0,
            diff: vec![0; cells],
        }
    }

    /// Contents of the current buffer, row-major.
    pub fn cells(&self) -> &[u8] {
        &self.buffers[self.current]
    }

    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.width;
        Some(&self.cells()[start..start + self.width])
    }

    /// Promote the current buffer to baseline. Drawing continues on a copy of
    /// it, so the next delta reflects exactly what is written after this call.
    pub fn flip(&mut self) {
        self.current = 1 - self.current;
        let [a, b] = &mut self.buffers;
        if self.current == 0 {
            a.copy_from_slice(b);
        } else {
            b.copy_from_slice(a);
        }
    }

    /// Runs of cells that differ from the baseline, left to right, top to
    /// bottom. Each run carries the current bytes. Does not change the
    /// baseline: calling it twice yields the same runs. Use
    /// [`present`](Self::present) when a repeated call must come back empty.
    pub fn delta(&mut self) -> Vec<ScreenDelta> {
        let current = &self.buffers[self.current];
        let previous = &self.buffers[1 - self.current];
        for ((d, c), p) in self.diff.iter_mut().zip(current).zip(previous) {
            *d = c.wrapping_sub(*p);
        }

        let mut deltas = Vec::new();
        for row in 0..self.height {
            let base = row * self.width;
            let changed = &self.diff[base..base + self.width];
            let mut col = 0;
            while col < self.width {
                while col < self.width && changed[col] == 0 {
                    col += 1;
                }
                let start = col;
                while col < self.width && changed[col] != 0 {
                    col += 1;
                }
                if start == col {
                    break;
                }
                deltas.push(ScreenDelta {
                    row,
                    col: start,
                    bytes: current[base + start..base + col].to_vec(),
                });
            }
        }
        deltas
    }

    /// [`delta`](Self::delta) followed by [`flip`](Self::flip): the runs the
    /// client needs now. An immediate second call returns nothing.
    pub fn present(&mut self) -> Vec<ScreenDelta> {
        let deltas = self.delta();
        self.flip();
        deltas
    }

    /// Forget what the client is showing. The next delta covers every drawn
    /// cell, which resyncs a client that missed output.
    pub fn invalidate(&mut self) {
        self.buffers[1 - self.current].fill(0);
    }
}

impl Canvas for Screen {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    fn goto(&mut self, x: usize, y: usize) {
        self.cursor = (x, y);
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let (x, y) = self.cursor;
        if y >= self.height {
            return 0;
        }
        let n = bytes.len().min(self.width.saturating_sub(x));
        if n == 0 {
            return 0;
        }
        let start = y * self.width + x;
        self.buffers[self.current][start..start + n].copy_from_slice(&bytes[..n]);
        self.cursor.0 += n;
        n
    }
}

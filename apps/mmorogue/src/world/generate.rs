use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tiles per pond and per pillar; small maps get none.
const POND_AREA: usize = 300;
const PILLAR_AREA: usize = 80;

/// Raw tile bytes for a walled map with scattered ponds and pillars.
pub(super) fn tiles(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tiles = vec![b'.'; width * height];

    if width >= 8 && height >= 8 {
        let interior = (width - 2) * (height - 2);
        for _ in 0..interior / POND_AREA {
            let radius = rng.gen_range(1..=3usize);
            let cx = rng.gen_range(2..width - 2);
            let cy = rng.gen_range(2..height - 2);
            for y in cy.saturating_sub(radius)..=(cy + radius).min(height - 1) {
                for x in cx.saturating_sub(radius)..=(cx + radius).min(width - 1) {
                    let dx = x.abs_diff(cx);
                    let dy = y.abs_diff(cy);
                    if dx * dx + dy * dy <= radius * radius {
                        tiles[y * width + x] = b'~';
                    }
                }
            }
        }
        for _ in 0..interior / PILLAR_AREA {
            let x = rng.gen_range(2..width - 2);
            let y = rng.gen_range(2..height - 2);
            tiles[y * width + x] = b'#';
        }
    }

    for y in 0..height {
        for x in 0..width {
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                tiles[y * width + x] = b'#';
            }
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_map() {
        assert_eq!(tiles(64, 48, 42), tiles(64, 48, 42));
        assert_ne!(tiles(64, 48, 42), tiles(64, 48, 43));
    }

    #[test]
    fn border_is_always_wall() {
        let (w, h) = (30, 20);
        let grid = tiles(w, h, 9);
        for x in 0..w {
            assert_eq!(grid[x], b'#');
            assert_eq!(grid[(h - 1) * w + x], b'#');
        }
        for y in 0..h {
            assert_eq!(grid[y * w], b'#');
            assert_eq!(grid[y * w + w - 1], b'#');
        }
    }

    #[test]
    fn generated_map_keeps_most_floor() {
        let grid = tiles(64, 48, 3);
        let floor = grid.iter().filter(|&&b| b == b'.').count();
        assert!(floor > grid.len() / 2, "only {floor} floor tiles");
    }
}

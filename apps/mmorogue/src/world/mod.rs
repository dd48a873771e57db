//! The shared tile grid. Built once at startup and read-only afterwards, so
//! entities and renderers share it through an `Arc` without locking.

use std::path::{Path, PathBuf};

use rand::Rng;
use thiserror::Error;

mod generate;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("failed to read map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("map has no rows")]
    Empty,
    #[error("map row {row} has {found} tiles, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown tile {byte:#04x} at row {row}, column {col}")]
    UnknownTile { row: usize, col: usize, byte: u8 },
    #[error("map has no floor tiles to spawn on")]
    NoFloor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Floor,
    Wall,
    Water,
}

impl Tile {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'.' => Some(Self::Floor),
            b'#' => Some(Self::Wall),
            b'~' => Some(Self::Water),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Floor => b'.',
            Self::Wall => b'#',
            Self::Water => b'~',
        }
    }

    /// Walls and water stop movement.
    pub fn is_blocking(self) -> bool {
        !matches!(self, Self::Floor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// A cell in world coordinates. Signed so a step off the edge is
/// representable; such cells read as walls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::new(self.x, self.y - 1),
            Direction::Down => Self::new(self.x, self.y + 1),
            Direction::Left => Self::new(self.x - 1, self.y),
            Direction::Right => Self::new(self.x + 1, self.y),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorldMap {
    width: usize,
    height: usize,
    tiles: Vec<u8>,
    floor: Vec<Position>,
}

impl WorldMap {
    /// Parse a text grid: one row per line, `.` floor, `#` wall, `~` water.
    /// Trailing blank lines are ignored; every other line must be as wide as
    /// the first.
    pub fn parse(text: &str) -> Result<Self, WorldError> {
        let mut rows: Vec<&[u8]> = text
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line).as_bytes())
            .collect();
        while rows.last().is_some_and(|row| row.is_empty()) {
            rows.pop();
        }
        let width = match rows.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(WorldError::Empty),
        };

        let mut tiles = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            if line.len() != width {
                return Err(WorldError::Ragged {
                    row,
                    expected: width,
                    found: line.len(),
                });
            }
            for (col, &byte) in line.iter().enumerate() {
                if Tile::from_byte(byte).is_none() {
                    return Err(WorldError::UnknownTile { row, col, byte });
                }
                tiles.push(byte);
            }
        }
        Self::from_tiles(width, rows.len(), tiles)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// A floor rectangle enclosed by a one-tile wall.
    pub fn walled(width: usize, height: usize) -> Result<Self, WorldError> {
        let mut tiles = vec![b'.'; width * height];
        for y in 0..height {
            for x in 0..width {
                if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                    tiles[y * width + x] = b'#';
                }
            }
        }
        Self::from_tiles(width, height, tiles)
    }

    /// A walled map with ponds and pillars placed from `seed`.
    pub fn generate(width: usize, height: usize, seed: u64) -> Result<Self, WorldError> {
        let tiles = generate::tiles(width, height, seed);
        Self::from_tiles(width, height, tiles)
    }

    fn from_tiles(width: usize, height: usize, tiles: Vec<u8>) -> Result<Self, WorldError> {
        if width == 0 || height == 0 {
            return Err(WorldError::Empty);
        }
        let floor: Vec<Position> = tiles
            .iter()
            .enumerate()
            .filter(|&(_, &byte)| byte == b'.')
            .map(|(i, _)| Position::new((i % width) as i32, (i / width) as i32))
            .collect();
        if floor.is_empty() {
            return Err(WorldError::NoFloor);
        }
        Ok(Self {
            width,
            height,
            tiles,
            floor,
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let x = usize::try_from(x).ok()?;
        let y = usize::try_from(y).ok()?;
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Tile at `(x, y)`; anything outside the grid is a wall.
    pub fn tile(&self, x: i32, y: i32) -> Tile {
        self.index(x, y)
            .and_then(|i| Tile::from_byte(self.tiles[i]))
            .unwrap_or(Tile::Wall)
    }

    pub fn tile_at(&self, position: Position) -> Tile {
        self.tile(position.x, position.y)
    }

    pub fn is_blocked(&self, position: Position) -> bool {
        self.tile_at(position).is_blocking()
    }

    /// Copy up to `width` tile bytes of row `y` starting at column `x` into
    /// `out`, limited by the map edge and by `out`'s length. Returns the count.
    pub fn row(&self, x: usize, y: usize, width: usize, out: &mut [u8]) -> usize {
        if y >= self.height || x >= self.width {
            return 0;
        }
        let n = width.min(self.width - x).min(out.len());
        let start = y * self.width + x;
        out[..n].copy_from_slice(&self.tiles[start..start + n]);
        n
    }

    pub fn floor_tiles(&self) -> &[Position] {
        &self.floor
    }

    /// A uniformly random floor tile.
    pub fn spawn_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        // `from_tiles` guarantees at least one floor tile.
        self.floor[rng.gen_range(0..self.floor.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SMALL: &str = "#####\n#..~#\n#.#.#\n#####\n";

    #[test]
    fn parse_reads_tiles() {
        let map = WorldMap::parse(SMALL).unwrap();
        assert_eq!(map.size(), (5, 4));
        assert_eq!(map.tile(1, 1), Tile::Floor);
        assert_eq!(map.tile(3, 1), Tile::Water);
        assert_eq!(map.tile(2, 2), Tile::Wall);
        assert_eq!(map.floor_tiles().len(), 4);
    }

    #[test]
    fn parse_accepts_crlf_and_trailing_blank_lines() {
        let map = WorldMap::parse("###\r\n#.#\r\n###\r\n\r\n\n").unwrap();
        assert_eq!(map.size(), (3, 3));
        assert_eq!(map.tile(1, 1), Tile::Floor);
    }

    #[test]
    fn parse_rejects_malformed_maps() {
        assert!(matches!(WorldMap::parse(""), Err(WorldError::Empty)));
        assert!(matches!(
            WorldMap::parse("###\n#.\n###"),
            Err(WorldError::Ragged {
                row: 1,
                expected: 3,
                found: 2
            })
        ));
        assert!(matches!(
            WorldMap::parse("###\n#x#\n###"),
            Err(WorldError::UnknownTile {
                row: 1,
                col: 1,
                byte: b'x'
            })
        ));
        assert!(matches!(
            WorldMap::parse("###\n#~#\n###"),
            Err(WorldError::NoFloor)
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = WorldMap::load("/definitely/not/here/map.txt").unwrap_err();
        assert!(matches!(err, WorldError::Io { .. }));
    }

    #[test]
    fn outside_the_grid_is_wall() {
        let map = WorldMap::parse(SMALL).unwrap();
        assert_eq!(map.tile(-1, 0), Tile::Wall);
        assert_eq!(map.tile(0, -1), Tile::Wall);
        assert_eq!(map.tile(5, 1), Tile::Wall);
        assert_eq!(map.tile(1, 4), Tile::Wall);
    }

    #[test]
    fn row_is_limited_by_edge_and_buffer() {
        let map = WorldMap::parse(SMALL).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(map.row(1, 1, 10, &mut buf), 4);
        assert_eq!(&buf[..4], b"..~#");

        let mut small = [0u8; 2];
        assert_eq!(map.row(0, 2, 10, &mut small), 2);
        assert_eq!(&small, b"#.");

        assert_eq!(map.row(0, 9, 3, &mut buf), 0);
        assert_eq!(map.row(7, 0, 3, &mut buf), 0);
    }

    #[test]
    fn walled_map_is_enclosed() {
        let map = WorldMap::walled(6, 4).unwrap();
        for x in 0..6 {
            assert_eq!(map.tile(x, 0), Tile::Wall);
            assert_eq!(map.tile(x, 3), Tile::Wall);
        }
        for y in 0..4 {
            assert_eq!(map.tile(0, y), Tile::Wall);
            assert_eq!(map.tile(5, y), Tile::Wall);
        }
        assert_eq!(map.floor_tiles().len(), 8);
        assert!(matches!(WorldMap::walled(2, 2), Err(WorldError::NoFloor)));
    }

    #[test]
    fn spawn_points_are_floor() {
        let map = WorldMap::generate(40, 30, 7).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let p = map.spawn_point(&mut rng);
            assert_eq!(map.tile_at(p), Tile::Floor);
        }
    }

    #[test]
    fn bundled_map_is_valid() {
        let map = WorldMap::parse(include_str!("../../world/map.txt")).unwrap();
        assert_eq!(map.size(), (60, 30));
        assert!(!map.floor_tiles().is_empty());
    }

    #[test]
    fn step_moves_one_cell() {
        let p = Position::new(3, 3);
        assert_eq!(p.step(Direction::Up), Position::new(3, 2));
        assert_eq!(p.step(Direction::Down), Position::new(3, 4));
        assert_eq!(p.step(Direction::Left), Position::new(2, 3));
        assert_eq!(p.step(Direction::Right), Position::new(4, 3));
    }
}

// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-size color grid state.
//!
//! The dashboard renders a single [`MapGrid`]: a square buffer of RGB cells
//! that is always exactly [`GRID_SIZE`] x [`GRID_SIZE`]. Worlds arrive from
//! the service as nested JSON arrays ([`RawGrid`]); [`GridStore::set_map`]
//! validates the shape before accepting a replacement and keeps the previous
//! buffer on any violation. The buffer is only ever replaced wholesale, so a
//! reader never observes a partially painted overlay.

use log::error;
use thiserror::Error;

/// Grid dimension on both axes.
pub const GRID_SIZE: usize = 100;

/// Color every cell is reset to by [`GridStore::clear_map`].
pub const DEFAULT_COLOR: Rgb = Rgb::new(0, 0, 0);

/// Sentinel color for an empty/background base-map cell.
pub const BACKGROUND_COLOR: Rgb = Rgb::new(255, 255, 255);

/// Raw grid shape as decoded from the service: rows of cells of channels.
pub type RawGrid = Vec<Vec<Vec<f64>>>;

/// An RGB triple with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#rrggbb` hex string as sent by the service for airplane colors.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        // Length alone is not enough: slicing must not land mid-character
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
        let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
        let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
        Some(Self::new(r, g, b))
    }

    /// Scale each channel by `factor`, saturating at 255.
    #[must_use]
    pub fn brighten(self, factor: f32) -> Self {
        let scale = |c: u8| -> u8 {
            let v = f32::from(c) * factor;
            if v >= 255.0 { 255 } else { v as u8 }
        };
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// Channel-wise complement (`255 - c`).
    #[must_use]
    pub const fn complement(self) -> Self {
        Self::new(255 - self.r, 255 - self.g, 255 - self.b)
    }
}

/// Shape violations reported when a candidate grid is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("expected {GRID_SIZE} rows, got {0}")]
    RowCount(usize),
    #[error("row {row} has {len} cells, expected {GRID_SIZE}")]
    RowLength { row: usize, len: usize },
    #[error("cell ({x}, {y}) has {len} channels, expected 3")]
    ChannelCount { x: usize, y: usize, len: usize },
}

/// A validated [`GRID_SIZE`] x [`GRID_SIZE`] buffer of RGB cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapGrid {
    cells: Vec<Rgb>,
}

impl Default for MapGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl MapGrid {
    /// Create a grid filled with [`DEFAULT_COLOR`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: vec![DEFAULT_COLOR; GRID_SIZE * GRID_SIZE],
        }
    }

    /// Validate and convert a raw grid from the service.
    ///
    /// Channels are clamped into the 8-bit range on acceptance.
    pub fn from_raw(raw: &RawGrid) -> Result<Self, GridError> {
        if raw.len() != GRID_SIZE {
            return Err(GridError::RowCount(raw.len()));
        }
        let mut cells = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
        for (y, row) in raw.iter().enumerate() {
            if row.len() != GRID_SIZE {
                return Err(GridError::RowLength { row: y, len: row.len() });
            }
            for (x, cell) in row.iter().enumerate() {
                if cell.len() != 3 {
                    return Err(GridError::ChannelCount { x, y, len: cell.len() });
                }
                let ch = |v: f64| -> u8 { v.clamp(0.0, 255.0) as u8 };
                cells.push(Rgb::new(ch(cell[0]), ch(cell[1]), ch(cell[2])));
            }
        }
        Ok(Self { cells })
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Rgb {
        self.cells[y * GRID_SIZE + x]
    }

    pub fn set(&mut self, x: usize, y: usize, color: Rgb) {
        self.cells[y * GRID_SIZE + x] = color;
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        GRID_SIZE
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        GRID_SIZE
    }
}

/// Holder for the currently displayed grid.
///
/// Shared between the UI thread and the poll task as
/// `Arc<std::sync::RwLock<GridStore>>`; all updates are whole-buffer
/// replacements.
#[derive(Debug, Default)]
pub struct GridStore {
    grid: MapGrid,
}

impl GridStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the grid iff `raw` is a valid N x N x 3 matrix.
    ///
    /// On a shape violation the previous grid is retained and the failure is
    /// logged; nothing is thrown. Returns whether the candidate was accepted.
    pub fn set_map(&mut self, raw: &RawGrid) -> bool {
        match MapGrid::from_raw(raw) {
            Ok(grid) => {
                self.grid = grid;
                true
            }
            Err(e) => {
                error!("Rejected map data: {}", e);
                false
            }
        }
    }

    /// Replace the grid with an already validated buffer.
    pub fn replace(&mut self, grid: MapGrid) {
        self.grid = grid;
    }

    /// Reset every cell to [`DEFAULT_COLOR`].
    pub fn clear_map(&mut self) {
        self.grid = MapGrid::new();
    }

    #[must_use]
    pub fn grid(&self) -> &MapGrid {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_grid(color: [f64; 3]) -> RawGrid {
        vec![vec![color.to_vec(); GRID_SIZE]; GRID_SIZE]
    }

    #[test]
    fn test_set_map_accepts_valid_grid() {
        let mut store = GridStore::new();
        assert!(store.set_map(&raw_grid([10.0, 20.0, 30.0])));
        assert_eq!(store.grid().get(0, 0), Rgb::new(10, 20, 30));
        assert_eq!(store.grid().get(GRID_SIZE - 1, GRID_SIZE - 1), Rgb::new(10, 20, 30));
    }

    #[test]
    fn test_set_map_rejects_wrong_row_count() {
        let mut store = GridStore::new();
        store.set_map(&raw_grid([1.0, 2.0, 3.0]));

        let mut bad = raw_grid([9.0, 9.0, 9.0]);
        bad.pop();
        assert!(!store.set_map(&bad));
        // Previous grid retained
        assert_eq!(store.grid().get(0, 0), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_set_map_rejects_short_row() {
        let mut store = GridStore::new();
        let mut bad = raw_grid([9.0, 9.0, 9.0]);
        bad[42].pop();
        assert!(!store.set_map(&bad));
        assert_eq!(store.grid().get(0, 0), DEFAULT_COLOR);
    }

    #[test]
    fn test_set_map_rejects_wrong_channel_count() {
        let mut store = GridStore::new();
        let mut bad = raw_grid([9.0, 9.0, 9.0]);
        bad[3][7] = vec![1.0, 2.0];
        assert!(!store.set_map(&bad));

        bad[3][7] = vec![1.0, 2.0, 3.0, 4.0];
        assert!(!store.set_map(&bad));
    }

    #[test]
    fn test_from_raw_clamps_channels() {
        let grid = MapGrid::from_raw(&raw_grid([-5.0, 300.0, 127.9])).unwrap();
        assert_eq!(grid.get(50, 50), Rgb::new(0, 255, 127));
    }

    #[test]
    fn test_clear_map_resets_to_default() {
        let mut store = GridStore::new();
        store.set_map(&raw_grid([200.0, 100.0, 50.0]));
        store.clear_map();
        for y in 0..GRID_SIZE {
            for x in 0..GRID_SIZE {
                assert_eq!(store.grid().get(x, y), DEFAULT_COLOR);
            }
        }
    }

    #[test]
    fn test_rgb_from_hex() {
        assert_eq!(Rgb::from_hex("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::from_hex("#000000"), Some(Rgb::new(0, 0, 0)));
        assert_eq!(Rgb::from_hex("ff8000"), None);
        assert_eq!(Rgb::from_hex("#ff80"), None);
        assert_eq!(Rgb::from_hex("#zzzzzz"), None);
        // Six bytes but not six hex digits: must reject, not slice mid-char
        assert_eq!(Rgb::from_hex("#a\u{20ac}bc"), None);
        assert_eq!(Rgb::from_hex("#\u{20ac}\u{20ac}"), None);
    }

    #[test]
    fn test_rgb_brighten_saturates() {
        assert_eq!(Rgb::new(100, 200, 250).brighten(1.2), Rgb::new(120, 240, 255));
    }

    #[test]
    fn test_rgb_complement() {
        assert_eq!(Rgb::new(0, 100, 255).complement(), Rgb::new(255, 155, 0));
    }
}

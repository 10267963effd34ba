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

//! Overlay computation for the live map.
//!
//! Each poll tick derives a fresh grid from the immutable base map: scanned
//! cells are recolored, then every airplane contributes a direction
//! indicator, a 2x3 scanner-coverage block ahead of it, and finally its own
//! cell. The base map is never mutated; [`compose`] clones it into a scratch
//! buffer so partial paints are never observable.
//!
//! Paint order per airplane is indicator, coverage, own cell. The coverage
//! block overlaps the indicator cell and wins on it; the airplane cell always
//! wins over everything.

use crate::api::{Airplane, Heading, ScannedCell};
use crate::grid::{MapGrid, Rgb, BACKGROUND_COLOR};

/// Scanned cell on top of the background sentinel.
pub const SCAN_MARKER_COLOR: Rgb = Rgb::new(255, 255, 0);

/// Scanned cell on top of anything else.
pub const SCAN_OCCUPIED_COLOR: Rgb = Rgb::new(255, 0, 0);

/// Airplane color used when the service sends a malformed hex string.
pub const FALLBACK_PLANE_COLOR: Rgb = Rgb::new(200, 200, 200);

/// Brightness factor for the direction indicator cell.
const INDICATOR_BRIGHTEN: f32 = 1.2;

/// The cell one step ahead of `(x, y)` in the facing direction, clamped to
/// the grid edges. `None` when clamping leaves it on the airplane's own cell
/// (no indicator is drawn at the edge).
#[must_use]
pub fn direction_indicator(
    x: usize,
    y: usize,
    heading: Heading,
    width: usize,
    height: usize,
) -> Option<(usize, usize)> {
    let (ix, iy) = match heading {
        Heading::Up => (x, y.saturating_sub(1)),
        Heading::Down => (x, (y + 1).min(height - 1)),
        Heading::Left => (x.saturating_sub(1), y),
        Heading::Right => ((x + 1).min(width - 1), y),
    };
    if (ix, iy) == (x, y) {
        None
    } else {
        Some((ix, iy))
    }
}

/// Scanner coverage for an airplane at `(x, y)` facing `heading`: a 2x3
/// block strictly ahead of it (two rows/columns deep, three cells wide),
/// clipped to the grid bounds.
#[must_use]
pub fn scanner_coverage(
    x: usize,
    y: usize,
    heading: Heading,
    width: usize,
    height: usize,
) -> Vec<(usize, usize)> {
    let x = x as i64;
    let y = y as i64;
    let mut cells = Vec::with_capacity(6);
    let mut push = |cx: i64, cy: i64| {
        if cx >= 0 && cx < width as i64 && cy >= 0 && cy < height as i64 {
            cells.push((cx as usize, cy as usize));
        }
    };

    match heading {
        Heading::Up => {
            for i in 0..2 {
                for j in -1..=1 {
                    push(x + j, y - 1 - i);
                }
            }
        }
        Heading::Down => {
            for i in 0..2 {
                for j in -1..=1 {
                    push(x + j, y + 1 + i);
                }
            }
        }
        Heading::Left => {
            for i in -1..=1 {
                for j in 0..2 {
                    push(x - 1 - j, y + i);
                }
            }
        }
        Heading::Right => {
            for i in -1..=1 {
                for j in 0..2 {
                    push(x + 1 + j, y + i);
                }
            }
        }
    }

    cells
}

/// Derive the display grid for one tick.
///
/// Out-of-bounds airplanes are skipped and reported in the returned warning
/// list (one entry naming each offender); they never abort the tick.
#[must_use]
pub fn compose(
    base: &MapGrid,
    scanned: &[ScannedCell],
    airplanes: &[Airplane],
) -> (MapGrid, Vec<String>) {
    let width = base.width();
    let height = base.height();
    let mut out = base.clone();
    let mut warnings = Vec::new();

    let in_bounds = |x: i32, y: i32| -> bool {
        x >= 0 && (x as usize) < width && y >= 0 && (y as usize) < height
    };

    for cell in scanned {
        if !in_bounds(cell.pos_x, cell.pos_y) {
            continue;
        }
        let (x, y) = (cell.pos_x as usize, cell.pos_y as usize);
        // Recolor against the *base* map, not earlier overlay writes
        if base.get(x, y) == BACKGROUND_COLOR {
            out.set(x, y, SCAN_MARKER_COLOR);
        } else {
            out.set(x, y, SCAN_OCCUPIED_COLOR);
        }
    }

    for plane in airplanes {
        if !in_bounds(plane.pos_x, plane.pos_y) {
            warnings.push(format!(
                "Airplane {} is out of bounds at ({}, {})",
                plane.name, plane.pos_x, plane.pos_y
            ));
            continue;
        }
        let (x, y) = (plane.pos_x as usize, plane.pos_y as usize);
        let color = Rgb::from_hex(&plane.color).unwrap_or(FALLBACK_PLANE_COLOR);

        if let Some((ix, iy)) = direction_indicator(x, y, plane.rotation, width, height) {
            out.set(ix, iy, color.brighten(INDICATOR_BRIGHTEN));
        }

        for (cx, cy) in scanner_coverage(x, y, plane.rotation, width, height) {
            out.set(cx, cy, color.complement());
        }

        // Airplanes are always drawn over every overlay
        out.set(x, y, color);
    }

    (out, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DEFAULT_COLOR, GRID_SIZE};
    use chrono::Utc;

    fn plane(name: &str, x: i32, y: i32, rotation: Heading, color: &str) -> Airplane {
        Airplane {
            id: 1,
            name: name.to_string(),
            pos_x: x,
            pos_y: y,
            rotation,
            color: color.to_string(),
            flight_ended: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_direction_indicator_up() {
        assert_eq!(
            direction_indicator(4, 7, Heading::Up, GRID_SIZE, GRID_SIZE),
            Some((4, 6))
        );
    }

    #[test]
    fn test_direction_indicator_suppressed_at_edge() {
        assert_eq!(direction_indicator(4, 0, Heading::Up, GRID_SIZE, GRID_SIZE), None);
        assert_eq!(direction_indicator(0, 4, Heading::Left, GRID_SIZE, GRID_SIZE), None);
        assert_eq!(
            direction_indicator(GRID_SIZE - 1, 4, Heading::Right, GRID_SIZE, GRID_SIZE),
            None
        );
        assert_eq!(
            direction_indicator(4, GRID_SIZE - 1, Heading::Down, GRID_SIZE, GRID_SIZE),
            None
        );
    }

    #[test]
    fn test_scanner_coverage_right() {
        let mut cells = scanner_coverage(5, 5, Heading::Right, GRID_SIZE, GRID_SIZE);
        cells.sort_unstable();
        assert_eq!(cells, vec![(6, 4), (6, 5), (6, 6), (7, 4), (7, 5), (7, 6)]);
    }

    #[test]
    fn test_scanner_coverage_clips_at_corner() {
        let mut cells = scanner_coverage(0, 0, Heading::Up, GRID_SIZE, GRID_SIZE);
        assert!(cells.is_empty());

        cells = scanner_coverage(0, 0, Heading::Down, GRID_SIZE, GRID_SIZE);
        cells.sort_unstable();
        // Column -1 is clipped away
        assert_eq!(cells, vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_compose_scanned_cell_recolor() {
        let mut raw = vec![vec![vec![0.0, 0.0, 0.0]; GRID_SIZE]; GRID_SIZE];
        raw[2][3] = vec![255.0, 255.0, 255.0];
        let base = MapGrid::from_raw(&raw).unwrap();

        let scanned = [
            ScannedCell { pos_x: 3, pos_y: 2 },
            ScannedCell { pos_x: 9, pos_y: 9 },
        ];
        let (out, warnings) = compose(&base, &scanned, &[]);
        assert!(warnings.is_empty());
        assert_eq!(out.get(3, 2), SCAN_MARKER_COLOR);
        assert_eq!(out.get(9, 9), SCAN_OCCUPIED_COLOR);
    }

    #[test]
    fn test_compose_ignores_out_of_range_scanned_cell() {
        let base = MapGrid::new();
        let scanned = [ScannedCell { pos_x: -1, pos_y: 500 }];
        let (out, warnings) = compose(&base, &scanned, &[]);
        assert!(warnings.is_empty());
        assert_eq!(out, base);
    }

    #[test]
    fn test_compose_out_of_bounds_airplane_warns_and_skips() {
        let base = MapGrid::new();
        let planes = [plane("rogue", -1, 5, Heading::Up, "#ff0000")];
        let (out, warnings) = compose(&base, &[], &planes);
        assert_eq!(out, base);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("rogue"));
    }

    #[test]
    fn test_compose_paints_airplane_over_overlays() {
        let base = MapGrid::new();
        let planes = [plane("scout", 5, 5, Heading::Right, "#102040")];
        let (out, warnings) = compose(&base, &[], &planes);
        assert!(warnings.is_empty());

        let color = Rgb::new(0x10, 0x20, 0x40);
        assert_eq!(out.get(5, 5), color);
        // Coverage block carries the complement
        assert_eq!(out.get(7, 5), color.complement());
        // The indicator cell (6, 5) sits inside the coverage block, which
        // is painted after it
        assert_eq!(out.get(6, 5), color.complement());
        assert_eq!(out.get(4, 5), DEFAULT_COLOR);
    }

    #[test]
    fn test_compose_edge_airplane_paints_only_itself() {
        let base = MapGrid::new();
        // DOWN at the bottom edge: no indicator, coverage fully clipped
        let planes = [plane("edge", 5, (GRID_SIZE - 1) as i32, Heading::Down, "#ffffff")];
        let (out, _) = compose(&base, &[], &planes);
        assert_eq!(out.get(5, GRID_SIZE - 1), Rgb::new(255, 255, 255));
        assert_eq!(out.get(5, GRID_SIZE - 2), DEFAULT_COLOR);
    }

    #[test]
    fn test_compose_malformed_color_falls_back() {
        let base = MapGrid::new();
        let planes = [plane("plain", 10, 10, Heading::Up, "teal")];
        let (out, _) = compose(&base, &[], &planes);
        assert_eq!(out.get(10, 10), FALLBACK_PLANE_COLOR);
    }

    #[test]
    fn test_compose_never_mutates_base() {
        let base = MapGrid::new();
        let snapshot = base.clone();
        let planes = [plane("scout", 50, 50, Heading::Left, "#808080")];
        let scanned = [ScannedCell { pos_x: 1, pos_y: 1 }];
        let _ = compose(&base, &scanned, &planes);
        assert_eq!(base, snapshot);
    }
}

//! Raster-order enumeration of a tile grid.

use crate::coord::{TileGrid, TileIndex};

/// Iterator over the tiles of a [`TileGrid`] in raster order.
#[derive(Debug, Clone)]
pub struct GridIter {
    grid: TileGrid,
    column: u32,
    row: u32,
    done: bool,
}

impl Iterator for GridIter {
    type Item = TileIndex;

    fn next(&mut self) -> Option<TileIndex> {
        if self.done {
            return None;
        }
        let index = TileIndex::new(self.column, self.row, self.grid.zoom);

        if self.column < self.grid.col_max {
            self.column += 1;
        } else if self.row < self.grid.row_max {
            self.column = self.grid.col_min;
            self.row += 1;
        } else {
            self.done = true;
        }
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let columns = self.grid.columns() as usize;
        let rows_after = (self.grid.row_max - self.row) as usize;
        let remaining = rows_after * columns + (self.grid.col_max - self.column) as usize + 1;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter {}

impl TileGrid {
    /// Iterate the grid's tiles row by row, left to right.
    pub fn iter(&self) -> GridIter {
        GridIter {
            grid: *self,
            column: self.col_min,
            row: self.row_min,
            done: false,
        }
    }
}

impl IntoIterator for &TileGrid {
    type Item = TileIndex;
    type IntoIter = GridIter;

    fn into_iter(self) -> GridIter {
        self.iter()
    }
}

/// The authoritative work list for a grid: every tile, in raster order.
pub fn enumerate(grid: &TileGrid) -> Vec<TileIndex> {
    grid.iter().collect()
}

use geo::Rect;
use ndarray::Array2;

use crate::core::tile::TileGrid;
use crate::error::{Error, Result};

/// Single-band raster held in memory, georeferenced by its grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// Pixel values, shape (height, width)
    pub data: Array2<f32>,
    pub grid: TileGrid,
    pub nodata: Option<f32>,
}

impl Raster {
    pub fn new(data: Array2<f32>, grid: TileGrid, nodata: Option<f32>) -> Result<Self> {
        if data.dim() != grid.shape() {
            let (rows, cols) = data.dim();
            return Err(Error::Processing(format!(
                "data shape {}x{} does not match grid {}x{}",
                cols, rows, grid.width, grid.height
            )));
        }
        Ok(Raster { data, grid, nodata })
    }

    /// Raster of the given grid filled with a constant.
    pub fn filled(grid: TileGrid, value: f32, nodata: Option<f32>) -> Self {
        Raster {
            data: Array2::from_elem(grid.shape(), value),
            grid,
            nodata,
        }
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.grid.bounds()
    }
}

//! Digit extraction from composite captcha images.
//!
//! A composite image holds several digits side by side at fixed positions.
//! Each digit region is cut out, normalized pixel by pixel and centered in a
//! fixed-size tile so every digit ends up with the same shape.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::iter;
use std::path::Path;

use crate::error::{DatasetError, DatasetResult};
use crate::normalize::normalize_rgba8;

/// Rectangle of one digit inside a composite image, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl DigitRegion {
    /// Exclusive right edge, saturating at `u32::MAX`.
    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`.
    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Rejects regions whose edges do not fit in `u32`.
    pub fn check_bounds(&self) -> DatasetResult<()> {
        match (
            self.left.checked_add(self.width),
            self.top.checked_add(self.height),
        ) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(DatasetError::Config(format!(
                "region at left={} top={} ({}x{}) overflows pixel coordinates",
                self.left, self.top, self.width, self.height
            ))),
        }
    }
}

/// One normalized digit, `width * height` intensities in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitTile {
    pub pixels: Vec<f32>,
    /// Where the digit came from in the composite image
    pub region: DigitRegion,
}

/// Validated extraction layout: the ordered regions plus the tile they are padded into.
///
/// Padding is split around the region: the left (top) side gets
/// `floor(extra / 2)` zero columns (rows) and the right (bottom) side gets the
/// remainder, so an odd surplus puts the extra column on the right.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGeometry {
    regions: Vec<DigitRegion>,
    tile_width: u32,
    tile_height: u32,
    pad_left: u32,
    pad_top: u32,
}

impl TileGeometry {
    /// Builds the layout. All regions must share one size that fits in the tile.
    pub fn new(regions: Vec<DigitRegion>, tile_width: u32, tile_height: u32) -> DatasetResult<Self> {
        let first = *regions
            .first()
            .ok_or_else(|| DatasetError::Config("no digit regions configured".into()))?;

        if regions
            .iter()
            .any(|r| r.width != first.width || r.height != first.height)
        {
            return Err(DatasetError::Config(
                "all digit regions must share the same width and height".into(),
            ));
        }
        for region in &regions {
            region.check_bounds()?;
        }
        if first.width > tile_width || first.height > tile_height {
            return Err(DatasetError::Config(format!(
                "digit region {}x{} does not fit in a {}x{} tile",
                first.width, first.height, tile_width, tile_height
            )));
        }

        Ok(Self {
            pad_left: (tile_width - first.width) / 2,
            pad_top: (tile_height - first.height) / 2,
            regions,
            tile_width,
            tile_height,
        })
    }

    pub fn regions(&self) -> &[DigitRegion] {
        &self.regions
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// Number of intensities in one tile.
    pub fn tile_size(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize
    }

    pub fn pad_left(&self) -> u32 {
        self.pad_left
    }

    pub fn pad_right(&self) -> u32 {
        self.tile_width - self.region_width() - self.pad_left
    }

    pub fn pad_top(&self) -> u32 {
        self.pad_top
    }

    pub fn pad_bottom(&self) -> u32 {
        self.tile_height - self.region_height() - self.pad_top
    }

    fn region_width(&self) -> u32 {
        self.regions[0].width
    }

    fn region_height(&self) -> u32 {
        self.regions[0].height
    }

    /// Smallest raster (width, height) that contains every region.
    pub fn required_size(&self) -> (u32, u32) {
        let w = self.regions.iter().map(DigitRegion::right).max().unwrap_or(0);
        let h = self.regions.iter().map(DigitRegion::bottom).max().unwrap_or(0);
        (w, h)
    }
}

/// Decodes a composite image from disk.
pub fn load_composite(path: &Path) -> DatasetResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| DatasetError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Decodes a composite image and extracts its digit tiles.
pub fn extract_file(path: &Path, geometry: &TileGeometry) -> DatasetResult<Vec<DigitTile>> {
    let image = load_composite(path)?;
    extract_tiles_from(&image, geometry, path)
}

/// Extracts one tile per region, in region order.
///
/// Tiles are row-major, top to bottom and left to right, so a tile reshapes
/// directly to `(tile_height, tile_width)`.
pub fn extract_tiles(image: &RgbaImage, geometry: &TileGeometry) -> DatasetResult<Vec<DigitTile>> {
    extract_tiles_from(image, geometry, Path::new("<memory>"))
}

fn extract_tiles_from(
    image: &RgbaImage,
    geometry: &TileGeometry,
    path: &Path,
) -> DatasetResult<Vec<DigitTile>> {
    let (width, height) = image.dimensions();
    let (required_width, required_height) = geometry.required_size();
    if width < required_width || height < required_height {
        return Err(DatasetError::ImageTooSmall {
            path: path.to_path_buf(),
            width,
            height,
            required_width,
            required_height,
        });
    }

    let tile_width = geometry.tile_width() as usize;
    let pad_left = geometry.pad_left() as usize;
    let pad_right = geometry.pad_right() as usize;
    let blank_top = geometry.pad_top() as usize * tile_width;
    let blank_bottom = geometry.pad_bottom() as usize * tile_width;

    let tiles = geometry
        .regions()
        .iter()
        .map(|region| {
            let mut pixels = Vec::with_capacity(geometry.tile_size());
            pixels.extend(iter::repeat(0.0).take(blank_top));
            for y in region.top..region.bottom() {
                pixels.extend(iter::repeat(0.0).take(pad_left));
                for x in region.left..region.right() {
                    pixels.push(normalize_rgba8(image.get_pixel(x, y)));
                }
                pixels.extend(iter::repeat(0.0).take(pad_right));
            }
            pixels.extend(iter::repeat(0.0).take(blank_bottom));

            DigitTile {
                pixels,
                region: *region,
            }
        })
        .collect();

    Ok(tiles)
}

//! Contact sheets of sampled tiles, for eyeballing what the trainer sees.

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma};
use std::path::Path;

use crate::batch::Batch;

/// Gap between cells, in pixels.
const CELL_GAP: u32 = 2;

/// Lays out every row of `batch` in a grid, `columns` tiles wide.
///
/// Intensity 1.0 (ink) is drawn white on a black background, matching the
/// tensor values rather than the original captcha colors.
pub fn render_contact_sheet(
    batch: &Batch,
    tile_width: u32,
    tile_height: u32,
    columns: u32,
) -> Result<GrayImage> {
    if tile_width as usize * tile_height as usize != batch.tile_size {
        return Err(anyhow!(
            "{}x{} tiles do not match batch tile size {}",
            tile_width,
            tile_height,
            batch.tile_size
        ));
    }
    let columns = columns.max(1);
    let rows = (batch.len() as u32).div_ceil(columns).max(1);

    let sheet_width = columns * (tile_width + CELL_GAP) + CELL_GAP;
    let sheet_height = rows * (tile_height + CELL_GAP) + CELL_GAP;
    let mut sheet = GrayImage::new(sheet_width, sheet_height);

    for i in 0..batch.len() {
        let cell_x = CELL_GAP + (i as u32 % columns) * (tile_width + CELL_GAP);
        let cell_y = CELL_GAP + (i as u32 / columns) * (tile_height + CELL_GAP);
        for (p, &value) in batch.tile(i).iter().enumerate() {
            let x = p as u32 % tile_width;
            let y = p as u32 / tile_width;
            let level = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            sheet.put_pixel(cell_x + x, cell_y + y, Luma([level]));
        }
    }

    Ok(sheet)
}

/// Renders and writes a contact sheet; the format follows the file extension.
pub fn save_contact_sheet(
    batch: &Batch,
    tile_width: u32,
    tile_height: u32,
    columns: u32,
    output_path: &Path,
) -> Result<()> {
    let sheet = render_contact_sheet(batch, tile_width, tile_height, columns)?;
    sheet
        .save(output_path)
        .context(format!("Failed to save contact sheet: {}", output_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn two_tile_batch() -> Batch {
        // 2x2 tiles: first fully inked, second blank except one corner
        Batch {
            xs: vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.5],
            ys: vec![1, 0, 0, 1],
            indices: vec![4, 9],
            tile_size: 4,
            num_classes: 2,
        }
    }

    #[test]
    fn test_sheet_dimensions() {
        let sheet = render_contact_sheet(&two_tile_batch(), 2, 2, 1).unwrap();
        // One column, two rows, 2px gaps around every cell
        assert_eq!(sheet.dimensions(), (2 + 2 + 2, 2 * (2 + 2) + 2));
    }

    #[test]
    fn test_tile_pixels_land_in_cells() {
        let sheet = render_contact_sheet(&two_tile_batch(), 2, 2, 2).unwrap();
        assert_eq!(sheet.get_pixel(2, 2)[0], 255);
        assert_eq!(sheet.get_pixel(3, 3)[0], 255);
        // Second cell starts at x = 2 + 2 + 2
        assert_eq!(sheet.get_pixel(6, 2)[0], 0);
        assert_eq!(sheet.get_pixel(7, 3)[0], 128);
        // Gap stays black
        assert_eq!(sheet.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_wrong_tile_size_rejected() {
        assert!(render_contact_sheet(&two_tile_batch(), 3, 2, 4).is_err());
    }

    #[test]
    fn test_save_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sheet.png");
        save_contact_sheet(&two_tile_batch(), 2, 2, 4, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_luma8();
        assert_eq!(loaded.get_pixel(2, 2)[0], 255);
    }
}

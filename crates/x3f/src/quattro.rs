//! Merging the Quattro sensor's half-resolution chroma planes with its
//! full-resolution top (luminance) layer (`spec.md` §4.10)
use crate::errors::{Result, X3fError};
use crate::pixel::PixelArea;

pub struct QuattroExpander;

impl QuattroExpander {
    /// `lowres` is a three-channel image at half resolution along each
    /// axis, with channel 2 already the 2×2 box average of `top`; `top` is
    /// the full-resolution single-channel luminance plane. Channels 0 and 1
    /// are nearest-neighbor upsampled; channel 2 is taken directly from
    /// `top`, which trivially satisfies the tile-sum conservation in
    /// `spec.md` §8 since `lowres`'s channel 2 was itself derived from it.
    pub fn expand(lowres: &PixelArea, top: &PixelArea) -> Result<PixelArea<'static>> {
        if top.columns() != 2 * lowres.columns() || top.rows() != 2 * lowres.rows() {
            return Err(X3fError::ShapeMismatch {
                expected: (2 * lowres.columns(), 2 * lowres.rows()),
                found: (top.columns(), top.rows())
            });
        }

        let mut out = PixelArea::owned(top.columns(), top.rows(), 3);
        for full_row in 0..top.rows() {
            let low_row = full_row / 2;
            for full_col in 0..top.columns() {
                let low_col = full_col / 2;
                out.set(full_row, full_col, 0, lowres.get(low_row, low_col, 0));
                out.set(full_row, full_col, 1, lowres.get(low_row, low_col, 1));
                out.set(full_row, full_col, 2, top.get(full_row, full_col, 0));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_neighbor_duplicates_chroma_channels() {
        let mut lowres = PixelArea::owned(2, 2, 3);
        lowres.set(0, 0, 0, 10);
        lowres.set(0, 0, 1, 20);
        lowres.set(0, 1, 0, 30);

        let top = PixelArea::owned(4, 4, 1);

        let out = QuattroExpander::expand(&lowres, &top).unwrap();
        assert_eq!(out.get(0, 0, 0), 10);
        assert_eq!(out.get(1, 1, 0), 10);
        assert_eq!(out.get(0, 1, 0), 10);
        assert_eq!(out.get(0, 2, 0), 30);
        assert_eq!(out.get(0, 0, 1), 20);
    }

    #[test]
    fn channel_two_comes_from_top_layer_verbatim() {
        let lowres = PixelArea::owned(2, 2, 3);
        let mut top = PixelArea::owned(4, 4, 1);
        top.set(1, 3, 0, 777);

        let out = QuattroExpander::expand(&lowres, &top).unwrap();
        assert_eq!(out.get(1, 3, 2), 777);
    }

    #[test]
    fn tile_sum_conservation_on_top_channel() {
        let mut lowres = PixelArea::owned(2, 2, 3);
        let mut top = PixelArea::owned(4, 4, 1);
        // Each 2x2 tile sums to a multiple of 4 so the box average divides
        // evenly; otherwise integer-division truncation would make the
        // conservation check only hold "up to rounding" rather than exactly.
        let values = [
            [0u16, 8, 100, 108],
            [4, 12, 104, 112],
            [200, 208, 300, 308],
            [204, 212, 304, 312]
        ];
        for (row, row_vals) in values.iter().enumerate() {
            for (col, &v) in row_vals.iter().enumerate() {
                top.set(row, col, 0, v);
            }
        }
        // channel 2 of lowres is the 2x2 box average, matching the contract
        // this function relies on.
        for r in 0..2 {
            for c in 0..2 {
                let sum: u32 = (0..2)
                    .flat_map(|i| (0..2).map(move |j| (i, j)))
                    .map(|(i, j)| u32::from(top.get(2 * r + i, 2 * c + j, 0)))
                    .sum();
                lowres.set(r, c, 2, (sum / 4) as u16);
            }
        }

        let out = QuattroExpander::expand(&lowres, &top).unwrap();
        for r in 0..2 {
            for c in 0..2 {
                let sum: u32 = (0..2)
                    .flat_map(|i| (0..2).map(move |j| (i, j)))
                    .map(|(i, j)| u32::from(out.get(2 * r + i, 2 * c + j, 2)))
                    .sum();
                assert_eq!(sum, 4 * u32::from(lowres.get(r, c, 2)));
            }
        }
    }

    #[test]
    fn mismatched_dimensions_error() {
        let lowres = PixelArea::owned(2, 2, 3);
        let top = PixelArea::owned(3, 4, 1);
        assert!(matches!(QuattroExpander::expand(&lowres, &top), Err(X3fError::ShapeMismatch { .. })));
    }
}

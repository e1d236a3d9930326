//! Black-level estimation, bad-pixel repair, and linearization to a 14-bit
//! intermediate depth (`spec.md` §4.11).
use crate::bad_pixel::{self, BadPixel};
use crate::camf::MetaAccess;
use crate::color;
use crate::errors::{Result, X3fError};
use crate::options::DecodeOptions;
use crate::pixel::PixelArea;
use crate::quirks;

/// `x3f_denoise` (out of scope here, but the seam this crate exposes)
/// expects a 14-bit image since it internally rescales by 4.
pub const INTERMEDIATE_DEPTH: u32 = 14;
pub const INTERMEDIATE_UNIT: u32 = (1 << INTERMEDIATE_DEPTH) - 1;
const INTERMEDIATE_BIAS_FACTOR: f64 = 4.0;

/// A rectangle `(col0, row0, col1, row1)`, end-exclusive.
#[derive(Copy, Clone, Debug)]
struct Rect {
    col0: u32,
    row0: u32,
    col1: u32,
    row1: u32
}

impl Rect {
    fn from_quad(q: [u32; 4]) -> Rect {
        Rect { col0: q[0], row0: q[1], col1: q[2], row1: q[3] }
    }

    fn is_valid(self) -> bool {
        self.col1 > self.col0 && self.row1 > self.row0
    }
}

fn collect_black_rects(meta: &MetaAccess, image_columns: u32, half_res: bool) -> Vec<Rect> {
    let halve = |q: [u32; 4]| if half_res { [q[0] / 2, q[1] / 2, q[2] / 2, q[3] / 2] } else { q };
    let skip = quirks::shield_skip(meta);

    let mut rects: Vec<Rect> = Vec::new();
    if !skip.skip_bottom {
        if let Ok(q) = meta.get_unsigned_quad("DarkShieldBottom") {
            let r = Rect::from_quad(halve(q));
            if r.is_valid() {
                rects.push(r);
            }
        }
    }
    if let Ok(q) = meta.get_unsigned_quad("DarkShieldTop") {
        let r = Rect::from_quad(halve(q));
        if r.is_valid() {
            rects.push(r);
        }
    }
    if let Ok(keep) = meta.get_unsigned_quad("KeepImageArea") {
        let keep = Rect::from_quad(halve(keep));
        let left = Rect { col0: 0, row0: keep.row0, col1: keep.col0, row1: keep.row1 };
        if left.is_valid() {
            rects.push(left);
        }
        if !skip.skip_right {
            let right = Rect { col0: keep.col1, row0: keep.row0, col1: image_columns, row1: keep.row1 };
            if right.is_valid() {
                rects.push(right);
            }
        }
    }
    rects
}

fn sum_rect(image: &PixelArea, rect: Rect, colors: usize) -> (u64, [f64; 3]) {
    let mut sum = [0u64; 3];
    let mut n = 0u64;
    for row in rect.row0..rect.row1.min(image.rows() as u32) {
        for col in rect.col0..rect.col1.min(image.columns() as u32) {
            n += 1;
            for (color, s) in sum.iter_mut().enumerate().take(colors) {
                *s += u64::from(image.get(row as usize, col as usize, color));
            }
        }
    }
    let mean = std::array::from_fn(|c| if n > 0 { sum[c] as f64 / n as f64 } else { 0.0 });
    (n, mean)
}

fn sum_sqdev_rect(image: &PixelArea, rect: Rect, colors: usize, mean: &[f64; 3]) -> (u64, [f64; 3]) {
    let mut sum = [0f64; 3];
    let mut n = 0u64;
    for row in rect.row0..rect.row1.min(image.rows() as u32) {
        for col in rect.col0..rect.col1.min(image.columns() as u32) {
            n += 1;
            for (color, s) in sum.iter_mut().enumerate().take(colors) {
                let dev = f64::from(image.get(row as usize, col as usize, color)) - mean[color];
                *s += dev * dev;
            }
        }
    }
    (n, sum)
}

/// Estimate per-channel black level and standard deviation from the dark
/// shield rectangles and the masked strips outside `KeepImageArea`
/// (`spec.md` §4.11 step 1; the exact column range of the side strips is
/// an Open Question in `spec.md` §9, resolved here as "everything between
/// `KeepImageArea` and the sensor edge" per that section's guidance).
pub fn black_level(image: &PixelArea, colors: usize, meta: &MetaAccess) -> Result<([f64; 3], [f64; 3])> {
    black_level_at(image, colors, meta, false)
}

/// Like [`black_level`], but for the Quattro chroma plane: CAMF rectangles
/// are specified at full sensor resolution and must be halved before use
/// against a half-resolution plane (`get_black_level`'s `rescale` flag).
fn black_level_at(image: &PixelArea, colors: usize, meta: &MetaAccess, half_res: bool) -> Result<([f64; 3], [f64; 3])> {
    let rects = collect_black_rects(meta, image.columns() as u32, half_res);

    if rects.is_empty() {
        log::warn!("no black-level rectangles available, assuming grayscale black level 0");
        return Ok(([0.0; 3], [0.0; 3]));
    }

    let mut sum = [0u64; 3];
    let mut total = 0u64;
    for &rect in &rects {
        let (n, mean) = sum_rect(image, rect, colors);
        total += n;
        for c in 0..colors {
            sum[c] += (mean[c] * n as f64) as u64;
        }
    }
    if total == 0 {
        return Ok(([0.0; 3], [0.0; 3]));
    }
    let black_level: [f64; 3] = std::array::from_fn(|c| sum[c] as f64 / total as f64);

    let mut sqdev = [0f64; 3];
    let mut total2 = 0u64;
    for &rect in &rects {
        let (n, sq) = sum_sqdev_rect(image, rect, colors, &black_level);
        total2 += n;
        for c in 0..colors {
            sqdev[c] += sq[c];
        }
    }
    let black_dev: [f64; 3] =
        std::array::from_fn(|c| if total2 > 0 { (sqdev[c] / total2 as f64).sqrt() } else { 0.0 });

    Ok((black_level, black_dev))
}

/// Sensor maximum raw value per channel: `ImageDepth` if present, else
/// `RawSaturationLevel` (TRUE-engine cameras) or `SaturationLevel`
/// (`spec.md` §4.11 step 2).
pub fn max_raw(meta: &MetaAccess) -> Result<[u32; 3]> {
    if let Ok(depth) = meta.get_unsigned("ImageDepth") {
        let v = (1u32 << depth) - 1;
        return Ok([v, v, v]);
    }
    let has_color_corrections =
        meta.get_property_list("WhiteBalanceColorCorrections").is_ok() || meta.get_property_list("DP1_WhiteBalanceColorCorrections").is_ok();
    let has_gains = meta.get_property_list("WhiteBalanceGains").is_ok() || meta.get_property_list("DP1_WhiteBalanceGains").is_ok();
    let is_true_engine = has_color_corrections && has_gains;
    let name = if is_true_engine { "RawSaturationLevel" } else { "SaturationLevel" };
    match meta.get_unsigned_vector(name) {
        Ok(v) => Ok(v),
        Err(_) => match meta.get_unsigned(name) {
            Ok(v) => Ok([v, v, v]),
            Err(_) => Err(X3fError::UnsupportedCamera)
        }
    }
}

/// Cap the gain vector so no channel clips, then map into `[bias,
/// INTERMEDIATE_UNIT]` (`spec.md` §4.11 step 3).
fn max_intermediate(gain: [f64; 3], bias: f64) -> [u32; 3] {
    let max_gain = gain.iter().cloned().fold(0.0_f64, f64::max).max(f64::EPSILON);
    std::array::from_fn(|c| (gain[c] * (f64::from(INTERMEDIATE_UNIT) - bias) / max_gain + bias).round() as u32)
}

fn intermediate_bias(gain: [f64; 3], max_raw: [u32; 3], black_level: [f64; 3], black_dev: [f64; 3]) -> f64 {
    let max_int_unbiased = max_intermediate(gain, 0.0);
    (0..3)
        .map(|c| {
            let denom = f64::from(max_raw[c]) - black_level[c];
            if denom <= 0.0 { 0.0 } else { INTERMEDIATE_BIAS_FACTOR * black_dev[c] * f64::from(max_int_unbiased[c]) / denom }
        })
        .fold(0.0_f64, f64::max)
}

/// The black/white levels a linearized image was scaled into, needed by
/// [`crate::color::render`] to normalize samples back to `[0, 1]` before
/// the color matrix (`x3f_image_levels_t` in the reference decoder).
#[derive(Copy, Clone, Debug)]
pub struct LinearizedLevels {
    pub black: [f64; 3],
    pub white: [f64; 3]
}

/// Linearize a raw plane to the 14-bit intermediate depth and repair bad
/// pixels, per `spec.md` §4.11 steps 3-5.
pub fn process(
    mut raw: PixelArea<'static>,
    colors: usize,
    meta: &MetaAccess,
    wb: &str,
    bad_pixels: Vec<BadPixel>,
    options: &DecodeOptions
) -> Result<(PixelArea<'static>, LinearizedLevels)> {
    let (black, dev) = black_level(&raw, colors, meta)?;
    let max_raw_level = max_raw(meta)?;
    let gain = color::get_gain(meta, wb).unwrap_or([1.0, 1.0, 1.0]);
    let bias = intermediate_bias(gain, max_raw_level, black, dev);
    let max_int = max_intermediate(gain, bias);

    let scale: [f64; 3] = std::array::from_fn(|c| {
        let denom = f64::from(max_raw_level[c]) - black[c];
        if denom.abs() < f64::EPSILON { 1.0 } else { f64::from(max_int[c]) / denom }
    });

    let rows = raw.rows();
    let columns = raw.columns();
    for row in 0..rows {
        for col in 0..columns {
            for color in 0..colors {
                let v = f64::from(raw.get(row, col, color));
                let out = (scale[color] * (v - black[color]) + bias).round();
                raw.set(row, col, color, out.clamp(0.0, 65535.0) as u16);
            }
        }
    }

    bad_pixel::repair(&mut raw, colors, bad_pixels, options);

    let levels = LinearizedLevels { black: [bias; 3], white: std::array::from_fn(|c| f64::from(max_int[c])) };
    Ok((raw, levels))
}

/// Linearize and bad-pixel-repair a decoded `RAW_QUATTRO` image before
/// [`crate::quattro::QuattroExpander::expand`] merges it (`preprocess_data`'s
/// `quattro` branch). `lowres` carries the two true chroma channels in 0/1;
/// its third channel is filled here as the 2x2 box-average of `top`, the
/// full-resolution luminance plane, scaled through the same intermediate
/// mapping as the chroma channels so the three are on a common scale before
/// [`LinearizedLevels`] is applied downstream.
pub fn process_quattro(
    mut lowres: PixelArea<'static>,
    mut top: PixelArea<'static>,
    meta: &MetaAccess,
    wb: &str,
    bad_pixels_chroma: Vec<BadPixel>,
    bad_pixels_luma: Vec<BadPixel>,
    options: &DecodeOptions
) -> Result<(PixelArea<'static>, PixelArea<'static>, LinearizedLevels)> {
    if top.columns() != 2 * lowres.columns() || top.rows() != 2 * lowres.rows() {
        return Err(X3fError::ShapeMismatch {
            expected: (2 * lowres.columns(), 2 * lowres.rows()),
            found: (top.columns(), top.rows())
        });
    }

    let (black_chroma, dev_chroma) = black_level_at(&lowres, 2, meta, true)?;
    let (black_luma, dev_luma) = black_level_at(&top, 1, meta, false)?;
    let black = [black_chroma[0], black_chroma[1], black_luma[0]];
    let dev = [dev_chroma[0], dev_chroma[1], dev_luma[0]];

    let max_raw_level = max_raw(meta)?;
    let gain = color::get_gain(meta, wb).unwrap_or([1.0, 1.0, 1.0]);
    let bias = intermediate_bias(gain, max_raw_level, black, dev);
    let max_int = max_intermediate(gain, bias);

    let scale: [f64; 3] = std::array::from_fn(|c| {
        let denom = f64::from(max_raw_level[c]) - black[c];
        if denom.abs() < f64::EPSILON { 1.0 } else { f64::from(max_int[c]) / denom }
    });

    let (low_rows, low_cols) = (lowres.rows(), lowres.columns());
    for row in 0..low_rows {
        for col in 0..low_cols {
            for color in 0..2 {
                let v = f64::from(lowres.get(row, col, color));
                let out = (scale[color] * (v - black[color]) + bias).round();
                lowres.set(row, col, color, out.clamp(0.0, 65535.0) as u16);
            }
        }
    }

    // Box-average the raw (not-yet-linearized) top layer before `top` is
    // overwritten by its own linearization below.
    for row in 0..low_rows {
        for col in 0..low_cols {
            let sum: u32 = [(0, 0), (0, 1), (1, 0), (1, 1)]
                .iter()
                .map(|&(dr, dc)| u32::from(top.get(2 * row + dr, 2 * col + dc, 0)))
                .sum();
            let avg = f64::from(sum) / 4.0;
            let out = (scale[2] * (avg - black[2]) + bias).round();
            lowres.set(row, col, 2, out.clamp(0.0, 65535.0) as u16);
        }
    }

    let (top_rows, top_cols) = (top.rows(), top.columns());
    for row in 0..top_rows {
        for col in 0..top_cols {
            let v = f64::from(top.get(row, col, 0));
            let out = (scale[2] * (v - black[2]) + bias).round();
            top.set(row, col, 0, out.clamp(0.0, 65535.0) as u16);
        }
    }

    bad_pixel::repair(&mut top, 1, bad_pixels_luma, options);
    bad_pixel::repair(&mut lowres, 3, bad_pixels_chroma, options);

    let levels = LinearizedLevels { black: [bias; 3], white: std::array::from_fn(|c| f64::from(max_int[c])) };
    Ok((lowres, top, levels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_black_level_rects_default_to_zero() {
        let image = PixelArea::owned(4, 4, 3);
        let meta = MetaAccess::new(&[], &[]);
        let (black, dev) = black_level(&image, 3, &meta).unwrap();
        assert_eq!(black, [0.0; 3]);
        assert_eq!(dev, [0.0; 3]);
    }

    #[test]
    fn max_intermediate_caps_gain_to_unit_ceiling() {
        let out = max_intermediate([2.0, 1.0, 0.5], 0.0);
        assert_eq!(out[0], INTERMEDIATE_UNIT);
        assert!(out[1] < out[0]);
        assert!(out[2] < out[1]);
    }

    #[test]
    fn unsupported_camera_without_any_saturation_source() {
        let meta = MetaAccess::new(&[], &[]);
        assert!(matches!(max_raw(&meta), Err(X3fError::UnsupportedCamera)));
    }

    #[test]
    fn process_quattro_rejects_mismatched_top_dimensions() {
        let lowres = PixelArea::owned(4, 4, 3);
        let top = PixelArea::owned(7, 8, 1);
        let meta = MetaAccess::new(&[], &[]);
        let result = process_quattro(lowres, top, &meta, "Auto", vec![], vec![], &DecodeOptions::new());
        assert!(matches!(result, Err(X3fError::ShapeMismatch { .. })));
    }

    #[test]
    fn process_quattro_box_averages_top_into_chroma_channel_two() {
        let mut top = PixelArea::owned(2, 2, 1);
        for (row, col, v) in [(0, 0, 100), (0, 1, 200), (1, 0, 300), (1, 1, 400)] {
            top.set(row, col, 0, v);
        }
        let lowres = PixelArea::owned(1, 1, 3);
        let camf = [crate::camf::entry::CamfEntry {
            name: "ImageDepth".to_string(),
            value: crate::camf::entry::CamfValue::Matrix(crate::camf::entry::CamfMatrix {
                dims: vec![1],
                dim_names: vec!["n".to_string()],
                kind: crate::camf::entry::MatrixKind::UInt,
                data: crate::camf::entry::MatrixData::UInt(vec![14])
            })
        }];
        let meta = MetaAccess::new(&camf, &[]);
        let (lowres, _top, _levels) =
            process_quattro(lowres, top, &meta, "Auto", vec![], vec![], &DecodeOptions::new()).unwrap();
        // ImageDepth=14 with no black-level rects and no WB gains gives
        // scale=1.0 exactly, so channel 2 is the untouched box average.
        assert_eq!(lowres.get(0, 0, 2), 250);
    }
}

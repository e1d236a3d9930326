//! White-balance gain, camera-to-XYZ matrix derivation, ISO scaling and
//! output-color-space selection (`spec.md` §4.14; ported from the
//! reference decoder's `x3f_get_gain`/`x3f_get_bmt_to_xyz`/
//! `x3f_get_raw_to_xyz`/`get_conv`/`convert_data`).
use crate::camf::MetaAccess;
use crate::errors::Result;
use crate::matrix::{self, Mat3, ToneLut, Vec3};
use crate::options::defaults;
use crate::pixel::{PixelArea, RenderedImage};
use crate::preprocess::LinearizedLevels;
use crate::spatial_gain::SpatialGain;

/// Output RGB color space a rendered image can be produced in
/// (`spec.md` §4.14 step 4).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ColorSpace {
    Srgb,
    AdobeRgb,
    ProPhotoRgb
}

/// `x3f_get_camf_matrix_for_wb`: resolve `list[wb]` to a CAMF matrix name,
/// falling back from `"Daylight"` to `"Sunlight"` for the SD1 firmware bug
/// that never wrote a `Daylight` entry.
fn resolve_wb_matrix_name(meta: &MetaAccess, list: &'static str, wb: &str) -> Result<String> {
    match meta.get_property(list, wb) {
        Ok(name) => Ok(name.to_string()),
        Err(e) if wb == "Daylight" => meta.get_property(list, "Sunlight").map(str::to_string).map_err(|_| e),
        Err(e) => Err(e)
    }
}

/// `wb_correction * cam_to_xyz` via the `WhiteBalanceIlluminants` /
/// `WhiteBalanceCorrections` CAMF pair, used as a fallback by both
/// [`get_gain`] and [`bmt_to_xyz`] on cameras that don't publish
/// `WhiteBalanceGains`/`WhiteBalanceColorCorrections` directly.
fn illuminant_raw_to_xyz(meta: &MetaAccess, wb: &str) -> Result<Mat3> {
    let illuminant_name = resolve_wb_matrix_name(meta, "WhiteBalanceIlluminants", wb)?;
    let illuminant = meta.get_matrix3x3_named(&illuminant_name)?;
    let correction_name = resolve_wb_matrix_name(meta, "WhiteBalanceCorrections", wb)?;
    let correction = meta.get_matrix3x3_named(&correction_name)?;
    Ok(matrix::mat_mul(correction, illuminant))
}

/// Per-channel white-balance gain for `wb`, further adjusted by any of
/// the optional sensor/temperature/aperture gain-factor vectors present
/// on this camera (`spec.md` §4.14 step 1).
pub fn get_gain(meta: &MetaAccess, wb: &str) -> Result<Vec3> {
    let direct = resolve_wb_matrix_name(meta, "WhiteBalanceGains", wb)
        .or_else(|_| resolve_wb_matrix_name(meta, "DP1_WhiteBalanceGains", wb))
        .and_then(|name| meta.get_float_vector_named(&name));

    let mut gain = match direct {
        Ok(g) => g,
        Err(_) => matrix::vec_invert(matrix::raw_neutral(illuminant_raw_to_xyz(meta, wb)?))
    };

    for factor_name in ["SensorAdjustmentGainFact", "TempGainFact", "FNumberGainFact"] {
        if let Ok(factor) = meta.get_float_vector(factor_name) {
            gain = matrix::vec_comp_mul(factor, gain);
        }
    }
    Ok(gain)
}

/// Camera-body/mount/temperature ("BMT") color space to XYZ, without the
/// white-balance gain folded in yet (`spec.md` §4.14 step 2).
pub fn bmt_to_xyz(meta: &MetaAccess, wb: &str) -> Result<Mat3> {
    let direct = resolve_wb_matrix_name(meta, "WhiteBalanceColorCorrections", wb)
        .or_else(|_| resolve_wb_matrix_name(meta, "DP1_WhiteBalanceColorCorrections", wb))
        .and_then(|name| meta.get_matrix3x3_named(&name));

    if let Ok(cc) = direct {
        return Ok(matrix::mat_mul(matrix::SRGB_TO_XYZ, cc));
    }

    let raw_to_xyz = illuminant_raw_to_xyz(meta, wb)?;
    let neutral = matrix::raw_neutral(raw_to_xyz);
    Ok(matrix::mat_mul(raw_to_xyz, matrix::diag(neutral)))
}

/// Raw sensor space to XYZ, with the white-balance gain folded in
/// (`spec.md` §4.14 step 2).
pub fn raw_to_xyz(meta: &MetaAccess, wb: &str) -> Result<Mat3> {
    let gain = get_gain(meta, wb)?;
    let bmt = bmt_to_xyz(meta, wb)?;
    Ok(matrix::mat_mul(bmt, matrix::diag(gain)))
}

/// `CaptureISO / SensorISO`, or `1.0` with a warning if either is
/// missing (`spec.md` §4.14 step 3).
pub fn iso_scaling(meta: &MetaAccess) -> f64 {
    match (meta.get_float("SensorISO"), meta.get_float("CaptureISO")) {
        (Ok(sensor), Ok(capture)) if sensor != 0.0 => capture / sensor,
        _ => {
            log::warn!("could not calculate ISO scaling, assuming {}", defaults::ISO_SCALE);
            defaults::ISO_SCALE
        }
    }
}

fn scalar_mul(s: f64, m: Mat3) -> Mat3 {
    std::array::from_fn(|r| std::array::from_fn(|c| s * m[r][c]))
}

/// The final raw-to-output-RGB matrix and tone-curve LUT for a given
/// white balance and output color space (`spec.md` §4.14 steps 2-4).
pub fn conversion(meta: &MetaAccess, wb: &str, space: ColorSpace, max_out: u16) -> Result<(Mat3, ToneLut)> {
    let raw_to_xyz = raw_to_xyz(meta, wb)?;
    let iso = iso_scaling(meta);

    let (xyz_to_rgb, lut) = match space {
        ColorSpace::Srgb => (matrix::XYZ_TO_SRGB, ToneLut::srgb(max_out)),
        ColorSpace::AdobeRgb => (matrix::XYZ_TO_ADOBE_RGB, ToneLut::gamma(max_out, 2.2)),
        ColorSpace::ProPhotoRgb => {
            // ProPhoto RGB's standard white point is D50, not D65.
            (matrix::mat_mul(matrix::XYZ_TO_PROPHOTO_RGB, matrix::BRADFORD_D65_TO_D50), ToneLut::gamma(max_out, 1.8))
        }
    };

    let raw_to_rgb = matrix::mat_mul(xyz_to_rgb, raw_to_xyz);
    Ok((scalar_mul(iso, raw_to_rgb), lut))
}

/// Normalize each sample to `[0, 1]` against the linearized black/white
/// levels, apply any spatial gain, run the raw-to-RGB matrix, then the
/// tone-curve LUT (`spec.md` §4.14 step 5; `convert_data`).
pub fn render(
    image: &PixelArea,
    levels: &LinearizedLevels,
    conv: Mat3,
    lut: &ToneLut,
    spatial_gain: Option<&SpatialGain>,
    rotation: crate::header::Rotation
) -> RenderedImage {
    let rows = image.rows();
    let columns = image.columns();
    let mut data = vec![0u16; rows * columns * 3];

    for row in 0..rows {
        for col in 0..columns {
            let mut input = [0.0_f64; 3];
            for (channel, slot) in input.iter_mut().enumerate() {
                let sgain = spatial_gain.map_or(1.0, |sg| sg.sample(row, col, channel, rows, columns));
                let raw = f64::from(image.get(row, col, channel));
                let span = levels.white[channel] - levels.black[channel];
                *slot = sgain * (raw - levels.black[channel]) / if span.abs() < f64::EPSILON { 1.0 } else { span };
            }

            let output = matrix::mat_vec_mul(conv, input);
            let base = (row * columns + col) * 3;
            for channel in 0..3 {
                data[base + channel] = lut.lookup(output[channel]);
            }
        }
    }

    RenderedImage { data, columns, rows, rotation }
}

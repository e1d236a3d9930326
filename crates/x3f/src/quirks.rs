//! Known-buggy-camera workaround table (`spec.md` §9, `SPEC_FULL.md` §4.15)
//!
//! The reference decoder scatters `strcmp(cammodel, ...)` and
//! `cameraid == ...` conditionals through `x3f_process.c`. Per `spec.md`
//! §9 ("must be preserved verbatim; encode them as a table of
//! `(model_match, correction)` pairs") this module collects them into one
//! place keyed by the `CAMMODEL` file-property string, since the numeric
//! `CAMERAID` constants referenced by the original source are defined in a
//! header not included in the retrieved excerpt.
use crate::camf::MetaAccess;

/// Which of the four black-level shield rectangles (`spec.md` §4.11,
/// `DarkShieldTop`/`DarkShieldBottom`/left-column/right-column) a camera
/// model's firmware reports incorrectly and so must be skipped.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct ShieldSkip {
    pub skip_bottom: bool,
    pub skip_right: bool
}

/// A hardcoded Quattro autofocus-pixel grid: `col` iterates
/// `[start_col, end_col]` in steps of `col_pitch`, `row` likewise, and each
/// `(row, col)` hit marks a `block_rows x block_cols` block bad.
#[derive(Copy, Clone, Debug)]
pub struct AfGrid {
    pub start_col: u32,
    pub end_col: u32,
    pub col_pitch: u32,
    pub block_cols: u32,
    pub start_row: u32,
    pub end_row: u32,
    pub row_pitch: u32,
    pub block_rows: u32
}

const SDQ_AF_LUMA: AfGrid =
    AfGrid { start_col: 217, end_col: 5641, col_pitch: 16, block_cols: 1, start_row: 464, end_row: 3312, row_pitch: 32, block_rows: 2 };
const SDQ_AF_CHROMA: AfGrid =
    AfGrid { start_col: 108, end_col: 2820, col_pitch: 8, block_cols: 1, start_row: 232, end_row: 1656, row_pitch: 16, block_rows: 1 };
const SDQH_AF_LUMA: AfGrid =
    AfGrid { start_col: 233, end_col: 6425, col_pitch: 16, block_cols: 1, start_row: 592, end_row: 3888, row_pitch: 32, block_rows: 2 };
const SDQH_AF_CHROMA: AfGrid =
    AfGrid { start_col: 116, end_col: 2820, col_pitch: 8, block_cols: 1, start_row: 296, end_row: 1944, row_pitch: 16, block_rows: 1 };

/// Resolve the `(model_match, correction)` table against this file's
/// `CAMMODEL` property, falling back to "no correction" for any model the
/// table doesn't name — a new camera must not make the file unreadable.
pub fn shield_skip_for_model(cam_model: Option<&str>) -> ShieldSkip {
    match cam_model {
        Some("SIGMA DP2") => ShieldSkip { skip_bottom: true, skip_right: false },
        Some("SIGMA DP1 Merrill" | "SIGMA DP2 Merrill" | "SIGMA DP3 Merrill") => {
            ShieldSkip { skip_bottom: false, skip_right: true }
        }
        Some("SIGMA sd Quattro H") => ShieldSkip { skip_bottom: true, skip_right: false },
        _ => ShieldSkip::default()
    }
}

/// Quattro autofocus bad-pixel grid for the luminance (`colors == 1`) or
/// chroma (`colors == 3`) plane, or `None` for cameras/models without a
/// known grid (`spec.md` §4.12: "hardcoded per camera model").
pub fn quattro_af_grid(cam_model: Option<&str>, luma: bool) -> Option<AfGrid> {
    match (cam_model, luma) {
        (Some("SIGMA sd Quattro"), true) => Some(SDQ_AF_LUMA),
        (Some("SIGMA sd Quattro"), false) => Some(SDQ_AF_CHROMA),
        (Some("SIGMA sd Quattro H"), true) => Some(SDQH_AF_LUMA),
        (Some("SIGMA sd Quattro H"), false) => Some(SDQH_AF_CHROMA),
        _ => None
    }
}

/// Convenience wrapper resolving the model string from the file's own
/// `CAMMODEL` property entry.
pub fn shield_skip(meta: &MetaAccess) -> ShieldSkip {
    shield_skip_for_model(meta.get_prop_entry("CAMMODEL"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dp2_skips_bottom_only() {
        let skip = shield_skip_for_model(Some("SIGMA DP2"));
        assert!(skip.skip_bottom);
        assert!(!skip.skip_right);
    }

    #[test]
    fn dp_merrill_family_skips_right_only() {
        for model in ["SIGMA DP1 Merrill", "SIGMA DP2 Merrill", "SIGMA DP3 Merrill"] {
            let skip = shield_skip_for_model(Some(model));
            assert!(!skip.skip_bottom);
            assert!(skip.skip_right);
        }
    }

    #[test]
    fn unknown_model_gets_no_corrections() {
        assert_eq!(shield_skip_for_model(Some("SIGMA fp")), ShieldSkip::default());
        assert_eq!(shield_skip_for_model(None), ShieldSkip::default());
    }

    #[test]
    fn af_grid_is_none_for_unknown_model() {
        assert!(quattro_af_grid(Some("SIGMA sd Quattro III"), true).is_none());
    }

    #[test]
    fn af_grid_known_for_sdq_and_sdqh() {
        assert!(quattro_af_grid(Some("SIGMA sd Quattro"), true).is_some());
        assert!(quattro_af_grid(Some("SIGMA sd Quattro H"), false).is_some());
    }
}

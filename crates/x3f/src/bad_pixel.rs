//! Iterative bad-pixel interpolation (`spec.md` §4.12)
//!
//! The reference decoder keeps a random-access bitmap plus a doubly-linked
//! list of still-bad pixels so each repair pass can walk the list while
//! testing neighbors via the bitmap. A `Vec<bool>` bitmap plus a `Vec`
//! that's rebuilt each pass (the not-yet-fixed remainder) gives the same
//! behavior without hand-rolled intrusive links.
use crate::camf::entry::MatrixData;
use crate::camf::MetaAccess;
use crate::options::DecodeOptions;
use crate::pixel::PixelArea;
use crate::quirks;
use std::collections::HashSet;

/// One still-bad pixel location, `(column, row)`.
pub type BadPixel = (u32, u32);

fn mark(marks: &mut HashSet<(u32, u32)>, c: i64, r: i64) {
    if c >= 0 && r >= 0 {
        marks.insert((c as u32, r as u32));
    } else {
        log::warn!("bad pixel source produced negative coordinate ({c},{r}), dropping");
    }
}

/// Collect every bad-pixel location named by CAMF metadata, plus the
/// hardcoded Quattro autofocus grid, into the list [`repair`] expects
/// (`spec.md` §4.12, ported from `interpolate_bad_pixels`'s source-collection
/// half).
pub fn discover(meta: &MetaAccess, colors: usize, columns: u32, rows: u32) -> Vec<BadPixel> {
    let mut marks: HashSet<(u32, u32)> = HashSet::new();

    if colors == 3 {
        if let (Ok(keep), Ok(bp)) = (meta.get_unsigned_quad("KeepImageArea"), meta.get_matrix_any_named("BadPixels")) {
            if let MatrixData::UInt(values) = &bp.data {
                for &v in values {
                    let c = i64::from((v & 0x000f_ff00) >> 8) - i64::from(keep[0]);
                    let r = i64::from((v & 0xfff0_0000) >> 20) - i64::from(keep[1]);
                    mark(&mut marks, c, r);
                }
            }
        }

        // The numbers of rows and columns in these two tables are
        // interchanged due to a bug in camera firmware; dim[0] is the
        // per-row element count (always 3: row, col, unused) and dim[1]
        // the row count.
        for name in ["BadPixelsF20", "Jpeg_BadClusters"] {
            if let Ok(m) = meta.get_matrix_any_named(name) {
                if m.dims.len() == 2 && m.dims[0] == 3 {
                    if let MatrixData::UInt(values) = &m.data {
                        for row_idx in 0..m.dims[1] as usize {
                            let r = i64::from(values[3 * row_idx]);
                            let c = i64::from(values[3 * row_idx + 1]);
                            mark(&mut marks, c, r);
                        }
                    }
                }
            }
        }

        if let Ok(m) = meta.get_matrix_any_named("HighlightPixelsInfo") {
            if let MatrixData::UInt(v) = &m.data {
                if v.len() >= 4 && v[2] > 0 && v[3] > 0 {
                    let (col0, row0, col_pitch, row_pitch) = (v[0], v[1], v[2], v[3]);
                    let mut row = row0;
                    while row < rows {
                        let mut col = col0;
                        while col < columns {
                            mark(&mut marks, i64::from(col), i64::from(row));
                            col += col_pitch;
                        }
                        row += row_pitch;
                    }
                }
            }
        }
    }

    let f23_name = match colors {
        1 => Some("BadPixelsLumaF23"),
        3 => Some("BadPixelsChromaF23"),
        _ => None
    };
    if let Some(name) = f23_name {
        if let Ok(m) = meta.get_matrix_any_named(name) {
            if let MatrixData::UInt(values) = &m.data {
                // A row header value followed by a run of columns,
                // terminated by a zero. Marking a column also skips the
                // element right after it, mirroring the reference
                // decoder's double increment in this loop.
                let mut i = 0usize;
                let mut row: i64 = -1;
                while i < values.len() {
                    if row == -1 {
                        row = i64::from(values[i]);
                    } else if values[i] == 0 {
                        row = -1;
                    } else {
                        mark(&mut marks, i64::from(values[i]), row);
                        i += 1;
                    }
                    i += 1;
                }
            }
        }
    }

    if let Some(grid) = quirks::quattro_af_grid(meta.get_prop_entry("CAMMODEL"), colors == 1) {
        let mut row = grid.start_row;
        while row <= grid.end_row {
            let mut col = grid.start_col;
            while col <= grid.end_col {
                for dr in 0..grid.block_rows {
                    for dc in 0..grid.block_cols {
                        mark(&mut marks, i64::from(col + dc), i64::from(row + dr));
                    }
                }
                col += grid.col_pitch;
            }
            row += grid.row_pitch;
        }
    }

    marks.into_iter().collect()
}

fn neighbor_good(is_bad: &[bool], columns: i64, rows: i64, c: i64, r: i64) -> Option<usize> {
    if c < 0 || c >= columns || r < 0 || r >= rows {
        return None;
    }
    let idx = (r * columns + c) as usize;
    if is_bad[idx] { None } else { Some(idx) }
}

/// Repair every pixel named in `bad` in place, per `spec.md` §4.12's
/// neighbor rules, running until the list is empty, a pass fixes nothing
/// twice in a row (once corner-fixup is already enabled), or
/// `options.max_repair_passes` is hit.
pub fn repair(image: &mut PixelArea, colors: usize, mut bad: Vec<BadPixel>, options: &DecodeOptions) {
    if bad.is_empty() {
        return;
    }
    let columns = image.columns() as i64;
    let rows = image.rows() as i64;
    let mut is_bad = vec![false; (columns * rows) as usize];
    bad.retain(|&(c, r)| {
        let (c, r) = (i64::from(c), i64::from(r));
        if c < 0 || c >= columns || r < 0 || r >= rows {
            log::warn!("bad pixel ({c},{r}) out of bounds ({columns}x{rows})");
            return false;
        }
        is_bad[(r * columns + c) as usize] = true;
        true
    });

    let mut pass = 0u32;
    let mut corner_allowed = false;
    while !bad.is_empty() && pass < options.get_max_repair_passes() {
        let allow_corner = corner_allowed || pass >= options.get_corner_fixup_after_passes();
        let mut remaining = Vec::with_capacity(bad.len());
        // Fixed positions are only cleared from `is_bad` once the whole
        // pass finishes, matching the reference decoder: a pixel fixed
        // earlier in this pass must not yet count as a good neighbor for
        // one fixed later in the same pass.
        let mut fixed_this_pass = Vec::new();

        for &(c, r) in &bad {
            let (ci, ri) = (i64::from(c), i64::from(r));
            let left = neighbor_good(&is_bad, columns, rows, ci - 1, ri);
            let right = neighbor_good(&is_bad, columns, rows, ci + 1, ri);
            let up = neighbor_good(&is_bad, columns, rows, ci, ri - 1);
            let down = neighbor_good(&is_bad, columns, rows, ci, ri + 1);

            let neighbors: Option<Vec<(usize, usize)>> = if let (Some(l), Some(ri_), Some(u), Some(d)) = (left, right, up, down) {
                Some(vec![coords(l, columns), coords(ri_, columns), coords(u, columns), coords(d, columns)])
            } else if let (Some(l), Some(r_)) = (left, right) {
                Some(vec![coords(l, columns), coords(r_, columns)])
            } else if let (Some(u), Some(d)) = (up, down) {
                Some(vec![coords(u, columns), coords(d, columns)])
            } else if allow_corner {
                let present: Vec<usize> = [left, right, up, down].into_iter().flatten().collect();
                if present.len() >= 2 { Some(present.into_iter().map(|idx| coords(idx, columns)).collect()) } else { None }
            } else {
                None
            };

            match neighbors {
                Some(points) => {
                    let num = points.len() as u32;
                    for color in 0..colors {
                        let sum: u32 = points.iter().map(|&(pc, pr)| u32::from(image.get(pr, pc, color))).sum();
                        image.set(r, c, color, ((sum + num / 2) / num) as u16);
                    }
                    fixed_this_pass.push((ci, ri));
                }
                None => remaining.push((c, r))
            }
        }

        let fixed_count = fixed_this_pass.len();
        for (ci, ri) in fixed_this_pass {
            is_bad[(ri * columns + ci) as usize] = false;
        }

        log::debug!("bad pixel pass {pass}: {fixed_count} fixed, {} left", remaining.len());
        if fixed_count == 0 {
            if !corner_allowed {
                corner_allowed = true;
            } else {
                log::warn!("failed to interpolate {} bad pixels, abandoning", remaining.len());
                break;
            }
        }
        bad = remaining;
        pass += 1;
    }
}

fn coords(flat_idx: usize, columns: i64) -> (usize, usize) {
    let columns = columns as usize;
    (flat_idx % columns, flat_idx / columns)
}

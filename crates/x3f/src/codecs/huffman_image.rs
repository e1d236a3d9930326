//! Legacy predictive-Huffman raw and thumbnail decoder (`spec.md` §4.5)
//!
//! Two payload layouts share one predictive model: a per-row, per-channel
//! running accumulator seeded with a per-image offset. Row-indexed
//! ("compressed") payloads carry a trailing table of per-row bit offsets and
//! an entropy-coded bitstream; non-compressed payloads are a plain array of
//! fixed-width packed codewords with an optional symbol-remap table and no
//! entropy coding at all.
use crate::bitstream::BitReader;
use crate::bytes::ByteCursor;
use crate::errors::{Result, X3fError};
use crate::huffman::HuffTree;
use crate::options::DecodeOptions;
use crate::pixel::PixelArea;

/// Output sample width. Raw images use [`OutputDepth::Ten`] (stored in 16
/// bits); the thumbnail path uses [`OutputDepth::Eight`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OutputDepth {
    Eight,
    Ten
}

impl OutputDepth {
    /// Clamp a possibly-negative accumulator value the way the reference
    /// decoder's narrowing assignment does: truncate to this depth's native
    /// width, then floor negative results at zero.
    fn clamp(self, value: i16) -> u16 {
        match self {
            OutputDepth::Eight => {
                let narrow = value as i8;
                if narrow > 0 { narrow as u16 } else { 0 }
            }
            OutputDepth::Ten => {
                if value > 0 { value as u16 } else { 0 }
            }
        }
    }
}

/// Per-channel bit-width mask for the non-compressed packed-codeword path.
fn channel_mask(bits: u32) -> Result<u32> {
    match bits {
        8 => Ok(0x0ff),
        9 => Ok(0x1ff),
        10 => Ok(0x3ff),
        11 => Ok(0x7ff),
        12 => Ok(0xfff),
        _ => Err(X3fError::MalformedHeader(format!("unsupported huffman bit width {bits}")))
    }
}

/// Reinterpret a decoded symbol's low 16 bits as a signed difference. The
/// mapping table (when present) stores raw `u16` bit patterns that are
/// meant to wrap like a 16-bit signed accumulator, not widen as unsigned.
fn as_signed_diff(symbol: u32) -> i16 {
    symbol as u16 as i16
}

pub struct HuffmanImageDecoder;

impl HuffmanImageDecoder {
    /// Decode a legacy predictive-Huffman image section. `row_stride == 0`
    /// selects the row-indexed (compressed) layout; any other value
    /// selects the non-compressed packed-codeword layout with that byte
    /// stride per row.
    pub fn decode(
        payload: &[u8],
        bits: u32,
        use_mapping: bool,
        columns: usize,
        rows: usize,
        row_stride: u32,
        depth: OutputDepth,
        options: &DecodeOptions
    ) -> Result<PixelArea<'static>> {
        let mut cur = ByteCursor::new(payload);

        let mapping = if use_mapping {
            let table_size = 1usize << bits;
            let mut table = Vec::with_capacity(table_size);
            for _ in 0..table_size {
                table.push(cur.read_u16_le()?);
            }
            Some(table)
        } else {
            None
        };

        if row_stride == 0 {
            Self::decode_compressed(&mut cur, bits, mapping.as_deref(), columns, rows, depth, options)
        } else {
            Self::decode_packed(&mut cur, bits, mapping.as_deref(), columns, rows, row_stride as usize, depth)
        }
    }

    fn decode_compressed(
        cur: &mut ByteCursor,
        bits: u32,
        mapping: Option<&[u16]>,
        columns: usize,
        rows: usize,
        depth: OutputDepth,
        options: &DecodeOptions
    ) -> Result<PixelArea<'static>> {
        let table_size = 1usize << bits;
        let mut table = Vec::with_capacity(table_size);
        for _ in 0..table_size {
            table.push(cur.read_u32_le()?);
        }

        let row_offsets_size = rows * 4;
        let data_start = cur.position();
        let data_end = cur.rest().len().checked_sub(row_offsets_size).map(|n| data_start + n);
        let data_end = data_end.ok_or(X3fError::TruncatedStream)?;
        let data = &cur.rest()[..data_end - data_start];

        cur.seek(data_end);
        let mut row_offsets = Vec::with_capacity(rows);
        for _ in 0..rows {
            row_offsets.push(cur.read_u32_le()? as usize);
        }

        let tree = HuffTree::from_packed_table(&table, mapping)?;

        let offset = options.get_legacy_offset();
        let mut out = PixelArea::owned(columns, rows, 3);
        let minimum = Self::decode_all_rows(&tree, data, &row_offsets, columns, offset, depth, &mut out)?;

        if options.get_auto_legacy_offset() && minimum < 0 {
            let offset = -minimum;
            log::debug!("huffman legacy offset went negative ({minimum}), redoing decode with offset {offset}");
            Self::decode_all_rows(&tree, data, &row_offsets, columns, offset, depth, &mut out)?;
        }

        Ok(out)
    }

    fn decode_all_rows(
        tree: &HuffTree,
        data: &[u8],
        row_offsets: &[usize],
        columns: usize,
        offset: i32,
        depth: OutputDepth,
        out: &mut PixelArea<'static>
    ) -> Result<i32> {
        let mut minimum = 0i32;
        for (row, &row_offset) in row_offsets.iter().enumerate() {
            if row_offset > data.len() {
                return Err(X3fError::TruncatedStream);
            }
            let mut reader = BitReader::new(&data[row_offset..]);
            let mut c = [offset as i16; 3];
            for col in 0..columns {
                for color in 0..3 {
                    let symbol = match tree.decode(&mut reader) {
                        Ok(s) => s,
                        Err(X3fError::HuffmanDesync) => {
                            log::warn!("huffman desync at row {row} col {col}, truncating plane");
                            return Ok(minimum);
                        }
                        Err(e) => return Err(e)
                    };
                    c[color] = c[color].wrapping_add(as_signed_diff(symbol));
                    if i32::from(c[color]) < minimum {
                        minimum = i32::from(c[color]);
                    }
                    out.set(row, col, color, depth.clamp(c[color]));
                }
            }
        }
        Ok(minimum)
    }

    fn decode_packed(
        cur: &mut ByteCursor,
        bits: u32,
        mapping: Option<&[u16]>,
        columns: usize,
        rows: usize,
        row_stride: usize,
        depth: OutputDepth
    ) -> Result<PixelArea<'static>> {
        let mask = channel_mask(bits)?;
        let data = cur.rest();
        let mut out = PixelArea::owned(columns, rows, 3);

        for row in 0..rows {
            let row_start = row * row_stride;
            if row_start + row_stride > data.len() {
                return Err(X3fError::TruncatedStream);
            }
            let row_data = &data[row_start..row_start + row_stride];
            let mut c = [0i16; 3];
            for col in 0..columns {
                let word_off = col * 4;
                if word_off + 4 > row_data.len() {
                    return Err(X3fError::TruncatedStream);
                }
                let val = u32::from_le_bytes([
                    row_data[word_off],
                    row_data[word_off + 1],
                    row_data[word_off + 2],
                    row_data[word_off + 3]
                ]);
                for color in 0..3 {
                    let index = (val >> (color as u32 * bits)) & mask;
                    let diff = match mapping {
                        Some(m) => as_signed_diff(u32::from(m[index as usize])),
                        None => index as i16
                    };
                    c[color] = c[color].wrapping_add(diff);
                    out.set(row, col, color, depth.clamp(c[color]));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode `value` MSB-first as the top `len` bits of a byte buffer.
    fn bits_msb(len: u32, value: u32, buf: &mut Vec<u8>, bitpos: &mut usize) {
        for shift in (0..len).rev() {
            let bit = (value >> shift) & 1;
            let byte = *bitpos / 8;
            if buf.len() <= byte {
                buf.push(0);
            }
            if bit == 1 {
                buf[byte] |= 1 << (7 - (*bitpos % 8));
            }
            *bitpos += 1;
        }
    }

    #[test]
    fn compressed_single_pixel_accumulates_from_offset() {
        // One symbol, one row, one column: table index 0 is a 1-bit code "0",
        // mapped through `mapping[0] = 5` so the diff is +5.
        let table = [(1u32 << 27)]; // length 1, code 0
        let mapping = [5u16];
        let tree = HuffTree::from_packed_table(&table, Some(&mapping)).unwrap();

        let mut bitpos = 0;
        let mut bitstream = Vec::new();
        for _ in 0..3 {
            bits_msb(1, 0, &mut bitstream, &mut bitpos);
        }

        let mut out = PixelArea::owned(1, 1, 3);
        let minimum =
            HuffmanImageDecoder::decode_all_rows(&tree, &bitstream, &[0], 1, 10, OutputDepth::Ten, &mut out)
                .unwrap();
        assert_eq!(minimum, 0);
        assert_eq!(out.get(0, 0, 0), 15);
        assert_eq!(out.get(0, 0, 1), 15);
        assert_eq!(out.get(0, 0, 2), 15);
    }

    #[test]
    fn negative_accumulator_clamps_to_zero_and_tracks_minimum() {
        // diff = -20 via mapping, offset = 10 -> accumulator -10, clamped to 0.
        let table = [(1u32 << 27)];
        let mapping = [(-20i16) as u16];
        let tree = HuffTree::from_packed_table(&table, Some(&mapping)).unwrap();

        let mut bitpos = 0;
        let mut bitstream = Vec::new();
        bits_msb(1, 0, &mut bitstream, &mut bitpos);

        let mut out = PixelArea::owned(1, 1, 3);
        let minimum =
            HuffmanImageDecoder::decode_all_rows(&tree, &bitstream, &[0], 1, 10, OutputDepth::Ten, &mut out)
                .unwrap();
        assert_eq!(minimum, -10);
        assert_eq!(out.get(0, 0, 0), 0);
    }

    #[test]
    fn auto_offset_redo_recovers_from_negative_minimum() {
        let table = [(1u32 << 27)];
        let mapping = [(-5i16) as u16];
        let tree = HuffTree::from_packed_table(&table, Some(&mapping)).unwrap();

        let mut bitpos = 0;
        let mut bitstream = Vec::new();
        bits_msb(1, 0, &mut bitstream, &mut bitpos);

        let mut out = PixelArea::owned(1, 1, 3);
        let minimum =
            HuffmanImageDecoder::decode_all_rows(&tree, &bitstream, &[0], 1, 0, OutputDepth::Ten, &mut out)
                .unwrap();
        assert_eq!(minimum, -5);

        let mut out2 = PixelArea::owned(1, 1, 3);
        let minimum2 =
            HuffmanImageDecoder::decode_all_rows(&tree, &bitstream, &[0], 1, -minimum, OutputDepth::Ten, &mut out2)
                .unwrap();
        assert_eq!(minimum2, 0);
        assert_eq!(out2.get(0, 0, 0), 0);
    }

    #[test]
    fn packed_non_compressed_reads_fixed_width_codewords() {
        // bits=8, no mapping: diff is the raw 8-bit field per channel.
        // Single pixel, one 4-byte codeword: channel0=1, channel1=2, channel2=3.
        let val = 1u32 | (2u32 << 8) | (3u32 << 16);
        let payload = val.to_le_bytes().to_vec();
        let mut cur = ByteCursor::new(&payload);
        let out = HuffmanImageDecoder::decode_packed(&mut cur, 8, None, 1, 1, 4, OutputDepth::Ten).unwrap();
        assert_eq!(out.get(0, 0, 0), 1);
        assert_eq!(out.get(0, 0, 1), 2);
        assert_eq!(out.get(0, 0, 2), 3);
    }

    #[test]
    fn packed_non_compressed_applies_mapping() {
        let mapping: Vec<u16> = (0..256).map(|i| i as u16 * 2).collect();
        let val = 7u32; // channel0 index 7
        let payload = val.to_le_bytes().to_vec();
        let mut cur = ByteCursor::new(&payload);
        let out = HuffmanImageDecoder::decode_packed(&mut cur, 8, Some(&mapping), 1, 1, 4, OutputDepth::Ten).unwrap();
        assert_eq!(out.get(0, 0, 0), 14);
    }

    #[test]
    fn truncated_row_offsets_error() {
        let payload = vec![0u8; 2];
        let mut cur = ByteCursor::new(&payload);
        let result = HuffmanImageDecoder::decode_compressed(
            &mut cur, 1, None, 1, 1, OutputDepth::Ten, &DecodeOptions::new()
        );
        assert!(result.is_err());
    }
}

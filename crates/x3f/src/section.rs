//! On-demand payload decode for a directory entry (`spec.md` §4.4)
//!
//! [`directory::Container`] parses only the small type-dependent header
//! eagerly; everything past `payload_start` is handled here, dispatched by
//! section type and (for images) `type_format`.
use crate::bytes::ByteCursor;
use crate::camf::{CamfEntry, CamfEntryParser};
use crate::codecs::camf_crypt::camf_crypt;
use crate::codecs::huffman_image::{HuffmanImageDecoder, OutputDepth};
use crate::codecs::true_decoder::{decode_camf_type4, decode_camf_type5, decode_plane, read_true_huffman_table};
use crate::errors::{Result, X3fError};
use crate::huffman::HuffTree;
use crate::options::DecodeOptions;
use crate::pixel::PixelArea;

pub const THUMB_PLAIN: u32 = 0x0003_0001;
pub const THUMB_HUFFMAN: u32 = 0x0002_0002;
pub const THUMB_JPEG: u32 = 0x0002_0012;
pub const RAW_HUFFMAN_X530: u32 = 0x0002_0003;
pub const RAW_HUFFMAN_10BIT: u32 = 0x0002_000B;
pub const RAW_TRUE: u32 = 0x0003_001E;
pub const RAW_MERRILL: u32 = 0x0001_0005;
pub const RAW_QUATTRO: u32 = 0x0001_0006;

/// Decoded image-section output, kept in whatever form the codec natively
/// produces it: [`crate::quattro::QuattroExpander`] is a separate pipeline
/// stage, not part of section loading.
pub enum ImageSection {
    /// Already at final resolution: verbatim, legacy Huffman, or
    /// non-Quattro TRUE (`RAW_MERRILL`).
    Rgb(PixelArea<'static>),
    /// `RAW_QUATTRO`: two half-resolution chroma planes (interleaved into
    /// channels 0/1 of `lowres`; channel 2 is unused filler) and the
    /// full-resolution top layer.
    Quattro { lowres: PixelArea<'static>, top: PixelArea<'static> },
    /// `THUMB_JPEG`: the payload bytes are a standalone JPEG stream, handed
    /// back verbatim since decoding it is outside this crate's raw-decode
    /// pipeline.
    Jpeg(Vec<u8>)
}

pub struct SectionLoader;

impl SectionLoader {
    /// Decode an `SECi` payload. `payload` starts right after the
    /// type-specific header `directory::Container` already consumed.
    pub fn load_image(
        payload: &[u8],
        type_format: u32,
        columns: u32,
        rows: u32,
        row_stride: u32,
        options: &DecodeOptions
    ) -> Result<ImageSection> {
        match type_format {
            THUMB_PLAIN => Self::load_verbatim_rgb8(payload, columns as usize, rows as usize, row_stride as usize),
            THUMB_HUFFMAN => {
                let out = HuffmanImageDecoder::decode(
                    payload, 8, false, columns as usize, rows as usize, row_stride, OutputDepth::Eight, options
                )?;
                Ok(ImageSection::Rgb(out))
            }
            THUMB_JPEG => Ok(ImageSection::Jpeg(payload.to_vec())),
            RAW_HUFFMAN_X530 | RAW_HUFFMAN_10BIT => {
                let out = HuffmanImageDecoder::decode(
                    payload, 10, true, columns as usize, rows as usize, row_stride, OutputDepth::Ten, options
                )?;
                Ok(ImageSection::Rgb(out))
            }
            RAW_TRUE | RAW_MERRILL | RAW_QUATTRO => {
                Self::load_true(payload, type_format, columns as usize, rows as usize)
            }
            other => Err(X3fError::UnsupportedSection { type_format: other })
        }
    }

    fn load_verbatim_rgb8(payload: &[u8], columns: usize, rows: usize, row_stride: usize) -> Result<ImageSection> {
        let mut out = PixelArea::owned(columns, rows, 3);
        for row in 0..rows {
            let start = row * row_stride;
            let line = payload.get(start..start + columns * 3).ok_or(X3fError::TruncatedStream)?;
            for col in 0..columns {
                for color in 0..3 {
                    out.set(row, col, color, u16::from(line[col * 3 + color]));
                }
            }
        }
        Ok(ImageSection::Rgb(out))
    }

    /// `spec.md` §4.6, §6: per-plane seeds, a shared Huffman length table,
    /// then (for Quattro) a per-plane `(columns,rows)` extension read
    /// *before* the seeds, plus an extra `u32` after the table. Planes are
    /// stored back-to-back, each padded up to a 16-byte boundary.
    fn load_true(payload: &[u8], type_format: u32, columns: usize, rows: usize) -> Result<ImageSection> {
        let is_quattro = type_format == RAW_QUATTRO;
        let mut cur = ByteCursor::new(payload);

        let mut plane_dims = [(columns, rows); 3];
        if is_quattro {
            for slot in &mut plane_dims {
                let c = cur.read_u16_le()? as usize;
                let r = cur.read_u16_le()? as usize;
                *slot = (c, r);
            }
        }

        let mut seeds = [0u16; 3];
        for s in &mut seeds {
            *s = cur.read_u16_le()?;
        }
        let _unknown = cur.read_u16_le()?;
        let table = read_true_huffman_table(&mut cur)?;
        let tree = HuffTree::from_length_code_stream(&table)?;

        if is_quattro {
            let _unknown2 = cur.read_u32_le()?;
        }
        let mut plane_size = [0usize; 3];
        for s in &mut plane_size {
            *s = cur.read_u32_le()? as usize;
        }

        let data = cur.rest();
        let mut plane_offset = 0usize;
        let mut planes: [Option<PixelArea<'static>>; 3] = [None, None, None];
        for (color, slot) in planes.iter_mut().enumerate() {
            let (cols, rws) = plane_dims[color];
            let plane_data = data.get(plane_offset..).ok_or(X3fError::TruncatedStream)?;
            *slot = Some(decode_plane(plane_data, &tree, seeds[color], cols, rws)?);
            plane_offset += plane_size[color].div_ceil(16) * 16;
        }

        if is_quattro {
            let top_idx = (0..3).max_by_key(|&i| plane_dims[i].0 * plane_dims[i].1).unwrap();
            let top = planes[top_idx].take().unwrap();
            let chroma: Vec<usize> = (0..3).filter(|&i| i != top_idx).collect();
            let plane_a = planes[chroma[0]].take().unwrap();
            let plane_b = planes[chroma[1]].take().unwrap();

            let (low_cols, low_rows) = (plane_a.columns(), plane_a.rows());
            if plane_b.columns() != low_cols || plane_b.rows() != low_rows {
                return Err(X3fError::ShapeMismatch {
                    expected: (low_cols, low_rows),
                    found: (plane_b.columns(), plane_b.rows())
                });
            }
            let mut lowres = PixelArea::owned(low_cols, low_rows, 3);
            for row in 0..low_rows {
                for col in 0..low_cols {
                    lowres.set(row, col, 0, plane_a.get(row, col, 0));
                    lowres.set(row, col, 1, plane_b.get(row, col, 0));
                }
            }
            Ok(ImageSection::Quattro { lowres, top })
        } else {
            let mut out = PixelArea::owned(columns, rows, 3);
            for row in 0..rows {
                for col in 0..columns {
                    for (color, plane) in planes.iter().enumerate() {
                        out.set(row, col, color, plane.as_ref().unwrap().get(row, col, 0));
                    }
                }
            }
            Ok(ImageSection::Rgb(out))
        }
    }

    /// Decode an `SECp` payload: the `(name_off, value_off)` offset table
    /// (offsets are UTF-16 code-unit indices) followed by the UTF-16LE
    /// string heap.
    pub fn load_property_list(payload: &[u8], num_props: u32) -> Result<Vec<(String, String)>> {
        let mut cur = ByteCursor::new(payload);
        let mut offsets = Vec::with_capacity(num_props as usize);
        for _ in 0..num_props {
            let name_off = cur.read_u32_le()? as usize;
            let value_off = cur.read_u32_le()? as usize;
            offsets.push((name_off, value_off));
        }
        let heap = cur.rest();

        let mut props = Vec::with_capacity(num_props as usize);
        for (name_off, value_off) in offsets {
            props.push((read_utf16le_cstr(heap, name_off)?, read_utf16le_cstr(heap, value_off)?));
        }
        Ok(props)
    }

    /// Decode an `SECc` payload: type 2 is a byte-wise XOR cipher, types 4
    /// and 5 share the TRUE predictor but emit a packed byte stream instead
    /// of pixels. All three produce plaintext for [`CamfEntryParser`].
    pub fn load_camf(payload: &[u8], camf_type: u32, v: [u32; 4]) -> Result<Vec<CamfEntry>> {
        let decoded = match camf_type {
            2 => {
                let crypt_key = v[3];
                camf_crypt(payload, crypt_key)
            }
            4 => {
                let (decoded_size, decode_bias, block_size, block_count) =
                    (v[0] as usize, v[1], v[2] as usize, v[3] as usize);
                let tree = Self::camf_true_tree(payload)?;
                let bitstream = payload.get(32..).ok_or(X3fError::TruncatedStream)?;
                decode_camf_type4(bitstream, &tree, decode_bias, block_count, block_size, decoded_size)?
            }
            5 => {
                let (decoded_size, decode_bias) = (v[0] as usize, v[1] as i32);
                let tree = Self::camf_true_tree(payload)?;
                let bitstream = payload.get(32..).ok_or(X3fError::TruncatedStream)?;
                decode_camf_type5(bitstream, &tree, decode_bias, decoded_size)?
            }
            other => return Err(X3fError::UnsupportedSection { type_format: other })
        };
        Ok(CamfEntryParser::parse_all(&decoded))
    }

    /// The Huffman length table for CAMF types 4/5 starts at payload byte 0;
    /// the bitstream itself always starts at a fixed offset of 32 bytes,
    /// regardless of how long the table turned out to be (matching the
    /// reference decoder's `CAMF_T4_DATA_OFFSET`/`CAMF_T5_DATA_OFFSET`).
    fn camf_true_tree(payload: &[u8]) -> Result<HuffTree> {
        let mut cur = ByteCursor::new(payload);
        let table = read_true_huffman_table(&mut cur)?;
        HuffTree::from_length_code_stream(&table)
    }
}

fn read_utf16le_cstr(heap: &[u8], code_unit_offset: usize) -> Result<String> {
    let mut units = Vec::new();
    let mut pos = code_unit_offset * 2;
    loop {
        let pair = heap.get(pos..pos + 2).ok_or(X3fError::TruncatedStream)?;
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
        pos += 2;
    }
    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbatim_rgb8_widens_to_u16() {
        let payload = [10u8, 20, 30, 40, 50, 60];
        let img = SectionLoader::load_verbatim_rgb8(&payload, 2, 1, 6).unwrap();
        match img {
            ImageSection::Rgb(p) => {
                assert_eq!(p.get(0, 0, 0), 10);
                assert_eq!(p.get(0, 1, 2), 60);
            }
            _ => panic!("expected Rgb")
        }
    }

    #[test]
    fn property_list_decodes_utf16le_pairs() {
        let mut heap = Vec::new();
        // code-unit offset 0: "Iso" then NUL, offset 4: "100" then NUL
        for ch in "Iso".encode_utf16() {
            heap.extend_from_slice(&ch.to_le_bytes());
        }
        heap.extend_from_slice(&0u16.to_le_bytes());
        for ch in "100".encode_utf16() {
            heap.extend_from_slice(&ch.to_le_bytes());
        }
        heap.extend_from_slice(&0u16.to_le_bytes());

        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes()); // name_off = 0
        payload.extend_from_slice(&4u32.to_le_bytes()); // value_off = 4
        payload.extend_from_slice(&heap);

        let props = SectionLoader::load_property_list(&payload, 1).unwrap();
        assert_eq!(props, vec![("Iso".to_string(), "100".to_string())]);
    }

    #[test]
    fn unsupported_image_type_format_errors() {
        let result = SectionLoader::load_image(&[], 0xdead_beef, 1, 1, 0, &DecodeOptions::new());
        assert!(matches!(result, Err(X3fError::UnsupportedSection { .. })));
    }

    #[test]
    fn unsupported_camf_type_errors() {
        let result = SectionLoader::load_camf(&[], 99, [0; 4]);
        assert!(matches!(result, Err(X3fError::UnsupportedSection { .. })));
    }
}

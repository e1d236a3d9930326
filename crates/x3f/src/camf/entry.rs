//! Walks a decoded CAMF byte stream into a flat list of entries
//! (`spec.md` §4.8)
use crate::errors::{Result, X3fError};
use crate::fourcc::{CAMF_MATRIX, CAMF_PROPERTY_LIST, CAMF_TEXT};

/// The logical type a matrix's elements are widened into.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MatrixKind {
    Int,
    UInt,
    Float
}

/// Matrix element storage, widened at decode time per `spec.md` §4.8.
#[derive(Clone, Debug)]
pub enum MatrixData {
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Float(Vec<f64>)
}

#[derive(Clone, Debug)]
pub struct CamfMatrix {
    pub dims: Vec<u32>,
    pub dim_names: Vec<String>,
    pub kind: MatrixKind,
    pub data: MatrixData
}

#[derive(Clone, Debug)]
pub enum CamfValue {
    Text(String),
    PropertyList(Vec<(String, String)>),
    Matrix(CamfMatrix)
}

#[derive(Clone, Debug)]
pub struct CamfEntry {
    pub name: String,
    pub value: CamfValue
}

/// `(element_size_bytes, logical_kind)` per `element_type`, from the
/// reference decoder's `set_matrix_element_info`. Type `4` is not assigned
/// by any known camera and is treated as unsupported.
fn element_type_info(element_type: u32) -> Result<(usize, MatrixKind)> {
    match element_type {
        0 => Ok((2, MatrixKind::Int)),
        1 => Ok((4, MatrixKind::UInt)),
        2 => Ok((4, MatrixKind::UInt)),
        3 => Ok((4, MatrixKind::Float)),
        5 => Ok((1, MatrixKind::UInt)),
        6 => Ok((2, MatrixKind::UInt)),
        other => Err(X3fError::UnsupportedSection { type_format: other })
    }
}

fn read_u32(data: &[u8], off: usize) -> Result<u32> {
    let b = data.get(off..off + 4).ok_or(X3fError::TruncatedStream)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_cstr(data: &[u8], start: usize, end: usize) -> String {
    let slice = &data[start..end.min(data.len())];
    let nul = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    String::from_utf8_lossy(&slice[..nul]).into_owned()
}

fn widen_matrix(data: &[u8], data_off: usize, element_size: usize, kind: MatrixKind, count: usize) -> MatrixData {
    match kind {
        MatrixKind::Float => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let off = data_off + i * element_size;
                let value = match data.get(off..off + element_size) {
                    Some(b) if element_size == 4 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
                    _ => 0.0
                };
                out.push(value);
            }
            MatrixData::Float(out)
        }
        MatrixKind::Int => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let off = data_off + i * element_size;
                let value = match (data.get(off..off + element_size), element_size) {
                    (Some(b), 4) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    (Some(b), 2) => i32::from(i16::from_le_bytes([b[0], b[1]])),
                    (Some(b), 1) => i32::from(b[0] as i8),
                    _ => 0
                };
                out.push(value);
            }
            MatrixData::Int(out)
        }
        MatrixKind::UInt => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let off = data_off + i * element_size;
                let value = match (data.get(off..off + element_size), element_size) {
                    (Some(b), 4) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    (Some(b), 2) => u32::from(u16::from_le_bytes([b[0], b[1]])),
                    (Some(b), 1) => u32::from(b[0]),
                    _ => 0
                };
                out.push(value);
            }
            MatrixData::UInt(out)
        }
    }
}

pub struct CamfEntryParser;

impl CamfEntryParser {
    /// Parse every entry in a decoded CAMF byte stream. An unknown magic
    /// halts parsing but the entries collected so far are returned, per
    /// `spec.md` §4.8: "Unknown magic halts parsing of this CAMF but
    /// preserves entries already collected."
    pub fn parse_all(data: &[u8]) -> Vec<CamfEntry> {
        let mut entries = Vec::new();
        let mut pos = 0usize;
        while pos + 20 <= data.len() {
            let magic = match read_u32(data, pos) {
                Ok(m) => m,
                Err(_) => break
            };
            if magic != CAMF_MATRIX.as_u32() && magic != CAMF_PROPERTY_LIST.as_u32() && magic != CAMF_TEXT.as_u32() {
                log::warn!("unknown CAMF entry magic 0x{magic:08x} at offset {pos}, stopping");
                break;
            }

            match Self::parse_one(data, pos, magic) {
                Ok((entry, entry_size)) => {
                    entries.push(entry);
                    if entry_size == 0 {
                        break;
                    }
                    pos += entry_size;
                }
                Err(e) => {
                    log::warn!("failed to parse CAMF entry at offset {pos}: {e:?}");
                    break;
                }
            }
        }
        entries
    }

    fn parse_one(data: &[u8], entry_start: usize, magic: u32) -> Result<(CamfEntry, usize)> {
        let _version = read_u32(data, entry_start + 4)?;
        let entry_size = read_u32(data, entry_start + 8)? as usize;
        let name_offset = read_u32(data, entry_start + 12)? as usize;
        let value_offset = read_u32(data, entry_start + 16)? as usize;

        let name = read_cstr(data, entry_start + name_offset, entry_start + value_offset);
        let value_start = entry_start + value_offset;

        let value = if magic == CAMF_TEXT.as_u32() {
            let text_size = read_u32(data, value_start)? as usize;
            CamfValue::Text(read_cstr(data, value_start + 4, value_start + 4 + text_size))
        } else if magic == CAMF_PROPERTY_LIST.as_u32() {
            let num = read_u32(data, value_start)? as usize;
            let heap_off = read_u32(data, value_start + 4)? as usize;
            let mut pairs = Vec::with_capacity(num);
            for i in 0..num {
                let pair_off = value_start + 8 + 8 * i;
                let name_off = heap_off + read_u32(data, pair_off)? as usize;
                let value_off = heap_off + read_u32(data, pair_off + 4)? as usize;
                let name = read_cstr(data, entry_start + name_off, entry_start + entry_size);
                let value = read_cstr(data, entry_start + value_off, entry_start + entry_size);
                pairs.push((name, value));
            }
            CamfValue::PropertyList(pairs)
        } else {
            let element_type = read_u32(data, value_start)?;
            let dim = read_u32(data, value_start + 4)? as usize;
            let data_off = read_u32(data, value_start + 8)? as usize;

            let mut dims = Vec::with_capacity(dim);
            let mut dim_names = Vec::with_capacity(dim);
            let mut total = 1usize;
            for i in 0..dim {
                let triplet_off = value_start + 12 + 12 * i;
                let size = read_u32(data, triplet_off)?;
                let name_offset = read_u32(data, triplet_off + 4)? as usize;
                let order_index = read_u32(data, triplet_off + 8)?;
                if order_index as usize != i {
                    log::warn!("CAMF matrix {name} dimension {i} out of order (order_index={order_index})");
                }
                dims.push(size);
                dim_names.push(read_cstr(data, entry_start + name_offset, entry_start + entry_size));
                total *= size as usize;
            }

            let (element_size, kind) = element_type_info(element_type)?;
            let data_base = entry_start + data_off;
            let matrix_data = widen_matrix(data, data_base, element_size, kind, total);

            CamfValue::Matrix(CamfMatrix { dims, dim_names, kind, data: matrix_data })
        };

        Ok((CamfEntry { name, value }, entry_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn text_entry(name: &str, text: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u32(&mut buf, CAMF_TEXT.as_u32());
        push_u32(&mut buf, 0); // version
        push_u32(&mut buf, 0); // entry_size placeholder, fixed below
        let name_offset = 20u32;
        push_u32(&mut buf, name_offset);
        let value_offset = name_offset + name.len() as u32 + 1;
        push_u32(&mut buf, value_offset);
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        push_u32(&mut buf, text.len() as u32);
        buf.extend_from_slice(text.as_bytes());
        let entry_size = buf.len() as u32;
        buf[8..12].copy_from_slice(&entry_size.to_le_bytes());
        buf
    }

    #[test]
    fn parses_single_text_entry() {
        let data = text_entry("CalibDate", "2016-01-01");
        let entries = CamfEntryParser::parse_all(&data);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "CalibDate");
        assert!(matches!(&entries[0].value, CamfValue::Text(t) if t == "2016-01-01"));
    }

    #[test]
    fn stops_on_unknown_magic_but_keeps_prior_entries() {
        let mut data = text_entry("A", "x");
        data.extend_from_slice(b"\0\0\0\0garbage_not_camf_magic");
        let entries = CamfEntryParser::parse_all(&data);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn matrix_entry_widens_uint16_elements() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CAMF_MATRIX.as_u32());
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0); // entry_size fixed below
        let name_offset = 20u32;
        push_u32(&mut buf, name_offset);
        let value_offset = name_offset + 4; // "Foo\0"
        push_u32(&mut buf, value_offset);
        buf.extend_from_slice(b"Foo\0");

        // value: element_type=6 (u16), dim=1, data_off points past 1 dim triplet
        push_u32(&mut buf, 6);
        push_u32(&mut buf, 1);
        let data_off = 12 + 12; // header(12) + one dim triplet(12)
        push_u32(&mut buf, data_off as u32);
        push_u32(&mut buf, 2); // dim size
        push_u32(&mut buf, 4); // dim name_offset -> "Foo\0" itself, good enough
        push_u32(&mut buf, 0); // order_index

        buf.extend_from_slice(&10u16.to_le_bytes());
        buf.extend_from_slice(&20u16.to_le_bytes());

        let entry_size = buf.len() as u32;
        buf[8..12].copy_from_slice(&entry_size.to_le_bytes());

        let entries = CamfEntryParser::parse_all(&buf);
        assert_eq!(entries.len(), 1);
        match &entries[0].value {
            CamfValue::Matrix(m) => {
                assert_eq!(m.dims, vec![2]);
                assert!(matches!(m.kind, MatrixKind::UInt));
                assert!(matches!(&m.data, MatrixData::UInt(v) if v == &vec![10, 20]));
            }
            _ => panic!("expected matrix")
        }
    }
}

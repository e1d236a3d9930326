//! The fixed-size file header (`spec.md` §3, §6)
use crate::bytes::ByteCursor;
use crate::errors::{Result, X3fError};
use crate::fourcc::MAGIC_HEADER;

/// Rotation recorded in the header, in degrees clockwise.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Rotation {
    None,
    Deg90,
    Deg180,
    Deg270,
    /// A value outside `{0, 90, 180, 270}`. Some cameras write bogus
    /// rotation fields; callers should treat this the same as `None`.
    Other(u32)
}

impl Rotation {
    const fn from_raw(raw: u32) -> Rotation {
        match raw {
            0 => Rotation::None,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            270 => Rotation::Deg270,
            other => Rotation::Other(other)
        }
    }
}

/// The file header: version, geometry, and (from v2.1) white-balance name
/// and extended type/data vectors.
#[derive(Clone, Debug)]
pub struct FileHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub unique_id: [u8; 16],
    pub mark: u32,
    pub columns: u32,
    pub rows: u32,
    pub rotation: Rotation,
    /// Present for version > 2.0
    pub white_balance: Option<String>,
    /// Present for version > 2.0: parallel `(tag, value)` pairs.
    pub extended: Vec<(u8, f32)>
}

impl FileHeader {
    pub fn version(&self) -> u32 {
        (u32::from(self.version_major) << 16) | u32::from(self.version_minor)
    }

    pub fn parse(data: &[u8]) -> Result<FileHeader> {
        let mut cur = ByteCursor::new(data);
        let magic = cur.read_fourcc()?;
        if magic != MAGIC_HEADER.as_u32() {
            return Err(X3fError::MalformedHeader(format!(
                "bad file magic 0x{magic:08x}, expected FOVb"
            )));
        }

        let version = cur.read_u32_le()?;
        let version_major = (version >> 16) as u16;
        let version_minor = (version & 0xffff) as u16;

        let mut unique_id = [0u8; 16];
        unique_id.copy_from_slice(cur.read_exact(16)?);

        let mark = cur.read_u32_le()?;
        let columns = cur.read_u32_le()?;
        let rows = cur.read_u32_le()?;
        let rotation = Rotation::from_raw(cur.read_u32_le()?);

        let (white_balance, extended) = if version > 0x0002_0000 {
            let name_bytes = cur.read_exact(32)?;
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(32);
            let wb = String::from_utf8_lossy(&name_bytes[..end]).into_owned();

            let mut tags = [0u8; 32];
            tags.copy_from_slice(cur.read_exact(32)?);

            let mut values = [0f32; 32];
            for v in &mut values {
                *v = cur.read_f32_le()?;
            }

            let extended = tags.iter().zip(values.iter()).map(|(&t, &v)| (t, v)).collect();
            (Some(wb), extended)
        } else {
            (None, Vec::new())
        };

        Ok(FileHeader {
            version_major,
            version_minor,
            unique_id,
            mark,
            columns,
            rows,
            rotation,
            white_balance,
            extended
        })
    }
}

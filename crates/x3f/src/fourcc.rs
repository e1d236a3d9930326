//! Four-character-code wrapper for section/directory magic values
use std::fmt::{Debug, Formatter};

/// A little-endian `u32` whose bytes spell an ASCII tag (`FOVb`, `SECd`,
/// `SECp`, `SECi`, `SECc`, `CMbM`, `CMbP`, `CMbT`, ...). Stored as a newtype
/// rather than a raw integer so log messages and error `Debug` output show
/// the readable form instead of a hex number.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub u32);

impl FourCC {
    pub const fn from_ascii(tag: &[u8; 4]) -> FourCC {
        FourCC(u32::from_le_bytes(*tag))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_le_bytes();
        match std::str::from_utf8(&bytes) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => write!(f, "{s:?}"),
            _ => write!(f, "0x{:08x}", self.0)
        }
    }
}

pub const MAGIC_HEADER: FourCC = FourCC::from_ascii(b"FOVb");
pub const MAGIC_DIRECTORY: FourCC = FourCC::from_ascii(b"SECd");
pub const MAGIC_PROPERTY: FourCC = FourCC::from_ascii(b"SECp");
pub const MAGIC_IMAGE: FourCC = FourCC::from_ascii(b"SECi");
pub const MAGIC_CAMF: FourCC = FourCC::from_ascii(b"SECc");

pub const CAMF_MATRIX: FourCC = FourCC::from_ascii(b"CMbM");
pub const CAMF_PROPERTY_LIST: FourCC = FourCC::from_ascii(b"CMbP");
pub const CAMF_TEXT: FourCC = FourCC::from_ascii(b"CMbT");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_magic_is_fovb_le() {
        assert_eq!(MAGIC_HEADER.as_u32(), 0x6256_4f46);
    }

    #[test]
    fn debug_prints_ascii() {
        assert_eq!(format!("{:?}", MAGIC_DIRECTORY), "\"SECd\"");
    }
}

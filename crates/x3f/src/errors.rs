//! Errors possible while parsing and rendering an X3F file
use std::fmt::{Debug, Display, Formatter};

/// All possible errors that can occur when decoding or rendering an X3F file
#[non_exhaustive]
pub enum X3fError {
    /// The file header or directory is not a valid X3F container
    MalformedHeader(String),
    /// A directory entry named a `(type, format)` pair we don't know how to
    /// decode, or a CAMF section named an unknown `camf_type`
    UnsupportedSection { type_format: u32 },
    /// A `BitReader` or `HuffTree` traversal ran past the end of its buffer
    TruncatedStream,
    /// A Huffman traversal fell off the tree (missing child on an internal node)
    HuffmanDesync,
    /// Quattro plane sizes are inconsistent, or a CAMF matrix's declared
    /// dimensions don't match what was requested
    ShapeMismatch { expected: (usize, usize), found: (usize, usize) },
    /// A named CAMF/PROP entry does not exist
    NotFound(&'static str),
    /// A named CAMF/PROP entry exists but has the wrong element type or shape
    TypeMismatch { name: &'static str, expected: &'static str },
    /// Neither `RawSaturationLevel`, `SaturationLevel` nor `ImageDepth` could
    /// be found, so the sensor's maximum raw value is unknown
    UnsupportedCamera,
    /// The underlying reader failed
    Io(std::io::Error)
}

pub type Result<T> = std::result::Result<T, X3fError>;

impl Debug for X3fError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedHeader(msg) => writeln!(f, "malformed X3F header/directory: {msg}"),
            Self::UnsupportedSection { type_format } => {
                writeln!(f, "unsupported section type_format 0x{type_format:08x}")
            }
            Self::TruncatedStream => writeln!(f, "bit reader ran out of buffer"),
            Self::HuffmanDesync => writeln!(f, "huffman traversal desynced from the bitstream"),
            Self::ShapeMismatch { expected, found } => writeln!(
                f,
                "shape mismatch: expected {}x{}, found {}x{}",
                expected.0, expected.1, found.0, found.1
            ),
            Self::NotFound(name) => writeln!(f, "entry not found: {name}"),
            Self::TypeMismatch { name, expected } => {
                writeln!(f, "entry {name} is not a {expected}")
            }
            Self::UnsupportedCamera => {
                writeln!(f, "could not determine sensor saturation level for this camera")
            }
            Self::Io(err) => writeln!(f, "io error: {err}")
        }
    }
}

impl Display for X3fError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:?}", self)
    }
}

impl std::error::Error for X3fError {}

impl From<std::io::Error> for X3fError {
    fn from(value: std::io::Error) -> Self {
        X3fError::Io(value)
    }
}

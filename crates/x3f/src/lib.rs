//! A decoder and raw-development pipeline for Sigma/Foveon X3F camera files.
//!
//! # Usage
//! ```no_run
//! use x3f::{ColorSpace, X3fFile};
//!
//! # fn run() -> x3f::Result<()> {
//! let data = std::fs::read("photo.x3f")?;
//! let file = X3fFile::parse(data)?;
//! let image = file.develop(None, ColorSpace::Srgb, u16::MAX)?;
//! println!("{}x{}", image.columns, image.rows);
//! # Ok(())
//! # }
//! ```
//!
//! # Metadata
//! Camera metadata lives in the `SECc` (CAMF) and `SECp` (property list)
//! sections. [`X3fFile::meta`] exposes both through [`camf::MetaAccess`]'s
//! typed lookups; the decoder does not interpret metadata beyond what the
//! raw-development pipeline itself needs.
//!
//! # Scope
//! This crate decodes raw sensor data and the metadata needed to develop it
//! into linear RGB. It does not decode embedded JPEG thumbnails (the bytes
//! are handed back verbatim via [`section::ImageSection::Jpeg`]) and does
//! not write any output file format; callers own that decision.
mod bad_pixel;
mod bitstream;
mod bytes;
pub mod camf;
mod codecs;
mod color;
mod directory;
pub mod errors;
mod file;
mod fourcc;
mod header;
pub mod matrix;
pub mod options;
pub mod pixel;
mod preprocess;
mod quattro;
mod quirks;
pub mod section;
mod spatial_gain;

pub use color::ColorSpace;
pub use errors::{Result, X3fError};
pub use file::X3fFile;
pub use header::{FileHeader, Rotation};
pub use options::DecodeOptions;
pub use pixel::{PixelArea, RenderedImage};

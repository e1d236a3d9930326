//! Top-level file handle tying container parsing, section decode, and the
//! raw-development pipeline together (`spec.md` §2, §5).
//!
//! Everything past the header and directory is lazy: the first call to
//! [`X3fFile::properties`], [`X3fFile::camf_entries`] or
//! [`X3fFile::raw_planes`] decodes and memoizes that section; later calls
//! reuse the cached result for the lifetime of the `X3fFile`. Caching uses
//! `OnceCell` rather than a `Mutex` since decode is single-threaded and
//! cooperative (`spec.md` §5).
use std::cell::OnceCell;

use crate::bad_pixel;
use crate::camf::{CamfEntry, MetaAccess};
use crate::color::{self, ColorSpace};
use crate::directory::{Container, DirectoryEntry, SectionHeader};
use crate::errors::{Result, X3fError};
use crate::header::FileHeader;
use crate::options::DecodeOptions;
use crate::pixel::RenderedImage;
use crate::preprocess;
use crate::quattro::QuattroExpander;
use crate::section::{self, ImageSection, SectionLoader};
use crate::spatial_gain::SpatialGain;

/// A fully-materialized X3F file, with its header and directory parsed
/// eagerly and everything else loaded on demand.
pub struct X3fFile {
    data: Vec<u8>,
    header: FileHeader,
    container: Container,
    options: DecodeOptions,
    props_cache: OnceCell<Vec<(String, String)>>,
    camf_cache: OnceCell<Vec<CamfEntry>>,
    raw_cache: OnceCell<ImageSection>,
    thumb_cache: OnceCell<ImageSection>
}

const RAW_TYPES: &[u32] =
    &[section::RAW_HUFFMAN_X530, section::RAW_HUFFMAN_10BIT, section::RAW_TRUE, section::RAW_MERRILL, section::RAW_QUATTRO];
const THUMB_TYPES: &[u32] = &[section::THUMB_PLAIN, section::THUMB_HUFFMAN, section::THUMB_JPEG];

impl X3fFile {
    /// Parse `data` (the whole file, read fully into memory) with default
    /// decode options.
    pub fn parse(data: Vec<u8>) -> Result<X3fFile> {
        X3fFile::parse_with_options(data, DecodeOptions::new())
    }

    pub fn parse_with_options(data: Vec<u8>, options: DecodeOptions) -> Result<X3fFile> {
        let header = FileHeader::parse(&data)?;
        let container = Container::parse(&data)?;
        Ok(X3fFile {
            data,
            header,
            container,
            options,
            props_cache: OnceCell::new(),
            camf_cache: OnceCell::new(),
            raw_cache: OnceCell::new(),
            thumb_cache: OnceCell::new()
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn directory(&self) -> &[DirectoryEntry] {
        &self.container.entries
    }

    fn payload(&self, entry: &DirectoryEntry) -> &[u8] {
        let start = entry.payload_start as usize;
        let len = entry.payload_size() as usize;
        &self.data[start..start + len]
    }

    fn find_image(&self, wanted: &[u32]) -> Result<&DirectoryEntry> {
        self.container
            .entries
            .iter()
            .find(|e| matches!(&e.header, SectionHeader::Image { type_format, .. } if wanted.contains(type_format)))
            .ok_or(X3fError::NotFound("image"))
    }

    /// The file's own `SECp` property list (UTF-8, already decoded).
    pub fn properties(&self) -> Result<&[(String, String)]> {
        if self.props_cache.get().is_none() {
            let (entry, num_props) = self
                .container
                .entries
                .iter()
                .find_map(|e| match e.header {
                    SectionHeader::Property { num_props, .. } => Some((e, num_props)),
                    _ => None
                })
                .ok_or(X3fError::NotFound("property"))?;
            let props = SectionLoader::load_property_list(self.payload(entry), num_props)?;
            let _ = self.props_cache.set(props);
        }
        Ok(self.props_cache.get().unwrap())
    }

    /// The file's `SECc` entries, decrypted/decoded and parsed into typed
    /// values.
    pub fn camf_entries(&self) -> Result<&[CamfEntry]> {
        if self.camf_cache.get().is_none() {
            let (entry, camf_type, v) = self
                .container
                .entries
                .iter()
                .find_map(|e| match e.header {
                    SectionHeader::Camf { camf_type, v } => Some((e, camf_type, v)),
                    _ => None
                })
                .ok_or(X3fError::NotFound("camf"))?;
            let entries = SectionLoader::load_camf(self.payload(entry), camf_type, v)?;
            let _ = self.camf_cache.set(entries);
        }
        Ok(self.camf_cache.get().unwrap())
    }

    /// Typed metadata over the CAMF table and the file's own property list.
    /// Tolerates either being entirely absent (some cropped test fixtures
    /// carry neither) by falling back to an empty table with a warning;
    /// lookups against specific missing entries still surface as
    /// [`X3fError::NotFound`]/[`X3fError::TypeMismatch`].
    pub fn meta(&self) -> Result<MetaAccess<'_>> {
        let camf = match self.camf_entries() {
            Ok(c) => c,
            Err(X3fError::NotFound(_)) => {
                log::warn!("file has no CAMF section");
                &[]
            }
            Err(e) => return Err(e)
        };
        let props = match self.properties() {
            Ok(p) => p,
            Err(X3fError::NotFound(_)) => {
                log::warn!("file has no property section");
                &[]
            }
            Err(e) => return Err(e)
        };
        Ok(MetaAccess::new(camf, props))
    }

    /// The raw sensor planes, decoded but not yet linearized, bad-pixel
    /// repaired, or color-converted. `Ok` wraps whichever [`ImageSection`]
    /// shape the camera's engine produces.
    pub fn raw_planes(&self) -> Result<&ImageSection> {
        if self.raw_cache.get().is_none() {
            let entry = self.find_image(RAW_TYPES)?;
            let (type_format, columns, rows, row_stride) = match entry.header {
                SectionHeader::Image { type_format, columns, rows, row_stride } => (type_format, columns, rows, row_stride),
                _ => unreachable!("find_image only matches SectionHeader::Image entries")
            };
            let section = SectionLoader::load_image(self.payload(entry), type_format, columns, rows, row_stride, &self.options)?;
            let _ = self.raw_cache.set(section);
        }
        Ok(self.raw_cache.get().unwrap())
    }

    /// The embedded preview/thumbnail, if present.
    pub fn thumbnail(&self) -> Result<&ImageSection> {
        if self.thumb_cache.get().is_none() {
            let entry = self.find_image(THUMB_TYPES)?;
            let (type_format, columns, rows, row_stride) = match entry.header {
                SectionHeader::Image { type_format, columns, rows, row_stride } => (type_format, columns, rows, row_stride),
                _ => unreachable!("find_image only matches SectionHeader::Image entries")
            };
            let section = SectionLoader::load_image(self.payload(entry), type_format, columns, rows, row_stride, &self.options)?;
            let _ = self.thumb_cache.set(section);
        }
        Ok(self.thumb_cache.get().unwrap())
    }

    /// Run the full raw-development pipeline: bad-pixel repair,
    /// linearization, Quattro layer expansion where applicable, spatial
    /// gain correction, and color conversion to `space` (`spec.md` §4.11
    /// through §4.14). `wb_override` forces a white-balance name instead of
    /// the one [`MetaAccess::get_wb`] would resolve.
    pub fn develop(&self, wb_override: Option<&str>, space: ColorSpace, max_out: u16) -> Result<RenderedImage> {
        let meta = self.meta()?;
        let wb = wb_override.map(str::to_string).unwrap_or_else(|| meta.get_wb(self.header.white_balance.as_deref()));

        let (image, levels) = match self.raw_planes()? {
            ImageSection::Rgb(pixels) => {
                let columns = pixels.columns() as u32;
                let rows = pixels.rows() as u32;
                let bad = bad_pixel::discover(&meta, 3, columns, rows);
                preprocess::process(pixels.clone(), 3, &meta, &wb, bad, &self.options)?
            }
            ImageSection::Quattro { lowres, top } => {
                let bad_chroma = bad_pixel::discover(&meta, 3, lowres.columns() as u32, lowres.rows() as u32);
                let bad_luma = bad_pixel::discover(&meta, 1, top.columns() as u32, top.rows() as u32);
                let (lowres, top, levels) =
                    preprocess::process_quattro(lowres.clone(), top.clone(), &meta, &wb, bad_chroma, bad_luma, &self.options)?;
                let expanded = QuattroExpander::expand(&lowres, &top)?;
                (expanded, levels)
            }
            ImageSection::Jpeg(_) => return Err(X3fError::UnsupportedSection { type_format: 0 })
        };

        let spatial_gain = SpatialGain::build(&meta, &wb);
        let (conv, lut) = color::conversion(&meta, &wb, space, max_out)?;
        Ok(color::render(&image, &levels, conv, &lut, spatial_gain.as_ref(), self.header.rotation))
    }
}

//! CAMF entry parsing and typed metadata lookups (`spec.md` §4.8, §4.9)
pub mod entry;
pub mod meta;

pub use entry::{CamfEntry, CamfEntryParser, CamfMatrix, CamfValue, MatrixData, MatrixKind};
pub use meta::MetaAccess;

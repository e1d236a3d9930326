//! Entropy decoders for the raw image sections and obfuscated CAMF metadata
//! (`spec.md` §4.5-§4.7).
pub mod camf_crypt;
pub mod huffman_image;
pub mod true_decoder;

pub use camf_crypt::camf_crypt;
pub use huffman_image::{HuffmanImageDecoder, OutputDepth};

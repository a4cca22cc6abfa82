//! # heifkit-codec
//!
//! Codec layer over libheif. Loads the library at runtime, reports its
//! version and registered encoder plugins through [`HeifModule`], and owns
//! libheif encoding contexts through [`EncodeContext`] so every handle is
//! released exactly once.

pub mod context;
pub mod encoder;
pub mod ffi;
pub mod info;
pub mod libheif;
pub mod library;
pub mod module;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{ContextView, EncodeContext};
pub use encoder::Encoder;
pub use info::{build_version_info, VersionInfo};
pub use libheif::Libheif;
pub use library::{
    CodecLibrary, EncoderDescriptor, PixelLayout, RawBuffer, RawContext, RawEncoder,
};
pub use module::HeifModule;

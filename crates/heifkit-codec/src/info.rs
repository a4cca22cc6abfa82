//! Build/version metadata reported by the codec library.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use heifkit_core::{CompressionFormat, HeifkitError, HeifkitResult};

use crate::library::CodecLibrary;

/// Key of the codec library's release version.
pub const LIBHEIF_KEY: &str = "libheif";
/// Key of the default HEVC encoder plugin's display name.
pub const HEIF_KEY: &str = "HEIF";
/// Key of the default AV1 encoder plugin's display name.
pub const AVIF_KEY: &str = "AVIF";

/// The fixed key set of the `lib_info` table, in display order.
pub const LIB_INFO_KEYS: [&str; 3] = [LIBHEIF_KEY, HEIF_KEY, AVIF_KEY];

/// Library version plus the names of the default HEVC and AV1 encoders.
///
/// An encoder name is empty when no plugin for that format is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    #[serde(rename = "libheif")]
    codec_library_version: String,
    #[serde(rename = "HEIF")]
    hevc_encoder_name: String,
    #[serde(rename = "AVIF")]
    av1_encoder_name: String,
}

impl VersionInfo {
    pub fn codec_library_version(&self) -> &str {
        &self.codec_library_version
    }

    pub fn hevc_encoder_name(&self) -> &str {
        &self.hevc_encoder_name
    }

    pub fn av1_encoder_name(&self) -> &str {
        &self.av1_encoder_name
    }

    /// Look a value up by its `lib_info` key.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            LIBHEIF_KEY => Some(&self.codec_library_version),
            HEIF_KEY => Some(&self.hevc_encoder_name),
            AVIF_KEY => Some(&self.av1_encoder_name),
            _ => None,
        }
    }

    /// The table as a key → value map.
    pub fn as_map(&self) -> BTreeMap<&'static str, &str> {
        LIB_INFO_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "libheif {} (HEIF: {}, AVIF: {})",
            self.codec_library_version,
            or_none(&self.hevc_encoder_name),
            or_none(&self.av1_encoder_name),
        )
    }
}

fn or_none(name: &str) -> &str {
    if name.is_empty() {
        "none"
    } else {
        name
    }
}

/// Name of the best-ranked encoder for `format`, or `""` if none is registered.
fn default_encoder_name(lib: &dyn CodecLibrary, format: CompressionFormat) -> String {
    lib.encoder_descriptors(format, 1)
        .into_iter()
        .next()
        .map(|descriptor| descriptor.name)
        .unwrap_or_default()
}

/// Query `lib` for its version and default HEVC/AV1 encoder names.
///
/// Fails only when the library reports an empty version, which means the
/// loaded binary is not a usable libheif.
pub fn build_version_info(lib: &dyn CodecLibrary) -> HeifkitResult<VersionInfo> {
    let codec_library_version = lib.version();
    if codec_library_version.is_empty() {
        return Err(HeifkitError::ModuleInit(
            "codec library reported an empty version string".into(),
        ));
    }

    let info = VersionInfo {
        codec_library_version,
        hevc_encoder_name: default_encoder_name(lib, CompressionFormat::Hevc),
        av1_encoder_name: default_encoder_name(lib, CompressionFormat::Av1),
    };
    debug!(
        version = %info.codec_library_version,
        hevc = %info.hevc_encoder_name,
        av1 = %info.av1_encoder_name,
        "Collected codec library info"
    );
    Ok(info)
}

use serde::{Deserialize, Serialize};

use crate::HeifkitError;

/// Compression formats known to libheif.
///
/// Discriminants match `enum heif_compression_format` so values can cross
/// the FFI boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum CompressionFormat {
    /// The compression format is not defined.
    Undefined = 0,
    /// HEVC / H.265, the codec behind `.heic` files.
    Hevc = 1,
    Avc = 2,
    Jpeg = 3,
    /// AV1, the codec behind `.avif` files.
    Av1 = 4,
    Vvc = 5,
    Evc = 6,
    /// JPEG 2000 (ISO/IEC 15444-16:2021).
    Jpeg2000 = 7,
}

impl CompressionFormat {
    /// Every defined format, in libheif's declaration order.
    pub const ALL: [CompressionFormat; 7] = [
        CompressionFormat::Hevc,
        CompressionFormat::Avc,
        CompressionFormat::Jpeg,
        CompressionFormat::Av1,
        CompressionFormat::Vvc,
        CompressionFormat::Evc,
        CompressionFormat::Jpeg2000,
    ];

    /// Raw libheif enum value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Map a raw libheif value back to a format. Unknown values become `Undefined`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => CompressionFormat::Hevc,
            2 => CompressionFormat::Avc,
            3 => CompressionFormat::Jpeg,
            4 => CompressionFormat::Av1,
            5 => CompressionFormat::Vvc,
            6 => CompressionFormat::Evc,
            7 => CompressionFormat::Jpeg2000,
            _ => CompressionFormat::Undefined,
        }
    }

    /// Human-readable name, as printed by the CLI.
    pub fn display_name(self) -> &'static str {
        match self {
            CompressionFormat::Undefined => "Undefined",
            CompressionFormat::Hevc => "HEVC",
            CompressionFormat::Avc => "AVC",
            CompressionFormat::Jpeg => "JPEG",
            CompressionFormat::Av1 => "AV1",
            CompressionFormat::Vvc => "VVC",
            CompressionFormat::Evc => "EVC",
            CompressionFormat::Jpeg2000 => "JPEG 2000",
        }
    }

    /// Conventional file extension for a single-image file in this format.
    pub fn file_extension(self) -> Option<&'static str> {
        match self {
            CompressionFormat::Hevc => Some("heic"),
            CompressionFormat::Av1 => Some("avif"),
            CompressionFormat::Jpeg | CompressionFormat::Avc | CompressionFormat::Vvc => {
                Some("heif")
            }
            CompressionFormat::Jpeg2000 => Some("hej2"),
            CompressionFormat::Evc | CompressionFormat::Undefined => None,
        }
    }
}

impl Default for CompressionFormat {
    fn default() -> Self {
        CompressionFormat::Hevc
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionFormat::Undefined => write!(f, "undefined"),
            CompressionFormat::Hevc => write!(f, "hevc"),
            CompressionFormat::Avc => write!(f, "avc"),
            CompressionFormat::Jpeg => write!(f, "jpeg"),
            CompressionFormat::Av1 => write!(f, "av1"),
            CompressionFormat::Vvc => write!(f, "vvc"),
            CompressionFormat::Evc => write!(f, "evc"),
            CompressionFormat::Jpeg2000 => write!(f, "jpeg2000"),
        }
    }
}

impl std::str::FromStr for CompressionFormat {
    type Err = HeifkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hevc" | "h265" | "heic" | "heif" => Ok(CompressionFormat::Hevc),
            "avc" | "h264" => Ok(CompressionFormat::Avc),
            "jpeg" | "jpg" => Ok(CompressionFormat::Jpeg),
            "av1" | "avif" => Ok(CompressionFormat::Av1),
            "vvc" | "h266" => Ok(CompressionFormat::Vvc),
            "evc" => Ok(CompressionFormat::Evc),
            "jpeg2000" | "j2k" => Ok(CompressionFormat::Jpeg2000),
            other => Err(HeifkitError::InvalidArgument(format!(
                "unknown compression format '{}'",
                other
            ))),
        }
    }
}

/// libheif's top-level error codes (`enum heif_error_code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HeifErrorCode {
    Ok = 0,
    InputDoesNotExist = 1,
    InvalidInput = 2,
    UnsupportedFiletype = 3,
    UnsupportedFeature = 4,
    UsageError = 5,
    MemoryAllocationError = 6,
    DecoderPluginError = 7,
    EncoderPluginError = 8,
    EncodingError = 9,
    ColorProfileDoesNotExist = 10,
    PluginLoadingError = 11,
    /// A code this crate does not know about (newer libheif).
    Unknown = -1,
}

impl HeifErrorCode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => HeifErrorCode::Ok,
            1 => HeifErrorCode::InputDoesNotExist,
            2 => HeifErrorCode::InvalidInput,
            3 => HeifErrorCode::UnsupportedFiletype,
            4 => HeifErrorCode::UnsupportedFeature,
            5 => HeifErrorCode::UsageError,
            6 => HeifErrorCode::MemoryAllocationError,
            7 => HeifErrorCode::DecoderPluginError,
            8 => HeifErrorCode::EncoderPluginError,
            9 => HeifErrorCode::EncodingError,
            10 => HeifErrorCode::ColorProfileDoesNotExist,
            11 => HeifErrorCode::PluginLoadingError,
            _ => HeifErrorCode::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HeifErrorCode::Ok => "Ok",
            HeifErrorCode::InputDoesNotExist => "Input_does_not_exist",
            HeifErrorCode::InvalidInput => "Invalid_input",
            HeifErrorCode::UnsupportedFiletype => "Unsupported_filetype",
            HeifErrorCode::UnsupportedFeature => "Unsupported_feature",
            HeifErrorCode::UsageError => "Usage_error",
            HeifErrorCode::MemoryAllocationError => "Memory_allocation_error",
            HeifErrorCode::DecoderPluginError => "Decoder_plugin_error",
            HeifErrorCode::EncoderPluginError => "Encoder_plugin_error",
            HeifErrorCode::EncodingError => "Encoding_error",
            HeifErrorCode::ColorProfileDoesNotExist => "Color_profile_does_not_exist",
            HeifErrorCode::PluginLoadingError => "Plugin_loading_error",
            HeifErrorCode::Unknown => "Unknown",
        }
    }
}

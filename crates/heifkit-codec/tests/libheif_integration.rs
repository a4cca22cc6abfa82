//! End-to-end tests against a real libheif.
//!
//! Tests that need libheif installed are marked `#[ignore]` so they can be
//! run explicitly on machines that have it:
//!
//! ```bash
//! cargo test -p heifkit-codec --test libheif_integration -- --ignored
//! ```
//!
//! The non-ignored tests cover the load failure path, which works anywhere.

use std::sync::Arc;

use image::{Rgb, RgbImage, Rgba, RgbaImage};

use heifkit_codec::info::{AVIF_KEY, HEIF_KEY, LIBHEIF_KEY, LIB_INFO_KEYS};
use heifkit_codec::{CodecLibrary, EncodeContext, Encoder, HeifModule, Libheif};
use heifkit_core::{CompressionFormat, HeifkitError, LibraryConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_module() -> Option<HeifModule> {
    match HeifModule::load(&LibraryConfig::default()) {
        Ok(module) => Some(module),
        Err(e) => {
            eprintln!("Skipping: libheif not available: {e}");
            None
        }
    }
}

/// First of HEVC/AV1 that has an encoder plugin registered.
fn encodable_format(module: &HeifModule) -> Option<CompressionFormat> {
    [CompressionFormat::Hevc, CompressionFormat::Av1]
        .into_iter()
        .find(|&format| module.have_encoder_for_format(format))
}

fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255])
    })
}

fn assert_isobmff(bytes: &[u8]) {
    assert!(bytes.len() > 12, "output too short: {} bytes", bytes.len());
    assert_eq!(&bytes[4..8], b"ftyp", "missing ftyp box");
}

// ---------------------------------------------------------------------------
// Load failures (no libheif needed)
// ---------------------------------------------------------------------------

#[test]
fn test_missing_library_is_module_init_error() {
    let config = LibraryConfig {
        path: Some("/nonexistent/libheif.so.1".into()),
    };
    assert!(matches!(
        Libheif::load(&config),
        Err(HeifkitError::ModuleInit(_))
    ));
    assert!(matches!(
        HeifModule::load(&config),
        Err(HeifkitError::ModuleInit(_))
    ));
}

// ---------------------------------------------------------------------------
// Real libheif
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires libheif installed
fn test_lib_info_published() {
    let Some(module) = load_module() else {
        return;
    };
    let info = module.attribute("lib_info").expect("lib_info attribute");
    let table = info.as_map();
    assert_eq!(table.len(), LIB_INFO_KEYS.len());

    let version = info.get(LIBHEIF_KEY).unwrap();
    assert!(!version.is_empty());
    assert!(version.split('.').count() >= 2, "unexpected version {version}");

    for (key, format) in [
        (HEIF_KEY, CompressionFormat::Hevc),
        (AVIF_KEY, CompressionFormat::Av1),
    ] {
        let name = info.get(key).unwrap();
        assert_eq!(
            name.is_empty(),
            !module.have_encoder_for_format(format),
            "{key} entry disagrees with the plugin registry"
        );
    }
}

#[test]
#[ignore] // Requires libheif installed
fn test_encoder_descriptors_truncated() {
    let Ok(lib) = Libheif::load(&LibraryConfig::default()) else {
        eprintln!("Skipping: libheif not available");
        return;
    };
    for format in CompressionFormat::ALL {
        assert!(lib.encoder_descriptors(format, 0).is_empty());
        let one = lib.encoder_descriptors(format, 1);
        assert!(one.len() <= 1);
        assert_eq!(one.is_empty(), !lib.have_encoder_for_format(format));
        for descriptor in &one {
            assert_eq!(descriptor.format, format);
            assert!(!descriptor.name.is_empty());
        }
    }
}

#[test]
#[ignore] // Requires libheif with an HEVC or AV1 encoder plugin
fn test_encode_write_dispose_rgba() {
    let Some(module) = load_module() else {
        return;
    };
    let Some(format) = encodable_format(&module) else {
        eprintln!("Skipping: no HEVC/AV1 encoder plugin");
        return;
    };

    let mut ctx = module.new_encode_context().unwrap();
    assert!(!ctx.has_buffer());
    {
        let mut encoder = Encoder::for_format(&ctx, format).unwrap();
        encoder.set_lossy_quality(50).unwrap();
        // 34 * 4 bytes per row is not a multiple of libheif's plane alignment.
        ctx.encode_rgba(&encoder, &gradient_rgba(34, 24)).unwrap();
    }

    let first = ctx.write().unwrap().to_vec();
    assert_isobmff(&first);
    assert_eq!(ctx.data_size(), first.len());

    // Writing again replaces the buffer with an identical serialization.
    let second = ctx.write().unwrap().to_vec();
    assert_eq!(first, second);
    assert_eq!(ctx.encoded_bytes(), &second[..]);

    ctx.dispose();
}

#[test]
#[ignore] // Requires libheif with an HEVC or AV1 encoder plugin
fn test_encode_rgb_without_alpha() {
    let Some(module) = load_module() else {
        return;
    };
    let Some(format) = encodable_format(&module) else {
        eprintln!("Skipping: no HEVC/AV1 encoder plugin");
        return;
    };

    let mut ctx = EncodeContext::new(Arc::clone(module.library())).unwrap();
    {
        let encoder = Encoder::for_format(&ctx, format).unwrap();
        let image = RgbImage::from_pixel(16, 16, Rgb([10, 200, 30]));
        ctx.encode_rgb(&encoder, &image).unwrap();
    }
    assert_isobmff(ctx.write().unwrap());
}

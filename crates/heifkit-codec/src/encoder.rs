use std::ffi::CString;
use std::sync::Arc;

use tracing::debug;

use heifkit_core::{CompressionFormat, EncoderConfig, HeifkitError, HeifkitResult};

use crate::context::EncodeContext;
use crate::library::{CodecLibrary, RawEncoder};

/// Owning wrapper around a libheif encoder plugin instance.
///
/// Released exactly once when dropped.
pub struct Encoder {
    lib: Arc<dyn CodecLibrary>,
    raw: RawEncoder,
    format: CompressionFormat,
}

// SAFETY: the encoder handle is exclusively owned by this value.
unsafe impl Send for Encoder {}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("format", &self.format)
            .field("encoder", &self.raw.as_ptr())
            .finish()
    }
}

impl Encoder {
    /// The default (best-ranked) encoder for `format`.
    ///
    /// # Errors
    /// Propagates libheif's error when no plugin handles `format`.
    pub fn for_format(ctx: &EncodeContext, format: CompressionFormat) -> HeifkitResult<Self> {
        if format == CompressionFormat::Undefined {
            return Err(HeifkitError::InvalidArgument(
                "cannot pick an encoder for an undefined format".into(),
            ));
        }
        let lib = ctx.library().clone();
        // SAFETY: the context is live for the duration of the borrow.
        let raw = unsafe { lib.encoder_for_format(ctx.raw(), format)? };
        debug!(%format, "Acquired encoder");
        Ok(Self { lib, raw, format })
    }

    pub fn format(&self) -> CompressionFormat {
        self.format
    }

    /// Lossy quality, 0 (worst) to 100 (best).
    pub fn set_lossy_quality(&mut self, quality: i32) -> HeifkitResult<()> {
        if !(0..=100).contains(&quality) {
            return Err(HeifkitError::InvalidArgument(format!(
                "quality must be in 0..=100, got {}",
                quality
            )));
        }
        // SAFETY: `raw` is live until drop.
        unsafe { self.lib.encoder_set_lossy_quality(self.raw, quality) }
    }

    pub fn set_lossless(&mut self, enable: bool) -> HeifkitResult<()> {
        // SAFETY: `raw` is live until drop.
        unsafe { self.lib.encoder_set_lossless(self.raw, enable) }
    }

    /// Set a plugin-specific parameter such as `preset` or `speed`.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> HeifkitResult<()> {
        let name_c = ascii_c_string(name, "parameter name")?;
        let value_c = ascii_c_string(value, "parameter value")?;
        // SAFETY: `raw` is live until drop.
        unsafe { self.lib.encoder_set_parameter(self.raw, &name_c, &value_c) }
    }

    /// Apply quality (`-1` = lossless) and every configured parameter.
    pub fn apply(&mut self, config: &EncoderConfig) -> HeifkitResult<()> {
        match config.quality {
            Some(-1) => self.set_lossless(true)?,
            Some(quality) => self.set_lossy_quality(quality)?,
            None => {}
        }
        for (name, value) in &config.params {
            self.set_parameter(name, value)?;
        }
        Ok(())
    }

    pub(crate) fn raw(&self) -> RawEncoder {
        self.raw
    }

    pub(crate) fn library(&self) -> &Arc<dyn CodecLibrary> {
        &self.lib
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        debug!(format = %self.format, "Releasing encoder");
        // SAFETY: acquired in `for_format` and released only here.
        unsafe { self.lib.release_encoder(self.raw) };
    }
}

fn ascii_c_string(value: &str, what: &str) -> HeifkitResult<CString> {
    if !value.is_ascii() {
        return Err(HeifkitError::InvalidArgument(format!(
            "{what} must be ASCII: {value:?}"
        )));
    }
    CString::new(value)
        .map_err(|_| HeifkitError::InvalidArgument(format!("{what} contains a NUL byte")))
}

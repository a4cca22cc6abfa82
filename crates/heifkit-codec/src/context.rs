//! Owning wrapper around a libheif encoding context and its output buffer.
//!
//! # Lifecycle
//!
//! ```text
//! 1. EncodeContext::new          -> heif_context_alloc (fails with Allocation on null)
//! 2. Encoder::for_format + encode_rgb/encode_rgba (optional, repeatable)
//! 3. write / adopt_buffer        -> owned output buffer (previous one released)
//! 4. encoded_bytes               -> borrowed view, cannot outlive the wrapper
//! 5. dispose / drop              -> heif_context_free once, buffer free once if present
//! ```

use std::ffi::c_void;
use std::marker::PhantomData;
use std::sync::Arc;

use image::{RgbImage, RgbaImage};
use tracing::debug;

use heifkit_core::{HeifkitError, HeifkitResult};

use crate::encoder::Encoder;
use crate::library::{CodecLibrary, PixelLayout, RawBuffer, RawContext};

/// Non-owning view of the context handle, valid while the wrapper is borrowed.
#[derive(Debug, Clone, Copy)]
pub struct ContextView<'a> {
    raw: RawContext,
    _owner: PhantomData<&'a EncodeContext>,
}

impl ContextView<'_> {
    /// The raw `heif_context*`, for passing to foreign calls. Do not free it.
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr()
    }
}

/// Exclusively owns one libheif encoding context plus, once encoding has
/// produced one, the encoded output buffer.
pub struct EncodeContext {
    lib: Arc<dyn CodecLibrary>,
    context: RawContext,
    buffer: Option<RawBuffer>,
    released: bool,
}

// SAFETY: the context handle is exclusively owned and only touched through
// `&mut self` or `&self` on the owning thread; libheif contexts are not tied
// to the thread that allocated them.
unsafe impl Send for EncodeContext {}

impl std::fmt::Debug for EncodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeContext")
            .field("context", &self.context.as_ptr())
            .field("data_size", &self.data_size())
            .finish()
    }
}

impl EncodeContext {
    /// Acquire a fresh encoding context from `lib`.
    ///
    /// # Errors
    /// Returns `HeifkitError::Allocation` if the library cannot allocate one.
    pub fn new(lib: Arc<dyn CodecLibrary>) -> HeifkitResult<Self> {
        let context = lib.alloc_context().ok_or_else(|| {
            HeifkitError::Allocation("heif_context_alloc returned null".into())
        })?;
        debug!(context = ?context.as_ptr(), "Acquired encoding context");

        Ok(Self {
            lib,
            context,
            buffer: None,
            released: false,
        })
    }

    pub fn context_handle(&self) -> ContextView<'_> {
        ContextView {
            raw: self.context,
            _owner: PhantomData,
        }
    }

    /// The encoded output, or an empty slice before anything was produced.
    pub fn encoded_bytes(&self) -> &[u8] {
        self.buffer.as_ref().map(RawBuffer::as_slice).unwrap_or(&[])
    }

    /// Number of valid bytes in the output buffer; 0 when there is none.
    pub fn data_size(&self) -> usize {
        self.buffer.as_ref().map(RawBuffer::len).unwrap_or(0)
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Take ownership of an output buffer. Any previous buffer is released.
    ///
    /// # Safety
    /// `buffer` must have been allocated by this context's library so that
    /// its `free_buffer` can release it.
    pub unsafe fn adopt_buffer(&mut self, buffer: RawBuffer) {
        if let Some(previous) = self.buffer.replace(buffer) {
            debug!(bytes = previous.len(), "Releasing superseded output buffer");
            // SAFETY: `previous` was adopted under the same contract.
            unsafe { self.lib.free_buffer(previous) };
        }
    }

    /// Encode `image` into this context as a new top-level image with alpha.
    pub fn encode_rgba(&mut self, encoder: &Encoder, image: &RgbaImage) -> HeifkitResult<()> {
        let (width, height) = image.dimensions();
        self.encode_pixels(encoder, PixelLayout::Rgba, width, height, image.as_raw())
    }

    /// Encode `image` into this context as a new top-level image without alpha.
    pub fn encode_rgb(&mut self, encoder: &Encoder, image: &RgbImage) -> HeifkitResult<()> {
        let (width, height) = image.dimensions();
        self.encode_pixels(encoder, PixelLayout::Rgb, width, height, image.as_raw())
    }

    fn encode_pixels(
        &mut self,
        encoder: &Encoder,
        layout: PixelLayout,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> HeifkitResult<()> {
        if !same_library(&self.lib, encoder.library()) {
            return Err(HeifkitError::InvalidArgument(
                "encoder belongs to a different codec library".into(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(HeifkitError::InvalidArgument(format!(
                "cannot encode an empty {}x{} image",
                width, height
            )));
        }

        // SAFETY: both handles are live for as long as their owners are borrowed.
        unsafe {
            self.lib.encode_interleaved(
                self.context,
                encoder.raw(),
                layout,
                width,
                height,
                pixels,
            )?;
        }
        debug!(
            width,
            height,
            alpha = layout.has_alpha(),
            format = %encoder.format(),
            "Encoded image into context"
        );
        Ok(())
    }

    /// Serialize the context and keep the result as the owned output buffer.
    pub fn write(&mut self) -> HeifkitResult<&[u8]> {
        // SAFETY: the context is live until `release`.
        let buffer = unsafe { self.lib.write_context(self.context)? };
        debug!(bytes = buffer.len(), "Context written to output buffer");
        // SAFETY: `write_context` allocates with this library's allocator.
        unsafe { self.adopt_buffer(buffer) };
        Ok(self.encoded_bytes())
    }

    /// Release the context and the output buffer now.
    pub fn dispose(mut self) {
        self.release();
    }

    /// Frees the context once and the buffer once if present; later calls do nothing.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(buffer) = self.buffer.take() {
            debug!(bytes = buffer.len(), "Releasing output buffer");
            // SAFETY: adopted under the `adopt_buffer` contract, released once.
            unsafe { self.lib.free_buffer(buffer) };
        }
        debug!(context = ?self.context.as_ptr(), "Releasing encoding context");
        // SAFETY: allocated in `new`; `released` prevents a second free.
        unsafe { self.lib.free_context(self.context) };
    }

    pub(crate) fn raw(&self) -> RawContext {
        self.context
    }

    pub(crate) fn library(&self) -> &Arc<dyn CodecLibrary> {
        &self.lib
    }
}

/// Address comparison only; vtable pointers of the same type may differ.
fn same_library(a: &Arc<dyn CodecLibrary>, b: &Arc<dyn CodecLibrary>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl Drop for EncodeContext {
    fn drop(&mut self) {
        self.release();
    }
}

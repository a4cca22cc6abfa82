//! The seam between heifkit and the foreign codec library.
//!
//! [`CodecLibrary`] lists exactly the libheif calls heifkit makes. The
//! production implementation is [`crate::Libheif`]; tests substitute a
//! recording double so handle lifetimes can be asserted without libheif.

use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

use heifkit_core::{CompressionFormat, HeifkitResult};

/// Opaque `heif_context*`. Carries no ownership by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContext(NonNull<c_void>);

impl RawContext {
    /// Wrap a pointer returned by the library. Null yields `None`.
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Opaque `heif_encoder*`. Carries no ownership by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEncoder(NonNull<c_void>);

impl RawEncoder {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// A heap buffer allocated by the codec library's allocator.
///
/// Deliberately neither `Clone` nor `Copy`: holding a `RawBuffer` means
/// holding the obligation to hand it back to [`CodecLibrary::free_buffer`].
#[derive(Debug, PartialEq, Eq)]
pub struct RawBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl RawBuffer {
    /// # Safety
    /// `ptr` must point to an allocation of at least `len` initialized bytes
    /// made by the allocator the owning library's `free_buffer` releases
    /// into, and nothing else may free it.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `from_raw_parts` guarantees `len` initialized bytes behind
        // `ptr`, valid until the buffer is released, which consumes `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

/// Channel layout of an interleaved 8-bit raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb,
    Rgba,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        self == PixelLayout::Rgba
    }
}

/// One encoder plugin as described by `heif_encoder_descriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderDescriptor {
    /// Human-readable name, e.g. `"x265 HEVC encoder (3.5+1-f0c1022b6)"`.
    pub name: String,
    /// Short plugin id, e.g. `"x265"`.
    pub id_name: String,
    pub format: CompressionFormat,
    pub supports_lossy: bool,
    pub supports_lossless: bool,
}

/// The foreign codec-library API surface heifkit consumes.
///
/// Handle-taking methods are `unsafe`: callers must pass handles obtained
/// from the same library instance that have not been released yet.
pub trait CodecLibrary: Send + Sync {
    /// Release version string. Never fails.
    fn version(&self) -> String;

    /// Encoder descriptors for `format`, best-ranked first, at most `max_results`.
    fn encoder_descriptors(
        &self,
        format: CompressionFormat,
        max_results: usize,
    ) -> Vec<EncoderDescriptor>;

    fn have_encoder_for_format(&self, format: CompressionFormat) -> bool;

    fn have_decoder_for_format(&self, format: CompressionFormat) -> bool;

    /// A fresh encoding context, or `None` when the library cannot allocate one.
    fn alloc_context(&self) -> Option<RawContext>;

    /// # Safety
    /// `ctx` must be live and must not be used afterwards.
    unsafe fn free_context(&self, ctx: RawContext);

    /// Release a buffer produced by this library.
    ///
    /// # Safety
    /// `buffer` must have been produced by this library.
    unsafe fn free_buffer(&self, buffer: RawBuffer);

    /// Serialize `ctx` into a newly allocated buffer owned by the caller.
    ///
    /// # Safety
    /// `ctx` must be live.
    unsafe fn write_context(&self, ctx: RawContext) -> HeifkitResult<RawBuffer>;

    /// # Safety
    /// `ctx` must be live.
    unsafe fn encoder_for_format(
        &self,
        ctx: RawContext,
        format: CompressionFormat,
    ) -> HeifkitResult<RawEncoder>;

    /// # Safety
    /// `encoder` must be live and must not be used afterwards.
    unsafe fn release_encoder(&self, encoder: RawEncoder);

    /// # Safety
    /// `encoder` must be live.
    unsafe fn encoder_set_lossy_quality(&self, encoder: RawEncoder, quality: i32)
        -> HeifkitResult<()>;

    /// # Safety
    /// `encoder` must be live.
    unsafe fn encoder_set_lossless(&self, encoder: RawEncoder, enable: bool) -> HeifkitResult<()>;

    /// # Safety
    /// `encoder` must be live.
    unsafe fn encoder_set_parameter(
        &self,
        encoder: RawEncoder,
        name: &CStr,
        value: &CStr,
    ) -> HeifkitResult<()>;

    /// Encode one interleaved 8-bit raster into `ctx` as a top-level image.
    ///
    /// `pixels.len()` is `width * height * layout.channels()`; rows are
    /// tightly packed.
    ///
    /// # Safety
    /// `ctx` and `encoder` must be live.
    unsafe fn encode_interleaved(
        &self,
        ctx: RawContext,
        encoder: RawEncoder,
        layout: PixelLayout,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> HeifkitResult<()>;
}

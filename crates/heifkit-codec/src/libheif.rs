//! [`CodecLibrary`] implementation backed by a dynamically loaded libheif.

use std::ffi::{c_int, c_void, CStr};
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use heifkit_core::{
    CompressionFormat, HeifErrorCode, HeifkitError, HeifkitResult, LibraryConfig,
};

use crate::ffi::{
    c_str_lossy, check_heif_error, HeifErrorRaw, HeifWriter, LibheifLibrary,
    HEIF_CHANNEL_INTERLEAVED, HEIF_CHROMA_INTERLEAVED_RGB, HEIF_CHROMA_INTERLEAVED_RGBA,
    HEIF_COLORSPACE_RGB, HEIF_WRITER_API_VERSION,
};
use crate::library::{
    CodecLibrary, EncoderDescriptor, PixelLayout, RawBuffer, RawContext, RawEncoder,
};

/// libheif, loaded at runtime.
#[derive(Debug)]
pub struct Libheif {
    lib: LibheifLibrary,
}

impl Libheif {
    /// Load from the configured path, or from the platform defaults.
    pub fn load(config: &LibraryConfig) -> HeifkitResult<Self> {
        let lib = match &config.path {
            Some(path) => LibheifLibrary::load_from(path)?,
            None => LibheifLibrary::load()?,
        };
        Ok(Self { lib })
    }

    /// # Safety
    /// `descriptor` must be a live `heif_encoder_descriptor*`.
    unsafe fn describe(&self, descriptor: *const c_void) -> EncoderDescriptor {
        let api = &self.lib.api;
        // SAFETY: descriptors are static records owned by libheif's plugin registry.
        unsafe {
            EncoderDescriptor {
                name: c_str_lossy((api.heif_encoder_descriptor_get_name)(descriptor)),
                id_name: c_str_lossy((api.heif_encoder_descriptor_get_id_name)(descriptor)),
                format: CompressionFormat::from_raw((api
                    .heif_encoder_descriptor_get_compression_format)(
                    descriptor,
                )),
                supports_lossy: (api.heif_encoder_descriptor_supports_lossy_compression)(
                    descriptor,
                ) != 0,
                supports_lossless: (api.heif_encoder_descriptor_supports_lossless_compression)(
                    descriptor,
                ) != 0,
            }
        }
    }
}

/// Releases a `heif_image*` on every exit path of `encode_interleaved`.
struct ImageGuard<'a> {
    lib: &'a LibheifLibrary,
    image: *mut c_void,
}

impl Drop for ImageGuard<'_> {
    fn drop(&mut self) {
        if !self.image.is_null() {
            // SAFETY: `image` came from heif_image_create and is released once.
            unsafe { (self.lib.api.heif_image_release)(self.image) };
        }
    }
}

/// `heif_writer` callback: append every chunk to the `Vec<u8>` in `userdata`.
unsafe extern "C" fn collect_chunk(
    _ctx: *mut c_void,
    data: *const c_void,
    size: usize,
    userdata: *mut c_void,
) -> HeifErrorRaw {
    // SAFETY: `userdata` is the `&mut Vec<u8>` handed to heif_context_write by
    // `write_context`, which outlives the call.
    let sink = unsafe { &mut *(userdata as *mut Vec<u8>) };
    if size > 0 && !data.is_null() {
        // SAFETY: libheif passes `size` readable bytes at `data`.
        sink.extend_from_slice(unsafe { std::slice::from_raw_parts(data as *const u8, size) });
    }
    HeifErrorRaw::ok()
}

/// Copy `bytes` into a `malloc` allocation so it pairs with `libc::free`.
fn malloc_copy(bytes: &[u8]) -> HeifkitResult<RawBuffer> {
    // SAFETY: plain allocation; at least one byte so an empty output still
    // yields a unique, freeable pointer.
    let ptr = unsafe { libc::malloc(bytes.len().max(1)) } as *mut u8;
    let ptr = NonNull::new(ptr).ok_or_else(|| {
        HeifkitError::Allocation(format!(
            "failed to allocate {} bytes for encoded output",
            bytes.len()
        ))
    })?;
    // SAFETY: the destination holds at least `bytes.len()` bytes and does not
    // overlap the source; ownership moves into the RawBuffer.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
        Ok(RawBuffer::from_raw_parts(ptr, bytes.len()))
    }
}

fn to_c_int(value: u32, what: &str) -> HeifkitResult<c_int> {
    c_int::try_from(value).map_err(|_| {
        HeifkitError::InvalidArgument(format!("{what} {value} exceeds libheif limits"))
    })
}

/// Validate the stride libheif reported for a plane holding `row_bytes` per row.
fn plane_stride(stride: c_int, row_bytes: usize) -> HeifkitResult<usize> {
    match usize::try_from(stride) {
        Ok(stride) if stride >= row_bytes => Ok(stride),
        _ => Err(HeifkitError::Heif {
            code: HeifErrorCode::UsageError as i32,
            subcode: 0,
            message: format!("plane stride {stride} cannot hold {row_bytes}-byte rows"),
        }),
    }
}

fn chroma_for(layout: PixelLayout) -> c_int {
    match layout {
        PixelLayout::Rgb => HEIF_CHROMA_INTERLEAVED_RGB,
        PixelLayout::Rgba => HEIF_CHROMA_INTERLEAVED_RGBA,
    }
}

impl CodecLibrary for Libheif {
    fn version(&self) -> String {
        // SAFETY: returns a static string.
        unsafe { c_str_lossy((self.lib.api.heif_get_version)()) }
    }

    fn encoder_descriptors(
        &self,
        format: CompressionFormat,
        max_results: usize,
    ) -> Vec<EncoderDescriptor> {
        let count = max_results.min(c_int::MAX as usize) as c_int;
        if count == 0 {
            return Vec::new();
        }
        let mut out: Vec<*const c_void> = vec![ptr::null(); count as usize];

        // SAFETY: a null context queries the global plugin registry; `out`
        // holds `count` slots.
        let found = unsafe {
            (self.lib.api.heif_context_get_encoder_descriptors)(
                ptr::null_mut(),
                format.as_raw(),
                ptr::null(),
                out.as_mut_ptr(),
                count,
            )
        };
        out.truncate(found.clamp(0, count) as usize);

        out.into_iter()
            .filter(|d| !d.is_null())
            // SAFETY: libheif filled these slots with live descriptors.
            .map(|d| unsafe { self.describe(d) })
            .collect()
    }

    fn have_encoder_for_format(&self, format: CompressionFormat) -> bool {
        // SAFETY: pure query on the plugin registry.
        unsafe { (self.lib.api.heif_have_encoder_for_format)(format.as_raw()) != 0 }
    }

    fn have_decoder_for_format(&self, format: CompressionFormat) -> bool {
        // SAFETY: pure query on the plugin registry.
        unsafe { (self.lib.api.heif_have_decoder_for_format)(format.as_raw()) != 0 }
    }

    fn alloc_context(&self) -> Option<RawContext> {
        // SAFETY: no preconditions; null signals allocation failure.
        RawContext::new(unsafe { (self.lib.api.heif_context_alloc)() })
    }

    unsafe fn free_context(&self, ctx: RawContext) {
        // SAFETY: caller guarantees `ctx` is live and not reused.
        unsafe { (self.lib.api.heif_context_free)(ctx.as_ptr()) }
    }

    unsafe fn free_buffer(&self, buffer: RawBuffer) {
        // SAFETY: every RawBuffer this library hands out comes from `malloc_copy`.
        unsafe { libc::free(buffer.as_ptr() as *mut c_void) }
    }

    unsafe fn write_context(&self, ctx: RawContext) -> HeifkitResult<RawBuffer> {
        let mut sink: Vec<u8> = Vec::new();
        let mut writer = HeifWriter {
            writer_api_version: HEIF_WRITER_API_VERSION,
            write: collect_chunk,
        };
        // SAFETY: `ctx` is live per the caller; `writer` and `sink` outlive the call.
        let err = unsafe {
            (self.lib.api.heif_context_write)(
                ctx.as_ptr(),
                &mut writer,
                &mut sink as *mut Vec<u8> as *mut c_void,
            )
        };
        check_heif_error(err, "heif_context_write")?;
        debug!(bytes = sink.len(), "Serialized HEIF context");
        malloc_copy(&sink)
    }

    unsafe fn encoder_for_format(
        &self,
        ctx: RawContext,
        format: CompressionFormat,
    ) -> HeifkitResult<RawEncoder> {
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: `ctx` is live per the caller; `out` receives the encoder.
        let err = unsafe {
            (self.lib.api.heif_context_get_encoder_for_format)(
                ctx.as_ptr(),
                format.as_raw(),
                &mut out,
            )
        };
        check_heif_error(err, "heif_context_get_encoder_for_format")?;
        RawEncoder::new(out).ok_or_else(|| {
            HeifkitError::Allocation(format!("libheif returned no encoder for {}", format))
        })
    }

    unsafe fn release_encoder(&self, encoder: RawEncoder) {
        // SAFETY: caller guarantees `encoder` is live and not reused.
        unsafe { (self.lib.api.heif_encoder_release)(encoder.as_ptr()) }
    }

    unsafe fn encoder_set_lossy_quality(
        &self,
        encoder: RawEncoder,
        quality: i32,
    ) -> HeifkitResult<()> {
        // SAFETY: `encoder` is live per the caller.
        let err =
            unsafe { (self.lib.api.heif_encoder_set_lossy_quality)(encoder.as_ptr(), quality) };
        check_heif_error(err, "heif_encoder_set_lossy_quality")
    }

    unsafe fn encoder_set_lossless(&self, encoder: RawEncoder, enable: bool) -> HeifkitResult<()> {
        // SAFETY: `encoder` is live per the caller.
        let err =
            unsafe { (self.lib.api.heif_encoder_set_lossless)(encoder.as_ptr(), enable as c_int) };
        check_heif_error(err, "heif_encoder_set_lossless")
    }

    unsafe fn encoder_set_parameter(
        &self,
        encoder: RawEncoder,
        name: &CStr,
        value: &CStr,
    ) -> HeifkitResult<()> {
        // SAFETY: `encoder` is live per the caller; both strings are NUL-terminated.
        let err = unsafe {
            (self.lib.api.heif_encoder_set_parameter)(
                encoder.as_ptr(),
                name.as_ptr(),
                value.as_ptr(),
            )
        };
        check_heif_error(err, "heif_encoder_set_parameter")
    }

    unsafe fn encode_interleaved(
        &self,
        ctx: RawContext,
        encoder: RawEncoder,
        layout: PixelLayout,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> HeifkitResult<()> {
        let api = &self.lib.api;
        let w = to_c_int(width, "width")?;
        let h = to_c_int(height, "height")?;
        let row_bytes = width as usize * layout.channels();
        if pixels.len() != row_bytes * height as usize {
            return Err(HeifkitError::InvalidArgument(format!(
                "expected {} bytes for a {}x{} raster, got {}",
                row_bytes * height as usize,
                width,
                height,
                pixels.len()
            )));
        }

        let mut guard = ImageGuard {
            lib: &self.lib,
            image: ptr::null_mut(),
        };
        // SAFETY: `guard.image` receives a fresh image that the guard releases.
        let err = unsafe {
            (api.heif_image_create)(
                w,
                h,
                HEIF_COLORSPACE_RGB,
                chroma_for(layout),
                &mut guard.image,
            )
        };
        check_heif_error(err, "heif_image_create")?;

        // SAFETY: the image is live; 8 bits per channel for interleaved RGB(A).
        let err =
            unsafe { (api.heif_image_add_plane)(guard.image, HEIF_CHANNEL_INTERLEAVED, w, h, 8) };
        check_heif_error(err, "heif_image_add_plane")?;

        let mut stride: c_int = 0;
        // SAFETY: the plane was just added; libheif owns the returned memory.
        let plane = unsafe {
            (api.heif_image_get_plane)(guard.image, HEIF_CHANNEL_INTERLEAVED, &mut stride)
        };
        if plane.is_null() {
            return Err(HeifkitError::Allocation(
                "libheif returned no interleaved plane".into(),
            ));
        }
        let stride = plane_stride(stride, row_bytes)?;

        for (y, row) in pixels.chunks_exact(row_bytes).enumerate() {
            // SAFETY: the plane has `height` rows of `stride >= row_bytes` bytes.
            unsafe {
                ptr::copy_nonoverlapping(row.as_ptr(), plane.add(y * stride), row_bytes);
            }
        }

        // SAFETY: context, image and encoder are live; default options and no
        // output handle are accepted by libheif.
        let err = unsafe {
            (api.heif_context_encode_image)(
                ctx.as_ptr(),
                guard.image,
                encoder.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
            )
        };
        if let Err(e) = check_heif_error(err, "heif_context_encode_image") {
            warn!(width, height, error = %e, "libheif rejected image");
            return Err(e);
        }
        Ok(())
    }
}

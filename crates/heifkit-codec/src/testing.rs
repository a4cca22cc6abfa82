//! In-memory [`CodecLibrary`] that counts every acquire and release.

use std::ffi::{c_void, CStr};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use heifkit_core::{CompressionFormat, HeifkitError, HeifkitResult};

use crate::library::{
    CodecLibrary, EncoderDescriptor, PixelLayout, RawBuffer, RawContext, RawEncoder,
};

#[derive(Debug, Default)]
pub(crate) struct RecordingLibrary {
    pub version: String,
    pub hevc_encoder: Option<String>,
    pub av1_encoder: Option<String>,
    pub fail_context_alloc: bool,

    pub contexts_allocated: AtomicUsize,
    pub contexts_freed: AtomicUsize,
    pub buffers_allocated: AtomicUsize,
    pub buffers_freed: AtomicUsize,
    pub encoders_acquired: AtomicUsize,
    pub encoders_released: AtomicUsize,
    pub images_encoded: AtomicUsize,
    pub parameters: Mutex<Vec<(String, String)>>,
    pub layouts: Mutex<Vec<PixelLayout>>,
}

impl RecordingLibrary {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn with_hevc(mut self, name: &str) -> Self {
        self.hevc_encoder = Some(name.to_string());
        self
    }

    pub fn with_av1(mut self, name: &str) -> Self {
        self.av1_encoder = Some(name.to_string());
        self
    }

    pub fn failing_alloc(mut self) -> Self {
        self.fail_context_alloc = true;
        self
    }

    /// A buffer of `len` bytes owned by this library, filled with `fill`.
    pub fn alloc_buffer(&self, len: usize, fill: u8) -> RawBuffer {
        let boxed: Box<[u8]> = vec![fill; len].into_boxed_slice();
        let ptr = NonNull::new(Box::into_raw(boxed) as *mut u8).expect("box pointer is non-null");
        self.buffers_allocated.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the allocation holds `len` initialized bytes and is returned
        // to `free_buffer`, which rebuilds the same box.
        unsafe { RawBuffer::from_raw_parts(ptr, len) }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn encoder_name(&self, format: CompressionFormat) -> Option<&str> {
        match format {
            CompressionFormat::Hevc => self.hevc_encoder.as_deref(),
            CompressionFormat::Av1 => self.av1_encoder.as_deref(),
            _ => None,
        }
    }
}

impl CodecLibrary for RecordingLibrary {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn encoder_descriptors(
        &self,
        format: CompressionFormat,
        max_results: usize,
    ) -> Vec<EncoderDescriptor> {
        self.encoder_name(format)
            .map(|name| EncoderDescriptor {
                name: name.to_string(),
                id_name: name.split_whitespace().next().unwrap_or(name).to_lowercase(),
                format,
                supports_lossy: true,
                supports_lossless: true,
            })
            .into_iter()
            .take(max_results)
            .collect()
    }

    fn have_encoder_for_format(&self, format: CompressionFormat) -> bool {
        self.encoder_name(format).is_some()
    }

    fn have_decoder_for_format(&self, format: CompressionFormat) -> bool {
        matches!(format, CompressionFormat::Hevc | CompressionFormat::Av1)
    }

    fn alloc_context(&self) -> Option<RawContext> {
        if self.fail_context_alloc {
            return None;
        }
        self.contexts_allocated.fetch_add(1, Ordering::SeqCst);
        RawContext::new(Box::into_raw(Box::new(0u64)) as *mut c_void)
    }

    unsafe fn free_context(&self, ctx: RawContext) {
        self.contexts_freed.fetch_add(1, Ordering::SeqCst);
        // SAFETY: every context was created by `alloc_context` as a Box<u64>.
        drop(unsafe { Box::from_raw(ctx.as_ptr() as *mut u64) });
    }

    unsafe fn free_buffer(&self, buffer: RawBuffer) {
        self.buffers_freed.fetch_add(1, Ordering::SeqCst);
        let slice = std::ptr::slice_from_raw_parts_mut(buffer.as_ptr(), buffer.len());
        // SAFETY: every buffer was created by `alloc_buffer` as a Box<[u8]>.
        drop(unsafe { Box::from_raw(slice) });
    }

    unsafe fn write_context(&self, _ctx: RawContext) -> HeifkitResult<RawBuffer> {
        let images = self.images_encoded.load(Ordering::SeqCst);
        if images == 0 {
            return Err(HeifkitError::from_heif(5, 0, "no images in context"));
        }
        Ok(self.alloc_buffer(16 * images, 0xA5))
    }

    unsafe fn encoder_for_format(
        &self,
        _ctx: RawContext,
        format: CompressionFormat,
    ) -> HeifkitResult<RawEncoder> {
        if self.encoder_name(format).is_none() {
            return Err(HeifkitError::from_heif(
                8,
                0,
                format!("no encoder for {}", format),
            ));
        }
        self.encoders_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(RawEncoder::new(Box::into_raw(Box::new(format.as_raw())) as *mut c_void)
            .expect("box pointer is non-null"))
    }

    unsafe fn release_encoder(&self, encoder: RawEncoder) {
        self.encoders_released.fetch_add(1, Ordering::SeqCst);
        // SAFETY: every encoder was created by `encoder_for_format` as a Box<i32>.
        drop(unsafe { Box::from_raw(encoder.as_ptr() as *mut i32) });
    }

    unsafe fn encoder_set_lossy_quality(
        &self,
        _encoder: RawEncoder,
        quality: i32,
    ) -> HeifkitResult<()> {
        self.record("quality", &quality.to_string());
        Ok(())
    }

    unsafe fn encoder_set_lossless(&self, _encoder: RawEncoder, enable: bool) -> HeifkitResult<()> {
        self.record("lossless", &enable.to_string());
        Ok(())
    }

    unsafe fn encoder_set_parameter(
        &self,
        _encoder: RawEncoder,
        name: &CStr,
        value: &CStr,
    ) -> HeifkitResult<()> {
        self.record(&name.to_string_lossy(), &value.to_string_lossy());
        Ok(())
    }

    unsafe fn encode_interleaved(
        &self,
        _ctx: RawContext,
        _encoder: RawEncoder,
        layout: PixelLayout,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> HeifkitResult<()> {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * layout.channels()
        );
        self.images_encoded.fetch_add(1, Ordering::SeqCst);
        self.layouts.lock().expect("layout log poisoned").push(layout);
        Ok(())
    }
}

impl RecordingLibrary {
    fn record(&self, name: &str, value: &str) {
        self.parameters
            .lock()
            .expect("parameter log poisoned")
            .push((name.to_string(), value.to_string()));
    }
}

//! Raw FFI bindings for libheif.
//!
//! Symbols are resolved at runtime via `libloading`, so building heifkit
//! does not require libheif headers or an import library. Only the API
//! surface heifkit actually calls is bound here.
//!
//! Reference: libheif `heif.h` (1.12+).

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;

use libloading::Library;
use tracing::{debug, info};

use heifkit_core::{HeifkitError, HeifkitResult};

// ---------------------------------------------------------------------------
// Enum values we pass across the boundary
// ---------------------------------------------------------------------------

/// `heif_colorspace_RGB`.
pub const HEIF_COLORSPACE_RGB: c_int = 1;

/// `heif_chroma_interleaved_RGB`.
pub const HEIF_CHROMA_INTERLEAVED_RGB: c_int = 10;

/// `heif_chroma_interleaved_RGBA`.
pub const HEIF_CHROMA_INTERLEAVED_RGBA: c_int = 11;

/// `heif_channel_interleaved`.
pub const HEIF_CHANNEL_INTERLEAVED: c_int = 10;

/// `heif_error_Ok`.
pub const HEIF_ERROR_OK: c_int = 0;

/// Version of `struct heif_writer` we fill in.
pub const HEIF_WRITER_API_VERSION: c_int = 1;

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// `struct heif_error`, returned by value from most libheif calls.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HeifErrorRaw {
    pub code: c_int,
    pub subcode: c_int,
    /// Static string owned by libheif (or by us for writer callbacks).
    pub message: *const c_char,
}

impl HeifErrorRaw {
    /// Successful result, for returning from callbacks.
    pub fn ok() -> Self {
        Self {
            code: HEIF_ERROR_OK,
            subcode: 0,
            message: c"Success".as_ptr(),
        }
    }
}

/// Writer callback signature inside `struct heif_writer`.
pub type HeifWriteFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    data: *const c_void,
    size: usize,
    userdata: *mut c_void,
) -> HeifErrorRaw;

/// `struct heif_writer`.
#[repr(C)]
pub struct HeifWriter {
    pub writer_api_version: c_int,
    pub write: HeifWriteFn,
}

/// Convert a libheif error into a `HeifkitResult`.
///
/// `function_name` is only used to enrich the message.
pub fn check_heif_error(err: HeifErrorRaw, function_name: &str) -> HeifkitResult<()> {
    if err.code == HEIF_ERROR_OK {
        return Ok(());
    }
    // SAFETY: libheif always sets `message` to a valid NUL-terminated static
    // string; a null pointer is tolerated anyway.
    let detail = unsafe { c_str_lossy(err.message) };
    Err(HeifkitError::from_heif(
        err.code,
        err.subcode,
        format!("{function_name}: {detail}"),
    ))
}

/// Copy a C string owned by libheif into a `String`. Null becomes `""`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn c_str_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Function table
// ---------------------------------------------------------------------------

/// Function pointers resolved from the loaded library.
pub struct LibheifApi {
    pub heif_get_version: unsafe extern "C" fn() -> *const c_char,
    /// Present since libheif 1.13; plugins are only loaded after calling it.
    pub heif_init: Option<unsafe extern "C" fn(params: *mut c_void) -> HeifErrorRaw>,
    pub heif_deinit: Option<unsafe extern "C" fn()>,

    pub heif_context_get_encoder_descriptors: unsafe extern "C" fn(
        ctx: *mut c_void,
        format_filter: c_int,
        name_filter: *const c_char,
        out_encoders: *mut *const c_void,
        count: c_int,
    ) -> c_int,
    pub heif_encoder_descriptor_get_name: unsafe extern "C" fn(*const c_void) -> *const c_char,
    pub heif_encoder_descriptor_get_id_name: unsafe extern "C" fn(*const c_void) -> *const c_char,
    pub heif_encoder_descriptor_get_compression_format:
        unsafe extern "C" fn(*const c_void) -> c_int,
    pub heif_encoder_descriptor_supports_lossy_compression:
        unsafe extern "C" fn(*const c_void) -> c_int,
    pub heif_encoder_descriptor_supports_lossless_compression:
        unsafe extern "C" fn(*const c_void) -> c_int,
    pub heif_have_encoder_for_format: unsafe extern "C" fn(format: c_int) -> c_int,
    pub heif_have_decoder_for_format: unsafe extern "C" fn(format: c_int) -> c_int,

    pub heif_context_alloc: unsafe extern "C" fn() -> *mut c_void,
    pub heif_context_free: unsafe extern "C" fn(ctx: *mut c_void),
    pub heif_context_write: unsafe extern "C" fn(
        ctx: *mut c_void,
        writer: *mut HeifWriter,
        userdata: *mut c_void,
    ) -> HeifErrorRaw,
    pub heif_context_get_encoder_for_format: unsafe extern "C" fn(
        ctx: *mut c_void,
        format: c_int,
        out_encoder: *mut *mut c_void,
    ) -> HeifErrorRaw,
    pub heif_context_encode_image: unsafe extern "C" fn(
        ctx: *mut c_void,
        image: *const c_void,
        encoder: *mut c_void,
        options: *const c_void,
        out_image_handle: *mut *mut c_void,
    ) -> HeifErrorRaw,

    pub heif_encoder_release: unsafe extern "C" fn(encoder: *mut c_void),
    pub heif_encoder_set_lossy_quality:
        unsafe extern "C" fn(encoder: *mut c_void, quality: c_int) -> HeifErrorRaw,
    pub heif_encoder_set_lossless:
        unsafe extern "C" fn(encoder: *mut c_void, enable: c_int) -> HeifErrorRaw,
    pub heif_encoder_set_parameter: unsafe extern "C" fn(
        encoder: *mut c_void,
        name: *const c_char,
        value: *const c_char,
    ) -> HeifErrorRaw,

    pub heif_image_create: unsafe extern "C" fn(
        width: c_int,
        height: c_int,
        colorspace: c_int,
        chroma: c_int,
        out_image: *mut *mut c_void,
    ) -> HeifErrorRaw,
    pub heif_image_add_plane: unsafe extern "C" fn(
        image: *mut c_void,
        channel: c_int,
        width: c_int,
        height: c_int,
        bit_depth: c_int,
    ) -> HeifErrorRaw,
    pub heif_image_get_plane:
        unsafe extern "C" fn(image: *mut c_void, channel: c_int, out_stride: *mut c_int) -> *mut u8,
    pub heif_image_release: unsafe extern "C" fn(image: *const c_void),
}

/// A loaded libheif shared library plus its resolved function table.
pub struct LibheifLibrary {
    /// Must outlive every call through `api`.
    _lib: Library,
    pub api: LibheifApi,
}

// SAFETY: libheif's global state is initialized once by `heif_init` and
// its API functions are thread-safe for distinct handles. The struct only
// holds the library handle and plain function pointers.
unsafe impl Send for LibheifLibrary {}
unsafe impl Sync for LibheifLibrary {}

impl std::fmt::Debug for LibheifLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibheifLibrary")
            .field("loaded", &true)
            .field("has_init", &self.api.heif_init.is_some())
            .finish()
    }
}

impl LibheifLibrary {
    /// Platform library names tried by [`LibheifLibrary::load`], in order.
    pub fn default_library_names() -> &'static [&'static str] {
        if cfg!(target_os = "windows") {
            &["heif.dll", "libheif.dll"]
        } else if cfg!(target_os = "macos") {
            &["libheif.1.dylib", "libheif.dylib"]
        } else {
            &["libheif.so.1", "libheif.so"]
        }
    }

    /// Load libheif from the default system search path.
    pub fn load() -> HeifkitResult<Self> {
        let mut failures = Vec::new();
        for name in Self::default_library_names() {
            // SAFETY: loading the system libheif; its initializers only set up
            // static plugin registries.
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    info!(library = %name, "Loaded libheif");
                    return Self::load_functions(lib);
                }
                Err(e) => {
                    debug!(library = %name, error = %e, "libheif candidate not loadable");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        Err(HeifkitError::ModuleInit(format!(
            "libheif not found ({}). Is libheif installed?",
            failures.join("; ")
        )))
    }

    /// Load from a specific path (non-standard installs, bundled builds).
    pub fn load_from(path: &Path) -> HeifkitResult<Self> {
        info!(path = %path.display(), "Loading libheif from custom path");

        // SAFETY: the caller asserts this is a libheif build.
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            HeifkitError::ModuleInit(format!("failed to load {}: {e}", path.display()))
        })?;

        Self::load_functions(lib)
    }

    fn load_functions(lib: Library) -> HeifkitResult<Self> {
        // SAFETY (applies to every lookup below): each symbol is read with the
        // signature declared for it in heif.h, as typed on `LibheifApi`.
        let api = LibheifApi {
            heif_get_version: unsafe { required(&lib, "heif_get_version")? },
            heif_init: unsafe { optional(&lib, "heif_init") },
            heif_deinit: unsafe { optional(&lib, "heif_deinit") },
            heif_context_get_encoder_descriptors: unsafe {
                required(&lib, "heif_context_get_encoder_descriptors")?
            },
            heif_encoder_descriptor_get_name: unsafe {
                required(&lib, "heif_encoder_descriptor_get_name")?
            },
            heif_encoder_descriptor_get_id_name: unsafe {
                required(&lib, "heif_encoder_descriptor_get_id_name")?
            },
            heif_encoder_descriptor_get_compression_format: unsafe {
                required(&lib, "heif_encoder_descriptor_get_compression_format")?
            },
            heif_encoder_descriptor_supports_lossy_compression: unsafe {
                required(&lib, "heif_encoder_descriptor_supports_lossy_compression")?
            },
            heif_encoder_descriptor_supports_lossless_compression: unsafe {
                required(&lib, "heif_encoder_descriptor_supports_lossless_compression")?
            },
            heif_have_encoder_for_format: unsafe {
                required(&lib, "heif_have_encoder_for_format")?
            },
            heif_have_decoder_for_format: unsafe {
                required(&lib, "heif_have_decoder_for_format")?
            },
            heif_context_alloc: unsafe { required(&lib, "heif_context_alloc")? },
            heif_context_free: unsafe { required(&lib, "heif_context_free")? },
            heif_context_write: unsafe { required(&lib, "heif_context_write")? },
            heif_context_get_encoder_for_format: unsafe {
                required(&lib, "heif_context_get_encoder_for_format")?
            },
            heif_context_encode_image: unsafe { required(&lib, "heif_context_encode_image")? },
            heif_encoder_release: unsafe { required(&lib, "heif_encoder_release")? },
            heif_encoder_set_lossy_quality: unsafe {
                required(&lib, "heif_encoder_set_lossy_quality")?
            },
            heif_encoder_set_lossless: unsafe { required(&lib, "heif_encoder_set_lossless")? },
            heif_encoder_set_parameter: unsafe { required(&lib, "heif_encoder_set_parameter")? },
            heif_image_create: unsafe { required(&lib, "heif_image_create")? },
            heif_image_add_plane: unsafe { required(&lib, "heif_image_add_plane")? },
            heif_image_get_plane: unsafe { required(&lib, "heif_image_get_plane")? },
            heif_image_release: unsafe { required(&lib, "heif_image_release")? },
        };

        if let Some(init) = api.heif_init {
            // SAFETY: a null params pointer requests the default plugin setup.
            let err = unsafe { init(std::ptr::null_mut()) };
            check_heif_error(err, "heif_init")
                .map_err(|e| HeifkitError::ModuleInit(e.to_string()))?;
            debug!("heif_init completed");
        }

        Ok(Self { _lib: lib, api })
    }
}

/// Resolve a required symbol, failing module init when it is missing.
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn required<T: Copy>(lib: &Library, name: &str) -> HeifkitResult<T> {
    // SAFETY: forwarded to the caller.
    let symbol: libloading::Symbol<'_, T> = unsafe { lib.get(name.as_bytes()) }.map_err(|e| {
        HeifkitError::ModuleInit(format!("missing libheif symbol {name}: {e}"))
    })?;
    Ok(*symbol)
}

/// Resolve a symbol that older libheif builds do not export.
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn optional<T: Copy>(lib: &Library, name: &str) -> Option<T> {
    // SAFETY: forwarded to the caller.
    unsafe { lib.get::<T>(name.as_bytes()) }.ok().map(|symbol| *symbol)
}

impl Drop for LibheifLibrary {
    fn drop(&mut self) {
        if let Some(deinit) = self.api.heif_deinit {
            // SAFETY: paired with the successful heif_init in load_functions;
            // the library is still mapped because `_lib` drops after this.
            unsafe { deinit() };
            debug!("heif_deinit completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ok_error() {
        assert!(check_heif_error(HeifErrorRaw::ok(), "heif_test").is_ok());
    }

    #[test]
    fn check_failure_carries_function_name() {
        let raw = HeifErrorRaw {
            code: 5,
            subcode: 0,
            message: c"Usage error".as_ptr(),
        };
        let err = check_heif_error(raw, "heif_context_write").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("heif_context_write"));
        assert!(msg.contains("Usage error"));
    }

    #[test]
    fn null_message_is_tolerated() {
        let raw = HeifErrorRaw {
            code: 9,
            subcode: 0,
            message: std::ptr::null(),
        };
        assert!(check_heif_error(raw, "heif_encode").is_err());
    }

    #[test]
    fn load_from_missing_path_is_module_init_error() {
        let err = LibheifLibrary::load_from(Path::new("/nonexistent/libheif.so.1")).unwrap_err();
        assert!(matches!(err, HeifkitError::ModuleInit(_)));
    }

    #[test]
    fn default_names_are_platform_specific() {
        assert!(!LibheifLibrary::default_library_names().is_empty());
    }
}

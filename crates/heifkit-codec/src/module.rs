//! The heifkit module: a loaded codec library plus its published `lib_info`.
//!
//! A [`HeifModule`] is built by parameterized construction, so independent
//! instances can coexist (tests build them over a recording library). A
//! single process-wide instance may additionally be installed with
//! [`install`] and read back lock-free with [`global`].

use std::sync::{Arc, OnceLock};

use tracing::info;

use heifkit_core::{CompressionFormat, HeifkitError, HeifkitResult, LibraryConfig};

use crate::context::EncodeContext;
use crate::info::{build_version_info, VersionInfo};
use crate::libheif::Libheif;
use crate::library::{CodecLibrary, EncoderDescriptor};

/// Name the module reports for itself.
pub const MODULE_NAME: &str = "heifkit";

/// Name of the attribute that publishes the [`VersionInfo`] table.
pub const LIB_INFO_ATTR: &str = "lib_info";

static GLOBAL: OnceLock<HeifModule> = OnceLock::new();

/// A loaded codec library and the metadata collected from it at init.
pub struct HeifModule {
    library: Arc<dyn CodecLibrary>,
    lib_info: VersionInfo,
}

impl std::fmt::Debug for HeifModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeifModule")
            .field("name", &MODULE_NAME)
            .field("lib_info", &self.lib_info)
            .finish()
    }
}

impl HeifModule {
    /// Initialize over an already-loaded library. Runs the reporter once.
    ///
    /// # Errors
    /// `HeifkitError::ModuleInit` when the library metadata is unusable; no
    /// partially initialized module is returned.
    pub fn init(library: Arc<dyn CodecLibrary>) -> HeifkitResult<Self> {
        let lib_info = build_version_info(library.as_ref())?;
        info!(
            module = MODULE_NAME,
            version = %lib_info.codec_library_version(),
            hevc = %lib_info.hevc_encoder_name(),
            av1 = %lib_info.av1_encoder_name(),
            "Module initialized"
        );
        Ok(Self { library, lib_info })
    }

    /// Load libheif as configured, then [`HeifModule::init`].
    pub fn load(config: &LibraryConfig) -> HeifkitResult<Self> {
        let library = Libheif::load(config)?;
        Self::init(Arc::new(library))
    }

    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    pub fn lib_info(&self) -> &VersionInfo {
        &self.lib_info
    }

    /// Look up a published attribute by name. Only `lib_info` exists.
    pub fn attribute(&self, name: &str) -> Option<&VersionInfo> {
        (name == LIB_INFO_ATTR).then_some(&self.lib_info)
    }

    pub fn library(&self) -> &Arc<dyn CodecLibrary> {
        &self.library
    }

    pub fn have_encoder_for_format(&self, format: CompressionFormat) -> bool {
        self.library.have_encoder_for_format(format)
    }

    pub fn have_decoder_for_format(&self, format: CompressionFormat) -> bool {
        self.library.have_decoder_for_format(format)
    }

    pub fn encoder_descriptors(
        &self,
        format: CompressionFormat,
        max_results: usize,
    ) -> Vec<EncoderDescriptor> {
        self.library.encoder_descriptors(format, max_results)
    }

    /// A fresh encoding context bound to this module's library.
    pub fn new_encode_context(&self) -> HeifkitResult<EncodeContext> {
        EncodeContext::new(self.library.clone())
    }
}

/// Install `module` as the process-wide instance.
///
/// # Errors
/// `HeifkitError::ModuleInit` if a module is already installed.
pub fn install(module: HeifModule) -> HeifkitResult<&'static HeifModule> {
    let mut installed_now = false;
    let installed = GLOBAL.get_or_init(|| {
        installed_now = true;
        module
    });
    if !installed_now {
        return Err(HeifkitError::ModuleInit(format!(
            "{} module is already initialized",
            MODULE_NAME
        )));
    }
    Ok(installed)
}

/// The process-wide module, if one was installed.
pub fn global() -> Option<&'static HeifModule> {
    GLOBAL.get()
}

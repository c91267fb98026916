//! Dynamic library scanning with libloading.

use super::LocationScanner;
use crate::classpath::Location;
use crate::error::LoadError;
use crate::plugins::{
    check_plugin_abi_compatibility, PluginDeclaration, PluginType, PLUGIN_DECLARATION_SYMBOL,
};
use libloading::{Library, Symbol};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Scans classpath locations for plugin libraries.
///
/// Each library is opened with a private symbol namespace (`RTLD_LOCAL` on unix), so
/// symbols it bundles never bind to same-named symbols of the host or of other
/// locations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibScanner;

impl DylibScanner {
    pub fn new() -> Self {
        Self
    }

    /// Whether `path` carries the platform's dynamic library extension
    pub fn is_library(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == std::env::consts::DLL_EXTENSION)
    }

    /// Open one library and collect the types it declares
    pub fn open(&self, location: &Location, path: &Path) -> Result<Vec<PluginType>, LoadError> {
        debug!(path = %path.display(), "Opening plugin library");

        // SAFETY: plugin libraries are trusted deployment artifacts; their initializers
        // run here, once per library.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            error!(path = %path.display(), error = %e, "Plugin library could not be opened");
            LoadError::Library(e)
        })?;

        // SAFETY: the symbol is the `PluginDeclaration` static emitted by
        // `export_realm_plugin!`, and the ABI check below runs before any field other
        // than the version strings is used.
        let declaration: PluginDeclaration = unsafe {
            let symbol: Symbol<*const PluginDeclaration> = library.get(PLUGIN_DECLARATION_SYMBOL)?;
            symbol.read()
        };
        check_plugin_abi_compatibility(&declaration).map_err(|e| {
            error!(path = %path.display(), error = %e, "Plugin library rejected");
            e
        })?;

        let library = Arc::new(library);
        let mut declared: Vec<PluginType> = Vec::new();
        (declaration.register)(&mut declared);

        info!(
            path = %path.display(),
            types = declared.len(),
            "Plugin library loaded"
        );

        Ok(declared
            .into_iter()
            .map(|t| t.declared_at(location, Some(library.clone())))
            .collect())
    }
}

impl LocationScanner for DylibScanner {
    fn scan(&self, location: &Location) -> Result<Vec<PluginType>, LoadError> {
        let Some(path) = location.to_path() else {
            debug!(location = %location, "Location has no filesystem path, skipped");
            return Ok(Vec::new());
        };
        if !path.exists() {
            debug!(location = %location, "Location does not exist, skipped");
            return Ok(Vec::new());
        }

        if !location.is_directory() {
            if Self::is_library(&path) {
                return self.open(location, &path);
            }
            return Ok(Vec::new());
        }

        let mut libraries = Vec::new();
        for entry in std::fs::read_dir(&path)? {
            let candidate = entry?.path();
            if candidate.is_file() && Self::is_library(&candidate) {
                libraries.push(candidate);
            }
        }
        // directory listing order is unspecified
        libraries.sort();

        let mut types = Vec::new();
        for library in libraries {
            types.extend(self.open(location, &library)?);
        }
        Ok(types)
    }
}

//! Native library binding.
//!
//! Modules bind native libraries lazily, the first time their code needs one.
//! The path comes from the resolver registered for that module, or from the
//! runtime-wide default resolver. A failed binding fails only that binding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::{Mutex, RwLock};

use crate::{Module, ModuleIdentity, RuntimeError};

/// Maps a logical native library name to a file on disk.
pub trait NativeResolve: Send + Sync {
	fn resolve(&self, library: &str, requester: &ModuleIdentity) -> Option<PathBuf>;
}

/// A bound native library.
#[derive(Debug, Clone)]
pub struct NativeBinding {
	library: String,
	path: PathBuf,
	#[allow(dead_code, reason = "keeps the library mapped for the process lifetime")]
	handle: Arc<Library>,
}

impl NativeBinding {
	pub fn library(&self) -> &str {
		&self.library
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[derive(Default)]
pub(crate) struct NativeBinder {
	per_module: RwLock<HashMap<String, Arc<dyn NativeResolve>>>,
	fallback: RwLock<Option<Arc<dyn NativeResolve>>>,
	loaded: Mutex<HashMap<PathBuf, Arc<Library>>>,
}

impl NativeBinder {
	pub fn set_for_module(&self, module: &str, resolver: Arc<dyn NativeResolve>) {
		self.per_module.write().insert(module.to_string(), resolver);
	}

	pub fn set_fallback(&self, resolver: Arc<dyn NativeResolve>) {
		*self.fallback.write() = Some(resolver);
	}

	pub fn has_resolver(&self, module: &str) -> bool {
		self.per_module.read().contains_key(module)
	}

	pub fn bind(&self, module: &Module, library: &str) -> Result<NativeBinding, RuntimeError> {
		let resolver = self.per_module.read().get(module.name()).cloned().or_else(|| self.fallback.read().clone());
		let unavailable = || RuntimeError::NativeLibraryUnavailable {
			library: library.to_string(),
			module: module.name().to_string(),
		};

		let path = resolver.and_then(|r| r.resolve(library, module.identity())).ok_or_else(unavailable)?;

		if let Some(handle) = self.loaded.lock().get(&path).cloned() {
			return Ok(NativeBinding {
				library: library.to_string(),
				path,
				handle,
			});
		}

		// SAFETY: loading runs the library's initializers. Libraries come from
		// the host's own native directory, the same trust boundary as the
		// modules that import them.
		let handle = unsafe { Library::new(&path) }.map_err(|source| RuntimeError::NativeLoad { path: path.clone(), source })?;
		let handle = Arc::new(handle);
		self.loaded.lock().insert(path.clone(), Arc::clone(&handle));
		tracing::debug!(library, path = %path.display(), module = module.name(), "native.bind");

		Ok(NativeBinding {
			library: library.to_string(),
			path,
			handle,
		})
	}
}

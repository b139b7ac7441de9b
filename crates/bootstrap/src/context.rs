use std::path::{Path, PathBuf};
use std::sync::Arc;

use duet_runtime::{MODULE_EXTENSION, Module, ModuleIdentity, ResolutionRequest, ResolveContext, Runtime, RuntimeError};

/// Callback consulted before the directory probe.
pub type ResolverCallback = Box<dyn Fn(&Runtime, &ModuleIdentity) -> Result<Option<Arc<Module>>, RuntimeError> + Send + Sync>;

/// Resolution context active while subsystem B starts.
///
/// First match wins: the callback, then `<probe_dir>/<name>.dll`. When both
/// miss the runtime continues with its default resolution.
pub struct ModuleLoadContext {
	name: String,
	probe_dir: PathBuf,
	resolver: Option<ResolverCallback>,
}

impl ModuleLoadContext {
	pub fn new(name: impl Into<String>, probe_dir: impl Into<PathBuf>) -> Self {
		Self {
			name: name.into(),
			probe_dir: probe_dir.into(),
			resolver: None,
		}
	}

	pub fn with_resolver<F>(mut self, resolver: F) -> Self
	where
		F: Fn(&Runtime, &ModuleIdentity) -> Result<Option<Arc<Module>>, RuntimeError> + Send + Sync + 'static,
	{
		self.resolver = Some(Box::new(resolver));
		self
	}

	pub fn probe_dir(&self) -> &Path {
		&self.probe_dir
	}

	/// Resolves `identity`, returning `None` when neither the callback nor
	/// the probe directory provides it.
	pub fn resolve_identity(&self, runtime: &Runtime, identity: &ModuleIdentity) -> Result<Option<Arc<Module>>, RuntimeError> {
		tracing::trace!(context = %self.name, module = %identity, "load_context.resolve");

		if let Some(resolver) = &self.resolver
			&& let Some(module) = resolver(runtime, identity)?
		{
			tracing::trace!(context = %self.name, module = %module.identity(), source = "callback", "load_context.resolved");
			return Ok(Some(module));
		}

		let candidate = runtime
			.resolve_path(&self.probe_dir)
			.join(format!("{}.{MODULE_EXTENSION}", identity.name()));
		if candidate.is_file() {
			let module = runtime.load_from_path(&candidate)?;
			tracing::trace!(context = %self.name, module = %module.identity(), source = "probe", "load_context.resolved");
			return Ok(Some(module));
		}

		tracing::trace!(context = %self.name, module = %identity, "load_context.not_found");
		Ok(None)
	}
}

impl ResolveContext for ModuleLoadContext {
	fn name(&self) -> &str {
		&self.name
	}

	fn resolve(&self, runtime: &Runtime, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>, RuntimeError> {
		self.resolve_identity(runtime, request.identity)
	}
}

impl std::fmt::Debug for ModuleLoadContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleLoadContext")
			.field("name", &self.name)
			.field("probe_dir", &self.probe_dir)
			.field("resolver", &self.resolver.is_some())
			.finish()
	}
}

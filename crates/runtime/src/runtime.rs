use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::context::{ContextScope, ResolutionRequest, ResolveContext};
use crate::native::{NativeBinder, NativeBinding, NativeResolve};
use crate::{HostMethods, MODULE_EXTENSION, MethodBody, MethodHooks, MethodRef, Module, ModuleIdentity, ModuleImage, ModuleRegistry, RuntimeError, Value, interp};

/// Nested managed calls allowed before execution is aborted.
const MAX_CALL_DEPTH: usize = 256;

/// The execution environment shared by the bootstrap, both subsystems, and
/// the application.
pub struct Runtime {
	base_dir: PathBuf,
	registry: ModuleRegistry,
	hooks: MethodHooks,
	host: HostMethods,
	contexts: Mutex<Vec<Arc<dyn ResolveContext>>>,
	native: NativeBinder,
	depth: AtomicUsize,
}

impl Runtime {
	/// Creates a runtime whose relative paths and default probe resolve
	/// against `base_dir`.
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		Self {
			base_dir: base_dir.into(),
			registry: ModuleRegistry::new(),
			hooks: MethodHooks::default(),
			host: HostMethods::with_intrinsics(),
			contexts: Mutex::new(Vec::new()),
			native: NativeBinder::default(),
			depth: AtomicUsize::new(0),
		}
	}

	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}

	pub fn registry(&self) -> &ModuleRegistry {
		&self.registry
	}

	pub fn hooks(&self) -> &MethodHooks {
		&self.hooks
	}

	pub fn host(&self) -> &HostMethods {
		&self.host
	}

	/// Joins relative paths onto the base directory.
	pub fn resolve_path(&self, path: &Path) -> PathBuf {
		if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) }
	}

	/// Loads the module image at `path` and registers it.
	///
	/// This is the environment's normal load API. A module already registered
	/// from the same location, or under the same name, is returned instead of
	/// a second instance.
	pub fn load_from_path(&self, path: &Path) -> Result<Arc<Module>, RuntimeError> {
		let full = self.resolve_path(path);
		let location = std::fs::canonicalize(&full).unwrap_or(full);

		if let Some(existing) = self.registry.find(|m| m.location() == Some(location.as_path())) {
			tracing::trace!(module = existing.name(), path = %location.display(), "module.load.cached");
			return Ok(existing);
		}

		let image = ModuleImage::read(&location)?;
		let (module, inserted) = self.registry.register_or_existing(Module::new(image, location));
		if inserted {
			tracing::debug!(module = %module.identity(), path = ?module.location(), references = ?module.references(), "module.load");
		} else {
			tracing::debug!(module = module.name(), "module.load.duplicate_name");
		}
		Ok(module)
	}

	/// Resolves a module by identity.
	///
	/// Order: registered instance, active resolution context, default probe
	/// of `<base_dir>/<name>.dll`.
	pub fn resolve(&self, identity: &ModuleIdentity, requester: Option<&ModuleIdentity>) -> Result<Arc<Module>, RuntimeError> {
		if let Some(module) = self.registry.find_by_name(identity.name()) {
			return Ok(module);
		}

		let request = ResolutionRequest { identity, requester };
		if let Some(context) = self.active_context() {
			let resolved = context.resolve(self, &request).map_err(|source| RuntimeError::ContextFailed {
				context: context.name().to_string(),
				identity: identity.clone(),
				source: Box::new(source),
			})?;
			if let Some(module) = resolved {
				return Ok(module);
			}
		}

		let probe = self.base_dir.join(format!("{}.{MODULE_EXTENSION}", identity.name()));
		if probe.is_file() {
			tracing::trace!(module = %identity, path = %probe.display(), "resolve.default_probe");
			return self.load_from_path(&probe);
		}

		tracing::trace!(module = %identity, requester = request.requester_name(), "resolve.not_found");
		Err(RuntimeError::ResolutionFailure {
			identity: identity.clone(),
			requester: request.requester_name().to_string(),
		})
	}

	/// Activates `context` until the returned scope is dropped.
	pub fn enter_context(&self, context: Arc<dyn ResolveContext>) -> ContextScope<'_> {
		let name = context.name().to_string();
		let depth = {
			let mut contexts = self.contexts.lock();
			contexts.push(context);
			contexts.len()
		};
		tracing::debug!(context = %name, depth, "context.enter");
		ContextScope::new(self, depth, name)
	}

	pub(crate) fn exit_context(&self, depth: usize) {
		self.contexts.lock().truncate(depth.saturating_sub(1));
	}

	/// Returns the innermost active resolution context.
	pub fn active_context(&self) -> Option<Arc<dyn ResolveContext>> {
		self.contexts.lock().last().cloned()
	}

	pub fn entry_point(&self, module: &Module) -> Result<MethodRef, RuntimeError> {
		module
			.entry()
			.map(|entry| MethodRef::new(module.name(), entry))
			.ok_or_else(|| RuntimeError::NoEntryPoint(module.name().to_string()))
	}

	/// Invokes the entry point of `module`, passing `args` if it takes them.
	pub fn invoke_entry(&self, module: &Module, args: &[String]) -> Result<Value, RuntimeError> {
		let entry = self.entry_point(module)?;
		let call_args = match self.arity(&entry, Some(module.identity()))? {
			0 => Vec::new(),
			_ => vec![Value::args(args)],
		};
		self.invoke(&entry, call_args)
	}

	/// Invokes a host or managed method.
	pub fn invoke(&self, method: &MethodRef, args: Vec<Value>) -> Result<Value, RuntimeError> {
		self.invoke_from(method, args, None)
	}

	pub(crate) fn invoke_from(&self, method: &MethodRef, args: Vec<Value>, requester: Option<&ModuleIdentity>) -> Result<Value, RuntimeError> {
		let _depth = DepthGuard::enter(&self.depth, method)?;

		if let Some(value) = self.hooks.run_prefixes(self, method, &args)? {
			return Ok(value);
		}

		if let Some(func) = self.host.get(method) {
			let expected = self.host.arity(method).unwrap_or(0);
			check_arity(method, expected, args.len())?;
			return func(self, args);
		}
		if self.host.is_namespace(method.module()) {
			return Err(RuntimeError::MethodNotFound(method.clone()));
		}

		let module = self.resolve(&ModuleIdentity::named(method.module()), requester)?;
		let replaced = self.hooks.body(method);
		let body: &MethodBody = match &replaced {
			Some(body) => body,
			None => module.method(method.name()).ok_or_else(|| RuntimeError::MethodNotFound(method.clone()))?,
		};
		check_arity(method, body.params, args.len())?;
		interp::execute(self, method, &module, body, args)
	}

	/// Returns the number of arguments `method` takes, resolving its module
	/// if needed.
	pub fn arity(&self, method: &MethodRef, requester: Option<&ModuleIdentity>) -> Result<u16, RuntimeError> {
		if let Some(arity) = self.host.arity(method) {
			return Ok(arity);
		}
		if let Some(body) = self.hooks.body(method) {
			return Ok(body.params);
		}
		let module = self.resolve(&ModuleIdentity::named(method.module()), requester)?;
		module
			.method(method.name())
			.map(|body| body.params)
			.ok_or_else(|| RuntimeError::MethodNotFound(method.clone()))
	}

	/// Registers the native library resolver for one module.
	pub fn set_native_resolver(&self, module: &str, resolver: Arc<dyn NativeResolve>) {
		self.native.set_for_module(module, resolver);
	}

	/// Registers the resolver used by modules without their own.
	pub fn set_default_native_resolver(&self, resolver: Arc<dyn NativeResolve>) {
		self.native.set_fallback(resolver);
	}

	pub fn has_native_resolver(&self, module: &str) -> bool {
		self.native.has_resolver(module)
	}

	/// Binds `library` on behalf of `module`.
	pub fn bind_native(&self, module: &Module, library: &str) -> Result<NativeBinding, RuntimeError> {
		self.native.bind(module, library)
	}
}

impl std::fmt::Debug for Runtime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Runtime")
			.field("base_dir", &self.base_dir)
			.field("modules", &self.registry.names())
			.field("contexts", &self.contexts.lock().len())
			.finish_non_exhaustive()
	}
}

fn check_arity(method: &MethodRef, expected: u16, found: usize) -> Result<(), RuntimeError> {
	if usize::from(expected) == found {
		Ok(())
	} else {
		Err(RuntimeError::ArityMismatch {
			method: method.clone(),
			expected,
			found,
		})
	}
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
	fn enter(depth: &'a AtomicUsize, method: &MethodRef) -> Result<Self, RuntimeError> {
		if depth.fetch_add(1, Ordering::SeqCst) >= MAX_CALL_DEPTH {
			depth.fetch_sub(1, Ordering::SeqCst);
			return Err(RuntimeError::CallDepthExceeded(method.clone()));
		}
		Ok(Self(depth))
	}
}

impl Drop for DepthGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

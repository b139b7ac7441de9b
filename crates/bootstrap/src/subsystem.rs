//! Adapter over subsystem B.
//!
//! B is driven through named capabilities its primary module declares in
//! its image's `[capabilities]` table, each mapping to one of its methods:
//!
//! ```toml
//! [capabilities]
//! initialize = "Loader.Create"        # optional, takes the config path if it has a parameter
//! resolve_module = "Loader.Resolve"   # optional, (name) -> module or null
//! full_load = "Loader.FullLoad"       # required
//! load_file = "Strategy.LoadFile"     # required, receives the registry shim
//! ```

use std::sync::Arc;

use duet_runtime::{MethodRef, Module, ModuleIdentity, Runtime, RuntimeError, Value};

use crate::{BootstrapConfig, StageError};

pub const INITIALIZE: &str = "initialize";
pub const RESOLVE_MODULE: &str = "resolve_module";
pub const FULL_LOAD: &str = "full_load";
pub const LOAD_FILE: &str = "load_file";

/// Operations the bootstrap performs on subsystem B.
pub trait ModLoader: Send + Sync {
	fn name(&self) -> &str;

	/// Runs once, before B's resolver is reachable from the load context.
	fn initialize(&self, runtime: &Runtime) -> Result<(), RuntimeError>;

	/// Resolves a module request raised while B's context is active.
	fn resolve_module(&self, runtime: &Runtime, identity: &ModuleIdentity) -> Result<Option<Arc<Module>>, RuntimeError>;

	fn full_load(&self, runtime: &Runtime) -> Result<(), RuntimeError>;
}

/// Builds the adapter for B's primary module.
pub type ModLoaderFactory = Box<dyn Fn(&Runtime, &Arc<Module>, &BootstrapConfig) -> Result<Arc<dyn ModLoader>, StageError>>;

/// The default factory, wrapping the module's declared capabilities.
pub fn scripted_factory() -> ModLoaderFactory {
	Box::new(|_: &Runtime, module: &Arc<Module>, config: &BootstrapConfig| {
		let loader: Arc<dyn ModLoader> = Arc::new(ScriptedModLoader::negotiate(Arc::clone(module), config.mod_loader_config.clone())?);
		Ok(loader)
	})
}

/// Capability methods found on B's primary module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
	pub initialize: Option<MethodRef>,
	pub resolve_module: Option<MethodRef>,
	pub full_load: MethodRef,
}

impl Capabilities {
	/// Reads the capability table. `full_load` is required; every declared
	/// capability must name a method the module defines.
	pub fn negotiate(module: &Module) -> Result<Self, StageError> {
		let lookup = |key: &str| -> Result<Option<MethodRef>, StageError> {
			let Some(method) = module.capability(key) else {
				return Ok(None);
			};
			let method = MethodRef::new(module.name(), method);
			if module.method(method.name()).is_none() {
				return Err(RuntimeError::MethodNotFound(method).into());
			}
			Ok(Some(method))
		};

		let full_load = lookup(FULL_LOAD)?.ok_or_else(|| StageError::MissingCapability {
			module: module.name().to_string(),
			capability: FULL_LOAD.to_string(),
		})?;
		let capabilities = Self {
			initialize: lookup(INITIALIZE)?,
			resolve_module: lookup(RESOLVE_MODULE)?,
			full_load,
		};
		tracing::debug!(
			module = module.name(),
			initialize = capabilities.initialize.is_some(),
			resolve_module = capabilities.resolve_module.is_some(),
			"subsystem.negotiated"
		);
		Ok(capabilities)
	}
}

/// [`ModLoader`] that invokes B's capability methods inside the runtime.
#[derive(Debug)]
pub struct ScriptedModLoader {
	module: Arc<Module>,
	capabilities: Capabilities,
	config_path: String,
}

impl ScriptedModLoader {
	pub fn negotiate(module: Arc<Module>, config_path: impl Into<String>) -> Result<Self, StageError> {
		let capabilities = Capabilities::negotiate(&module)?;
		Ok(Self {
			module,
			capabilities,
			config_path: config_path.into(),
		})
	}

	pub fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}
}

impl ModLoader for ScriptedModLoader {
	fn name(&self) -> &str {
		self.module.name()
	}

	fn initialize(&self, runtime: &Runtime) -> Result<(), RuntimeError> {
		let Some(method) = &self.capabilities.initialize else {
			return Ok(());
		};
		let args = match runtime.arity(method, Some(self.module.identity()))? {
			0 => Vec::new(),
			_ => vec![Value::Str(self.config_path.clone())],
		};
		runtime.invoke(method, args).map(drop)
	}

	fn resolve_module(&self, runtime: &Runtime, identity: &ModuleIdentity) -> Result<Option<Arc<Module>>, RuntimeError> {
		let Some(method) = &self.capabilities.resolve_module else {
			return Ok(None);
		};
		match runtime.invoke(method, vec![Value::Str(identity.name().to_string())])? {
			Value::Module(module) => Ok(Some(module)),
			Value::Null => Ok(None),
			other => Err(RuntimeError::TypeMismatch {
				method: method.clone(),
				expected: "module",
				found: other.kind(),
			}),
		}
	}

	fn full_load(&self, runtime: &Runtime) -> Result<(), RuntimeError> {
		runtime.invoke(&self.capabilities.full_load, Vec::new()).map(drop)
	}
}

use std::path::Path;
use std::sync::Arc;

use duet_runtime::{MethodRef, Module, Runtime, RuntimeError, Value, bare_name};

use crate::PatchError;

/// Prefix on a subsystem's load-file routine that reuses registered modules.
///
/// A request is satisfied from the registry when a module was loaded from
/// the same path, or carries the requested file's bare name under another
/// path. Otherwise the original routine runs unmodified.
#[derive(Debug, Clone)]
pub struct RegistryShim {
	routine: MethodRef,
}

impl RegistryShim {
	pub fn new(routine: MethodRef) -> Self {
		Self { routine }
	}

	pub fn routine(&self) -> &MethodRef {
		&self.routine
	}

	/// Finds a registered module matching `requested` by location or name.
	pub fn lookup(runtime: &Runtime, requested: &Path) -> Option<Arc<Module>> {
		let full = runtime.resolve_path(requested);
		let location = std::fs::canonicalize(&full).unwrap_or(full);
		let name = bare_name(requested);
		runtime
			.registry()
			.find(|module| module.location() == Some(location.as_path()) || name.is_some_and(|name| module.name() == name))
	}

	/// Installs the prefix. The routine's module must already be registered
	/// and the routine must not carry a prefix yet.
	pub fn install(&self, runtime: &Runtime) -> Result<(), PatchError> {
		if runtime.hooks().has_prefix(&self.routine) {
			return Err(PatchError::AlreadyApplied(self.routine.clone()));
		}
		let module = runtime
			.registry()
			.find_by_name(self.routine.module())
			.ok_or_else(|| PatchError::ModuleNotLoaded(self.routine.module().to_string()))?;
		if module.method(self.routine.name()).is_none() {
			return Err(PatchError::MethodMissing(self.routine.clone()));
		}

		let routine = self.routine.clone();
		runtime.hooks().add_prefix(
			self.routine.clone(),
			Arc::new(move |rt: &Runtime, args: &[Value]| {
				let Some(Value::Str(path)) = args.first() else {
					return Err(RuntimeError::TypeMismatch {
						method: routine.clone(),
						expected: "string",
						found: args.first().map_or("nothing", Value::kind),
					});
				};
				let existing = Self::lookup(rt, Path::new(path));
				if let Some(module) = &existing {
					tracing::debug!(routine = %routine, path, module = module.name(), "patch.shim.reused");
				}
				Ok(existing.map(Value::Module))
			}),
		);
		tracing::debug!(routine = %self.routine, "patch.shim.installed");
		Ok(())
	}
}

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::Module;

/// Process-wide registry of loaded modules, keyed by module name.
///
/// At most one module per name. The registry only grows: modules stay owned
/// here for the life of the process. Lookups copy `Arc`s out and never hold
/// the lock across caller code.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
	modules: RwLock<IndexMap<String, Arc<Module>>>,
}

impl ModuleRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn find_by_name(&self, name: &str) -> Option<Arc<Module>> {
		self.modules.read().get(name).cloned()
	}

	/// Returns the first module, in load order, matching `predicate`.
	pub fn find(&self, predicate: impl Fn(&Module) -> bool) -> Option<Arc<Module>> {
		self.snapshot().into_iter().find(|module| predicate(module))
	}

	pub fn contains(&self, name: &str) -> bool {
		self.modules.read().contains_key(name)
	}

	/// Returns all modules in load order.
	pub fn snapshot(&self) -> Vec<Arc<Module>> {
		self.modules.read().values().cloned().collect()
	}

	/// Returns all module names in load order.
	pub fn names(&self) -> Vec<String> {
		self.modules.read().keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.modules.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.modules.read().is_empty()
	}

	/// Registers `module` unless its name is taken.
	///
	/// Returns the registered instance and whether it was newly inserted. On a
	/// name collision the existing instance wins and `module` is dropped.
	pub(crate) fn register_or_existing(&self, module: Module) -> (Arc<Module>, bool) {
		let mut modules = self.modules.write();
		if let Some(existing) = modules.get(module.name()) {
			return (Arc::clone(existing), false);
		}
		let module = Arc::new(module);
		modules.insert(module.name().to_string(), Arc::clone(&module));
		(module, true)
	}
}

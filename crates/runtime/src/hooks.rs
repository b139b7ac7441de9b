//! Method hooks.
//!
//! Two kinds of interception, both permanent once installed:
//!
//! * a prefix runs before a method and may short-circuit it with a value;
//! * a body replacement swaps the instruction stream the runtime executes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{MethodBody, MethodRef, Runtime, RuntimeError, Value};

/// Prefix hook. Returning `Some(value)` skips the original method.
pub type Prefix = Arc<dyn Fn(&Runtime, &[Value]) -> Result<Option<Value>, RuntimeError> + Send + Sync>;

#[derive(Default)]
pub struct MethodHooks {
	prefixes: RwLock<HashMap<MethodRef, Vec<Prefix>>>,
	bodies: RwLock<HashMap<MethodRef, Arc<MethodBody>>>,
}

impl MethodHooks {
	pub fn add_prefix(&self, method: MethodRef, prefix: Prefix) {
		tracing::debug!(%method, "hooks.prefix");
		self.prefixes.write().entry(method).or_default().push(prefix);
	}

	/// Replaces the body of `method`. Each method can be replaced once.
	pub fn replace_body(&self, method: MethodRef, body: MethodBody) -> Result<(), RuntimeError> {
		let mut bodies = self.bodies.write();
		if bodies.contains_key(&method) {
			return Err(RuntimeError::AlreadyPatched(method));
		}
		tracing::debug!(%method, len = body.body.len(), "hooks.replace_body");
		bodies.insert(method, Arc::new(body));
		Ok(())
	}

	pub fn body(&self, method: &MethodRef) -> Option<Arc<MethodBody>> {
		self.bodies.read().get(method).cloned()
	}

	pub fn is_replaced(&self, method: &MethodRef) -> bool {
		self.bodies.read().contains_key(method)
	}

	pub fn has_prefix(&self, method: &MethodRef) -> bool {
		self.prefixes.read().get(method).is_some_and(|list| !list.is_empty())
	}

	/// Runs prefixes in installation order until one short-circuits.
	pub(crate) fn run_prefixes(&self, runtime: &Runtime, method: &MethodRef, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
		let Some(prefixes) = self.prefixes.read().get(method).cloned() else {
			return Ok(None);
		};
		for prefix in prefixes {
			if let Some(value) = prefix(runtime, args)? {
				tracing::trace!(%method, "hooks.prefix.short_circuit");
				return Ok(Some(value));
			}
		}
		Ok(None)
	}
}

impl std::fmt::Debug for MethodHooks {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MethodHooks")
			.field("prefixes", &self.prefixes.read().len())
			.field("bodies", &self.bodies.read().len())
			.finish()
	}
}

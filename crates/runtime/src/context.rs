//! Resolution contexts.
//!
//! A resolution context customizes how requests for modules that are not yet
//! registered are satisfied. Contexts are activated for a scope through
//! [`Runtime::enter_context`]; the innermost active context is consulted
//! before the runtime's default directory probe.

use std::sync::Arc;

use crate::{Module, ModuleIdentity, Runtime, RuntimeError};

/// A request for a module that code executing in the runtime referenced.
///
/// Created and consumed synchronously inside one resolution call.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest<'a> {
	pub identity: &'a ModuleIdentity,
	pub requester: Option<&'a ModuleIdentity>,
}

impl ResolutionRequest<'_> {
	pub fn requester_name(&self) -> &str {
		self.requester.map_or("<host>", ModuleIdentity::name)
	}
}

/// Resolution policy consulted for unresolved module requests.
///
/// Implementations are called reentrantly from inside other loads and must
/// not hold locks across calls back into the runtime.
pub trait ResolveContext: Send + Sync {
	fn name(&self) -> &str;

	/// Returns the module for the request, or `None` to let the runtime
	/// continue with default resolution.
	fn resolve(&self, runtime: &Runtime, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>, RuntimeError>;
}

/// Guard for an active resolution context.
///
/// Deactivates the context when dropped, on every exit path.
#[must_use = "the context is deactivated when the scope is dropped"]
pub struct ContextScope<'rt> {
	runtime: &'rt Runtime,
	depth: usize,
	name: String,
}

impl<'rt> ContextScope<'rt> {
	pub(crate) fn new(runtime: &'rt Runtime, depth: usize, name: String) -> Self {
		Self { runtime, depth, name }
	}
}

impl Drop for ContextScope<'_> {
	fn drop(&mut self) {
		tracing::debug!(context = %self.name, depth = self.depth, "context.exit");
		self.runtime.exit_context(self.depth);
	}
}

use duet_runtime::{Instruction, MethodBody, Runtime};

use crate::{PatchError, PatchTarget};

/// Result of applying an [`EntryPatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
	/// The body was truncated after the matched call site.
	Applied { kept: usize, dropped: usize },
	/// The call site was not found; the function runs unchanged.
	NotApplicable,
}

/// Truncates a function after one of its dynamic-invoke call sites.
///
/// Everything up to and including the matched call runs as before; then the
/// call's result is popped and the function returns. Instructions after the
/// call site become unreachable.
#[derive(Debug, Clone)]
pub struct EntryPatcher {
	target: PatchTarget,
}

impl EntryPatcher {
	pub fn new(target: PatchTarget) -> Self {
		Self { target }
	}

	pub fn target(&self) -> &PatchTarget {
		&self.target
	}

	/// Rewrites `instructions`, or returns `None` if the call site does not
	/// occur often enough.
	pub fn rewrite(&self, instructions: &[Instruction]) -> Option<Vec<Instruction>> {
		let cut = instructions
			.iter()
			.enumerate()
			.filter(|(_, instruction)| instruction.calls(self.target.pattern()))
			.nth(self.target.occurrence() - 1)
			.map(|(index, _)| index)?;

		let mut patched = Vec::with_capacity(cut + 3);
		patched.extend_from_slice(&instructions[..=cut]);
		patched.push(Instruction::Pop);
		patched.push(Instruction::Ret);
		Some(patched)
	}

	/// Installs the rewritten body into `runtime`.
	///
	/// The target module must already be registered. A missing call site is
	/// not an error: the original body stays in place.
	pub fn apply(&self, runtime: &Runtime) -> Result<PatchOutcome, PatchError> {
		let method = self.target.method();
		let module = runtime
			.registry()
			.find_by_name(method.module())
			.ok_or_else(|| PatchError::ModuleNotLoaded(method.module().to_string()))?;
		let original = module.method(method.name()).ok_or_else(|| PatchError::MethodMissing(method.clone()))?;

		if runtime.hooks().is_replaced(method) {
			return Err(PatchError::AlreadyApplied(method.clone()));
		}

		let Some(rewritten) = self.rewrite(&original.body) else {
			tracing::trace!(target = %self.target, "patch.entry.not_applicable");
			return Ok(PatchOutcome::NotApplicable);
		};

		let kept = rewritten.len() - 2;
		let dropped = original.body.len() - kept;
		runtime.hooks().replace_body(
			method.clone(),
			MethodBody {
				params: original.params,
				body: rewritten,
			},
		)?;
		tracing::debug!(target = %self.target, kept, dropped, "patch.entry.applied");
		Ok(PatchOutcome::Applied { kept, dropped })
	}
}

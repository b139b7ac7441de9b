use std::fmt;

use duet_runtime::MethodRef;

/// A function to patch plus the call site that ends it.
///
/// The rewrite rule is "after occurrence `n` of a call to `pattern`, discard
/// the result and return". Targets are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
	method: MethodRef,
	pattern: MethodRef,
	occurrence: usize,
}

impl PatchTarget {
	/// Targets the first call to `pattern` inside `method`.
	pub fn new(method: MethodRef, pattern: MethodRef) -> Self {
		Self {
			method,
			pattern,
			occurrence: 1,
		}
	}

	/// Targets the `n`th (1-based) call instead of the first. Zero is treated
	/// as one.
	pub fn nth(self, n: usize) -> Self {
		Self {
			occurrence: n.max(1),
			..self
		}
	}

	pub fn method(&self) -> &MethodRef {
		&self.method
	}

	pub fn pattern(&self) -> &MethodRef {
		&self.pattern
	}

	pub fn occurrence(&self) -> usize {
		self.occurrence
	}
}

impl fmt::Display for PatchTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} after call #{} to {}", self.method, self.occurrence, self.pattern)
	}
}

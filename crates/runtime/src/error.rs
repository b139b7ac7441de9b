use std::path::PathBuf;

use thiserror::Error;

use crate::{MethodRef, ModuleIdentity};

/// Errors raised by the runtime while loading, resolving, or executing code.
#[derive(Error, Debug)]
pub enum RuntimeError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid module image {}: {source}", path.display())]
	Image {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid method reference `{0}`")]
	InvalidMethodRef(String),

	#[error("could not resolve module {identity} (requested by {requester})")]
	ResolutionFailure { identity: ModuleIdentity, requester: String },

	#[error("resolution context `{context}` failed while resolving {identity}")]
	ContextFailed {
		context: String,
		identity: ModuleIdentity,
		#[source]
		source: Box<RuntimeError>,
	},

	#[error("method not found: {0}")]
	MethodNotFound(MethodRef),

	#[error("module {0} has no entry point")]
	NoEntryPoint(String),

	#[error("{method} takes {expected} arguments, got {found}")]
	ArityMismatch { method: MethodRef, expected: u16, found: usize },

	#[error("argument {index} out of range in {method}")]
	ArgumentOutOfRange { method: MethodRef, index: u16 },

	#[error("stack underflow in {0}")]
	StackUnderflow(MethodRef),

	#[error("{method}: expected {expected}, found {found}")]
	TypeMismatch {
		method: MethodRef,
		expected: &'static str,
		found: &'static str,
	},

	#[error("call depth limit exceeded at {0}")]
	CallDepthExceeded(MethodRef),

	#[error("{method} threw: {message}")]
	Thrown { method: MethodRef, message: String },

	#[error("{method} failed: {message}")]
	Host { method: MethodRef, message: String },

	#[error("body of {0} is already replaced")]
	AlreadyPatched(MethodRef),

	#[error("native library `{library}` is unavailable for {module}")]
	NativeLibraryUnavailable { library: String, module: String },

	#[error("failed to load native library {}: {source}", path.display())]
	NativeLoad {
		path: PathBuf,
		#[source]
		source: libloading::Error,
	},

	#[error("task result already consumed")]
	TaskConsumed,

	#[error("failed to start task runtime: {0}")]
	TaskRuntime(#[source] std::io::Error),
}

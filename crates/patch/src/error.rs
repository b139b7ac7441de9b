use duet_runtime::{MethodRef, RuntimeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
	#[error("patch target module `{0}` is not loaded")]
	ModuleNotLoaded(String),

	#[error("patch target method {0} does not exist")]
	MethodMissing(MethodRef),

	#[error("{0} is already patched")]
	AlreadyApplied(MethodRef),

	#[error(transparent)]
	Runtime(#[from] RuntimeError),
}

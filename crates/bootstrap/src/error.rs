use std::path::PathBuf;

use duet_patch::PatchError;
use duet_runtime::RuntimeError;
use thiserror::Error;

use crate::{ConfigError, LoadStage};

/// Failure of a single stage.
#[derive(Error, Debug)]
pub enum StageError {
	#[error(transparent)]
	Runtime(#[from] RuntimeError),

	#[error(transparent)]
	Patch(#[from] PatchError),

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("failed to list modules in {}: {source}", path.display())]
	ListModules {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("module `{0}` was not preloaded")]
	MissingModule(String),

	#[error("module `{module}` does not offer the required `{capability}` capability")]
	MissingCapability { module: String, capability: String },

	#[error("environment variable {0} is not set")]
	MissingAppPath(String),

	#[error("application path {} has no file name", .0.display())]
	InvalidAppPath(PathBuf),
}

#[derive(Error, Debug)]
pub enum BootstrapError {
	#[error("{stage} crashed")]
	Stage {
		stage: LoadStage,
		#[source]
		source: StageError,
	},

	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl BootstrapError {
	/// The stage that failed, if the failure happened inside a run.
	pub fn stage(&self) -> Option<LoadStage> {
		match self {
			Self::Stage { stage, .. } => Some(*stage),
			Self::Config(_) => None,
		}
	}
}

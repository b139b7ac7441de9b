use std::path::{Path, PathBuf};

use duet_runtime::MethodRef;
use serde::Deserialize;
use thiserror::Error;

use crate::LoadStage;
use crate::native::{ALWAYS_UNAVAILABLE, Os, Platform};
use crate::subsystem::LOAD_FILE;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "DUET_CONFIG";
/// Configuration file probed in the base directory.
pub const CONFIG_FILE: &str = "duet.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("subsystem_order must name each subsystem exactly once, got {0:?}")]
	InvalidOrder(Vec<Subsystem>),

	#[error("invoke_pattern `{0}` is not a `module::Method` reference")]
	InvalidPattern(String),
}

/// One of the two loader subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
	/// Subsystem A, driven through its patched entry point.
	Chainloader,
	/// Subsystem B, driven through its negotiated capabilities.
	ModLoader,
}

impl Subsystem {
	pub fn stage(self) -> LoadStage {
		match self {
			Self::Chainloader => LoadStage::SubsystemA,
			Self::ModLoader => LoadStage::SubsystemB,
		}
	}
}

/// Module loaded into B's context before B starts, unless a module of the
/// same name is already registered. A missing file is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupportModule {
	pub path: PathBuf,
	/// Used instead of `path` on Windows.
	#[serde(default)]
	pub windows_path: Option<PathBuf>,
}

impl SupportModule {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			windows_path: None,
		}
	}

	pub fn with_windows_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.windows_path = Some(path.into());
		self
	}

	/// Location of the module on `platform`.
	pub fn path_for(&self, platform: &Platform) -> &Path {
		match (platform.os(), &self.windows_path) {
			(Os::Windows, Some(path)) => path,
			_ => &self.path,
		}
	}

	/// The management support module, shipped per platform.
	pub fn management() -> Self {
		Self::new("System.Management.dll").with_windows_path(["runtimes", "win", "lib", "net9.0", "System.Management.dll"].iter().collect::<PathBuf>())
	}
}

/// Bootstrap settings. Every field has a default, so an empty file (or no
/// file at all) yields the standard layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
	/// Overrides the working directory as the base for relative paths.
	pub base_dir: Option<PathBuf>,
	/// Subsystem A's primary module.
	pub chainloader: PathBuf,
	/// Call site in A's entry after which the entry returns.
	pub invoke_pattern: String,
	/// Directory whose `*.dll` modules make up subsystem B.
	pub mod_loader_dir: PathBuf,
	/// Name of B's primary module; must be one of the modules in `mod_loader_dir`.
	pub mod_loader_module: String,
	/// Passed to B's initialize capability.
	pub mod_loader_config: String,
	/// Optional modules loaded into B's context before it starts.
	pub support_modules: Vec<SupportModule>,
	/// Capability key of B's load-file routine.
	pub load_file_capability: String,
	/// Root holding `<triple>/native` library directories.
	pub native_root: PathBuf,
	/// Environment variable carrying the application module path.
	pub app_path_env: String,
	pub crash_log: PathBuf,
	/// Native libraries reported unavailable regardless of the filesystem.
	pub denied_native_libraries: Vec<String>,
	pub subsystem_order: Vec<Subsystem>,
}

impl Default for BootstrapConfig {
	fn default() -> Self {
		Self {
			base_dir: None,
			chainloader: PathBuf::from("ChainLoader.dll"),
			invoke_pattern: "reflection::Invoke".to_string(),
			mod_loader_dir: PathBuf::from("ModLoader"),
			mod_loader_module: "ModLoader".to_string(),
			mod_loader_config: "ModLoader/ModLoader.json".to_string(),
			support_modules: vec![SupportModule::management()],
			load_file_capability: LOAD_FILE.to_string(),
			native_root: PathBuf::from("runtimes"),
			app_path_env: "DUET_ORIGINAL_APP_PATH".to_string(),
			crash_log: PathBuf::from("0DuetCrash.log"),
			denied_native_libraries: vec![ALWAYS_UNAVAILABLE.to_string()],
			subsystem_order: vec![Subsystem::Chainloader, Subsystem::ModLoader],
		}
	}
}

impl BootstrapConfig {
	/// Parses and validates TOML text. `origin` only labels errors.
	pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
			path: origin.to_path_buf(),
			source,
		})?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::parse(&text, path)
	}

	/// Finds the configuration for a process started in `cwd`.
	///
	/// `DUET_CONFIG` wins when set; otherwise `duet.toml` in `cwd` is used if
	/// it exists, and the defaults apply if it does not.
	pub fn discover(cwd: &Path) -> Result<Self, ConfigError> {
		if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
			let path = cwd.join(explicit);
			tracing::debug!(path = %path.display(), "config.explicit");
			return Self::load(&path);
		}

		let probe = cwd.join(CONFIG_FILE);
		if probe.is_file() {
			tracing::debug!(path = %probe.display(), "config.discovered");
			return Self::load(&probe);
		}

		tracing::debug!(cwd = %cwd.display(), "config.default");
		Ok(Self::default())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let order = &self.subsystem_order;
		let complete = order.len() == 2 && order.contains(&Subsystem::Chainloader) && order.contains(&Subsystem::ModLoader);
		if !complete {
			return Err(ConfigError::InvalidOrder(order.clone()));
		}
		self.pattern().map(drop)
	}

	/// Directory relative paths resolve against.
	pub fn root(&self, cwd: &Path) -> PathBuf {
		match &self.base_dir {
			Some(base) => cwd.join(base),
			None => cwd.to_path_buf(),
		}
	}

	pub fn pattern(&self) -> Result<MethodRef, ConfigError> {
		self.invoke_pattern
			.parse()
			.map_err(|_| ConfigError::InvalidPattern(self.invoke_pattern.clone()))
	}

	/// Stages in execution order: preload and patch, the subsystems in the
	/// configured order, then the application.
	pub fn plan(&self) -> Vec<LoadStage> {
		let mut plan = vec![LoadStage::Preload, LoadStage::Patch];
		plan.extend(self.subsystem_order.iter().map(|subsystem| subsystem.stage()));
		plan.push(LoadStage::AppEntry);
		plan
	}
}

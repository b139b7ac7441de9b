use std::fmt;
use std::path::{Path, PathBuf};

/// Version and publisher key that pin a module beyond its bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StrongIdentity {
	pub version: String,
	pub public_key_token: Option<String>,
}

/// Identity of a loadable module.
///
/// Registry uniqueness is by [`name`](Self::name) alone; the strong identity
/// and path are carried for diagnostics and alias matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
	name: String,
	strong: Option<StrongIdentity>,
	path: Option<PathBuf>,
}

impl ModuleIdentity {
	/// Creates an identity carrying only a name.
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			strong: None,
			path: None,
		}
	}

	/// Creates an identity from a module file path, using its bare file stem.
	pub fn from_path(path: &Path) -> Option<Self> {
		let name = bare_name(path)?;
		Some(Self::named(name).with_path(path))
	}

	pub fn with_strong(mut self, strong: StrongIdentity) -> Self {
		self.strong = Some(strong);
		self
	}

	pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn strong(&self) -> Option<&StrongIdentity> {
		self.strong.as_ref()
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}
}

impl fmt::Display for ModuleIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)?;
		if let Some(strong) = &self.strong {
			write!(f, ", Version={}", strong.version)?;
			if let Some(token) = &strong.public_key_token {
				write!(f, ", PublicKeyToken={token}")?;
			}
		}
		Ok(())
	}
}

/// Returns the file name of `path` without its extension.
pub fn bare_name(path: &Path) -> Option<&str> {
	path.file_stem().and_then(|stem| stem.to_str())
}

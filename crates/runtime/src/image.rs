//! Module images.
//!
//! A module image is a TOML document:
//!
//! ```toml
//! name = "ChainLoader"
//! version = "6.0.0"
//! entry = "Program.Main"
//! references = ["ChainLoader.Core"]
//!
//! [capabilities]
//! full_load = "Loader.FullLoad"
//!
//! [methods."Program.Main"]
//! params = 1
//! body = [
//!     { op = "ldint", value = 0 },
//!     { op = "ret" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Instruction, ModuleIdentity, RuntimeError, StrongIdentity};

/// File extension of module images on every platform.
pub const MODULE_EXTENSION: &str = "dll";

/// Parsed, not yet registered, module image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleImage {
	pub name: String,
	#[serde(default)]
	pub version: Option<String>,
	#[serde(default)]
	pub public_key_token: Option<String>,
	#[serde(default)]
	pub entry: Option<String>,
	#[serde(default)]
	pub references: Vec<String>,
	#[serde(default)]
	pub capabilities: BTreeMap<String, String>,
	#[serde(default)]
	pub methods: BTreeMap<String, MethodBody>,
}

/// Arity plus instruction stream of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodBody {
	#[serde(default)]
	pub params: u16,
	#[serde(default)]
	pub body: Vec<Instruction>,
}

impl ModuleImage {
	pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	/// Reads and parses the image at `path`.
	pub fn read(path: &Path) -> Result<Self, RuntimeError> {
		let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::parse(&text).map_err(|source| RuntimeError::Image {
			path: path.to_path_buf(),
			source,
		})
	}
}

/// A module loaded into the runtime. Immutable once registered.
#[derive(Debug)]
pub struct Module {
	identity: ModuleIdentity,
	image: ModuleImage,
}

impl Module {
	pub(crate) fn new(image: ModuleImage, location: PathBuf) -> Self {
		let mut identity = ModuleIdentity::named(image.name.clone()).with_path(location);
		if let Some(version) = &image.version {
			identity = identity.with_strong(StrongIdentity {
				version: version.clone(),
				public_key_token: image.public_key_token.clone(),
			});
		}
		Self { identity, image }
	}

	pub fn identity(&self) -> &ModuleIdentity {
		&self.identity
	}

	pub fn name(&self) -> &str {
		self.identity.name()
	}

	/// Canonical path the module was loaded from.
	pub fn location(&self) -> Option<&Path> {
		self.identity.path()
	}

	pub fn entry(&self) -> Option<&str> {
		self.image.entry.as_deref()
	}

	pub fn method(&self, name: &str) -> Option<&MethodBody> {
		self.image.methods.get(name)
	}

	pub fn capability(&self, name: &str) -> Option<&str> {
		self.image.capabilities.get(name).map(String::as_str)
	}

	pub fn references(&self) -> &[String] {
		&self.image.references
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::MethodRef;

	#[test]
	fn parses_methods_and_capabilities() {
		let image = ModuleImage::parse(
			r#"
			name = "ModLoader"
			version = "1.2.0"
			references = ["ModLoader.Core"]

			[capabilities]
			full_load = "Loader.FullLoad"

			[methods."Loader.FullLoad"]
			body = [
				{ op = "ldstr", value = "mods" },
				{ op = "call", method = "fs::ModuleFiles" },
				{ op = "pop" },
				{ op = "ldnull" },
				{ op = "ret" },
			]
			"#,
		)
		.unwrap();

		assert_eq!(image.references, vec!["ModLoader.Core".to_string()]);
		assert_eq!(image.capabilities.get("full_load").map(String::as_str), Some("Loader.FullLoad"));
		let body = &image.methods["Loader.FullLoad"];
		assert_eq!(body.params, 0);
		assert_eq!(
			body.body,
			vec![
				Instruction::ldstr("mods"),
				Instruction::call(MethodRef::new("fs", "ModuleFiles")),
				Instruction::Pop,
				Instruction::LdNull,
				Instruction::Ret,
			]
		);

		let module = Module::new(image, PathBuf::from("/game/ModLoader/ModLoader.dll"));
		assert_eq!(module.identity().to_string(), "ModLoader, Version=1.2.0");
		assert_eq!(module.location(), Some(Path::new("/game/ModLoader/ModLoader.dll")));
	}

	#[test]
	fn rejects_bad_method_reference() {
		let err = ModuleImage::parse(
			r#"
			name = "Broken"
			[methods.Main]
			body = [{ op = "call", method = "no-separator" }]
			"#,
		)
		.unwrap_err();
		assert!(err.to_string().contains("no-separator"), "unexpected error: {err}");
	}
}

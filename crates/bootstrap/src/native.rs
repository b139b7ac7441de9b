//! Native library resolution for modules loaded by the bootstrap.
//!
//! Libraries are looked up in `<native_root>/<triple>/native`, trying each
//! platform prefix then each platform extension:
//!
//! | platform | prefixes | extensions |
//! |----------|----------|------------|
//! | Windows | `""` | `.dll` |
//! | Linux | `""`, `lib` | `.dll`, `.so` |
//! | macOS | `""`, `lib` | `.dll`, `.dylib` |

use std::path::{Path, PathBuf};

use duet_runtime::{ModuleIdentity, NativeResolve};

/// Library that is reported unavailable on every platform.
pub const ALWAYS_UNAVAILABLE: &str = "rnnoise";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
	Windows,
	Linux,
	MacOs,
	Other,
}

/// Operating system and architecture used to pick native candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
	os: Os,
	arch: String,
}

impl Platform {
	/// `arch` uses runtime-identifier spelling (`x64`, `arm64`, ...).
	pub fn new(os: Os, arch: impl Into<String>) -> Self {
		Self { os, arch: arch.into() }
	}

	/// The platform this binary was built for.
	pub fn current() -> Self {
		let os = if cfg!(target_os = "windows") {
			Os::Windows
		} else if cfg!(target_os = "linux") {
			Os::Linux
		} else if cfg!(target_os = "macos") {
			Os::MacOs
		} else {
			Os::Other
		};
		let arch = match std::env::consts::ARCH {
			"x86_64" => "x64",
			"aarch64" => "arm64",
			"x86" => "x86",
			"arm" => "arm",
			other => other,
		};
		Self::new(os, arch)
	}

	pub fn os(&self) -> Os {
		self.os
	}

	/// Runtime identifier, e.g. `linux-x64`.
	pub fn triple(&self) -> String {
		let os = match self.os {
			Os::Windows => "win",
			Os::Linux => "linux",
			Os::MacOs => "osx",
			Os::Other => std::env::consts::OS,
		};
		format!("{os}-{}", self.arch)
	}

	pub fn prefixes(&self) -> &'static [&'static str] {
		match self.os {
			Os::Windows => &[""],
			_ => &["", "lib"],
		}
	}

	pub fn extensions(&self) -> &'static [&'static str] {
		match self.os {
			Os::Linux => &[".dll", ".so"],
			Os::MacOs => &[".dll", ".dylib"],
			Os::Windows | Os::Other => &[".dll"],
		}
	}
}

/// Maps library names to files under the platform's native directory.
///
/// Results are recomputed on every call.
#[derive(Debug, Clone)]
pub struct NativeLibraryResolver {
	native_dir: PathBuf,
	platform: Platform,
	denied: Vec<String>,
}

impl NativeLibraryResolver {
	pub fn new(native_root: &Path, platform: Platform) -> Self {
		Self {
			native_dir: native_root.join(platform.triple()).join("native"),
			platform,
			denied: vec![ALWAYS_UNAVAILABLE.to_string()],
		}
	}

	/// Adds libraries that are never resolved. [`ALWAYS_UNAVAILABLE`] stays
	/// denied whatever the list contains.
	pub fn with_denied(mut self, names: impl IntoIterator<Item = String>) -> Self {
		for name in names {
			if !self.denied.contains(&name) {
				self.denied.push(name);
			}
		}
		self
	}

	pub fn native_dir(&self) -> &Path {
		&self.native_dir
	}

	pub fn platform(&self) -> &Platform {
		&self.platform
	}

	pub fn is_denied(&self, library: &str) -> bool {
		self.denied.iter().any(|denied| denied == library)
	}

	/// Candidate paths in probe order: prefix-major, extension-minor.
	pub fn candidates(&self, library: &str) -> Vec<PathBuf> {
		self.platform
			.prefixes()
			.iter()
			.flat_map(|prefix| {
				self.platform
					.extensions()
					.iter()
					.map(move |ext| self.native_dir.join(format!("{prefix}{library}{ext}")))
			})
			.collect()
	}

	pub fn resolve(&self, library: &str) -> Option<PathBuf> {
		if self.is_denied(library) {
			tracing::trace!(library, "native.denied");
			return None;
		}
		let found = self.candidates(library).into_iter().find(|path| path.is_file());
		tracing::trace!(library, found = ?found, "native.resolve");
		found
	}
}

impl NativeResolve for NativeLibraryResolver {
	fn resolve(&self, library: &str, requester: &ModuleIdentity) -> Option<PathBuf> {
		tracing::trace!(library, requester = requester.name(), "native.request");
		NativeLibraryResolver::resolve(self, library)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use tempfile::TempDir;

	use super::*;

	fn platforms() -> [Platform; 4] {
		[
			Platform::new(Os::Windows, "x64"),
			Platform::new(Os::Linux, "x64"),
			Platform::new(Os::MacOs, "arm64"),
			Platform::new(Os::Other, "x64"),
		]
	}

	#[test]
	fn triples() {
		assert_eq!(Platform::new(Os::Windows, "x64").triple(), "win-x64");
		assert_eq!(Platform::new(Os::Linux, "x64").triple(), "linux-x64");
		assert_eq!(Platform::new(Os::MacOs, "arm64").triple(), "osx-arm64");
	}

	#[test]
	fn linux_candidate_order() {
		let resolver = NativeLibraryResolver::new(Path::new("/r"), Platform::new(Os::Linux, "x64"));
		let dir = Path::new("/r/linux-x64/native");
		assert_eq!(
			resolver.candidates("opus"),
			vec![dir.join("opus.dll"), dir.join("opus.so"), dir.join("libopus.dll"), dir.join("libopus.so")]
		);
	}

	#[test]
	fn windows_has_single_candidate() {
		let resolver = NativeLibraryResolver::new(Path::new("/r"), Platform::new(Os::Windows, "x64"));
		assert_eq!(resolver.candidates("opus"), vec![PathBuf::from("/r/win-x64/native/opus.dll")]);
	}

	#[test]
	fn rnnoise_is_unavailable_everywhere() {
		for platform in platforms() {
			let tmp = TempDir::new().unwrap();
			let resolver = NativeLibraryResolver::new(tmp.path(), platform).with_denied(Vec::new());
			std::fs::create_dir_all(resolver.native_dir()).unwrap();
			for candidate in resolver.candidates(ALWAYS_UNAVAILABLE) {
				std::fs::write(candidate, b"").unwrap();
			}
			assert_eq!(resolver.resolve(ALWAYS_UNAVAILABLE), None, "{:?}", resolver.platform());
		}
	}

	#[test]
	fn first_existing_candidate_wins() {
		let tmp = TempDir::new().unwrap();
		let resolver = NativeLibraryResolver::new(tmp.path(), Platform::new(Os::MacOs, "arm64"));
		std::fs::create_dir_all(resolver.native_dir()).unwrap();
		let dylib = resolver.native_dir().join("libopus.dylib");
		let plain = resolver.native_dir().join("opus.dylib");
		std::fs::write(&dylib, b"").unwrap();
		assert_eq!(resolver.resolve("opus"), Some(dylib));

		std::fs::write(&plain, b"").unwrap();
		assert_eq!(resolver.resolve("opus"), Some(plain));
		assert_eq!(resolver.resolve("missing"), None);
	}

	#[test]
	fn configured_denials_extend_the_policy() {
		let tmp = TempDir::new().unwrap();
		let resolver = NativeLibraryResolver::new(tmp.path(), Platform::new(Os::Linux, "x64")).with_denied(["steam_api".to_string()]);
		assert!(resolver.is_denied("steam_api"));
		assert!(resolver.is_denied(ALWAYS_UNAVAILABLE));
		assert!(!resolver.is_denied("opus"));
	}
}

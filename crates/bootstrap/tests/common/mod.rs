#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use duet_bootstrap::{BootstrapConfig, BootstrapOrchestrator, CrashLog};
use duet_runtime::{MethodRef, Runtime, Value};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Subsystem A: its entry runs the preloader through a dynamic invoke, then
/// would launch the application itself if left unpatched.
pub const CHAINLOADER: &str = r#"
name = "ChainLoader"
entry = "Program.Main"

[methods."Program.Main"]
params = 1
body = [
	{ op = "ldstr", value = "ChainLoader::Preloader.Run" },
	{ op = "call", method = "reflection::Method" },
	{ op = "ldarg", index = 0 },
	{ op = "newlist", count = 1 },
	{ op = "call", method = "reflection::Invoke" },
	{ op = "ldstr", value = "A.launch" },
	{ op = "call", method = "test::Mark" },
	{ op = "pop" },
	{ op = "ldint", value = 1 },
	{ op = "ret" },
]

[methods."Preloader.Run"]
params = 1
body = [
	{ op = "ldstr", value = "A.Main" },
	{ op = "call", method = "test::Mark" },
	{ op = "ret" },
]
"#;

/// Subsystem B's primary module.
pub const MOD_LOADER: &str = r#"
name = "ModLoader"
version = "1.0.0"

[capabilities]
initialize = "Loader.Create"
resolve_module = "Loader.Resolve"
full_load = "Loader.FullLoad"
load_file = "Strategy.LoadFile"

[methods."Loader.Create"]
params = 1
body = [
	{ op = "ldstr", value = "B.initialize" },
	{ op = "call", method = "test::Mark" },
	{ op = "ret" },
]

[methods."Loader.Resolve"]
params = 1
body = [
	{ op = "ldarg", index = 0 },
	{ op = "call", method = "runtime::FindLoaded" },
	{ op = "ret" },
]

[methods."Loader.FullLoad"]
body = [
	{ op = "ldstr", value = "ModLoader/ModLoader.Extras.dll" },
	{ op = "call", method = "ModLoader::Strategy.LoadFile" },
	{ op = "pop" },
	{ op = "call", method = "ModLoader.Extras::Feature.Run" },
	{ op = "pop" },
	{ op = "ldstr", value = "B.full_load" },
	{ op = "call", method = "test::Mark" },
	{ op = "ret" },
]

[methods."Strategy.LoadFile"]
params = 1
body = [
	{ op = "ldstr", value = "B.load_file" },
	{ op = "call", method = "test::Mark" },
	{ op = "pop" },
	{ op = "ldarg", index = 0 },
	{ op = "call", method = "runtime::LoadFrom" },
	{ op = "ret" },
]
"#;

/// Second module in B's directory.
pub const MOD_LOADER_EXTRAS: &str = r#"
name = "ModLoader.Extras"

[methods."Feature.Run"]
body = [{ op = "ldint", value = 0 }, { op = "ret" }]
"#;

pub fn app(result: &str) -> String {
	format!(
		r#"
name = "App"
entry = "Program.Main"

[methods."Program.Main"]
params = 1
body = [
	{{ op = "ldstr", value = "App" }},
	{{ op = "call", method = "test::Mark" }},
	{{ op = "pop" }},
	{result}
	{{ op = "ret" }},
]
"#
	)
}

pub const APP_RETURNS_SEVEN: &str = r#"{ op = "ldint", value = 7 },"#;
pub const APP_RETURNS_TASK: &str = r#"{ op = "ldint", value = 7 }, { op = "call", method = "task::FromResult" },"#;

/// A temporary installation: base directory, runtime, and recorded marks.
pub struct Fixture {
	pub dir: TempDir,
	pub runtime: Runtime,
	pub marks: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
	/// Standard layout with every module present.
	pub fn standard() -> Self {
		let fixture = Self::empty();
		fixture.write("ChainLoader.dll", CHAINLOADER);
		fixture.write("ModLoader/ModLoader.dll", MOD_LOADER);
		fixture.write("ModLoader/ModLoader.Extras.dll", MOD_LOADER_EXTRAS);
		fixture.write("Game/App.dll", &app(APP_RETURNS_SEVEN));
		fixture
	}

	pub fn empty() -> Self {
		let dir = TempDir::new().unwrap();
		let runtime = Runtime::new(dir.path());
		let marks = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&marks);
		runtime.host().register(MethodRef::new("test", "Mark"), 1, move |_, args| {
			sink.lock().push(args[0].as_str().unwrap_or_default().to_string());
			Ok(Value::Null)
		});
		Self { dir, runtime, marks }
	}

	pub fn path(&self, file: &str) -> PathBuf {
		self.dir.path().join(file)
	}

	pub fn write(&self, file: &str, text: &str) -> PathBuf {
		let path = self.path(file);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, text).unwrap();
		path
	}

	pub fn app_path(&self) -> PathBuf {
		self.path("Game/App.dll")
	}

	/// Orchestrator with the application path set directly.
	pub fn orchestrator(&self, config: BootstrapConfig) -> BootstrapOrchestrator<'_> {
		BootstrapOrchestrator::new(&self.runtime, config, vec!["--flag".to_string(), "value".to_string()])
			.unwrap()
			.with_app_path(self.app_path())
	}

	pub fn crash_log(&self) -> CrashLog {
		CrashLog::new(self.path(duet_bootstrap::DEFAULT_CRASH_LOG))
	}

	pub fn crash_labels(&self) -> Vec<String> {
		self.crash_log().entries().unwrap().into_iter().map(|entry| entry.label).collect()
	}

	pub fn marks(&self) -> Vec<String> {
		self.marks.lock().clone()
	}

	pub fn count(&self, mark: &str) -> usize {
		self.marks.lock().iter().filter(|m| *m == mark).count()
	}
}

pub fn names(runtime: &Runtime) -> Vec<String> {
	let mut names = runtime.registry().names();
	names.sort();
	names
}

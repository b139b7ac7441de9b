use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use duet_runtime::{
	MethodRef, Module, ModuleIdentity, NativeResolve, ResolutionRequest, ResolveContext, Runtime, RuntimeError, Value,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_module(dir: &Path, file: &str, text: &str) -> PathBuf {
	let path = dir.join(file);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap();
	}
	std::fs::write(&path, text).unwrap();
	path
}

fn lib_module(value: i64) -> String {
	format!(
		r#"
		name = "Lib"
		[methods."Helper.Value"]
		body = [{{ op = "ldint", value = {value} }}, {{ op = "ret" }}]
		"#
	)
}

const CALLER: &str = r#"
name = "Caller"
entry = "Program.Main"
references = ["Lib"]

[methods."Program.Main"]
body = [
	{ op = "call", method = "Lib::Helper.Value" },
	{ op = "ret" },
]
"#;

#[test]
fn duplicate_loads_return_the_registered_instance() {
	let tmp = TempDir::new().unwrap();
	let first = write_module(tmp.path(), "Lib.dll", &lib_module(1));
	let alias = write_module(tmp.path(), "alias/Lib.dll", &lib_module(2));
	let rt = Runtime::new(tmp.path());

	let a = rt.load_from_path(&first).unwrap();
	let b = rt.load_from_path(Path::new("Lib.dll")).unwrap();
	let c = rt.load_from_path(&alias).unwrap();

	assert!(Arc::ptr_eq(&a, &b));
	assert!(Arc::ptr_eq(&a, &c));
	assert_eq!(rt.registry().len(), 1);
}

#[test]
fn calls_resolve_unloaded_modules_through_default_probe() {
	let tmp = TempDir::new().unwrap();
	write_module(tmp.path(), "Lib.dll", &lib_module(42));
	let caller = write_module(tmp.path(), "bin/Caller.dll", CALLER);
	let rt = Runtime::new(tmp.path());

	let module = rt.load_from_path(&caller).unwrap();
	assert_eq!(module.references().to_vec(), vec!["Lib".to_string()]);
	assert!(!rt.registry().contains("Lib"));

	let result = rt.invoke_entry(&module, &[]).unwrap();
	assert_eq!(result.as_int(), Some(42));
	assert_eq!(rt.registry().names(), vec!["Caller", "Lib"]);
}

struct DirContext {
	dir: PathBuf,
	calls: AtomicUsize,
}

impl ResolveContext for DirContext {
	fn name(&self) -> &str {
		"dir"
	}

	fn resolve(&self, rt: &Runtime, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>, RuntimeError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let path = self.dir.join(format!("{}.dll", request.identity.name()));
		if path.is_file() { rt.load_from_path(&path).map(Some) } else { Ok(None) }
	}
}

#[test]
fn active_context_is_consulted_and_deactivated_on_drop() {
	let tmp = TempDir::new().unwrap();
	write_module(tmp.path(), "private/Lib.dll", &lib_module(5));
	let caller = write_module(tmp.path(), "Caller.dll", CALLER);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&caller).unwrap();

	let context = Arc::new(DirContext {
		dir: tmp.path().join("private"),
		calls: AtomicUsize::new(0),
	});
	{
		let _scope = rt.enter_context(context.clone());
		assert!(rt.active_context().is_some());
		assert_eq!(rt.invoke_entry(&module, &[]).unwrap().as_int(), Some(5));
	}
	assert!(rt.active_context().is_none());
	assert_eq!(context.calls.load(Ordering::SeqCst), 1);

	// Already registered: neither the context nor the probe is asked again.
	assert_eq!(rt.invoke_entry(&module, &[]).unwrap().as_int(), Some(5));
	assert_eq!(context.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unresolvable_module_reports_requester() {
	let tmp = TempDir::new().unwrap();
	let caller = write_module(tmp.path(), "Caller.dll", CALLER);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&caller).unwrap();

	let err = rt.invoke_entry(&module, &[]).unwrap_err();
	match err {
		RuntimeError::ResolutionFailure { identity, requester } => {
			assert_eq!(identity.name(), "Lib");
			assert_eq!(requester, "Caller");
		}
		other => panic!("unexpected error: {other}"),
	}
}

struct FailingContext;

impl ResolveContext for FailingContext {
	fn name(&self) -> &str {
		"failing"
	}

	fn resolve(&self, _rt: &Runtime, _request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>, RuntimeError> {
		Err(RuntimeError::Host {
			method: MethodRef::new("test", "Resolve"),
			message: "resolver exploded".into(),
		})
	}
}

#[test]
fn context_failure_propagates_and_still_deactivates() {
	let tmp = TempDir::new().unwrap();
	let caller = write_module(tmp.path(), "Caller.dll", CALLER);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&caller).unwrap();

	let result = {
		let _scope = rt.enter_context(Arc::new(FailingContext));
		rt.invoke_entry(&module, &[])
	};
	assert!(matches!(result, Err(RuntimeError::ContextFailed { ref context, .. }) if context == "failing"));
	assert!(rt.active_context().is_none());
}

#[test]
fn prefix_short_circuits_original_body() {
	let tmp = TempDir::new().unwrap();
	write_module(tmp.path(), "Lib.dll", &lib_module(1));
	let caller = write_module(tmp.path(), "Caller.dll", CALLER);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&caller).unwrap();

	rt.hooks().add_prefix(MethodRef::new("Lib", "Helper.Value"), Arc::new(|_: &Runtime, _: &[Value]| Ok(Some(Value::Int(7)))));
	assert_eq!(rt.invoke_entry(&module, &[]).unwrap().as_int(), Some(7));
}

#[test]
fn entry_receives_process_arguments() {
	let tmp = TempDir::new().unwrap();
	let path = write_module(
		tmp.path(),
		"Echo.dll",
		r#"
		name = "Echo"
		entry = "Main"
		[methods.Main]
		params = 1
		body = [{ op = "ldarg", index = 0 }, { op = "ret" }]
		"#,
	);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&path).unwrap();

	let args = vec!["--flag".to_string(), "value with spaces".to_string()];
	let Value::List(items) = rt.invoke_entry(&module, &args).unwrap() else {
		panic!("expected list");
	};
	let echoed: Vec<_> = items.iter().filter_map(Value::as_str).collect();
	assert_eq!(echoed, vec!["--flag", "value with spaces"]);
}

#[test]
fn dynamic_invoke_passes_list_elements_as_arguments() {
	let tmp = TempDir::new().unwrap();
	let path = write_module(
		tmp.path(),
		"Dyn.dll",
		r#"
		name = "Dyn"
		entry = "Main"

		[methods.Main]
		body = [
			{ op = "ldstr", value = "Dyn::Second" },
			{ op = "call", method = "reflection::Method" },
			{ op = "ldint", value = 10 },
			{ op = "ldint", value = 20 },
			{ op = "newlist", count = 2 },
			{ op = "call", method = "reflection::Invoke" },
			{ op = "ret" },
		]

		[methods.Second]
		params = 2
		body = [{ op = "ldarg", index = 1 }, { op = "ret" }]
		"#,
	);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&path).unwrap();
	assert_eq!(rt.invoke_entry(&module, &[]).unwrap().as_int(), Some(20));
}

#[test]
fn entry_task_result_can_be_awaited() {
	let tmp = TempDir::new().unwrap();
	let path = write_module(
		tmp.path(),
		"AsyncApp.dll",
		r#"
		name = "AsyncApp"
		entry = "Main"
		[methods.Main]
		body = [
			{ op = "ldint", value = 3 },
			{ op = "call", method = "task::FromResult" },
			{ op = "ret" },
		]
		"#,
	);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&path).unwrap();
	let Value::Task(task) = rt.invoke_entry(&module, &[]).unwrap() else {
		panic!("expected task");
	};
	assert_eq!(task.wait().unwrap().as_int(), Some(3));
}

struct NoLibraries;

impl NativeResolve for NoLibraries {
	fn resolve(&self, _library: &str, _requester: &ModuleIdentity) -> Option<PathBuf> {
		None
	}
}

#[test]
fn unavailable_native_library_falls_back_to_managed() {
	let tmp = TempDir::new().unwrap();
	let path = write_module(
		tmp.path(),
		"Audio.dll",
		r#"
		name = "Audio"
		entry = "Main"
		[methods.Main]
		body = [{ op = "bind_native", library = "rnnoise" }, { op = "ret" }]
		"#,
	);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&path).unwrap();

	assert_eq!(rt.invoke_entry(&module, &[]).unwrap().as_int(), Some(0));

	rt.set_native_resolver("Audio", Arc::new(NoLibraries));
	assert!(rt.has_native_resolver("Audio"));
	assert_eq!(rt.invoke_entry(&module, &[]).unwrap().as_int(), Some(0));
	assert!(matches!(
		rt.bind_native(&module, "rnnoise"),
		Err(RuntimeError::NativeLibraryUnavailable { ref library, .. }) if library == "rnnoise"
	));
}

#[test]
fn throw_surfaces_as_managed_failure() {
	let tmp = TempDir::new().unwrap();
	let path = write_module(
		tmp.path(),
		"Bad.dll",
		r#"
		name = "Bad"
		entry = "Main"
		[methods.Main]
		body = [{ op = "throw", message = "config missing" }]
		"#,
	);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&path).unwrap();
	let err = rt.invoke_entry(&module, &[]).unwrap_err();
	assert_eq!(err.to_string(), "Bad::Main threw: config missing");
}

#[test]
fn unbounded_recursion_is_stopped() {
	let tmp = TempDir::new().unwrap();
	let path = write_module(
		tmp.path(),
		"Loop.dll",
		r#"
		name = "Loop"
		entry = "Main"
		[methods.Main]
		body = [{ op = "call", method = "Loop::Main" }, { op = "ret" }]
		"#,
	);
	let rt = Runtime::new(tmp.path());
	let module = rt.load_from_path(&path).unwrap();
	assert!(matches!(rt.invoke_entry(&module, &[]), Err(RuntimeError::CallDepthExceeded(_))));
}

#[test]
fn module_files_lists_only_module_images() {
	let tmp = TempDir::new().unwrap();
	write_module(tmp.path(), "mods/B.dll", "name = \"B\"");
	write_module(tmp.path(), "mods/A.dll", "name = \"A\"");
	write_module(tmp.path(), "mods/readme.txt", "not a module");
	let rt = Runtime::new(tmp.path());

	let Value::List(files) = rt.invoke(&MethodRef::new("fs", "ModuleFiles"), vec![Value::Str("mods".into())]).unwrap() else {
		panic!("expected list");
	};
	let names: Vec<_> = files.iter().filter_map(Value::as_str).map(|p| Path::new(p).file_name().unwrap().to_str().unwrap().to_string()).collect();
	assert_eq!(names, vec!["A.dll", "B.dll"]);

	let missing = rt.invoke(&MethodRef::new("fs", "ModuleFiles"), vec![Value::Str("nope".into())]).unwrap();
	assert!(matches!(missing, Value::List(ref items) if items.is_empty()));
}

//! Host methods callable from managed code.
//!
//! Host methods live in namespaces that never name a loadable module. The
//! runtime installs the intrinsics below; embedders may register more.
//!
//! | method | arity | result |
//! |--------|-------|--------|
//! | `runtime::LoadFrom(path)` | 1 | module |
//! | `runtime::FindLoaded(name)` | 1 | module or null |
//! | `runtime::EntryPoint(module)` | 1 | method |
//! | `reflection::Method("mod::Name")` | 1 | method |
//! | `reflection::Invoke(method, args)` | 2 | callee result |
//! | `env::Var(name)` | 1 | string or null |
//! | `fs::ModuleFiles(dir)` | 1 | list of paths |
//! | `task::FromResult(value)` | 1 | task |
//! | `task::Delay(ms)` | 1 | task |
//! | `log::Info(msg)` / `log::Trace(msg)` | 1 | null |

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::{MODULE_EXTENSION, MethodRef, Runtime, RuntimeError, Task, Value};

/// Namespaces reserved for runtime intrinsics.
pub const INTRINSIC_NAMESPACES: &[&str] = &["runtime", "reflection", "env", "fs", "task", "log"];

pub type HostFn = Arc<dyn Fn(&Runtime, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync>;

#[derive(Clone)]
struct HostMethod {
	arity: u16,
	func: HostFn,
}

/// Registry of host methods.
#[derive(Default)]
pub struct HostMethods {
	methods: RwLock<HashMap<MethodRef, HostMethod>>,
}

/// The dynamic invoke intrinsic, `reflection::Invoke`.
pub fn invoke_method() -> MethodRef {
	MethodRef::new("reflection", "Invoke")
}

impl HostMethods {
	/// Registers (or replaces) a host method.
	pub fn register<F>(&self, method: MethodRef, arity: u16, func: F)
	where
		F: Fn(&Runtime, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
	{
		self.methods.write().insert(method, HostMethod { arity, func: Arc::new(func) });
	}

	pub fn arity(&self, method: &MethodRef) -> Option<u16> {
		self.methods.read().get(method).map(|m| m.arity)
	}

	pub fn contains(&self, method: &MethodRef) -> bool {
		self.methods.read().contains_key(method)
	}

	/// Returns true if `module` names a host namespace rather than a module.
	pub fn is_namespace(&self, module: &str) -> bool {
		INTRINSIC_NAMESPACES.contains(&module) || self.methods.read().keys().any(|m| m.module() == module)
	}

	pub(crate) fn get(&self, method: &MethodRef) -> Option<HostFn> {
		self.methods.read().get(method).map(|m| Arc::clone(&m.func))
	}

	pub(crate) fn with_intrinsics() -> Self {
		let host = Self::default();
		host.register(MethodRef::new("runtime", "LoadFrom"), 1, |rt, args| {
			let method = MethodRef::new("runtime", "LoadFrom");
			let path = expect_str(&method, &args[0])?;
			rt.load_from_path(Path::new(path)).map(Value::Module)
		});
		host.register(MethodRef::new("runtime", "FindLoaded"), 1, |rt, args| {
			let name = expect_str(&MethodRef::new("runtime", "FindLoaded"), &args[0])?;
			Ok(rt.registry().find_by_name(name).map_or(Value::Null, Value::Module))
		});
		host.register(MethodRef::new("runtime", "EntryPoint"), 1, |rt, args| {
			let method = MethodRef::new("runtime", "EntryPoint");
			let Value::Module(module) = &args[0] else {
				return Err(mismatch(&method, "module", &args[0]));
			};
			rt.entry_point(module).map(Value::Method)
		});
		host.register(MethodRef::new("reflection", "Method"), 1, |_, args| {
			let text = expect_str(&MethodRef::new("reflection", "Method"), &args[0])?;
			text.parse().map(Value::Method)
		});
		host.register(invoke_method(), 2, |rt, mut args| {
			let call_args = args.pop().unwrap_or(Value::Null);
			let target = args.pop().unwrap_or(Value::Null);
			let Value::Method(target) = target else {
				return Err(mismatch(&invoke_method(), "method", &target));
			};
			let call_args = match call_args {
				Value::Null => Vec::new(),
				Value::List(items) => items,
				other => return Err(mismatch(&invoke_method(), "list", &other)),
			};
			rt.invoke(&target, call_args)
		});
		host.register(MethodRef::new("env", "Var"), 1, |_, args| {
			let name = expect_str(&MethodRef::new("env", "Var"), &args[0])?;
			Ok(std::env::var(name).map_or(Value::Null, Value::Str))
		});
		host.register(MethodRef::new("fs", "ModuleFiles"), 1, |rt, args| {
			let dir = expect_str(&MethodRef::new("fs", "ModuleFiles"), &args[0])?;
			module_files(&rt.resolve_path(Path::new(dir)))
		});
		host.register(MethodRef::new("task", "FromResult"), 1, |_, mut args| Ok(Value::Task(Task::ready(args.remove(0)))));
		host.register(MethodRef::new("task", "Delay"), 1, |_, args| {
			let method = MethodRef::new("task", "Delay");
			let millis = args[0].as_int().ok_or_else(|| mismatch(&method, "int", &args[0]))?;
			let millis = u64::try_from(millis).unwrap_or(0);
			Ok(Value::Task(Task::new(async move {
				tokio::time::sleep(Duration::from_millis(millis)).await;
				Ok(Value::Null)
			})))
		});
		host.register(MethodRef::new("log", "Info"), 1, |_, args| {
			tracing::info!(target: "duet::managed", message = ?args[0]);
			Ok(Value::Null)
		});
		host.register(MethodRef::new("log", "Trace"), 1, |_, args| {
			tracing::trace!(target: "duet::managed", message = ?args[0]);
			Ok(Value::Null)
		});
		host
	}
}

impl std::fmt::Debug for HostMethods {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HostMethods").field("methods", &self.methods.read().len()).finish()
	}
}

fn module_files(dir: &Path) -> Result<Value, RuntimeError> {
	let entries = match std::fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Value::List(Vec::new())),
		Err(source) => {
			return Err(RuntimeError::Read {
				path: dir.to_path_buf(),
				source,
			});
		}
	};

	let mut files: Vec<_> = entries
		.flatten()
		.map(|entry| entry.path())
		.filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == MODULE_EXTENSION))
		.collect();
	files.sort();
	Ok(Value::List(files.into_iter().map(|p| Value::Str(p.to_string_lossy().into_owned())).collect()))
}

fn expect_str<'a>(method: &MethodRef, value: &'a Value) -> Result<&'a str, RuntimeError> {
	value.as_str().ok_or_else(|| mismatch(method, "string", value))
}

fn mismatch(method: &MethodRef, expected: &'static str, found: &Value) -> RuntimeError {
	RuntimeError::TypeMismatch {
		method: method.clone(),
		expected,
		found: found.kind(),
	}
}

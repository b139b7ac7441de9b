use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{MethodRef, Module, RuntimeError};

type TaskFuture = Pin<Box<dyn Future<Output = Result<Value, RuntimeError>> + Send>>;

/// A value on the managed stack.
#[derive(Clone)]
pub enum Value {
	Null,
	Int(i64),
	Str(String),
	List(Vec<Value>),
	Module(Arc<Module>),
	Method(MethodRef),
	Task(Task),
}

impl Value {
	/// Short type name used in diagnostics.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Int(_) => "int",
			Self::Str(_) => "string",
			Self::List(_) => "list",
			Self::Module(_) => "module",
			Self::Method(_) => "method",
			Self::Task(_) => "task",
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_module(&self) -> Option<&Arc<Module>> {
		match self {
			Self::Module(module) => Some(module),
			_ => None,
		}
	}

	/// Wraps process arguments as a list of strings.
	pub fn args(args: &[String]) -> Self {
		Self::List(args.iter().cloned().map(Self::Str).collect())
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("Null"),
			Self::Int(value) => f.debug_tuple("Int").field(value).finish(),
			Self::Str(value) => f.debug_tuple("Str").field(value).finish(),
			Self::List(items) => f.debug_tuple("List").field(items).finish(),
			Self::Module(module) => f.debug_tuple("Module").field(&module.name()).finish(),
			Self::Method(method) => f.debug_tuple("Method").field(&method.to_string()).finish(),
			Self::Task(_) => f.write_str("Task(..)"),
		}
	}
}

/// Asynchronous completion returned by managed code.
///
/// The future is awaited at most once; clones share the same completion.
#[derive(Clone)]
pub struct Task {
	future: Arc<Mutex<Option<TaskFuture>>>,
}

impl Task {
	pub fn new<F>(future: F) -> Self
	where
		F: Future<Output = Result<Value, RuntimeError>> + Send + 'static,
	{
		Self {
			future: Arc::new(Mutex::new(Some(Box::pin(future)))),
		}
	}

	/// Creates a task that is already complete.
	pub fn ready(value: Value) -> Self {
		Self::new(async move { Ok(value) })
	}

	/// Blocks the calling thread until the task completes.
	///
	/// Drives the future on a current-thread runtime created for the wait, so
	/// no worker threads are spawned.
	pub fn wait(&self) -> Result<Value, RuntimeError> {
		let future = self.future.lock().take().ok_or(RuntimeError::TaskConsumed)?;
		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_time()
			.build()
			.map_err(RuntimeError::TaskRuntime)?;
		runtime.block_on(future)
	}
}

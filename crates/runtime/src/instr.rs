//! Instruction set for managed method bodies.
//!
//! Bodies are straight-line stack programs. Every call pushes exactly one
//! value (null for routines that produce nothing), so a caller that does not
//! want a result follows the call with [`Instruction::Pop`].

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::RuntimeError;

/// Reference to a method, written `module::Method`.
///
/// The module part names either a loadable module or a host namespace such
/// as `runtime` or `reflection`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct MethodRef {
	module: String,
	name: String,
}

impl MethodRef {
	pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			module: module.into(),
			name: name.into(),
		}
	}

	pub fn module(&self) -> &str {
		&self.module
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl FromStr for MethodRef {
	type Err = RuntimeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (module, name) = s.split_once("::").ok_or_else(|| RuntimeError::InvalidMethodRef(s.to_string()))?;
		if module.is_empty() || name.is_empty() || name.contains("::") {
			return Err(RuntimeError::InvalidMethodRef(s.to_string()));
		}
		Ok(Self::new(module, name))
	}
}

impl TryFrom<String> for MethodRef {
	type Error = RuntimeError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl fmt::Display for MethodRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}::{}", self.module, self.name)
	}
}

/// One instruction of a method body.
///
/// Serialized as an inline table tagged by `op`, e.g.
/// `{ op = "call", method = "runtime::LoadFrom" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
	Nop,
	/// Push argument `index`.
	#[serde(rename = "ldarg")]
	LdArg { index: u16 },
	#[serde(rename = "ldint")]
	LdInt { value: i64 },
	#[serde(rename = "ldstr")]
	LdStr { value: String },
	#[serde(rename = "ldnull")]
	LdNull,
	Dup,
	Pop,
	/// Pop `count` values and push them as one list, preserving order.
	#[serde(rename = "newlist")]
	NewList { count: u16 },
	/// Pop the callee's arguments, invoke it, push its result.
	Call { method: MethodRef },
	/// Pop a list, invoke the unary `method` per element, push the results.
	CallEach { method: MethodRef },
	/// Bind a native library for the executing module; pushes 1 or 0.
	BindNative { library: String },
	Throw { message: String },
	Ret,
}

impl Instruction {
	pub fn call(method: MethodRef) -> Self {
		Self::Call { method }
	}

	pub fn ldstr(value: impl Into<String>) -> Self {
		Self::LdStr { value: value.into() }
	}

	/// Returns true if this instruction is a direct call to `method`.
	pub fn calls(&self, method: &MethodRef) -> bool {
		matches!(self, Self::Call { method: target } if target == method)
	}
}

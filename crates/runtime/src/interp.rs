use std::sync::Arc;

use crate::{Instruction, MethodBody, MethodRef, Module, Runtime, RuntimeError, Value};

/// Executes one method body to completion.
pub(crate) fn execute(rt: &Runtime, method: &MethodRef, module: &Arc<Module>, body: &MethodBody, args: Vec<Value>) -> Result<Value, RuntimeError> {
	let mut stack: Vec<Value> = Vec::new();
	let requester = Some(module.identity());

	for instruction in &body.body {
		match instruction {
			Instruction::Nop => {}
			Instruction::LdArg { index } => {
				let value = args.get(usize::from(*index)).cloned().ok_or_else(|| RuntimeError::ArgumentOutOfRange {
					method: method.clone(),
					index: *index,
				})?;
				stack.push(value);
			}
			Instruction::LdInt { value } => stack.push(Value::Int(*value)),
			Instruction::LdStr { value } => stack.push(Value::Str(value.clone())),
			Instruction::LdNull => stack.push(Value::Null),
			Instruction::Dup => {
				let top = stack.last().cloned().ok_or_else(|| underflow(method))?;
				stack.push(top);
			}
			Instruction::Pop => {
				stack.pop().ok_or_else(|| underflow(method))?;
			}
			Instruction::NewList { count } => {
				let items = pop_n(&mut stack, usize::from(*count), method)?;
				stack.push(Value::List(items));
			}
			Instruction::Call { method: callee } => {
				let arity = rt.arity(callee, requester)?;
				let call_args = pop_n(&mut stack, usize::from(arity), method)?;
				stack.push(rt.invoke_from(callee, call_args, requester)?);
			}
			Instruction::CallEach { method: callee } => {
				let items = match stack.pop().ok_or_else(|| underflow(method))? {
					Value::List(items) => items,
					other => {
						return Err(RuntimeError::TypeMismatch {
							method: method.clone(),
							expected: "list",
							found: other.kind(),
						});
					}
				};
				let mut results = Vec::with_capacity(items.len());
				for item in items {
					results.push(rt.invoke_from(callee, vec![item], requester)?);
				}
				stack.push(Value::List(results));
			}
			Instruction::BindNative { library } => {
				let bound = match rt.bind_native(module, library) {
					Ok(_) => 1,
					Err(err @ (RuntimeError::NativeLibraryUnavailable { .. } | RuntimeError::NativeLoad { .. })) => {
						tracing::debug!(%method, library, error = %err, "native.bind.fallback");
						0
					}
					Err(err) => return Err(err),
				};
				stack.push(Value::Int(bound));
			}
			Instruction::Throw { message } => {
				return Err(RuntimeError::Thrown {
					method: method.clone(),
					message: message.clone(),
				});
			}
			Instruction::Ret => return Ok(stack.pop().unwrap_or(Value::Null)),
		}
	}

	Ok(stack.pop().unwrap_or(Value::Null))
}

fn pop_n(stack: &mut Vec<Value>, count: usize, method: &MethodRef) -> Result<Vec<Value>, RuntimeError> {
	let at = stack.len().checked_sub(count).ok_or_else(|| underflow(method))?;
	Ok(stack.split_off(at))
}

fn underflow(method: &MethodRef) -> RuntimeError {
	RuntimeError::StackUnderflow(method.clone())
}

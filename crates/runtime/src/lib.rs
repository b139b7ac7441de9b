//! Managed module runtime for the duet bootstrap.
//!
//! This crate is the execution environment that the bootstrap drives. It owns
//! the process-wide module registry and knows how to read module images from
//! disk, resolve modules on demand, and interpret their instruction streams.
//!
//! # Architecture
//!
//! * [`identity`]: Module identity (name, strong identity, path)
//! * [`image`]: On-disk module images and loaded [`Module`]s
//! * [`instr`]: The stack-machine instruction set and method references
//! * [`registry`]: Process-wide name-unique module registry
//! * [`context`]: Resolution contexts and their scoped activation
//! * [`hooks`]: Method prefixes and body replacement used by patches
//! * [`host`]: Host methods (intrinsics) callable from managed code
//! * [`native`]: Per-module native library resolution and binding
//! * [`value`]: Runtime values, including asynchronous tasks
//!
//! One [`Runtime`] is created per process. Subsystems and the application
//! share it; nothing in this crate assumes exclusive ownership of the registry.

pub mod context;
pub mod error;
pub mod hooks;
pub mod host;
pub mod identity;
pub mod image;
pub mod instr;
mod interp;
pub mod native;
pub mod registry;
mod runtime;
pub mod value;

pub use context::{ContextScope, ResolutionRequest, ResolveContext};
pub use error::RuntimeError;
pub use hooks::{MethodHooks, Prefix};
pub use host::{HostFn, HostMethods, INTRINSIC_NAMESPACES, invoke_method};
pub use identity::{ModuleIdentity, StrongIdentity, bare_name};
pub use image::{MODULE_EXTENSION, MethodBody, Module, ModuleImage};
pub use instr::{Instruction, MethodRef};
pub use native::{NativeBinding, NativeResolve};
pub use registry::ModuleRegistry;
pub use runtime::Runtime;
pub use value::{Task, Value};

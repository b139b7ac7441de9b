//! Patches the bootstrap applies to code it does not own.
//!
//! * [`EntryPatcher`]: truncates a function right after a dynamic-invoke call
//!   site, turning "load and launch" into "load only".
//! * [`RegistryShim`]: makes a subsystem's load-file routine return modules
//!   that are already registered instead of loading a second copy.
//!
//! Both install through the runtime's [`MethodHooks`](duet_runtime::MethodHooks)
//! and are permanent for the life of the process.

mod entry;
mod error;
mod shim;
mod target;

pub use entry::{EntryPatcher, PatchOutcome};
pub use error::PatchError;
pub use shim::RegistryShim;
pub use target::PatchTarget;

//! Bootstrap that starts two loader subsystems in front of a host
//! application.
//!
//! A run is a fixed sequence of [`LoadStage`]s driven by
//! [`BootstrapOrchestrator`]: preload both subsystems, patch them, start each
//! one, then enter the application. Failures are recorded in the
//! [`CrashLog`] with the tag of the stage that raised them.

mod config;
mod context;
mod crash_log;
mod error;
mod native;
mod orchestrator;
mod stage;
pub mod subsystem;

pub use config::{BootstrapConfig, CONFIG_ENV, CONFIG_FILE, ConfigError, Subsystem, SupportModule};
pub use context::{ModuleLoadContext, ResolverCallback};
pub use crash_log::{CrashEntry, CrashLog, DEFAULT_CRASH_LOG};
pub use error::{BootstrapError, StageError};
pub use native::{ALWAYS_UNAVAILABLE, NativeLibraryResolver, Os, Platform};
pub use orchestrator::{BootstrapOrchestrator, MOD_LOADER_CONTEXT};
pub use stage::{BootReport, LoadStage, StageSequence, StageState};

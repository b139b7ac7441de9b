use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use duet_patch::{EntryPatcher, PatchOutcome, PatchTarget, RegistryShim};
use duet_runtime::{MODULE_EXTENSION, MethodRef, Module, ModuleIdentity, Runtime, Value, bare_name};
use parking_lot::RwLock;

use crate::subsystem::{ModLoader, ModLoaderFactory, scripted_factory};
use crate::{BootReport, BootstrapConfig, BootstrapError, CrashLog, LoadStage, ModuleLoadContext, NativeLibraryResolver, Platform, StageError, StageSequence};

/// Name of the resolution context active while subsystem B starts.
pub const MOD_LOADER_CONTEXT: &str = "ModLoaderLoadContext";

type LoaderSlot = Arc<RwLock<Option<Arc<dyn ModLoader>>>>;

/// Runs the load stages against one runtime.
///
/// Stages run on the calling thread in plan order. The first failure is
/// written to the crash log once, tagged with the stage label, and returned;
/// later stages never start. A panicking stage is logged the same way and
/// the panic is resumed.
pub struct BootstrapOrchestrator<'rt> {
	runtime: &'rt Runtime,
	config: BootstrapConfig,
	args: Vec<String>,
	crash_log: CrashLog,
	factory: ModLoaderFactory,
	platform: Platform,
	app_path: Option<PathBuf>,
	sequence: StageSequence,
	chainloader: Option<Arc<Module>>,
	mod_loader_module: Option<Arc<Module>>,
	mod_loader: LoaderSlot,
	exit_code: i32,
}

impl<'rt> BootstrapOrchestrator<'rt> {
	/// `args` are forwarded unmodified to both entry points.
	pub fn new(runtime: &'rt Runtime, config: BootstrapConfig, args: Vec<String>) -> Result<Self, BootstrapError> {
		config.validate()?;
		let crash_log = CrashLog::new(runtime.resolve_path(&config.crash_log));
		let sequence = StageSequence::new(config.plan());
		Ok(Self {
			runtime,
			config,
			args,
			crash_log,
			factory: scripted_factory(),
			platform: Platform::current(),
			app_path: None,
			sequence,
			chainloader: None,
			mod_loader_module: None,
			mod_loader: Arc::new(RwLock::new(None)),
			exit_code: 0,
		})
	}

	pub fn with_crash_log(mut self, crash_log: CrashLog) -> Self {
		self.crash_log = crash_log;
		self
	}

	/// Replaces the adapter built for subsystem B.
	pub fn with_mod_loader_factory(mut self, factory: ModLoaderFactory) -> Self {
		self.factory = factory;
		self
	}

	pub fn with_platform(mut self, platform: Platform) -> Self {
		self.platform = platform;
		self
	}

	/// Uses `path` instead of reading the application path variable.
	pub fn with_app_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.app_path = Some(path.into());
		self
	}

	pub fn crash_log(&self) -> &CrashLog {
		&self.crash_log
	}

	pub fn sequence(&self) -> &StageSequence {
		&self.sequence
	}

	pub fn run(&mut self) -> Result<BootReport, BootstrapError> {
		while let Some(stage) = self.sequence.next_stage() {
			tracing::debug!(%stage, "stage.begin");
			match panic::catch_unwind(AssertUnwindSafe(|| self.run_stage(stage))) {
				Ok(Ok(())) => {
					tracing::info!(%stage, "stage.complete");
					self.sequence.complete(stage);
				}
				Ok(Err(source)) => {
					tracing::error!(%stage, error = %source, "stage.failed");
					self.crash_log.report_error(stage.label(), &source);
					self.sequence.fail(stage, source.to_string());
					return Err(BootstrapError::Stage { stage, source });
				}
				Err(payload) => {
					let message = panic_message(payload.as_ref());
					tracing::error!(%stage, panic = %message, "stage.panicked");
					self.crash_log.report(stage.label(), &format!("panicked: {message}"));
					self.sequence.fail(stage, message);
					panic::resume_unwind(payload);
				}
			}
		}

		Ok(BootReport {
			stages: self.sequence.outcomes().to_vec(),
			exit_code: self.exit_code,
		})
	}

	fn run_stage(&mut self, stage: LoadStage) -> Result<(), StageError> {
		match stage {
			LoadStage::Preload => self.preload(),
			LoadStage::Patch => self.patch(),
			LoadStage::SubsystemA => self.start_chainloader(),
			LoadStage::SubsystemB => self.start_mod_loader(),
			LoadStage::AppEntry => self.enter_app(),
		}
	}

	fn preload(&mut self) -> Result<(), StageError> {
		let chainloader = self.runtime.load_from_path(&self.config.chainloader)?;
		tracing::debug!(module = %chainloader.identity(), "preload.chainloader");

		let dir = self.runtime.resolve_path(&self.config.mod_loader_dir);
		for path in module_files(&dir)? {
			let module = self.runtime.load_from_path(&path)?;
			tracing::debug!(module = %module.identity(), "preload.mod_loader");
		}

		let primary = self
			.runtime
			.registry()
			.find_by_name(&self.config.mod_loader_module)
			.ok_or_else(|| StageError::MissingModule(self.config.mod_loader_module.clone()))?;
		self.chainloader = Some(chainloader);
		self.mod_loader_module = Some(primary);
		Ok(())
	}

	fn patch(&mut self) -> Result<(), StageError> {
		let chainloader = self.preloaded_chainloader()?;
		let entry = self.runtime.entry_point(&chainloader)?;
		let target = PatchTarget::new(entry, self.config.pattern()?);
		match EntryPatcher::new(target.clone()).apply(self.runtime)? {
			PatchOutcome::Applied { kept, dropped } => tracing::debug!(%target, kept, dropped, "patch.entry"),
			PatchOutcome::NotApplicable => tracing::warn!(%target, "patch.entry.skipped"),
		}

		let primary = self.preloaded_mod_loader()?;
		let routine = primary.capability(&self.config.load_file_capability).ok_or_else(|| StageError::MissingCapability {
			module: primary.name().to_string(),
			capability: self.config.load_file_capability.clone(),
		})?;
		RegistryShim::new(MethodRef::new(primary.name(), routine)).install(self.runtime)?;
		Ok(())
	}

	fn start_chainloader(&mut self) -> Result<(), StageError> {
		let chainloader = self.preloaded_chainloader()?;
		let result = self.runtime.invoke_entry(&chainloader, &self.args)?;
		tracing::debug!(module = chainloader.name(), result = result.kind(), "subsystem.chainloader.returned");
		Ok(())
	}

	fn start_mod_loader(&mut self) -> Result<(), StageError> {
		let primary = self.preloaded_mod_loader()?;
		let slot = Arc::clone(&self.mod_loader);
		let context = ModuleLoadContext::new(MOD_LOADER_CONTEXT, self.runtime.resolve_path(&self.config.mod_loader_dir)).with_resolver(
			move |rt: &Runtime, identity: &ModuleIdentity| {
				let loader = slot.read().clone();
				match loader {
					Some(loader) => loader.resolve_module(rt, identity),
					None => Ok(None),
				}
			},
		);
		let _scope = self.runtime.enter_context(Arc::new(context));

		for support in &self.config.support_modules {
			let path = self.runtime.resolve_path(support.path_for(&self.platform));
			if let Some(existing) = bare_name(&path).and_then(|name| self.runtime.registry().find_by_name(name)) {
				tracing::debug!(module = %existing.identity(), "subsystem.support.present");
				continue;
			}
			if !path.is_file() {
				tracing::debug!(path = %path.display(), "subsystem.support.absent");
				continue;
			}
			let module = self.runtime.load_from_path(&path)?;
			tracing::debug!(module = %module.identity(), "subsystem.support.loaded");
		}

		let loader = (self.factory)(self.runtime, &primary, &self.config)?;
		loader.initialize(self.runtime)?;
		*self.mod_loader.write() = Some(Arc::clone(&loader));
		tracing::debug!(loader = loader.name(), "subsystem.mod_loader.initialized");

		loader.full_load(self.runtime)?;
		self.install_native_resolvers();
		Ok(())
	}

	fn install_native_resolvers(&self) {
		let resolver = Arc::new(
			NativeLibraryResolver::new(&self.runtime.resolve_path(&self.config.native_root), self.platform.clone())
				.with_denied(self.config.denied_native_libraries.iter().cloned()),
		);
		let modules = self.runtime.registry().snapshot();
		for module in &modules {
			self.runtime.set_native_resolver(module.name(), resolver.clone());
		}
		self.runtime.set_default_native_resolver(resolver.clone());
		tracing::debug!(modules = modules.len(), native_dir = %resolver.native_dir().display(), "subsystem.native_resolvers");
	}

	fn enter_app(&mut self) -> Result<(), StageError> {
		let path = match &self.app_path {
			Some(path) => path.clone(),
			None => std::env::var_os(&self.config.app_path_env)
				.map(PathBuf::from)
				.ok_or_else(|| StageError::MissingAppPath(self.config.app_path_env.clone()))?,
		};
		let name = bare_name(&path).ok_or_else(|| StageError::InvalidAppPath(path.clone()))?;

		let module = match self.runtime.registry().find_by_name(name) {
			Some(existing) => {
				tracing::debug!(module = %existing.identity(), "app.reused");
				existing
			}
			None => self.runtime.load_from_path(&path)?,
		};

		let result = match self.runtime.invoke_entry(&module, &self.args)? {
			Value::Task(task) => {
				tracing::debug!(module = module.name(), "app.wait");
				task.wait()?
			}
			other => other,
		};
		self.exit_code = exit_code(&result);
		tracing::debug!(module = module.name(), exit_code = self.exit_code, "app.returned");
		Ok(())
	}

	fn preloaded_chainloader(&self) -> Result<Arc<Module>, StageError> {
		self.chainloader
			.clone()
			.ok_or_else(|| StageError::MissingModule(self.config.chainloader.display().to_string()))
	}

	fn preloaded_mod_loader(&self) -> Result<Arc<Module>, StageError> {
		self.mod_loader_module
			.clone()
			.ok_or_else(|| StageError::MissingModule(self.config.mod_loader_module.clone()))
	}
}

/// Module files directly inside `dir`, sorted by path.
fn module_files(dir: &Path) -> Result<Vec<PathBuf>, StageError> {
	let list_error = |source: std::io::Error| StageError::ListModules {
		path: dir.to_path_buf(),
		source,
	};
	let mut files = Vec::new();
	for entry in std::fs::read_dir(dir).map_err(list_error)? {
		let path = entry.map_err(list_error)?.path();
		if path.is_file() && path.extension().is_some_and(|ext| ext == MODULE_EXTENSION) {
			files.push(path);
		}
	}
	files.sort();
	Ok(files)
}

fn exit_code(result: &Value) -> i32 {
	match result.as_int() {
		Some(code) => i32::try_from(code).unwrap_or(if code < 0 { i32::MIN } else { i32::MAX }),
		None => 0,
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

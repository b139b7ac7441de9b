use std::fmt;

/// Phases of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
	Preload,
	Patch,
	SubsystemA,
	SubsystemB,
	AppEntry,
}

impl LoadStage {
	/// Tag written to the crash log for failures in this stage.
	pub fn label(self) -> &'static str {
		match self {
			Self::Preload => "Preload",
			Self::Patch => "Patch",
			Self::SubsystemA => "SubsystemA",
			Self::SubsystemB => "SubsystemB",
			Self::AppEntry => "AppEntry",
		}
	}
}

impl fmt::Display for LoadStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
	Pending,
	Succeeded,
	/// Carries the rendered error or panic message.
	Failed(String),
	/// Never started because an earlier stage failed.
	Skipped,
}

/// Ordered stage outcomes for one run.
///
/// Stages advance strictly in plan order. The first failure terminates the
/// sequence and every stage after it becomes [`StageState::Skipped`].
#[derive(Debug, Clone)]
pub struct StageSequence {
	stages: Vec<(LoadStage, StageState)>,
	cursor: usize,
}

impl StageSequence {
	pub fn new(plan: impl IntoIterator<Item = LoadStage>) -> Self {
		Self {
			stages: plan.into_iter().map(|stage| (stage, StageState::Pending)).collect(),
			cursor: 0,
		}
	}

	/// The stage to run next, if the sequence has not terminated.
	pub fn next_stage(&self) -> Option<LoadStage> {
		self.stages.get(self.cursor).map(|(stage, _)| *stage)
	}

	pub fn complete(&mut self, stage: LoadStage) {
		debug_assert_eq!(self.next_stage(), Some(stage), "stages complete in order");
		if let Some((_, state)) = self.stages.get_mut(self.cursor) {
			*state = StageState::Succeeded;
			self.cursor += 1;
		}
	}

	pub fn fail(&mut self, stage: LoadStage, message: impl Into<String>) {
		debug_assert_eq!(self.next_stage(), Some(stage), "only the running stage can fail");
		let Some((_, state)) = self.stages.get_mut(self.cursor) else {
			return;
		};
		*state = StageState::Failed(message.into());
		for (_, later) in &mut self.stages[self.cursor + 1..] {
			*later = StageState::Skipped;
		}
		self.cursor = self.stages.len();
	}

	pub fn state(&self, stage: LoadStage) -> Option<&StageState> {
		self.stages.iter().find(|(s, _)| *s == stage).map(|(_, state)| state)
	}

	pub fn outcomes(&self) -> &[(LoadStage, StageState)] {
		&self.stages
	}

	pub fn failed_stage(&self) -> Option<LoadStage> {
		self.stages
			.iter()
			.find(|(_, state)| matches!(state, StageState::Failed(_)))
			.map(|(stage, _)| *stage)
	}

	/// True once every stage succeeded.
	pub fn is_complete(&self) -> bool {
		self.stages.iter().all(|(_, state)| *state == StageState::Succeeded)
	}
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
	pub stages: Vec<(LoadStage, StageState)>,
	/// Exit code derived from the application's entry result.
	pub exit_code: i32,
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn standard() -> StageSequence {
		StageSequence::new([
			LoadStage::Preload,
			LoadStage::Patch,
			LoadStage::SubsystemA,
			LoadStage::SubsystemB,
			LoadStage::AppEntry,
		])
	}

	#[test]
	fn failure_skips_remaining_stages() {
		let mut seq = standard();
		seq.complete(LoadStage::Preload);
		seq.fail(LoadStage::Patch, "boom");

		assert_eq!(seq.next_stage(), None);
		assert_eq!(seq.failed_stage(), Some(LoadStage::Patch));
		assert_eq!(seq.state(LoadStage::Preload), Some(&StageState::Succeeded));
		assert_eq!(seq.state(LoadStage::Patch), Some(&StageState::Failed("boom".into())));
		for stage in [LoadStage::SubsystemA, LoadStage::SubsystemB, LoadStage::AppEntry] {
			assert_eq!(seq.state(stage), Some(&StageState::Skipped));
		}
		assert!(!seq.is_complete());
	}

	#[test]
	fn completes_in_plan_order() {
		let mut seq = standard();
		let mut ran = Vec::new();
		while let Some(stage) = seq.next_stage() {
			ran.push(stage);
			seq.complete(stage);
		}
		assert_eq!(ran.len(), 5);
		assert_eq!(ran[0], LoadStage::Preload);
		assert_eq!(ran[4], LoadStage::AppEntry);
		assert!(seq.is_complete());
	}
}

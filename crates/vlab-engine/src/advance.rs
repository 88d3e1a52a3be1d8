use tracing::{error, trace};
use vlab_core::{ErrorInfo, LabError};
use vlab_procedure::StepAction;

use crate::actions::apply_internal_flag;
use crate::history::CommitOrigin;
use crate::session::Session;

/// Steps fast-forwarded by one run of the processor.
#[derive(Debug, Default)]
pub(crate) struct AutoAdvance {
    pub(crate) completed: Vec<usize>,
    pub(crate) halted: Option<LabError>,
}

impl Session {
    /// Commits automatic steps until the pointer reaches an interactive step
    /// or the end of the procedure.
    ///
    /// A failing step halts the run with the pointer left on it; steps
    /// committed before it stay committed.
    pub(crate) fn run_auto_advance(&mut self) -> AutoAdvance {
        let procedure = self.procedure_handle();
        let mut run = AutoAdvance::default();
        while let Some(step) = procedure.step_at(self.step).filter(|step| step.flags.automatic) {
            let index = self.step;
            trace!(step = index, action = %step.kind(), "auto-advance");
            let result = match &step.action {
                StepAction::Informational => self.commit_step(CommitOrigin::Automatic, step, |_, _| Ok(())),
                StepAction::SetHiddenFlag { object, flag } => {
                    self.commit_step(CommitOrigin::Automatic, step, |lab, bench| {
                        apply_internal_flag(lab, bench, object, *flag)
                    })
                }
                other => Err(LabError::InternalStepFailure(ErrorInfo::new(
                    "not-automatic",
                    format!("{} cannot run without the learner", other.kind()),
                ))),
            };
            if let Err(cause) = result {
                error!(step = index, error = %cause, "auto-advance halted");
                run.halted = Some(LabError::InternalStepFailure(
                    ErrorInfo::new("automatic-step-failed", "an automatic step could not complete")
                        .with_context("step", index.to_string())
                        .with_context("action", step.kind().as_str())
                        .with_context("cause", cause.info().code.clone())
                        .with_hint(procedure.hint_key(index)),
                ));
                break;
            }
            run.completed.push(index);
        }
        run
    }
}

//! Dispatch: one run specification -> one executed, verified pipeline run.

use crate::config::{Extras, SynchronizerKind};
use crate::driver::{run_linked, run_plane_synced, run_sequential, PipelineRun};
use crate::links::{timer_rule, LinkKind, RetunePlan};
use crate::sync::{AltBitSync, CounterSync};
use crate::workload::Workload;
use anyhow::{bail, Result};
use stepsync::{StepRule, WatchdogHandle};

/// Rows a monitor-rule consumer tolerates waiting on before it shrinks the
/// publication step.
const MONITOR_WAIT_THRESHOLD: u32 = 4;

/// Measured outcome of one repetition of one run.
pub struct RunOutcome {
    pub seconds: f64,
    /// `Some` for the promise family: `[iteration][thread]` seconds.
    pub iteration_times: Option<Vec<Vec<f64>>>,
}

/// Executes one repetition of `kind` and verifies its result against the
/// sequential reference.
pub fn execute(
    kind: SynchronizerKind,
    extras: Extras,
    workload: &Workload,
    watchdog: Option<&WatchdogHandle>,
) -> Result<RunOutcome> {
    let run = match kind {
        SynchronizerKind::Sequential => run_sequential(workload, watchdog),
        SynchronizerKind::AltBit => {
            let sync = AltBitSync::new(workload.threads);
            run_plane_synced(workload, &sync, watchdog)
        }
        SynchronizerKind::Counter => {
            let sync = CounterSync::new(workload.threads);
            run_plane_synced(workload, &sync, watchdog)
        }
        SynchronizerKind::ArrayOfPromises => {
            run_linked(workload, LinkKind::OneShotArray, watchdog)
        }
        SynchronizerKind::PromiseOfArray => run_linked(workload, LinkKind::OneShotVec, watchdog),
        SynchronizerKind::StaticStepPlus => run_linked(
            workload,
            LinkKind::Static {
                step: extras.step as usize,
            },
            watchdog,
        ),
        _ => {
            let (rule, plan) = dynamic_rule(kind, extras, workload.rows)?;
            run_linked(
                workload,
                LinkKind::Dynamic {
                    step: extras.step as usize,
                    rule,
                    plan,
                },
                watchdog,
            )
        }
    };

    verify(kind, workload, &run)?;

    let iteration_times = kind.is_promise_family().then_some(run.iteration_times);
    Ok(RunOutcome {
        seconds: run.elapsed.as_secs_f64(),
        iteration_times,
    })
}

/// Maps a dynamic-step run specification onto a step rule and the scheduled
/// retune that exercises it.
fn dynamic_rule(
    kind: SynchronizerKind,
    extras: Extras,
    rows: usize,
) -> Result<(StepRule, RetunePlan)> {
    let retune_row = extras.retune_row.unwrap_or(rows / 2).min(rows - 1);
    let retune_step = extras
        .retune_step
        .unwrap_or_else(|| (extras.step / 2).max(1)) as usize;
    let producer_plan = RetunePlan::Producer {
        row: retune_row,
        step: retune_step,
    };
    let consumer_plan = RetunePlan::Consumer {
        row: retune_row,
        step: retune_step,
    };

    Ok(match kind {
        SynchronizerKind::DspProdOnly => (StepRule::ProducerOnly { unblock: false }, producer_plan),
        SynchronizerKind::DspProdUnblocks => {
            (StepRule::ProducerOnly { unblock: true }, producer_plan)
        }
        SynchronizerKind::DspConsOnly => (StepRule::ConsumerOnly { unblock: false }, consumer_plan),
        SynchronizerKind::DspConsUnblocks => {
            (StepRule::ConsumerOnly { unblock: true }, consumer_plan)
        }
        SynchronizerKind::DspBoth => (StepRule::Both { unblock: false }, producer_plan),
        SynchronizerKind::DspBothUnblocks => (StepRule::Both { unblock: true }, consumer_plan),
        SynchronizerKind::DspProdTimer => {
            (timer_rule(extras.timer_budget_us, false), RetunePlan::None)
        }
        SynchronizerKind::DspProdTimerUnblocks => {
            (timer_rule(extras.timer_budget_us, true), RetunePlan::None)
        }
        SynchronizerKind::DspMonitor => (
            StepRule::ConsumerOnly { unblock: true },
            RetunePlan::Monitor {
                threshold: MONITOR_WAIT_THRESHOLD,
            },
        ),
        SynchronizerKind::DspNever => (StepRule::Never, RetunePlan::None),
        _ => bail!("{} is not a dynamic-step synchronizer", kind.name()),
    })
}

fn verify(kind: SynchronizerKind, workload: &Workload, run: &PipelineRun) -> Result<()> {
    let reference = workload.reference();
    if run.slabs != reference {
        bail!(
            "{} produced slabs that diverge from the sequential reference",
            kind.name()
        );
    }
    Ok(())
}

/// Actor Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Run one actor (submission or reference) over the whole dataset and
/// return exactly one outcome per record, in dataset order.
///
/// **Architecture:**
/// 1. Compile once when the plan has a compile step (engine.rs)
/// 2. Run every record, either one process per record or through a
///    long-lived adapter
/// 3. Hand the index-aligned outcomes back to the caller for storage
///
/// This module is the glue layer - it knows nothing about:
/// - How processes are spawned (engine's job)
/// - How outcomes are scored (evaluator's job)

use crate::engine::{Dispatch, ExecutionPlan, PersistentProcess, ProcessEngine};
use assay_common::types::{Actor, ExecutionOutcome, TaskSpec, TestDataset, Value};
use assay_common::{PipelineError, PipelineResult};
use tracing::{debug, info, instrument, warn};

/// How the run command is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// A fresh process per record, record fields on stdin one per line.
    SpawnPerRecord,
    /// One adapter process answering a line per record.
    Persistent,
}

/// Query a dispatcher once per argument list.
///
/// A failing record is recorded and the loop carries on; the result always
/// has one entry per input.
pub async fn dispatch_all<D: Dispatch + ?Sized>(
    adapter: &mut D,
    records: &[Vec<Value>],
) -> Vec<ExecutionOutcome> {
    let mut outcomes = Vec::with_capacity(records.len());
    for (idx, args) in records.iter().enumerate() {
        let outcome = match adapter.call(args).await {
            Ok(value) => ExecutionOutcome::Checked(value),
            Err(e) => e.into_outcome(),
        };
        debug!(record = idx, status = outcome.label(), "Record dispatched");
        outcomes.push(outcome);
    }
    outcomes
}

/// Execute one actor over the dataset.
///
/// A failed compile stands in for every record and the run command is
/// never started. With no records to carry it, the failure is fatal.
#[instrument(skip(engine, actor, plan, spec, dataset), fields(actor = %actor, records = dataset.len()))]
pub async fn execute_actor(
    engine: &ProcessEngine,
    actor: Actor,
    plan: &ExecutionPlan,
    strategy: Strategy,
    spec: &TaskSpec,
    dataset: &TestDataset,
) -> PipelineResult<Vec<ExecutionOutcome>> {
    info!(
        run = %plan.run,
        compile = plan.compile.is_some(),
        strategy = ?strategy,
        "Starting actor execution"
    );

    if let Some(compile) = &plan.compile {
        if let Some(failure) = engine.compile(compile).await? {
            if dataset.is_empty() {
                return Err(PipelineError::CompilationFailed {
                    actor: actor.to_string(),
                    detail: failure.payload().to_string(),
                });
            }
            warn!(
                status = failure.label(),
                "Compilation failed; every record receives the compile outcome"
            );
            return Ok(vec![failure; dataset.len()]);
        }
    }

    let outcomes = match strategy {
        Strategy::SpawnPerRecord => {
            let mut outcomes = Vec::with_capacity(dataset.len());
            for (idx, record) in dataset.iter().enumerate() {
                let outcome = engine.run(&plan.run, Some(&record.stdin_payload())).await?;
                debug!(record = idx, status = outcome.label(), "Record executed");
                outcomes.push(outcome);
            }
            outcomes
        }
        Strategy::Persistent => {
            let typed = dataset
                .iter()
                .map(|record| spec.typed_record(record))
                .collect::<PipelineResult<Vec<_>>>()?;
            let mut adapter = PersistentProcess::spawn(plan.run.clone(), engine)?;
            let outcomes = dispatch_all(&mut adapter, &typed).await;
            adapter.shutdown().await;
            outcomes
        }
    };

    let checked = outcomes.iter().filter(|o| o.is_checked()).count();
    info!(
        checked = checked,
        failed = outcomes.len() - checked,
        "Actor execution complete"
    );

    Ok(outcomes)
}

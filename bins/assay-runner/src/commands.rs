// Subcommand implementations. Each stage reads what earlier stages left in
// the working area and writes its own artifact exactly once.
use crate::config::{load_task_spec, parse_task_input};
use crate::engine::{ExecutionPlan, ProcessEngine};
use crate::evaluator::{self, Reference};
use crate::executor::{self, Strategy};
use crate::synthesizer;
use anyhow::{Context, Result};
use assay_common::config::RunnerSettings;
use assay_common::types::{Actor, ExecutionOutcome, GradingReport, TaskSpec, TestDataset};
use assay_common::workdir::WorkDir;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

fn work_dir(settings: &RunnerSettings) -> WorkDir {
    WorkDir::new(&settings.work_dir)
}

fn load_spec(settings: &RunnerSettings) -> Result<TaskSpec> {
    load_task_spec(&settings.task_spec_path())
}

/// Reset the working area for a new attempt and record its task id.
pub fn preprocess(settings: &RunnerSettings, raw_input: &str) -> Result<String> {
    let input = parse_task_input(raw_input)?;
    let work = work_dir(settings);

    work.reset()
        .with_context(|| format!("Failed to prepare {}", settings.work_dir.display()))?;
    work.save_task_id(&input.tid)?;

    info!(
        tid = %input.tid,
        fields = input.fields.len(),
        work_dir = %settings.work_dir.display(),
        "Working area prepared"
    );
    Ok(input.tid)
}

/// Synthesize the dataset and persist it before anything is executed.
pub fn generate(settings: &RunnerSettings) -> Result<TestDataset> {
    let spec = load_spec(settings)?;
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let dataset = synthesizer::synthesize(&spec, &mut rng)?;
    work_dir(settings)
        .store_dataset(&dataset)
        .context("Failed to store dataset")?;

    info!(task = %spec.name, records = dataset.len(), seed = ?settings.seed, "Dataset generated");
    Ok(dataset)
}

/// Run one actor over the stored dataset and persist its outcomes.
pub async fn execute(
    settings: &RunnerSettings,
    actor: Actor,
    plan: &ExecutionPlan,
    strategy: Strategy,
) -> Result<Vec<ExecutionOutcome>> {
    let work = work_dir(settings);
    let dataset = work.load_dataset().context("Failed to load dataset")?;

    // Only the persistent adapter needs typed arguments.
    let spec = match strategy {
        Strategy::Persistent => load_spec(settings)?,
        Strategy::SpawnPerRecord => TaskSpec::default(),
    };

    let mut engine = ProcessEngine::new(settings.timeout());
    let source_dir = work.source_dir(actor);
    if source_dir.is_dir() {
        engine = engine.with_working_dir(source_dir);
    }

    let outcomes = executor::execute_actor(&engine, actor, plan, strategy, &spec, &dataset).await?;
    work.store_outcomes(actor, &outcomes)
        .with_context(|| format!("Failed to store {} outcomes", actor))?;

    Ok(outcomes)
}

/// Grade the stored submission outcomes.
///
/// Dual-execution mode when reference outcomes exist, expected-value mode
/// otherwise.
pub fn feedback(settings: &RunnerSettings) -> Result<GradingReport> {
    let work = work_dir(settings);
    if work.has_outcomes(Actor::Reference) {
        let tid = work.load_task_id().context("Failed to load task id")?;
        let dataset = work.load_dataset().context("Failed to load dataset")?;
        let submission = work
            .load_outcomes(Actor::Submission)
            .context("Failed to load submission outcomes")?;
        let reference = work
            .load_outcomes(Actor::Reference)
            .context("Failed to load reference outcomes")?;

        info!(mode = "dual", "Grading submission");
        Ok(evaluator::grade(&tid, &dataset, &submission, Reference::Outcomes(&reference))?)
    } else {
        feedback_expected(settings)
    }
}

fn feedback_expected(settings: &RunnerSettings) -> Result<GradingReport> {
    let work = work_dir(settings);
    let spec = load_spec(settings)?;
    let tid = work.load_task_id().context("Failed to load task id")?;
    let dataset = work.load_dataset().context("Failed to load dataset")?;
    let submission = work
        .load_outcomes(Actor::Submission)
        .context("Failed to load submission outcomes")?;
    let expected = spec.expectations(dataset.len())?;

    info!(mode = "expected", "Grading submission");
    Ok(evaluator::grade(&tid, &dataset, &submission, Reference::Expected(&expected))?)
}

/// Input/output variant: generate, run the submission, grade against the
/// expected outputs, all in one invocation.
pub async fn test(settings: &RunnerSettings, plan: &ExecutionPlan) -> Result<GradingReport> {
    generate(settings)?;
    execute(settings, Actor::Submission, plan, Strategy::SpawnPerRecord).await?;
    feedback_expected(settings)
}

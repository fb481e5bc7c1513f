/// Grading Engine - Language-Agnostic Scoring Logic
///
/// **Core Responsibility:**
/// Reconcile the submission's outcomes with the reference, record by record,
/// and turn the result into a [`GradingReport`].
///
/// **Critical Properties:**
/// - Knows nothing about processes or language runtimes
/// - Pure function: (dataset, submission outcomes, reference) → report
/// - Alignment is positional: outcome `i` belongs to record `i`
///
/// **Reference Modes:**
/// - Dual execution: the reference implementation's own outcomes
/// - Expected value: literal expected outputs from the task specification
///
/// **Comparison Rules:**
/// - Exact payload equality, whitespace and case included
/// - Trailing line breaks are already stripped by the engine
/// - Only a `Checked` submission can ever match

use assay_common::types::{
    Example, ExecutionOutcome, Expectation, Feedback, GradingReport, GradingStatus, Stats,
    TestDataset,
};
use assay_common::{PipelineError, PipelineResult};
use tracing::{debug, info, warn};

/// What the submission is graded against.
#[derive(Debug, Clone, Copy)]
pub enum Reference<'a> {
    Outcomes(&'a [ExecutionOutcome]),
    Expected(&'a [Expectation]),
}

impl Reference<'_> {
    fn len(&self) -> usize {
        match self {
            Reference::Outcomes(outcomes) => outcomes.len(),
            Reference::Expected(expected) => expected.len(),
        }
    }

    /// Verbatim input to show instead of the rendered record, if any.
    fn raw_input(&self, index: usize) -> Option<&str> {
        match self {
            Reference::Outcomes(_) => None,
            Reference::Expected(expected) => expected[index].input.as_deref(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Reference::Outcomes(_) => "reference outcomes",
            Reference::Expected(_) => "expected outputs",
        }
    }
}

/// Result of comparing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordVerdict {
    Match,
    Mismatch {
        expected: Option<String>,
        actual: Option<String>,
        hint: Option<String>,
    },
}

/// Compare one submission outcome with its reference counterpart.
pub fn evaluate_record(
    index: usize,
    submission: &ExecutionOutcome,
    reference: Reference<'_>,
) -> RecordVerdict {
    let (expected, hint) = match reference {
        Reference::Outcomes(outcomes) => {
            let outcome = &outcomes[index];
            if !outcome.is_checked() {
                warn!(
                    record = index,
                    status = outcome.label(),
                    "Reference produced no answer for record"
                );
            }
            (outcome.checked_value(), None)
        }
        Reference::Expected(expected) => {
            let expectation = &expected[index];
            (Some(expectation.output.as_str()), expectation.message.clone())
        }
    };

    let actual = submission.checked_value();
    match (actual, expected) {
        (Some(actual), Some(expected)) if actual == expected => RecordVerdict::Match,
        _ => RecordVerdict::Mismatch {
            expected: expected.map(str::to_string),
            actual: actual.map(str::to_string),
            hint: if submission.is_checked() { hint } else { None },
        },
    }
}

/// Learner-facing message for a submission that produced no answer.
fn failure_message(outcome: &ExecutionOutcome) -> String {
    let detail = outcome.payload().lines().next().unwrap_or("").trim();
    match outcome {
        ExecutionOutcome::TimedOut(_) => "Your code exceeded the time limit".to_string(),
        ExecutionOutcome::Exception(_) => {
            format!("An exception was raised by your code: {}", detail)
        }
        _ => format!("An error occurred with your code: {}", detail),
    }
}

fn check_length(what: &str, expected: usize, actual: usize) -> PipelineResult<()> {
    if expected != actual {
        return Err(PipelineError::LengthMismatch {
            what: what.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Grade a submission.
///
/// Every record is evaluated; the first mismatch fixes the counterexample
/// and the message is set at most once. An empty dataset is a success with
/// score 1.0.
pub fn grade(
    task_id: &str,
    dataset: &TestDataset,
    submission: &[ExecutionOutcome],
    reference: Reference<'_>,
) -> PipelineResult<GradingReport> {
    check_length("submission outcomes", dataset.len(), submission.len())?;
    check_length(reference.describe(), dataset.len(), reference.len())?;

    let total = dataset.len();
    let mut succeeded = 0usize;
    let mut failed = false;
    let mut example: Option<Example> = None;
    let mut message: Option<String> = None;

    for (index, (record, outcome)) in dataset.iter().zip(submission).enumerate() {
        let verdict = evaluate_record(index, outcome, reference);
        debug!(record = index, input = %record.render(), verdict = ?verdict, "Record graded");

        match verdict {
            RecordVerdict::Match => succeeded += 1,
            RecordVerdict::Mismatch {
                expected,
                actual,
                hint,
            } => {
                if !failed {
                    failed = true;
                    example = Some(Example {
                        input: reference
                            .raw_input(index)
                            .map(str::to_string)
                            .unwrap_or_else(|| record.render()),
                        expected,
                        actual,
                    });
                    if message.is_none() {
                        message = hint;
                    }
                }
            }
        }

        if !outcome.is_checked() && message.is_none() {
            message = Some(failure_message(outcome));
        }
    }

    let score = if total == 0 {
        1.0
    } else {
        succeeded as f64 / total as f64
    };
    let status = if failed {
        GradingStatus::Failed
    } else {
        GradingStatus::Success
    };

    info!(
        task_id = task_id,
        succeeded = succeeded,
        total = total,
        score = score,
        status = ?status,
        "Grading complete"
    );

    Ok(GradingReport {
        task_id: task_id.to_string(),
        status,
        feedback: Some(Feedback {
            message,
            example,
            stats: Some(Stats { succeeded, total }),
            score,
        }),
    })
}

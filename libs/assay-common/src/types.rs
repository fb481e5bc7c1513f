use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Learner input handed to `preprocess`: the task id and the filled-in fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub tid: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    Int,
    Float,
    Bool,
    String,
    Enum,
}

impl ArgType {
    /// Convert one record field into a typed value.
    pub fn parse_value(&self, field: &str) -> PipelineResult<Value> {
        let bad = |kind: &str| {
            PipelineError::MalformedSpec(format!("'{}' is not a valid {} value", field, kind))
        };
        let text = field.trim();
        match self {
            ArgType::Int => text
                .parse()
                .map(|value| Value::Int {
                    value,
                    text: text.to_string(),
                })
                .map_err(|_| bad("int")),
            ArgType::Float => text
                .parse()
                .map(|value| Value::Float {
                    value,
                    text: text.to_string(),
                })
                .map_err(|_| bad("float")),
            ArgType::Bool => match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(bad("bool")),
            },
            ArgType::String | ArgType::Enum => Ok(Value::Str(field.to_string())),
        }
    }
}

/// A typed argument handed to a language adapter.
///
/// Numbers keep the text they were parsed from, so an adapter sees `1.500000`
/// exactly as a spawned program reading the dataset would.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int { value: i64, text: String },
    Float { value: f64, text: String },
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn int(value: i64) -> Self {
        Value::Int {
            value,
            text: value.to_string(),
        }
    }

    pub fn float(value: f64) -> Self {
        Value::Float {
            value,
            text: value.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int { text, .. } | Value::Float { text, .. } => f.write_str(text),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredefinedTest {
    /// Literal record, `(v1,v2,...)`; input/output tasks use a raw `input` string.
    #[serde(alias = "input")]
    pub data: String,
    #[serde(default, alias = "output", skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<serde_json::Map<String, serde_json::Value>>,
}

impl PredefinedTest {
    /// Whether `data` is a parenthesized `(v1,v2,...)` tuple rather than a
    /// raw standard-input string.
    pub fn is_tuple_literal(&self) -> bool {
        self.data
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomConfig {
    #[serde(default)]
    pub n: usize,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Task specification as authored in `config/test.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub predefined: Vec<PredefinedTest>,
    #[serde(default)]
    pub random: RandomConfig,
}

impl TaskSpec {
    /// Structural checks that do not need the generator grammar.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.random.n > 0 && self.random.args.is_empty() {
            return Err(PipelineError::MalformedSpec(format!(
                "{} random tests requested but no generator descriptors declared",
                self.random.n
            )));
        }
        if !self.args.is_empty() && self.random.n > 0 && self.random.args.len() != self.args.len()
        {
            return Err(PipelineError::MalformedSpec(format!(
                "{} generator descriptors declared for {} arguments",
                self.random.args.len(),
                self.args.len()
            )));
        }
        Ok(())
    }

    /// Type every field of a record according to the declared arguments.
    ///
    /// Without declared arguments every field is passed through as a string.
    pub fn typed_record(&self, record: &TestRecord) -> PipelineResult<Vec<Value>> {
        if self.args.is_empty() {
            return Ok(record.fields().iter().cloned().map(Value::Str).collect());
        }
        if record.len() != self.args.len() {
            return Err(PipelineError::MalformedSpec(format!(
                "record {} has {} fields but '{}' declares {} arguments",
                record.render(),
                record.len(),
                self.name,
                self.args.len()
            )));
        }
        record
            .fields()
            .iter()
            .zip(&self.args)
            .map(|(field, arg)| arg.arg_type.parse_value(field))
            .collect()
    }

    /// Expected outputs for expected-value grading, one per dataset record.
    ///
    /// Only datasets made entirely of predefined tests that all carry an
    /// expected output can be graded this way.
    pub fn expectations(&self, dataset_len: usize) -> PipelineResult<Vec<Expectation>> {
        if dataset_len != self.predefined.len() {
            return Err(PipelineError::MalformedSpec(format!(
                "expected-value grading needs a predefined-only dataset ({} records, {} predefined)",
                dataset_len,
                self.predefined.len()
            )));
        }
        self.predefined
            .iter()
            .enumerate()
            .map(|(idx, test)| match &test.expected {
                Some(output) => Ok(Expectation {
                    output: output.clone(),
                    message: test.message.clone(),
                    input: (!test.is_tuple_literal()).then(|| test.data.clone()),
                }),
                None => Err(PipelineError::MalformedSpec(format!(
                    "predefined test {} has no expected output",
                    idx
                ))),
            })
            .collect()
    }
}

/// One test input: string-encoded argument values in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TestRecord(Vec<String>);

impl TestRecord {
    pub fn new(fields: Vec<String>) -> Self {
        TestRecord(fields)
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable rendering used in counterexamples: `(v1,v2,...)`.
    pub fn render(&self) -> String {
        format!("({})", self.0.join(","))
    }

    /// Standard input for spawn-per-record runs: one field per line.
    pub fn stdin_payload(&self) -> String {
        let mut payload = String::new();
        for field in &self.0 {
            payload.push_str(field);
            payload.push('\n');
        }
        payload
    }
}

impl From<Vec<&str>> for TestRecord {
    fn from(fields: Vec<&str>) -> Self {
        TestRecord(fields.into_iter().map(str::to_string).collect())
    }
}

/// Ordered test records. The index of a record is the key that aligns
/// every outcome stream with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestDataset {
    records: Vec<TestRecord>,
}

impl TestDataset {
    pub fn new(records: Vec<TestRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    Submission,
    Reference,
}

impl Actor {
    /// Directory (relative to the working area) holding the actor's source tree.
    pub fn source_dir(&self) -> &'static str {
        match self {
            Actor::Submission => "student",
            Actor::Reference => "teacher",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Submission => write!(f, "submission"),
            Actor::Reference => write!(f, "reference"),
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submission" | "student" => Ok(Actor::Submission),
            "reference" | "teacher" | "solution" => Ok(Actor::Reference),
            other => Err(format!(
                "unknown actor '{}' (expected submission or reference)",
                other
            )),
        }
    }
}

/// Classified result of running one actor against one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The actor produced an answer.
    Checked(String),
    /// The program failed; payload is its diagnostic output.
    Error(String),
    /// An in-language exception was raised while evaluating the record.
    Exception(String),
    /// The wall-clock limit was hit.
    TimedOut(String),
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Checked(_) => "checked",
            ExecutionOutcome::Error(_) => "error",
            ExecutionOutcome::Exception(_) => "exception",
            ExecutionOutcome::TimedOut(_) => "timeout",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            ExecutionOutcome::Checked(p)
            | ExecutionOutcome::Error(p)
            | ExecutionOutcome::Exception(p)
            | ExecutionOutcome::TimedOut(p) => p,
        }
    }

    pub fn checked_value(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Checked(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self, ExecutionOutcome::Checked(_))
    }
}

/// Literal expected output of one record, with an optional hint shown
/// to the learner when that record is the first to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub output: String,
    pub message: Option<String>,
    /// Raw standard input, shown verbatim in counterexamples.
    pub input: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub succeeded: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Example>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    pub score: f64,
}

/// Final verdict for one grading attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingReport {
    #[serde(rename = "tid")]
    pub task_id: String,
    pub status: GradingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

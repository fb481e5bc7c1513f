//! Flat-file encodings shared by every stage of an attempt.
//!
//! Datasets are delimited text: one record per line, fields separated by `;`
//! and quoted with `"` when they are empty or contain a delimiter, a quote or
//! a line break (quotes inside a quoted field are doubled). Outcome streams
//! are one `status:payload` line per record with the payload escaped so that
//! multi-line diagnostics stay on a single line.

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ExecutionOutcome, TestDataset, TestRecord};

pub const FIELD_DELIMITER: char = ';';
pub const QUOTE: char = '"';

fn needs_quotes(field: &str) -> bool {
    field.is_empty()
        || field
            .chars()
            .any(|c| c == FIELD_DELIMITER || c == QUOTE || c == '\n' || c == '\r')
}

/// Render one record as a single dataset line (without the line break).
pub fn encode_record(record: &TestRecord) -> String {
    let mut line = String::new();
    for (idx, field) in record.fields().iter().enumerate() {
        if idx > 0 {
            line.push(FIELD_DELIMITER);
        }
        if needs_quotes(field) {
            line.push(QUOTE);
            for c in field.chars() {
                if c == QUOTE {
                    line.push(QUOTE);
                }
                line.push(c);
            }
            line.push(QUOTE);
        } else {
            line.push_str(field);
        }
    }
    line
}

pub fn encode_dataset(dataset: &TestDataset) -> String {
    let mut out = String::new();
    for record in dataset.iter() {
        out.push_str(&encode_record(record));
        out.push('\n');
    }
    out
}

/// Parse dataset text back into records, preserving their order.
pub fn decode_dataset(content: &str) -> PipelineResult<TestDataset> {
    let corrupt = |line: usize, reason: &str| PipelineError::CorruptFile {
        file: "dataset".to_string(),
        line,
        reason: reason.to_string(),
    };

    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut line = 1;
    let mut in_quotes = false;
    // Current field was quoted and its closing quote has been seen.
    let mut closed = false;
    // Anything at all was read for the current record.
    let mut pending = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.push(QUOTE);
                }
                QUOTE => {
                    in_quotes = false;
                    closed = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            QUOTE if field.is_empty() && !closed => {
                in_quotes = true;
                pending = true;
            }
            QUOTE => return Err(corrupt(line, "stray quote inside an unquoted field")),
            FIELD_DELIMITER => {
                fields.push(std::mem::take(&mut field));
                closed = false;
                pending = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if pending {
                    fields.push(std::mem::take(&mut field));
                }
                records.push(TestRecord::new(std::mem::take(&mut fields)));
                closed = false;
                pending = false;
                line += 1;
            }
            _ if closed => return Err(corrupt(line, "text after a closing quote")),
            _ => {
                field.push(c);
                pending = true;
            }
        }
    }

    if in_quotes {
        return Err(corrupt(line, "unterminated quoted field"));
    }
    if pending {
        fields.push(field);
        records.push(TestRecord::new(fields));
    }

    Ok(TestDataset::new(records))
}

fn escape_payload(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    for c in payload.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_payload(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub fn encode_outcome(outcome: &ExecutionOutcome) -> String {
    format!("{}:{}", outcome.label(), escape_payload(outcome.payload()))
}

pub fn decode_outcome(line: &str) -> Result<ExecutionOutcome, String> {
    let (status, payload) = line
        .split_once(':')
        .ok_or_else(|| format!("missing status separator in '{}'", line))?;
    let payload = unescape_payload(payload);
    match status {
        "checked" => Ok(ExecutionOutcome::Checked(payload)),
        "error" => Ok(ExecutionOutcome::Error(payload)),
        "exception" => Ok(ExecutionOutcome::Exception(payload)),
        "timeout" => Ok(ExecutionOutcome::TimedOut(payload)),
        other => Err(format!("unknown outcome status '{}'", other)),
    }
}

pub fn encode_outcomes(outcomes: &[ExecutionOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        out.push_str(&encode_outcome(outcome));
        out.push('\n');
    }
    out
}

pub fn decode_outcomes(file: &str, content: &str) -> PipelineResult<Vec<ExecutionOutcome>> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            decode_outcome(line).map_err(|reason| PipelineError::CorruptFile {
                file: file.to_string(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(records: Vec<Vec<&str>>) -> TestDataset {
        TestDataset::new(records.into_iter().map(TestRecord::from).collect())
    }

    #[test]
    fn test_encode_plain_record() {
        let record = TestRecord::from(vec!["2", "3"]);
        assert_eq!(encode_record(&record), "2;3");
    }

    #[test]
    fn test_encode_quotes_when_needed() {
        let record = TestRecord::from(vec!["a;b", "say \"hi\"", "", "x,y"]);
        assert_eq!(encode_record(&record), "\"a;b\";\"say \"\"hi\"\"\";\"\";x,y");
    }

    #[test]
    fn test_round_trip_with_commas_quotes_and_empty_fields() {
        let original = dataset(vec![
            vec!["1,2", "", "plain"],
            vec!["\"quoted, with comma\"", "a;b"],
            vec![""],
            vec![],
            vec!["multi\nline", "end"],
        ]);

        let decoded = decode_dataset(&encode_dataset(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_without_trailing_newline() {
        let decoded = decode_dataset("1;2\n3;4").unwrap();
        assert_eq!(decoded, dataset(vec![vec!["1", "2"], vec!["3", "4"]]));
    }

    #[test]
    fn test_decode_crlf() {
        let decoded = decode_dataset("1;2\r\n3;4\r\n").unwrap();
        assert_eq!(decoded, dataset(vec![vec!["1", "2"], vec!["3", "4"]]));
    }

    #[test]
    fn test_decode_trailing_empty_field() {
        let decoded = decode_dataset("1;\n").unwrap();
        assert_eq!(decoded, dataset(vec![vec!["1", ""]]));
    }

    #[test]
    fn test_decode_rejects_malformed_quoting() {
        assert!(matches!(
            decode_dataset("\"open;1\n"),
            Err(PipelineError::CorruptFile { .. })
        ));
        assert!(matches!(
            decode_dataset("ab\"c;1\n"),
            Err(PipelineError::CorruptFile { line: 1, .. })
        ));
        assert!(matches!(
            decode_dataset("1\n\"a\"b;1\n"),
            Err(PipelineError::CorruptFile { line: 2, .. })
        ));
    }

    #[test]
    fn test_empty_dataset() {
        assert!(decode_dataset("").unwrap().is_empty());
        assert_eq!(encode_dataset(&TestDataset::default()), "");
    }

    #[test]
    fn test_outcome_lines() {
        assert_eq!(
            encode_outcome(&ExecutionOutcome::Checked("5".to_string())),
            "checked:5"
        );
        assert_eq!(
            decode_outcome("error:division by zero").unwrap(),
            ExecutionOutcome::Error("division by zero".to_string())
        );
        assert_eq!(
            decode_outcome("checked:a:b").unwrap(),
            ExecutionOutcome::Checked("a:b".to_string())
        );
        assert_eq!(
            decode_outcome("checked:").unwrap(),
            ExecutionOutcome::Checked(String::new())
        );
        assert!(decode_outcome("passed:1").is_err());
        assert!(decode_outcome("no separator").is_err());
    }

    #[test]
    fn test_multiline_payload_stays_on_one_line() {
        let outcome = ExecutionOutcome::Error(
            "Traceback:\n  File \"main.py\"\r\nZeroDivisionError \\ end".to_string(),
        );
        let line = encode_outcome(&outcome);
        assert!(!line.contains('\n'));
        assert_eq!(decode_outcome(&line).unwrap(), outcome);
    }

    #[test]
    fn test_decode_outcomes_reports_line() {
        let err = decode_outcomes("submission.res", "checked:1\nbogus\n").unwrap_err();
        match err {
            PipelineError::CorruptFile { file, line, .. } => {
                assert_eq!(file, "submission.res");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

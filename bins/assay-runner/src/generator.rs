/// Generator Descriptor Engine
///
/// **Core Responsibility:**
/// Turn short textual descriptors such as `int(1,10)` or `enum(a,b,c)` into
/// typed value generators, and sample string-encoded values from them.
///
/// **Grammar (case-sensitive keywords):**
/// - `int(a,b)`: integer uniformly in `[a,b]`
/// - `float(a,b)`: float uniformly in `[a,b)`, rendered with 6 decimals
/// - `bool`: `true` or `false`
/// - `str(a,b)`: alphanumeric string, length uniformly in `[a,b]`
/// - `enum(v1,v2,...)`: one of the listed values, verbatim
///
/// Pure: no I/O, and the random source is always supplied by the caller.

use assay_common::{PipelineError, PipelineResult};
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref INT_RE: Regex =
        Regex::new(r"^int\(\s*(-?\d+)\s*,\s*(-?\d+)\s*\)$").expect("int descriptor regex");
    static ref FLOAT_RE: Regex =
        Regex::new(r"^float\(\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*\)$")
            .expect("float descriptor regex");
    static ref STR_RE: Regex =
        Regex::new(r"^str\(\s*(\d+)\s*,\s*(\d+)\s*\)$").expect("str descriptor regex");
    static ref ENUM_RE: Regex = Regex::new(r"^enum\((.+)\)$").expect("enum descriptor regex");
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorDescriptor {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Bool,
    Str { min_len: usize, max_len: usize },
    Enum { values: Vec<String> },
}

impl GeneratorDescriptor {
    /// Parse one descriptor, rejecting anything outside the grammar.
    pub fn parse(descriptor: &str) -> PipelineResult<Self> {
        let malformed = || PipelineError::MalformedDescriptor(descriptor.to_string());

        if descriptor == "bool" {
            return Ok(GeneratorDescriptor::Bool);
        }

        if let Some(caps) = INT_RE.captures(descriptor) {
            let min: i64 = caps[1].parse().map_err(|_| malformed())?;
            let max: i64 = caps[2].parse().map_err(|_| malformed())?;
            if min > max {
                return Err(malformed());
            }
            return Ok(GeneratorDescriptor::Int { min, max });
        }

        if let Some(caps) = FLOAT_RE.captures(descriptor) {
            let min: f64 = caps[1].parse().map_err(|_| malformed())?;
            let max: f64 = caps[2].parse().map_err(|_| malformed())?;
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(malformed());
            }
            return Ok(GeneratorDescriptor::Float { min, max });
        }

        if let Some(caps) = STR_RE.captures(descriptor) {
            let min_len: usize = caps[1].parse().map_err(|_| malformed())?;
            let max_len: usize = caps[2].parse().map_err(|_| malformed())?;
            if min_len > max_len {
                return Err(malformed());
            }
            return Ok(GeneratorDescriptor::Str { min_len, max_len });
        }

        if let Some(caps) = ENUM_RE.captures(descriptor) {
            let values: Vec<String> = caps[1].split(',').map(str::to_string).collect();
            return Ok(GeneratorDescriptor::Enum { values });
        }

        Err(malformed())
    }

    /// Sample one value and return its textual encoding.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            GeneratorDescriptor::Int { min, max } => rng.gen_range(*min..=*max).to_string(),
            GeneratorDescriptor::Float { min, max } => sample_float(*min, *max, rng),
            GeneratorDescriptor::Bool => {
                if rng.gen_bool(0.5) {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            GeneratorDescriptor::Str { min_len, max_len } => {
                let len = rng.gen_range(*min_len..=*max_len);
                (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
            }
            GeneratorDescriptor::Enum { values } => {
                values[rng.gen_range(0..values.len())].clone()
            }
        }
    }
}

const FLOAT_SCALE: f64 = 1e6;

/// Sample in `[min,max)` and render with 6 decimals. Rounding may land the
/// text on `max`; that case steps down to the last 6-decimal value below it.
fn sample_float<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> String {
    if min >= max {
        return format!("{:.6}", min);
    }
    let rendered = format!("{:.6}", rng.gen_range(min..max));
    match rendered.parse::<f64>() {
        Ok(value) if value < max => rendered,
        _ => {
            let below = ((max * FLOAT_SCALE).round() - 1.0) / FLOAT_SCALE;
            format!("{:.6}", below.max(min))
        }
    }
}

impl FromStr for GeneratorDescriptor {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GeneratorDescriptor::parse(s)
    }
}

impl fmt::Display for GeneratorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorDescriptor::Int { min, max } => write!(f, "int({},{})", min, max),
            GeneratorDescriptor::Float { min, max } => write!(f, "float({},{})", min, max),
            GeneratorDescriptor::Bool => write!(f, "bool"),
            GeneratorDescriptor::Str { min_len, max_len } => {
                write!(f, "str({},{})", min_len, max_len)
            }
            GeneratorDescriptor::Enum { values } => write!(f, "enum({})", values.join(",")),
        }
    }
}

/// Parse a whole column list; the first bad descriptor fails the batch.
pub fn parse_all(descriptors: &[String]) -> PipelineResult<Vec<GeneratorDescriptor>> {
    descriptors
        .iter()
        .map(|d| GeneratorDescriptor::parse(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_parse_recognized_descriptors() {
        assert_eq!(
            GeneratorDescriptor::parse("int(-5,10)").unwrap(),
            GeneratorDescriptor::Int { min: -5, max: 10 }
        );
        assert_eq!(
            GeneratorDescriptor::parse("int(0, 3)").unwrap(),
            GeneratorDescriptor::Int { min: 0, max: 3 }
        );
        assert_eq!(
            GeneratorDescriptor::parse("float(-1.5,2)").unwrap(),
            GeneratorDescriptor::Float { min: -1.5, max: 2.0 }
        );
        assert_eq!(GeneratorDescriptor::parse("bool").unwrap(), GeneratorDescriptor::Bool);
        assert_eq!(
            GeneratorDescriptor::parse("str(0,8)").unwrap(),
            GeneratorDescriptor::Str { min_len: 0, max_len: 8 }
        );
        assert_eq!(
            GeneratorDescriptor::parse("enum(red,green,blue)").unwrap(),
            GeneratorDescriptor::Enum {
                values: vec!["red".to_string(), "green".to_string(), "blue".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_descriptors() {
        for bad in [
            "",
            "int(5,1)",
            "int(1)",
            "Int(1,2)",
            "int(1,2) ",
            "bool ",
            "boolean",
            "float(a,b)",
            "float(3.5,1)",
            "str(-1,3)",
            "str(4,2)",
            "enum()",
            "int(1,99999999999999999999)",
            "list(int(1,2))",
        ] {
            match GeneratorDescriptor::parse(bad) {
                Err(PipelineError::MalformedDescriptor(d)) => assert_eq!(d, bad),
                other => panic!("'{}' should be malformed, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["int(-3,7)", "bool", "str(1,4)", "enum(x,y)", "float(0.5,2.25)"] {
            let descriptor: GeneratorDescriptor = text.parse().unwrap();
            assert_eq!(descriptor.to_string(), text);
        }
    }

    #[test]
    fn test_int_samples_stay_in_bounds_and_are_uniform() {
        let descriptor = GeneratorDescriptor::parse("int(1,10)").unwrap();
        let mut rng = rng();
        let mut counts = [0u32; 10];

        for _ in 0..10_000 {
            let value: i64 = descriptor.generate(&mut rng).parse().unwrap();
            assert!((1..=10).contains(&value), "out of range: {}", value);
            counts[(value - 1) as usize] += 1;
        }

        let expected = 1_000.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        // 9 degrees of freedom; 40 is far past the 0.001 critical value (27.9).
        assert!(chi_square < 40.0, "chi-square too large: {}", chi_square);
    }

    #[test]
    fn test_int_negative_and_degenerate_ranges() {
        let mut rng = rng();
        let negative = GeneratorDescriptor::parse("int(-20,-10)").unwrap();
        for _ in 0..1_000 {
            let value: i64 = negative.generate(&mut rng).parse().unwrap();
            assert!((-20..=-10).contains(&value));
        }

        let single = GeneratorDescriptor::parse("int(7,7)").unwrap();
        assert_eq!(single.generate(&mut rng), "7");
    }

    #[test]
    fn test_float_samples() {
        let descriptor = GeneratorDescriptor::parse("float(-2,3)").unwrap();
        let mut rng = rng();
        for _ in 0..1_000 {
            let text = descriptor.generate(&mut rng);
            let (_, decimals) = text.split_once('.').expect("fixed-point rendering");
            assert_eq!(decimals.len(), 6);
            let value: f64 = text.parse().unwrap();
            assert!((-2.0..3.0).contains(&value));
        }

        let single = GeneratorDescriptor::parse("float(1.5,1.5)").unwrap();
        assert_eq!(single.generate(&mut rng), "1.500000");
    }

    #[test]
    fn test_float_rendering_never_reaches_upper_bound() {
        let narrow = GeneratorDescriptor::parse("float(0,0.000001)").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            assert_eq!(narrow.generate(&mut rng), "0.000000");
        }

        let unit = GeneratorDescriptor::parse("float(2.5,2.500002)").unwrap();
        for _ in 0..1_000 {
            let text = unit.generate(&mut rng);
            assert!(text == "2.500000" || text == "2.500001", "got {}", text);
        }
    }

    #[test]
    fn test_bool_samples_cover_both_values() {
        let mut rng = rng();
        let mut seen: HashMap<String, u32> = HashMap::new();
        for _ in 0..1_000 {
            *seen.entry(GeneratorDescriptor::Bool.generate(&mut rng)).or_default() += 1;
        }
        assert_eq!(seen.len(), 2);
        assert!(seen.contains_key("true") && seen.contains_key("false"));
    }

    #[test]
    fn test_str_length_and_alphabet() {
        let descriptor = GeneratorDescriptor::parse("str(2,6)").unwrap();
        let mut rng = rng();
        let mut lengths = std::collections::HashSet::new();

        for _ in 0..5_000 {
            let value = descriptor.generate(&mut rng);
            assert!((2..=6).contains(&value.len()), "bad length: {:?}", value);
            assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
            lengths.insert(value.len());
        }
        assert_eq!(lengths.len(), 5);

        let empty = GeneratorDescriptor::parse("str(0,0)").unwrap();
        assert_eq!(empty.generate(&mut rng), "");
    }

    #[test]
    fn test_enum_values_are_chosen_evenly() {
        let descriptor = GeneratorDescriptor::parse("enum(x,y,z)").unwrap();
        let mut rng = rng();
        let mut counts: HashMap<String, u32> = HashMap::new();

        for _ in 0..9_000 {
            *counts.entry(descriptor.generate(&mut rng)).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for value in ["x", "y", "z"] {
            let count = counts[value];
            assert!((2_700..=3_300).contains(&count), "{} drawn {} times", value, count);
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let descriptors = parse_all(&["int(0,1000)".to_string(), "str(3,9)".to_string()]).unwrap();
        let sample = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            descriptors
                .iter()
                .map(|d| d.generate(&mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(sample(7), sample(7));
    }

    #[test]
    fn test_parse_all_stops_at_first_bad_descriptor() {
        let err = parse_all(&["bool".to_string(), "int(3)".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDescriptor(d) if d == "int(3)"));
    }
}

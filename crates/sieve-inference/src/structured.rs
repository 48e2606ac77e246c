//! Structured-output extraction from free-form generator text.
//!
//! Generator replies may wrap JSON in commentary or code fences, and may be
//! cut off mid-value when the output cap is reached. Extraction runs three
//! stages and stops at the first that yields a value of the expected shape:
//!
//! 1. **Strict**: parse the span from the first opening bracket to the last
//!    closing bracket of the same kind.
//! 2. **Balance**: scan from the opening bracket with a string-aware
//!    tokenizer and append whatever closers are still open.
//! 3. **Trim**: cut back to the last element boundary where only arrays are
//!    open beneath the outermost container, then close it. For a truncated
//!    array of objects this keeps every complete object and drops the
//!    partial tail.
//!
//! If all three fail the caller gets [`Error::ResponseParse`] with the raw
//! text attached.

use serde_json::Value;
use tracing::debug;

use sieve_core::{Error, Result};

/// Limit on trim candidates tried, newest boundary first.
const MAX_TRIM_ATTEMPTS: usize = 64;

/// Expected top-level JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
    Any,
}

impl Shape {
    fn opener(&self, text: &str) -> Option<usize> {
        match self {
            Shape::Object => text.find('{'),
            Shape::Array => text.find('['),
            Shape::Any => text.find(['{', '[']),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
            Shape::Any => value.is_object() || value.is_array(),
        }
    }
}

/// Which stage produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
    Strict,
    Balance,
    Trim,
}

impl RepairStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStage::Strict => "strict",
            RepairStage::Balance => "balance",
            RepairStage::Trim => "trim",
        }
    }
}

/// A parsed value and the stage that recovered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub value: Value,
    pub stage: RepairStage,
}

/// Extract a JSON value of the given shape from generator text.
pub fn parse_structured(raw: &str, shape: Shape) -> Result<Value> {
    parse_structured_with_stage(raw, shape).map(|p| p.value)
}

/// Like [`parse_structured`], also reporting which stage succeeded.
pub fn parse_structured_with_stage(raw: &str, shape: Shape) -> Result<Parsed> {
    let fail = || Error::ResponseParse {
        raw_text: raw.to_string(),
    };

    let start = shape.opener(raw).ok_or_else(fail)?;
    let text = &raw[start..];
    let closer = if text.starts_with('{') { '}' } else { ']' };

    let try_parse = |candidate: &str| -> Option<Value> {
        serde_json::from_str::<Value>(candidate)
            .ok()
            .filter(|v| shape.accepts(v))
    };
    let done = |value: Value, stage: RepairStage| -> Result<Parsed> {
        debug!(
            subsystem = "inference",
            component = "parser",
            repair_stage = stage.as_str(),
            raw_len = raw.len(),
            "Extracted structured output"
        );
        Ok(Parsed { value, stage })
    };

    if let Some(end) = text.rfind(closer) {
        if let Some(value) = try_parse(&text[..=end]) {
            return done(value, RepairStage::Strict);
        }
    }

    let scan = scan(text);

    match scan.end {
        ScanEnd::Complete(end) => {
            if let Some(value) = try_parse(&text[..end]) {
                return done(value, RepairStage::Balance);
            }
        }
        ScanEnd::Open => {
            let candidate = format!("{}{}", text.trim_end(), scan.pending_closers());
            if let Some(value) = try_parse(&candidate) {
                return done(value, RepairStage::Balance);
            }
        }
        ScanEnd::InString | ScanEnd::Malformed => {}
    }

    for boundary in scan.boundaries.iter().rev().take(MAX_TRIM_ATTEMPTS) {
        let candidate = format!("{}{}", text[..boundary.cut].trim_end(), boundary.closers);
        if let Some(value) = try_parse(&candidate) {
            return done(value, RepairStage::Trim);
        }
    }

    debug!(
        subsystem = "inference",
        component = "parser",
        raw_len = raw.len(),
        "No usable structured output after repair"
    );
    Err(fail())
}

/// How a tokenizer pass over the candidate text ended.
#[derive(Debug, PartialEq, Eq)]
enum ScanEnd {
    /// The outermost container closed; byte offset just past its closer.
    Complete(usize),
    /// Text ran out with containers still open, outside any string.
    Open,
    /// Text ran out inside a string literal.
    InString,
    /// A closer did not match the innermost open container.
    Malformed,
}

/// A cut point that leaves only complete elements.
#[derive(Debug)]
struct Boundary {
    /// Exclusive byte offset to cut at.
    cut: usize,
    /// Closers to append, innermost first.
    closers: String,
}

#[derive(Debug)]
struct Scan {
    stack: Vec<char>,
    end: ScanEnd,
    boundaries: Vec<Boundary>,
}

impl Scan {
    fn pending_closers(&self) -> String {
        closers_for(&self.stack)
    }
}

fn closers_for(stack: &[char]) -> String {
    stack.iter().rev().collect()
}

/// Walk `text` (which starts at an opening bracket), tracking open
/// containers and string state, and recording trim boundaries.
///
/// A boundary is recorded only where every container below the outermost
/// one is an array, so a cut never leaves a half-written object behind.
fn scan(text: &str) -> Scan {
    let mut stack: Vec<char> = Vec::new();
    let mut inner_objects = 0usize;
    let mut boundaries = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => {
                if !stack.is_empty() && c == '{' {
                    inner_objects += 1;
                }
                stack.push(if c == '{' { '}' } else { ']' });
            }
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return Scan {
                        stack,
                        end: ScanEnd::Malformed,
                        boundaries,
                    };
                }
                if c == '}' && !stack.is_empty() {
                    inner_objects -= 1;
                }
                if stack.is_empty() {
                    return Scan {
                        stack,
                        end: ScanEnd::Complete(i + 1),
                        boundaries,
                    };
                }
                if inner_objects == 0 {
                    boundaries.push(Boundary {
                        cut: i + 1,
                        closers: closers_for(&stack),
                    });
                }
            }
            ',' if inner_objects == 0 && !stack.is_empty() => {
                boundaries.push(Boundary {
                    cut: i,
                    closers: closers_for(&stack),
                });
            }
            _ => {}
        }
    }

    let end = if in_string {
        ScanEnd::InString
    } else {
        ScanEnd::Open
    };
    Scan {
        stack,
        end,
        boundaries,
    }
}

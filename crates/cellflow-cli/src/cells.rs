//! Text formats read by the CLI.
//!
//! A `.cells` file has one sheet line per text line, optionally prefixed with
//! `name: `. Blank lines and `//` comment lines are skipped.
//!
//! A test file is a sequence of test cases:
//!
//! ```text
//! // test: doubling
//! a: 21
//! a * 2
//! // expect: 42
//! ```
//!
//! `// advance: <ms>` inside a case moves the virtual clock before the
//! result is compared. Without it the clock runs until no timer is left.

use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub lines: Vec<Line>,
    pub advance_ms: Vec<u64>,
    pub expected: Option<String>,
}

pub fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    let name_length = trimmed
        .chars()
        .take_while(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '$'))
        .count();
    let (name, rest) = trimmed.split_at(name_length);
    let starts_like_identifier = name
        .chars()
        .next()
        .is_some_and(|first| !first.is_ascii_digit());
    match rest.trim_start().strip_prefix(':') {
        Some(source) if starts_like_identifier => Line {
            name: name.to_owned(),
            source: source.trim().to_owned(),
        },
        _ => Line {
            name: String::new(),
            source: trimmed.to_owned(),
        },
    }
}

fn is_skipped(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("//")
}

pub fn parse_cells(text: &str) -> Vec<Line> {
    text.lines()
        .filter(|line| !is_skipped(line))
        .map(parse_line)
        .collect()
}

/// The serialized entry array of a sheet made of `lines`.
pub fn to_entries(lines: &[Line]) -> serde_json::Value {
    serde_json::Value::Array(
        lines
            .iter()
            .enumerate()
            .map(|(id, line)| json!({ "id": id, "name": line.name, "state": line.source }))
            .collect(),
    )
}

fn directive<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.trim()
        .strip_prefix("//")?
        .trim_start()
        .strip_prefix(name)?
        .strip_prefix(':')
        .map(str::trim)
}

pub fn parse_tests(text: &str) -> Vec<TestCase> {
    let mut cases = Vec::new();
    let mut current: Option<TestCase> = None;
    for line in text.lines() {
        if let Some(name) = directive(line, "test") {
            cases.extend(current.take());
            current = Some(TestCase {
                name: name.to_owned(),
                lines: Vec::new(),
                advance_ms: Vec::new(),
                expected: None,
            });
            continue;
        }
        let Some(case) = current.as_mut() else {
            continue;
        };
        if let Some(expected) = directive(line, "expect") {
            case.expected = Some(expected.to_owned());
            cases.extend(current.take());
        } else if let Some(ms) = directive(line, "advance") {
            match ms.parse() {
                Ok(ms) => case.advance_ms.push(ms),
                Err(error) => log::warn!("Ignoring `{line}` in test {}: {error}", case.name),
            }
        } else if !is_skipped(line) {
            case.lines.push(parse_line(line));
        }
    }
    cases.extend(current);
    cases
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line(name: &str, source: &str) -> Line {
        Line {
            name: name.to_owned(),
            source: source.to_owned(),
        }
    }

    #[test]
    fn test_name_prefix() {
        assert_eq!(parse_line("total: a + b"), line("total", "a + b"));
        assert_eq!(parse_line("$x :1"), line("$x", "1"));
        assert_eq!(parse_line("a ? b : c"), line("", "a ? b : c"));
        assert_eq!(parse_line("{a: 1}"), line("", "{a: 1}"));
        assert_eq!(parse_line("3: 4"), line("", "3: 4"));
    }

    #[test]
    fn test_cells_skip_blank_and_comments() {
        let lines = parse_cells("a: 1\n\n// note\n a + 1 \n");
        assert_eq!(lines, [line("a", "1"), line("", "a + 1")]);
        assert_eq!(
            to_entries(&lines),
            json!([
                { "id": 0, "name": "a", "state": "1" },
                { "id": 1, "name": "", "state": "a + 1" },
            ])
        );
    }

    #[test]
    fn test_test_cases() {
        let cases = parse_tests(
            "// test: first\na: 2\na * 3\n// expect: 6\n\n// test: timers\nawait delay(10, 1)\n// advance: 10\n// test: unfinished\n1",
        );
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].lines, [line("a", "2"), line("", "a * 3")]);
        assert_eq!(cases[0].expected.as_deref(), Some("6"));
        assert_eq!(cases[1].advance_ms, [10]);
        assert_eq!(cases[1].expected, None);
        assert_eq!(cases[2].name, "unfinished");
    }
}

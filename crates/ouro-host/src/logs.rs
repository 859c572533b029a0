// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! CI log reduction.
//!
//! Raw workflow logs run to hundreds of kilobytes; the fixer only needs the
//! slice that explains the failure.  Extraction walks the
//! `##[group]…##[endgroup]` step structure, picks the failed steps, and
//! within them prioritises test-failure blocks, then compiler/module
//! errors, then whatever is left — always capped at 8 000 characters,
//! keeping the tail.

use regex::Regex;

/// Hard cap on the returned slice.  The tail is kept: failure summaries sit
/// at the end of a step's output.
const MAX_SLICE_CHARS: usize = 8_000;

/// One `##[group]` step section, including trailing lines up to the next
/// group header (the `##[error]` verdict for a step is printed after its
/// `##[endgroup]`).
#[derive(Debug, Clone)]
struct Step {
    name: String,
    body: String,
}

fn split_steps(log: &str) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    let mut current: Option<Step> = None;
    for line in log.lines() {
        let content = strip_timestamp(line);
        if let Some(name) = content.strip_prefix("##[group]") {
            if let Some(step) = current.take() {
                steps.push(step);
            }
            current = Some(Step {
                name: name.trim().to_string(),
                body: String::new(),
            });
            continue;
        }
        if let Some(step) = current.as_mut() {
            if content.starts_with("##[endgroup]") {
                continue;
            }
            step.body.push_str(content);
            step.body.push('\n');
        }
    }
    if let Some(step) = current.take() {
        steps.push(step);
    }
    steps
}

/// GitHub Actions prefixes every line with an ISO timestamp; strip it so
/// pattern matching sees the raw content.
fn strip_timestamp(line: &str) -> &str {
    match line.split_once(' ') {
        Some((first, rest))
            if first.len() >= 20 && first.contains('T') && first.ends_with('Z') =>
        {
            rest
        }
        _ => line,
    }
}

fn has_error_marker(body: &str) -> bool {
    body.lines().any(|l| l.starts_with("##[error]"))
}

/// Reduce a raw CI log to the slice that explains the failure.
pub fn extract_failure_slice(log: &str) -> String {
    let steps = split_steps(log);

    // Steps whose bodies carry an ##[error] verdict are the failed ones;
    // when the log has no group structure at all, fall back to the raw text.
    let failed: Vec<&Step> = steps.iter().filter(|s| has_error_marker(&s.body)).collect();
    let relevant = if !failed.is_empty() {
        failed
            .iter()
            .map(|s| format!("### {}\n{}", s.name, s.body))
            .collect::<Vec<_>>()
            .join("\n")
    } else if !steps.is_empty() {
        steps
            .iter()
            .map(|s| format!("### {}\n{}", s.name, s.body))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        log.to_string()
    };

    let prioritised = prioritise(&relevant);
    cap_keeping_tail(&prioritised, MAX_SLICE_CHARS)
}

/// Within the chosen text, pick the most diagnostic block:
/// 1. test-failure output — from the first `FAIL …` line through the
///    `Test Suites:/Tests:/Snapshots:/Time:` summary,
/// 2. compile/type/module errors,
/// 3. the text unchanged.
fn prioritise(text: &str) -> String {
    if let Some(block) = test_failure_block(text) {
        return block;
    }
    let compile_re = Regex::new(
        r"error TS\d+|SyntaxError|TypeError|ReferenceError|RangeError|Cannot find module|ENOENT|EACCES",
    )
    .expect("static regex");
    let error_lines: Vec<&str> = text
        .lines()
        .filter(|l| compile_re.is_match(l))
        .collect();
    if !error_lines.is_empty() {
        return error_lines.join("\n");
    }
    text.to_string()
}

fn test_failure_block(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| l.trim_start().starts_with("FAIL "))?;
    let summary_prefixes = ["Test Suites:", "Tests:", "Snapshots:", "Time:"];
    // The summary is a run of consecutive summary lines; keep through its end.
    let mut end = lines.len();
    let mut in_summary = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let trimmed = line.trim_start();
        if summary_prefixes.iter().any(|p| trimmed.starts_with(p)) {
            in_summary = true;
            end = i + 1;
        } else if in_summary {
            break;
        }
    }
    Some(lines[start..end].join("\n"))
}

fn cap_keeping_tail(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let tail_start = text.len() - cap;
    // Cut at a line boundary inside the kept window.
    let aligned = text[tail_start..]
        .find('\n')
        .map(|p| tail_start + p + 1)
        .unwrap_or(tail_start);
    format!("[...truncated...]\n{}", &text[aligned..])
}

/// Extract the coverage table from a successful run's log: the lines of the
/// `coverage` step bounded by `----|…` separator rows.
pub fn extract_coverage(log: &str) -> Option<String> {
    let steps = split_steps(log);
    let body: String = steps
        .iter()
        .find(|s| s.name.to_lowercase().contains("coverage"))
        .map(|s| s.body.clone())
        .unwrap_or_else(|| log.to_string());

    let sep = Regex::new(r"^-+\|").expect("static regex");
    let lines: Vec<&str> = body.lines().collect();
    let first = lines.iter().position(|l| sep.is_match(l.trim_start()))?;
    let last = lines.iter().rposition(|l| sep.is_match(l.trim_start()))?;
    if last <= first {
        return None;
    }
    Some(lines[first..=last].join("\n"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const JEST_LOG: &str = "\
##[group]Run npm ci
added 120 packages
##[endgroup]
##[group]Run npm test
PASS src/a.test.ts
FAIL src/x.test.ts
  ● renders without crashing
    TypeError: Cannot read properties of undefined
Test Suites: 1 failed, 1 passed, 2 total
Tests:       1 failed, 4 passed, 5 total
Snapshots:   0 total
Time:        3.21 s
##[endgroup]
##[error]Process completed with exit code 1.
";

    #[test]
    fn failed_step_section_is_selected() {
        let slice = extract_failure_slice(JEST_LOG);
        assert!(slice.contains("FAIL src/x.test.ts"), "{slice}");
        assert!(!slice.contains("npm ci"), "unrelated step leaked: {slice}");
    }

    #[test]
    fn test_failure_block_runs_through_summary() {
        let slice = extract_failure_slice(JEST_LOG);
        assert!(slice.starts_with("FAIL src/x.test.ts"), "{slice}");
        assert!(slice.contains("Tests:       1 failed"), "{slice}");
        assert!(slice.trim_end().ends_with("Time:        3.21 s"), "{slice}");
    }

    #[test]
    fn compile_errors_selected_when_no_test_block() {
        let log = "\
##[group]Run tsc
src/index.ts(4,7): error TS2322: Type 'string' is not assignable to type 'number'.
some unrelated output
##[endgroup]
##[error]Process completed with exit code 2.
";
        let slice = extract_failure_slice(log);
        assert!(slice.contains("error TS2322"), "{slice}");
        assert!(!slice.contains("unrelated output"), "{slice}");
    }

    #[test]
    fn module_resolution_errors_are_recognised() {
        let log = "\
##[group]Run node dist/main.js
Error: Cannot find module './config'
##[endgroup]
##[error]Process completed with exit code 1.
";
        let slice = extract_failure_slice(log);
        assert!(slice.contains("Cannot find module"), "{slice}");
    }

    #[test]
    fn log_without_groups_falls_back_to_raw_text() {
        let slice = extract_failure_slice("plain failure output\nno groups here");
        assert!(slice.contains("plain failure output"));
    }

    #[test]
    fn no_error_marker_keeps_all_sections() {
        let log = "##[group]Run step\nsome output\n##[endgroup]\n";
        let slice = extract_failure_slice(log);
        assert!(slice.contains("some output"));
    }

    #[test]
    fn slice_is_capped_keeping_tail() {
        let mut log = String::from("##[group]Run big\n");
        for i in 0..2_000 {
            log.push_str(&format!("noise line {i}\n"));
        }
        log.push_str("the final important line\n##[endgroup]\n##[error]exit 1\n");
        let slice = extract_failure_slice(&log);
        assert!(slice.len() <= MAX_SLICE_CHARS + 64, "len={}", slice.len());
        assert!(slice.contains("the final important line"), "tail lost");
        assert!(slice.starts_with("[...truncated...]"), "{}", &slice[..40]);
    }

    #[test]
    fn timestamps_are_stripped_before_matching() {
        let log = "\
2024-06-01T12:00:00.0000000Z ##[group]Run npm test
2024-06-01T12:00:01.0000000Z FAIL src/y.test.ts
2024-06-01T12:00:02.0000000Z Tests: 1 failed, 1 total
2024-06-01T12:00:03.0000000Z ##[endgroup]
2024-06-01T12:00:04.0000000Z ##[error]Process completed with exit code 1.
";
        let slice = extract_failure_slice(log);
        assert!(slice.contains("FAIL src/y.test.ts"), "{slice}");
    }

    // ── Coverage extraction ───────────────────────────────────────────────────

    const COVERAGE_LOG: &str = "\
##[group]Run npm run coverage
> jest --coverage
----------|---------|----------|---------|---------|
File      | % Stmts | % Branch | % Funcs | % Lines |
----------|---------|----------|---------|---------|
All files |   82.14 |    70.00 |   85.71 |   82.14 |
 config.ts|   90.00 |    75.00 |  100.00 |   90.00 |
----------|---------|----------|---------|---------|
Test Suites: 2 passed, 2 total
##[endgroup]
";

    #[test]
    fn coverage_table_is_bounded_by_separators() {
        let table = extract_coverage(COVERAGE_LOG).unwrap();
        assert!(table.starts_with("----------|"), "{table}");
        assert!(table.trim_end().ends_with("----------|---------|----------|---------|---------|"));
        assert!(table.contains("All files"));
        assert!(!table.contains("Test Suites"), "content past the table leaked");
        assert!(!table.contains("jest --coverage"), "content before the table leaked");
    }

    #[test]
    fn coverage_absent_returns_none() {
        assert!(extract_coverage("##[group]Run build\nok\n##[endgroup]\n").is_none());
    }

    #[test]
    fn coverage_step_is_found_by_name() {
        let log = format!("##[group]Run lint\nclean\n##[endgroup]\n{COVERAGE_LOG}");
        let table = extract_coverage(&log).unwrap();
        assert!(table.contains("config.ts"));
    }
}

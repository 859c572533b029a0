// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Phase system prompts and prompt assembly.
//!
//! The stable per-phase prompt goes into a cached system block; volatile
//! per-iteration context (memory, git log, coverage) rides in an uncached
//! block so the stable prefix stays reusable across calls.

use ouro_config::Phase;

use crate::phases::Plan;

const PLANNER_PROMPT: &str = "\
You are the planning phase of an autonomous coding agent that improves its \
own repository, one merged pull request at a time. Study the codebase \
context, your memories, the recent commit history, and the latest test \
coverage. Choose ONE small, concretely valuable change: a bug fix, a \
missing test, a refactor that removes real duplication, or a small feature \
the code obviously wants. Prefer changes that keep CI green. Use the tools \
to read anything you need, then call submit_plan exactly once with a short \
title, a description of the change, and concrete implementation steps.";

const BUILDER_PROMPT: &str = "\
You are the building phase of an autonomous coding agent. Implement the \
given plan in the working copy using the editing tools. Read before you \
edit: edit_file requires the exact current text. Express every edit \
against the file as it exists on disk now; edits are applied together when \
you finish. Keep the change minimal and consistent with the surrounding \
code, and keep the test suite passing. When every edit for the plan is \
recorded, call done.";

const FIXER_PROMPT: &str = "\
You are the fixing phase of an autonomous coding agent. A change you \
pushed failed continuous integration. Read the failure output carefully, \
inspect the files involved, and record the minimal edits that make CI \
pass while preserving the intent of the original plan. When the fix is \
complete, call done.";

const REFLECT_PROMPT: &str = "\
You are the reflection phase of an autonomous coding agent. Review how \
this iteration went and write down what future iterations should learn \
from it: what worked, what failed and why, and what to do differently. \
Be specific and brief. Respond with the lesson as plain text.";

/// Single-sentence summarisation, used by the memory and summarizer phases.
const SUMMARIZER_PROMPT: &str = ouro_memory::SUMMARIZE_PROMPT;

pub fn phase_prompt(phase: Phase) -> &'static str {
    match phase {
        Phase::Planner => PLANNER_PROMPT,
        Phase::Builder => BUILDER_PROMPT,
        Phase::Fixer => FIXER_PROMPT,
        Phase::Reflect => REFLECT_PROMPT,
        Phase::Memory | Phase::Summarizer => SUMMARIZER_PROMPT,
    }
}

/// Opening user message for the planner.
pub fn planner_request() -> String {
    "Decide the next improvement to make to this repository and submit it \
     with submit_plan."
        .to_string()
}

/// Opening user message for the builder.
pub fn builder_request(plan: &Plan) -> String {
    format!(
        "Implement this plan.\n\n## {}\n\n{}\n\n### Implementation\n{}",
        plan.title, plan.description, plan.implementation
    )
}

/// Fresh failure prompt for the fix path: restates the original plan and
/// quotes the CI failure verbatim.
pub fn fixer_request(plan: &Plan, error: &str) -> String {
    format!(
        "Your change for the plan below failed CI.\n\n## {}\n\n{}\n\n\
         ### Implementation\n{}\n\n### CI failure\n```\n{}\n```\n\n\
         Diagnose the failure and record the edits that fix it, then call done.",
        plan.title, plan.description, plan.implementation, error
    )
}

/// Opening user message for the reflector.
pub fn reflect_request(outcome: &str, plan: &Plan, history: &str) -> String {
    format!(
        "The iteration for plan \"{}\" ended with outcome: {outcome}.\n\n\
         Full session transcript:\n\n{history}\n\n\
         What should future iterations learn from this?",
        plan.title
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Plan {
        Plan {
            title: "add-tests".into(),
            description: "Add test coverage".into(),
            implementation: "Add tests to config.ts".into(),
        }
    }

    #[test]
    fn each_phase_has_a_prompt() {
        for phase in [
            Phase::Planner,
            Phase::Builder,
            Phase::Fixer,
            Phase::Reflect,
            Phase::Memory,
            Phase::Summarizer,
        ] {
            assert!(!phase_prompt(phase).is_empty());
        }
    }

    #[test]
    fn memory_and_summarizer_share_the_summarisation_prompt() {
        assert_eq!(phase_prompt(Phase::Memory), phase_prompt(Phase::Summarizer));
        assert!(phase_prompt(Phase::Memory).contains("single concise sentence"));
    }

    #[test]
    fn builder_request_contains_all_plan_fields() {
        let req = builder_request(&plan());
        assert!(req.contains("add-tests"));
        assert!(req.contains("Add test coverage"));
        assert!(req.contains("Add tests to config.ts"));
    }

    #[test]
    fn fixer_request_quotes_error_verbatim() {
        let error = "FAIL src/x.test.ts\n  expected 2, got 3";
        let req = fixer_request(&plan(), error);
        assert!(req.contains(error), "{req}");
        assert!(req.contains("add-tests"), "plan must be restated");
    }
}

//! Prompt text and the argument contract for the external analysis tool.

use std::path::Path;

/// Tools the per-record analysis invocation is allowed to use.
pub const ANALYSIS_TOOLS: &str = "Read,Grep,Glob";

/// Disables the tool's own update check, which would otherwise race the
/// batch with network side effects.
pub const VERSION_CHECK_ENV: (&str, &str) = ("DISABLE_AUTOUPDATER", "1");

/// Review/synthesis instruction prefixed to the artifact bundle.
pub const REVIEW_PROMPT: &str = "\
You are reviewing a batch of session analyses from one repository. Read every \
analysis below, identify recurring friction, wasted effort, and workflow gaps, \
and write one consolidated improvement report in markdown. Lead with the three \
highest-impact changes. Cite the analyses you drew each finding from by file \
name. Do not restate the analyses.";

/// Builds the per-record analysis prompt.
pub fn analysis_prompt(transcript: &Path) -> String {
    format!(
        "Read the session transcript at {} and write a concise retrospective \
analysis in markdown: what the session set out to do, where time was lost, \
which tool interactions failed or were repeated, and what a better workflow \
would have looked like. Output only the analysis body.",
        transcript.display()
    )
}

/// Assembles the fixed argument list for one tool invocation.
///
/// Arguments are passed as a discrete list, never through a shell, so
/// item-derived paths and prompt text cannot inject commands. `tools` of
/// `None` disables tool access entirely (the synthesis pass).
pub fn tool_args(prompt: &str, tools: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = [
        "-p",
        "--no-session",
        "--no-extensions",
        "--no-skills",
        "--no-prompt-templates",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    match tools {
        Some(list) => {
            args.push("--tools".to_string());
            args.push(list.to_string());
        }
        None => args.push("--no-tools".to_string()),
    }

    args.push(prompt.to_string());
    args
}

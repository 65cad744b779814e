//! Fenced state block codec
//!
//! State lives inside arbitrary Markdown as
//! `<!-- issue-ops-state\n{pretty json}\n-->`. The codec neither knows nor
//! cares whether the surrounding text is an issue body or a comment.

use std::sync::OnceLock;

use regex::Regex;

use super::state::WorkflowState;
use crate::errors::{IssueOpsError, Result};

/// Substring identifying a state-bearing text blob.
pub const STATE_MARKER: &str = "<!-- issue-ops-state";
const BLOCK_OPEN: &str = "<!-- issue-ops-state\n";
const BLOCK_CLOSE: &str = "\n-->";
const SNIPPET_LEN: usize = 200;

/// Compiled block pattern, cached using OnceLock
fn block_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)<!-- issue-ops-state\n(.*?)\n-->").ok())
        .as_ref()
        .ok_or_else(|| IssueOpsError::configuration("state block pattern failed to compile"))
}

/// First characters of `text`, for error messages.
pub fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_LEN).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub fn has_state_block(text: &str) -> bool {
    text.contains(BLOCK_OPEN)
}

/// Extract and validate the state embedded in `text`.
///
/// Text without the opening token holds no state and yields `Ok(None)`.
pub fn decode(text: &str) -> Result<Option<WorkflowState>> {
    if !has_state_block(text) {
        return Ok(None);
    }

    let captures = block_pattern()?.captures(text).ok_or_else(|| {
        IssueOpsError::invalid_state("state block is not terminated")
            .with_context("snippet", snippet(text))
    })?;
    let json = captures.get(1).map_or("", |m| m.as_str());

    let state: WorkflowState = serde_json::from_str(json).map_err(|e| {
        IssueOpsError::invalid_state(format!("state block is not valid workflow JSON: {e}"))
            .with_context("snippet", snippet(json))
    })?;
    state.validate()?;
    Ok(Some(state))
}

/// Render the fenced block for `state`.
pub fn encode(state: &WorkflowState) -> Result<String> {
    let json = serde_json::to_string_pretty(state).map_err(|e| {
        IssueOpsError::invalid_state(format!("failed to serialize workflow state: {e}"))
            .with_context("issue_number", state.issue_number)
    })?;
    Ok(format!("{BLOCK_OPEN}{json}{BLOCK_CLOSE}"))
}

/// Write `state` into `text`.
///
/// The first existing block is replaced in place and any later blocks are
/// dropped; text without a block gets one appended.
pub fn embed(text: &str, state: &WorkflowState) -> Result<String> {
    let block = encode(state)?;

    let mut matches = block_pattern()?.find_iter(text).peekable();
    if matches.peek().is_none() {
        if text.trim().is_empty() {
            return Ok(block);
        }
        return Ok(format!("{}\n\n{block}", text.trim_end()));
    }

    let mut output = String::with_capacity(text.len() + block.len());
    let mut cursor = 0;
    for (index, found) in matches.enumerate() {
        output.push_str(&text[cursor..found.start()]);
        if index == 0 {
            output.push_str(&block);
        }
        cursor = found.end();
    }
    output.push_str(&text[cursor..]);
    Ok(output)
}

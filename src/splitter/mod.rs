//! Task splitting.
//!
//! Turns raw input text into the ordered work units handed to the
//! dispatcher. The policy is chosen through configuration.

use crate::error::{OrchestratorError, Result};
use crate::models::{UnitKind, WorkUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How input text is partitioned into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Exactly this many contiguous groups of tokens.
    Chunks(usize),
    /// One unit per token.
    Word,
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitPolicy::Chunks(n) => write!(f, "{} chunks", n),
            SplitPolicy::Word => write!(f, "one unit per word"),
        }
    }
}

/// Split `text` according to `policy`.
pub fn split(text: &str, policy: SplitPolicy) -> Result<Vec<WorkUnit>> {
    match policy {
        SplitPolicy::Chunks(n) => split_by_chunks(text, n),
        SplitPolicy::Word => Ok(split_by_word(text)),
    }
}

/// Split into exactly `n` contiguous groups of whitespace-delimited tokens.
///
/// Each group holds `max(1, words / n)` tokens except the last, which takes
/// the remainder. Groups past the end of the input are empty. Empty input
/// yields one empty unit.
pub fn split_by_chunks(text: &str, n: usize) -> Result<Vec<WorkUnit>> {
    if n == 0 {
        return Err(OrchestratorError::Configuration(
            "Chunk count must be at least 1".to_string(),
        ));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(vec![chunk(0, String::new())]);
    }

    let chunk_size = (words.len() / n).max(1);
    let units = (0..n)
        .map(|i| {
            let start = (i * chunk_size).min(words.len());
            let end = if i + 1 < n {
                (start + chunk_size).min(words.len())
            } else {
                words.len()
            };
            chunk(i, words[start..end].join(" "))
        })
        .collect();

    Ok(units)
}

/// One unit per whitespace-delimited token.
///
/// Maximises parallelism at the cost of one network round trip per word.
pub fn split_by_word(text: &str) -> Vec<WorkUnit> {
    let units: Vec<WorkUnit> = text
        .split_whitespace()
        .enumerate()
        .map(|(id, word)| WorkUnit {
            id,
            payload: word.to_string(),
            kind: UnitKind::Word,
        })
        .collect();

    if units.is_empty() {
        return vec![WorkUnit {
            id: 0,
            payload: String::new(),
            kind: UnitKind::Word,
        }];
    }

    units
}

fn chunk(id: usize, payload: String) -> WorkUnit {
    WorkUnit {
        id,
        payload,
        kind: UnitKind::Chunk,
    }
}

// src/explain.rs
//! Query-planner style diagnostics attached to every operation result
//!
//! ```text
//! {
//!   "executionStats": { "nReturned", "executionTimeMillis",
//!                       "totalKeysExamined": 0, "totalDocsExamined" },
//!   "scan":           { "isTruncated", "keyCount", "maxKeys",
//!                       "nextContinuationToken", "timeMillis" }
//! }
//! ```
//!
//! `totalKeysExamined` is always 0: no index is ever consulted.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub n_returned: usize,
    pub execution_time_millis: u64,
    pub total_keys_examined: usize,
    pub total_docs_examined: usize,
}

/// Raw statistics of the one storage listing behind an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub is_truncated: bool,
    pub key_count: usize,
    pub max_keys: usize,
    pub next_continuation_token: Option<String>,
    pub time_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explain {
    pub execution_stats: ExecutionStats,
    pub scan: ScanStats,
}

impl Explain {
    /// Assemble the record for an operation that returned `n_returned` items
    /// after `elapsed` in total
    pub fn build(scan: ScanStats, n_returned: usize, elapsed: Duration) -> Self {
        Explain {
            execution_stats: ExecutionStats {
                n_returned,
                execution_time_millis: millis(elapsed),
                total_keys_examined: 0,
                total_docs_examined: scan.key_count,
            },
            scan,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.scan.is_truncated
    }

    pub fn next_continuation_token(&self) -> Option<&str> {
        self.scan.next_continuation_token.as_deref()
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

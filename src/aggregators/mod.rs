//! Candidate aggregators: collapse a candidate set into a
//! winner plus confidence metadata.

mod best_of_n;
mod majority_vote;
mod weighted;

pub use best_of_n::BestOfN;
pub use majority_vote::MajorityVote;
pub use weighted::Weighted;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;
use crate::types::Candidate;

#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    pub best_candidate: Candidate,
    pub metadata: HashMap<String, Value>,
}

/// Collapse a candidate set to a winner + confidence metadata.
pub trait Aggregator: Send + Sync {
    fn aggregate(&self, candidates: &[Candidate]) -> Result<AggregationOutcome>;

    /// Distribution of normalised answers to vote counts.
    fn distribution(&self, candidates: &[Candidate]) -> HashMap<String, i64>;
}

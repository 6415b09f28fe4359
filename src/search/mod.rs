//! Strategy dispatch/execution and ranking over the merged candidate set.

pub mod executor;
pub mod ranker;

pub use executor::{merge_and_dedup, ExecutionResult, SearchExecutor, StrategyOutput};
pub use ranker::{RankedCandidate, Ranker, RankerWeights};

pub mod aggregate;
pub mod evaluators;

pub use aggregate::{aggregate, Signal, SignalScores, WeightTable};
pub use evaluators::{set_overlap_score, MatchStrategy, SignalPair, SubScoreEvaluator, SIGNAL_PAIRS};

use crate::error::ScoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One compatibility signal: the raw embedding similarity or one of the nine
/// relationship sub-scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    #[serde(rename = "original")]
    Original,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
}

impl Signal {
    pub const ALL: [Signal; 10] = [
        Self::Original,
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
        Self::H,
        Self::I,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
            Self::I => "I",
        }
    }

    pub fn default_weight(self) -> f64 {
        match self {
            Self::Original => 0.50,
            Self::A => 0.25,
            Self::B => 0.15,
            Self::C => 0.20,
            Self::D => 0.10,
            Self::E => 0.20,
            Self::F => 0.15,
            Self::G => 0.05,
            Self::H => 0.05,
            Self::I => 0.05,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = ScoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|signal| signal.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ScoreError::UnknownSignal(value.to_string()))
    }
}

/// Present signals only; an absent key means "no information", not zero.
pub type SignalScores = BTreeMap<Signal, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    weights: BTreeMap<Signal, f64>,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            weights: Signal::ALL
                .iter()
                .map(|signal| (*signal, signal.default_weight()))
                .collect(),
        }
    }
}

impl WeightTable {
    pub fn get(&self, signal: Signal) -> f64 {
        self.weights.get(&signal).copied().unwrap_or(0.0)
    }

    pub fn with_weight(mut self, signal: Signal, weight: f64) -> Result<Self, ScoreError> {
        check_weight(signal, weight)?;
        self.weights.insert(signal, weight);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        self.weights
            .iter()
            .try_for_each(|(signal, weight)| check_weight(*signal, *weight))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Signal, f64)> + '_ {
        self.weights.iter().map(|(signal, weight)| (*signal, *weight))
    }
}

fn check_weight(signal: Signal, weight: f64) -> Result<(), ScoreError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(ScoreError::InvalidWeight {
            signal: signal.to_string(),
            weight,
        })
    }
}

/// Weighted combination of the present signals.
///
/// With `normalize`, weights of present signals are rescaled to sum to one, so
/// the result stays in [0, 1] however many signals are missing. An empty score
/// set, or one whose present weights are all zero, yields 0.0. Without
/// `normalize` the raw weighted sum is capped at 1.0.
pub fn aggregate(
    scores: &SignalScores,
    weights: &WeightTable,
    normalize: bool,
) -> Result<f64, ScoreError> {
    weights.validate()?;

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (signal, score) in scores {
        if !(0.0..=1.0).contains(score) {
            return Err(ScoreError::ScoreOutOfRange {
                signal: signal.to_string(),
                score: *score,
            });
        }
        let weight = weights.get(*signal);
        weighted_sum += weight * score;
        weight_sum += weight;
    }

    if !normalize {
        return Ok(weighted_sum.min(1.0));
    }

    if weight_sum == 0.0 {
        return Ok(0.0);
    }

    Ok((weighted_sum / weight_sum).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(Signal, f64)]) -> SignalScores {
        pairs.iter().copied().collect()
    }

    #[test]
    fn single_present_signal_normalizes_to_full_weight() {
        let result = aggregate(&scores(&[(Signal::Original, 0.8)]), &WeightTable::default(), true)
            .expect("valid input");
        assert!((result - 0.8).abs() < 1e-12);
    }

    #[test]
    fn absent_signals_are_excluded_from_denominator() {
        let present = scores(&[(Signal::Original, 1.0), (Signal::A, 0.0)]);
        let result = aggregate(&present, &WeightTable::default(), true).expect("valid input");
        // 0.50 / (0.50 + 0.25)
        assert!((result - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_scores_yield_zero_not_nan() {
        let result = aggregate(&SignalScores::new(), &WeightTable::default(), true)
            .expect("valid input");
        assert_eq!(result, 0.0);
    }

    #[test]
    fn every_subset_stays_in_unit_interval() {
        let weights = WeightTable::default();
        let values = [0.0, 0.13, 0.5, 0.97, 1.0];
        for mask in 0u32..(1 << Signal::ALL.len()) {
            let subset: SignalScores = Signal::ALL
                .iter()
                .enumerate()
                .filter(|(index, _)| mask & (1 << index) != 0)
                .map(|(index, signal)| (*signal, values[(index + mask as usize) % values.len()]))
                .collect();
            let result = aggregate(&subset, &weights, true).expect("valid input");
            assert!((0.0..=1.0).contains(&result), "mask {mask} gave {result}");
        }
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let error = aggregate(&scores(&[(Signal::B, 1.2)]), &WeightTable::default(), true)
            .unwrap_err();
        assert!(matches!(error, ScoreError::ScoreOutOfRange { .. }));

        let error = aggregate(&scores(&[(Signal::B, f64::NAN)]), &WeightTable::default(), true)
            .unwrap_err();
        assert!(matches!(error, ScoreError::ScoreOutOfRange { .. }));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let error = WeightTable::default().with_weight(Signal::C, -0.1).unwrap_err();
        assert_eq!(
            error,
            ScoreError::InvalidWeight {
                signal: "C".to_string(),
                weight: -0.1
            }
        );
    }

    #[test]
    fn zero_weights_for_present_signals_yield_zero() {
        let weights = WeightTable::default()
            .with_weight(Signal::D, 0.0)
            .expect("zero is a valid weight");
        let result = aggregate(&scores(&[(Signal::D, 0.9)]), &weights, true).expect("valid input");
        assert_eq!(result, 0.0);
    }

    #[test]
    fn unnormalized_sum_is_capped() {
        let all_ones: SignalScores = Signal::ALL.iter().map(|signal| (*signal, 1.0)).collect();
        let result = aggregate(&all_ones, &WeightTable::default(), false).expect("valid input");
        assert_eq!(result, 1.0);

        let partial = aggregate(&scores(&[(Signal::A, 0.4)]), &WeightTable::default(), false)
            .expect("valid input");
        assert!((partial - 0.1).abs() < 1e-12);
    }

    #[test]
    fn signal_names_parse_case_insensitively() {
        assert_eq!("original".parse::<Signal>(), Ok(Signal::Original));
        assert_eq!("h".parse::<Signal>(), Ok(Signal::H));
        assert!("Z".parse::<Signal>().is_err());
    }
}

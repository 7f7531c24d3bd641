//! Quality scoring for dispensed amounts.
//!
//! A dispensed amount is compared against an ideal target with a tolerance
//! band. Inside the band the score is exactly 1; outside it falls off
//! linearly and reaches 0 once the deviation is half of the ideal amount.
//!
//! Two classifications are derived from the score: a coarse three-tier
//! [`QualityTier`] used by game logic and a six-step [`QualityGrade`] used
//! for display text.

use crate::fixed::{Fixed64, checked_div_64, clamp01};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

/// Coarse quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    Poor,
    Acceptable,
    Perfect,
}

impl QualityTier {
    /// Classify a score: `>= 0.9` Perfect, `>= 0.5` Acceptable, else Poor.
    pub fn from_score(score: Fixed64) -> Self {
        if score >= Fixed64::from_num(0.9) {
            QualityTier::Perfect
        } else if score >= Fixed64::from_num(0.5) {
            QualityTier::Acceptable
        } else {
            QualityTier::Poor
        }
    }
}

/// Fine-grained grade used for display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    Terrible,
    Poor,
    Acceptable,
    Good,
    Excellent,
    Perfect,
}

impl QualityGrade {
    /// Thresholds from the top of the ladder down.
    const LADDER: [(f64, QualityGrade); 5] = [
        (0.95, QualityGrade::Perfect),
        (0.8, QualityGrade::Excellent),
        (0.6, QualityGrade::Good),
        (0.4, QualityGrade::Acceptable),
        (0.2, QualityGrade::Poor),
    ];

    pub fn from_score(score: Fixed64) -> Self {
        Self::LADDER
            .iter()
            .find(|(threshold, _)| score >= Fixed64::from_num(*threshold))
            .map_or(QualityGrade::Terrible, |(_, grade)| *grade)
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityGrade::Perfect => "Perfect",
            QualityGrade::Excellent => "Excellent",
            QualityGrade::Good => "Good",
            QualityGrade::Acceptable => "Acceptable",
            QualityGrade::Poor => "Poor",
            QualityGrade::Terrible => "Terrible",
        }
    }
}

impl std::fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of a quality evaluation. Derived on demand, never stored as
/// authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityResult {
    /// The amount that was evaluated.
    pub amount: Fixed64,
    /// Score in `[0, 1]`.
    pub score: Fixed64,
    pub tier: QualityTier,
    pub grade: QualityGrade,
    /// Display text for the grade.
    pub description: String,
}

/// An ideal amount and the tolerance band around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTarget {
    pub ideal: Fixed64,
    pub tolerance: Fixed64,
}

impl QualityTarget {
    pub fn new(ideal: Fixed64, tolerance: Fixed64) -> Self {
        Self { ideal, tolerance }
    }

    pub fn evaluate(&self, actual: Fixed64) -> QualityResult {
        evaluate(actual, self.ideal, self.tolerance)
    }

    /// Whether `actual` lies inside the tolerance band.
    pub fn within_tolerance(&self, actual: Fixed64) -> bool {
        (actual - self.ideal).abs() <= self.tolerance
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Score `actual` against `ideal` with the given `tolerance`.
///
/// Returns 0 for non-positive amounts and 1 inside the tolerance band.
/// Outside the band the score falls linearly to 0 at a deviation of
/// `ideal * 0.5`. A degenerate band (tolerance at or beyond half the ideal)
/// scores everything outside it as 0.
pub fn score(actual: Fixed64, ideal: Fixed64, tolerance: Fixed64) -> Fixed64 {
    if actual <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }

    let deviation = (actual - ideal).abs();
    if deviation <= tolerance {
        return Fixed64::ONE;
    }

    let max_deviation = ideal / Fixed64::from_num(2) - tolerance;
    if max_deviation <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }

    let falloff = checked_div_64(deviation - tolerance, max_deviation).unwrap_or(Fixed64::ONE);
    Fixed64::ONE - clamp01(falloff)
}

/// Evaluate `actual` against `ideal` and `tolerance`, producing a score and
/// both classifications.
pub fn evaluate(actual: Fixed64, ideal: Fixed64, tolerance: Fixed64) -> QualityResult {
    let score = score(actual, ideal, tolerance);
    let grade = QualityGrade::from_score(score);
    QualityResult {
        amount: actual,
        score,
        tier: QualityTier::from_score(score),
        grade,
        description: grade.label().to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

// src/selector.rs
//! Budget-constrained asset selection.
//!
//! A script breaks down into ordered narrative beats; generated visuals are
//! expensive, so only `budget` of the N beats get one and the rest fall back
//! to stock b-roll. Beats are scored for visual importance (narrative
//! transitions, emotional peaks, new-concept introductions, structural
//! weight of the script section) and the top scorers win. If scoring is
//! unavailable or degenerate the selector falls back to even stride
//! selection so visuals still spread across the whole timeline. Selection
//! never fails.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One narrative beat of a script: its text and the structural section tag
/// the script parser attached ("hook", "context", "revelation", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beat {
    pub text: String,
    pub section: String,
}

impl Beat {
    pub fn new(text: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            section: section.into(),
        }
    }
}

lazy_static! {
    /// Narrative-transition markers: the story turns here.
    static ref TRANSITION_RE: Regex = Regex::new(
        r"(?i)\b(but|however|instead|meanwhile|suddenly|until|then came|turns out|that changed|plot twist)\b"
    )
    .expect("valid transition regex");

    /// Emotional-peak markers.
    static ref EMOTION_RE: Regex = Regex::new(
        r"(?i)\b(incredible|shocking|stunning|massive|breakthrough|revolutionary|game.?chang\w*|disaster|crisis|unbelievable|astonishing)\b"
    )
    .expect("valid emotion regex");

    /// New-concept introduction markers.
    static ref NEW_CONCEPT_RE: Regex = Regex::new(
        r"(?i)\b(introducing|meet|enter|called|known as|for the first time|imagine|what if)\b"
    )
    .expect("valid concept regex");
}

/// Structural weight of a script section. High-drama sections earn a
/// generated visual more than connective tissue.
fn section_weight(section: &str) -> f64 {
    match section.to_ascii_lowercase().as_str() {
        "hook" | "revelation" | "the breakthrough" => 3.0,
        "impact" | "results" | "solution" => 2.5,
        "call to action" | "conclusion" | "verdict" => 2.0,
        "problem" | "the challenge" | "analysis" => 1.5,
        _ => 1.0,
    }
}

/// Scores one beat for visual importance. Pluggable so the failure path is
/// drivable in tests; the selector treats any Err as "scoring unavailable"
/// and falls back to stride selection.
pub trait BeatScorer: Send + Sync {
    fn score(&self, beat: &Beat) -> Result<f64, String>;
}

/// Default marker-based scorer.
pub struct HeuristicScorer;

impl BeatScorer for HeuristicScorer {
    fn score(&self, beat: &Beat) -> Result<f64, String> {
        let mut score = section_weight(&beat.section);
        score += 1.5 * TRANSITION_RE.find_iter(&beat.text).count().min(2) as f64;
        score += 1.2 * EMOTION_RE.find_iter(&beat.text).count().min(2) as f64;
        score += 1.0 * NEW_CONCEPT_RE.find_iter(&beat.text).count().min(2) as f64;
        Ok(score)
    }
}

pub struct AssetSelector;

impl AssetSelector {
    /// Pick which beats get a generated visual. Returns exactly
    /// `min(budget, beats.len())` unique ascending indices.
    pub fn select(beats: &[Beat], budget: usize) -> Vec<usize> {
        Self::select_with_scorer(beats, budget, &HeuristicScorer)
    }

    pub fn select_with_scorer(
        beats: &[Beat],
        budget: usize,
        scorer: &dyn BeatScorer,
    ) -> Vec<usize> {
        let n = beats.len();
        let m = budget.min(n);
        if m == 0 {
            return Vec::new();
        }
        if m == n {
            return (0..n).collect();
        }

        let mut scores = Vec::with_capacity(n);
        for beat in beats {
            match scorer.score(beat) {
                Ok(score) if score.is_finite() => scores.push(score),
                Ok(score) => {
                    tracing::warn!("Beat score {} is not finite, using stride fallback", score);
                    return Self::stride(n, m);
                }
                Err(e) => {
                    tracing::warn!("Beat scoring failed ({}), using stride fallback", e);
                    return Self::stride(n, m);
                }
            }
        }

        // All-equal scores carry no signal; spread visuals evenly instead of
        // clustering them at the front by index order.
        let max = scores.iter().cloned().fold(f64::MIN, f64::max);
        let min = scores.iter().cloned().fold(f64::MAX, f64::min);
        if max - min < 1e-9 {
            return Self::stride(n, m);
        }

        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        let mut selected: Vec<usize> = ranked.into_iter().take(m).collect();
        selected.sort_unstable();
        selected
    }

    /// Even stride fallback: indices `i * floor(n / m)`, clamped. Guarantees
    /// coverage across the whole timeline.
    fn stride(n: usize, m: usize) -> Vec<usize> {
        let step = (n / m).max(1);
        (0..m).map(|i| (i * step).min(n - 1)).collect()
    }
}

//! Deterministic action selection for autonomous agents.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use hive_core::{ActionCandidate, AgentId, Decision};

/// Picks one action per autonomous cycle.
///
/// Score is `priority * urgency`. Candidates below the minimum score (or with a
/// non-finite score) are ignored; ties go to the lexicographically smallest
/// action name so the same candidate set always yields the same decision.
pub struct DecisionEngine {
    agent_id: AgentId,
    min_score: f64,
    decisions_made: AtomicU64,
    last_decision: Mutex<Option<Decision>>,
}

impl DecisionEngine {
    pub fn new(agent_id: impl Into<AgentId>, min_score: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            min_score,
            decisions_made: AtomicU64::new(0),
            last_decision: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn decide(&self, candidates: &[ActionCandidate]) -> Option<Decision> {
        let mut best: Option<(&ActionCandidate, f64)> = None;
        for candidate in candidates {
            let score = candidate.score();
            if !score.is_finite() || score < self.min_score {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, best_score)) => {
                    score > best_score
                        || (score == best_score && candidate.action < current.action)
                }
            };
            if better {
                best = Some((candidate, score));
            }
        }

        let (candidate, score) = best?;
        let decision = Decision {
            agent_id: self.agent_id.clone(),
            action: candidate.action.clone(),
            score,
            params: candidate.params.clone(),
            decided_at: Utc::now(),
        };
        self.decisions_made.fetch_add(1, Ordering::Relaxed);
        *self.last_decision.lock() = Some(decision.clone());
        Some(decision)
    }

    pub fn decisions_made(&self) -> u64 {
        self.decisions_made.load(Ordering::Relaxed)
    }

    pub fn last_decision(&self) -> Option<Decision> {
        self.last_decision.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_score_wins() {
        let engine = DecisionEngine::new("nyx", 0.0);
        let decision = engine
            .decide(&[
                ActionCandidate::new("post", 0.5, 0.5),
                ActionCandidate::new("reflect", 0.9, 0.9),
                ActionCandidate::new("idle", 0.1, 1.0),
            ])
            .unwrap();
        assert_eq!(decision.action, "reflect");
        assert!((decision.score - 0.81).abs() < 1e-9);
        assert_eq!(decision.agent_id, "nyx");
        assert_eq!(engine.decisions_made(), 1);
    }

    #[test]
    fn test_tie_breaks_on_name() {
        let engine = DecisionEngine::new("nyx", 0.0);
        let decision = engine
            .decide(&[
                ActionCandidate::new("zeta", 0.5, 0.5),
                ActionCandidate::new("alpha", 0.5, 0.5),
            ])
            .unwrap();
        assert_eq!(decision.action, "alpha");
    }

    #[test]
    fn test_min_score_filters() {
        let engine = DecisionEngine::new("nyx", 0.5);
        assert!(engine
            .decide(&[ActionCandidate::new("weak", 0.5, 0.5)])
            .is_none());
        assert_eq!(engine.decisions_made(), 0);
        assert!(engine.last_decision().is_none());
    }

    #[test]
    fn test_nan_is_skipped() {
        let engine = DecisionEngine::new("nyx", 0.0);
        let decision = engine
            .decide(&[
                ActionCandidate::new("broken", f64::NAN, 1.0),
                ActionCandidate::new("fine", 0.1, 0.1),
            ])
            .unwrap();
        assert_eq!(decision.action, "fine");
    }

    #[test]
    fn test_empty_candidates() {
        let engine = DecisionEngine::new("nyx", 0.0);
        assert!(engine.decide(&[]).is_none());
    }
}

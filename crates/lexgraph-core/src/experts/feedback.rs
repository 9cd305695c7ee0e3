//! Community feedback on expert responses
//!
//! Converts a user rating into traversal-weight update suggestions. Storage
//! and authority scoring live outside the core; this module only computes the
//! deltas a rating implies and applies them to a weight table, which feeds
//! the experts configuration for the next construction (experts themselves
//! are immutable).

use crate::model::ExpertResponse;
use crate::retrieval::TraversalWeights;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Update step per unit of rating signal
const LEARNING_RATE: f64 = 0.1;

/// Weight bounds after applying updates
const WEIGHT_MIN: f64 = 0.1;
const WEIGHT_MAX: f64 = 1.0;

/// One recorded feedback event with its suggested weight deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: String,
    pub trace_id: String,
    pub expert_type: String,
    pub user_rating: f64,
    pub feedback_type: String,
    pub response_confidence: f64,
    pub sources_used: usize,
    pub weight_update_suggestions: HashMap<String, f64>,
}

/// Record feedback for a response, computing suggested weight deltas.
pub fn record_feedback(
    response: &ExpertResponse,
    user_rating: f64,
    feedback_type: &str,
    weights: &TraversalWeights,
) -> FeedbackRecord {
    let suggestions = compute_weight_updates(user_rating, weights);

    tracing::info!(
        expert = response.expert_type.as_str(),
        rating = user_rating,
        trace_id = response.trace_id.as_str(),
        updates = suggestions.len(),
        "feedback recorded"
    );

    FeedbackRecord {
        timestamp: crate::model::now_iso(),
        trace_id: response.trace_id.clone(),
        expert_type: response.expert_type.clone(),
        user_rating,
        feedback_type: feedback_type.to_string(),
        response_confidence: response.confidence,
        sources_used: response.legal_basis.len(),
        weight_update_suggestions: suggestions,
    }
}

/// Suggested delta per relation weight:
/// - rating above 0.7 strengthens the current weights
/// - rating below 0.3 weakens them
/// - the neutral zone suggests nothing
pub fn compute_weight_updates(
    user_rating: f64,
    weights: &TraversalWeights,
) -> HashMap<String, f64> {
    let factor = if user_rating > 0.7 {
        LEARNING_RATE * (user_rating - 0.5)
    } else if user_rating < 0.3 {
        -LEARNING_RATE * (0.5 - user_rating)
    } else {
        return HashMap::new();
    };

    weights
        .as_map()
        .iter()
        .filter(|(relation, _)| relation.as_str() != "default")
        .map(|(relation, weight)| (relation.clone(), factor * weight))
        .collect()
}

/// Apply deltas to a weight table, clamping each weight to [0.1, 1.0].
/// Unknown relations in the updates are ignored.
pub fn apply_weight_updates(weights: &mut HashMap<String, f64>, updates: &HashMap<String, f64>) {
    for (relation, delta) in updates {
        if let Some(weight) = weights.get_mut(relation) {
            *weight = (*weight + delta).clamp(WEIGHT_MIN, WEIGHT_MAX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExpertKind;
    use crate::retrieval::weights::for_expert;

    fn response() -> ExpertResponse {
        ExpertResponse::degraded("literal", "x", "y", "trace-1")
    }

    #[test]
    fn positive_rating_strengthens_weights() {
        let weights = for_expert(ExpertKind::Literal);
        let updates = compute_weight_updates(0.9, &weights);

        assert!(!updates.is_empty());
        assert!(!updates.contains_key("default"));
        // factor = 0.1 * 0.4; contiene weighs 1.0
        assert!((updates["contiene"] - 0.04).abs() < 1e-9);
        assert!(updates.values().all(|d| *d > 0.0));
    }

    #[test]
    fn negative_rating_weakens_weights() {
        let weights = for_expert(ExpertKind::Precedent);
        let updates = compute_weight_updates(0.1, &weights);
        assert!(updates.values().all(|d| *d < 0.0));
        // factor = -0.1 * 0.4; interpreta weighs 1.0
        assert!((updates["interpreta"] + 0.04).abs() < 1e-9);
    }

    #[test]
    fn neutral_rating_suggests_nothing() {
        let weights = for_expert(ExpertKind::Systemic);
        assert!(compute_weight_updates(0.5, &weights).is_empty());
        assert!(compute_weight_updates(0.3, &weights).is_empty());
        assert!(compute_weight_updates(0.7, &weights).is_empty());
    }

    #[test]
    fn apply_clamps_to_bounds() {
        let mut weights: HashMap<String, f64> =
            [("contiene".to_string(), 0.98), ("cita".to_string(), 0.12)]
                .into_iter()
                .collect();

        let updates: HashMap<String, f64> =
            [("contiene".to_string(), 0.1), ("cita".to_string(), -0.1)]
                .into_iter()
                .collect();
        apply_weight_updates(&mut weights, &updates);

        assert!((weights["contiene"] - 1.0).abs() < 1e-9);
        assert!((weights["cita"] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn apply_ignores_unknown_relations() {
        let mut weights: HashMap<String, f64> = [("contiene".to_string(), 0.5)].into_iter().collect();
        let updates: HashMap<String, f64> = [("sconosciuta".to_string(), 0.2)].into_iter().collect();
        apply_weight_updates(&mut weights, &updates);
        assert_eq!(weights.len(), 1);
        assert!((weights["contiene"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn record_carries_response_facts() {
        let weights = for_expert(ExpertKind::Literal);
        let record = record_feedback(&response(), 0.9, "accuracy", &weights);
        assert_eq!(record.expert_type, "literal");
        assert_eq!(record.trace_id, "trace-1");
        assert!((record.user_rating - 0.9).abs() < 1e-9);
        assert!(!record.weight_update_suggestions.is_empty());
    }
}

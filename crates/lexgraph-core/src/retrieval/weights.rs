//! Expert-specific graph traversal weights
//!
//! Each interpretive canon privileges different relation types when walking
//! the knowledge graph: the literal canon follows structure and definitions,
//! the systemic canon follows connections and amendments, the principles
//! canon follows implementation of principles, the precedent canon follows
//! interpretation and application by courts.

use crate::model::ExpertKind;
use std::collections::HashMap;

/// Weight table for path scoring, with a default for unnamed relations
#[derive(Debug, Clone)]
pub struct TraversalWeights {
    weights: HashMap<String, f64>,
    default: f64,
}

impl TraversalWeights {
    pub fn new(weights: HashMap<String, f64>) -> Self {
        let default = weights.get("default").copied().unwrap_or(0.5);
        Self { weights, default }
    }

    /// Weight for a relation type, falling back to the table default
    pub fn get(&self, relation: &str) -> f64 {
        self.weights.get(relation).copied().unwrap_or(self.default)
    }

    /// Relation types explicitly named by this table (excluding the default)
    pub fn priority_relations(&self) -> Vec<String> {
        let mut relations: Vec<String> = self
            .weights
            .keys()
            .filter(|k| k.as_str() != "default")
            .cloned()
            .collect();
        relations.sort_by(|a, b| {
            self.get(b)
                .partial_cmp(&self.get(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        relations
    }

    pub fn as_map(&self) -> &HashMap<String, f64> {
        &self.weights
    }
}

fn table(entries: &[(&str, f64)]) -> TraversalWeights {
    TraversalWeights::new(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
    )
}

/// Canonical traversal weights for an expert kind
pub fn for_expert(kind: ExpertKind) -> TraversalWeights {
    match kind {
        ExpertKind::Literal => table(&[
            ("contiene", 1.00),
            ("disciplina", 0.95),
            ("definisce", 0.95),
            ("rinvia", 0.90),
            ("modifica", 0.85),
            ("cita", 0.75),
            ("default", 0.50),
        ]),
        ExpertKind::Systemic => table(&[
            ("connesso_a", 1.00),
            ("modifica", 0.95),
            ("contiene", 0.85),
            ("disciplina", 0.85),
            ("cita", 0.70),
            ("default", 0.50),
        ]),
        ExpertKind::Principles => table(&[
            ("attua", 1.00),
            ("esprime", 0.95),
            ("disciplina", 0.90),
            ("default", 0.50),
        ]),
        ExpertKind::Precedent => table(&[
            ("interpreta", 1.00),
            ("applica", 0.95),
            ("cita", 0.90),
            ("conferma", 0.85),
            ("disciplina", 0.70),
            ("default", 0.50),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_values() {
        let literal = for_expert(ExpertKind::Literal);
        assert!((literal.get("contiene") - 1.00).abs() < 1e-9);
        assert!((literal.get("definisce") - 0.95).abs() < 1e-9);
        assert!((literal.get("cita") - 0.75).abs() < 1e-9);

        let systemic = for_expert(ExpertKind::Systemic);
        assert!((systemic.get("connesso_a") - 1.00).abs() < 1e-9);
        assert!((systemic.get("modifica") - 0.95).abs() < 1e-9);

        let principles = for_expert(ExpertKind::Principles);
        assert!((principles.get("attua") - 1.00).abs() < 1e-9);

        let precedent = for_expert(ExpertKind::Precedent);
        assert!((precedent.get("interpreta") - 1.00).abs() < 1e-9);
        assert!((precedent.get("cita") - 0.90).abs() < 1e-9);
    }

    #[test]
    fn unnamed_relations_fall_back_to_default() {
        for kind in ExpertKind::ALL {
            let weights = for_expert(kind);
            assert!((weights.get("gerarchia_kelseniana") - 0.50).abs() < 1e-9);
            assert!((weights.get("nonexistent") - 0.50).abs() < 1e-9);
        }
    }

    #[test]
    fn priority_relations_exclude_default_and_sort_by_weight() {
        let relations = for_expert(ExpertKind::Precedent).priority_relations();
        assert!(!relations.contains(&"default".to_string()));
        assert_eq!(relations[0], "interpreta");
        assert_eq!(relations[1], "applica");
    }

    #[test]
    fn override_table_keeps_custom_default() {
        let weights = TraversalWeights::new(
            [("speciale".to_string(), 0.9), ("default".to_string(), 0.4)]
                .into_iter()
                .collect(),
        );
        assert!((weights.get("speciale") - 0.9).abs() < 1e-9);
        assert!((weights.get("altro") - 0.4).abs() < 1e-9);
    }
}

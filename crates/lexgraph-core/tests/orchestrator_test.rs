//! End-to-end orchestrator scenarios against frozen backends

mod common;

use common::*;
use lexgraph_core::{
    AggregationMethod, EngineConfig, ExpertsFile, GraphAwareRetriever, InterpretOptions,
    Orchestrator, QueryRouter, RetrieverConfig, SemanticSearchTool, ToolRegistry,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn chunk_ids() -> (Uuid, Uuid) {
    (
        "11111111-1111-4111-8111-111111111111".parse().unwrap(),
        "22222222-2222-4222-8222-222222222222".parse().unwrap(),
    )
}

/// Registry with a semantic_search tool over two frozen norm chunks
fn norm_registry() -> Arc<ToolRegistry> {
    let (c1, c2) = chunk_ids();
    let vectors = Arc::new(CannedVectors(vec![
        norm_point(
            c1,
            0.92,
            "Art. 1218 c.c. Il debitore che non esegue esattamente la prestazione dovuta...",
            "urn:norma:cc:art1218",
        ),
        norm_point(
            c2,
            0.81,
            "Art. 1219 c.c. Il debitore è costituito in mora mediante intimazione...",
            "urn:norma:cc:art1219",
        ),
    ]));

    let retriever = Arc::new(GraphAwareRetriever::new(
        Some(vectors),
        None,
        None,
        RetrieverConfig::default(),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SemanticSearchTool::new(
        Some(retriever),
        Some(Arc::new(FixedEmbedder)),
    )));
    Arc::new(registry)
}

fn orchestrator_with_llm(llm: Arc<MarkerLlm>, registry: Arc<ToolRegistry>) -> Orchestrator {
    Orchestrator::new(
        registry,
        Some(llm),
        &ExpertsFile::default(),
        QueryRouter::new(),
        EngineConfig::default().orchestrator,
    )
}

#[tokio::test]
async fn literal_norm_grounded_query() {
    let (c1, _) = chunk_ids();
    let llm = Arc::new(
        MarkerLlm::new(empty_expert_json(0.5)).with_rule(
            "FONTI RECUPERATE",
            citing_expert_json(0.8, &[(&c1.to_string(), "Art. 1218 c.c.")]),
        ),
    );
    let orchestrator = orchestrator_with_llm(llm, norm_registry());

    let mut hint_entities = HashMap::new();
    hint_entities.insert(
        "norm_references".to_string(),
        vec!["urn:norma:cc:art1218".to_string()],
    );

    let outcome = orchestrator
        .interpret(
            "Cosa prevede l'art. 1218 c.c. sulla responsabilità del debitore?",
            InterpretOptions {
                hint_entities: Some(hint_entities),
                ..Default::default()
            },
        )
        .await;

    // Norm references boost the literal expert above the selection floor
    let literal_weight = outcome.trace.routing["expert_weights"]["literal"]
        .as_f64()
        .unwrap();
    assert!(
        literal_weight >= 0.35,
        "literal weight {} below 0.35",
        literal_weight
    );

    // At least one expert contributed and cited only norm sources
    assert!(!outcome.response.expert_contributions.is_empty());
    assert!(!outcome.response.combined_legal_basis.is_empty());
    for source in &outcome.response.combined_legal_basis {
        assert_eq!(source.source_type, "norm");
    }

    // Cited sources are grounded in the retrieval trace
    assert!((outcome.trace.source_validation.grounding_rate - 1.0).abs() < 1e-9);
    assert_eq!(outcome.trace.source_validation.hallucinated_count, 0);
}

#[tokio::test]
async fn jurisprudential_query_routes_to_precedent() {
    let llm = Arc::new(MarkerLlm::new(empty_expert_json(0.6)));
    let orchestrator = orchestrator_with_llm(llm, norm_registry());

    let outcome = orchestrator
        .interpret(
            "Orientamento della Cassazione sulla fideiussione omnibus",
            InterpretOptions::default(),
        )
        .await;

    assert_eq!(outcome.trace.routing["query_type"], "jurisprudential");
    let precedent_weight = outcome.trace.routing["expert_weights"]["precedent"]
        .as_f64()
        .unwrap();
    assert!(
        precedent_weight >= 0.55,
        "precedent weight {} below 0.55",
        precedent_weight
    );

    // The precedent expert searched with its canonical source-type filter
    let precedent_search = outcome
        .trace
        .tool_calls
        .iter()
        .find(|tc| tc.expert == "precedent" && tc.tool == "semantic_search")
        .expect("precedent expert ran semantic_search");
    let source_types: Vec<&str> = precedent_search.params["source_types"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(source_types, vec!["massima", "sentenza"]);
}

#[tokio::test]
async fn timeout_isolates_hanging_expert() {
    // The literal prompt is the only one carrying this marker
    let llm = Arc::new(
        MarkerLlm::new(empty_expert_json(0.7)).hang_on("INTERPRETAZIONE LETTERALE"),
    );
    let orchestrator = orchestrator_with_llm(llm, Arc::new(ToolRegistry::new()));

    let outcome = orchestrator
        .interpret(
            "Interpretazione di una disposizione del codice civile",
            InterpretOptions {
                timeout: Some(Duration::from_millis(100)),
                ..Default::default()
            },
        )
        .await;

    let literal = &outcome.response.expert_contributions["literal"];
    assert_eq!(literal["confidence"].as_f64().unwrap(), 0.0);
    assert!(literal["interpretation"]
        .as_str()
        .unwrap()
        .contains("Timeout"));

    // Remaining experts completed and carry the aggregate confidence
    let others: Vec<&String> = outcome
        .response
        .expert_contributions
        .keys()
        .filter(|k| k.as_str() != "literal")
        .collect();
    assert!(!others.is_empty());
    for key in others {
        let confidence = outcome.response.expert_contributions[key]["confidence"]
            .as_f64()
            .unwrap();
        assert!(confidence > 0.0, "{} should have completed", key);
    }
    assert!(outcome.response.confidence > 0.0);
}

#[tokio::test]
async fn all_experts_failing_degrades_aggregate() {
    // Every expert prompt carries the output contract marker, so every
    // expert hangs and times out
    let llm = Arc::new(MarkerLlm::new(empty_expert_json(0.7)).hang_on("SOURCE OF TRUTH"));
    let orchestrator = orchestrator_with_llm(llm, Arc::new(ToolRegistry::new()));

    let outcome = orchestrator
        .interpret(
            "Interpretazione di una disposizione qualunque",
            InterpretOptions {
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        )
        .await;

    assert_eq!(outcome.response.synthesis, "Nessuna risposta da aggregare");
    assert_eq!(outcome.response.confidence, 0.0);
    assert!(!outcome.response.conflicts.is_empty());
    // The timed-out experts still appear among the contributions
    assert!(!outcome.response.expert_contributions.is_empty());
    for contribution in outcome.response.expert_contributions.values() {
        assert_eq!(contribution["confidence"].as_f64().unwrap(), 0.0);
    }
}

#[tokio::test]
async fn repeated_queries_are_deterministic() {
    for method in [
        AggregationMethod::WeightedAverage,
        AggregationMethod::BestConfidence,
    ] {
        let (c1, _) = chunk_ids();
        let llm = Arc::new(
            MarkerLlm::new(empty_expert_json(0.5)).with_rule(
                "FONTI RECUPERATE",
                citing_expert_json(0.8, &[(&c1.to_string(), "Art. 1218 c.c.")]),
            ),
        );
        let orchestrator = orchestrator_with_llm(llm, norm_registry());

        let opts = InterpretOptions {
            aggregation_method: Some(method),
            ..Default::default()
        };
        let first = orchestrator
            .interpret("Cosa prevede l'art. 1218 c.c.?", opts.clone())
            .await;
        let second = orchestrator
            .interpret("Cosa prevede l'art. 1218 c.c.?", opts)
            .await;

        assert_eq!(first.response.synthesis, second.response.synthesis);
        assert!((first.response.confidence - second.response.confidence).abs() < 1e-12);
        let ids = |r: &lexgraph_core::AggregatedResponse| {
            r.combined_legal_basis
                .iter()
                .map(|s| s.source_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first.response), ids(&second.response));
    }
}

#[tokio::test]
async fn combined_basis_never_duplicates_source_ids() {
    let (c1, c2) = chunk_ids();
    // Every expert cites the same two sources
    let llm = Arc::new(MarkerLlm::new(citing_expert_json(
        0.7,
        &[
            (&c1.to_string(), "Art. 1218 c.c."),
            (&c2.to_string(), "Art. 1219 c.c."),
        ],
    )));
    let orchestrator = orchestrator_with_llm(llm, norm_registry());

    let outcome = orchestrator
        .interpret("Responsabilità del debitore e mora", InterpretOptions::default())
        .await;

    let ids: Vec<&str> = outcome
        .response
        .combined_legal_basis
        .iter()
        .map(|s| s.source_id.as_str())
        .collect();
    let unique: std::collections::HashSet<&&str> = ids.iter().collect();
    assert_eq!(ids.len(), unique.len());
    assert!(ids.len() <= 10);
}

#[tokio::test]
async fn baseline_comparison_is_traced() {
    let llm = Arc::new(
        MarkerLlm::new(empty_expert_json(0.5)).with_rule(
            "DOMANDA:",
            "La responsabilità del debitore è disciplinata dall'art. 1218 c.c.".to_string(),
        ),
    );
    let orchestrator = orchestrator_with_llm(llm, Arc::new(ToolRegistry::new()));

    let outcome = orchestrator
        .interpret(
            "Responsabilità del debitore",
            InterpretOptions {
                run_baseline: true,
                ..Default::default()
            },
        )
        .await;

    let baseline = outcome.trace.baseline.expect("baseline recorded");
    assert!(baseline.response.contains("1218"));
    assert!(baseline
        .sources_cited
        .iter()
        .any(|c| c.contains("1218")));
}

//! Multi-expert interpretation
//!
//! The four experts are data-driven profiles over one `Expert` struct: each
//! carries its interpretive canon (prompt), source-type filter, graph
//! traversal weights and tool inventory. Source collection runs either as a
//! fixed sequence (standard mode) or as a ReAct loop; the structured
//! interpretation always comes from one language-model synthesis call.

mod analyze;
pub mod feedback;
pub mod gating;
pub mod orchestrator;
pub mod prompts;
pub mod react;
pub mod router;

pub use gating::{AggregatedResponse, AggregationMethod, GatingNetwork};
pub use orchestrator::{InterpretOptions, Orchestrator, OrchestratorOutcome};
pub use react::{ReactConfig, ReactController, ReactOutcome};
pub use router::{QueryRouter, QueryType, RoutingDecision};

use crate::config::{ExpertDefaults, ExpertSettings};
use crate::llm::LanguageModel;
use crate::model::{ExpertKind, SourceType};
use crate::retrieval::{weights, TraversalWeights};
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Static facts of one interpretive canon
pub struct ExpertProfile {
    pub kind: ExpertKind,
    pub description: &'static str,
    /// Source types this canon retrieves
    pub source_types: &'static [SourceType],
    /// Graph traversal direction for norm expansion
    pub direction: &'static str,
    prompt: fn() -> String,
}

impl ExpertProfile {
    pub fn of(kind: ExpertKind) -> &'static ExpertProfile {
        match kind {
            ExpertKind::Literal => &LITERAL_PROFILE,
            ExpertKind::Systemic => &SYSTEMIC_PROFILE,
            ExpertKind::Principles => &PRINCIPLES_PROFILE,
            ExpertKind::Precedent => &PRECEDENT_PROFILE,
        }
    }

    pub fn default_prompt(&self) -> String {
        (self.prompt)()
    }
}

static LITERAL_PROFILE: ExpertProfile = ExpertProfile {
    kind: ExpertKind::Literal,
    description: "Interpretazione letterale (art. 12, I disp. prel. c.c.)",
    source_types: &[SourceType::Norma],
    direction: "both",
    prompt: prompts::literal_prompt,
};

static SYSTEMIC_PROFILE: ExpertProfile = ExpertProfile {
    kind: ExpertKind::Systemic,
    description: "Interpretazione sistematica e storico-evolutiva (art. 12, I e art. 14 disp. prel. c.c.)",
    source_types: &[SourceType::Norma],
    direction: "both",
    prompt: prompts::systemic_prompt,
};

static PRINCIPLES_PROFILE: ExpertProfile = ExpertProfile {
    kind: ExpertKind::Principles,
    description: "Interpretazione teleologica (art. 12, II disp. prel. c.c.)",
    source_types: &[
        SourceType::Ratio,
        SourceType::Spiegazione,
        SourceType::Principio,
    ],
    direction: "both",
    prompt: prompts::principles_prompt,
};

static PRECEDENT_PROFILE: ExpertProfile = ExpertProfile {
    kind: ExpertKind::Precedent,
    description: "Interpretazione giurisprudenziale (prassi applicativa)",
    source_types: &[SourceType::Massima, SourceType::Sentenza],
    // Judgments point at the norms they interpret; walking incoming edges
    // from a norm finds the judgments citing it.
    direction: "incoming",
    prompt: prompts::precedent_prompt,
};

/// One interpretive expert: immutable after construction, shared by reference
/// across query tasks.
pub struct Expert {
    profile: &'static ExpertProfile,
    prompt_template: String,
    traversal_weights: TraversalWeights,
    model: Option<String>,
    temperature: f32,
    top_k: usize,
    use_react: bool,
    react_config: ReactConfig,
    tools: Arc<ToolRegistry>,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl Expert {
    pub fn new(
        kind: ExpertKind,
        settings: &ExpertSettings,
        defaults: &ExpertDefaults,
        tools: Arc<ToolRegistry>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        let profile = ExpertProfile::of(kind);

        let prompt_template = settings
            .prompt_template
            .clone()
            .unwrap_or_else(|| profile.default_prompt());

        let traversal_weights = settings
            .traversal_weights
            .clone()
            .map(TraversalWeights::new)
            .unwrap_or_else(|| weights::for_expert(kind));

        let model = settings.model.clone().or_else(|| defaults.model.clone());
        let temperature = settings
            .temperature
            .or(defaults.temperature)
            .unwrap_or(0.3);

        let react_config = ReactConfig {
            max_iterations: settings.react_max_iterations.unwrap_or(5),
            novelty_threshold: settings.react_novelty_threshold.unwrap_or(0.1),
        };

        tracing::info!(
            expert = kind.as_str(),
            tools = tools.len(),
            has_llm = llm.is_some(),
            use_react = settings.use_react.unwrap_or(false),
            "expert initialized"
        );

        Self {
            profile,
            prompt_template,
            traversal_weights,
            model,
            temperature,
            top_k: settings.top_k.unwrap_or(5),
            use_react: settings.use_react.unwrap_or(false),
            react_config,
            tools,
            llm,
        }
    }

    pub fn kind(&self) -> ExpertKind {
        self.profile.kind
    }

    pub fn description(&self) -> &str {
        self.profile.description
    }

    pub fn traversal_weights(&self) -> &TraversalWeights {
        &self.traversal_weights
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn llm(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.llm.as_ref()
    }

    pub fn uses_react(&self) -> bool {
        self.use_react
    }

    pub(crate) fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub(crate) fn temperature(&self) -> f32 {
        self.temperature
    }

    pub(crate) fn top_k(&self) -> usize {
        self.top_k
    }

    pub(crate) fn react_config(&self) -> &ReactConfig {
        &self.react_config
    }

    pub(crate) fn profile(&self) -> &'static ExpertProfile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_carry_canonical_filters() {
        assert_eq!(
            ExpertProfile::of(ExpertKind::Literal).source_types,
            &[SourceType::Norma]
        );
        assert_eq!(
            ExpertProfile::of(ExpertKind::Precedent).source_types,
            &[SourceType::Massima, SourceType::Sentenza]
        );
        assert_eq!(ExpertProfile::of(ExpertKind::Precedent).direction, "incoming");
        assert_eq!(ExpertProfile::of(ExpertKind::Systemic).direction, "both");
    }

    #[test]
    fn settings_override_profile_defaults() {
        let settings = ExpertSettings {
            model: Some("override/model".to_string()),
            temperature: Some(0.1),
            use_react: Some(true),
            react_max_iterations: Some(7),
            ..Default::default()
        };
        let expert = Expert::new(
            ExpertKind::Systemic,
            &settings,
            &ExpertDefaults::default(),
            Arc::new(ToolRegistry::new()),
            None,
        );
        assert_eq!(expert.model(), Some("override/model"));
        assert!((expert.temperature() - 0.1).abs() < 1e-6);
        assert!(expert.uses_react());
        assert_eq!(expert.react_config().max_iterations, 7);
    }

    #[test]
    fn defaults_fill_missing_settings() {
        let defaults = ExpertDefaults {
            model: Some("default/model".to_string()),
            temperature: Some(0.2),
        };
        let expert = Expert::new(
            ExpertKind::Literal,
            &ExpertSettings::default(),
            &defaults,
            Arc::new(ToolRegistry::new()),
            None,
        );
        assert_eq!(expert.model(), Some("default/model"));
        assert!((expert.temperature() - 0.2).abs() < 1e-6);
        assert!(!expert.uses_react());
        assert_eq!(expert.react_config().max_iterations, 5);
        assert!((expert.react_config().novelty_threshold - 0.1).abs() < 1e-9);
    }
}

//! Intelligent router
//!
//! Scores every registered agent against the task and the memory snapshot by
//! capability-tag matching and selects one agent (or several, for fan-out).
//! Routing is a pure function of (task, snapshot, registry, config): the only
//! randomness is an explicitly seeded tie-break.

use crate::agents::{AgentDescriptor, AgentRegistry};
use crate::config::RouterConfig;
use crate::errors::{Result, WorkflowError};
use crate::memory::backend::{fnv1a, tokens};
use crate::memory::MemorySnapshot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Shortest prefix accepted as a tag/term match
const MIN_PREFIX_MATCH: usize = 4;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "how", "i",
    "in", "is", "it", "me", "my", "of", "on", "or", "please", "the", "this", "to", "us", "we",
    "what", "with", "you",
];

/// Confidence of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent: String,
    pub score: f64,
}

/// Routing decision, attached once to run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected agents, in registration order
    pub agents: Vec<String>,
    /// Confidence of the best agent
    pub confidence: f64,
    /// No agent reached the threshold; a default agent was used
    pub fallback: bool,
    /// Every agent's confidence, in registration order
    pub scores: Vec<AgentScore>,
    /// Scored against a degraded memory snapshot
    pub degraded_context: bool,
}

impl RoutingDecision {
    pub fn is_fan_out(&self) -> bool {
        self.agents.len() > 1
    }
}

/// Distinct non-stop-word terms of `text`, in first-occurrence order
pub fn terms(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for token in tokens(text) {
        if !STOP_WORDS.contains(&token.as_str()) && !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

fn term_matches_tag(term: &str, tag: &str) -> bool {
    if term == tag {
        return true;
    }
    let (short, long) = if term.len() <= tag.len() { (term, tag) } else { (tag, term) };
    short.len() >= MIN_PREFIX_MATCH && long.starts_with(short)
}

/// Fraction of `terms` matched by any of the tags
fn match_fraction(terms: &[String], tags: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms
        .iter()
        .filter(|term| tags.iter().any(|tag| term_matches_tag(term, tag)))
        .count();
    matched as f64 / terms.len() as f64
}

fn capability_terms(descriptor: &AgentDescriptor) -> Vec<String> {
    descriptor
        .capabilities
        .iter()
        .flat_map(|tag| tokens(tag))
        .collect()
}

/// Intelligent router
#[derive(Debug, Clone)]
pub struct IntelligentRouter {
    config: RouterConfig,
}

impl IntelligentRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Select the agent(s) for `task`
    ///
    /// Fails with `NoAgentsRegistered` on an empty registry. A degraded
    /// snapshot is used with reduced weight, never rejected.
    pub fn route(
        &self,
        task: &str,
        memory: &MemorySnapshot,
        registry: &AgentRegistry,
    ) -> Result<RoutingDecision> {
        if registry.is_empty() {
            return Err(WorkflowError::NoAgentsRegistered);
        }

        let task_terms = terms(task);
        let mut context_terms: Vec<String> = Vec::new();
        for text in memory.texts() {
            for term in terms(text) {
                if !context_terms.contains(&term) {
                    context_terms.push(term);
                }
            }
        }

        let mut weight = self.config.context_weight.clamp(0.0, 1.0);
        if memory.degraded {
            weight *= self.config.degraded_context_penalty.clamp(0.0, 1.0);
        }

        let scores: Vec<AgentScore> = registry
            .descriptors()
            .map(|descriptor| {
                let tags = capability_terms(descriptor);
                let task_score = match_fraction(&task_terms, &tags);
                let score = if context_terms.is_empty() {
                    task_score
                } else {
                    (1.0 - weight) * task_score + weight * match_fraction(&context_terms, &tags)
                };
                AgentScore {
                    agent: descriptor.name.clone(),
                    score,
                }
            })
            .collect();

        let best = scores
            .iter()
            .map(|s| s.score)
            .fold(f64::NEG_INFINITY, f64::max);
        let winner = self.break_tie(task, &scores, best);
        let threshold = self.config.confidence_threshold;

        let decision = if best < threshold {
            let agent = self.fallback_agent(registry);
            debug!(task, best, threshold, agent = %agent, "no confident match, using fallback agent");
            RoutingDecision {
                agents: vec![agent],
                confidence: best,
                fallback: true,
                scores,
                degraded_context: memory.degraded,
            }
        } else {
            let agents = self.select_fan_out(winner, &scores, best);
            debug!(task, best, agents = ?agents, "routed");
            RoutingDecision {
                agents,
                confidence: best,
                fallback: false,
                scores,
                degraded_context: memory.degraded,
            }
        };

        Ok(decision)
    }

    /// Index of the winning agent among those scoring `best`
    fn break_tie(&self, task: &str, scores: &[AgentScore], best: f64) -> usize {
        let tied: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| s.score == best)
            .map(|(i, _)| i)
            .collect();

        match (self.config.tie_break_seed, tied.len()) {
            (Some(seed), n) if n > 1 => {
                let mut rng = StdRng::seed_from_u64(seed ^ fnv1a(task.as_bytes()));
                tied[rng.gen_range(0..n)]
            }
            // earliest registration wins
            _ => tied.first().copied().unwrap_or(0),
        }
    }

    fn select_fan_out(&self, winner: usize, scores: &[AgentScore], best: f64) -> Vec<String> {
        let mut selected = vec![winner];

        if self.config.max_fanout > 1 {
            let floor = (best - self.config.fanout_margin.max(0.0)).max(self.config.confidence_threshold);
            let mut others: Vec<usize> = (0..scores.len())
                .filter(|&i| i != winner && scores[i].score >= floor)
                .collect();
            // best first, then registration
            others.sort_by(|&a, &b| {
                scores[b]
                    .score
                    .partial_cmp(&scores[a].score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            selected.extend(others.into_iter().take(self.config.max_fanout - 1));
        }

        selected.sort_unstable();
        selected
            .into_iter()
            .map(|i| scores[i].agent.clone())
            .collect()
    }

    fn fallback_agent(&self, registry: &AgentRegistry) -> String {
        if let Some(name) = &self.config.default_agent {
            if registry.contains(name) {
                return name.clone();
            }
            warn!(agent = %name, "configured default agent is not registered");
        }
        registry.names().into_iter().next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ScriptStep, ScriptedAgent};
    use crate::types::Turn;
    use quickcheck_macros::quickcheck;
    use serde_json::json;

    fn agent(name: &str, tags: &[&str]) -> ScriptedAgent {
        ScriptedAgent::new(
            AgentDescriptor::new(name, "").capabilities(tags.iter().copied()),
            vec![ScriptStep::Complete(json!(name))],
        )
    }

    fn roster() -> AgentRegistry {
        AgentRegistry::builder()
            .with(agent("Researcher", &["research", "search", "sources"]))
            .unwrap()
            .with(agent("Analyst", &["sales", "summarize", "q1", "quarterly", "metrics"]))
            .unwrap()
            .with(agent("Writer", &["write", "draft", "report"]))
            .unwrap()
            .build()
    }

    fn empty_memory() -> MemorySnapshot {
        MemorySnapshot::empty("s", "")
    }

    #[test]
    fn test_terms_drop_stop_words_and_duplicates() {
        assert_eq!(terms("Summarize the sales for Q1, sales!"), vec!["summarize", "sales", "q1"]);
        assert!(terms("for the").is_empty());
    }

    #[test]
    fn test_prefix_matching() {
        assert!(term_matches_tag("summarize", "summ"));
        assert!(term_matches_tag("summ", "summarize"));
        assert!(!term_matches_tag("sum", "summarize"));
        assert!(term_matches_tag("q1", "q1"));
    }

    #[test]
    fn test_routes_sales_summary_to_analyst() {
        let router = IntelligentRouter::new(RouterConfig::default());
        let decision = router
            .route("summarize sales for Q1", &empty_memory(), &roster())
            .unwrap();

        assert_eq!(decision.agents, vec!["Analyst"]);
        assert!(!decision.fallback);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.scores.len(), 3);
        assert_eq!(decision.scores[1].agent, "Analyst");
    }

    #[test]
    fn test_empty_registry_is_an_error() {
        let router = IntelligentRouter::new(RouterConfig::default());
        let err = router
            .route("summarize sales for Q1", &empty_memory(), &AgentRegistry::new())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NoAgentsRegistered));
    }

    #[test]
    fn test_fallback_to_default_agent() {
        let router = IntelligentRouter::new(RouterConfig {
            default_agent: Some("Writer".to_string()),
            ..RouterConfig::default()
        });
        let decision = router.route("book a flight", &empty_memory(), &roster()).unwrap();
        assert!(decision.fallback);
        assert_eq!(decision.agents, vec!["Writer"]);
        assert_eq!(decision.confidence, 0.0);

        // unset default falls back to the first registered agent
        let router = IntelligentRouter::new(RouterConfig::default());
        let decision = router.route("book a flight", &empty_memory(), &roster()).unwrap();
        assert_eq!(decision.agents, vec!["Researcher"]);
    }

    #[test]
    fn test_ties_go_to_earlier_registration() {
        let registry = AgentRegistry::builder()
            .with(agent("First", &["sales"]))
            .unwrap()
            .with(agent("Second", &["sales"]))
            .unwrap()
            .build();
        let router = IntelligentRouter::new(RouterConfig::default());
        let decision = router.route("sales", &empty_memory(), &registry).unwrap();
        assert_eq!(decision.agents, vec!["First"]);
    }

    #[test]
    fn test_seeded_tie_break_is_repeatable() {
        let registry = AgentRegistry::builder()
            .with(agent("A", &["sales"]))
            .unwrap()
            .with(agent("B", &["sales"]))
            .unwrap()
            .with(agent("C", &["sales"]))
            .unwrap()
            .build();
        let router = IntelligentRouter::new(RouterConfig {
            tie_break_seed: Some(42),
            ..RouterConfig::default()
        });

        let first = router.route("sales", &empty_memory(), &registry).unwrap();
        for _ in 0..10 {
            assert_eq!(router.route("sales", &empty_memory(), &registry).unwrap(), first);
        }
    }

    #[test]
    fn test_fan_out_lists_registration_order() {
        let registry = AgentRegistry::builder()
            .with(agent("Writer", &["report"]))
            .unwrap()
            .with(agent("Analyst", &["sales", "report"]))
            .unwrap()
            .with(agent("Researcher", &["weather"]))
            .unwrap()
            .build();
        let router = IntelligentRouter::new(RouterConfig {
            max_fanout: 3,
            fanout_margin: 0.6,
            confidence_threshold: 0.4,
            ..RouterConfig::default()
        });

        let decision = router.route("sales report", &empty_memory(), &registry).unwrap();
        assert_eq!(decision.agents, vec!["Writer", "Analyst"]);
        assert!(decision.is_fan_out());
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn test_context_blends_into_confidence() {
        let router = IntelligentRouter::new(RouterConfig::default());
        let mut memory = empty_memory();
        memory.short_term.push(Turn::user("draft a report"));

        let decision = router.route("research sources", &memory, &roster()).unwrap();
        assert_eq!(decision.agents, vec!["Researcher"]);
        // task match 1.0 weighted 0.8, no context match
        assert!((decision.confidence - 0.8).abs() < 1e-9);

        memory.degraded = true;
        let degraded = router.route("research sources", &memory, &roster()).unwrap();
        assert!(degraded.degraded_context);
        assert!((degraded.confidence - 0.9).abs() < 1e-9);
    }

    #[quickcheck]
    fn prop_routing_is_deterministic(task: String, context: String, seed: Option<u64>) -> bool {
        let router = IntelligentRouter::new(RouterConfig {
            tie_break_seed: seed,
            max_fanout: 2,
            fanout_margin: 0.1,
            ..RouterConfig::default()
        });
        let mut memory = empty_memory();
        memory.short_term.push(Turn::user(context));

        let registry = roster();
        let first = router.route(&task, &memory, &registry).unwrap();
        let second = router.route(&task, &memory, &registry).unwrap();
        first == second && !first.agents.is_empty()
    }
}

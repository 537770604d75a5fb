//! Selector (C7): turns a [`RoutingCriteria`] plus the current registry and
//! circuit-breaker state into the next model to try.
//!
//! Two-phase selection, tried in order:
//! 1. **Priority list** -- walk the caller's explicit `model` references.
//! 2. **Smart fallback** -- capability-filtered, circuit-filtered, scored,
//!    and grouped by `priority` (§4.7 mandates hard grouping, not folding
//!    priority into score).

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;

use crate::models::catalog::ModelDefinition;
use crate::models::routing::{RoutingCriteria, SelectionMode};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::health::HealthTracker;
use crate::services::registry::{CapabilityFilter, ModelRegistry};

/// The model chosen for one attempt, identified both by logical name and by
/// the qualified `provider/name` form the router uses for exclusion.
#[derive(Debug, Clone)]
pub struct Selection {
    pub definition: ModelDefinition,
}

impl Selection {
    pub fn qualified_name(&self) -> String {
        self.definition.qualified_name()
    }
}

pub struct Selector {
    registry: Arc<ModelRegistry>,
    circuit_breaker: Arc<CircuitBreaker>,
    health: Arc<HealthTracker>,
}

impl Selector {
    pub fn new(
        registry: Arc<ModelRegistry>,
        circuit_breaker: Arc<CircuitBreaker>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            registry,
            circuit_breaker,
            health,
        }
    }

    /// Picks the next candidate not present in `excluded` (keyed by
    /// `provider/name`). Returns `None` when nothing survives -- the router
    /// treats that as "no more models" and moves to fallback.
    pub async fn select_next(
        &self,
        criteria: &RoutingCriteria,
        excluded: &HashSet<String>,
    ) -> Option<Selection> {
        if let Some(selection) = self.from_priority_list(criteria, excluded).await {
            return Some(selection);
        }

        if criteria.allow_auto_fallback {
            return self.smart_fallback(criteria, excluded).await;
        }

        None
    }

    async fn from_priority_list(
        &self,
        criteria: &RoutingCriteria,
        excluded: &HashSet<String>,
    ) -> Option<Selection> {
        for reference in &criteria.priority {
            let bindings = self
                .registry
                .find_by_name_and_provider(&reference.name, reference.provider.as_deref());

            for candidate in bindings {
                let qualified = candidate.qualified_name();
                if excluded.contains(&qualified) {
                    continue;
                }
                if !candidate.available {
                    continue;
                }
                if !self.circuit_breaker.can_request(&candidate.name).await {
                    continue;
                }
                return Some(Selection { definition: candidate });
            }
        }
        None
    }

    async fn smart_fallback(
        &self,
        criteria: &RoutingCriteria,
        excluded: &HashSet<String>,
    ) -> Option<Selection> {
        let filter = CapabilityFilter {
            tags: criteria.tags.clone(),
            kind: criteria.kind,
            min_context_size: criteria.min_context_size,
            min_max_output_tokens: criteria.min_max_output_tokens,
            json_response: criteria.json_response,
            requires_image: criteria.requires_image,
            requires_video: criteria.requires_video,
            requires_audio: criteria.requires_audio,
            requires_file: criteria.requires_file,
            requires_tools: criteria.requires_tools,
        };

        let capable = self.registry.filter(&filter);
        let healthy = self.circuit_breaker.filter_available(&capable).await;

        let mut survivors = Vec::new();
        for candidate in healthy {
            let qualified = candidate.qualified_name();
            if excluded.contains(&qualified) {
                continue;
            }
            if let Some(min_rate) = criteria.min_success_rate {
                let view = self.health.view(&candidate.name).await;
                if view.success_rate < min_rate {
                    continue;
                }
            }
            survivors.push(candidate);
        }

        if survivors.is_empty() {
            return None;
        }

        // Hard grouping by priority (§4.7): selection is constrained to the
        // highest-priority non-empty group, never blended across groups.
        let top_priority = survivors.iter().map(|m| m.priority.unwrap_or(0)).max().unwrap();
        let group: Vec<ModelDefinition> = survivors
            .into_iter()
            .filter(|m| m.priority.unwrap_or(0) == top_priority)
            .collect();

        let mut scored = Vec::with_capacity(group.len());
        for candidate in &group {
            let view = self.health.view(&candidate.name).await;
            scored.push((candidate.clone(), score(candidate, &view, criteria.prefer_fast)));
        }

        let chosen = match criteria.selection_mode {
            SelectionMode::Best => pick_best(&scored),
            SelectionMode::TopNRandom => pick_top_n_random(&scored, 3),
            SelectionMode::WeightedRandom => pick_weighted_random(&scored),
        };

        chosen.map(|definition| Selection { definition })
    }
}

/// Combines base weight with a latency term (only when `prefer_fast`) into
/// one score. Reliability is handled as a hard cutoff upstream
/// (`min_success_rate`), not folded into this number.
fn score(model: &ModelDefinition, health: &crate::services::health::HealthView, prefer_fast: bool) -> f64 {
    let base = model.weight as f64;
    if !prefer_fast || health.avg_latency_ms <= 0.0 {
        return base;
    }
    // Smaller avg_latency scores higher: scale weight by a bounded inverse
    // latency term so a model with no samples yet (avg_latency == 0) isn't
    // penalized relative to ones with recorded latency.
    let latency_factor = 1000.0 / (health.avg_latency_ms + 1000.0);
    base * (1.0 + latency_factor)
}

fn pick_best(scored: &[(ModelDefinition, f64)]) -> Option<ModelDefinition> {
    scored
        .iter()
        .enumerate()
        .max_by(|(ia, (_, a)), (ib, (_, b))| {
            a.partial_cmp(b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ib.cmp(ia)) // tie -> earlier registry order wins
        })
        .map(|(_, (m, _))| m.clone())
}

fn pick_top_n_random(scored: &[(ModelDefinition, f64)], n: usize) -> Option<ModelDefinition> {
    if scored.is_empty() {
        return None;
    }
    let mut ranked: Vec<&(ModelDefinition, f64)> = scored.iter().collect();
    ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(n.max(1));
    let idx = rand::thread_rng().gen_range(0..ranked.len());
    Some(ranked[idx].0.clone())
}

fn pick_weighted_random(scored: &[(ModelDefinition, f64)]) -> Option<ModelDefinition> {
    let total: f64 = scored.iter().map(|(_, s)| s.max(0.0)).sum();
    if total <= 0.0 {
        return scored.first().map(|(m, _)| m.clone());
    }
    let mut roll = rand::thread_rng().gen_range(0.0..total);
    for (model, s) in scored {
        let s = s.max(0.0);
        if roll < s {
            return Some(model.clone());
        }
        roll -= s;
    }
    scored.last().map(|(m, _)| m.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::routing::{parse_priority_list, ModelReference};
    use crate::services::store::InMemoryStateStore;
    use std::collections::BTreeSet;

    fn model(name: &str, provider: &str, weight: u32, priority: Option<i32>) -> ModelDefinition {
        ModelDefinition {
            name: name.into(),
            provider: provider.into(),
            model: format!("{}-upstream", name),
            kind: crate::models::catalog::ModelKind::Fast,
            context_size: 8192,
            max_output_tokens: 2048,
            tags: BTreeSet::new(),
            json_response: false,
            supports_image: false,
            supports_video: false,
            supports_audio: false,
            supports_file: false,
            supports_tools: false,
            available: true,
            weight,
            priority,
        }
    }

    fn setup(models: Vec<ModelDefinition>) -> Selector {
        let registry = ModelRegistry::new(models).unwrap();
        let store = InMemoryStateStore::new();
        let cb = Arc::new(CircuitBreaker::new(store.clone(), Default::default()));
        let health = Arc::new(HealthTracker::new(store));
        Selector::new(registry, cb, health)
    }

    #[tokio::test]
    async fn priority_list_returns_first_survivor() {
        let selector = setup(vec![model("a", "groq", 1, None), model("b", "groq", 1, None)]);
        let criteria = RoutingCriteria {
            priority: vec![ModelReference { name: "b".into(), provider: None }],
            allow_auto_fallback: false,
            ..Default::default()
        };
        let selection = selector.select_next(&criteria, &HashSet::new()).await.unwrap();
        assert_eq!(selection.definition.name, "b");
    }

    #[tokio::test]
    async fn excluded_qualified_name_is_skipped() {
        let selector = setup(vec![model("a", "groq", 1, None)]);
        let criteria = RoutingCriteria {
            priority: vec![ModelReference { name: "a".into(), provider: None }],
            allow_auto_fallback: false,
            ..Default::default()
        };
        let mut excluded = HashSet::new();
        excluded.insert("groq/a".to_string());
        assert!(selector.select_next(&criteria, &excluded).await.is_none());
    }

    #[tokio::test]
    async fn empty_priority_with_auto_falls_back_to_smart() {
        let selector = setup(vec![model("a", "groq", 10, None)]);
        let (priority, allow_auto) = parse_priority_list(&[]);
        let criteria = RoutingCriteria {
            priority,
            allow_auto_fallback: allow_auto,
            ..Default::default()
        };
        let selection = selector.select_next(&criteria, &HashSet::new()).await.unwrap();
        assert_eq!(selection.definition.name, "a");
    }

    #[tokio::test]
    async fn smart_selection_never_crosses_priority_groups() {
        let selector = setup(vec![
            model("low", "groq", 100, Some(1)),
            model("high", "groq", 1, Some(5)),
        ]);
        let criteria = RoutingCriteria {
            allow_auto_fallback: true,
            selection_mode: SelectionMode::Best,
            ..Default::default()
        };
        let selection = selector.select_next(&criteria, &HashSet::new()).await.unwrap();
        assert_eq!(selection.definition.name, "high");
    }

    #[tokio::test]
    async fn min_success_rate_drops_unreliable_candidates() {
        let selector = setup(vec![model("a", "groq", 1, None), model("b", "groq", 1, None)]);
        // Force "a" below the bar.
        for _ in 0..5 {
            selector
                .circuit_breaker
                .on_failure(
                    "a",
                    &crate::models::error::ClassifiedError::other("x"),
                )
                .await;
        }
        // a's circuit is now open after 3 failures -> excluded by health filter already,
        // but min_success_rate should also exclude it independent of circuit state.
        let criteria = RoutingCriteria {
            allow_auto_fallback: true,
            min_success_rate: Some(0.9),
            selection_mode: SelectionMode::Best,
            ..Default::default()
        };
        let selection = selector.select_next(&criteria, &HashSet::new()).await.unwrap();
        assert_eq!(selection.definition.name, "b");
    }

    #[tokio::test]
    async fn no_survivors_returns_none() {
        let selector = setup(vec![]);
        let criteria = RoutingCriteria {
            allow_auto_fallback: true,
            ..Default::default()
        };
        assert!(selector.select_next(&criteria, &HashSet::new()).await.is_none());
    }
}

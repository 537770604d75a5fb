//! Request-facing routing types: the parsed priority list, capability
//! filters, selection knobs, and the `_router` metadata attached to every
//! response.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::catalog::ModelKind;

/// One entry of a parsed `model` priority list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReference {
    pub name: String,
    pub provider: Option<String>,
}

impl ModelReference {
    pub fn matches_qualified(&self, qualified: &str) -> bool {
        match &self.provider {
            Some(provider) => qualified == format!("{}/{}", provider, self.name),
            None => qualified.ends_with(&format!("/{}", self.name)),
        }
    }
}

/// How a selection is made among the survivors of a priority group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    WeightedRandom,
    Best,
    TopNRandom,
}

/// Parses the raw `model` field of a chat-completions request (a string, an
/// array of strings, or absent) into an ordered priority list plus whether
/// Smart fallback (`auto`) is in play.
///
/// `auto` appearing anywhere enables fallback; once `auto` is seen, any
/// entries after it are ignored (they would never be reached).
pub fn parse_priority_list(raw: &[String]) -> (Vec<ModelReference>, bool) {
    let mut refs = Vec::new();
    let mut allow_auto = raw.is_empty();

    for token in raw {
        if token == "auto" {
            allow_auto = true;
            break;
        }
        refs.push(parse_model_reference(token));
    }

    (refs, allow_auto)
}

fn parse_model_reference(token: &str) -> ModelReference {
    match token.split_once('/') {
        Some((provider, name)) => ModelReference {
            name: name.to_string(),
            provider: Some(provider.to_string()),
        },
        None => ModelReference {
            name: token.to_string(),
            provider: None,
        },
    }
}

/// Capability filters + selection knobs derived from one incoming request.
#[derive(Debug, Clone, Default)]
pub struct RoutingCriteria {
    pub priority: Vec<ModelReference>,
    pub allow_auto_fallback: bool,

    pub tags: Vec<String>,
    pub kind: Option<ModelKind>,
    pub min_context_size: Option<u32>,
    pub min_max_output_tokens: Option<u32>,
    pub json_response: bool,
    pub prefer_fast: bool,
    pub min_success_rate: Option<f64>,
    pub selection_mode: SelectionMode,

    pub requires_image: bool,
    pub requires_video: bool,
    pub requires_audio: bool,
    pub requires_file: bool,
    pub requires_tools: bool,
}

/// One failed attempt, recorded for the `_router.errors` chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptError {
    pub provider: String,
    pub model: String,
    pub error: String,
    pub code: Option<String>,
}

/// Routing metadata attached to every response, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingOutcome {
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub attempts: u32,
    pub fallback_used: bool,
    #[serde(default)]
    pub errors: Vec<AttemptError>,
}

/// Parses the DNF tag-filter grammar: each string in `clauses` is one AND
/// clause (`&` joins required tags); `|` within a single tag token expresses
/// alternatives that satisfy that slot. Clauses are OR-ed together, so a
/// candidate matches if any clause is fully satisfied.
pub fn tags_match(clauses: &[String], candidate_tags: &BTreeSet<String>) -> bool {
    if clauses.is_empty() {
        return true;
    }
    clauses.iter().any(|clause| clause_matches(clause, candidate_tags))
}

fn clause_matches(clause: &str, candidate_tags: &BTreeSet<String>) -> bool {
    clause
        .split('&')
        .map(str::trim)
        .filter(|slot| !slot.is_empty())
        .all(|slot| slot_matches(slot, candidate_tags))
}

fn slot_matches(slot: &str, candidate_tags: &BTreeSet<String>) -> bool {
    slot.split('|')
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .any(|alt| candidate_tags.contains(alt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_list_parses_bare_and_qualified_names() {
        let raw = vec!["fast-a".to_string(), "groq/fast-b".to_string()];
        let (refs, allow_auto) = parse_priority_list(&raw);
        assert!(!allow_auto);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].provider, None);
        assert_eq!(refs[1].provider.as_deref(), Some("groq"));
    }

    #[test]
    fn auto_anywhere_enables_fallback_and_truncates() {
        let raw = vec!["fast-a".to_string(), "auto".to_string(), "fast-b".to_string()];
        let (refs, allow_auto) = parse_priority_list(&raw);
        assert!(allow_auto);
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn empty_list_enables_fallback_with_no_priority() {
        let (refs, allow_auto) = parse_priority_list(&[]);
        assert!(allow_auto);
        assert!(refs.is_empty());
    }

    #[test]
    fn tag_dnf_and_within_clause() {
        let mut tags = BTreeSet::new();
        tags.insert("cheap".to_string());
        tags.insert("fast".to_string());
        assert!(tags_match(&["cheap&fast".to_string()], &tags));
        assert!(!tags_match(&["cheap&vision".to_string()], &tags));
    }

    #[test]
    fn tag_dnf_or_within_slot() {
        let mut tags = BTreeSet::new();
        tags.insert("vision".to_string());
        assert!(tags_match(&["image|vision".to_string()], &tags));
    }

    #[test]
    fn tag_dnf_or_across_clauses() {
        let mut tags = BTreeSet::new();
        tags.insert("reasoning".to_string());
        assert!(tags_match(
            &["cheap&fast".to_string(), "reasoning".to_string()],
            &tags
        ));
    }
}

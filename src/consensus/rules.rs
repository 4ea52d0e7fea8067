//! The merge-rule implementations spec §4.2/§6 name (spec §9 "a
//! table-driven consensus-merge function per parameter").
//!
//! Every rule is a pure function over a slice of proposed
//! `serde_json::Value`s, one per model that proposed a value for that
//! parameter this round. `semantic_similarity` is the one rule that
//! would, in a full deployment, call out to an embeddings provider —
//! that provider is out of scope (spec §1's adapter exclusions only name
//! LLM/web/shell/MCP/image adapters, but an embeddings backend is the
//! same category of external collaborator), so this module supplies a
//! small deterministic bag-of-words cosine stand-in documented in
//! DESIGN.md, good enough to make the medoid selection and the
//! threshold check exercise real code paths.

use crate::consensus::schema::ConsensusRule;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Agreed(Value),
    Disagreement,
}

/// A deterministic, dependency-free stand-in for a real sentence
/// embedding: a bag-of-words frequency vector over a fixed 64-dimensional
/// hash space. Identical or near-identical phrasing lands on a high
/// cosine similarity; unrelated text does not. Good enough to exercise
/// the `semantic_similarity`/medoid logic without a network call.
const EMBED_DIM: usize = 64;

fn embed(text: &str) -> [f32; EMBED_DIM] {
    let mut v = [0f32; EMBED_DIM];
    for word in text.to_lowercase().split_whitespace() {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        word.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % EMBED_DIM;
        v[bucket] += 1.0;
    }
    v
}

fn cosine(a: &[f32; EMBED_DIM], b: &[f32; EMBED_DIM]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return if norm_a == norm_b { 1.0 } else { 0.0 };
    }
    dot / (norm_a * norm_b)
}

fn as_str(v: &Value) -> Option<&str> {
    v.as_str()
}

fn exact_match(values: &[Value]) -> MergeOutcome {
    match values.split_first() {
        None => MergeOutcome::Disagreement,
        Some((first, rest)) => {
            if rest.iter().all(|v| v == first) {
                MergeOutcome::Agreed(first.clone())
            } else {
                MergeOutcome::Disagreement
            }
        }
    }
}

/// Pick the most common value; ties broken by a stable deterministic
/// order (the canonical JSON string representation) since, unlike the
/// action-kind vote, a parameter's candidate values carry no priority
/// table of their own (spec §4.2 "ties broken by action priority order,
/// then arbitrary deterministic order" — the arbitrary order here).
fn mode_selection(values: &[Value]) -> MergeOutcome {
    if values.is_empty() {
        return MergeOutcome::Disagreement;
    }
    let mut counts: HashMap<String, (Value, usize)> = HashMap::new();
    for v in values {
        let key = v.to_string();
        let entry = counts.entry(key).or_insert_with(|| (v.clone(), 0));
        entry.1 += 1;
    }
    let max_count = counts.values().map(|(_, c)| *c).max().unwrap_or(0);
    let mut winners: Vec<&(Value, usize)> = counts.values().filter(|(_, c)| *c == max_count).collect();
    winners.sort_by_key(|(v, _)| v.to_string());
    MergeOutcome::Agreed(winners[0].0.clone())
}

fn semantic_similarity(values: &[Value], tau: f32) -> MergeOutcome {
    let texts: Vec<&str> = match values.iter().map(as_str).collect::<Option<Vec<_>>>() {
        Some(t) => t,
        None => return MergeOutcome::Disagreement,
    };
    if texts.is_empty() {
        return MergeOutcome::Disagreement;
    }
    if texts.len() == 1 {
        return MergeOutcome::Agreed(Value::String(texts[0].to_string()));
    }
    let embeddings: Vec<[f32; EMBED_DIM]> = texts.iter().map(|t| embed(t)).collect();
    for i in 0..embeddings.len() {
        for j in (i + 1)..embeddings.len() {
            if cosine(&embeddings[i], &embeddings[j]) < tau {
                return MergeOutcome::Disagreement;
            }
        }
    }
    // medoid: the text with the highest summed similarity to all others.
    let mut best_idx = 0;
    let mut best_score = f32::MIN;
    for i in 0..embeddings.len() {
        let score: f32 = (0..embeddings.len())
            .filter(|&j| j != i)
            .map(|j| cosine(&embeddings[i], &embeddings[j]))
            .sum();
        if score > best_score {
            best_score = score;
            best_idx = i;
        }
    }
    MergeOutcome::Agreed(Value::String(texts[best_idx].to_string()))
}

fn percentile(values: &[Value], p: f32) -> MergeOutcome {
    let mut nums: Vec<f64> = match values.iter().map(|v| v.as_f64()).collect::<Option<Vec<_>>>() {
        Some(n) => n,
        None => return MergeOutcome::Disagreement,
    };
    if nums.is_empty() {
        return MergeOutcome::Disagreement;
    }
    nums.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = ((p.clamp(0.0, 1.0) as f64) * (nums.len() - 1) as f64).round() as usize;
    MergeOutcome::Agreed(serde_json::json!(nums[rank]))
}

fn union_merge(values: &[Value]) -> MergeOutcome {
    let mut out: Vec<Value> = Vec::new();
    for v in values {
        let items = match v.as_array() {
            Some(a) => a.clone(),
            None => return MergeOutcome::Disagreement,
        };
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
    }
    MergeOutcome::Agreed(Value::Array(out))
}

/// Deep-merges JSON values: objects merge key-wise (recursing on shared
/// keys), arrays concatenate with de-duplication, scalars fall back to
/// [`first_non_nil`] semantics when proposals disagree.
fn structural_merge(values: &[Value]) -> MergeOutcome {
    match values.split_first() {
        None => MergeOutcome::Disagreement,
        Some((first, rest)) => {
            let mut acc = first.clone();
            for v in rest {
                acc = structural_merge_pair(&acc, v);
            }
            MergeOutcome::Agreed(acc)
        }
    }
}

fn structural_merge_pair(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => {
            let mut merged = a_map.clone();
            for (k, v) in b_map {
                merged
                    .entry(k.clone())
                    .and_modify(|existing| *existing = structural_merge_pair(existing, v))
                    .or_insert_with(|| v.clone());
            }
            Value::Object(merged)
        }
        (Value::Array(a_items), Value::Array(b_items)) => {
            let mut merged = a_items.clone();
            for item in b_items {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        (Value::Null, other) | (other, Value::Null) => other.clone(),
        (a, _) => a.clone(),
    }
}

/// Merges JSON objects key-wise; a conflicting key (same key, different
/// value across proposals) keeps the first proposal's value — real
/// per-key reconciliation would recurse into this same rule table, which
/// this crate does not model further (noted in DESIGN.md).
fn merge_maps(values: &[Value]) -> MergeOutcome {
    let mut merged = serde_json::Map::new();
    for v in values {
        let obj = match v.as_object() {
            Some(o) => o,
            None => return MergeOutcome::Disagreement,
        };
        for (k, val) in obj {
            merged.entry(k.clone()).or_insert_with(|| val.clone());
        }
    }
    MergeOutcome::Agreed(Value::Object(merged))
}

fn first_non_nil(values: &[Value]) -> MergeOutcome {
    for v in values {
        if !v.is_null() {
            return MergeOutcome::Agreed(v.clone());
        }
    }
    MergeOutcome::Agreed(Value::Null)
}

/// Every proposal must be an array of the same length; each position is
/// then reconciled with `exact_match` (spec §4.3 batch_sync: sequential,
/// order-sensitive execution, so positions must agree on which sub-
/// action runs there).
fn batch_sequence_merge(values: &[Value]) -> MergeOutcome {
    let arrays: Vec<&Vec<Value>> = match values.iter().map(|v| v.as_array()).collect::<Option<Vec<_>>>() {
        Some(a) => a,
        None => return MergeOutcome::Disagreement,
    };
    if arrays.is_empty() {
        return MergeOutcome::Disagreement;
    }
    let len = arrays[0].len();
    if len < 2 || !arrays.iter().all(|a| a.len() == len) {
        return MergeOutcome::Disagreement;
    }
    let mut merged = Vec::with_capacity(len);
    for i in 0..len {
        let column: Vec<Value> = arrays.iter().map(|a| a[i].clone()).collect();
        match exact_match(&column) {
            MergeOutcome::Agreed(v) => merged.push(v),
            MergeOutcome::Disagreement => return MergeOutcome::Disagreement,
        }
    }
    MergeOutcome::Agreed(Value::Array(merged))
}

/// Dispatch to the rule's implementation. Called once per parameter per
/// round by [`crate::consensus::engine`].
pub fn merge(rule: ConsensusRule, values: &[Value]) -> MergeOutcome {
    match rule {
        ConsensusRule::ExactMatch => exact_match(values),
        ConsensusRule::ModeSelection => mode_selection(values),
        ConsensusRule::SemanticSimilarity(_) => semantic_similarity(values, rule.tau()),
        ConsensusRule::Percentile(_) => percentile(values, rule.p()),
        ConsensusRule::UnionMerge => union_merge(values),
        ConsensusRule::StructuralMerge => structural_merge(values),
        ConsensusRule::MergeMaps => merge_maps(values),
        ConsensusRule::FirstNonNil => first_non_nil(values),
        ConsensusRule::BatchSequenceMerge => batch_sequence_merge(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_match_agrees_on_identical_values() {
        let values = vec![json!("parallel"), json!("parallel"), json!("parallel")];
        assert_eq!(merge(ConsensusRule::ExactMatch, &values), MergeOutcome::Agreed(json!("parallel")));
    }

    #[test]
    fn exact_match_disagrees_on_mismatch() {
        let values = vec![json!("parallel"), json!("parallel"), json!("sequential")];
        assert_eq!(merge(ConsensusRule::ExactMatch, &values), MergeOutcome::Disagreement);
    }

    #[test]
    fn mode_selection_picks_majority() {
        let values = vec![json!("a"), json!("b"), json!("a")];
        assert_eq!(merge(ConsensusRule::ModeSelection, &values), MergeOutcome::Agreed(json!("a")));
    }

    #[test]
    fn semantic_similarity_agrees_on_near_identical_phrasing() {
        let values = vec![
            json!("please notify the parent agent now"),
            json!("notify the parent agent now please"),
            json!("notify parent agent now please"),
        ];
        let rule = ConsensusRule::semantic_similarity(0.85);
        match merge(rule, &values) {
            MergeOutcome::Agreed(Value::String(_)) => {}
            other => panic!("expected agreement, got {other:?}"),
        }
    }

    #[test]
    fn semantic_similarity_disagrees_on_unrelated_text() {
        let values = vec![json!("deploy the build to staging"), json!("order two pizzas for the team")];
        assert_eq!(merge(ConsensusRule::semantic_similarity(0.85), &values), MergeOutcome::Disagreement);
    }

    #[test]
    fn percentile_picks_nearest_rank() {
        let values = vec![json!(10.0), json!(20.0), json!(30.0)];
        assert_eq!(merge(ConsensusRule::percentile(0.5), &values), MergeOutcome::Agreed(json!(20.0)));
    }

    #[test]
    fn union_merge_dedupes_preserving_order() {
        let values = vec![json!(["a", "b"]), json!(["b", "c"])];
        assert_eq!(merge(ConsensusRule::UnionMerge, &values), MergeOutcome::Agreed(json!(["a", "b", "c"])));
    }

    #[test]
    fn batch_sequence_merge_requires_equal_length() {
        let values = vec![json!([{"a":1},{"b":2}]), json!([{"a":1}])];
        assert_eq!(merge(ConsensusRule::BatchSequenceMerge, &values), MergeOutcome::Disagreement);
    }

    #[test]
    fn structural_merge_merges_nested_objects() {
        let values = vec![json!({"a": {"x": 1}}), json!({"a": {"y": 2}})];
        assert_eq!(
            merge(ConsensusRule::StructuralMerge, &values),
            MergeOutcome::Agreed(json!({"a": {"x": 1, "y": 2}}))
        );
    }
}

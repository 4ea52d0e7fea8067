//! Static, table-driven action parameter schemas (spec §6.1, §9 "Keep
//! parameter schemas as static data and build a single 'compile' pass to
//! validate them at startup").
//!
//! Every [`ActionKind`] declares its `required_params`/`optional_params`/
//! `xor_params`, each parameter's [`ParamType`] and human description,
//! and the [`ConsensusRule`] the engine applies to reconcile that
//! parameter across proposals (spec §4.2 "Merge rule per parameter").
//! [`validate_registry`] is the "compile pass": it panics at startup (not
//! at some later dispatch call) if a schema is internally inconsistent.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::action::ActionKind;

/// One parameter's declared type (spec §6.1: `string | integer | number
/// | boolean | map | any | {list, T} | {enum, [v,…]} | {union, [T,…]} |
/// {map, shape}`).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Map,
    Any,
    List(Box<ParamType>),
    Enum(Vec<String>),
    Union(Vec<ParamType>),
}

/// Spec §4.2's merge-rule catalogue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsensusRule {
    ExactMatch,
    ModeSelection,
    SemanticSimilarity(u32), // τ × 100, kept as an integer so the type stays Eq
    Percentile(u32),         // p × 100
    UnionMerge,
    StructuralMerge,
    MergeMaps,
    FirstNonNil,
    BatchSequenceMerge,
}

impl ConsensusRule {
    pub fn semantic_similarity(tau: f32) -> Self {
        ConsensusRule::SemanticSimilarity((tau * 100.0).round() as u32)
    }

    pub fn percentile(p: f32) -> Self {
        ConsensusRule::Percentile((p * 100.0).round() as u32)
    }

    pub fn tau(self) -> f32 {
        match self {
            ConsensusRule::SemanticSimilarity(t) => t as f32 / 100.0,
            _ => 0.0,
        }
    }

    pub fn p(self) -> f32 {
        match self {
            ConsensusRule::Percentile(p) => p as f32 / 100.0,
            _ => 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionSchema {
    pub required_params: Vec<&'static str>,
    pub optional_params: Vec<&'static str>,
    /// Groups of parameter names where exactly one group's keys may be
    /// present (spec §6.1 `xor_params`).
    pub xor_params: Vec<Vec<&'static str>>,
    pub param_types: HashMap<&'static str, ParamType>,
    pub param_descriptions: HashMap<&'static str, &'static str>,
    pub consensus_rules: HashMap<&'static str, ConsensusRule>,
}

impl ActionSchema {
    /// Every parameter name this schema mentions anywhere (required,
    /// optional, or inside an xor group), deduplicated.
    pub fn all_param_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.required_params.clone();
        names.extend(self.optional_params.iter().copied());
        for group in &self.xor_params {
            names.extend(group.iter().copied());
        }
        names.sort_unstable();
        names.dedup();
        names
    }
}

fn schema(
    required: &[&'static str],
    optional: &[&'static str],
    xor: &[&[&'static str]],
    types: &[(&'static str, ParamType)],
    descriptions: &[(&'static str, &'static str)],
    rules: &[(&'static str, ConsensusRule)],
) -> ActionSchema {
    ActionSchema {
        required_params: required.to_vec(),
        optional_params: optional.to_vec(),
        xor_params: xor.iter().map(|g| g.to_vec()).collect(),
        param_types: types.iter().cloned().collect(),
        param_descriptions: descriptions.iter().cloned().collect(),
        consensus_rules: rules.iter().cloned().collect(),
    }
}

fn build_registry() -> HashMap<ActionKind, ActionSchema> {
    use ActionKind::*;
    use ConsensusRule as R;
    use ParamType as T;

    let mut map = HashMap::new();

    map.insert(
        Orient,
        schema(
            &[],
            &["summary"],
            &[],
            &[("summary", T::String)],
            &[("summary", "a short situational summary")],
            &[("summary", R::ModeSelection)],
        ),
    );
    map.insert(
        Wait,
        schema(
            &["wait"],
            &[],
            &[],
            &[("wait", T::Union(vec![T::Boolean, T::Integer]))],
            &[("wait", "true = indefinite, false/0 = immediate, N = seconds")],
            &[("wait", R::FirstNonNil)],
        ),
    );
    map.insert(
        SendMessage,
        schema(
            &["to", "content"],
            &[],
            &[],
            &[
                ("to", T::Union(vec![T::Enum(vec!["parent".into(), "children".into(), "announcement".into()]), T::List(Box::new(T::String))])),
                ("content", T::String),
            ],
            &[
                ("to", "recipient selector"),
                ("content", "message body"),
            ],
            &[("to", R::ModeSelection), ("content", R::semantic_similarity(0.85))],
        ),
    );
    map.insert(
        BatchSync,
        schema(
            &["actions"],
            &[],
            &[],
            &[("actions", T::List(Box::new(T::Map)))],
            &[("actions", "sub-actions executed sequentially, stop on first error")],
            &[("actions", R::BatchSequenceMerge)],
        ),
    );
    map.insert(
        BatchAsync,
        schema(
            &["actions"],
            &[],
            &[],
            &[("actions", T::List(Box::new(T::Map)))],
            &[("actions", "sub-actions executed concurrently")],
            &[("actions", R::BatchSequenceMerge)],
        ),
    );
    map.insert(
        FetchWeb,
        schema(
            &["url"],
            &["method", "headers", "body"],
            &[],
            &[
                ("url", T::String),
                ("method", T::String),
                ("headers", T::Map),
                ("body", T::Any),
            ],
            &[("url", "target URL")],
            &[
                ("url", R::ExactMatch),
                ("method", R::ModeSelection),
                ("headers", R::MergeMaps),
                ("body", R::FirstNonNil),
            ],
        ),
    );
    map.insert(
        FileRead,
        schema(
            &["path"],
            &[],
            &[],
            &[("path", T::String)],
            &[("path", "filesystem path to read")],
            &[("path", R::ExactMatch)],
        ),
    );
    map.insert(
        SearchSecrets,
        schema(
            &["query"],
            &[],
            &[],
            &[("query", T::String)],
            &[("query", "secret name search term")],
            &[("query", R::ModeSelection)],
        ),
    );
    map.insert(
        LearnSkills,
        schema(
            &["skill_names"],
            &[],
            &[],
            &[("skill_names", T::List(Box::new(T::String)))],
            &[("skill_names", "skills to load")],
            &[("skill_names", R::UnionMerge)],
        ),
    );
    map.insert(
        AnswerEngine,
        schema(
            &["query"],
            &["engine"],
            &[],
            &[("query", T::String), ("engine", T::String)],
            &[("query", "question to answer")],
            &[("query", R::semantic_similarity(0.85)), ("engine", R::ModeSelection)],
        ),
    );
    map.insert(
        Todo,
        schema(
            &["items"],
            &[],
            &[],
            &[("items", T::List(Box::new(T::Map)))],
            &[("items", "todo list replacement")],
            &[("items", R::StructuralMerge)],
        ),
    );
    map.insert(
        AdjustBudget,
        schema(
            &["child_id", "new_budget"],
            &[],
            &[],
            &[("child_id", T::String), ("new_budget", T::Number)],
            &[("child_id", "direct child to adjust"), ("new_budget", "new allocation ceiling")],
            &[("child_id", R::ExactMatch), ("new_budget", R::percentile(0.5))],
        ),
    );
    map.insert(
        GenerateSecret,
        schema(
            &["name"],
            &["length"],
            &[],
            &[("name", T::String), ("length", T::Integer)],
            &[("name", "secret name to generate")],
            &[("name", R::ExactMatch), ("length", R::percentile(0.5))],
        ),
    );
    map.insert(
        GenerateImages,
        schema(
            &["prompt"],
            &["count"],
            &[],
            &[("prompt", T::String), ("count", T::Integer)],
            &[("prompt", "image generation prompt")],
            &[("prompt", R::semantic_similarity(0.85)), ("count", R::percentile(0.5))],
        ),
    );
    map.insert(
        RecordCost,
        schema(
            &["amount", "cost_type"],
            &[],
            &[],
            &[("amount", T::Number), ("cost_type", T::String)],
            &[("amount", "dollar amount"), ("cost_type", "cost category")],
            &[("amount", R::percentile(0.5)), ("cost_type", R::ModeSelection)],
        ),
    );
    map.insert(
        CallMcp,
        schema(
            &["server", "method"],
            &["params"],
            &[],
            &[("server", T::String), ("method", T::String), ("params", T::Map)],
            &[("server", "MCP server id"), ("method", "RPC method name")],
            &[("server", R::ExactMatch), ("method", R::ExactMatch), ("params", R::MergeMaps)],
        ),
    );
    map.insert(
        CallApi,
        schema(
            &["url", "method"],
            &["headers", "body"],
            &[],
            &[
                ("url", T::String),
                ("method", T::String),
                ("headers", T::Map),
                ("body", T::Any),
            ],
            &[("url", "target URL"), ("method", "HTTP method")],
            &[
                ("url", R::ExactMatch),
                ("method", R::ExactMatch),
                ("headers", R::MergeMaps),
                ("body", R::FirstNonNil),
            ],
        ),
    );
    map.insert(
        ExecuteShell,
        schema(
            &[],
            &["terminate"],
            &[&["command"], &["check_id"]],
            &[
                ("command", T::String),
                ("check_id", T::String),
                ("terminate", T::Boolean),
            ],
            &[("command", "new command to start"), ("check_id", "existing command handle")],
            &[
                ("command", R::ModeSelection),
                ("check_id", R::ExactMatch),
                ("terminate", R::FirstNonNil),
            ],
        ),
    );
    map.insert(
        FileWrite,
        schema(
            &["path", "content"],
            &[],
            &[],
            &[("path", T::String), ("content", T::String)],
            &[("path", "filesystem path to write"), ("content", "file content")],
            &[("path", R::ExactMatch), ("content", R::semantic_similarity(0.85))],
        ),
    );
    map.insert(
        DismissChild,
        schema(
            &["child_id"],
            &[],
            &[],
            &[("child_id", T::String)],
            &[("child_id", "direct child to terminate")],
            &[("child_id", R::ExactMatch)],
        ),
    );
    map.insert(
        CreateSkill,
        schema(
            &["name", "content"],
            &[],
            &[],
            &[("name", T::String), ("content", T::String)],
            &[("name", "skill name"), ("content", "skill body")],
            &[("name", R::ExactMatch), ("content", R::StructuralMerge)],
        ),
    );
    map.insert(
        SpawnChild,
        schema(
            &["profile"],
            &["budget", "initial_message"],
            &[],
            &[
                ("profile", T::String),
                ("budget", T::Number),
                ("initial_message", T::String),
            ],
            &[("profile", "child agent profile"), ("budget", "allocation for the child")],
            &[
                ("profile", R::ExactMatch),
                ("budget", R::percentile(0.5)),
                ("initial_message", R::semantic_similarity(0.85)),
            ],
        ),
    );

    map
}

static REGISTRY: OnceLock<HashMap<ActionKind, ActionSchema>> = OnceLock::new();

pub fn registry() -> &'static HashMap<ActionKind, ActionSchema> {
    REGISTRY.get_or_init(build_registry)
}

pub fn schema_for(kind: ActionKind) -> &'static ActionSchema {
    registry()
        .get(&kind)
        .expect("every ActionKind has a registered schema; see validate_registry")
}

/// The startup "compile pass" spec §9 calls for: every required/optional/
/// xor-group parameter must have a type and a consensus rule, and the
/// required/optional/xor-group name sets must be pairwise disjoint.
pub fn validate_registry() -> Result<(), String> {
    use crate::action::ActionKind as AK;
    let all_kinds = [
        AK::Orient, AK::Wait, AK::SendMessage, AK::BatchSync, AK::BatchAsync, AK::FetchWeb,
        AK::FileRead, AK::SearchSecrets, AK::LearnSkills, AK::AnswerEngine, AK::Todo,
        AK::AdjustBudget, AK::GenerateSecret, AK::GenerateImages, AK::RecordCost, AK::CallMcp,
        AK::CallApi, AK::ExecuteShell, AK::FileWrite, AK::DismissChild, AK::CreateSkill,
        AK::SpawnChild,
    ];
    let registry = registry();
    for kind in all_kinds {
        let schema = registry
            .get(&kind)
            .ok_or_else(|| format!("missing schema for {kind:?}"))?;

        let mut seen = std::collections::HashSet::new();
        for name in schema.required_params.iter().chain(schema.optional_params.iter()) {
            if !seen.insert(*name) {
                return Err(format!("{kind:?}: parameter {name} listed more than once"));
            }
        }
        for group in &schema.xor_params {
            for name in group {
                if schema.required_params.contains(name) || schema.optional_params.contains(name) {
                    return Err(format!(
                        "{kind:?}: xor parameter {name} also listed as required/optional"
                    ));
                }
            }
        }
        for name in schema.all_param_names() {
            if !schema.param_types.contains_key(name) {
                return Err(format!("{kind:?}: parameter {name} has no declared type"));
            }
            if !schema.consensus_rules.contains_key(name) {
                return Err(format!("{kind:?}: parameter {name} has no consensus rule"));
            }
        }
    }
    Ok(())
}

// src/workflow/registry.rs
//! Static phase-graph registry.
//!
//! Each workflow type maps to a declarative table of phase specs (name,
//! dependency set, barrier flag) interpreted by the engine's topological
//! scheduler. Graphs are validated once at registry construction; a cyclic
//! or malformed table is a configuration error and must never surface as a
//! runtime failure for an end user.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::EngineError;
use crate::workflow::types::WorkflowType;

/// One phase declaration. `depends_on` lists upstream phase names that must
/// have terminated (Completed or Failed) before this phase starts; empty
/// means it can start immediately. A barrier marks an explicit fan-in point
/// and must declare at least two dependencies.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSpec {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub barrier: bool,
}

impl PhaseSpec {
    const fn seq(name: &'static str, depends_on: &'static [&'static str]) -> Self {
        Self {
            name,
            depends_on,
            barrier: false,
        }
    }

    const fn barrier(name: &'static str, depends_on: &'static [&'static str]) -> Self {
        Self {
            name,
            depends_on,
            barrier: true,
        }
    }
}

/// Full content pipeline: sequential research/scripting spine, then voice
/// generation forks off while prompts feed image generation and b-roll
/// search, with asset gathering as the fan-in barrier over all three.
const FULL_PIPELINE: &[PhaseSpec] = &[
    PhaseSpec::seq("search", &[]),
    PhaseSpec::seq("crawl", &["search"]),
    PhaseSpec::seq("store_article", &["crawl"]),
    PhaseSpec::seq("generate_script", &["store_article"]),
    PhaseSpec::seq("store_script", &["generate_script"]),
    PhaseSpec::seq("prompt_generation", &["store_script"]),
    PhaseSpec::seq("voice_generation", &["store_script"]),
    PhaseSpec::seq("image_generation", &["prompt_generation"]),
    PhaseSpec::seq("broll_search", &["prompt_generation"]),
    PhaseSpec::barrier(
        "asset_gathering",
        &["image_generation", "voice_generation", "broll_search"],
    ),
    PhaseSpec::seq("publish", &["asset_gathering"]),
    PhaseSpec::seq("finalize", &["publish"]),
];

const QUICK_GENERATE: &[PhaseSpec] = &[
    PhaseSpec::seq("search", &[]),
    PhaseSpec::seq("generate_script", &["search"]),
];

const SEARCH_AND_SCRIPT: &[PhaseSpec] = &[
    PhaseSpec::seq("search", &[]),
    PhaseSpec::seq("generate_script", &["search"]),
    PhaseSpec::seq("store_script", &["generate_script"]),
];

const ARTICLE_TO_SCRIPT: &[PhaseSpec] = &[
    PhaseSpec::seq("crawl", &[]),
    PhaseSpec::seq("generate_script", &["crawl"]),
    PhaseSpec::seq("store_script", &["generate_script"]),
];

/// Read-only mapping from workflow type to its phase graph. Constructed once
/// at startup; construction validates every built-in graph.
pub struct PhaseRegistry {
    graphs: HashMap<WorkflowType, &'static [PhaseSpec]>,
}

impl PhaseRegistry {
    pub fn new() -> Result<Self, EngineError> {
        let graphs: HashMap<WorkflowType, &'static [PhaseSpec]> = [
            (WorkflowType::FullPipeline, FULL_PIPELINE),
            (WorkflowType::QuickGenerate, QUICK_GENERATE),
            (WorkflowType::SearchAndScript, SEARCH_AND_SCRIPT),
            (WorkflowType::ArticleToScript, ARTICLE_TO_SCRIPT),
        ]
        .into_iter()
        .collect();

        for (workflow_type, phases) in &graphs {
            validate_graph(phases).map_err(|e| {
                EngineError::configuration(format!(
                    "Invalid phase graph for {}: {}",
                    workflow_type.as_str(),
                    e
                ))
            })?;
        }

        Ok(Self { graphs })
    }

    pub fn phases_for(&self, workflow_type: WorkflowType) -> &'static [PhaseSpec] {
        // Every variant is registered in new(); the map lookup cannot miss.
        self.graphs[&workflow_type]
    }

    pub fn phase_names(&self, workflow_type: WorkflowType) -> Vec<&'static str> {
        self.phases_for(workflow_type)
            .iter()
            .map(|spec| spec.name)
            .collect()
    }
}

/// Validate a phase table: unique names, known dependencies, non-empty,
/// barriers with real fan-in, and no cycles (Kahn topological sort).
fn validate_graph(phases: &[PhaseSpec]) -> Result<(), String> {
    if phases.is_empty() {
        return Err("graph has no phases".to_string());
    }

    let mut names = HashSet::new();
    for spec in phases {
        if !names.insert(spec.name) {
            return Err(format!("duplicate phase name '{}'", spec.name));
        }
    }

    for spec in phases {
        for dep in spec.depends_on {
            if !names.contains(dep) {
                return Err(format!(
                    "phase '{}' depends on unknown phase '{}'",
                    spec.name, dep
                ));
            }
            if dep == &spec.name {
                return Err(format!("phase '{}' depends on itself", spec.name));
            }
        }
        if spec.barrier && spec.depends_on.len() < 2 {
            return Err(format!(
                "barrier phase '{}' declares fewer than two dependencies",
                spec.name
            ));
        }
    }

    // Kahn's algorithm: if the sort consumes every node, the graph is a DAG.
    let mut in_degree: HashMap<&str, usize> = phases
        .iter()
        .map(|spec| (spec.name, spec.depends_on.len()))
        .collect();
    let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();
    for spec in phases {
        for dep in spec.depends_on {
            downstream.entry(dep).or_default().push(spec.name);
        }
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut sorted = 0;

    while let Some(name) = ready.pop_front() {
        sorted += 1;
        for &succ in downstream.get(name).into_iter().flatten() {
            let degree = in_degree.get_mut(succ).expect("known phase");
            *degree -= 1;
            if *degree == 0 {
                ready.push_back(succ);
            }
        }
    }

    if sorted != phases.len() {
        return Err("dependency cycle detected".to_string());
    }

    Ok(())
}

impl std::fmt::Debug for PhaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseRegistry")
            .field("workflow_types", &self.graphs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_graphs_are_valid_dags() {
        let registry = PhaseRegistry::new().expect("builtin graphs must validate");
        for workflow_type in [
            WorkflowType::FullPipeline,
            WorkflowType::QuickGenerate,
            WorkflowType::SearchAndScript,
            WorkflowType::ArticleToScript,
        ] {
            let phases = registry.phases_for(workflow_type);
            assert!(!phases.is_empty());
            assert!(validate_graph(phases).is_ok());
        }
    }

    #[test]
    fn test_full_pipeline_shape() {
        let registry = PhaseRegistry::new().unwrap();
        let phases = registry.phases_for(WorkflowType::FullPipeline);
        assert_eq!(phases.len(), 12);

        let barrier = phases
            .iter()
            .find(|spec| spec.name == "asset_gathering")
            .unwrap();
        assert!(barrier.barrier);
        assert_eq!(barrier.depends_on.len(), 3);

        // voice generation forks off the script, independent of prompts
        let voice = phases
            .iter()
            .find(|spec| spec.name == "voice_generation")
            .unwrap();
        assert_eq!(voice.depends_on, &["store_script"][..]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        const CYCLIC: &[PhaseSpec] = &[
            PhaseSpec::seq("a", &["c"]),
            PhaseSpec::seq("b", &["a"]),
            PhaseSpec::seq("c", &["b"]),
        ];
        let err = validate_graph(CYCLIC).unwrap_err();
        assert!(err.contains("cycle"));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        const DANGLING: &[PhaseSpec] = &[
            PhaseSpec::seq("a", &[]),
            PhaseSpec::seq("b", &["missing"]),
        ];
        let err = validate_graph(DANGLING).unwrap_err();
        assert!(err.contains("unknown phase"));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        const DUPED: &[PhaseSpec] = &[PhaseSpec::seq("a", &[]), PhaseSpec::seq("a", &[])];
        assert!(validate_graph(DUPED).unwrap_err().contains("duplicate"));
    }
}

//! Dependency Graph Builder
//!
//! Maps Python imports back to discovered repositories:
//! - `darwin-core` is importable as `darwin_core` or `darwincore`
//! - only repositories matching an interesting prefix take part
//! - edges read "source imports target", never a self-edge
//!
//! Aliases are registered in repository-name order and the first
//! registration wins, so the result does not depend on discovery order.

use crate::types::{CodeSummary, RepositoryRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Directed import graph between repositories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeSet<String>,
    /// (source, target) pairs
    pub edges: BTreeSet<(String, String)>,
}

impl DependencyGraph {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Lower-cased import alias → canonical repository name
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn build(repositories: &[RepositoryRecord]) -> Self {
        let mut names: Vec<&str> = repositories.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();

        let mut table = Self::default();
        for name in names {
            let forms = [
                name.to_string(),
                name.replace('-', "_"),
                name.replace('-', ""),
            ];
            for form in forms {
                table
                    .aliases
                    .entry(form.to_lowercase())
                    .or_insert_with(|| name.to_string());
            }
        }
        table
    }

    pub fn resolve(&self, module: &str) -> Option<&str> {
        self.aliases.get(&module.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Whether a repository takes part in the graph
pub fn is_interesting(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Build the inter-repository import graph
pub fn build_graph(
    repositories: &[RepositoryRecord],
    summaries: &[CodeSummary],
    prefixes: &[String],
) -> DependencyGraph {
    let aliases = AliasTable::build(repositories);
    let mut graph = DependencyGraph::default();

    for summary in summaries {
        let own_name = summary.repository_name();
        let source = aliases.resolve(&own_name).unwrap_or(own_name.as_str()).to_string();
        if !is_interesting(&source, prefixes) {
            continue;
        }

        for module in &summary.imported_module_names {
            let target = match aliases.resolve(module) {
                Some(target) => target,
                None => continue,
            };
            if target == source || !is_interesting(target, prefixes) {
                continue;
            }
            graph.edges.insert((source.clone(), target.to_string()));
        }
    }

    for (source, target) in &graph.edges {
        graph.nodes.insert(source.clone());
        graph.nodes.insert(target.clone());
    }
    graph
}

/// Mermaid-safe identifier for a repository name
pub fn node_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn repo(name: &str) -> RepositoryRecord {
        RepositoryRecord {
            name: name.to_string(),
            path: PathBuf::from("/src").join(name),
            current_branch: None,
            description: None,
        }
    }

    fn summary(repo_name: &str, imports: &[&str]) -> CodeSummary {
        let mut s = CodeSummary::new(PathBuf::from("/src").join(repo_name));
        s.imported_module_names = imports.iter().map(|i| i.to_string()).collect();
        s
    }

    fn prefixes() -> Vec<String> {
        vec!["darwin-".into(), "pcs-".into(), "hyperbolic-".into()]
    }

    #[test]
    fn test_alias_forms() {
        let table = AliasTable::build(&[repo("darwin-core")]);
        assert_eq!(table.resolve("darwin_core"), Some("darwin-core"));
        assert_eq!(table.resolve("darwincore"), Some("darwin-core"));
        assert_eq!(table.resolve("Darwin-Core"), Some("darwin-core"));
        assert_eq!(table.resolve("requests"), None);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_edges_between_interesting_repos() {
        let repos = vec![repo("darwin-core"), repo("darwin-api"), repo("utils"), repo("pcs-web")];
        let summaries = vec![
            summary("darwin-api", &["darwin_core", "utils", "fastapi", "darwin_api"]),
            summary("pcs-web", &["darwinapi"]),
            summary("utils", &["darwin_core"]),
        ];
        let graph = build_graph(&repos, &summaries, &prefixes());

        let edges: Vec<_> = graph.edges.iter().cloned().collect();
        assert_eq!(
            edges,
            vec![
                ("darwin-api".to_string(), "darwin-core".to_string()),
                ("pcs-web".to_string(), "darwin-api".to_string()),
            ]
        );
        assert_eq!(graph.nodes.len(), 3);
        assert!(!graph.nodes.contains("utils"));
    }

    #[test]
    fn test_no_self_edges_and_idempotent() {
        let repos = vec![repo("darwin-core"), repo("darwin-api")];
        let summaries = vec![
            summary("darwin-core", &["darwin_core", "darwincore"]),
            summary("darwin-api", &["darwin_core"]),
        ];
        let first = build_graph(&repos, &summaries, &prefixes());
        let second = build_graph(&repos, &summaries, &prefixes());
        assert_eq!(first, second);
        assert!(first.edges.iter().all(|(s, t)| s != t));
        assert_eq!(first.edges.len(), 1);
    }

    #[test]
    fn test_hyphen_and_underscore_names_share_node_in_any_order() {
        let summaries = vec![summary("darwin_core", &["darwin_api"]), summary("darwin-api", &["darwin_core"])];

        let forward = vec![repo("darwin-core"), repo("darwin_core"), repo("darwin-api")];
        let reverse: Vec<_> = forward.iter().rev().cloned().collect();

        let a = build_graph(&forward, &summaries, &prefixes());
        let b = build_graph(&reverse, &summaries, &prefixes());
        assert_eq!(a, b);
        assert!(a.nodes.contains("darwin-core"));
        assert!(!a.nodes.contains("darwin_core"));
        assert!(a.edges.contains(&("darwin-core".to_string(), "darwin-api".to_string())));
        assert!(a.edges.contains(&("darwin-api".to_string(), "darwin-core".to_string())));
    }

    #[test]
    fn test_empty_inputs() {
        let graph = build_graph(&[], &[], &prefixes());
        assert!(graph.is_empty());
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn test_node_id() {
        assert_eq!(node_id("darwin-core.v2"), "darwin_core_v2");
    }
}

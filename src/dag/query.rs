// src/dag/query.rs

//! Recursive closure queries over the dependency store.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Bfs, Reversed};

use crate::dag::store::DependencyStore;
use crate::path_utils::name_key;
use crate::types::DependencyType;

/// Every source reachable from `source` over edges of kind `filter`
/// (`Any` = both kinds), including `source` itself, as
/// `absolute path -> database name`.
///
/// With `reverse` the edges are walked backwards: the result is everything
/// that depends on `source`. Placeholder edges are skipped. `resolve` maps a
/// database name to its absolute path; names it cannot resolve are left out,
/// except `source`, which falls back to its database name.
pub fn query_absolute_path_dependencies_recursive<F>(
    store: &DependencyStore,
    source: &str,
    filter: DependencyType,
    reverse: bool,
    resolve: F,
) -> BTreeMap<PathBuf, String>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let names = query_dependencies_recursive(store, source, filter, reverse);

    let source_key = name_key(source);
    let mut out = BTreeMap::new();
    for name in names {
        match resolve(&name) {
            Some(path) => {
                out.insert(path, name);
            }
            None if name_key(&name) == source_key => {
                out.insert(PathBuf::from(&name), name);
            }
            None => {}
        }
    }
    out
}

/// Database names reachable from `source`, including `source`.
pub fn query_dependencies_recursive(
    store: &DependencyStore,
    source: &str,
    filter: DependencyType,
    reverse: bool,
) -> Vec<String> {
    // Nodes are case-insensitive keys; `display` keeps the stored spelling.
    let mut display: HashMap<String, String> = HashMap::new();
    let mut edges: Vec<(String, String)> = Vec::new();

    for edge in store.edges() {
        if !edge.dependency_type.selected_by(filter) {
            continue;
        }
        let Some(target) = edge.target.resolved_name() else {
            continue;
        };
        let from = name_key(&edge.source);
        let to = name_key(target);
        display.entry(from.clone()).or_insert_with(|| edge.source.clone());
        display.entry(to.clone()).or_insert_with(|| target.to_string());
        edges.push((from, to));
    }

    let start = name_key(source);
    display.insert(start.clone(), source.to_string());

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    graph.add_node(start.as_str());
    for (from, to) in edges.iter() {
        graph.add_edge(from.as_str(), to.as_str(), ());
    }

    let mut visited: Vec<&str> = Vec::new();
    if reverse {
        let reversed = Reversed(&graph);
        let mut bfs = Bfs::new(reversed, start.as_str());
        while let Some(node) = bfs.next(reversed) {
            visited.push(node);
        }
    } else {
        let mut bfs = Bfs::new(&graph, start.as_str());
        while let Some(node) = bfs.next(&graph) {
            visited.push(node);
        }
    }

    visited
        .into_iter()
        .filter_map(|key| display.get(key).cloned())
        .collect()
}

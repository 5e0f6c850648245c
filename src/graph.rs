//! The per-space DAG of data and derived stream names, with a synthetic root
//! feeding every data stream (`spec.md` §4.5).

use ahash::{HashMap, HashSet};

use crate::error::{StatefulError, StatefulResult};

const ROOT: &str = "<ROOT>";

#[derive(Debug, Clone, Default)]
pub struct StreamGraph {
    keys: HashSet<String>,
    /// Insertion order, used to break ties when two nodes become eligible to
    /// execute at the same sweep (`spec.md` §9 Open Question (c)).
    order: Vec<String>,
    successors: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
}

impl StreamGraph {
    pub fn new() -> Self {
        let mut g = Self::default();
        g.successors.insert(ROOT.to_owned(), Vec::new());
        g
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Upserts a node. Data streams pass an empty `dependencies` and receive
    /// a root edge; derived streams receive one edge per dependency, which
    /// must already be known.
    pub fn add(&mut self, name: &str, dependencies: &[String]) -> StatefulResult<()> {
        if !self.keys.contains(name) {
            self.keys.insert(name.to_owned());
            self.order.push(name.to_owned());
            self.successors.entry(name.to_owned()).or_default();
            self.predecessors.entry(name.to_owned()).or_default();
        }

        if dependencies.is_empty() {
            self.link(ROOT, name);
        } else {
            for dependency in dependencies {
                if !self.keys.contains(dependency) {
                    return Err(StatefulError::UnknownDependency {
                        name: name.to_owned(),
                        dependency: dependency.clone(),
                    });
                }
                self.link(dependency, name);
            }
        }

        Ok(())
    }

    fn link(&mut self, from: &str, to: &str) {
        let succ = self.successors.entry(from.to_owned()).or_default();
        if !succ.iter().any(|s| s == to) {
            succ.push(to.to_owned());
        }
        let pred = self.predecessors.entry(to.to_owned()).or_default();
        if !pred.iter().any(|p| p == from) {
            pred.push(from.to_owned());
        }
    }

    fn transitive_predecessors(&self, columns: &[String]) -> HashSet<String> {
        let mut required: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = columns.to_vec();
        while let Some(column) = frontier.pop() {
            if !required.insert(column.clone()) {
                continue;
            }
            if let Some(preds) = self.predecessors.get(&column) {
                for p in preds {
                    if p != ROOT {
                        frontier.push(p.clone());
                    }
                }
            }
        }
        required
    }

    /// Topological order over `columns`' transitive predecessors (or every
    /// node, if `columns` is `None`), yielded as `(name, dependency_names)`.
    pub fn execution_order(&self, columns: Option<&[String]>) -> Vec<(String, Vec<String>)> {
        let required: HashSet<String> = match columns {
            Some(cols) => self.transitive_predecessors(cols),
            None => self.keys.clone(),
        };

        let mut order = Vec::new();
        let mut done: HashSet<String> = HashSet::new();

        // Root successors first, in insertion order.
        let mut root_successors: Vec<String> = self
            .successors
            .get(ROOT)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|name| required.contains(name))
            .collect();
        root_successors.sort_by_key(|name| self.order.iter().position(|n| n == name).unwrap_or(usize::MAX));
        for name in root_successors {
            done.insert(name.clone());
            order.push((name, Vec::new()));
        }

        loop {
            let mut missing: Vec<&String> = self
                .order
                .iter()
                .filter(|name| required.contains(*name) && !done.contains(*name))
                .collect();
            if missing.is_empty() {
                break;
            }

            let mut progressed = false;
            missing.sort_by_key(|name| self.order.iter().position(|n| n == *name).unwrap_or(usize::MAX));
            for name in missing {
                let deps: Vec<String> = self
                    .predecessors
                    .get(name)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|d| d != ROOT)
                    .collect();
                if deps.iter().all(|d| done.contains(d)) {
                    done.insert(name.clone());
                    order.push((name.clone(), deps));
                    progressed = true;
                }
            }

            if !progressed {
                // A cycle would manifest here; `add` never allows creating
                // one since every dependency must pre-exist, so this is
                // unreachable in practice.
                break;
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_streams_have_no_dependencies() {
        let mut g = StreamGraph::new();
        g.add("amount", &[]).unwrap();
        let order = g.execution_order(None);
        assert_eq!(order, vec![("amount".to_string(), vec![])]);
    }

    #[test]
    fn derived_streams_execute_after_dependencies() {
        let mut g = StreamGraph::new();
        g.add("amount", &[]).unwrap();
        g.add("half", &["amount".to_string()]).unwrap();
        g.add("combined", &["amount".to_string(), "half".to_string()]).unwrap();

        let order = g.execution_order(None);
        let positions: HashMap<_, _> = order.iter().enumerate().map(|(i, (n, _))| (n.clone(), i)).collect();
        assert!(positions["amount"] < positions["half"]);
        assert!(positions["half"] < positions["combined"]);
    }

    #[test]
    fn unknown_dependency_errors_at_declaration() {
        let mut g = StreamGraph::new();
        let err = g.add("half", &["amount".to_string()]).unwrap_err();
        assert!(matches!(err, StatefulError::UnknownDependency { .. }));
    }

    #[test]
    fn execution_order_restricted_to_columns_only_covers_transitive_predecessors() {
        let mut g = StreamGraph::new();
        g.add("amount", &[]).unwrap();
        g.add("unrelated", &[]).unwrap();
        g.add("half", &["amount".to_string()]).unwrap();

        let order = g.execution_order(Some(&["half".to_string()]));
        let names: Vec<_> = order.iter().map(|(n, _)| n.clone()).collect();
        assert!(names.contains(&"amount".to_string()));
        assert!(names.contains(&"half".to_string()));
        assert!(!names.contains(&"unrelated".to_string()));
    }
}

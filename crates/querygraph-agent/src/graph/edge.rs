use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transition label emitted by a node's finalize phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An edge connecting two nodes in a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node name.
    pub from: String,
    /// Target node name.
    pub to: String,
    /// Label that selects this edge. `None` makes it the source's default
    /// edge, taken for any label without an edge of its own.
    #[serde(default)]
    pub label: Option<Label>,
}

impl Edge {
    /// Create an edge taken when `from` emits `label`.
    pub fn on(from: impl Into<String>, label: impl Into<Label>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: Some(label.into()),
        }
    }

    /// Create the default edge of `from`.
    pub fn otherwise(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }
}

/// How a transition was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// An edge registered for the emitted label.
    Labeled(&'a str),
    /// The source node's default edge.
    Default(&'a str),
}

impl<'a> Route<'a> {
    pub fn target(&self) -> &'a str {
        match self {
            Route::Labeled(to) | Route::Default(to) => to,
        }
    }
}

/// Per-node mapping from label to successor, with an optional default edge.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    labeled: HashMap<String, HashMap<Label, String>>,
    defaults: HashMap<String, String>,
}

impl EdgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an edge. A later edge for the same source and label
    /// replaces the earlier one.
    pub fn insert(&mut self, edge: Edge) {
        match edge.label {
            Some(label) => {
                self.labeled
                    .entry(edge.from)
                    .or_default()
                    .insert(label, edge.to);
            }
            None => {
                self.defaults.insert(edge.from, edge.to);
            }
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, edge: Edge) -> Self {
        self.insert(edge);
        self
    }

    /// Resolve the successor of `from` for `label`. Labeled edges take
    /// precedence over the default edge.
    pub fn resolve(&self, from: &str, label: &Label) -> Option<Route<'_>> {
        if let Some(to) = self.labeled.get(from).and_then(|m| m.get(label)) {
            return Some(Route::Labeled(to));
        }
        self.defaults.get(from).map(|to| Route::Default(to))
    }

    /// Labels with an explicit edge out of `from`, sorted.
    pub fn labels_from(&self, from: &str) -> Vec<&Label> {
        let mut labels: Vec<&Label> = self
            .labeled
            .get(from)
            .map(|m| m.keys().collect())
            .unwrap_or_default();
        labels.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        labels
    }

    /// Every `(from, to)` pair in the table.
    pub fn endpoints(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labeled
            .iter()
            .flat_map(|(from, m)| m.values().map(move |to| (from.as_str(), to.as_str())))
            .chain(self.defaults.iter().map(|(from, to)| (from.as_str(), to.as_str())))
    }
}

impl FromIterator<Edge> for EdgeTable {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        let mut table = Self::new();
        for edge in iter {
            table.insert(edge);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EdgeTable {
        EdgeTable::new()
            .with(Edge::on("decide", "execute_sql", "execute"))
            .with(Edge::on("decide", "list_tables", "execute"))
            .with(Edge::otherwise("decide", "fallback"))
            .with(Edge::on("execute", "validate", "validate"))
    }

    #[test]
    fn test_labeled_edge_wins_over_default() {
        let t = table();
        assert_eq!(
            t.resolve("decide", &Label::from("execute_sql")),
            Some(Route::Labeled("execute"))
        );
    }

    #[test]
    fn test_default_edge_catches_unknown_labels() {
        let t = table();
        let route = t.resolve("decide", &Label::from("drop_table")).unwrap();
        assert_eq!(route, Route::Default("fallback"));
        assert_eq!(route.target(), "fallback");
        assert_eq!(
            t.resolve("decide", &Label::from("")),
            Some(Route::Default("fallback"))
        );
    }

    #[test]
    fn test_no_edge_without_default() {
        let t = table();
        assert_eq!(t.resolve("execute", &Label::from("decide")), None);
        assert_eq!(t.resolve("validate", &Label::from("decide")), None);
    }

    #[test]
    fn test_later_edge_replaces_earlier() {
        let t = EdgeTable::new()
            .with(Edge::on("a", "go", "b"))
            .with(Edge::on("a", "go", "c"));
        assert_eq!(t.resolve("a", &Label::from("go")), Some(Route::Labeled("c")));
    }

    #[test]
    fn test_labels_from_sorted() {
        let t = table();
        let labels: Vec<&str> = t.labels_from("decide").iter().map(|l| l.as_str()).collect();
        assert_eq!(labels, vec!["execute_sql", "list_tables"]);
        assert!(t.labels_from("missing").is_empty());
    }

    #[test]
    fn test_endpoints_cover_default_edges() {
        let t = table();
        let mut pairs: Vec<(&str, &str)> = t.endpoints().collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("decide", "execute"),
                ("decide", "execute"),
                ("decide", "fallback"),
                ("execute", "validate"),
            ]
        );
    }

    #[test]
    fn test_edge_deserializes_without_label() {
        let edge: Edge = serde_json::from_str(r#"{"from": "a", "to": "b"}"#).unwrap();
        assert!(edge.label.is_none());
        let edge: Edge =
            serde_json::from_str(r#"{"from": "a", "to": "b", "label": "next"}"#).unwrap();
        assert_eq!(edge.label, Some(Label::from("next")));
    }
}

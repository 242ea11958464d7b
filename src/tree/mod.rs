//! Span tree reconstruction.
//!
//! Spans reference their parent by id only. [`build_forest`] turns a flat
//! span list into an arena of [`TraceNode`]s linked by index, with one root
//! per parentless or orphaned span.
//!
//! # Rules
//!
//! - Children keep input order; sort the input first (see
//!   [`sort_spans_by_timestamp`]) for temporal order.
//! - A span whose parent is not in the input becomes a root.
//! - A duplicate `span_id` replaces the earlier record (last write wins) but
//!   keeps the earlier record's position.
//! - Parent cycles are cut: one node of each cycle is promoted to a root and
//!   recorded in [`SpanForest::cycle_breaks`]. No traversal recurses, so
//!   malformed input cannot overflow the stack.

use std::collections::{HashMap, HashSet};

use crate::telemetry::Span;

/// A span together with its position in the forest.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    /// The span record; for duplicate ids, the last one seen.
    pub span: Span,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl TraceNode {
    fn new(span: Span) -> Self {
        Self {
            span,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Arena index of the resolved parent, `None` for roots.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Arena indices of the children, in discovery order.
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The reconstructed call-tree(s) of one trace.
///
/// Immutable once built; a refetch builds a new forest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanForest {
    nodes: Vec<TraceNode>,
    roots: Vec<usize>,
    index: HashMap<String, usize>,
    cycle_breaks: Vec<usize>,
}

/// Build the forest for one trace's spans.
pub fn build_forest(spans: impl IntoIterator<Item = Span>) -> SpanForest {
    let mut nodes: Vec<TraceNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for span in spans {
        match index.get(&span.span_id) {
            Some(&slot) => nodes[slot].span = span,
            None => {
                index.insert(span.span_id.clone(), nodes.len());
                nodes.push(TraceNode::new(span));
            }
        }
    }

    let mut roots = Vec::new();
    let mut cycle_breaks = Vec::new();

    for i in 0..nodes.len() {
        let parent = nodes[i]
            .span
            .parent_span_id
            .as_deref()
            .and_then(|id| index.get(id).copied());

        match parent {
            Some(p) if p == i => {
                roots.push(i);
                cycle_breaks.push(i);
            }
            Some(p) => {
                nodes[p].children.push(i);
                nodes[i].parent = Some(p);
            }
            None => roots.push(i),
        }
    }

    let mut forest = SpanForest {
        nodes,
        roots,
        index,
        cycle_breaks,
    };
    forest.break_cycles();
    forest
}

impl SpanForest {
    /// Promote one node of every unreachable parent cycle to a root.
    fn break_cycles(&mut self) {
        let mut reached = vec![false; self.nodes.len()];
        for &root in &self.roots {
            self.mark_reachable(root, &mut reached);
        }

        for start in 0..self.nodes.len() {
            if reached[start] {
                continue;
            }

            // Every unreached node hangs below a cycle; walk up until a node repeats.
            let mut seen = HashSet::new();
            let mut cursor = start;
            while seen.insert(cursor) {
                match self.nodes[cursor].parent {
                    Some(p) => cursor = p,
                    None => break,
                }
            }

            if let Some(p) = self.nodes[cursor].parent.take() {
                self.nodes[p].children.retain(|&c| c != cursor);
            }
            tracing::debug!(
                span_id = %self.nodes[cursor].span.span_id,
                trace_id = %self.nodes[cursor].span.trace_id,
                "Broke parent cycle in span tree"
            );
            self.roots.push(cursor);
            self.cycle_breaks.push(cursor);
            self.mark_reachable(cursor, &mut reached);
        }
    }

    fn mark_reachable(&self, from: usize, reached: &mut [bool]) {
        let mut stack = vec![from];
        while let Some(i) = stack.pop() {
            if reached[i] {
                continue;
            }
            reached[i] = true;
            stack.extend(self.nodes[i].children.iter().copied());
        }
    }

    /// Number of nodes in the forest.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the trace had no spans.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root indices: parentless spans, orphans, then cycle breaks.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Node at an arena index.
    pub fn node(&self, index: usize) -> Option<&TraceNode> {
        self.nodes.get(index)
    }

    /// All nodes in arena order (first occurrence of each span id).
    pub fn nodes(&self) -> &[TraceNode] {
        &self.nodes
    }

    /// Arena index of a span id.
    pub fn index_of(&self, span_id: &str) -> Option<usize> {
        self.index.get(span_id).copied()
    }

    /// Look a node up by span id.
    pub fn get(&self, span_id: &str) -> Option<&TraceNode> {
        self.index_of(span_id).map(|i| &self.nodes[i])
    }

    /// Nodes promoted to roots to cut a parent cycle.
    pub fn cycle_breaks(&self) -> &[usize] {
        &self.cycle_breaks
    }

    /// Whether the span declared a parent that is not in the forest.
    pub fn is_orphan(&self, index: usize) -> bool {
        self.nodes.get(index).is_some_and(|n| {
            n.span
                .parent_span_id
                .as_deref()
                .is_some_and(|p| !self.index.contains_key(p))
        })
    }

    /// Distance from the node's root; roots have depth 0.
    pub fn depth_of(&self, index: usize) -> Option<usize> {
        self.path_to_root(index).map(|path| path.len() - 1)
    }

    /// Indices from `index` up to and including its root.
    pub fn path_to_root(&self, index: usize) -> Option<Vec<usize>> {
        self.nodes.get(index)?;
        let mut path = vec![index];
        let mut cursor = index;
        while let Some(p) = self.nodes[cursor].parent {
            path.push(p);
            cursor = p;
        }
        Some(path)
    }

    /// Pre-order walk over every tree, yielding `(index, depth)`.
    ///
    /// Roots are visited in root order and children in discovery order.
    pub fn walk_depth_first(&self) -> Vec<(usize, usize)> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&r| (r, 0)).collect();

        while let Some((i, depth)) = stack.pop() {
            order.push((i, depth));
            for &child in self.nodes[i].children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }

        order
    }

    /// Deepest level present in the forest, `None` when empty.
    pub fn max_depth(&self) -> Option<usize> {
        self.walk_depth_first().into_iter().map(|(_, d)| d).max()
    }

    /// Number of nodes below `index`, excluding itself.
    pub fn descendant_count(&self, index: usize) -> usize {
        let Some(node) = self.nodes.get(index) else {
            return 0;
        };
        let mut count = 0;
        let mut stack: Vec<usize> = node.children.clone();
        while let Some(i) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[i].children.iter().copied());
        }
        count
    }
}

/// Stable sort by start time, then by longest duration first.
///
/// Build the forest from sorted spans to get time-ordered children.
pub fn sort_spans_by_timestamp(spans: &mut [Span]) {
    spans.sort_by(|a, b| {
        a.timestamp.cmp(&b.timestamp).then_with(|| {
            b.duration_ms
                .partial_cmp(&a.duration_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn span(id: &str, parent: Option<&str>) -> Span {
        let span = Span::new("trace-1", id, format!("op-{}", id), ts(0));
        match parent {
            Some(p) => span.with_parent(p),
            None => span,
        }
    }

    fn ids(forest: &SpanForest, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .map(|&i| forest.node(i).unwrap().span.span_id.clone())
            .collect()
    }

    fn reachable_ids(forest: &SpanForest) -> Vec<String> {
        forest
            .walk_depth_first()
            .into_iter()
            .map(|(i, _)| forest.nodes()[i].span.span_id.clone())
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let forest = build_forest(Vec::new());
        assert!(forest.is_empty());
        assert!(forest.roots().is_empty());
        assert_eq!(forest.max_depth(), None);
    }

    #[test]
    fn test_orphan_becomes_root() {
        let forest = build_forest(vec![
            span("1", None),
            span("2", Some("1")),
            span("3", Some("99")),
        ]);

        assert_eq!(ids(&forest, forest.roots()), vec!["1", "3"]);
        let root = forest.get("1").unwrap();
        assert_eq!(ids(&forest, root.children()), vec!["2"]);
        assert!(forest.get("3").unwrap().is_leaf());
        assert!(forest.is_orphan(forest.index_of("3").unwrap()));
        assert!(!forest.is_orphan(forest.index_of("2").unwrap()));
        assert!(forest.cycle_breaks().is_empty());
    }

    #[test]
    fn test_children_keep_input_order() {
        let forest = build_forest(vec![
            span("c", Some("root")),
            span("root", None),
            span("a", Some("root")),
            span("b", Some("root")),
        ]);

        let root = forest.get("root").unwrap();
        assert_eq!(ids(&forest, root.children()), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_totality_and_no_duplication() {
        let spans = vec![
            span("1", None),
            span("2", Some("1")),
            span("3", Some("2")),
            span("4", Some("2")),
            span("5", Some("missing")),
            span("6", Some("5")),
            span("7", None),
        ];
        let forest = build_forest(spans.clone());

        let mut seen = reachable_ids(&forest);
        assert_eq!(seen.len(), spans.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), spans.len());
    }

    #[test]
    fn test_depth_and_paths() {
        let forest = build_forest(vec![
            span("1", None),
            span("2", Some("1")),
            span("3", Some("2")),
        ]);

        let leaf = forest.index_of("3").unwrap();
        assert_eq!(forest.depth_of(leaf), Some(2));
        assert_eq!(
            ids(&forest, &forest.path_to_root(leaf).unwrap()),
            vec!["3", "2", "1"]
        );
        assert_eq!(forest.max_depth(), Some(2));
        assert_eq!(forest.descendant_count(forest.index_of("1").unwrap()), 2);
        assert_eq!(forest.depth_of(42), None);
    }

    #[test]
    fn test_walk_is_preorder() {
        let forest = build_forest(vec![
            span("1", None),
            span("2", Some("1")),
            span("3", Some("2")),
            span("4", Some("1")),
            span("5", None),
        ]);

        let walk: Vec<(String, usize)> = forest
            .walk_depth_first()
            .into_iter()
            .map(|(i, d)| (forest.nodes()[i].span.span_id.clone(), d))
            .collect();
        assert_eq!(
            walk,
            vec![
                ("1".to_string(), 0),
                ("2".to_string(), 1),
                ("3".to_string(), 2),
                ("4".to_string(), 1),
                ("5".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_duplicate_span_id_last_write_wins() {
        let forest = build_forest(vec![
            span("1", None),
            span("2", Some("1")).with_duration(5.0),
            span("3", Some("1")),
            span("2", Some("1")).with_duration(9.0),
        ]);

        assert_eq!(forest.len(), 3);
        let dup = forest.get("2").unwrap();
        assert_eq!(dup.span.duration_ms, 9.0);
        let root = forest.get("1").unwrap();
        assert_eq!(ids(&forest, root.children()), vec!["2", "3"]);
    }

    #[test]
    fn test_two_node_cycle_is_broken() {
        let forest = build_forest(vec![span("a", Some("b")), span("b", Some("a"))]);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest.roots().len(), 1);
        assert_eq!(forest.cycle_breaks().len(), 1);
        assert_eq!(reachable_ids(&forest).len(), 2);
    }

    #[test]
    fn test_self_parent_is_root() {
        let forest = build_forest(vec![span("a", Some("a")), span("b", Some("a"))]);

        assert_eq!(ids(&forest, forest.roots()), vec!["a"]);
        assert_eq!(ids(&forest, forest.cycle_breaks()), vec!["a"]);
        assert_eq!(ids(&forest, forest.get("a").unwrap().children()), vec!["b"]);
    }

    #[test]
    fn test_cycle_with_hanging_subtree() {
        // x -> y -> z -> x, with w hanging off z and listed first.
        let forest = build_forest(vec![
            span("w", Some("z")),
            span("x", Some("z")),
            span("y", Some("x")),
            span("z", Some("y")),
            span("r", None),
        ]);

        assert_eq!(forest.len(), 5);
        assert_eq!(forest.cycle_breaks().len(), 1);
        let broken = forest.cycle_breaks()[0];
        // Walking up from w reaches z, y, x and then z again.
        assert_eq!(forest.nodes()[broken].span.span_id, "z");
        assert_eq!(forest.node(broken).unwrap().parent(), None);

        let mut seen = reachable_ids(&forest);
        seen.sort();
        assert_eq!(seen, vec!["r", "w", "x", "y", "z"]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut spans = vec![span("0", None)];
        for i in 1..50_000 {
            spans.push(span(&i.to_string(), Some(&(i - 1).to_string())));
        }
        let forest = build_forest(spans);

        assert_eq!(forest.roots().len(), 1);
        assert_eq!(forest.max_depth(), Some(49_999));
        assert_eq!(forest.walk_depth_first().len(), 50_000);
    }

    #[test]
    fn test_sort_spans_by_timestamp() {
        let mut spans = vec![
            Span::new("t", "late", "op", ts(10)),
            Span::new("t", "short", "op", ts(0)).with_duration(1.0),
            Span::new("t", "long", "op", ts(0)).with_duration(50.0),
        ];
        sort_spans_by_timestamp(&mut spans);
        let order: Vec<&str> = spans.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(order, vec!["long", "short", "late"]);
    }
}

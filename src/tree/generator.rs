use super::node::{CompareNode, ContainsNode, EqualsNode, FilterNode, MatchesNode, NamedFilterNode};
use super::{FilterTree, NodeId, TreeError};
use crate::config::FilterConfig;
use crate::event::{Aspect, AspectRegistry};
use crate::filter::coerce::Coercer;
use crate::filter::compiler::{CompiledComparison, CompiledExpression, CompiledFilter, Connective, compile_str};
use crate::filter::operator::OperatorKind;
use tracing::{debug, warn};

/// Turns compiled filters into [`FilterTree`]s bound to an aspect catalog.
#[derive(Debug, Clone)]
pub struct TreeGenerator {
    registry: AspectRegistry,
    coercer: Coercer,
    ignore_case: bool,
}

impl TreeGenerator {
    pub fn new(registry: AspectRegistry) -> Self {
        Self {
            registry,
            coercer: Coercer::default(),
            ignore_case: false,
        }
    }

    /// Generator using the coercion and matching rules of `config`.
    pub fn from_config(config: &FilterConfig, registry: AspectRegistry) -> Self {
        Self {
            registry,
            coercer: Coercer::new(&config.coercion),
            ignore_case: config.matching.ignore_case,
        }
    }

    pub fn with_coercer(mut self, coercer: Coercer) -> Self {
        self.coercer = coercer;
        self
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn registry(&self) -> &AspectRegistry {
        &self.registry
    }

    /// A `Root` holding one node per expression. A negated filter becomes a
    /// single negated `And` over its expressions.
    pub fn generate(&self, filter: &CompiledFilter) -> FilterTree {
        let mut tree = FilterTree::new();
        let root = tree.root();
        let built = if filter.is_negated() {
            self.generate_into(&mut tree, root, filter).map(|_| ())
        } else {
            filter
                .expressions()
                .iter()
                .try_for_each(|expression| self.add_expression(&mut tree, root, expression).map(|_| ()))
        };
        if let Err(err) = built {
            warn!(error = %err, "filter tree is incomplete");
        }
        tree
    }

    /// Add `filter` below `parent` as a single node, wrapping several
    /// expressions (or a negated filter) in an `And`.
    pub fn generate_into(
        &self,
        tree: &mut FilterTree,
        parent: NodeId,
        filter: &CompiledFilter,
    ) -> Result<NodeId, TreeError> {
        match filter.expressions() {
            [expression] if !filter.is_negated() => self.add_expression(tree, parent, expression),
            expressions => {
                let and = tree.add_child(parent, FilterNode::And)?;
                tree.set_negate(and, filter.is_negated())?;
                for expression in expressions {
                    self.add_expression(tree, and, expression)?;
                }
                Ok(and)
            }
        }
    }

    fn add_expression(
        &self,
        tree: &mut FilterTree,
        parent: NodeId,
        expression: &CompiledExpression,
    ) -> Result<NodeId, TreeError> {
        match (expression.connective(), expression.right()) {
            (Some(connective), Some(right)) => {
                let node = match connective {
                    Connective::And => FilterNode::And,
                    Connective::Or => FilterNode::Or,
                };
                let id = tree.add_child(parent, node)?;
                tree.set_negate(id, expression.is_negated())?;
                self.add_comparison(tree, id, expression.left(), false)?;
                self.add_comparison(tree, id, right, false)?;
                Ok(id)
            }
            _ => self.add_comparison(tree, parent, expression.left(), expression.is_negated()),
        }
    }

    /// A leaf for a named field, or an `Or` with one `Matches` leaf per aspect
    /// for the wildcard. The `Or` carries the negation.
    fn add_comparison(
        &self,
        tree: &mut FilterTree,
        parent: NodeId,
        comparison: &CompiledComparison,
        negate: bool,
    ) -> Result<NodeId, TreeError> {
        let negate = negate ^ comparison.is_negated();
        let operator = comparison.operator();
        let value = comparison.raw_value().unwrap_or_default();

        if comparison.is_wildcard() {
            let pattern = match operator {
                OperatorKind::Present => MatchesNode::ANY,
                _ => value,
            };
            let or = tree.add_child(parent, FilterNode::Or)?;
            tree.set_negate(or, negate ^ (operator == OperatorKind::NotEquals))?;
            for aspect in self.registry.aspects() {
                let node = MatchesNode::with_coercer(aspect.clone(), pattern, &self.coercer);
                tree.add_child(or, FilterNode::Matches(node))?;
            }
            debug!(aspects = self.registry.aspects().len(), "expanded wildcard comparison");
            return Ok(or);
        }

        let aspect = self.registry.resolve_or_field(comparison.field());
        let (node, leaf_negate) = self.leaf(aspect, operator, value);
        let id = tree.add_child(parent, node)?;
        tree.set_negate(id, leaf_negate ^ negate)?;
        Ok(id)
    }

    /// Leaf node for `operator`, plus the negation the mapping itself implies.
    fn leaf(&self, aspect: Aspect, operator: OperatorKind, value: &str) -> (FilterNode, bool) {
        match operator {
            OperatorKind::Equals | OperatorKind::NotEquals => {
                let mut node = EqualsNode::with_coercer(aspect, value, &self.coercer);
                node.set_ignore_case(self.ignore_case);
                (FilterNode::Equals(node), operator == OperatorKind::NotEquals)
            }
            OperatorKind::Contains => {
                let mut node = ContainsNode::new(aspect, value);
                node.set_ignore_case(self.ignore_case);
                (FilterNode::Contains(node), false)
            }
            OperatorKind::Matches => (
                FilterNode::Matches(MatchesNode::with_coercer(aspect, value, &self.coercer)),
                false,
            ),
            OperatorKind::Present => (
                FilterNode::Matches(MatchesNode::with_coercer(aspect, MatchesNode::ANY, &self.coercer)),
                false,
            ),
            OperatorKind::GreaterThan => (
                FilterNode::Compare(CompareNode::with_coercer(aspect, value, 1, &self.coercer)),
                false,
            ),
            OperatorKind::LessThan => (
                FilterNode::Compare(CompareNode::with_coercer(aspect, value, -1, &self.coercer)),
                false,
            ),
        }
    }
}

/// Build a tree for `filter` with default coercion rules.
pub fn to_tree(filter: &CompiledFilter, registry: &AspectRegistry) -> FilterTree {
    TreeGenerator::new(registry.clone()).generate(filter)
}

/// A `Root` holding one named filter per enabled saved filter of `config`.
///
/// Saved filters that do not compile are skipped.
pub fn saved_filter_tree(config: &FilterConfig, registry: &AspectRegistry) -> FilterTree {
    let generator = TreeGenerator::from_config(config, registry.clone());
    let mut tree = FilterTree::new();
    let root = tree.root();

    for saved in config.saved_filters.iter().filter(|f| f.enabled) {
        let Some(filter) = compile_str(&saved.expression) else {
            warn!(
                name = %saved.name,
                expression = %saved.expression,
                "Skipping saved filter that does not compile"
            );
            continue;
        };
        let added = tree
            .add_child(root, FilterNode::NamedFilter(NamedFilterNode::new(saved.name.as_str())))
            .and_then(|named| generator.generate_into(&mut tree, named, &filter));
        if let Err(err) = added {
            warn!(name = %saved.name, error = %err, "Skipping saved filter");
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SavedFilter;
    use crate::event::TraceEvent;
    use crate::tree::NodeKind;

    fn tree(text: &str) -> FilterTree {
        to_tree(
            &compile_str(text).expect("filter compiles"),
            &AspectRegistry::builtin(),
        )
    }

    fn kinds(tree: &FilterTree, id: NodeId) -> Vec<NodeKind> {
        tree.children(id)
            .iter()
            .filter_map(|&c| tree.kind(c))
            .collect()
    }

    #[test]
    fn test_operator_mapping() {
        let t = tree("a == 1 b != 2 c > 3 d < 4 e present f contains x g matches y");
        let root = t.root();
        assert_eq!(
            kinds(&t, root),
            vec![
                NodeKind::Equals,
                NodeKind::Equals,
                NodeKind::Compare,
                NodeKind::Compare,
                NodeKind::Matches,
                NodeKind::Contains,
                NodeKind::Matches,
            ]
        );
        let children = t.children(root);
        assert!(!t.is_negated(children[0]));
        assert!(t.is_negated(children[1]));
        match t.node(children[2]) {
            Some(FilterNode::Compare(n)) => assert_eq!(n.result(), 1),
            other => panic!("unexpected node {other:?}"),
        }
        match t.node(children[3]) {
            Some(FilterNode::Compare(n)) => assert_eq!(n.result(), -1),
            other => panic!("unexpected node {other:?}"),
        }
        assert_eq!(t.node(children[4]).and_then(FilterNode::value), Some(".*"));
    }

    #[test]
    fn test_named_fields_bind_to_aspects() {
        let t = tree(r#""Event type" == sched_switch"#);
        let leaf = t.child(t.root(), 0).expect("leaf");
        let aspect = t.node(leaf).and_then(FilterNode::aspect).expect("aspect");
        assert_eq!(aspect.name(), "Event type");
        assert!(t.matches(&TraceEvent::new("ust", "sched_switch", 0)));
    }

    #[test]
    fn test_wildcard_expands_per_aspect() {
        let t = tree("glxgears");
        let or = t.child(t.root(), 0).expect("or");
        assert_eq!(t.kind(or), Some(NodeKind::Or));
        assert_eq!(t.children(or).len(), AspectRegistry::builtin().aspects().len());

        let event = TraceEvent::new("ust", "t", 0).with_field("name", "glxgears");
        assert!(t.matches(&event));
        assert!(!t.matches(&TraceEvent::new("ust", "t", 0)));
    }

    #[test]
    fn test_wildcard_reaches_each_payload_field() {
        let event = TraceEvent::new("ust", "t", 0)
            .with_field("pid", 1234)
            .with_field("name", "glxgears");
        assert!(tree("^glx").matches(&event));
        assert!(tree("^glxgears$").matches(&event));
        assert!(!tree("^gears").matches(&event));
    }

    #[test]
    fn test_explicit_wildcard_uses_matches_leaves() {
        let filter = CompiledFilter::new(vec![CompiledExpression::single(CompiledComparison::new(
            "*",
            OperatorKind::NotEquals,
            Some("foo".into()),
        ))]);
        let t = to_tree(&filter, &AspectRegistry::builtin());
        let or = t.child(t.root(), 0).expect("or");
        assert!(t.is_negated(or));
        assert!(kinds(&t, or).iter().all(|&kind| kind == NodeKind::Matches));
        assert!(t.children(or).iter().all(|&leaf| !t.is_negated(leaf)));

        assert!(!t.matches(&TraceEvent::new("ust", "t", 0).with_field("name", "foo")));
        assert!(t.matches(&TraceEvent::new("ust", "t", 0).with_field("name", "bar")));
    }

    #[test]
    fn test_negated_expression_lands_on_node() {
        let t = tree(r#"! type == "foo""#);
        let leaf = t.child(t.root(), 0).expect("leaf");
        assert_eq!(t.kind(leaf), Some(NodeKind::Equals));
        assert!(t.is_negated(leaf));

        let t = tree("!(a == 1 || b == 2)");
        let or = t.child(t.root(), 0).expect("or");
        assert_eq!(t.kind(or), Some(NodeKind::Or));
        assert!(t.is_negated(or));
        assert_eq!(t.children(or).len(), 2);

        // != under ! cancels out
        let t = tree("!(a != 1)");
        let leaf = t.child(t.root(), 0).expect("leaf");
        assert!(!t.is_negated(leaf));
    }

    #[test]
    fn test_negated_filter_wraps_in_and() {
        let filter = compile_str("a == 1 b == 2").expect("filter compiles").negated();
        let t = to_tree(&filter, &AspectRegistry::builtin());
        let and = t.child(t.root(), 0).expect("and");
        assert_eq!(t.kind(and), Some(NodeKind::And));
        assert!(t.is_negated(and));
        assert_eq!(t.children(and).len(), 2);
    }

    #[test]
    fn test_ignore_case_reaches_leaves() {
        let filter = compile_str("name == GLXGEARS").expect("filter compiles");
        let generator = TreeGenerator::new(AspectRegistry::builtin()).with_ignore_case(true);
        let t = generator.generate(&filter);
        assert!(t.matches(&TraceEvent::new("ust", "t", 0).with_field("name", "glxgears")));
    }

    #[test]
    fn test_saved_filter_tree_skips_broken_and_disabled() {
        let config = FilterConfig {
            saved_filters: vec![
                SavedFilter {
                    name: "busy".to_string(),
                    expression: "pid > 1000 name present".to_string(),
                    enabled: true,
                },
                SavedFilter {
                    name: "broken".to_string(),
                    expression: "pid >".to_string(),
                    enabled: true,
                },
                SavedFilter {
                    name: "off".to_string(),
                    expression: "pid < 0".to_string(),
                    enabled: false,
                },
            ],
            ..FilterConfig::default()
        };
        let t = saved_filter_tree(&config, &AspectRegistry::builtin());
        let root = t.root();
        assert_eq!(kinds(&t, root), vec![NodeKind::NamedFilter]);

        let named = t.children(root)[0];
        assert_eq!(kinds(&t, named), vec![NodeKind::And]);
        let event = TraceEvent::new("ust", "t", 0)
            .with_field("pid", 1234)
            .with_field("name", "glxgears");
        assert!(t.matches(&event));
        assert!(!t.matches(&TraceEvent::new("ust", "t", 0).with_field("pid", 1)));
    }
}

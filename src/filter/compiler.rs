use super::operator::OperatorKind;
use super::parser;
use super::syntax::{GenericExpressionNode, SyntaxKind};
use crate::record::WILDCARD_FIELD;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Boolean operator joining the two comparisons of one clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connective {
    And,
    Or,
}

impl FromStr for Connective {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "&&" => Ok(Connective::And),
            "||" => Ok(Connective::Or),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => f.write_str("&&"),
            Connective::Or => f.write_str("||"),
        }
    }
}

/// One `field op value` test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledComparison {
    field: String,
    operator: OperatorKind,
    raw_value: Option<String>,
    negate: bool,
}

impl CompiledComparison {
    pub fn new(field: impl Into<String>, operator: OperatorKind, raw_value: Option<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            raw_value,
            negate: false,
        }
    }

    /// Free text matched against every field.
    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self::new(WILDCARD_FIELD, OperatorKind::Matches, Some(pattern.into()))
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> OperatorKind {
        self.operator
    }

    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn is_wildcard(&self) -> bool {
        self.field == WILDCARD_FIELD
    }
}

/// One clause: a comparison, optionally joined to a second one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledExpression {
    left: CompiledComparison,
    connective: Option<Connective>,
    right: Option<CompiledComparison>,
    negate: bool,
}

impl CompiledExpression {
    pub fn single(left: CompiledComparison) -> Self {
        Self {
            left,
            connective: None,
            right: None,
            negate: false,
        }
    }

    pub fn joined(left: CompiledComparison, connective: Connective, right: CompiledComparison) -> Self {
        Self {
            left,
            connective: Some(connective),
            right: Some(right),
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn left(&self) -> &CompiledComparison {
        &self.left
    }

    pub fn connective(&self) -> Option<Connective> {
        self.connective
    }

    pub fn right(&self) -> Option<&CompiledComparison> {
        self.right.as_ref()
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn comparisons(&self) -> impl Iterator<Item = &CompiledComparison> {
        std::iter::once(&self.left).chain(self.right.as_ref())
    }
}

/// The evaluation-target-agnostic result of compilation.
///
/// All expressions must hold; `negate` inverts the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledFilter {
    expressions: Vec<CompiledExpression>,
    negate: bool,
}

impl CompiledFilter {
    pub fn new(expressions: Vec<CompiledExpression>) -> Self {
        Self {
            expressions,
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn expressions(&self) -> &[CompiledExpression] {
        &self.expressions
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn comparisons(&self) -> impl Iterator<Item = &CompiledComparison> {
        self.expressions.iter().flat_map(CompiledExpression::comparisons)
    }
}

/// Compile a generic expression tree.
///
/// Returns `None` when any part of the tree is malformed; nothing partial is
/// ever returned. A non-root node is compiled as a single expression.
pub fn compile(tree: &GenericExpressionNode) -> Option<CompiledFilter> {
    let expressions = match tree.kind {
        SyntaxKind::Root => tree
            .children
            .iter()
            .map(compile_expression)
            .collect::<Option<Vec<_>>>(),
        _ => compile_expression(tree).map(|expression| vec![expression]),
    };

    match expressions {
        Some(expressions) if !expressions.is_empty() => Some(CompiledFilter::new(expressions)),
        _ => {
            debug!(tree = %tree, "filter expression did not compile");
            None
        }
    }
}

/// Parse then compile filter text; malformed text yields `None`.
pub fn compile_str(text: &str) -> Option<CompiledFilter> {
    match parser::parse(text) {
        Ok(tree) => compile(&tree),
        Err(err) => {
            debug!(filter = text, error = %err, "filter text did not parse");
            None
        }
    }
}

fn compile_expression(node: &GenericExpressionNode) -> Option<CompiledExpression> {
    match node.kind {
        SyntaxKind::Expression => {
            let left = compile_comparison(node.child(0)?)?;
            match node.children.as_slice() {
                [_] => Some(CompiledExpression::single(left)),
                [_, separator, right] if separator.kind == SyntaxKind::Separator => {
                    let connective = separator.text.parse::<Connective>().ok()?;
                    Some(CompiledExpression::joined(
                        left,
                        connective,
                        compile_comparison(right)?,
                    ))
                }
                _ => None,
            }
        }
        SyntaxKind::Parenthesized => match node.children.as_slice() {
            [inner] => compile_expression(inner),
            _ => None,
        },
        SyntaxKind::Negation => match node.children.as_slice() {
            [marker, inner] if marker.kind == SyntaxKind::Negate => {
                compile_expression(inner).map(CompiledExpression::negated)
            }
            [inner] => compile_expression(inner).map(CompiledExpression::negated),
            _ => None,
        },
        SyntaxKind::Operation
        | SyntaxKind::PresentOperation
        | SyntaxKind::CompoundOperation
        | SyntaxKind::CompoundPresent
        | SyntaxKind::Constant => compile_comparison(node).map(CompiledExpression::single),
        kind => {
            debug!(?kind, "unexpected node where an expression was expected");
            None
        }
    }
}

fn compile_comparison(node: &GenericExpressionNode) -> Option<CompiledComparison> {
    match node.kind {
        SyntaxKind::Constant => {
            let value = if node.children.is_empty() {
                unquote(node.text.trim()).to_string()
            } else {
                join_texts(&node.children)?
            };
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            Some(CompiledComparison::wildcard(value))
        }
        SyntaxKind::Operation if node.children.len() != 3 => None,
        SyntaxKind::PresentOperation if node.children.len() != 2 => None,
        SyntaxKind::Operation
        | SyntaxKind::PresentOperation
        | SyntaxKind::CompoundOperation
        | SyntaxKind::CompoundPresent => compile_operation(&node.children),
        _ => None,
    }
}

/// `text... op text...` where the operator is the first operator or present token.
fn compile_operation(children: &[GenericExpressionNode]) -> Option<CompiledComparison> {
    let split = children
        .iter()
        .position(|c| matches!(c.kind, SyntaxKind::Operator | SyntaxKind::Present))?;
    let (left, rest) = children.split_at(split);
    let (operator_token, right) = rest.split_first()?;

    let operator = match operator_token.text.parse::<OperatorKind>() {
        Ok(operator) => operator,
        Err(err) => {
            debug!(error = %err, "unknown operator in filter expression");
            return None;
        }
    };
    let field = join_texts(left)?;

    if operator.takes_value() {
        let value = join_texts(right)?;
        Some(CompiledComparison::new(field, operator, Some(value)))
    } else if right.is_empty() {
        Some(CompiledComparison::new(field, operator, None))
    } else {
        None
    }
}

/// Text tokens joined by single spaces; `None` if empty or any child is not text.
fn join_texts(nodes: &[GenericExpressionNode]) -> Option<String> {
    if nodes.is_empty() || nodes.iter().any(|n| n.kind != SyntaxKind::Text) {
        return None;
    }
    let joined = nodes
        .iter()
        .map(|n| unquote(n.text.trim()))
        .collect::<Vec<_>>()
        .join(" ");
    Some(joined.trim().to_string())
}

fn unquote(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Quote `text` when it would not survive a round trip as a bare word.
fn quoted(text: &str) -> String {
    let bare = !text.is_empty()
        && !matches!(text, "matches" | "contains" | "present")
        && !text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '!' | '=' | '<' | '>' | '&' | '|'));
    if bare {
        text.to_string()
    } else {
        format!("\"{}\"", text.replace('"', "\\\""))
    }
}

impl fmt::Display for CompiledComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("!")?;
        }
        let value = self.raw_value.as_deref().unwrap_or_default();
        if self.is_wildcard() && self.operator == OperatorKind::Matches {
            return f.write_str(&quoted(value));
        }
        write!(f, "{} {}", quoted(&self.field), self.operator)?;
        if self.operator.takes_value() {
            write!(f, " {}", quoted(value))?;
        }
        Ok(())
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("!(")?;
        }
        write!(f, "{}", self.left)?;
        if let (Some(connective), Some(right)) = (self.connective, &self.right) {
            write!(f, " {connective} {right}")?;
        }
        if self.negate {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self
            .expressions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        if self.negate {
            write!(f, "!({body})")
        } else {
            f.write_str(&body)
        }
    }
}

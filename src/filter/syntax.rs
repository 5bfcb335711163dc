use std::fmt;

/// Kind tag of a [`GenericExpressionNode`].
///
/// Structural kinds group children; token kinds carry text and have no children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    /// Top level; each child is an expression, all of them must hold
    Root,
    /// `left [separator right]`
    Expression,
    /// `( expression )`
    Parenthesized,
    /// `! expression`, children are the negation token then the expression
    Negation,
    /// `field op value`, exactly three tokens
    Operation,
    /// `field present`
    PresentOperation,
    /// `text... op text...`, operands spread over several text tokens
    CompoundOperation,
    /// `text... present`
    CompoundPresent,
    /// Free text matched against every field
    Constant,
    Text,
    Operator,
    Present,
    Negate,
    Separator,
}

impl SyntaxKind {
    pub fn is_token(self) -> bool {
        matches!(
            self,
            SyntaxKind::Text
                | SyntaxKind::Operator
                | SyntaxKind::Present
                | SyntaxKind::Negate
                | SyntaxKind::Separator
        )
    }
}

/// Node of the generic expression tree handed over by a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericExpressionNode {
    pub kind: SyntaxKind,
    pub text: String,
    pub children: Vec<GenericExpressionNode>,
}

impl GenericExpressionNode {
    pub fn new(kind: SyntaxKind, children: Vec<GenericExpressionNode>) -> Self {
        Self {
            kind,
            text: String::new(),
            children,
        }
    }

    pub fn token(kind: SyntaxKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn text_token(text: impl Into<String>) -> Self {
        Self::token(SyntaxKind::Text, text)
    }

    pub fn child(&self, index: usize) -> Option<&GenericExpressionNode> {
        self.children.get(index)
    }
}

impl fmt::Display for GenericExpressionNode {
    /// Lisp-style dump, e.g. `(Operation pid > 1000)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_token() {
            return f.write_str(&self.text);
        }
        write!(f, "({:?}", self.kind)?;
        for child in &self.children {
            write!(f, " {child}")?;
        }
        f.write_str(")")
    }
}

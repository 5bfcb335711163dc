use super::error::FilterParseError;
use super::syntax::{GenericExpressionNode, SyntaxKind};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Text,
    Operator,
    Present,
    Negate,
    Separator,
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct Lexeme {
    kind: TokenKind,
    text: String,
    position: usize,
}

impl Lexeme {
    fn to_node(&self) -> GenericExpressionNode {
        let kind = match self.kind {
            TokenKind::Text => SyntaxKind::Text,
            TokenKind::Operator => SyntaxKind::Operator,
            TokenKind::Present => SyntaxKind::Present,
            TokenKind::Negate => SyntaxKind::Negate,
            TokenKind::Separator => SyntaxKind::Separator,
            TokenKind::Open | TokenKind::Close => unreachable!("parentheses never become nodes"),
        };
        GenericExpressionNode::token(kind, self.text.clone())
    }

    fn unexpected(&self) -> FilterParseError {
        FilterParseError::UnexpectedToken {
            token: self.text.clone(),
            position: self.position,
        }
    }
}

/// Characters that end an unquoted word
fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '!' | '=' | '<' | '>' | '&' | '|')
}

fn tokenize(input: &str) -> Result<Vec<Lexeme>, FilterParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        let lexeme = |kind, text: &str| Lexeme {
            kind,
            text: text.to_string(),
            position,
        };

        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(lexeme(TokenKind::Open, "(")),
            ')' => tokens.push(lexeme(TokenKind::Close, ")")),
            '>' => tokens.push(lexeme(TokenKind::Operator, ">")),
            '<' => tokens.push(lexeme(TokenKind::Operator, "<")),
            '!' => {
                if chars.next_if(|&(_, next)| next == '=').is_some() {
                    tokens.push(lexeme(TokenKind::Operator, "!="));
                } else {
                    tokens.push(lexeme(TokenKind::Negate, "!"));
                }
            }
            '=' | '&' | '|' => {
                if chars.next_if(|&(_, next)| next == c).is_none() {
                    return Err(FilterParseError::UnexpectedToken {
                        token: c.to_string(),
                        position,
                    });
                }
                let text = format!("{c}{c}");
                let kind = if c == '=' {
                    TokenKind::Operator
                } else {
                    TokenKind::Separator
                };
                tokens.push(lexeme(kind, &text));
            }
            '"' => {
                let mut text = String::from('"');
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        // only `\"` is an escape; other backslashes stay for patterns
                        '\\' => match chars.next_if(|&(_, escaped)| escaped == '"') {
                            Some(_) => text.push('"'),
                            None => text.push('\\'),
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(FilterParseError::UnterminatedQuote { position });
                }
                text.push('"');
                tokens.push(lexeme(TokenKind::Text, &text));
            }
            first => {
                let mut word = String::from(first);
                while let Some((_, next)) = chars.next_if(|&(_, next)| !is_word_boundary(next)) {
                    word.push(next);
                }
                let kind = match word.as_str() {
                    "matches" | "contains" => TokenKind::Operator,
                    "present" => TokenKind::Present,
                    _ => TokenKind::Text,
                };
                tokens.push(lexeme(kind, &word));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Lexeme>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Lexeme> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn next_if(&mut self, kind: TokenKind) -> Option<Lexeme> {
        if self.peek().is_some_and(|t| t.kind == kind) {
            self.next()
        } else {
            None
        }
    }

    fn parse_root(&mut self) -> Result<GenericExpressionNode, FilterParseError> {
        if self.tokens.is_empty() {
            return Err(FilterParseError::Empty);
        }
        let mut expressions = Vec::new();
        while self.peek().is_some() {
            expressions.push(self.parse_expression()?);
        }
        Ok(GenericExpressionNode::new(SyntaxKind::Root, expressions))
    }

    fn parse_expression(&mut self) -> Result<GenericExpressionNode, FilterParseError> {
        let token = self.peek().cloned().ok_or(FilterParseError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Open => {
                self.next();
                let inner = self.parse_expression()?;
                match self.next() {
                    Some(close) if close.kind == TokenKind::Close => Ok(
                        GenericExpressionNode::new(SyntaxKind::Parenthesized, vec![inner]),
                    ),
                    Some(other) => Err(other.unexpected()),
                    None => Err(FilterParseError::UnexpectedEnd),
                }
            }
            TokenKind::Negate => {
                self.next();
                let inner = self.parse_expression()?;
                Ok(GenericExpressionNode::new(
                    SyntaxKind::Negation,
                    vec![token.to_node(), inner],
                ))
            }
            TokenKind::Text => {
                let mut children = vec![self.parse_simple()?];
                if let Some(separator) = self.next_if(TokenKind::Separator) {
                    children.push(separator.to_node());
                    children.push(self.parse_simple()?);
                }
                Ok(GenericExpressionNode::new(SyntaxKind::Expression, children))
            }
            _ => Err(token.unexpected()),
        }
    }

    fn parse_texts(&mut self) -> Result<Vec<GenericExpressionNode>, FilterParseError> {
        let mut texts = Vec::new();
        while let Some(text) = self.next_if(TokenKind::Text) {
            texts.push(text.to_node());
        }
        if texts.is_empty() {
            return Err(match self.peek() {
                Some(token) => token.unexpected(),
                None => FilterParseError::UnexpectedEnd,
            });
        }
        Ok(texts)
    }

    fn parse_simple(&mut self) -> Result<GenericExpressionNode, FilterParseError> {
        let mut children = self.parse_texts()?;
        let left_len = children.len();

        if let Some(operator) = self.next_if(TokenKind::Operator) {
            children.push(operator.to_node());
            // the right operand is a single token; anything after it starts a new expression
            let right = match self.next() {
                Some(text) if text.kind == TokenKind::Text => text,
                Some(other) => return Err(other.unexpected()),
                None => return Err(FilterParseError::UnexpectedEnd),
            };
            children.push(right.to_node());
            let kind = if left_len == 1 {
                SyntaxKind::Operation
            } else {
                SyntaxKind::CompoundOperation
            };
            return Ok(GenericExpressionNode::new(kind, children));
        }

        if let Some(present) = self.next_if(TokenKind::Present) {
            children.push(present.to_node());
            let kind = if left_len == 1 {
                SyntaxKind::PresentOperation
            } else {
                SyntaxKind::CompoundPresent
            };
            return Ok(GenericExpressionNode::new(kind, children));
        }

        Ok(GenericExpressionNode::new(SyntaxKind::Constant, children))
    }
}

/// Parse filter text into a generic expression tree.
///
/// ```text
/// pid > 1000 && name matches "gl.*"
/// ! type == "foo"
/// (afield matches .*other.*)
/// prev_comm present
/// glxgears
/// ```
pub fn parse(input: &str) -> Result<GenericExpressionNode, FilterParseError> {
    let tokens = tokenize(input)?;
    Parser { tokens, pos: 0 }.parse_root()
}

//! Recursive descent parser for filter expressions.
//!
//! ```text
//! filter     := or_expr EOF
//! or_expr    := and_expr ( "or" and_expr )*
//! and_expr   := primary ( "and" primary )*
//! primary    := "(" or_expr ")" | comparison
//! comparison := IDENT op literal | IDENT "in" "[" ( literal ( "," literal )* )? "]"
//! op         := "eq" | "ne" | "gt" | "ge" | "lt" | "le" | "contains"
//! literal    := NUMBER | STRING | IDENT
//! ```

use crate::ast::*;
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::span::{Span, Spanned};
use tessera_proto::ComparisonOp;

const OPERATOR_HINT: &str = "use one of eq, ne, gt, ge, lt, le, contains, in";

/// Parser over a tokenized filter string.
pub struct Parser<'source> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Tokenize the source and create a parser for it.
    pub fn new(source: &'source str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            source,
        })
    }

    /// Parse the whole input. Empty input yields `None`.
    pub fn parse_filter(&mut self) -> Result<Option<FilterNode>, ParseError> {
        if self.tokens.is_empty() {
            return Ok(None);
        }

        let node = self.parse_or()?;

        if let Some(tok) = self.peek() {
            let (kind, hint) = if tok.token == Token::RParen {
                (ParseErrorKind::UnbalancedGroup, "remove the extra ')'")
            } else {
                (
                    ParseErrorKind::UnexpectedToken,
                    "join comparisons with 'and' or 'or'",
                )
            };
            return Err(ParseError::new(
                kind,
                format!("unexpected {} after complete expression", tok.token.describe()),
                tok.span,
            )
            .with_hint(hint));
        }

        Ok(Some(node))
    }

    /// Parse OR conditions.
    fn parse_or(&mut self) -> Result<FilterNode, ParseError> {
        let mut nodes = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            nodes.push(self.parse_and()?);
        }
        Ok(FilterNode::or(nodes))
    }

    /// Parse AND conditions.
    fn parse_and(&mut self) -> Result<FilterNode, ParseError> {
        let mut nodes = vec![self.parse_primary()?];
        while self.eat(&Token::And) {
            nodes.push(self.parse_primary()?);
        }
        Ok(FilterNode::and(nodes))
    }

    /// Parse a parenthesized group or a comparison.
    fn parse_primary(&mut self) -> Result<FilterNode, ParseError> {
        let open = match self.peek() {
            Some(tok) if tok.token == Token::LParen => tok.span,
            _ => return self.parse_comparison().map(FilterNode::Comparison),
        };
        self.pos += 1;

        let inner = self.parse_or()?;
        match self.next_token() {
            Ok(tok) if tok.token == Token::RParen => Ok(inner),
            Ok(tok) => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("expected ')', found {}", tok.token.describe()),
                tok.span,
            )),
            Err(_) => Err(ParseError::new(
                ParseErrorKind::UnbalancedGroup,
                "unclosed '('",
                open,
            )
            .with_hint("add the matching ')'")),
        }
    }

    /// Parse `member op operand`.
    fn parse_comparison(&mut self) -> Result<Comparison, ParseError> {
        let member = self.expect_ident()?;
        let op_tok = self.next_token()?;

        let op = match &op_tok.token {
            Token::Eq => ComparisonOp::Eq,
            Token::Ne => ComparisonOp::Ne,
            Token::Gt => ComparisonOp::Gt,
            Token::Ge => ComparisonOp::Ge,
            Token::Lt => ComparisonOp::Lt,
            Token::Le => ComparisonOp::Le,
            Token::Contains => ComparisonOp::Contains,
            Token::In => ComparisonOp::In,
            Token::Ident(name) => {
                return Err(ParseError::new(
                    ParseErrorKind::UnknownOperator,
                    format!("unknown operator '{}'", name),
                    op_tok.span,
                )
                .with_hint(OPERATOR_HINT))
            }
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    format!("expected operator, found {}", other.describe()),
                    op_tok.span,
                )
                .with_hint(OPERATOR_HINT))
            }
        };
        let op = Spanned::new(op, op_tok.span);

        let operand = if op.value == ComparisonOp::In {
            Operand::List(self.parse_list()?)
        } else {
            Operand::Single(self.parse_literal()?)
        };

        Ok(Comparison {
            member,
            op,
            operand,
        })
    }

    /// Parse a bracketed literal list `[a, b, ...]`.
    fn parse_list(&mut self) -> Result<Spanned<Vec<Spanned<Literal>>>, ParseError> {
        let open = self.next_token()?;
        if open.token != Token::LBracket {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("'in' requires a bracketed list, found {}", open.token.describe()),
                open.span,
            )
            .with_hint("write e.g. id in [1, 2, 3]"));
        }

        let mut values = Vec::new();
        if let Some(close) = self.peek().filter(|t| t.token == Token::RBracket) {
            let span = open.span.merge(close.span);
            self.pos += 1;
            return Ok(Spanned::new(values, span));
        }

        loop {
            values.push(self.parse_literal()?);
            let tok = self.next_token().map_err(|_| {
                ParseError::new(ParseErrorKind::UnbalancedGroup, "unclosed '['", open.span)
                    .with_hint("add the matching ']'")
            })?;
            match tok.token {
                Token::Comma => continue,
                Token::RBracket => return Ok(Spanned::new(values, open.span.merge(tok.span))),
                other => {
                    return Err(ParseError::new(
                        ParseErrorKind::UnexpectedToken,
                        format!("expected ',' or ']', found {}", other.describe()),
                        tok.span,
                    ))
                }
            }
        }
    }

    /// Parse a literal value.
    fn parse_literal(&mut self) -> Result<Spanned<Literal>, ParseError> {
        let tok = self.next_token()?;
        let literal = match tok.token {
            Token::Number(n) => Literal::Number(n),
            Token::String(s) | Token::StringSingle(s) => Literal::Quoted(s),
            Token::Ident(w) => Literal::Word(w),
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    format!("expected literal value, found {}", other.describe()),
                    tok.span,
                )
                .with_hint("quote literals that collide with keywords, e.g. \"and\""))
            }
        };

        Ok(Spanned::new(literal, tok.span))
    }

    /// Expect and consume an identifier.
    fn expect_ident(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok(Spanned::new(name, tok.span)),
            Token::RParen => Err(ParseError::new(
                ParseErrorKind::UnbalancedGroup,
                "unexpected ')'",
                tok.span,
            )),
            other => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("expected member code, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    /// Consume the next token if it matches.
    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(tok) if &tok.token == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        match self.tokens.get(self.pos) {
            Some(tok) => {
                self.pos += 1;
                Ok(tok.clone())
            }
            None => Err(ParseError::new(
                ParseErrorKind::UnexpectedEnd,
                "unexpected end of filter",
                Span::at(self.source.len()),
            )),
        }
    }
}

/// Parse a filter string into a syntax tree.
pub fn parse(source: &str) -> Result<Option<FilterNode>, ParseError> {
    Parser::new(source)?.parse_filter()
}

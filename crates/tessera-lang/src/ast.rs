//! Untyped syntax tree for filter expressions.
//!
//! Literals are kept as source text: whether `10` is an integer, a decimal or
//! text is decided later against the schema of the member it is compared to.

use crate::span::{Span, Spanned};
use tessera_proto::ComparisonOp;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// `member op operand`.
    Comparison(Comparison),
    /// Logical AND of conditions.
    And(Vec<FilterNode>),
    /// Logical OR of conditions.
    Or(Vec<FilterNode>),
}

impl FilterNode {
    /// Create an AND node, collapsing a single child.
    pub fn and(mut nodes: Vec<FilterNode>) -> Self {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            FilterNode::And(nodes)
        }
    }

    /// Create an OR node, collapsing a single child.
    pub fn or(mut nodes: Vec<FilterNode>) -> Self {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            FilterNode::Or(nodes)
        }
    }

    /// Number of comparisons in the tree.
    pub fn comparison_count(&self) -> usize {
        match self {
            FilterNode::Comparison(_) => 1,
            FilterNode::And(nodes) | FilterNode::Or(nodes) => {
                nodes.iter().map(FilterNode::comparison_count).sum()
            }
        }
    }
}

/// A single comparison leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Member code being compared.
    pub member: Spanned<String>,
    /// Operator.
    pub op: Spanned<ComparisonOp>,
    /// Right-hand side.
    pub operand: Operand,
}

impl Comparison {
    /// Span from the member code to the end of the operand.
    pub fn span(&self) -> Span {
        self.member.span.merge(self.operand.span())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One literal (every operator except `in`).
    Single(Spanned<Literal>),
    /// Bracketed literal list (`in`).
    List(Spanned<Vec<Spanned<Literal>>>),
}

impl Operand {
    /// Source span of the operand.
    pub fn span(&self) -> Span {
        match self {
            Operand::Single(lit) => lit.span,
            Operand::List(list) => list.span,
        }
    }
}

/// A literal as written in the filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Unquoted number, verbatim.
    Number(String),
    /// Quoted string, unescaped.
    Quoted(String),
    /// Unquoted word such as `true`, `null` or `abc`.
    Word(String),
}

impl Literal {
    /// The literal's text.
    pub fn text(&self) -> &str {
        match self {
            Literal::Number(s) | Literal::Quoted(s) | Literal::Word(s) => s,
        }
    }

    /// Whether this is the bare word `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Word(w) if w.eq_ignore_ascii_case("null"))
    }

    /// Get a description of the literal type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Number(_) => "number",
            Literal::Quoted(_) => "string",
            Literal::Word(_) => "word",
        }
    }
}

//! Compiled query specification.
//!
//! A [`Params`] value is produced by the engine's query compiler after every
//! member reference and literal has been checked against the schema. The
//! filter is an abstract predicate tree; translating it into a storage
//! engine's native query form is the persistence gateway's job.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::MemberId;
use crate::kind::StorageKind;
use crate::value::Value;

/// A fully validated query: optional filter, sort key and paging window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Params {
    /// Predicate over record values.
    pub filtering: Option<Filtering>,
    /// Sort key.
    pub sorting: Option<Sorting>,
    /// Paging window.
    pub paging: Option<Paging>,
}

impl Params {
    /// Create an empty specification (everything, in storage order).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter.
    pub fn with_filtering(mut self, filtering: Filtering) -> Self {
        self.filtering = Some(filtering);
        self
    }

    /// Set the sort key.
    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = Some(sorting);
        self
    }

    /// Set the paging window.
    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    /// The same specification without paging, used for totals.
    pub fn without_paging(&self) -> Self {
        Self {
            filtering: self.filtering.clone(),
            sorting: self.sorting.clone(),
            paging: None,
        }
    }
}

/// A filter condition wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filtering {
    /// The predicate tree.
    pub expression: FilterExpr,
}

impl Filtering {
    /// Create a filter from an expression.
    pub fn new(expression: FilterExpr) -> Self {
        Self { expression }
    }
}

impl From<FilterExpr> for Filtering {
    fn from(expression: FilterExpr) -> Self {
        Self { expression }
    }
}

/// Boolean predicate tree. Leaves compare one member against typed literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// `member op value` for every operator except `in`.
    Compare {
        member: String,
        op: ComparisonOp,
        value: Value,
    },
    /// `member in [values]`.
    In { member: String, values: Vec<Value> },
    /// All children must match.
    And(Vec<FilterExpr>),
    /// At least one child must match.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Create a comparison leaf.
    pub fn compare(member: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            member: member.into(),
            op,
            value: value.into(),
        }
    }

    /// Create an `in` leaf.
    pub fn in_list(member: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            member: member.into(),
            values,
        }
    }

    /// Create an AND node, collapsing a single child.
    pub fn and(mut children: Vec<FilterExpr>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            FilterExpr::And(children)
        }
    }

    /// Create an OR node, collapsing a single child.
    pub fn or(mut children: Vec<FilterExpr>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            FilterExpr::Or(children)
        }
    }

    /// Member codes referenced anywhere in the tree.
    pub fn members(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_members(&mut out);
        out
    }

    fn collect_members<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpr::Compare { member, .. } | FilterExpr::In { member, .. } => {
                if !out.contains(&member.as_str()) {
                    out.push(member);
                }
            }
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                for child in children {
                    child.collect_members(out);
                }
            }
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Compare { member, op, value } => write!(f, "{} {} {}", member, op, value),
            FilterExpr::In { member, values } => {
                write!(f, "{} in [", member)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            FilterExpr::And(children) => write_joined(f, children, "and"),
            FilterExpr::Or(children) => write_joined(f, children, "or"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[FilterExpr], joiner: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", joiner)?;
        }
        write!(f, "({})", child)?;
    }
    Ok(())
}

/// Comparison operators of the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Text contains substring.
    Contains,
    /// Member value is one of a list.
    In,
}

impl ComparisonOp {
    /// Keyword used in filter strings.
    pub fn keyword(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Contains => "contains",
            ComparisonOp::In => "in",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Sort key resolved against the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sorting {
    /// Member to sort by.
    pub member_id: MemberId,
    /// Code of that member (record values are keyed by code).
    pub member_code: String,
    /// Storage kind of that member.
    pub storage_kind: StorageKind,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Parse `asc`/`desc`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }
}

/// Paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Number of records to skip.
    pub skip: u64,
    /// Maximum number of records to return.
    pub take: u64,
}

impl Paging {
    /// Create a paging window.
    pub fn new(skip: u64, take: u64) -> Self {
        Self { skip, take }
    }
}

//! Query compiler: raw caller input to validated `Params`.

use tracing::debug;

use tessera_lang::{Comparison, FilterNode, Literal, Operand, Spanned};
use tessera_proto::{
    ClassId, ComparisonOp, FilterExpr, Filtering, Paging, Params, RawValue, SortDirection,
    Sorting, StorageKind, Value,
};

use crate::catalog::Catalog;
use crate::coerce;
use crate::error::{Error, QueryError, QueryErrorKind};

/// Untyped query input as received from a caller.
///
/// Blank strings count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawQuery<'a> {
    pub filter: Option<&'a str>,
    pub sort_member: Option<&'a str>,
    pub sort_direction: Option<&'a str>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

impl<'a> RawQuery<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: &'a str) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, member: &'a str, direction: &'a str) -> Self {
        self.sort_member = Some(member);
        self.sort_direction = Some(direction);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }
}

/// Compiles raw queries against the schema catalog.
pub struct QueryCompiler<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Compile a raw query for instances of `class_id`.
    pub fn compile(&self, class_id: ClassId, raw: &RawQuery<'_>) -> Result<Params, Error> {
        let mut params = Params::new();

        if let Some(source) = raw.filter.filter(|s| !s.trim().is_empty()) {
            if let Some(expression) = self.compile_filter(class_id, source)? {
                params = params.with_filtering(Filtering::new(expression));
            }
        }

        if let Some(sorting) = self.compile_sorting(class_id, raw)? {
            params = params.with_sorting(sorting);
        }

        if let Some(paging) = compile_paging(raw.skip, raw.take)? {
            params = params.with_paging(paging);
        }

        debug!(
            class_id = %class_id,
            filter = ?params.filtering.as_ref().map(|f| f.expression.to_string()),
            sort = ?params.sorting.as_ref().map(|s| (&s.member_code, s.direction)),
            paging = ?params.paging,
            "compiled query"
        );

        Ok(params)
    }

    /// Compile a filter string. Returns `None` for a blank filter.
    pub fn compile_filter(
        &self,
        class_id: ClassId,
        source: &str,
    ) -> Result<Option<FilterExpr>, Error> {
        let tree = tessera_lang::parse(source)
            .map_err(|e| Error::InvalidQuery(QueryError::from_parse(&e, source)))?;

        tree.map(|node| self.compile_node(class_id, &node, source))
            .transpose()
    }

    fn compile_node(
        &self,
        class_id: ClassId,
        node: &FilterNode,
        source: &str,
    ) -> Result<FilterExpr, Error> {
        match node {
            FilterNode::Comparison(cmp) => self.compile_comparison(class_id, cmp, source),
            FilterNode::And(nodes) => Ok(FilterExpr::and(
                nodes
                    .iter()
                    .map(|n| self.compile_node(class_id, n, source))
                    .collect::<Result<_, _>>()?,
            )),
            FilterNode::Or(nodes) => Ok(FilterExpr::or(
                nodes
                    .iter()
                    .map(|n| self.compile_node(class_id, n, source))
                    .collect::<Result<_, _>>()?,
            )),
        }
    }

    fn compile_comparison(
        &self,
        class_id: ClassId,
        cmp: &Comparison,
        source: &str,
    ) -> Result<FilterExpr, Error> {
        let code = cmp.member.value.as_str();
        let member = self
            .catalog
            .resolve_member(class_id, code, true)
            .map_err(|_| {
                QueryError::new(
                    QueryErrorKind::UnknownMember,
                    format!("unknown member '{}'", code),
                )
                .at(cmp.member.span, source)
            })?;
        let kind = self.catalog.storage_kind(member)?;
        let op = cmp.op.value;

        if !kind.supports(op) {
            return Err(QueryError::new(
                QueryErrorKind::IllegalOperator,
                format!("operator '{}' cannot be applied to {} member '{}'", op, kind, code),
            )
            .at(cmp.op.span, source)
            .into());
        }

        match &cmp.operand {
            Operand::Single(literal) => {
                let value = literal_value(kind, literal, source)?;
                if value.is_null() && !matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
                    return Err(QueryError::new(
                        QueryErrorKind::InvalidLiteral,
                        format!("null can only be compared with eq or ne, not '{}'", op),
                    )
                    .at(literal.span, source)
                    .into());
                }
                Ok(FilterExpr::compare(code, op, value))
            }
            Operand::List(list) => {
                let values = list
                    .value
                    .iter()
                    .map(|literal| literal_value(kind, literal, source))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FilterExpr::in_list(code, values))
            }
        }
    }

    fn compile_sorting(
        &self,
        class_id: ClassId,
        raw: &RawQuery<'_>,
    ) -> Result<Option<Sorting>, Error> {
        let (code, direction) = match (present(raw.sort_member), present(raw.sort_direction)) {
            (None, None) => return Ok(None),
            (Some(code), Some(direction)) => (code, direction),
            (Some(_), None) => {
                return Err(QueryError::new(
                    QueryErrorKind::SortMismatch,
                    "a sort member was given without a sort direction",
                )
                .into())
            }
            (None, Some(_)) => {
                return Err(QueryError::new(
                    QueryErrorKind::SortMismatch,
                    "a sort direction was given without a sort member",
                )
                .into())
            }
        };

        let direction = SortDirection::parse(direction).ok_or_else(|| {
            QueryError::new(
                QueryErrorKind::InvalidDirection,
                format!("sort direction must be 'asc' or 'desc', got '{}'", direction),
            )
        })?;

        let member = self
            .catalog
            .resolve_member(class_id, code, true)
            .map_err(|_| {
                QueryError::new(
                    QueryErrorKind::UnknownMember,
                    format!("cannot sort by unknown member '{}'", code),
                )
            })?;

        Ok(Some(Sorting {
            member_id: member.id,
            member_code: member.code.clone(),
            storage_kind: self.catalog.storage_kind(member)?,
            direction,
        }))
    }
}

/// Missing skip starts at zero; missing take is unbounded.
fn compile_paging(skip: Option<i64>, take: Option<i64>) -> Result<Option<Paging>, Error> {
    if skip.is_none() && take.is_none() {
        return Ok(None);
    }
    let non_negative = |name: &str, v: i64| {
        u64::try_from(v).map_err(|_| {
            QueryError::new(
                QueryErrorKind::NegativePaging,
                format!("{} must not be negative, got {}", name, v),
            )
        })
    };
    let skip = skip.map(|v| non_negative("skip", v)).transpose()?.unwrap_or(0);
    let take = take
        .map(|v| non_negative("take", v))
        .transpose()?
        .unwrap_or(u64::MAX);
    Ok(Some(Paging::new(skip, take)))
}

fn literal_value(
    kind: StorageKind,
    literal: &Spanned<Literal>,
    source: &str,
) -> Result<Value, Error> {
    let raw = if literal.value.is_null() {
        RawValue::Null
    } else {
        RawValue::Text(literal.value.text().to_string())
    };

    coerce::coerce(kind, &raw).map_err(|e| {
        let message = format!(
            "{} '{}' is not a valid {}: {}",
            literal.value.type_name(),
            e.literal,
            kind,
            e.reason
        );
        Error::InvalidQuery(
            QueryError::new(QueryErrorKind::InvalidLiteral, message).at(literal.span, source),
        )
    })
}

fn present(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

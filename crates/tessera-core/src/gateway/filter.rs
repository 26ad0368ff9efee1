//! Filter and sort evaluation over localized records.

use std::cmp::Ordering;

use tessera_proto::{ComparisonOp, FilterExpr, LocalizedRecord, SortDirection, Sorting, Value};

static NULL: Value = Value::Null;

/// Evaluates compiled filter trees against localized records.
pub struct RecordFilter;

impl RecordFilter {
    /// Evaluate a filter expression against a record.
    ///
    /// Members absent from the record read as null.
    pub fn matches(filter: &FilterExpr, record: &LocalizedRecord) -> bool {
        match filter {
            FilterExpr::Compare { member, op, value } => {
                Self::compare(Self::field(record, member), *op, value)
            }
            FilterExpr::In { member, values } => {
                let field = Self::field(record, member);
                values.iter().any(|v| Self::values_equal(field, v))
            }
            FilterExpr::And(children) => children.iter().all(|c| Self::matches(c, record)),
            FilterExpr::Or(children) => children.iter().any(|c| Self::matches(c, record)),
        }
    }

    fn field<'a>(record: &'a LocalizedRecord, member: &str) -> &'a Value {
        record.get(member).unwrap_or(&NULL)
    }

    fn compare(field: &Value, op: ComparisonOp, value: &Value) -> bool {
        match op {
            ComparisonOp::Eq => Self::values_equal(field, value),
            ComparisonOp::Ne => !Self::values_equal(field, value),
            ComparisonOp::In => Self::values_equal(field, value),
            ComparisonOp::Contains => match (field, value) {
                (Value::Text(haystack), Value::Text(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            },
            ComparisonOp::Gt | ComparisonOp::Ge | ComparisonOp::Lt | ComparisonOp::Le => {
                if field.is_null() || value.is_null() {
                    return false;
                }
                match Self::compare_values(field, value) {
                    Some(ord) => match op {
                        ComparisonOp::Gt => ord.is_gt(),
                        ComparisonOp::Ge => ord.is_ge(),
                        ComparisonOp::Lt => ord.is_lt(),
                        _ => ord.is_le(),
                    },
                    None => false,
                }
            }
        }
    }

    /// Equality with integer/decimal promotion; relations compare by id.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(x), Value::Decimal(y)) | (Value::Decimal(y), Value::Integer(x)) => {
                (*x as f64) == *y
            }
            (Value::Relation(x), Value::Relation(y)) => x.id == y.id,
            _ => a == b,
        }
    }

    /// Ordering between two values. Null sorts before everything; mixed kinds
    /// have no order.
    pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
            (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
            (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
            (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
            (Value::Relation(x), Value::Relation(y)) => Some(x.id.cmp(&y.id)),
            (Value::Decimal(_) | Value::Integer(_), Value::Decimal(_) | Value::Integer(_)) => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            _ => None,
        }
    }

    /// Sort records in place. Ties, and records without a sort key, are
    /// ordered by object id.
    pub fn sort(records: &mut [LocalizedRecord], sorting: Option<&Sorting>) {
        records.sort_by(|a, b| {
            let by_member = sorting
                .map(|s| {
                    let ord = Self::sort_order(
                        Self::field(a, &s.member_code),
                        Self::field(b, &s.member_code),
                    );
                    match s.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                })
                .unwrap_or(Ordering::Equal);
            by_member.then(a.object_id.cmp(&b.object_id))
        });
    }

    /// Total order for sorting. Values `compare_values` cannot order fall
    /// back to a fixed rank per kind.
    fn sort_order(a: &Value, b: &Value) -> Ordering {
        if let Some(ord) = Self::compare_values(a, b) {
            return ord;
        }
        match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => kind_rank(a).cmp(&kind_rank(b)),
        }
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) | Value::Decimal(_) => 2,
        Value::Text(_) => 3,
        Value::DateTime(_) => 4,
        Value::Relation(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_proto::{ClassId, CultureId, MemberId, ObjectId, RelationRef, StorageKind};

    fn record(id: u64, name: &str, price: Value) -> LocalizedRecord {
        LocalizedRecord::new(CultureId(1), ObjectId(id), ClassId(1))
            .with_value("name", Value::from(name))
            .with_value("price", price)
    }

    fn price_sort(direction: SortDirection) -> Sorting {
        Sorting {
            member_id: MemberId(2),
            member_code: "price".into(),
            storage_kind: StorageKind::Decimal,
            direction,
        }
    }

    #[test]
    fn test_comparisons() {
        let r = record(1, "Widget", Value::Decimal(9.99));
        let matches = |f: FilterExpr| RecordFilter::matches(&f, &r);

        assert!(matches(FilterExpr::compare("price", ComparisonOp::Lt, 10.0)));
        assert!(!matches(FilterExpr::compare("price", ComparisonOp::Gt, 10.0)));
        assert!(matches(FilterExpr::compare("price", ComparisonOp::Le, 9.99)));
        assert!(matches(FilterExpr::compare("name", ComparisonOp::Eq, "Widget")));
        assert!(matches(FilterExpr::compare("name", ComparisonOp::Ne, "Gadget")));
        assert!(matches(FilterExpr::compare("name", ComparisonOp::Contains, "idg")));
        assert!(matches(FilterExpr::compare("name", ComparisonOp::Contains, "WID")));
    }

    #[test]
    fn test_nulls_and_missing_members() {
        let r = record(1, "Widget", Value::Null);
        let matches = |f: FilterExpr| RecordFilter::matches(&f, &r);

        assert!(matches(FilterExpr::compare("price", ComparisonOp::Eq, Value::Null)));
        assert!(!matches(FilterExpr::compare("price", ComparisonOp::Lt, 10.0)));
        assert!(!matches(FilterExpr::compare("price", ComparisonOp::Gt, 10.0)));
        assert!(matches(FilterExpr::compare("missing", ComparisonOp::Eq, Value::Null)));
        assert!(matches(FilterExpr::compare("missing", ComparisonOp::Ne, 1i64)));
    }

    #[test]
    fn test_in_and_logic() {
        let r = record(1, "Widget", Value::Integer(3));
        let in_list = FilterExpr::in_list("price", vec![Value::Decimal(3.0), Value::Integer(4)]);
        assert!(RecordFilter::matches(&in_list, &r));
        assert!(!RecordFilter::matches(&FilterExpr::in_list("price", vec![]), &r));

        let expr = FilterExpr::or(vec![
            FilterExpr::and(vec![
                FilterExpr::compare("name", ComparisonOp::Eq, "Gadget"),
                FilterExpr::compare("price", ComparisonOp::Eq, 3i64),
            ]),
            FilterExpr::compare("price", ComparisonOp::Ge, 3i64),
        ]);
        assert!(RecordFilter::matches(&expr, &r));
    }

    #[test]
    fn test_relation_equality_by_id() {
        let r = LocalizedRecord::new(CultureId(1), ObjectId(1), ClassId(1)).with_value(
            "vendor",
            Value::Relation(RelationRef::new(ObjectId(5), Some("Acme".into()))),
        );
        let expr = FilterExpr::compare(
            "vendor",
            ComparisonOp::Eq,
            Value::Relation(RelationRef::unresolved(ObjectId(5))),
        );
        assert!(RecordFilter::matches(&expr, &r));
    }

    #[test]
    fn test_sort_nulls_first_then_id() {
        let mut records = vec![
            record(4, "d", Value::Decimal(2.0)),
            record(1, "a", Value::Decimal(5.0)),
            record(3, "c", Value::Null),
            record(2, "b", Value::Decimal(2.0)),
        ];

        RecordFilter::sort(&mut records, Some(&price_sort(SortDirection::Asc)));
        let ids: Vec<u64> = records.iter().map(|r| r.object_id.0).collect();
        assert_eq!(ids, vec![3, 2, 4, 1]);

        RecordFilter::sort(&mut records, Some(&price_sort(SortDirection::Desc)));
        let ids: Vec<u64> = records.iter().map(|r| r.object_id.0).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);

        RecordFilter::sort(&mut records, None);
        let ids: Vec<u64> = records.iter().map(|r| r.object_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sort_orders_mixed_kinds_by_kind() {
        let shuffled = || {
            vec![
                record(1, "a", Value::from("cheap")),
                record(2, "b", Value::Integer(3)),
                record(3, "c", Value::Boolean(true)),
                record(4, "d", Value::Decimal(1.5)),
                record(5, "e", Value::Null),
                record(6, "f", Value::from("bargain")),
                record(7, "g", Value::Decimal(f64::NAN)),
            ]
        };
        let expected = vec![5, 3, 4, 2, 7, 6, 1];

        let mut records = shuffled();
        RecordFilter::sort(&mut records, Some(&price_sort(SortDirection::Asc)));
        let ids: Vec<u64> = records.iter().map(|r| r.object_id.0).collect();
        assert_eq!(ids, expected);

        let mut reversed = shuffled();
        reversed.reverse();
        RecordFilter::sort(&mut reversed, Some(&price_sort(SortDirection::Asc)));
        let ids: Vec<u64> = reversed.iter().map(|r| r.object_id.0).collect();
        assert_eq!(ids, expected);

        RecordFilter::sort(&mut reversed, Some(&price_sort(SortDirection::Desc)));
        let ids: Vec<u64> = reversed.iter().map(|r| r.object_id.0).collect();
        assert_eq!(ids, vec![1, 6, 7, 2, 4, 3, 5]);
    }
}

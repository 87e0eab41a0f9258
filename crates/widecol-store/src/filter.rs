//! Server-side read predicates.
//!
//! Filters are evaluated per row. Row filters decide whether a row is
//! returned at all; column filters trim the cells of a returned row. A row
//! left without cells is dropped. Only conjunction is exposed.

use bytes::Bytes;
use std::cmp::Ordering;

use widecol_common::types::RowResult;

/// Byte comparison operator for [`Filter::ColumnValue`].
///
/// Values compare lexicographically, which matches numeric order for the
/// canonical big-endian encoding of non-negative integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl CompareOp {
    /// Applies the operator to an ordering of `cell` against the operand.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => matches!(ordering, Ordering::Equal),
            Self::NotEqual => !matches!(ordering, Ordering::Equal),
            Self::Less => matches!(ordering, Ordering::Less),
            Self::LessOrEqual => !matches!(ordering, Ordering::Greater),
            Self::Greater => matches!(ordering, Ordering::Greater),
            Self::GreaterOrEqual => !matches!(ordering, Ordering::Less),
        }
    }
}

/// A read predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Keep rows whose key starts with the prefix.
    RowPrefix(Bytes),

    /// Keep rows whose `(family, qualifier)` cell compares true against `value`.
    ColumnValue {
        /// Column family.
        family: String,
        /// Qualifier.
        qualifier: String,
        /// Comparison.
        op: CompareOp,
        /// Operand bytes.
        value: Bytes,
        /// Drop rows that lack the cell instead of keeping them.
        filter_if_missing: bool,
    },

    /// Keep only cells whose qualifier starts with the prefix.
    QualifierPrefix(String),

    /// Keep only cells of the family.
    Family(String),

    /// Every member must pass.
    And(Vec<Filter>),
}

impl Filter {
    /// Creates a row-prefix filter.
    pub fn row_prefix(prefix: impl Into<Bytes>) -> Self {
        Self::RowPrefix(prefix.into())
    }

    /// Creates a column value filter that keeps rows missing the cell.
    pub fn column_value(
        family: impl Into<String>,
        qualifier: impl Into<String>,
        op: CompareOp,
        value: impl Into<Bytes>,
    ) -> Self {
        Self::ColumnValue {
            family: family.into(),
            qualifier: qualifier.into(),
            op,
            value: value.into(),
            filter_if_missing: false,
        }
    }

    /// Creates a column value filter that drops rows missing the cell.
    pub fn column_value_required(
        family: impl Into<String>,
        qualifier: impl Into<String>,
        op: CompareOp,
        value: impl Into<Bytes>,
    ) -> Self {
        Self::ColumnValue {
            family: family.into(),
            qualifier: qualifier.into(),
            op,
            value: value.into(),
            filter_if_missing: true,
        }
    }

    /// Creates a qualifier-prefix filter.
    pub fn qualifier_prefix(prefix: impl Into<String>) -> Self {
        Self::QualifierPrefix(prefix.into())
    }

    /// Creates a family filter.
    pub fn family(family: impl Into<String>) -> Self {
        Self::Family(family.into())
    }

    /// Combines filters by conjunction.
    ///
    /// Nested conjunctions are flattened; a single member is returned as
    /// itself and an empty input yields `None`.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Option<Self> {
        let mut members = Vec::new();
        for filter in filters {
            match filter {
                Self::And(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        match members.len() {
            0 => None,
            1 => members.pop(),
            _ => Some(Self::And(members)),
        }
    }

    /// Returns the conjunction of `self` and `other`.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        // Non-empty input always yields a filter.
        Self::all([self, other]).unwrap_or_else(|| Self::And(Vec::new()))
    }

    /// Returns the members of a conjunction, or the filter itself.
    #[must_use]
    pub fn members(&self) -> &[Filter] {
        match self {
            Self::And(inner) => inner,
            other => std::slice::from_ref(other),
        }
    }

    /// Applies the filter, returning the (possibly trimmed) row if it passes.
    #[must_use]
    pub fn apply(&self, mut row: RowResult) -> Option<RowResult> {
        match self {
            Self::RowPrefix(prefix) => row.key.starts_with(prefix).then_some(row),
            Self::ColumnValue {
                family,
                qualifier,
                op,
                value,
                filter_if_missing,
            } => match row.column(family, qualifier) {
                Some(cell) => op
                    .accepts(cell.value.as_ref().cmp(value.as_ref()))
                    .then_some(row),
                None => (!filter_if_missing).then_some(row),
            },
            Self::QualifierPrefix(prefix) => {
                row.columns.retain(|c| c.qualifier.starts_with(prefix.as_str()));
                (!row.is_empty()).then_some(row)
            }
            Self::Family(family) => {
                row.columns.retain(|c| &c.family == family);
                (!row.is_empty()).then_some(row)
            }
            Self::And(filters) => filters.iter().try_fold(row, |row, f| f.apply(row)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widecol_common::types::{Column, RowKey};

    fn person_row() -> RowResult {
        RowResult::new(
            RowKey::from("p-1"),
            vec![
                Column::new("person", "age", vec![0, 0, 0, 42]),
                Column::new("person", "name", "Ann"),
                Column::new("addresses", "addresses#city#0", "Oslo"),
            ],
        )
    }

    #[test]
    fn test_row_prefix() {
        assert!(Filter::row_prefix("p-").apply(person_row()).is_some());
        assert!(Filter::row_prefix("q-").apply(person_row()).is_none());
    }

    #[test]
    fn test_column_value() {
        let older = Filter::column_value("person", "age", CompareOp::Greater, vec![0, 0, 0, 40]);
        assert!(older.apply(person_row()).is_some());

        let younger = Filter::column_value("person", "age", CompareOp::Less, vec![0, 0, 0, 40]);
        assert!(younger.apply(person_row()).is_none());

        let missing = Filter::column_value("person", "email", CompareOp::Equal, "x");
        assert!(missing.apply(person_row()).is_some());

        let required = Filter::column_value_required("person", "email", CompareOp::Equal, "x");
        assert!(required.apply(person_row()).is_none());
    }

    #[test]
    fn test_column_filters_trim_cells() {
        let row = Filter::family("person").apply(person_row()).unwrap();
        assert_eq!(row.columns.len(), 2);

        let row = Filter::qualifier_prefix("addresses#").apply(person_row()).unwrap();
        assert_eq!(row.columns.len(), 1);

        assert!(Filter::qualifier_prefix("zzz").apply(person_row()).is_none());
    }

    #[test]
    fn test_all_flattens() {
        let a = Filter::row_prefix("p");
        let b = Filter::family("person");
        let c = Filter::qualifier_prefix("n");

        assert_eq!(Filter::all(Vec::new()), None);
        assert_eq!(Filter::all([a.clone()]), Some(a.clone()));

        let ab = a.clone().and(b.clone());
        assert_eq!(ab, Filter::And(vec![a.clone(), b.clone()]));
        assert_eq!(ab.clone().and(c.clone()), Filter::And(vec![a, b, c]));
        assert_eq!(ab.members().len(), 2);
    }

    #[test]
    fn test_and_applies_in_order() {
        let filter = Filter::family("person").and(Filter::qualifier_prefix("na"));
        let row = filter.apply(person_row()).unwrap();
        assert_eq!(row.columns.len(), 1);
        assert_eq!(row.columns[0].qualifier, "name");
    }
}

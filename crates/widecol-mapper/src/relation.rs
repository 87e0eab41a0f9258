//! Relation markers and join rows.
//!
//! A relation is stored as a marker column in a family named after the
//! relation. The qualifier is the relation name; further targets of the same
//! relation are suffixed `#1`, `#2` and so on. The value is the target's
//! identifier bytes.
//!
//! Join rows store foreign keys of a many-to-many relation: one row per
//! owner in the join table, one column per target.

use tracing::warn;

use widecol_common::codec::ByteCodec;
use widecol_common::constants::QUALIFIER_DELIMITER;
use widecol_common::error::{WidecolError, WidecolResult};
use widecol_common::types::{Column, RowResult, Value, ValueType};

/// Targets of one relation of an entity being written.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationValue {
    /// Relation name; also its family.
    pub name: String,
    /// Target identifiers.
    pub targets: Vec<Value>,
}

impl RelationValue {
    /// Creates a relation with one target.
    pub fn new(name: impl Into<String>, target: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            targets: vec![target.into()],
        }
    }

    /// Creates a relation with several targets.
    pub fn many(name: impl Into<String>, targets: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            targets,
        }
    }
}

/// Returns the qualifier of the `n`-th target of a relation.
#[must_use]
pub fn marker_qualifier(name: &str, n: usize) -> String {
    if n == 0 {
        name.to_string()
    } else {
        format!("{name}{QUALIFIER_DELIMITER}{n}")
    }
}

/// Encodes relation markers.
///
/// Targets that encode to no bytes are skipped: they would read back as
/// absent.
pub fn encode_relations(relations: &[RelationValue], codec: &dyn ByteCodec) -> Vec<Column> {
    let mut columns = Vec::new();
    for relation in relations {
        let encoded = relation
            .targets
            .iter()
            .map(|target| codec.encode(target))
            .filter(|bytes| !bytes.is_empty());
        for (n, bytes) in encoded.enumerate() {
            columns.push(Column::new(
                relation.name.as_str(),
                marker_qualifier(&relation.name, n),
                bytes,
            ));
        }
    }
    columns
}

/// Decodes the primary marker of a relation, if present and non-empty.
pub fn decode_marker(
    row: &RowResult,
    name: &str,
    target_type: ValueType,
    codec: &dyn ByteCodec,
    type_name: &str,
) -> WidecolResult<Option<Value>> {
    let Some(column) = row.column(name, name).filter(|c| !c.is_absent()) else {
        return Ok(None);
    };
    codec
        .decode(target_type, &column.value)
        .map(Some)
        .map_err(|e| WidecolError::decode(type_name, format!("relation '{name}': {e}")))
}

/// Encodes the columns of a join row.
pub fn encode_join_row(family: &str, columns: &[(String, Value)], codec: &dyn ByteCodec) -> Vec<Column> {
    columns
        .iter()
        .map(|(qualifier, value)| (qualifier, codec.encode(value)))
        .filter(|(_, bytes)| !bytes.is_empty())
        .map(|(qualifier, bytes)| Column::new(family, qualifier.as_str(), bytes))
        .collect()
}

/// Collects the foreign keys held by a join row.
///
/// Returns every value whose column sits in `join_table`'s family and whose
/// qualifier is `inverse_join_column` or `inverse_join_column#<n>`. Values that cannot be decoded
/// as `target_type` are logged and skipped.
pub fn foreign_keys(
    row: &RowResult,
    join_table: &str,
    inverse_join_column: &str,
    target_type: ValueType,
    codec: &dyn ByteCodec,
) -> Vec<Value> {
    row.family(join_table)
        .filter(|c| names_join_column(&c.qualifier, inverse_join_column) && !c.is_absent())
        .filter_map(|c| match codec.decode(target_type, &c.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    join_table,
                    qualifier = %c.qualifier,
                    error = %e,
                    "Skipping undecodable foreign key"
                );
                None
            }
        })
        .collect()
}

fn names_join_column(qualifier: &str, column: &str) -> bool {
    match qualifier.strip_prefix(column) {
        Some(rest) => rest.is_empty() || rest.starts_with(QUALIFIER_DELIMITER),
        None => false,
    }
}

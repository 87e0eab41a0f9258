//! Entity marshalling.
//!
//! [`encode`] turns an entity into the cells of its row. [`decode`] rebuilds
//! an entity from a row returned by a get or scan.
//!
//! Row layout:
//!
//! | attribute           | family              | qualifier                    |
//! |---------------------|---------------------|------------------------------|
//! | scalar              | entity family       | storage name                 |
//! | embedded            | storage name        | member name                  |
//! | embedded collection | storage name        | `<attribute>#<member>#<n>`   |
//! | relation            | relation name       | relation name (`#n` suffix)  |
//!
//! The identifier is never stored as a cell; it is the row key. An embedded
//! collection also keeps the highest index it ever used under a qualifier
//! equal to the attribute name.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use tracing::debug;

use widecol_common::codec::ByteCodec;
use widecol_common::error::{WidecolError, WidecolResult};
use widecol_common::types::{Column, RowKey, RowResult, Value, ValueType};
use widecol_store::table::{ColumnRef, RowMutation};

use crate::collection_index::ElementCollectionIndex;
use crate::metadata::{AttributeKind, EntityDescriptor, Member, MemberValues};
use crate::qualifier::SyntheticQualifier;
use crate::relation::{decode_marker, encode_relations, RelationValue};

// =============================================================================
// Encoding
// =============================================================================

/// The cells produced for one entity, grouped by family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedRow {
    /// The row key.
    pub key: RowKey,
    /// Cells to write, by family.
    pub families: BTreeMap<String, Vec<Column>>,
    /// Stale cells to remove in the same mutation.
    pub deletes: Vec<ColumnRef>,
}

impl EncodedRow {
    fn new(key: RowKey) -> Self {
        Self {
            key,
            families: BTreeMap::new(),
            deletes: Vec::new(),
        }
    }

    fn push(&mut self, column: Column) {
        self.families.entry(column.family.clone()).or_default().push(column);
    }

    /// Returns the cells of one family.
    pub fn family(&self, family: &str) -> &[Column] {
        self.families.get(family).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the number of cells to write.
    pub fn column_count(&self) -> usize {
        self.families.values().map(Vec::len).sum()
    }

    /// Returns true if the encode produced nothing to write or delete.
    pub fn is_empty(&self) -> bool {
        self.column_count() == 0 && self.deletes.is_empty()
    }

    /// Converts into a row mutation.
    pub fn into_mutation(self) -> RowMutation {
        RowMutation {
            key: self.key,
            puts: self.families.into_values().flatten().collect(),
            deletes: self.deletes,
        }
    }
}

fn encode_value(
    codec: &dyn ByteCodec,
    type_name: &str,
    name: &str,
    declared: ValueType,
    value: &Value,
) -> WidecolResult<Option<Bytes>> {
    if value.value_type() != declared {
        return Err(WidecolError::marshal(
            type_name,
            format!("'{name}' is declared {declared} but holds {}", value.value_type()),
        ));
    }
    let bytes = codec.encode(value);
    Ok((!bytes.is_empty()).then_some(bytes))
}

fn encode_members(
    codec: &dyn ByteCodec,
    type_name: &str,
    members: &[Member],
    values: &MemberValues,
    mut qualifier: impl FnMut(&str) -> String,
    mut emit: impl FnMut(String, Bytes),
) -> WidecolResult<()> {
    for (i, value) in values {
        let member = members.get(*i).ok_or_else(|| {
            WidecolError::internal(format!("{type_name} has no member #{i}"))
        })?;
        if let Some(bytes) = encode_value(codec, type_name, &member.storage_name, member.value_type, value)? {
            emit(qualifier(&member.storage_name), bytes);
        }
    }
    Ok(())
}

/// Encodes an entity into the cells of its row.
///
/// Collection elements keep the indices recorded in `index` for this row;
/// cells of elements that disappeared since the row was read are listed in
/// [`EncodedRow::deletes`].
pub fn encode<E>(
    entity: &E,
    descriptor: &EntityDescriptor<E>,
    key: &RowKey,
    relations: &[RelationValue],
    index: &ElementCollectionIndex,
) -> WidecolResult<EncodedRow> {
    let codec = descriptor.codec();
    let type_name = descriptor.type_name();
    let mut row = EncodedRow::new(key.clone());

    for attribute in descriptor.attributes() {
        let name = attribute.storage_name();
        match attribute.kind() {
            AttributeKind::Scalar { value_type, get, .. } => {
                let Some(value) = get(entity) else { continue };
                if let Some(bytes) = encode_value(codec, type_name, name, *value_type, &value)? {
                    row.push(Column::new(descriptor.family(), name, bytes));
                }
            }
            AttributeKind::Embedded(access) => {
                let Some(values) = access.read(entity) else { continue };
                let mut cells = Vec::new();
                encode_members(
                    codec,
                    access.type_name(),
                    access.members(),
                    &values,
                    str::to_string,
                    |qualifier, bytes| cells.push(Column::new(name, qualifier, bytes)),
                )?;
                cells.into_iter().for_each(|c| row.push(c));
            }
            AttributeKind::EmbeddedCollection(access) => {
                let elements = access.read(entity);
                let identities: Vec<_> = elements.iter().map(|(id, _)| id.clone()).collect();
                let assignment = index.assign(key, name, &identities);

                let mut cells = Vec::new();
                for ((_, values), position) in elements.iter().zip(&assignment.indices) {
                    encode_members(
                        codec,
                        access.type_name(),
                        access.members(),
                        values,
                        |member| SyntheticQualifier::new(name, member, *position).encode(),
                        |qualifier, bytes| cells.push(Column::new(name, qualifier, bytes)),
                    )?;
                }
                if !cells.is_empty() {
                    cells.push(Column::new(
                        name,
                        name,
                        codec.encode(&Value::BigInt(assignment.high_water)),
                    ));
                }
                cells.into_iter().for_each(|c| row.push(c));

                for orphan in assignment.orphans {
                    for member in access.members() {
                        row.deletes.push(ColumnRef::column(
                            name,
                            SyntheticQualifier::new(name, member.storage_name.as_str(), orphan).encode(),
                        ));
                    }
                }
            }
            // Written from the relation values supplied by the caller.
            AttributeKind::Relation { .. } => {}
        }
    }

    for column in encode_relations(relations, codec) {
        row.push(column);
    }

    debug!(
        entity = type_name,
        key = ?key,
        columns = row.column_count(),
        deletes = row.deletes.len(),
        "Encoded entity"
    );
    Ok(row)
}

// =============================================================================
// Decoding
// =============================================================================

/// An entity whose relations are left for the caller to resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedEntity<E> {
    /// The decoded entity.
    pub entity: E,
    /// Row key the entity was read from.
    pub row_key: RowKey,
    /// Target identifier per relation family.
    pub relations: HashMap<String, Value>,
}

/// The result of decoding one row.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEntity<E> {
    /// An entity with no relation markers.
    Plain(E),
    /// An entity bundled with the relations found in its row.
    WithRelations(EnhancedEntity<E>),
}

impl<E> DecodedEntity<E> {
    /// Returns the entity.
    pub fn entity(&self) -> &E {
        match self {
            Self::Plain(entity) => entity,
            Self::WithRelations(enhanced) => &enhanced.entity,
        }
    }

    /// Returns the entity, dropping any relations.
    pub fn into_entity(self) -> E {
        match self {
            Self::Plain(entity) => entity,
            Self::WithRelations(enhanced) => enhanced.entity,
        }
    }

    /// Returns the relations, if the row held any.
    pub fn relations(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Plain(_) => None,
            Self::WithRelations(enhanced) => Some(&enhanced.relations),
        }
    }
}

fn decode_value(
    codec: &dyn ByteCodec,
    type_name: &str,
    name: &str,
    value_type: ValueType,
    bytes: &[u8],
) -> WidecolResult<Value> {
    codec
        .decode(value_type, bytes)
        .map_err(|e| WidecolError::decode(type_name, format!("'{name}': {e}")))
}

fn member_position(members: &[Member], name: &str) -> Option<usize> {
    members.iter().position(|m| m.storage_name == name)
}

/// Decodes one row into an entity.
///
/// Attributes named in `relation_names` are read as relation markers and
/// returned beside the entity rather than set on it. When `index` is given,
/// the decoded collection elements are recorded so that a following
/// [`encode`] keeps their indices.
pub fn decode<E>(
    row: &RowResult,
    descriptor: &EntityDescriptor<E>,
    relation_names: &[String],
    index: Option<&ElementCollectionIndex>,
) -> WidecolResult<DecodedEntity<E>> {
    let codec = descriptor.codec();
    let type_name = descriptor.type_name();

    let identifier = descriptor.identifier();
    let id = codec
        .decode_key(identifier.value_type(), &row.key)
        .map_err(|e| WidecolError::decode(type_name, format!("row key: {e}")))?;
    let mut entity = descriptor.instantiate()?;
    identifier.write(&mut entity, id)?;

    let mut relations = HashMap::new();

    for attribute in descriptor.attributes() {
        let name = attribute.storage_name();

        if relation_names.iter().any(|r| r == name) {
            let target_type = match attribute.kind() {
                AttributeKind::Relation { target_type } => *target_type,
                AttributeKind::Scalar { value_type, .. } => *value_type,
                _ => continue,
            };
            if let Some(target) = decode_marker(row, name, target_type, codec, type_name)? {
                relations.insert(name.to_string(), target);
            }
            continue;
        }

        match attribute.kind() {
            AttributeKind::Scalar { value_type, set, .. } => {
                let Some(column) = row.column(descriptor.family(), name) else { continue };
                if column.is_absent() {
                    continue;
                }
                let value = decode_value(codec, type_name, name, *value_type, &column.value)?;
                set(&mut entity, value)?;
            }
            AttributeKind::Embedded(access) => {
                let members = access.members();
                let mut values = Vec::new();
                for column in row.family(name).filter(|c| !c.is_absent()) {
                    let Some(i) = member_position(members, &column.qualifier) else { continue };
                    let member = &members[i];
                    values.push((
                        i,
                        decode_value(codec, access.type_name(), &member.storage_name, member.value_type, &column.value)?,
                    ));
                }
                if !values.is_empty() {
                    access.write(&mut entity, values)?;
                }
            }
            AttributeKind::EmbeddedCollection(access) => {
                let members = access.members();
                let prefix = SyntheticQualifier::owner_prefix(name);
                let mut high_water = None;
                let mut groups: BTreeMap<i64, MemberValues> = BTreeMap::new();

                for column in row.family(name).filter(|c| !c.is_absent()) {
                    if column.qualifier == name {
                        let mark = decode_value(codec, type_name, name, ValueType::BigInt, &column.value)?;
                        high_water = mark.as_i64();
                        continue;
                    }
                    if !column.qualifier.starts_with(&prefix) {
                        continue;
                    }
                    let qualifier = SyntheticQualifier::parse(&column.qualifier)?;
                    let Some(i) = member_position(members, &qualifier.member) else { continue };
                    let member = &members[i];
                    let value =
                        decode_value(codec, access.type_name(), &member.storage_name, member.value_type, &column.value)?;
                    groups.entry(qualifier.index).or_default().push((i, value));
                }

                let positions: Vec<i64> = groups.keys().copied().collect();
                if let Some(index) = index {
                    if let Some(mark) = high_water.or(positions.last().copied()) {
                        index.record_high_water(&row.key, name, mark);
                    }
                }
                if groups.is_empty() {
                    continue;
                }

                let identities = access.write(&mut entity, groups.into_values().collect())?;
                if let Some(index) = index {
                    for (identity, position) in identities.into_iter().zip(positions) {
                        index.record(&row.key, name, identity, position);
                    }
                }
            }
            AttributeKind::Relation { .. } => {}
        }
    }

    if relations.is_empty() {
        Ok(DecodedEntity::Plain(entity))
    } else {
        Ok(DecodedEntity::WithRelations(EnhancedEntity {
            entity,
            row_key: row.key.clone(),
            relations,
        }))
    }
}

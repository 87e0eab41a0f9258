//! Entity descriptors.
//!
//! An [`EntityDescriptor`] tells the codec how one entity type maps onto a
//! row: which attribute is the identifier, which attributes are scalars
//! stored in the entity's own family, which are embedded objects or
//! collections stored in a dedicated family, and which are relations.
//!
//! Descriptors are built once through typed accessor functions and shared
//! for the lifetime of the process; nothing is discovered at runtime.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use widecol_common::{Value, ValueType};
//! use widecol_mapper::metadata::{extract, EmbeddableDescriptor, EntityDescriptor};
//!
//! #[derive(Default)]
//! struct Phone {
//!     number: String,
//! }
//!
//! #[derive(Default)]
//! struct Person {
//!     id: String,
//!     name: Option<String>,
//!     phones: Vec<Arc<Phone>>,
//! }
//!
//! let phone = Arc::new(EmbeddableDescriptor::<Phone>::with_default("Phone").field(
//!     "number",
//!     ValueType::String,
//!     |p| Some(Value::from(p.number.as_str())),
//!     |p, v| Ok(p.number = extract(&v)?),
//! ));
//!
//! let person = EntityDescriptor::<Person>::builder_with_default("Person", "person")
//!     .id("id", ValueType::String, |p| Value::from(p.id.as_str()), |p, v| Ok(p.id = extract(&v)?))
//!     .scalar("name", ValueType::String, |p| p.name.as_deref().map(Value::from), |p, v| {
//!         Ok(p.name = Some(extract(&v)?))
//!     })
//!     .collection("phones", phone, |p| &p.phones, |p, v| p.phones = v)
//!     .relation("employer", ValueType::String)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(person.families(), vec!["person", "phones", "employer"]);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use widecol_common::codec::{ByteCodec, CanonicalCodec};
use widecol_common::constants::QUALIFIER_DELIMITER;
use widecol_common::error::{WidecolError, WidecolResult};
use widecol_common::types::{FromValue, RowKey, Value};
use widecol_common::ValueType;

use crate::collection_index::ElementIdentity;

/// Reads a field; `None` means the field is not populated.
pub type FieldGetter<T> = fn(&T) -> Option<Value>;

/// Assigns a decoded value to a field.
pub type FieldSetter<T> = fn(&mut T, Value) -> WidecolResult<()>;

/// Creates an empty instance.
pub type Constructor<T> = fn() -> WidecolResult<T>;

/// Member values of one embedded object, keyed by member position.
pub type MemberValues = Vec<(usize, Value)>;

/// Converts a decoded value into a field type.
///
/// Fails with a marshalling error when the value has the wrong shape.
pub fn extract<T: FromValue>(value: &Value) -> WidecolResult<T> {
    T::from_value(value).ok_or_else(|| {
        WidecolError::marshal(
            std::any::type_name::<T>(),
            format!("cannot assign a {} value", value.value_type()),
        )
    })
}

fn default_constructor<T: Default>() -> WidecolResult<T> {
    Ok(T::default())
}

fn check_name(kind: &str, name: &str) -> WidecolResult<()> {
    if name.is_empty() {
        return Err(WidecolError::invalid_argument(format!("{kind} name must not be empty")));
    }
    if name.contains(QUALIFIER_DELIMITER) {
        return Err(WidecolError::invalid_argument(format!(
            "{kind} name '{name}' must not contain '{QUALIFIER_DELIMITER}'"
        )));
    }
    Ok(())
}

// =============================================================================
// Embeddables
// =============================================================================

/// Storage name and type of one embeddable member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Qualifier the member is stored under.
    pub storage_name: String,
    /// Declared value type.
    pub value_type: ValueType,
}

/// Describes an embeddable value type.
pub struct EmbeddableDescriptor<T> {
    type_name: &'static str,
    construct: Constructor<T>,
    members: Vec<Member>,
    accessors: Vec<(FieldGetter<T>, FieldSetter<T>)>,
}

impl<T> EmbeddableDescriptor<T> {
    /// Creates a descriptor with an explicit constructor.
    pub fn new(type_name: &'static str, construct: Constructor<T>) -> Self {
        Self {
            type_name,
            construct,
            members: Vec::new(),
            accessors: Vec::new(),
        }
    }

    /// Adds a member.
    pub fn field(
        mut self,
        storage_name: impl Into<String>,
        value_type: ValueType,
        get: FieldGetter<T>,
        set: FieldSetter<T>,
    ) -> Self {
        self.members.push(Member {
            storage_name: storage_name.into(),
            value_type,
        });
        self.accessors.push((get, set));
        self
    }

    /// Returns the type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the members in declaration order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Returns the populated members of `object`.
    pub fn read(&self, object: &T) -> MemberValues {
        self.accessors
            .iter()
            .enumerate()
            .filter_map(|(i, (get, _))| get(object).map(|v| (i, v)))
            .collect()
    }

    /// Builds an object from member values.
    pub fn build(&self, values: MemberValues) -> WidecolResult<T> {
        let mut object = (self.construct)().map_err(|e| self.marshal_error(e))?;
        for (i, value) in values {
            let (_, set) = self.accessors.get(i).ok_or_else(|| {
                WidecolError::internal(format!("{} has no member #{i}", self.type_name))
            })?;
            set(&mut object, value).map_err(|e| self.marshal_error(e))?;
        }
        Ok(object)
    }

    fn marshal_error(&self, e: WidecolError) -> WidecolError {
        match e {
            e @ WidecolError::Marshal { .. } => e,
            other => WidecolError::marshal(self.type_name, other.to_string()),
        }
    }
}

impl<T: Default> EmbeddableDescriptor<T> {
    /// Creates a descriptor constructing instances with `T::default()`.
    pub fn with_default(type_name: &'static str) -> Self {
        Self::new(type_name, default_constructor::<T>)
    }
}

impl<T> fmt::Debug for EmbeddableDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddableDescriptor")
            .field("type_name", &self.type_name)
            .field("members", &self.members)
            .finish()
    }
}

/// Type-erased access to a singular embedded attribute.
pub trait EmbeddedAccess<E>: Send + Sync {
    /// Returns the embeddable's type name.
    fn type_name(&self) -> &'static str;

    /// Returns the embeddable's members.
    fn members(&self) -> &[Member];

    /// Returns the populated members, or `None` if the attribute is absent.
    fn read(&self, entity: &E) -> Option<MemberValues>;

    /// Builds the embedded object and assigns it to the entity.
    fn write(&self, entity: &mut E, values: MemberValues) -> WidecolResult<()>;
}

/// Type-erased access to an embedded collection attribute.
pub trait CollectionAccess<E>: Send + Sync {
    /// Returns the element type name.
    fn type_name(&self) -> &'static str;

    /// Returns the element members.
    fn members(&self) -> &[Member];

    /// Returns each element's identity and populated members, in order.
    fn read(&self, entity: &E) -> Vec<(ElementIdentity, MemberValues)>;

    /// Builds the elements, assigns the collection and returns the new
    /// elements' identities in order.
    fn write(&self, entity: &mut E, elements: Vec<MemberValues>) -> WidecolResult<Vec<ElementIdentity>>;
}

struct SingularEmbedded<E, T> {
    embeddable: Arc<EmbeddableDescriptor<T>>,
    get: fn(&E) -> Option<&T>,
    set: fn(&mut E, T),
}

impl<E, T> EmbeddedAccess<E> for SingularEmbedded<E, T>
where
    E: 'static,
    T: Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        self.embeddable.type_name()
    }

    fn members(&self) -> &[Member] {
        self.embeddable.members()
    }

    fn read(&self, entity: &E) -> Option<MemberValues> {
        (self.get)(entity).map(|object| self.embeddable.read(object))
    }

    fn write(&self, entity: &mut E, values: MemberValues) -> WidecolResult<()> {
        let object = self.embeddable.build(values)?;
        (self.set)(entity, object);
        Ok(())
    }
}

struct EmbeddedCollection<E, T> {
    embeddable: Arc<EmbeddableDescriptor<T>>,
    get: fn(&E) -> &[Arc<T>],
    set: fn(&mut E, Vec<Arc<T>>),
}

impl<E, T> CollectionAccess<E> for EmbeddedCollection<E, T>
where
    E: 'static,
    T: Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        self.embeddable.type_name()
    }

    fn members(&self) -> &[Member] {
        self.embeddable.members()
    }

    fn read(&self, entity: &E) -> Vec<(ElementIdentity, MemberValues)> {
        (self.get)(entity)
            .iter()
            .map(|element| (ElementIdentity::of(element), self.embeddable.read(element)))
            .collect()
    }

    fn write(&self, entity: &mut E, elements: Vec<MemberValues>) -> WidecolResult<Vec<ElementIdentity>> {
        let elements = elements
            .into_iter()
            .map(|values| self.embeddable.build(values).map(Arc::new))
            .collect::<WidecolResult<Vec<_>>>()?;
        let identities = elements.iter().map(ElementIdentity::of).collect();
        (self.set)(entity, elements);
        Ok(identities)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// How an attribute is stored.
pub enum AttributeKind<E> {
    /// A single value in the entity's default family.
    Scalar {
        /// Declared value type.
        value_type: ValueType,
        /// Field reader.
        get: FieldGetter<E>,
        /// Field writer.
        set: FieldSetter<E>,
    },

    /// One embedded object in a dedicated family.
    Embedded(Arc<dyn EmbeddedAccess<E>>),

    /// Repeated embedded objects in a dedicated family under synthetic
    /// qualifiers.
    EmbeddedCollection(Arc<dyn CollectionAccess<E>>),

    /// A reference to another entity, stored as a marker column.
    Relation {
        /// Value type of the target's identifier.
        target_type: ValueType,
    },
}

impl<E> fmt::Debug for AttributeKind<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar { value_type, .. } => write!(f, "Scalar({value_type})"),
            Self::Embedded(access) => write!(f, "Embedded({})", access.type_name()),
            Self::EmbeddedCollection(access) => write!(f, "EmbeddedCollection({})", access.type_name()),
            Self::Relation { target_type } => write!(f, "Relation({target_type})"),
        }
    }
}

/// One non-identifier attribute.
pub struct Attribute<E> {
    storage_name: String,
    kind: AttributeKind<E>,
}

impl<E> fmt::Debug for Attribute<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("storage_name", &self.storage_name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<E> Attribute<E> {
    /// Returns the storage name: the qualifier of a scalar, the family of
    /// an embedded attribute or relation.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Returns the attribute kind.
    pub fn kind(&self) -> &AttributeKind<E> {
        &self.kind
    }
}

/// The identifier attribute.
pub struct Identifier<E> {
    storage_name: String,
    value_type: ValueType,
    get: fn(&E) -> Value,
    set: FieldSetter<E>,
}

impl<E> Identifier<E> {
    /// Returns the storage name.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Returns the identifier's value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Reads the identifier of an entity.
    pub fn read(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    /// Assigns the identifier of an entity.
    pub fn write(&self, entity: &mut E, value: Value) -> WidecolResult<()> {
        (self.set)(entity, value)
    }
}

impl<E> fmt::Debug for Identifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identifier")
            .field("storage_name", &self.storage_name)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Maps one entity type onto rows of a table.
pub struct EntityDescriptor<E> {
    type_name: &'static str,
    family: String,
    construct: Constructor<E>,
    identifier: Identifier<E>,
    attributes: Vec<Attribute<E>>,
    codec: Arc<dyn ByteCodec>,
}

impl<E: 'static> EntityDescriptor<E> {
    /// Starts a descriptor for `type_name` whose scalars live in `family`.
    pub fn builder(
        type_name: &'static str,
        family: impl Into<String>,
        construct: Constructor<E>,
    ) -> EntityDescriptorBuilder<E> {
        EntityDescriptorBuilder {
            type_name,
            family: family.into(),
            construct,
            identifier: None,
            attributes: Vec::new(),
            codec: None,
        }
    }

    /// Starts a descriptor constructing instances with `E::default()`.
    pub fn builder_with_default(type_name: &'static str, family: impl Into<String>) -> EntityDescriptorBuilder<E>
    where
        E: Default,
    {
        Self::builder(type_name, family, default_constructor::<E>)
    }
}

impl<E> EntityDescriptor<E> {
    /// Returns the entity type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the default family holding scalar attributes.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Returns the identifier attribute.
    pub fn identifier(&self) -> &Identifier<E> {
        &self.identifier
    }

    /// Returns the attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute<E>] {
        &self.attributes
    }

    /// Looks up an attribute by storage name.
    pub fn attribute(&self, storage_name: &str) -> Option<&Attribute<E>> {
        self.attributes.iter().find(|a| a.storage_name == storage_name)
    }

    /// Returns the names of declared relations.
    pub fn relation_names(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| matches!(a.kind, AttributeKind::Relation { .. }))
            .map(|a| a.storage_name.clone())
            .collect()
    }

    /// Returns every family rows of this entity may use, default first.
    pub fn families(&self) -> Vec<String> {
        let mut families = vec![self.family.clone()];
        families.extend(
            self.attributes
                .iter()
                .filter(|a| !matches!(a.kind, AttributeKind::Scalar { .. }))
                .map(|a| a.storage_name.clone()),
        );
        families
    }

    /// Returns the byte codec for identifiers and values.
    pub fn codec(&self) -> &dyn ByteCodec {
        self.codec.as_ref()
    }

    /// Creates an empty entity.
    pub fn instantiate(&self) -> WidecolResult<E> {
        (self.construct)().map_err(|e| match e {
            e @ WidecolError::Marshal { .. } => e,
            other => WidecolError::marshal(self.type_name, other.to_string()),
        })
    }

    /// Encodes an identifier value as a row key.
    pub fn row_key(&self, id: &Value) -> WidecolResult<RowKey> {
        if id.value_type() != self.identifier.value_type {
            return Err(WidecolError::invalid_argument(format!(
                "{} identifier is {}, got {}",
                self.type_name,
                self.identifier.value_type,
                id.value_type()
            )));
        }
        Ok(self.codec.encode_key(id))
    }

    /// Returns the row key of an entity.
    pub fn row_key_of(&self, entity: &E) -> WidecolResult<RowKey> {
        self.row_key(&self.identifier.read(entity))
    }
}

impl<E> fmt::Debug for EntityDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("family", &self.family)
            .field("identifier", &self.identifier)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// Builder for [`EntityDescriptor`].
pub struct EntityDescriptorBuilder<E> {
    type_name: &'static str,
    family: String,
    construct: Constructor<E>,
    identifier: Option<Identifier<E>>,
    attributes: Vec<Attribute<E>>,
    codec: Option<Arc<dyn ByteCodec>>,
}

impl<E: 'static> EntityDescriptorBuilder<E> {
    /// Declares the identifier attribute.
    pub fn id(
        mut self,
        storage_name: impl Into<String>,
        value_type: ValueType,
        get: fn(&E) -> Value,
        set: FieldSetter<E>,
    ) -> Self {
        self.identifier = Some(Identifier {
            storage_name: storage_name.into(),
            value_type,
            get,
            set,
        });
        self
    }

    /// Declares a scalar attribute.
    pub fn scalar(
        mut self,
        storage_name: impl Into<String>,
        value_type: ValueType,
        get: FieldGetter<E>,
        set: FieldSetter<E>,
    ) -> Self {
        self.attributes.push(Attribute {
            storage_name: storage_name.into(),
            kind: AttributeKind::Scalar { value_type, get, set },
        });
        self
    }

    /// Declares a singular embedded attribute.
    pub fn embedded<T: Send + Sync + 'static>(
        mut self,
        storage_name: impl Into<String>,
        embeddable: Arc<EmbeddableDescriptor<T>>,
        get: fn(&E) -> Option<&T>,
        set: fn(&mut E, T),
    ) -> Self {
        self.attributes.push(Attribute {
            storage_name: storage_name.into(),
            kind: AttributeKind::Embedded(Arc::new(SingularEmbedded { embeddable, get, set })),
        });
        self
    }

    /// Declares an embedded collection attribute.
    pub fn collection<T: Send + Sync + 'static>(
        mut self,
        storage_name: impl Into<String>,
        embeddable: Arc<EmbeddableDescriptor<T>>,
        get: fn(&E) -> &[Arc<T>],
        set: fn(&mut E, Vec<Arc<T>>),
    ) -> Self {
        self.attributes.push(Attribute {
            storage_name: storage_name.into(),
            kind: AttributeKind::EmbeddedCollection(Arc::new(EmbeddedCollection { embeddable, get, set })),
        });
        self
    }

    /// Declares a relation whose target identifier has `target_type`.
    pub fn relation(mut self, name: impl Into<String>, target_type: ValueType) -> Self {
        self.attributes.push(Attribute {
            storage_name: name.into(),
            kind: AttributeKind::Relation { target_type },
        });
        self
    }

    /// Sets the byte codec. Defaults to [`CanonicalCodec`].
    pub fn codec(mut self, codec: Arc<dyn ByteCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Validates and builds the descriptor.
    pub fn build(self) -> WidecolResult<EntityDescriptor<E>> {
        let identifier = self.identifier.ok_or_else(|| {
            WidecolError::invalid_argument(format!("{} has no identifier attribute", self.type_name))
        })?;
        check_name("family", &self.family)?;
        check_name("identifier", &identifier.storage_name)?;

        let mut seen = HashSet::new();
        seen.insert(identifier.storage_name.as_str());
        for attribute in &self.attributes {
            check_name("attribute", &attribute.storage_name)?;
            if !seen.insert(attribute.storage_name.as_str()) {
                return Err(WidecolError::invalid_argument(format!(
                    "{} declares attribute '{}' twice",
                    self.type_name, attribute.storage_name
                )));
            }
            let members = match &attribute.kind {
                AttributeKind::Scalar { .. } => continue,
                AttributeKind::Relation { .. } => None,
                AttributeKind::Embedded(access) => Some(access.members()),
                AttributeKind::EmbeddedCollection(access) => Some(access.members()),
            };
            if attribute.storage_name == self.family {
                return Err(WidecolError::invalid_argument(format!(
                    "attribute '{}' would share the default family",
                    attribute.storage_name
                )));
            }
            if let Some(members) = members {
                let mut names = HashSet::new();
                for member in members {
                    check_name("member", &member.storage_name)?;
                    if !names.insert(member.storage_name.as_str()) {
                        return Err(WidecolError::invalid_argument(format!(
                            "attribute '{}' declares member '{}' twice",
                            attribute.storage_name, member.storage_name
                        )));
                    }
                }
            }
        }

        Ok(EntityDescriptor {
            type_name: self.type_name,
            family: self.family,
            construct: self.construct,
            identifier,
            attributes: self.attributes,
            codec: self
                .codec
                .unwrap_or_else(|| Arc::new(CanonicalCodec::new())),
        })
    }
}

//! Engine-agnostic document model.
//!
//! A [`Record`] is an ordered list of [`Field`]s. Domain entities describe how
//! they map onto fields with a static [`FieldSpec`] table (see [`Indexable`]),
//! and [`to_record`]/[`from_record`] do the conversion generically.
//!
//! Conversion to the engine representation maps `tokenizable` onto the field
//! kind and `persistent` onto the stored flag. Every field is indexed. On the
//! way back `searchable` is set from the engine's indexed flag; it is a
//! read-side attribute and is not carried through storage. Engines never return
//! unstored fields, so only persistent fields survive a store/search cycle.

use crate::engine::{EngineDocument, EngineField, FieldKind};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    value: String,
    /// Stored and retrievable.
    pub persistent: bool,
    /// Analyzed into tokens instead of kept as one term.
    pub tokenizable: bool,
    /// Used when a by-example query does not name a field.
    pub default_field: bool,
    /// Participates in by-example queries; set on read for indexed fields.
    pub searchable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            persistent: false,
            tokenizable: false,
            default_field: false,
            searchable: false,
        }
    }

    pub fn with_flags(
        name: impl Into<String>,
        value: impl Into<String>,
        persistent: bool,
        tokenizable: bool,
        default_field: bool,
    ) -> Self {
        Self {
            persistent,
            tokenizable,
            default_field,
            ..Self::new(name, value)
        }
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> FieldKind {
        if self.tokenizable {
            FieldKind::Tokenized
        } else {
            FieldKind::Atomic
        }
    }
}

/// One catalog entry in generic form.
///
/// Field names may repeat. `internal_id` is assigned by the store when the
/// record is read back and means nothing before that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
    internal_id: Option<u64>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn with(mut self, field: Field) -> Self {
        self.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    /// First field called `name`.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(Field::value)
    }

    /// Removes every field called `name`, returning how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|f| f.name != name);
        before - self.fields.len()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn internal_id(&self) -> Option<u64> {
        self.internal_id
    }

    pub fn set_internal_id(&mut self, id: u64) {
        self.internal_id = Some(id);
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

pub fn to_engine_document(record: &Record) -> Result<EngineDocument, EngineError> {
    let mut doc = EngineDocument::default();
    for field in record {
        if field.name.is_empty() {
            return Err(EngineError::InvalidField(format!(
                "empty field name (value {:?})",
                field.value
            )));
        }
        doc.add(EngineField {
            name: field.name.clone(),
            value: field.value.clone(),
            stored: field.persistent,
            indexed: true,
            kind: field.kind(),
        });
    }
    Ok(doc)
}

pub fn from_engine_document(doc: &EngineDocument) -> Record {
    let mut record = Record::new();
    for f in &doc.fields {
        record.push(Field {
            name: f.name.clone(),
            value: f.value.clone(),
            persistent: f.stored,
            tokenizable: f.kind == FieldKind::Tokenized,
            default_field: false,
            searchable: f.indexed,
        });
    }
    record
}

/// Declarative mapping of one entity attribute onto a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub searchable: bool,
    pub persistent: bool,
    pub tokenizable: bool,
    pub default_field: bool,
}

impl FieldSpec {
    /// Searchable, stored, single-term attribute.
    pub const fn keyword(name: &'static str) -> Self {
        Self {
            name,
            searchable: true,
            persistent: true,
            tokenizable: false,
            default_field: false,
        }
    }

    pub const fn default_field(mut self) -> Self {
        self.default_field = true;
        self
    }

    pub fn field(&self, value: impl Into<String>) -> Field {
        Field::with_flags(
            self.name,
            value,
            self.persistent,
            self.tokenizable,
            self.default_field,
        )
        .searchable(self.searchable)
    }
}

/// An entity that maps onto a [`Record`] through a field table.
pub trait Indexable: Default {
    const FIELDS: &'static [FieldSpec];

    /// Value of the attribute behind `name`; `None` leaves the field out.
    fn read_field(&self, name: &str) -> Option<String>;

    fn write_field(&mut self, name: &str, value: String);

    fn set_internal_id(&mut self, _id: Option<u64>) {}

    /// Called once after every field has been written back.
    fn finish(&mut self) {}

    fn default_field_name() -> Option<&'static str> {
        Self::FIELDS.iter().find(|s| s.default_field).map(|s| s.name)
    }
}

pub fn to_record<T: Indexable>(entity: &T) -> Record {
    let mut record = Record::new();
    for spec in T::FIELDS {
        if let Some(value) = entity.read_field(spec.name) {
            record.push(spec.field(value));
        }
    }
    record
}

pub fn from_record<T: Indexable>(record: &Record) -> T {
    let mut entity = T::default();
    for field in record {
        if T::FIELDS.iter().any(|s| s.name == field.name) {
            entity.write_field(&field.name, field.value.clone());
        }
    }
    entity.set_internal_id(record.internal_id);
    entity.finish();
    entity
}

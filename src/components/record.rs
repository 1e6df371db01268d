//! Pipeline records
//!
//! Records are owned by the dataflow framework. The layout only holds shared handles
//! to them and writes its output fields in place.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::value_objects::RecordId;

/// Value stored in a record field
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Plain data
    Value(Value),
    /// Reference to another record, used for resolved link endpoints
    Record(Record),
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Value(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Value(Value::from(value))
    }
}

impl From<Record> for Field {
    fn from(record: Record) -> Self {
        Field::Record(record)
    }
}

/// Shared handle to an identity-bearing record with mutable named fields
#[derive(Clone)]
pub struct Record {
    id: RecordId,
    fields: Arc<RwLock<IndexMap<String, Field>>>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Build a record from the members of a JSON object; other JSON values are stored
    /// under a single `data` field
    pub fn from_json(id: RecordId, value: Value) -> Self {
        let record = Self::new(id);
        match value {
            Value::Object(members) => {
                let mut fields = record.fields.write();
                for (name, member) in members {
                    fields.insert(name, Field::Value(member));
                }
            }
            other => record.set("data", other),
        }
        record
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn get(&self, name: &str) -> Option<Field> {
        self.fields.read().get(name).cloned()
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.fields.read().get(name) {
            Some(Field::Value(value)) => value.as_f64(),
            _ => None,
        }
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.fields.read().get(name) {
            Some(Field::Value(value)) => value.as_u64(),
            _ => None,
        }
    }

    pub fn get_record(&self, name: &str) -> Option<Record> {
        match self.fields.read().get(name) {
            Some(Field::Record(record)) => Some(record.clone()),
            _ => None,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }

    /// Set a field in place; every holder of this record observes the change
    pub fn set(&self, name: &str, value: impl Into<Field>) {
        self.fields.write().insert(name.to_string(), value.into());
    }

    /// Whether both handles point at the same underlying record
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }

    /// Render the record as a JSON object. Referenced records are rendered by id.
    pub fn to_json(&self) -> Value {
        let fields = self.fields.read();
        let mut object = serde_json::Map::with_capacity(fields.len() + 1);
        object.insert("_id".to_string(), Value::from(self.id.get()));
        for (name, field) in fields.iter() {
            let value = match field {
                Field::Value(value) => value.clone(),
                Field::Record(record) => Value::from(record.id().get()),
            };
            object.insert(name.clone(), value);
        }
        Value::Object(object)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Record {
    // Field values may reference other records; only names are printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.read();
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("fields", &fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

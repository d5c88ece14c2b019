use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::name::Name;
use crate::schema::class::Class;

/// A reference to a schema object by name and class, without an owning
/// pointer. Back-references from refs to their referrers are stored as
/// shells so that snapshots stay acyclic; dereferencing goes through the
/// schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectShell {
    pub name: Name,
    pub class: Class,
}

impl ObjectShell {
    pub fn new(name: Name, class: Class) -> Self {
        ObjectShell { name, class }
    }
}

/// A field value as stored on an object or carried by a command.
///
/// Snapshots store object references by id (`Object`/`ObjectList`); command
/// attributes may instead carry shells (`Shell`/`ShellList`), which are
/// resolved against the schema at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Str(String),
    Name(Name),
    Object(Uuid),
    ObjectList(Vec<Uuid>),
    Shell(ObjectShell),
    ShellList(Vec<ObjectShell>),
    /// An ordered ref collection, keyed by the refs' short names.
    RefCollection(IndexMap<String, Uuid>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Uuid> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_object_list(&self) -> Option<&[Uuid]> {
        match self {
            Value::ObjectList(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&IndexMap<String, Uuid>> {
        match self {
            Value::RefCollection(coll) => Some(coll),
            _ => None,
        }
    }

    /// Ids of all objects this value refers to.
    pub fn ref_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        let ids: Vec<Uuid> = match self {
            Value::Object(id) => vec![*id],
            Value::ObjectList(ids) => ids.clone(),
            Value::RefCollection(coll) => coll.values().copied().collect(),
            _ => Vec::new(),
        };
        ids.into_iter()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<Name> for Value {
    fn from(value: Name) -> Self {
        Value::Name(value)
    }
}

impl From<ObjectShell> for Value {
    fn from(value: ObjectShell) -> Self {
        Value::Shell(value)
    }
}

use im::{OrdMap, OrdSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DeltaError, InvariantViolation, SchemaError};
use crate::name::Name;
use crate::schema::object::{Object, ObjectData};
use crate::schema::value::Value;

pub mod class;
pub mod object;
pub mod value;

/// Modules that exist implicitly in every schema.
const SPECIAL_MODULES: &[&str] = &["std", "__derived__"];

/// An immutable schema snapshot. All mutators return a new snapshot; the
/// underlying maps share structure, so tentative intra-command applies are
/// cheap and rollback is simply dropping the new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    modules: OrdSet<String>,
    id_to_data: OrdMap<Uuid, ObjectData>,
    name_to_id: OrdMap<Name, Uuid>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains(name) || SPECIAL_MODULES.contains(&name)
    }

    pub fn add_module(&self, name: impl Into<String>) -> Schema {
        let mut next = self.clone();
        next.modules.insert(name.into());
        next
    }

    pub fn get(&self, name: &Name) -> Option<Object> {
        let id = *self.name_to_id.get(name)?;
        self.get_by_id(id)
    }

    pub fn get_or_err(&self, name: &Name) -> Result<Object, DeltaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::new(format!("{name} does not exist")).into())
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<Object> {
        let data = self.id_to_data.get(&id)?;
        Some(Object::new(data.class, id))
    }

    pub(crate) fn data(&self, id: Uuid) -> Option<&ObjectData> {
        self.id_to_data.get(&id)
    }

    pub fn field(&self, obj: Object, field: &str) -> Option<&Value> {
        let value = self.id_to_data.get(&obj.id)?.fields.get(field)?;
        match value {
            Value::None => None,
            _ => Some(value),
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = Object> + '_ {
        self.id_to_data
            .iter()
            .map(|(id, data)| Object::new(data.class, *id))
    }

    pub fn object_count(&self) -> usize {
        self.id_to_data.len()
    }

    /// Adds a fully-formed object under the given id. The data must carry a
    /// `name` field; the name and the id must both be free.
    pub fn add_object(&self, id: Uuid, data: ObjectData) -> Result<Schema, DeltaError> {
        let name = data
            .name()
            .cloned()
            .ok_or_else(|| InvariantViolation::new("object data carries no name"))?;

        if !self.has_module(&name.module) {
            return Err(SchemaError::new(format!(
                "module '{}' is not in this schema",
                name.module,
            ))
            .into());
        }
        if let Some(existing) = self.get(&name) {
            return Err(SchemaError::new(format!(
                "{} {name} already exists",
                existing.class.display_name(),
            ))
            .into());
        }
        if self.id_to_data.contains_key(&id) {
            return Err(InvariantViolation::new(format!(
                "object {id} is already present in the schema",
            ))
            .into());
        }

        let mut next = self.clone();
        next.name_to_id.insert(name, id);
        next.id_to_data.insert(id, data);
        Ok(next)
    }

    pub fn delete_object(&self, obj: Object) -> Result<Schema, DeltaError> {
        let data = obj.expect_data(self)?;
        let name = data
            .name()
            .cloned()
            .ok_or_else(|| InvariantViolation::new("object data carries no name"))?;

        let mut next = self.clone();
        next.name_to_id.remove(&name);
        next.id_to_data.remove(&obj.id);
        Ok(next)
    }

    /// Sets a locally-defined field value. Name changes re-index the
    /// object; the new name must be free.
    pub fn set_field(
        &self,
        obj: Object,
        field: &str,
        value: Value,
    ) -> Result<Schema, DeltaError> {
        self.set_field_impl(obj, field, value, false)
    }

    /// Sets a field value produced by inheritance.
    pub(crate) fn set_field_inherited(
        &self,
        obj: Object,
        field: &str,
        value: Value,
    ) -> Result<Schema, DeltaError> {
        self.set_field_impl(obj, field, value, true)
    }

    fn set_field_impl(
        &self,
        obj: Object,
        field: &str,
        value: Value,
        inherited: bool,
    ) -> Result<Schema, DeltaError> {
        let data = obj.expect_data(self)?;

        let mut next = self.clone();
        if field == "name" {
            let old_name = data.name().cloned();
            let new_name = value.as_name().cloned().ok_or_else(|| {
                InvariantViolation::new("name field must hold a Name value")
            })?;
            if !self.has_module(&new_name.module) {
                return Err(SchemaError::new(format!(
                    "module '{}' is not in this schema",
                    new_name.module,
                ))
                .into());
            }
            if let Some(other) = self.name_to_id.get(&new_name) {
                if *other != obj.id {
                    return Err(
                        SchemaError::new(format!("{new_name} already exists")).into()
                    );
                }
            }
            if let Some(old_name) = old_name {
                next.name_to_id.remove(&old_name);
            }
            next.name_to_id.insert(new_name, obj.id);
        }

        let mut data = data.clone();
        data.fields.insert(field.to_owned(), value);
        if inherited {
            data.inherited_fields.insert(field.to_owned());
        } else {
            data.inherited_fields.shift_remove(field);
        }
        next.id_to_data.insert(obj.id, data);
        Ok(next)
    }

    pub fn unset_field(&self, obj: Object, field: &str) -> Result<Schema, DeltaError> {
        let data = obj.expect_data(self)?;
        if !data.fields.contains_key(field) {
            return Ok(self.clone());
        }

        let mut data = data.clone();
        data.fields.shift_remove(field);
        data.inherited_fields.shift_remove(field);

        let mut next = self.clone();
        next.id_to_data.insert(obj.id, data);
        Ok(next)
    }

    /// Adds a ref to the referrer's collection slot, keyed by the ref's
    /// short name.
    pub fn add_classref(
        &self,
        referrer: Object,
        attr: &str,
        ref_obj: Object,
    ) -> Result<Schema, DeltaError> {
        let key = ref_obj.shortname(self);
        let mut coll = self
            .field(referrer, attr)
            .and_then(Value::as_collection)
            .cloned()
            .unwrap_or_default();
        coll.insert(key, ref_obj.id);
        self.set_field(referrer, attr, Value::RefCollection(coll))
    }

    pub fn del_classref(
        &self,
        referrer: Object,
        attr: &str,
        key: &str,
    ) -> Result<Schema, DeltaError> {
        let mut coll = self
            .field(referrer, attr)
            .and_then(Value::as_collection)
            .cloned()
            .unwrap_or_default();
        coll.shift_remove(key);
        if coll.is_empty() {
            return self.unset_field(referrer, attr);
        }
        self.set_field(referrer, attr, Value::RefCollection(coll))
    }

    /// Re-keys one entry of a referrer's collection after a ref rename.
    pub(crate) fn rename_classref(
        &self,
        referrer: Object,
        attr: &str,
        old_key: &str,
        new_key: &str,
    ) -> Result<Schema, DeltaError> {
        let mut coll = self
            .field(referrer, attr)
            .and_then(Value::as_collection)
            .cloned()
            .unwrap_or_default();
        if let Some(id) = coll.shift_remove(old_key) {
            coll.insert(new_key.to_owned(), id);
        }
        self.set_field(referrer, attr, Value::RefCollection(coll))
    }

    /// Resolves a shell to the live object it names.
    pub fn resolve_shell(
        &self,
        shell: &crate::schema::value::ObjectShell,
    ) -> Result<Object, DeltaError> {
        self.get_or_err(&shell.name)
    }
}

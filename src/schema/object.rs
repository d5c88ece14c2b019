use indexmap::{IndexMap, IndexSet};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DeltaError, InvariantViolation};
use crate::name::Name;
use crate::schema::class::{Class, RefDict};
use crate::schema::value::Value;
use crate::schema::Schema;

/// The stored state of one schema object: its class, its field values, and
/// which of those values are currently produced by inheritance rather than
/// set locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectData {
    pub class: Class,
    pub fields: IndexMap<String, Value>,
    pub inherited_fields: IndexSet<String>,
}

impl ObjectData {
    pub fn new(class: Class) -> Self {
        ObjectData {
            class,
            fields: IndexMap::new(),
            inherited_fields: IndexSet::new(),
        }
    }

    pub fn name(&self) -> Option<&Name> {
        self.fields.get("name").and_then(Value::as_name)
    }
}

/// A lightweight handle to an object within some schema snapshot. All
/// accessors take the snapshot explicitly; the handle itself stays valid
/// across snapshots as long as the id survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    pub class: Class,
    pub id: Uuid,
}

impl Object {
    pub fn new(class: Class, id: Uuid) -> Self {
        Object { class, id }
    }

    pub fn name(&self, schema: &Schema) -> Name {
        schema
            .data(self.id)
            .and_then(ObjectData::name)
            .cloned()
            .unwrap_or_else(|| Name::new("__unknown__", "__unknown__"))
    }

    pub fn shortname(&self, schema: &Schema) -> String {
        self.name(schema).shortname()
    }

    pub fn field<'a>(&self, schema: &'a Schema, field: &str) -> Option<&'a Value> {
        schema.field(*self, field)
    }

    fn bool_field(&self, schema: &Schema, field: &str) -> bool {
        self.field(schema, field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_owned(&self, schema: &Schema) -> bool {
        self.bool_field(schema, "is_owned")
    }

    pub fn is_final(&self, schema: &Schema) -> bool {
        self.bool_field(schema, "is_final")
    }

    pub fn is_abstract(&self, schema: &Schema) -> bool {
        self.bool_field(schema, "is_abstract")
    }

    pub fn is_derived(&self, schema: &Schema) -> bool {
        self.bool_field(schema, "is_derived")
    }

    /// Whether this is a generic object: one whose name is not specialized
    /// to any referrer. Generic objects are what explicit bases refer to.
    pub fn generic(&self, schema: &Schema) -> bool {
        !self.name(schema).is_qualified()
    }

    /// Whether a field's current value is produced by inheritance rather
    /// than a local definition.
    pub fn is_field_inherited(&self, schema: &Schema, field: &str) -> bool {
        schema
            .data(self.id)
            .is_some_and(|data| data.inherited_fields.contains(field))
    }

    pub fn bases(&self, schema: &Schema) -> Vec<Object> {
        self.object_list(schema, "bases")
    }

    pub fn ancestors(&self, schema: &Schema) -> Vec<Object> {
        self.object_list(schema, "ancestors")
    }

    fn object_list(&self, schema: &Schema, field: &str) -> Vec<Object> {
        self.field(schema, field)
            .and_then(Value::as_object_list)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| schema.get_by_id(*id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Bases that come from the referrer's own inheritance rather than the
    /// user's DDL.
    pub fn implicit_bases(&self, schema: &Schema) -> Vec<Object> {
        self.bases(schema)
            .into_iter()
            .filter(|b| !b.generic(schema))
            .collect()
    }

    /// The referrer this object is scoped to, if it is a referenced object.
    pub fn get_referrer(&self, schema: &Schema) -> Option<Object> {
        let attr = self.class.backref_attr()?;
        let id = self.field(schema, attr)?.as_object()?;
        schema.get_by_id(id)
    }

    /// The refs in one of this object's collection slots, in collection
    /// order.
    pub fn refs(&self, schema: &Schema, attr: &str) -> Vec<(String, Object)> {
        self.field(schema, attr)
            .and_then(Value::as_collection)
            .map(|coll| {
                coll.iter()
                    .filter_map(|(key, id)| {
                        schema.get_by_id(*id).map(|obj| (key.clone(), obj))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_ref(&self, schema: &Schema, attr: &str, key: &str) -> Option<Object> {
        let coll = self.field(schema, attr)?.as_collection()?;
        schema.get_by_id(*coll.get(key)?)
    }

    /// Objects that list this one among their bases.
    pub fn children(&self, schema: &Schema) -> Vec<Object> {
        schema
            .objects()
            .filter(|obj| {
                obj.field(schema, "bases")
                    .and_then(Value::as_object_list)
                    .is_some_and(|ids| ids.contains(&self.id))
            })
            .collect()
    }

    /// All transitive inheritors of this object, parents before children.
    pub fn ordered_descendants(&self, schema: &Schema) -> Vec<Object> {
        let members: Vec<Object> = std::iter::once(*self)
            .chain(schema.objects().filter(|obj| {
                obj.field(schema, "ancestors")
                    .and_then(Value::as_object_list)
                    .is_some_and(|ids| ids.contains(&self.id))
            }))
            .collect();

        let mut graph = DiGraph::<Object, ()>::new();
        let mut nodes = IndexMap::new();
        for obj in &members {
            nodes.insert(obj.id, graph.add_node(*obj));
        }
        for obj in &members {
            for base in obj.bases(schema) {
                if let Some(&base_node) = nodes.get(&base.id) {
                    graph.add_edge(base_node, nodes[&obj.id], ());
                }
            }
        }

        // The inheritance graph is acyclic by construction; toposort only
        // fails on cycles.
        let order = toposort(&graph, None).unwrap_or_default();
        order
            .into_iter()
            .map(|node| graph[node])
            .filter(|obj| obj.id != self.id)
            .collect()
    }

    /// Whether creation of a new ref under the given slot should cascade
    /// into this inheritor. Derived objects mirror their derivation source
    /// instead, unless we are inside a derivation pass.
    pub fn allow_ref_propagation(
        &self,
        schema: &Schema,
        mark_derived: bool,
        _refdict: &RefDict,
    ) -> bool {
        !self.is_derived(schema) || mark_derived
    }

    /// `<class> '<shortname>'`, optionally suffixed with the referrer
    /// chain: `property 'p' of object type 'A'`.
    pub fn verbose_name(&self, schema: &Schema, with_parent: bool) -> String {
        let vn = format!(
            "{} '{}'",
            self.class.display_name(),
            self.shortname(schema),
        );
        if with_parent {
            if let Some(referrer) = self.get_referrer(schema) {
                let pn = referrer.verbose_name(schema, true);
                return format!("{vn} of {pn}");
            }
        }
        vn
    }

    pub(crate) fn expect_data<'a>(
        &self,
        schema: &'a Schema,
    ) -> Result<&'a ObjectData, DeltaError> {
        schema.data(self.id).ok_or_else(|| {
            InvariantViolation::new(format!(
                "object {} is not present in this schema",
                self.id,
            ))
            .into()
        })
    }
}

//! Generic inheritance machinery shared by all inheriting-object commands:
//! base-list deltas, rebase application, and field inheritance.

use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::error::DeltaError;
use crate::name::Name;
use crate::schema::class::field_def;
use crate::schema::object::Object;
use crate::schema::value::Value;
use crate::schema::Schema;

/// Where a base addition lands in the base list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasePosition {
    First,
    Last,
    After(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseAddition {
    pub name: Name,
    pub position: BasePosition,
}

/// Computes the minimum edit transforming `old` into `new` while
/// preserving order: bases to remove, and bases to insert with explicit
/// anchors.
pub fn delta_bases(old: &[Name], new: &[Name]) -> (Vec<Name>, Vec<BaseAddition>) {
    let removed: Vec<Name> = old.iter().filter(|b| !new.contains(b)).cloned().collect();

    let mut added = Vec::new();
    for (i, base) in new.iter().enumerate() {
        if old.contains(base) {
            continue;
        }
        let position = if i == 0 {
            BasePosition::First
        } else {
            BasePosition::After(new[i - 1].clone())
        };
        added.push(BaseAddition {
            name: base.clone(),
            position,
        });
    }

    (removed, added)
}

/// Applies a base-list edit produced by [`delta_bases`].
pub fn apply_base_edits(
    current: &[Name],
    removed: &[Name],
    added: &[BaseAddition],
) -> Vec<Name> {
    let mut out: Vec<Name> = current
        .iter()
        .filter(|b| !removed.contains(b))
        .cloned()
        .collect();

    for addition in added {
        if out.contains(&addition.name) {
            continue;
        }
        match &addition.position {
            BasePosition::First => out.insert(0, addition.name.clone()),
            BasePosition::Last => out.push(addition.name.clone()),
            BasePosition::After(anchor) => {
                match out.iter().position(|b| b == anchor) {
                    Some(pos) => out.insert(pos + 1, addition.name.clone()),
                    None => out.push(addition.name.clone()),
                }
            }
        }
    }

    out
}

/// The transitive ancestor set implied by a base list, nearest first.
pub fn compute_ancestors(schema: &Schema, bases: &[Object]) -> Vec<Uuid> {
    let mut out = IndexSet::new();
    for base in bases {
        out.insert(base.id);
    }
    for base in bases {
        for ancestor in base.ancestors(schema) {
            out.insert(ancestor.id);
        }
    }
    out.into_iter().collect()
}

/// Rewrites an object's base list and recomputes the materialized ancestor
/// sets of the object and everything that inherits from it.
pub fn apply_rebase(
    schema: &Schema,
    obj: Object,
    removed: &[Name],
    added: &[BaseAddition],
) -> Result<Schema, DeltaError> {
    let current: Vec<Name> = obj
        .bases(schema)
        .iter()
        .map(|b| b.name(schema))
        .collect();
    let target = apply_base_edits(&current, removed, added);

    let mut bases = Vec::with_capacity(target.len());
    for name in &target {
        bases.push(schema.get_or_err(name)?);
    }

    let mut next = schema.set_field(
        obj,
        "bases",
        Value::ObjectList(bases.iter().map(|b| b.id).collect()),
    )?;
    next = next.set_field(
        obj,
        "ancestors",
        Value::ObjectList(compute_ancestors(&next, &bases)),
    )?;

    // Descendants' materialized ancestors depend on ours; refresh them in
    // inheritance order.
    for descendant in obj.ordered_descendants(&next) {
        let d_bases = descendant.bases(&next);
        next = next.set_field(
            descendant,
            "ancestors",
            Value::ObjectList(compute_ancestors(&next, &d_bases)),
        )?;
    }

    Ok(next)
}

/// Fills the object's inheritable fields from its bases, first base wins.
///
/// With `ignore_local` set, locally-defined values are discarded: every
/// inheritable field is reset to what inheritance produces, and local
/// values with no inherited counterpart are unset. This is the `drop
/// owned` reversion semantics.
pub fn inherit_fields(
    schema: &Schema,
    obj: Object,
    bases: &[Object],
    ignore_local: bool,
) -> Result<Schema, DeltaError> {
    let mut target: IndexMap<String, Value> = IndexMap::new();
    for base in bases {
        let data = base.expect_data(schema)?;
        for (field, value) in &data.fields {
            let inheritable = field_def(field).is_some_and(|fd| fd.inheritable);
            if inheritable && !target.contains_key(field) && *value != Value::None {
                target.insert(field.clone(), value.clone());
            }
        }
    }

    let data = obj.expect_data(schema)?.clone();
    let mut next = schema.clone();

    if ignore_local {
        let local_only: Vec<String> = data
            .fields
            .keys()
            .filter(|field| {
                field_def(field).is_some_and(|fd| fd.inheritable)
                    && !target.contains_key(*field)
            })
            .cloned()
            .collect();
        for field in local_only {
            next = next.unset_field(obj, &field)?;
        }
    }

    for (field, value) in target {
        let locally_set = data.fields.contains_key(&field)
            && !data.inherited_fields.contains(&field);
        if ignore_local || !locally_set {
            next = next.set_field_inherited(obj, &field, value)?;
        }
    }

    Ok(next)
}

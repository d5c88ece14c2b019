//! DDL AST emission from applied command trees.
//!
//! Emission is the inverse of `build`: it renders what the user would have
//! to write. Implicit inheritance is hidden — implicit bases are filtered
//! out of base lists, and purely inherited refs produce no output unless
//! descriptive mode asks for them.

use itertools::Itertools;

use crate::ddl::{
    AlterNode, CreateNode, DdlNode, DdlValue, DropNode, ObjectRef, RebaseNode,
    RenameNode, SetFieldNode, SetOwnedNode,
};
use crate::delta::context::CommandContext;
use crate::delta::{Command, DeltaRoot, ObjectCommand};
use crate::name::{quals_from_fullname, shortname_from_fullname, Name};
use crate::schema::class::{field_def, Class};
use crate::schema::value::Value;
use crate::schema::Schema;

/// Renders a whole applied delta back into DDL statements.
pub fn delta_to_ddl(
    delta: &DeltaRoot,
    schema: &Schema,
    context: &CommandContext,
) -> Vec<DdlNode> {
    delta
        .commands
        .iter()
        .filter_map(|cmd| command_to_ddl(cmd, schema, context, None))
        .collect()
}

fn emit_ref(name: &Name) -> ObjectRef {
    if name.is_qualified() {
        ObjectRef::new(shortname_from_fullname(name))
    } else {
        ObjectRef::qualified(name.module.clone(), name.name.clone())
    }
}

/// A base is implicit when its name is specialized to a referrer, or when
/// it is the class's generic root (which is never written out).
fn is_implicit_base(class: Class, name: &Name) -> bool {
    name.is_qualified() || *name == class.default_base_name()
}

fn base_names(schema: &Schema, value: &Value) -> Vec<Name> {
    match value {
        Value::ShellList(shells) => shells.iter().map(|s| s.name.clone()).collect(),
        Value::ObjectList(ids) => ids
            .iter()
            .filter_map(|id| schema.get_by_id(*id))
            .map(|obj| obj.name(schema))
            .collect(),
        _ => Vec::new(),
    }
}

fn payload_fields(
    schema: &Schema,
    attrs: &indexmap::IndexMap<String, Value>,
) -> Vec<DdlNode> {
    attrs
        .iter()
        .filter(|(field, _)| field_def(field).is_some_and(|fd| fd.inheritable))
        .filter_map(|(field, value)| {
            let value = match value {
                Value::Bool(b) => DdlValue::Bool(*b),
                Value::Str(s) => DdlValue::Str(s.clone()),
                Value::Shell(shell) => DdlValue::Ref(emit_ref(&shell.name)),
                Value::Object(id) => {
                    let obj = schema.get_by_id(*id)?;
                    DdlValue::Ref(emit_ref(&obj.name(schema)))
                }
                _ => return None,
            };
            Some(DdlNode::SetField(SetFieldNode {
                field: field.clone(),
                value,
            }))
        })
        .collect()
}

fn subcommands_to_ddl(
    cmd: &Command,
    schema: &Schema,
    context: &CommandContext,
) -> Vec<DdlNode> {
    let referrer_class = Some(cmd.class());
    cmd.common()
        .subcommands
        .iter()
        .filter_map(|sub| command_to_ddl(sub, schema, context, referrer_class))
        .collect()
}

fn command_to_ddl(
    cmd: &Command,
    schema: &Schema,
    context: &CommandContext,
    referrer_class: Option<Class>,
) -> Option<DdlNode> {
    match cmd {
        Command::Create(create) => {
            let class = create.common.class;
            let name = &create.common.classname;
            let owned = create
                .common
                .attrs
                .get("is_owned")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let all_bases: Vec<Name> = create
                .common
                .attrs
                .get("bases")
                .map(|v| base_names(schema, v))
                .unwrap_or_default();
            let implicit: Vec<Name> = all_bases
                .iter()
                .filter(|b| b.is_qualified())
                .cloned()
                .collect();

            if !owned && referrer_class.is_some() {
                // A purely inherited ref has no DDL of its own; in
                // descriptive mode it is still shown, annotated with where
                // it comes from.
                if !context.descriptive_mode {
                    return None;
                }
                let mut node = CreateNode::new(class, emit_ref(name));
                let inherited_from = implicit
                    .iter()
                    .filter_map(|b| quals_from_fullname(b).into_iter().next())
                    .join(", ");
                node.system_comment = Some(format!("inherited from {inherited_from}"));
                return Some(node.into());
            }

            let commands: Vec<DdlNode> = payload_fields(schema, &create.common.attrs)
                .into_iter()
                .chain(subcommands_to_ddl(cmd, schema, context))
                .collect();

            // The ref already exists in inheritors by the time this
            // command round-trips outside declarative mode, so it renders
            // as an alter.
            if !implicit.is_empty() && !context.declarative {
                let mut node = AlterNode::new(class, emit_ref(name));
                node.commands = commands;
                return Some(node.into());
            }

            let mut node = CreateNode::new(class, emit_ref(name));
            node.is_abstract = create
                .common
                .attrs
                .get("is_abstract")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            node.bases = all_bases
                .iter()
                .filter(|b| !is_implicit_base(class, b))
                .map(emit_ref)
                .collect();
            if context.declarative && !implicit.is_empty() {
                let requires_overloaded = referrer_class
                    .and_then(|rc| rc.refdict_for_class(class))
                    .is_some_and(|rd| rd.requires_explicit_overloaded);
                node.declared_overloaded = requires_overloaded;
            }
            node.commands = commands;
            Some(node.into())
        }

        Command::Alter(alter) => {
            let commands: Vec<DdlNode> = payload_fields(schema, &alter.common.attrs)
                .into_iter()
                .chain(subcommands_to_ddl(cmd, schema, context))
                .collect();
            if commands.is_empty() {
                return None;
            }
            let mut node = AlterNode::new(alter.common.class, emit_ref(&alter.common.classname));
            node.commands = commands;
            Some(node.into())
        }

        Command::Delete(delete) => {
            // Implicit deletions (the ref was never owned here) have no
            // DDL counterpart.
            if referrer_class.is_some() && delete.orig_is_owned == Some(false) {
                return None;
            }
            Some(DropNode::new(delete.common.class, emit_ref(&delete.common.classname)).into())
        }

        Command::Rename(rename) => Some(DdlNode::Rename(RenameNode {
            new_name: ObjectRef::new(shortname_from_fullname(&rename.new_name)),
            context: rename.common.source_context,
        })),

        Command::Rebase(rebase) => {
            let class = rebase.common.class;
            let added: Vec<ObjectRef> = rebase
                .added_bases
                .iter()
                .filter(|a| !is_implicit_base(class, &a.name))
                .map(|a| emit_ref(&a.name))
                .collect();
            let removed: Vec<ObjectRef> = rebase
                .removed_bases
                .iter()
                .filter(|b| !is_implicit_base(class, b))
                .map(emit_ref)
                .collect();
            if added.is_empty() && removed.is_empty() {
                return None;
            }
            Some(DdlNode::Rebase(RebaseNode {
                added_bases: added,
                removed_bases: removed,
            }))
        }

        Command::AlterOwned(owned) => Some(DdlNode::SetOwned(SetOwnedNode {
            owned: owned
                .common
                .attrs
                .get("is_owned")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })),
    }
}

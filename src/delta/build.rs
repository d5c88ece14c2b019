//! Command-tree construction from the user-level DDL AST.
//!
//! Construction runs top-down with the same context stack used at apply
//! time: a nested ref's fully-qualified name is derived from the enclosing
//! referrer command's classname.

use crate::ddl::{AlterNode, CreateNode, DdlNode, DdlValue, DropNode, ObjectRef};
use crate::delta::context::{CommandContext, CommandKind, Frame};
use crate::delta::{
    AlterObject, AlterOwned, BaseAddition, BasePosition, Command, CommandCommon,
    CreateObject, DeleteObject, DeltaRoot, RebaseObject, RenameObject,
};
use crate::error::{DeltaError, InvariantViolation, SchemaError};
use crate::name::{name_qual_from_exprs, specialized, Name};
use crate::schema::class::Class;
use crate::schema::object::Object;
use crate::schema::value::{ObjectShell, Value};
use crate::schema::Schema;

/// Unqualified references resolve against the user module first, then the
/// standard library.
const DEFAULT_MODULE: &str = "default";

/// Builds the command tree for a whole DDL script.
pub fn delta_from_ddl(
    schema: &Schema,
    nodes: &[DdlNode],
    context: &mut CommandContext,
) -> Result<DeltaRoot, DeltaError> {
    let mut root = DeltaRoot::new();
    for node in nodes {
        root.add(cmd_tree_from_ast(schema, node, context)?);
    }
    Ok(root)
}

pub fn cmd_tree_from_ast(
    schema: &Schema,
    node: &DdlNode,
    context: &mut CommandContext,
) -> Result<Command, DeltaError> {
    match node {
        DdlNode::Create(node) => build_create(schema, node, context),
        DdlNode::Alter(node) => build_alter(schema, node, context),
        DdlNode::Drop(node) => build_drop(schema, node, context),
        _ => Err(InvariantViolation::new(
            "statement is only valid inside a create or alter block",
        )
        .into()),
    }
}

/// Derives a command's fully-qualified classname from what the user wrote.
/// Inside a referrer context the name is specialized to the referrer;
/// otherwise it is a plain module-qualified name.
pub fn classname_from_ast(
    class: Class,
    objref: &ObjectRef,
    quals: &[String],
    context: &CommandContext,
) -> Name {
    if let Some((frame, _)) = context.get_referrer_frame(class) {
        return specialized(&objref.name, &frame.classname, quals);
    }
    let module = objref
        .module
        .clone()
        .unwrap_or_else(|| DEFAULT_MODULE.to_owned());
    Name::new(module, objref.name.clone())
}

/// Class-specific name qualifiers derived from the defining AST: for
/// expression-bearing classes this is a digest of the expressions, so two
/// same-named constraints with different expressions get distinct names.
fn quals_from_ast(class: Class, commands: &[DdlNode]) -> Vec<String> {
    match class {
        Class::Constraint | Class::Index => {
            let exprs: Vec<&str> = commands
                .iter()
                .filter_map(|c| match c {
                    DdlNode::SetField(sf) if sf.field == "expr" => match &sf.value {
                        DdlValue::Str(s) => Some(s.as_str()),
                        _ => None,
                    },
                    _ => None,
                })
                .collect();
            if exprs.is_empty() {
                Vec::new()
            } else {
                vec![name_qual_from_exprs(exprs)]
            }
        }
        _ => Vec::new(),
    }
}

fn resolve_objref(schema: &Schema, objref: &ObjectRef) -> Result<Object, DeltaError> {
    let candidates: Vec<Name> = match &objref.module {
        Some(module) => vec![Name::new(module.clone(), objref.name.clone())],
        None => vec![
            Name::new(DEFAULT_MODULE, objref.name.clone()),
            Name::new("std", objref.name.clone()),
        ],
    };
    for name in &candidates {
        if let Some(obj) = schema.get(name) {
            return Ok(obj);
        }
    }
    Err(SchemaError::new(format!("'{}' does not exist", objref.name)).into())
}

/// A shell for a base reference. The named object may not exist yet — an
/// earlier command in the same delta can create it — so resolution failure
/// is not an error here: the shell carries a best-guess name and is
/// resolved for real at apply time.
fn base_shell(schema: &Schema, objref: &ObjectRef, class: Class) -> ObjectShell {
    if let Ok(obj) = resolve_objref(schema, objref) {
        return ObjectShell::new(obj.name(schema), obj.class);
    }
    let module = objref
        .module
        .clone()
        .unwrap_or_else(|| DEFAULT_MODULE.to_owned());
    ObjectShell::new(Name::new(module, objref.name.clone()), class)
}

fn resolve_objref_shell(schema: &Schema, objref: &ObjectRef) -> Result<ObjectShell, DeltaError> {
    let obj = resolve_objref(schema, objref)?;
    Ok(ObjectShell::new(obj.name(schema), obj.class))
}

fn ddl_value_to_value(schema: &Schema, value: &DdlValue) -> Result<Value, DeltaError> {
    match value {
        DdlValue::Bool(b) => Ok(Value::Bool(*b)),
        DdlValue::Str(s) => Ok(Value::Str(s.clone())),
        DdlValue::Ref(objref) => Ok(Value::Shell(resolve_objref_shell(schema, objref)?)),
    }
}

fn build_create(
    schema: &Schema,
    node: &CreateNode,
    context: &mut CommandContext,
) -> Result<Command, DeltaError> {
    let class = node.class;
    let quals = quals_from_ast(class, &node.commands);
    let classname = classname_from_ast(class, &node.name, &quals, context);
    let referrer = context
        .get_referrer_frame(class)
        .map(|(frame, refdict)| (frame.classname.clone(), frame.class, refdict));

    let mut cmd = CreateObject::new(class, classname.clone());
    cmd.common.source_context = node.context;

    if !node.bases.is_empty() {
        let shells: Vec<ObjectShell> = node
            .bases
            .iter()
            .map(|base| base_shell(schema, base, class))
            .collect();
        cmd.common.attrs.insert("bases".into(), Value::ShellList(shells));
    }

    if node.is_abstract {
        cmd.common.attrs.insert("is_abstract".into(), Value::Bool(true));
    }

    if let Some((referrer_name, referrer_class, refdict)) = referrer {
        cmd.common.attrs.insert(
            refdict.backref_attr.to_owned(),
            Value::Shell(ObjectShell::new(referrer_name, referrer_class)),
        );
        cmd.common.attrs.insert("is_owned".into(), Value::Bool(true));
        if node.declared_overloaded {
            cmd.common
                .attrs
                .insert("declared_overloaded".into(), Value::Bool(true));
        }
    }

    context.push(Frame::new(CommandKind::Create, class, classname));
    let result = build_create_block(schema, node, context, &mut cmd.common);
    context.pop();
    result?;

    Ok(cmd.into())
}

fn build_create_block(
    schema: &Schema,
    node: &CreateNode,
    context: &mut CommandContext,
    common: &mut CommandCommon,
) -> Result<(), DeltaError> {
    for sub in &node.commands {
        match sub {
            DdlNode::SetField(sf) => {
                let value = ddl_value_to_value(schema, &sf.value)?;
                common.attrs.insert(sf.field.clone(), value);
            }
            DdlNode::SetOwned(so) => {
                common.attrs.insert("is_owned".into(), Value::Bool(so.owned));
            }
            DdlNode::Create(_) | DdlNode::Alter(_) | DdlNode::Drop(_) => {
                common
                    .subcommands
                    .push(cmd_tree_from_ast(schema, sub, context)?);
            }
            DdlNode::Rename(_) | DdlNode::Rebase(_) => {
                return Err(SchemaError::new(
                    "statement is not valid inside a create block",
                )
                .with_context(node.context)
                .into());
            }
        }
    }
    Ok(())
}

fn build_alter(
    schema: &Schema,
    node: &AlterNode,
    context: &mut CommandContext,
) -> Result<Command, DeltaError> {
    let class = node.class;
    let quals = class_quals_for_existing(schema, class, &node.name, context);
    let classname = classname_from_ast(class, &node.name, &quals, context);
    let in_referrer = context.get_referrer_frame(class).is_some();

    let mut cmd = AlterObject::new(class, classname.clone());
    cmd.common.source_context = node.context;
    if node.declared_overloaded {
        cmd.common
            .attrs
            .insert("declared_overloaded".into(), Value::Bool(true));
    }

    let mut has_set_owned = false;

    context.push(Frame::new(CommandKind::Alter, class, classname.clone()));
    let result = (|| -> Result<(), DeltaError> {
        for sub in &node.commands {
            match sub {
                DdlNode::SetField(sf) => {
                    let value = ddl_value_to_value(schema, &sf.value)?;
                    cmd.common.attrs.insert(sf.field.clone(), value);
                }
                DdlNode::SetOwned(so) => {
                    has_set_owned = true;
                    let mut owned = AlterOwned::new(class, classname.clone());
                    owned
                        .common
                        .attrs
                        .insert("is_owned".into(), Value::Bool(so.owned));
                    cmd.common.subcommands.push(owned.into());
                }
                DdlNode::Rename(rn) => {
                    let new_name =
                        classname_from_ast(class, &rn.new_name, &quals, context);
                    let mut rename =
                        RenameObject::new(class, classname.clone(), new_name);
                    rename.common.source_context = rn.context;
                    cmd.common.subcommands.push(rename.into());
                }
                DdlNode::Rebase(rb) => {
                    let mut rebase = RebaseObject::new(class, classname.clone());
                    for base in &rb.removed_bases {
                        rebase
                            .removed_bases
                            .push(base_shell(schema, base, class).name);
                    }
                    for base in &rb.added_bases {
                        rebase.added_bases.push(BaseAddition {
                            name: base_shell(schema, base, class).name,
                            position: BasePosition::Last,
                        });
                    }
                    cmd.common.subcommands.push(rebase.into());
                }
                DdlNode::Create(_) | DdlNode::Alter(_) | DdlNode::Drop(_) => {
                    cmd.common
                        .subcommands
                        .push(cmd_tree_from_ast(schema, sub, context)?);
                }
            }
        }
        Ok(())
    })();
    context.pop();
    result?;

    // Mentioning a ref in an alter block re-owns it, unless ownership is
    // being set explicitly.
    if in_referrer && !has_set_owned {
        cmd.common.attrs.insert("is_owned".into(), Value::Bool(true));
    }

    Ok(cmd.into())
}

fn build_drop(
    schema: &Schema,
    node: &DropNode,
    context: &mut CommandContext,
) -> Result<Command, DeltaError> {
    let class = node.class;
    let quals = class_quals_for_existing(schema, class, &node.name, context);
    let classname = classname_from_ast(class, &node.name, &quals, context);
    let mut cmd = DeleteObject::new(class, classname);
    cmd.common.source_context = node.context;
    Ok(cmd.into())
}

/// For alters and drops the qualifiers cannot be recomputed from the AST
/// (the defining expressions are not re-stated), so they are recovered
/// from the existing object's name by way of the referrer's collection.
fn class_quals_for_existing(
    schema: &Schema,
    class: Class,
    objref: &ObjectRef,
    context: &CommandContext,
) -> Vec<String> {
    let Some((frame, refdict)) = context.get_referrer_frame(class) else {
        return Vec::new();
    };
    let Some(referrer) = frame.scls.or_else(|| schema.get(&frame.classname)) else {
        return Vec::new();
    };
    let Some(existing) = referrer.get_ref(schema, refdict.attr, &objref.name) else {
        return Vec::new();
    };
    class.quals_from_name(&existing.name(schema))
}

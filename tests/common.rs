#![allow(dead_code)]

use schema_delta::ddl::{
    AlterNode, CreateNode, DdlNode, DdlValue, DropNode, ObjectRef, RenameNode,
    SetFieldNode, SetOwnedNode,
};
use schema_delta::{
    delta_from_ddl, Class, CommandContext, CreateObject, DeltaError, DeltaRoot, Name,
    Object, Schema, Value,
};

/// A schema holding the generic roots every concrete object ultimately
/// extends, plus an empty `default` module.
pub fn std_schema() -> Schema {
    let schema = Schema::new().add_module("default");
    let mut delta = DeltaRoot::new();
    for (class, name) in [
        (Class::ObjectType, "Object"),
        (Class::Link, "link"),
        (Class::Property, "property"),
        (Class::Constraint, "constraint"),
        (Class::Index, "index"),
    ] {
        let mut create = CreateObject::new(class, Name::new("std", name));
        create
            .common
            .attrs
            .insert("is_abstract".into(), Value::Bool(true));
        delta.add(create);
    }
    let mut context = CommandContext::new();
    delta.apply(&schema, &mut context).unwrap()
}

pub fn apply_ddl(schema: &Schema, nodes: Vec<DdlNode>) -> Result<Schema, DeltaError> {
    let mut build_context = CommandContext::new();
    let mut delta = delta_from_ddl(schema, &nodes, &mut build_context)?;
    let mut apply_context = CommandContext::new();
    delta.apply(schema, &mut apply_context)
}

pub fn apply_ddl_declarative(
    schema: &Schema,
    nodes: Vec<DdlNode>,
) -> Result<Schema, DeltaError> {
    let mut build_context = CommandContext::new();
    build_context.declarative = true;
    let mut delta = delta_from_ddl(schema, &nodes, &mut build_context)?;
    let mut apply_context = CommandContext::new();
    apply_context.declarative = true;
    delta.apply(schema, &mut apply_context)
}

/// Builds and applies a delta, returning the applied tree for emission
/// checks.
pub fn apply_ddl_with_tree(
    schema: &Schema,
    nodes: Vec<DdlNode>,
) -> Result<(Schema, DeltaRoot), DeltaError> {
    let mut build_context = CommandContext::new();
    let mut delta = delta_from_ddl(schema, &nodes, &mut build_context)?;
    let mut apply_context = CommandContext::new();
    let next = delta.apply(schema, &mut apply_context)?;
    Ok((next, delta))
}

pub fn create_type(name: &str, bases: &[&str], commands: Vec<DdlNode>) -> DdlNode {
    let mut node = CreateNode::new(Class::ObjectType, ObjectRef::new(name));
    node.bases = bases.iter().map(|b| ObjectRef::new(*b)).collect();
    node.commands = commands;
    node.into()
}

pub fn alter_type(name: &str, commands: Vec<DdlNode>) -> DdlNode {
    let mut node = AlterNode::new(Class::ObjectType, ObjectRef::new(name));
    node.commands = commands;
    node.into()
}

pub fn create_ref(class: Class, name: &str, commands: Vec<DdlNode>) -> DdlNode {
    let mut node = CreateNode::new(class, ObjectRef::new(name));
    node.commands = commands;
    node.into()
}

pub fn create_ref_extending(
    class: Class,
    name: &str,
    bases: &[&str],
    commands: Vec<DdlNode>,
) -> DdlNode {
    let mut node = CreateNode::new(class, ObjectRef::new(name));
    node.bases = bases.iter().map(|b| ObjectRef::new(*b)).collect();
    node.commands = commands;
    node.into()
}

pub fn create_constraint(name: &str, expr: &str) -> DdlNode {
    create_ref(
        Class::Constraint,
        name,
        vec![set_field_str("expr", expr)],
    )
}

pub fn alter_ref(class: Class, name: &str, commands: Vec<DdlNode>) -> DdlNode {
    let mut node = AlterNode::new(class, ObjectRef::new(name));
    node.commands = commands;
    node.into()
}

pub fn alter_ref_overloaded(class: Class, name: &str, commands: Vec<DdlNode>) -> DdlNode {
    let mut node = AlterNode::new(class, ObjectRef::new(name));
    node.declared_overloaded = true;
    node.commands = commands;
    node.into()
}

pub fn drop_ref(class: Class, name: &str) -> DdlNode {
    DropNode::new(class, ObjectRef::new(name)).into()
}

pub fn rename_to(name: &str) -> DdlNode {
    DdlNode::Rename(RenameNode {
        new_name: ObjectRef::new(name),
        context: None,
    })
}

pub fn set_field_str(field: &str, value: &str) -> DdlNode {
    DdlNode::SetField(SetFieldNode {
        field: field.to_owned(),
        value: DdlValue::Str(value.to_owned()),
    })
}

pub fn set_field_bool(field: &str, value: bool) -> DdlNode {
    DdlNode::SetField(SetFieldNode {
        field: field.to_owned(),
        value: DdlValue::Bool(value),
    })
}

pub fn set_owned(owned: bool) -> DdlNode {
    DdlNode::SetOwned(SetOwnedNode { owned })
}

pub fn obj(schema: &Schema, name: &str) -> Object {
    schema
        .get(&name.parse().unwrap())
        .unwrap_or_else(|| panic!("{name} not found"))
}

pub fn get_prop(schema: &Schema, ty: &str, name: &str) -> Object {
    obj(schema, &format!("default::{ty}"))
        .get_ref(schema, "properties", name)
        .unwrap_or_else(|| panic!("property {name} not found on {ty}"))
}

pub fn try_get_prop(schema: &Schema, ty: &str, name: &str) -> Option<Object> {
    obj(schema, &format!("default::{ty}")).get_ref(schema, "properties", name)
}

pub fn get_constraint(schema: &Schema, owner: Object, name: &str) -> Object {
    owner
        .get_ref(schema, "constraints", name)
        .unwrap_or_else(|| panic!("constraint {name} not found"))
}

pub fn base_names(schema: &Schema, o: Object) -> Vec<String> {
    o.bases(schema).iter().map(|b| b.name(schema).to_string()).collect()
}

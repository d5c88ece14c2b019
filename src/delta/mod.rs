//! The schema-mutation command tree.
//!
//! A user edit becomes a [`DeltaRoot`] holding a tree of [`Command`]s;
//! applying the tree against an immutable [`Schema`] snapshot produces a
//! new snapshot. Construction happens top-down (a referrer command
//! contains its nested ref commands); execution threads a
//! [`CommandContext`] so that nested commands can reach their enclosing
//! referrer.

use enum_dispatch::enum_dispatch;
use indexmap::IndexMap;

use crate::error::{DeltaError, SourceContext};
use crate::name::Name;
use crate::schema::class::{field_def, Class};
use crate::schema::object::Object;
use crate::schema::value::Value;
use crate::schema::Schema;

pub mod build;
pub mod context;
pub mod emit;
pub mod inheriting;
pub mod referenced;

pub use context::{CommandContext, CommandKind, Frame, FrameFlags};
pub use inheriting::{BaseAddition, BasePosition};
pub use referenced::{derive_ref, DeriveOptions};

/// State shared by every command node.
#[derive(Debug, Clone)]
pub struct CommandCommon {
    pub class: Class,
    pub classname: Name,
    /// Attribute-value assignments applied to the object.
    pub attrs: IndexMap<String, Value>,
    pub subcommands: Vec<Command>,
    pub source_context: Option<SourceContext>,
    /// Set on synthesized subcommands that were applied eagerly during
    /// their parent's apply; the traversal loop skips them.
    pub pre_applied: bool,
}

impl CommandCommon {
    fn new(class: Class, classname: Name) -> Self {
        CommandCommon {
            class,
            classname,
            attrs: IndexMap::new(),
            subcommands: Vec::new(),
            source_context: None,
            pre_applied: false,
        }
    }
}

#[enum_dispatch]
pub trait ObjectCommand {
    fn common(&self) -> &CommandCommon;
    fn common_mut(&mut self) -> &mut CommandCommon;
    fn kind(&self) -> CommandKind;
    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError>;
}

#[enum_dispatch(ObjectCommand)]
#[derive(Debug, Clone)]
pub enum Command {
    Create(CreateObject),
    Alter(AlterObject),
    Rebase(RebaseObject),
    Rename(RenameObject),
    Delete(DeleteObject),
    AlterOwned(AlterOwned),
}

impl Command {
    pub fn class(&self) -> Class {
        self.common().class
    }

    pub fn classname(&self) -> &Name {
        &self.common().classname
    }

    pub fn add(&mut self, cmd: impl Into<Command>) {
        self.common_mut().subcommands.push(cmd.into());
    }

    pub fn set_attr(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.common_mut().attrs.insert(field.into(), value.into());
    }

    pub fn get_attr(&self, field: &str) -> Option<&Value> {
        self.common().attrs.get(field)
    }

    pub fn attr_bool(&self, field: &str) -> Option<bool> {
        self.get_attr(field).and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone)]
pub struct CreateObject {
    pub common: CommandCommon,
    /// Resolves creation against concurrent sibling propagation: if the
    /// object already exists at apply time the command is a no-op.
    pub if_not_exists: bool,
}

impl CreateObject {
    pub fn new(class: Class, classname: Name) -> Self {
        let mut common = CommandCommon::new(class, classname.clone());
        common.attrs.insert("name".into(), Value::Name(classname));
        CreateObject {
            common,
            if_not_exists: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlterObject {
    pub common: CommandCommon,
    /// Counterpart of `if_not_exists`: a no-op if the object is absent.
    pub if_exists: bool,
    /// Marks alters synthesized by ref-op propagation; see
    /// [`Frame::ref_op_propagated`].
    pub ref_op_propagated: bool,
}

impl AlterObject {
    pub fn new(class: Class, classname: Name) -> Self {
        AlterObject {
            common: CommandCommon::new(class, classname),
            if_exists: false,
            ref_op_propagated: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RebaseObject {
    pub common: CommandCommon,
    /// An implicit rebase recomputes its base deltas from the referrer's
    /// inheritance at apply time instead of trusting the recorded lists.
    pub implicit: bool,
    pub added_bases: Vec<BaseAddition>,
    pub removed_bases: Vec<Name>,
}

impl RebaseObject {
    pub fn new(class: Class, classname: Name) -> Self {
        RebaseObject {
            common: CommandCommon::new(class, classname),
            implicit: false,
            added_bases: Vec::new(),
            removed_bases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenameObject {
    pub common: CommandCommon,
    pub new_name: Name,
}

impl RenameObject {
    pub fn new(class: Class, classname: Name, new_name: Name) -> Self {
        RenameObject {
            common: CommandCommon::new(class, classname),
            new_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteObject {
    pub common: CommandCommon,
    /// Ownership state observed at apply time; drives DDL emission (the
    /// deletion of a purely inherited ref produces no output).
    pub orig_is_owned: Option<bool>,
}

impl DeleteObject {
    pub fn new(class: Class, classname: Name) -> Self {
        DeleteObject {
            common: CommandCommon::new(class, classname),
            orig_is_owned: None,
        }
    }
}

/// The `set owned := ...` / `drop owned` fragment. Flipping `is_owned`
/// off reverts the ref to pure inheritance.
#[derive(Debug, Clone)]
pub struct AlterOwned {
    pub common: CommandCommon,
}

impl AlterOwned {
    pub fn new(class: Class, classname: Name) -> Self {
        AlterOwned {
            common: CommandCommon::new(class, classname),
        }
    }
}

/// The root of one edit's command tree.
#[derive(Debug, Clone, Default)]
pub struct DeltaRoot {
    pub commands: Vec<Command>,
}

impl DeltaRoot {
    pub fn new() -> Self {
        DeltaRoot::default()
    }

    pub fn add(&mut self, cmd: impl Into<Command>) {
        self.commands.push(cmd.into());
    }

    pub fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        log::debug!("applying delta with {} command(s)", self.commands.len());
        apply_subcommands(&mut self.commands, schema.clone(), context)
    }
}

/// Applies a command list in order, including commands appended while the
/// loop runs (propagation does this); commands already applied eagerly are
/// skipped.
pub(crate) fn apply_subcommands(
    subs: &mut Vec<Command>,
    schema: Schema,
    context: &mut CommandContext,
) -> Result<Schema, DeltaError> {
    let mut schema = schema;
    let mut i = 0;
    while i < subs.len() {
        if !subs[i].common().pre_applied {
            schema = subs[i].apply(&schema, context)?;
        }
        i += 1;
    }
    Ok(schema)
}

/// Resolves command-side shells into schema-side id references.
pub(crate) fn resolve_value(schema: &Schema, value: &Value) -> Result<Value, DeltaError> {
    match value {
        Value::Shell(shell) => Ok(Value::Object(schema.resolve_shell(shell)?.id)),
        Value::ShellList(shells) => {
            let mut ids = Vec::with_capacity(shells.len());
            for shell in shells {
                ids.push(schema.resolve_shell(shell)?.id);
            }
            Ok(Value::ObjectList(ids))
        }
        other => Ok(other.clone()),
    }
}

/// Applies a command's attribute assignments to a live object. Name and
/// ephemeral fields are excluded: names change through [`RenameObject`]
/// only, and ephemeral fields never reach the schema.
pub(crate) fn apply_attrs(
    schema: &Schema,
    obj: Object,
    attrs: &IndexMap<String, Value>,
) -> Result<Schema, DeltaError> {
    let mut next = schema.clone();
    for (field, value) in attrs {
        if field == "name" || field == "bases" {
            continue;
        }
        if field_def(field).is_some_and(|fd| fd.ephemeral) {
            continue;
        }
        let value = resolve_value(&next, value)?;
        next = next.set_field(obj, field, value)?;
    }
    Ok(next)
}

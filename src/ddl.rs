//! The user-level DDL AST.
//!
//! This is the boundary the engine shares with the (external) parser and
//! pretty-printer: command trees are built from these nodes and emitted
//! back into them. Nodes are plain data; nothing here touches a schema.

use crate::error::SourceContext;
use crate::schema::class::Class;

/// A possibly module-qualified object reference as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectRef {
    pub module: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectRef {
            module: None,
            name: name.into(),
        }
    }

    pub fn qualified(module: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectRef {
            module: Some(module.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlValue {
    Bool(bool),
    Str(String),
    Ref(ObjectRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNode {
    pub class: Class,
    pub name: ObjectRef,
    pub is_abstract: bool,
    /// `overloaded` keyword: the user asserts this definition shadows an
    /// inherited one.
    pub declared_overloaded: bool,
    pub bases: Vec<ObjectRef>,
    pub commands: Vec<DdlNode>,
    /// Attached by descriptive-mode emission only; never parsed.
    pub system_comment: Option<String>,
    pub context: Option<SourceContext>,
}

impl CreateNode {
    pub fn new(class: Class, name: ObjectRef) -> Self {
        CreateNode {
            class,
            name,
            is_abstract: false,
            declared_overloaded: false,
            bases: Vec::new(),
            commands: Vec::new(),
            system_comment: None,
            context: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterNode {
    pub class: Class,
    pub name: ObjectRef,
    /// `overloaded` keyword on a declarative redeclaration of an
    /// inherited ref.
    pub declared_overloaded: bool,
    pub commands: Vec<DdlNode>,
    pub context: Option<SourceContext>,
}

impl AlterNode {
    pub fn new(class: Class, name: ObjectRef) -> Self {
        AlterNode {
            class,
            name,
            declared_overloaded: false,
            commands: Vec::new(),
            context: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropNode {
    pub class: Class,
    pub name: ObjectRef,
    pub context: Option<SourceContext>,
}

impl DropNode {
    pub fn new(class: Class, name: ObjectRef) -> Self {
        DropNode {
            class,
            name,
            context: None,
        }
    }
}

/// `rename to <name>` inside an alter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameNode {
    pub new_name: ObjectRef,
    pub context: Option<SourceContext>,
}

/// `set <field> := <value>` inside a create or alter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFieldNode {
    pub field: String,
    pub value: DdlValue,
}

/// `set owned := <bool>` / `drop owned` inside an alter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOwnedNode {
    pub owned: bool,
}

/// `extending`-list adjustments inside an alter block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebaseNode {
    pub added_bases: Vec<ObjectRef>,
    pub removed_bases: Vec<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlNode {
    Create(CreateNode),
    Alter(AlterNode),
    Drop(DropNode),
    Rename(RenameNode),
    SetField(SetFieldNode),
    SetOwned(SetOwnedNode),
    Rebase(RebaseNode),
}

impl DdlNode {
    pub fn as_create(&self) -> Option<&CreateNode> {
        match self {
            DdlNode::Create(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_alter(&self) -> Option<&AlterNode> {
        match self {
            DdlNode::Alter(node) => Some(node),
            _ => None,
        }
    }
}

impl From<CreateNode> for DdlNode {
    fn from(node: CreateNode) -> Self {
        DdlNode::Create(node)
    }
}

impl From<AlterNode> for DdlNode {
    fn from(node: AlterNode) -> Self {
        DdlNode::Alter(node)
    }
}

impl From<DropNode> for DdlNode {
    fn from(node: DropNode) -> Self {
        DdlNode::Drop(node)
    }
}

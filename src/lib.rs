//! A command engine for referenced schema objects.
//!
//! Schemas here are directed acyclic graphs of typed objects — types,
//! links, properties, constraints, indexes. Some of those objects are
//! *referenced*: they exist only as members of a referrer (a property of a
//! type, a constraint of a property) and participate in the referrer's
//! inheritance. This crate transforms user-level DDL into trees of
//! schema-mutation commands and applies them to immutable [`Schema`]
//! snapshots, keeping implicitly inherited refs consistent across the
//! whole inheritance graph: creations, renames and deletions cascade into
//! every descendant referrer, and ownership transitions (`overloaded`,
//! `drop owned`) are validated and reverted correctly.

pub mod ddl;
pub mod delta;
pub mod error;
pub mod name;
pub mod schema;

pub use crate::delta::build::{cmd_tree_from_ast, delta_from_ddl};
pub use crate::delta::emit::delta_to_ddl;
pub use crate::delta::{
    derive_ref, AlterObject, AlterOwned, Command, CommandContext, CommandKind,
    CreateObject, DeleteObject, DeltaRoot, DeriveOptions, ObjectCommand, RebaseObject,
    RenameObject,
};
pub use crate::error::{
    DeltaError, InvalidDefinitionError, InvariantViolation, SchemaDefinitionError,
    SchemaError, SourceContext,
};
pub use crate::name::Name;
pub use crate::schema::class::{Class, RefDict};
pub use crate::schema::object::Object;
pub use crate::schema::value::{ObjectShell, Value};
pub use crate::schema::Schema;

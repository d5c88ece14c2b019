use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::name::Name;

/// The concrete object classes of the schema, with their shared
/// capabilities (inheritance, referrer scoping) expressed as predicates
/// rather than a class hierarchy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::AsRefStr,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    Serialize,
    Deserialize,
)]
pub enum Class {
    ObjectType,
    Link,
    Property,
    Constraint,
    Index,
}

/// One slot of referenced children on a referrer class: the collection
/// field on the referrer, the back-reference field on the ref, and the
/// overload discipline the slot demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefDict {
    pub attr: &'static str,
    pub backref_attr: &'static str,
    pub ref_class: Class,
    pub requires_explicit_overloaded: bool,
}

impl RefDict {
    /// The key under which a ref with the given fully-qualified name is
    /// stored in the referrer's collection.
    pub fn key_for_name(&self, name: &Name) -> String {
        crate::name::shortname_from_fullname(name)
    }
}

const OBJECT_TYPE_REFDICTS: &[RefDict] = &[
    RefDict {
        attr: "properties",
        backref_attr: "source",
        ref_class: Class::Property,
        requires_explicit_overloaded: false,
    },
    RefDict {
        attr: "links",
        backref_attr: "source",
        ref_class: Class::Link,
        requires_explicit_overloaded: false,
    },
    RefDict {
        attr: "constraints",
        backref_attr: "subject",
        ref_class: Class::Constraint,
        requires_explicit_overloaded: true,
    },
    RefDict {
        attr: "indexes",
        backref_attr: "subject",
        ref_class: Class::Index,
        requires_explicit_overloaded: false,
    },
];

const LINK_REFDICTS: &[RefDict] = &[
    RefDict {
        attr: "properties",
        backref_attr: "source",
        ref_class: Class::Property,
        requires_explicit_overloaded: false,
    },
    RefDict {
        attr: "constraints",
        backref_attr: "subject",
        ref_class: Class::Constraint,
        requires_explicit_overloaded: true,
    },
];

const PROPERTY_REFDICTS: &[RefDict] = &[RefDict {
    attr: "constraints",
    backref_attr: "subject",
    ref_class: Class::Constraint,
    requires_explicit_overloaded: true,
}];

impl Class {
    /// Slots of referenced children declared by this class.
    pub const fn refdicts(&self) -> &'static [RefDict] {
        match self {
            Class::ObjectType => OBJECT_TYPE_REFDICTS,
            Class::Link => LINK_REFDICTS,
            Class::Property => PROPERTY_REFDICTS,
            Class::Constraint | Class::Index => &[],
        }
    }

    /// The refdict under which objects of `ref_class` live on this class.
    pub fn refdict_for_class(&self, ref_class: Class) -> Option<&'static RefDict> {
        self.refdicts().iter().find(|rd| rd.ref_class == ref_class)
    }

    /// Whether objects of this class participate in inheritance. Every
    /// current class does; the engine still guards on this because a
    /// referrer slot does not require it.
    pub const fn is_inheriting(&self) -> bool {
        true
    }

    /// Whether objects of this class exist only as members of a referrer.
    pub const fn is_referenced(&self) -> bool {
        !matches!(self, Class::ObjectType)
    }

    /// The back-reference field pointing at the referrer, for referenced
    /// classes.
    pub const fn backref_attr(&self) -> Option<&'static str> {
        match self {
            Class::Link | Class::Property => Some("source"),
            Class::Constraint | Class::Index => Some("subject"),
            Class::ObjectType => None,
        }
    }

    /// The generic root that types explicit bases of this class.
    pub fn default_base_name(&self) -> Name {
        let name = match self {
            Class::ObjectType => "Object",
            Class::Link => "link",
            Class::Property => "property",
            Class::Constraint => "constraint",
            Class::Index => "index",
        };
        Name::new("std", name)
    }

    /// Extra name qualifiers (beyond the referrer) that must be carried
    /// over when a specialized name is re-derived under another referrer.
    pub fn quals_from_name(&self, name: &Name) -> Vec<String> {
        match self {
            Class::Constraint | Class::Index => {
                let quals = crate::name::quals_from_fullname(name);
                quals.into_iter().skip(1).collect()
            }
            _ => Vec::new(),
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Class::ObjectType => "object type",
            Class::Link => "link",
            Class::Property => "property",
            Class::Constraint => "constraint",
            Class::Index => "index",
        }
    }
}

/// Per-field behavior under inheritance and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub inheritable: bool,
    /// Ephemeral fields live on commands only and are never stored on
    /// objects.
    pub ephemeral: bool,
}

const INHERITABLE: FieldDef = FieldDef {
    inheritable: true,
    ephemeral: false,
};
const LOCAL: FieldDef = FieldDef {
    inheritable: false,
    ephemeral: false,
};

lazy_static! {
    static ref FIELDS: IndexMap<&'static str, FieldDef> = IndexMap::from([
        ("name", LOCAL),
        ("bases", LOCAL),
        ("ancestors", LOCAL),
        ("is_owned", LOCAL),
        (
            "declared_overloaded",
            FieldDef {
                inheritable: false,
                ephemeral: true,
            },
        ),
        ("is_abstract", LOCAL),
        ("is_final", LOCAL),
        ("is_derived", LOCAL),
        ("source", LOCAL),
        ("subject", LOCAL),
        ("properties", LOCAL),
        ("links", LOCAL),
        ("constraints", LOCAL),
        ("indexes", LOCAL),
        ("target", INHERITABLE),
        ("required", INHERITABLE),
        ("readonly", INHERITABLE),
        ("default", INHERITABLE),
        ("expr", INHERITABLE),
        ("delegated", INHERITABLE),
    ]);
}

pub fn field_def(name: &str) -> Option<&'static FieldDef> {
    FIELDS.get(name)
}

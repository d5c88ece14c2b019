use serde::{Deserialize, Serialize};

/// Location of the offending DDL in the user's source text, when the AST
/// producer tracked one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    Serialize,
    Deserialize,
)]
#[display(fmt = "{}:{}", line, column)]
pub struct SourceContext {
    pub line: usize,
    pub column: usize,
}

macro_rules! message_error {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        #[error("{message}")]
        pub struct $name {
            message: String,
            details: Option<String>,
            context: Option<SourceContext>,
        }

        impl $name {
            pub fn new(message: impl Into<String>) -> Self {
                Self {
                    message: message.into(),
                    details: None,
                    context: None,
                }
            }

            pub fn with_details(mut self, details: impl Into<String>) -> Self {
                self.details = Some(details.into());
                self
            }

            pub fn with_context(mut self, context: Option<SourceContext>) -> Self {
                self.context = context;
                self
            }

            pub fn message(&self) -> &str {
                &self.message
            }

            pub fn details(&self) -> Option<&str> {
                self.details.as_deref()
            }

            pub fn context(&self) -> Option<SourceContext> {
                self.context
            }
        }
    };
}

message_error! {
    /// A structural violation of the schema itself: dangling references,
    /// dropping an inherited object, deriving an object from itself.
    SchemaError
}

message_error! {
    /// A violation in the user's DDL: renaming an inherited object, a
    /// missing or forbidden `overloaded` declaration.
    SchemaDefinitionError
}

message_error! {
    /// A definition that cannot be expressed at all, e.g. `drop owned` on
    /// an object that is not inherited.
    InvalidDefinitionError
}

message_error! {
    /// An internal invariant was broken. This is a bug in the engine or its
    /// caller, never a user error.
    InvariantViolation
}

/// Any error produced while building or applying a command tree. Errors
/// abort the tree before anything is committed; schema snapshots are
/// immutable, so partial application cannot be observed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Definition(#[from] SchemaDefinitionError),
    #[error(transparent)]
    InvalidDefinition(#[from] InvalidDefinitionError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl DeltaError {
    pub fn message(&self) -> &str {
        match self {
            DeltaError::Schema(e) => e.message(),
            DeltaError::Definition(e) => e.message(),
            DeltaError::InvalidDefinition(e) => e.message(),
            DeltaError::Invariant(e) => e.message(),
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            DeltaError::Schema(e) => e.details(),
            DeltaError::Definition(e) => e.details(),
            DeltaError::InvalidDefinition(e) => e.details(),
            DeltaError::Invariant(e) => e.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_and_context_are_carried() {
        let err = SchemaDefinitionError::new("cannot rename inherited property 'p'")
            .with_details("property 'p' is inherited from object type 'A'")
            .with_context(Some(SourceContext { line: 3, column: 9 }));
        assert_eq!(err.to_string(), "cannot rename inherited property 'p'");
        assert_eq!(
            err.details(),
            Some("property 'p' is inherited from object type 'A'"),
        );
        assert_eq!(err.context().unwrap().to_string(), "3:9");

        let err: DeltaError = err.into();
        assert!(matches!(err, DeltaError::Definition(_)));
    }
}

//! Error types for the layout engine
//!
//! Layout passes themselves never fail; these errors only arise while a
//! scene is being assembled.

use thiserror::Error;

/// Errors that can occur while building a scene
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Two objects share an id
    #[error("duplicate object id '{id}'")]
    DuplicateObject { id: String },

    /// A constraint with nothing to constrain
    #[error("constraint '{kind}' lists no objects")]
    EmptyConstraint { kind: String },
}

impl LayoutError {
    /// Create a duplicate object error
    pub fn duplicate(id: impl Into<String>) -> Self {
        Self::DuplicateObject { id: id.into() }
    }

    /// Create an empty constraint error
    pub fn empty_constraint(kind: impl Into<String>) -> Self {
        Self::EmptyConstraint { kind: kind.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_display() {
        let err = LayoutError::duplicate("resistor_1");
        assert_eq!(err.to_string(), "duplicate object id 'resistor_1'");
    }

    #[test]
    fn test_empty_constraint_display() {
        let err = LayoutError::empty_constraint("centered");
        assert!(err.to_string().contains("centered"));
    }
}

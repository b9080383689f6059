//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Invalid tool descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("Invalid command name '{0}'")]
    InvalidCommandName(String),
}

impl DomainError {
    pub fn duplicate_tool(name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind: "tool",
            name: name.into(),
        }
    }

    pub fn duplicate_command(name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind: "command",
            name: name.into(),
        }
    }

    /// Check if this error is a name collision
    pub fn is_duplicate_name(&self) -> bool {
        matches!(self, DomainError::DuplicateName { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_tool_display() {
        let error = DomainError::duplicate_tool("read_file");
        assert_eq!(error.to_string(), "Duplicate tool name: read_file");
        assert!(error.is_duplicate_name());
    }

    #[test]
    fn test_invalid_command_is_not_duplicate() {
        assert!(!DomainError::InvalidCommandName("a b".into()).is_duplicate_name());
    }
}

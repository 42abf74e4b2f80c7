//! Identifier conventions.
//!
//! Types, variants and seed-driven (generator) operations are PascalCase.
//! Fields, observers and instance-bound operations are camelCase.

use derive_more::Display;

use crate::error::{DeclarationError, Result};

/// Letter case an identifier is required to follow.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Case {
    #[display("PascalCase")]
    Pascal,
    #[display("camelCase")]
    Camel,
}

/// What kind of thing is being named, for error messages.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum NameKind {
    #[display("type")]
    Type,
    #[display("variant")]
    Variant,
    #[display("field")]
    Field,
    #[display("operation")]
    Operation,
    #[display("generator")]
    Generator,
    #[display("observer")]
    Observer,
}

pub fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

pub fn is_camel_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

impl Case {
    pub fn matches(self, name: &str) -> bool {
        match self {
            Case::Pascal => is_pascal_case(name),
            Case::Camel => is_camel_case(name),
        }
    }
}

impl NameKind {
    /// The case this kind of name must follow.
    pub fn case(self) -> Case {
        match self {
            NameKind::Type | NameKind::Variant | NameKind::Generator => Case::Pascal,
            NameKind::Field | NameKind::Operation | NameKind::Observer => Case::Camel,
        }
    }

    /// Reject `name` unless it follows this kind's case.
    pub fn check(self, name: &str) -> Result<()> {
        let case = self.case();
        if case.matches(name) {
            Ok(())
        } else {
            Err(DeclarationError::InvalidName {
                kind: self,
                name: name.to_string(),
                case,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_case() {
        assert!(is_pascal_case("Cons"));
        assert!(is_pascal_case("Range2"));
        assert!(!is_pascal_case("cons"));
        assert!(!is_pascal_case("Snake_Case"));
        assert!(!is_pascal_case(""));
        assert!(!is_pascal_case("_"));
    }

    #[test]
    fn test_camel_case() {
        assert!(is_camel_case("toValue"));
        assert!(is_camel_case("sum"));
        assert!(!is_camel_case("Sum"));
        assert!(!is_camel_case("to_value"));
        assert!(!is_camel_case("2x"));
    }

    #[test]
    fn test_check_reports_kind_and_case() {
        let err = NameKind::Generator.check("range").unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"declaration error: generator name `range` must be PascalCase"
        );
        assert!(NameKind::Operation.check("toValue").is_ok());
    }
}

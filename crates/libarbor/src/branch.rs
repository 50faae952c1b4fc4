//! Branch-name validation applied before a claim leaves the client.

use crate::error::{ArborError, Result};

/// Substrings git refuses in ref names.
const FORBIDDEN: &[&str] = &[" ", "..", "~", "^", ":", "?", "*", "[", "\\", "@{", "//"];

/// Check that `branch` is an acceptable git branch name.
///
/// The rules are a practical subset of `git check-ref-format`: enough to
/// reject anything the daemon would choke on without shelling out just to
/// validate an argument.
pub fn validate_branch_name(branch: &str) -> Result<()> {
    if branch.is_empty() {
        return Err(ArborError::InvalidArgument(
            "branch name cannot be empty".to_string(),
        ));
    }

    for token in FORBIDDEN {
        if branch.contains(token) {
            return Err(ArborError::InvalidArgument(format!(
                "branch name contains invalid sequence: '{token}'"
            )));
        }
    }

    if branch.starts_with('.') || branch.starts_with('-') {
        return Err(ArborError::InvalidArgument(
            "branch name cannot start with '.' or '-'".to_string(),
        ));
    }

    if branch.ends_with('.') || branch.ends_with('/') {
        return Err(ArborError::InvalidArgument(
            "branch name cannot end with '.' or '/'".to_string(),
        ));
    }

    if branch == "@" {
        return Err(ArborError::InvalidArgument(
            "branch name cannot be '@'".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["main", "feat-1", "feature/login", "release/v1.2.3", "a"] {
            assert!(validate_branch_name(name).is_ok(), "rejected {name}");
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn rejects_forbidden_sequences() {
        for name in [
            "has space",
            "dots..dots",
            "til~de",
            "car^et",
            "co:lon",
            "que?ry",
            "st*ar",
            "brack[et",
            "back\\slash",
            "at@{ref",
            "double//slash",
        ] {
            assert!(validate_branch_name(name).is_err(), "accepted {name}");
        }
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(validate_branch_name(".hidden").is_err());
        assert!(validate_branch_name("-flag").is_err());
        assert!(validate_branch_name("trailing.").is_err());
        assert!(validate_branch_name("trailing/").is_err());
        assert!(validate_branch_name("@").is_err());
    }
}

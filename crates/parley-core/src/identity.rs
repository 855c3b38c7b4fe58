//! Connection identities.
//!
//! An identity is an opaque, caller-supplied token. It is stored exactly
//! as given but matched case-insensitively for routing. Identities are
//! not authenticated.

/// A connection identity.
pub type Identity = String;

/// Validate an identity string before a session is created.
///
/// # Errors
///
/// Returns an error message if the identity is unusable.
pub fn validate_identity(identity: &str) -> Result<(), &'static str> {
    if identity.is_empty() {
        return Err("identity cannot be empty");
    }
    Ok(())
}

/// Exact identity equality, ignoring case.
///
/// This is not a prefix or substring match: "al" does not match "alice".
#[must_use]
pub fn identity_matches(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        a.eq_ignore_ascii_case(b)
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identity() {
        assert!(validate_identity("alice").is_ok());
        assert!(validate_identity("").is_err());
    }

    #[test]
    fn test_identity_matches_ignores_case() {
        assert!(identity_matches("alice", "alice"));
        assert!(identity_matches("Alice", "alice"));
        assert!(identity_matches("ALICE", "aLiCe"));
        assert!(!identity_matches("alice", "bob"));
    }

    #[test]
    fn test_identity_matches_is_exact_not_prefix() {
        assert!(!identity_matches("al", "alice"));
        assert!(!identity_matches("alice2", "alice"));
    }

    #[test]
    fn test_identity_matches_non_ascii() {
        assert!(identity_matches("Łukasz", "łukasz"));
        assert!(!identity_matches("Łukasz", "lukasz"));
    }
}

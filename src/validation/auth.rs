use crate::crypto::token::IdentityError;

/// Longest subject id the session record table can hold.
pub const MAX_SUBJECT_LEN: usize = 255;
/// Longest token text accepted for decoding. Real tokens stay well below this.
pub const MAX_TOKEN_LEN: usize = 1024;

/// Validates a subject id before it is sealed into a token.
///
/// # Arguments
///
/// * `subject_id` - The provider-issued subject id (openid).
///
/// # Returns
///
/// A `Result<()>` indicating whether the subject id is acceptable.
pub fn validate_subject_id(subject_id: &str) -> Result<(), IdentityError> {
    if subject_id.is_empty() {
        return Err(IdentityError::EmptySubject);
    }

    if subject_id.len() > MAX_SUBJECT_LEN {
        return Err(IdentityError::SubjectTooLong(MAX_SUBJECT_LEN));
    }

    Ok(())
}

/// Cheap shape check on client-supplied token text, done before any key lookup.
pub fn validate_token_text(token: &str) -> Result<(), IdentityError> {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(IdentityError::MalformedToken);
    }

    if !token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(IdentityError::MalformedToken);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_bounds() {
        assert!(matches!(validate_subject_id(""), Err(IdentityError::EmptySubject)));
        assert!(validate_subject_id("owx_abc123").is_ok());
        assert!(validate_subject_id(&"o".repeat(MAX_SUBJECT_LEN)).is_ok());
        assert!(matches!(
            validate_subject_id(&"o".repeat(MAX_SUBJECT_LEN + 1)),
            Err(IdentityError::SubjectTooLong(MAX_SUBJECT_LEN))
        ));
    }

    #[test]
    fn token_text_must_be_url_safe_base64() {
        assert!(validate_token_text("AQIDBA-_xyz").is_ok());
        assert!(validate_token_text("").is_err());
        assert!(validate_token_text("abc=").is_err());
        assert!(validate_token_text("ab+c/").is_err());
        assert!(validate_token_text(&"A".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }
}

use crate::error::AppError;

/// Syntactic check, same rules the SMTP layer applies to recipients
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.parse::<lettre::Address>().is_ok()
}

pub fn require_email(field: &str, email: &str) -> Result<(), AppError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("{field} must be a valid email address")))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::bad_request(format!("{field} is required")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_addresses() {
        assert!(is_valid_email("john.doe@company.com"));
        assert!(is_valid_email("hr+payroll@sub.example.org"));
        assert!(is_valid_email("  padded@example.com  "));
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "   ", "john", "john@", "@company.com", "john doe@company.com", "a@@b.com"] {
            assert!(!is_valid_email(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn non_empty_check_trims() {
        assert!(require_non_empty("name", "  ").is_err());
        assert!(require_non_empty("name", "Finance").is_ok());
    }
}

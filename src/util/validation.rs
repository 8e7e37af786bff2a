//! Input validation shared by enrollment and admission.

use crate::core::WaitlistError;

/// Longest accepted email address.
pub const MAX_EMAIL_LEN: usize = 254;
/// Longest accepted company name.
pub const MAX_COMPANY_NAME_LEN: usize = 200;
/// Longest accepted applicant message.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Trim and lowercase an email address, rejecting malformed input.
///
/// The check is structural (one `@`, non-empty local part, dotted domain without
/// empty labels); deliverability is the notifier's concern.
pub fn normalize_email(raw: &str) -> Result<String, WaitlistError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(WaitlistError::Validation("email is required".into()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(WaitlistError::Validation(format!(
            "email must be at most {MAX_EMAIL_LEN} characters"
        )));
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(malformed(&email));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(malformed(&email));
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return Err(malformed(&email));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2
        || labels
            .iter()
            .any(|label| label.is_empty() || label.starts_with('-') || label.ends_with('-'))
    {
        return Err(malformed(&email));
    }

    Ok(email)
}

fn malformed(email: &str) -> WaitlistError {
    WaitlistError::Validation(format!("`{email}` is not a valid email address"))
}

/// Trim a required text field and enforce its length limit.
pub fn require_text(field: &str, value: &str, max_len: usize) -> Result<String, WaitlistError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WaitlistError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(WaitlistError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value.to_string())
}

/// Trim an optional text field; blank becomes `None`.
pub fn optional_text(
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, WaitlistError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => require_text(field, text, max_len).map(Some),
    }
}

//! Normalization of user-supplied identity fields
//! ----------------------------------------------
//! Single place that decides what a username, email or display name looks like before it
//! reaches the store. Free text is escaped on write so that stored values can be dropped
//! into markup without further treatment.

pub const MAX_USERNAME_LEN: usize = 150;

/// Trim and validate a username. Usernames are compared case-sensitively.
pub fn normalize_username(raw: &str) -> Result<String, &'static str> {
    let name = raw.trim();
    if name.is_empty() { return Err("username must not be empty"); }
    if name.chars().count() > MAX_USERNAME_LEN { return Err("username is too long"); }
    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err("username must not contain whitespace or control characters");
    }
    Ok(name.to_string())
}

/// Empty input means "no email".
pub fn normalize_email(raw: &str) -> Result<Option<String>, &'static str> {
    let email = raw.trim();
    if email.is_empty() { return Ok(None); }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) => {
            Ok(Some(email.to_string()))
        }
        _ => Err("email address is not valid"),
    }
}

/// Escape markup-significant characters (`& < > " '`) in free text.
pub fn escape_markup(raw: &str) -> String {
    html_escape::encode_quoted_attribute(raw.trim()).into_owned()
}

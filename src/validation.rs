use once_cell::sync::Lazy;
use regex::Regex;

/// Access codes are exactly four characters with no whitespace.
pub fn is_valid_access_code(code: &str) -> Result<(), String> {
    match code.chars().count() == 4
        && code.chars().all(|c| c.is_ascii() && !c.is_whitespace())
    {
        true => Ok(()),
        false => Err(
            "access code should be exactly 4 characters without spaces"
                .to_string(),
        ),
    }
}

pub fn is_valid_email(string: &str) -> Result<(), String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$")
            .unwrap()
    });
    match RE.is_match(string) {
        true => Ok(()),
        false => Err("invalid email".to_string()),
    }
}

/// Trims `value` and maps the empty string to `None`.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[test]
fn test_email() {
    assert!(is_valid_email("ana.oliveira@empresa.com").is_ok());
    assert!(is_valid_email("not an email").is_err());
}

#[cfg(test)]
#[test]
fn test_access_code() {
    assert!(is_valid_access_code("1234").is_ok());
    assert!(is_valid_access_code("12 4").is_err());
    assert!(is_valid_access_code("12345").is_err());
}

/// Mask an email address unless it already appears verbatim in the user's
/// query (case-insensitive) — in which case the user already supplied it
/// and redaction would add nothing.
///
/// `<first-char>***@***.<tld>` when a TLD can be extracted, else
/// `<first-char>***@***`.
pub fn mask_email(email: &str, query: Option<&str>) -> String {
    if let Some(q) = query {
        if q.to_lowercase().contains(&email.to_lowercase()) {
            return email.to_string();
        }
    }

    let Some((local, domain)) = email.split_once('@') else {
        return "***".to_string();
    };

    let masked_local = match local.chars().next() {
        Some(c) => format!("{}***", c),
        None => "***".to_string(),
    };

    let masked_domain = match domain.rsplit('.').next() {
        Some(tld) if domain.contains('.') => format!("***.{}", tld),
        _ => "***".to_string(),
    };

    format!("{}@{}", masked_local, masked_domain)
}

/// Best-effort first/last name extraction from an email-like user id.
/// Splits the local part on `. _ - +`, title-cases each token.
pub fn derive_name(user_id: &str) -> (Option<String>, Option<String>) {
    let local_part = user_id.split('@').next().unwrap_or(user_id).trim();
    if local_part.is_empty() {
        return (None, None);
    }

    let tokens: Vec<String> = split_local_part(local_part);
    if tokens.is_empty() {
        return (None, None);
    }

    if tokens.len() == 1 {
        return (Some(title_case(&tokens[0])), None);
    }

    let first = title_case(&tokens[0]);
    let last = title_case(tokens.last().unwrap());
    (Some(first), Some(last))
}

fn split_local_part(local: &str) -> Vec<String> {
    let normalized: String = local
        .chars()
        .map(|c| if matches!(c, '.' | '_' | '-' | '+') { ' ' } else { c })
        .collect();
    normalized
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_email_keeps_verbatim_match() {
        let masked = mask_email("alice@example.com", Some("contact alice@example.com please"));
        assert_eq!(masked, "alice@example.com");
    }

    #[test]
    fn mask_email_redacts_with_tld() {
        let masked = mask_email("alice@example.com", Some("what about my order"));
        assert_eq!(masked, "a***@***.com");
    }

    #[test]
    fn mask_email_redacts_without_tld() {
        let masked = mask_email("alice@localhost", None);
        assert_eq!(masked, "a***@***");
    }

    #[test]
    fn derive_name_splits_on_separators() {
        let (first, last) = derive_name("n.baudrey-smith@example.com");
        assert_eq!(first.as_deref(), Some("N"));
        assert_eq!(last.as_deref(), Some("Smith"));
    }

    #[test]
    fn derive_name_single_token() {
        let (first, last) = derive_name("alice@example.com");
        assert_eq!(first.as_deref(), Some("Alice"));
        assert_eq!(last, None);
    }
}

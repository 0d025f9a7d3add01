use super::{Profile, ProfileLink};

const MAX_SUMMARY_CHARS: usize = 2000;
const MIN_PHONE_DIGITS: usize = 7;

/// Checks a loaded profile, collecting every problem rather than stopping at
/// the first. An empty result means the profile is valid.
///
/// Rules:
/// - `full_name` is required
/// - `email`, when present, looks like `local@domain.tld` without whitespace
/// - `phone`, when present, has at least 7 digits
/// - every link has a label and an http(s) URL
/// - `summary` stays under 2000 characters
pub fn validate_profile(profile: &Profile) -> Vec<String> {
    let mut problems = Vec::new();

    if profile.full_name.trim().is_empty() {
        problems.push("full_name must not be empty".to_string());
    }

    if let Some(email) = &profile.email {
        if !is_plausible_email(email) {
            problems.push(format!("email '{email}' is not a valid address"));
        }
    }

    if let Some(phone) = &profile.phone {
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < MIN_PHONE_DIGITS {
            problems.push(format!("phone '{phone}' has fewer than {MIN_PHONE_DIGITS} digits"));
        }
    }

    for (i, link) in profile.links.iter().enumerate() {
        problems.extend(validate_link(i, link));
    }

    if let Some(summary) = &profile.summary {
        if summary.chars().count() > MAX_SUMMARY_CHARS {
            problems.push(format!("summary exceeds {MAX_SUMMARY_CHARS} characters"));
        }
    }

    problems
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}

fn validate_link(index: usize, link: &ProfileLink) -> Vec<String> {
    let mut problems = Vec::new();
    if link.label.trim().is_empty() {
        problems.push(format!("links[{index}].label must not be empty"));
    }
    if !(link.url.starts_with("https://") || link.url.starts_with("http://")) {
        problems.push(format!("links[{index}].url must be an http(s) URL"));
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            full_name: "Sam Rivera".to_string(),
            email: Some("sam@example.com".to_string()),
            phone: Some("+1 (212) 555-0100".to_string()),
            location: Some("New York, NY".to_string()),
            headline: None,
            summary: None,
            links: vec![ProfileLink {
                label: "GitHub".to_string(),
                url: "https://github.com/sam".to_string(),
            }],
            target_roles: vec!["Data Engineer".to_string()],
            work_authorization: None,
        }
    }

    #[test]
    fn test_valid_profile_passes() {
        assert!(validate_profile(&profile()).is_empty());
    }

    #[test]
    fn test_collects_every_problem() {
        let mut p = profile();
        p.full_name = "  ".to_string();
        p.email = Some("sam at example".to_string());
        p.links[0].url = "github.com/sam".to_string();
        let problems = validate_profile(&p);
        assert_eq!(problems.len(), 3, "{problems:?}");
    }

    #[test]
    fn test_email_rules() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a b@c.co"));
        assert!(!is_plausible_email("a@b@c.co"));
    }

    #[test]
    fn test_short_phone_rejected() {
        let mut p = profile();
        p.phone = Some("555-01".to_string());
        assert_eq!(validate_profile(&p).len(), 1);
    }

    #[test]
    fn test_long_summary_rejected() {
        let mut p = profile();
        p.summary = Some("x".repeat(MAX_SUMMARY_CHARS + 1));
        assert_eq!(validate_profile(&p).len(), 1);
    }
}

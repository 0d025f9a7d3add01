//! Candidate profile handed to the document generator.
//!
//! Loaded from a JSON file with unknown fields rejected, then validated once.
//! Tailoring only accepts a `ValidatedProfile`.

use std::ops::Deref;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub mod validation;

pub use validation::validate_profile;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse profile JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid profile: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub links: Vec<ProfileLink>,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub work_authorization: Option<String>,
}

impl Profile {
    pub fn from_json(json: &str) -> Result<ValidatedProfile, ProfileError> {
        let profile: Profile = serde_json::from_str(json)?;
        profile.validate()
    }

    pub fn load(path: &Path) -> Result<ValidatedProfile, ProfileError> {
        let raw = std::fs::read_to_string(path)?;
        let validated = Self::from_json(&raw)?;
        info!("Loaded profile for {} from {}", validated.full_name, path.display());
        Ok(validated)
    }

    pub fn validate(self) -> Result<ValidatedProfile, ProfileError> {
        let problems = validate_profile(&self);
        if problems.is_empty() {
            Ok(ValidatedProfile(self))
        } else {
            Err(ProfileError::Invalid(problems))
        }
    }
}

/// A profile that passed `validate_profile`. Only constructible through
/// `Profile::validate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedProfile(Profile);

impl Deref for ValidatedProfile {
    type Target = Profile;

    fn deref(&self) -> &Profile {
        &self.0
    }
}

impl ValidatedProfile {
    /// Plain-text block for generation prompts. Absent fields are skipped.
    pub fn render(&self) -> String {
        let p = &self.0;
        let mut lines = vec![format!("Name: {}", p.full_name)];
        let optional = [
            ("Headline", &p.headline),
            ("Location", &p.location),
            ("Email", &p.email),
            ("Phone", &p.phone),
            ("Work authorization", &p.work_authorization),
            ("Summary", &p.summary),
        ];
        for (label, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                lines.push(format!("{label}: {value}"));
            }
        }
        if !p.target_roles.is_empty() {
            lines.push(format!("Target roles: {}", p.target_roles.join(", ")));
        }
        for link in &p.links {
            lines.push(format!("{}: {}", link.label, link.url));
        }
        lines.join("\n")
    }
}

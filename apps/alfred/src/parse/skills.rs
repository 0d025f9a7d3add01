//! Dictionary-based extraction: skills, requirement lines, seniority.
//!
//! Deterministic and cheap enough to run on every artifact during ranking.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::{clean_text, ExtractionError, TextExtractor};
use crate::models::job::{ParsedPosting, Requirement, SkillSet};

const SKILL_DICTIONARY: &[(&str, &[&str])] = &[
    (
        "languages",
        &[
            "python", "r", "java", "javascript", "typescript", "scala", "sql", "bash", "shell",
            "c++", "c#", "go", "rust",
        ],
    ),
    (
        "cloud",
        &[
            "aws", "amazon web services", "azure", "gcp", "google cloud", "lambda", "s3", "ec2",
            "glue", "athena", "redshift", "emr", "bedrock", "sagemaker",
        ],
    ),
    (
        "data_eng",
        &[
            "airflow", "dbt", "spark", "pyspark", "kafka", "flink", "etl", "elt",
            "data pipeline", "data warehousing", "snowflake", "databricks", "bigquery",
        ],
    ),
    (
        "ml_ai",
        &[
            "machine learning", "deep learning", "neural network", "gradient boosting",
            "xgboost", "random forest", "logistic regression", "linear regression", "pytorch",
            "tensorflow", "keras", "scikit-learn", "llm", "rag",
            "retrieval augmented generation", "embeddings", "nlp",
            "natural language processing",
        ],
    ),
    (
        "databases",
        &[
            "postgres", "postgresql", "mysql", "sql server", "oracle", "mongo", "mongodb",
            "redis", "snowflake", "redshift",
        ],
    ),
    (
        "frontend",
        &["react", "vue", "angular", "css", "html", "tailwind", "next.js", "svelte"],
    ),
    (
        "tools",
        &[
            "git", "github", "docker", "kubernetes", "terraform", "ansible", "linux", "unix",
            "jenkins", "ci/cd",
        ],
    ),
    (
        "analytics",
        &[
            "pandas", "numpy", "matplotlib", "seaborn", "tableau", "power bi", "looker",
            "excel", "statistics",
        ],
    ),
    (
        "security",
        &[
            "cybersecurity", "iam", "identity and access management", "encryption",
            "zero trust", "siem", "soc", "nmap", "wireshark",
        ],
    ),
    (
        "certs",
        &[
            "aws certified solutions architect", "aws csa", "aws certified cloud practitioner",
            "aws ccp", "aws certified ai practitioner", "google cybersecurity certificate",
            "security+", "ccsp", "cissp",
        ],
    ),
];

/// Checked in order; the first hit wins.
const SENIORITY_MARKERS: &[(&str, &str)] = &[
    ("intern", "intern"),
    ("internship", "intern"),
    ("principal", "principal"),
    ("staff", "staff"),
    ("lead", "lead"),
    ("senior", "senior"),
    ("sr", "senior"),
    ("junior", "junior"),
    ("jr", "junior"),
    ("entry level", "junior"),
    ("mid-level", "mid"),
    ("mid level", "mid"),
];

const REQUIRED_MARKERS: &[&str] = &[
    "required",
    "must",
    "minimum",
    "years of experience",
    "years experience",
    "experience with",
    "experience in",
    "proficien",
    "degree",
    "qualifications",
];

const PREFERRED_MARKERS: &[&str] = &["preferred", "nice to have", "a plus", "bonus"];

const MAX_REQUIREMENTS: usize = 15;

/// Matches a term only when it is not glued to other word characters.
/// `\b` cannot be used because terms like `c++` and `c#` end in non-word characters.
fn term_pattern(term: &str) -> Regex {
    let pattern = format!(r"(?:^|[^a-z0-9+#]){}(?:$|[^a-z0-9+#])", regex::escape(term));
    Regex::new(&pattern).expect("dictionary terms escape to valid regexes")
}

fn compiled_dictionary() -> &'static [(&'static str, Vec<(&'static str, Regex)>)] {
    static COMPILED: OnceLock<Vec<(&'static str, Vec<(&'static str, Regex)>)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SKILL_DICTIONARY
            .iter()
            .map(|(category, terms)| {
                let compiled = terms.iter().map(|t| (*t, term_pattern(t))).collect();
                (*category, compiled)
            })
            .collect()
    })
}

fn compiled_seniority() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SENIORITY_MARKERS
            .iter()
            .map(|(marker, level)| (term_pattern(marker), *level))
            .collect()
    })
}

fn segment_splitter() -> &'static Regex {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"[\n;•·]|\.\s").expect("static regex"))
}

/// Finds dictionary skills in `text`, grouped by category.
pub fn extract_skills(text: &str) -> SkillSet {
    let normalized = clean_text(text).to_lowercase();
    let categories = compiled_dictionary().iter().map(|(category, terms)| {
        let hits: Vec<&str> = terms
            .iter()
            .filter(|(_, re)| re.is_match(&normalized))
            .map(|(term, _)| *term)
            .collect();
        (category.to_string(), hits)
    });
    SkillSet::from_categories(categories)
}

/// Pulls requirement-like sentences out of a description.
pub fn extract_requirements(text: &str) -> Vec<Requirement> {
    let mut requirements: Vec<Requirement> = Vec::new();
    for segment in segment_splitter().split(text) {
        let sentence = clean_text(segment);
        let lower = sentence.to_lowercase();
        if sentence.len() < 8 {
            continue;
        }
        let preferred = PREFERRED_MARKERS.iter().any(|m| lower.contains(m));
        let required = REQUIRED_MARKERS.iter().any(|m| lower.contains(m));
        if !(preferred || required) {
            continue;
        }
        if requirements.iter().any(|r| r.text.eq_ignore_ascii_case(&sentence)) {
            continue;
        }
        requirements.push(Requirement {
            text: sentence,
            is_required: !preferred,
        });
        if requirements.len() == MAX_REQUIREMENTS {
            break;
        }
    }
    requirements
}

pub fn detect_seniority(text: &str) -> Option<String> {
    let normalized = clean_text(text).to_lowercase();
    compiled_seniority()
        .iter()
        .find(|(re, _)| re.is_match(&normalized))
        .map(|(_, level)| level.to_string())
}

/// Pure-Rust extractor. Fails only on blank input.
pub struct KeywordExtractor;

#[async_trait]
impl TextExtractor for KeywordExtractor {
    async fn extract(&self, text: &str) -> Result<ParsedPosting, ExtractionError> {
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyText);
        }
        Ok(ParsedPosting {
            skills: extract_skills(text),
            requirements: extract_requirements(text),
            seniority: detect_seniority(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_ENGINEER_JD: &str = "Senior Data Engineer\n\
        We build ETL pipelines in Python and Spark on AWS.\n\
        Requirements: 5+ years of experience with SQL and Airflow.\n\
        Kubernetes experience is a plus; C++ or C# is nice to have.";

    #[test]
    fn test_extract_skills_groups_by_category() {
        let skills = extract_skills(DATA_ENGINEER_JD);
        assert_eq!(
            skills.by_category.get("data_eng").unwrap(),
            &vec!["airflow".to_string(), "etl".to_string(), "spark".to_string()]
        );
        assert!(skills.all.contains(&"python".to_string()));
        assert!(skills.all.contains(&"aws".to_string()));
        assert!(skills.all.contains(&"kubernetes".to_string()));
    }

    #[test]
    fn test_symbol_terms_match() {
        let skills = extract_skills(DATA_ENGINEER_JD);
        assert!(skills.all.contains(&"c++".to_string()));
        assert!(skills.all.contains(&"c#".to_string()));
    }

    #[test]
    fn test_terms_do_not_match_inside_words() {
        // "go" must not fire on "google", "r" must not fire on "react"
        let skills = extract_skills("Experience with Google Cloud and React");
        assert!(!skills.all.contains(&"go".to_string()));
        assert!(!skills.all.contains(&"r".to_string()));
        assert!(skills.all.contains(&"google cloud".to_string()));
        assert!(skills.all.contains(&"react".to_string()));
    }

    #[test]
    fn test_extract_requirements_marks_preferred() {
        let reqs = extract_requirements(DATA_ENGINEER_JD);
        let required: Vec<_> = reqs.iter().filter(|r| r.is_required).collect();
        let preferred: Vec<_> = reqs.iter().filter(|r| !r.is_required).collect();
        assert_eq!(required.len(), 1);
        assert!(required[0].text.contains("5+ years"));
        assert_eq!(preferred.len(), 2);
    }

    #[test]
    fn test_detect_seniority() {
        assert_eq!(detect_seniority("Senior Data Engineer").as_deref(), Some("senior"));
        assert_eq!(detect_seniority("Staff Engineer, Platform").as_deref(), Some("staff"));
        assert_eq!(detect_seniority("Data Engineer"), None);
    }

    #[tokio::test]
    async fn test_keyword_extractor_rejects_blank_text() {
        let err = KeywordExtractor.extract("  \n ").await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyText));
    }

    #[tokio::test]
    async fn test_keyword_extractor_fills_all_fields() {
        let parsed = KeywordExtractor.extract(DATA_ENGINEER_JD).await.unwrap();
        assert!(!parsed.skills.is_empty());
        assert!(!parsed.requirements.is_empty());
        assert_eq!(parsed.seniority.as_deref(), Some("senior"));
    }
}

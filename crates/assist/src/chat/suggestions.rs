use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

pub const MIN_SUGGESTIONS: usize = 2;
pub const MAX_SUGGESTIONS: usize = 3;
pub const FALLBACK_CATEGORY: &str = "default";

/// One quick-reply prompt offered after an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
}

impl Suggestion {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionRule {
    pub category: String,
    pub keywords: Vec<String>,
    pub labels: Vec<String>,
}

impl SuggestionRule {
    pub fn new<K, L>(category: impl Into<String>, keywords: K, labels: L) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            category: category.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, lowered_reply: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| lowered_reply.contains(keyword.as_str()))
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SuggestionTableError {
    #[snafu(display("suggestion rule '{category}' has no keywords"))]
    EmptyKeywords {
        stage: &'static str,
        category: String,
    },
    #[snafu(display(
        "suggestion row '{category}' has {count} labels, expected {MIN_SUGGESTIONS} to {MAX_SUGGESTIONS}"
    ))]
    LabelCount {
        stage: &'static str,
        category: String,
        count: usize,
    },
}

pub type SuggestionTableResult<T> = Result<T, SuggestionTableError>;

/// Ordered `(keywords, labels)` rows evaluated top to bottom against the lower-cased
/// reply; the first row with a contained keyword wins, otherwise `fallback` applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionTable {
    rules: Vec<SuggestionRule>,
    fallback: Vec<String>,
}

impl Default for SuggestionTable {
    fn default() -> Self {
        Self {
            rules: vec![
                SuggestionRule::new(
                    "career",
                    ["career"],
                    [
                        "🔎 Explore career options",
                        "🛠 Recommend skills to learn",
                        "🎯 Help me choose a path",
                    ],
                ),
                SuggestionRule::new(
                    "skills",
                    ["skills"],
                    [
                        "📚 Show skill-building resources",
                        "🏆 Recommended certifications",
                    ],
                ),
                SuggestionRule::new(
                    "project",
                    ["project"],
                    ["💻 Suggest projects", "🚀 Help me build a portfolio"],
                ),
            ],
            fallback: vec![
                "🤔 Tell me more".to_string(),
                "🔍 Explore more topics".to_string(),
                "📈 Guide my growth".to_string(),
            ],
        }
    }
}

impl SuggestionTable {
    pub fn new(rules: Vec<SuggestionRule>, fallback: Vec<String>) -> SuggestionTableResult<Self> {
        Self { rules, fallback }.validated()
    }

    /// Checks row shapes and lower-cases keywords so matching stays case-insensitive.
    pub fn validated(mut self) -> SuggestionTableResult<Self> {
        for rule in &mut self.rules {
            rule.keywords = rule
                .keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect();

            ensure!(
                !rule.keywords.is_empty(),
                EmptyKeywordsSnafu {
                    stage: "validate-suggestion-keywords",
                    category: rule.category.clone(),
                }
            );
            ensure_label_count(&rule.category, rule.labels.len())?;
        }

        ensure_label_count(FALLBACK_CATEGORY, self.fallback.len())?;
        Ok(self)
    }

    pub fn rules(&self) -> &[SuggestionRule] {
        &self.rules
    }

    /// Name of the row that answers `reply`.
    pub fn category_for(&self, reply: &str) -> &str {
        let lowered = reply.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map_or(FALLBACK_CATEGORY, |rule| rule.category.as_str())
    }

    pub fn generate(&self, reply: &str) -> Vec<Suggestion> {
        let lowered = reply.to_lowercase();
        let labels = self
            .rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map_or(&self.fallback, |rule| &rule.labels);

        labels.iter().map(Suggestion::new).collect()
    }
}

fn ensure_label_count(category: &str, count: usize) -> SuggestionTableResult<()> {
    ensure!(
        (MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&count),
        LabelCountSnafu {
            stage: "validate-suggestion-labels",
            category: category.to_string(),
            count,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions
            .iter()
            .map(|suggestion| suggestion.label.as_str())
            .collect()
    }

    #[test]
    fn career_keyword_selects_career_row() {
        let table = SuggestionTable::default();
        let suggestions = table.generate("Consider a career in backend engineering");

        assert_eq!(table.category_for("Consider a career in backend engineering"), "career");
        assert_eq!(
            labels(&suggestions),
            [
                "🔎 Explore career options",
                "🛠 Recommend skills to learn",
                "🎯 Help me choose a path",
            ]
        );
    }

    #[test]
    fn first_matching_row_wins_over_later_rows() {
        let table = SuggestionTable::default();
        // Mentions both skills and project; skills is listed first.
        let reply = "Build SKILLS through a side Project";
        assert_eq!(table.category_for(reply), "skills");
        assert_eq!(table.generate(reply).len(), 2);
    }

    #[test]
    fn no_keyword_falls_back_to_default_row() {
        let table = SuggestionTable::default();
        let suggestions = table.generate("Hi there!");
        assert_eq!(table.category_for("Hi there!"), FALLBACK_CATEGORY);
        assert_eq!(
            labels(&suggestions),
            ["🤔 Tell me more", "🔍 Explore more topics", "📈 Guide my growth"]
        );
        assert_eq!(table.generate("").len(), 3);
    }

    #[test]
    fn output_is_deterministic_and_bounded() {
        let table = SuggestionTable::default();
        for reply in ["career", "skills", "project", "anything else", "CAREER PROJECT"] {
            let first = table.generate(reply);
            assert_eq!(first, table.generate(reply));
            assert!((MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&first.len()));
        }
    }

    #[test]
    fn custom_keywords_are_matched_case_insensitively() {
        let table = SuggestionTable::new(
            vec![SuggestionRule::new(
                "interview",
                ["  Interview "],
                ["🎤 Mock interview", "📝 Common questions"],
            )],
            vec!["More".to_string(), "Less".to_string()],
        )
        .unwrap();

        assert_eq!(table.category_for("Prepare for the INTERVIEW"), "interview");
        assert_eq!(table.rules()[0].keywords, ["interview"]);
    }

    #[test]
    fn rows_outside_label_bounds_are_rejected() {
        let error = SuggestionTable::new(
            vec![SuggestionRule::new("career", ["career"], ["only one"])],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap_err();
        assert!(matches!(error, SuggestionTableError::LabelCount { count: 1, .. }));

        let error = SuggestionTable::new(Vec::new(), vec!["a".to_string(); 4]).unwrap_err();
        assert!(matches!(
            error,
            SuggestionTableError::LabelCount { ref category, count: 4, .. } if category == FALLBACK_CATEGORY
        ));
    }

    #[test]
    fn rules_without_keywords_are_rejected() {
        let error = SuggestionTable::new(
            vec![SuggestionRule::new("empty", ["   "], ["a", "b"])],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap_err();
        assert!(matches!(error, SuggestionTableError::EmptyKeywords { .. }));
    }
}

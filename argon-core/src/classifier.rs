//! Keyword-based choice of retrieval tool and model for a query.

use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::{GeoPoint, StreamOptions, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    General,
    Search,
    Places,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::General => write!(f, "general"),
            RetrievalMode::Search => write!(f, "search"),
            RetrievalMode::Places => write!(f, "places"),
        }
    }
}

struct Rule {
    mode: RetrievalMode,
    keywords: &'static [&'static str],
}

// Evaluated top to bottom; the first matching rule wins.
const RULES: &[Rule] = &[
    Rule {
        mode: RetrievalMode::Places,
        keywords: &[
            "nearby",
            "near me",
            "restaurants",
            "cafes",
            "shops",
            "directions",
            "location of",
            "address of",
            "what is around me",
        ],
    },
    Rule {
        mode: RetrievalMode::Search,
        keywords: &[
            "latest news",
            "who won",
            "what is happening",
            "current events",
            "stock market",
            "weather in",
            "fact about",
            "how to",
            "explain",
        ],
    },
];

/// Selects the retrieval mode for `text` by case-insensitive substring match.
pub fn classify(text: &str) -> RetrievalMode {
    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
        .map(|rule| rule.mode)
        .unwrap_or(RetrievalMode::General)
}

/// Model variants requested per retrieval mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelTable {
    pub fast: String,
    pub pro: String,
    pub search: String,
    pub places: String,
    /// General queries with more words than this go to `pro`.
    pub pro_word_threshold: usize,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            fast: "gemini-3-flash-preview".to_string(),
            pro: "gemini-3-pro-preview".to_string(),
            search: "gemini-3-flash-preview".to_string(),
            places: "gemini-2.5-flash".to_string(),
            pro_word_threshold: 20,
        }
    }
}

/// Mode and backend options chosen for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub mode: RetrievalMode,
    pub options: StreamOptions,
}

impl QueryPlan {
    pub fn for_query(text: &str, location: Option<GeoPoint>, models: &ModelTable) -> Self {
        let mode = classify(text);
        let options = match mode {
            RetrievalMode::Search => StreamOptions {
                model: models.search.clone(),
                tool: Tool::Search,
                tool_context: None,
            },
            RetrievalMode::Places => {
                if location.is_none() {
                    warn!("No location known for places query, sending without location context");
                }
                StreamOptions {
                    model: models.places.clone(),
                    tool: Tool::Places,
                    tool_context: location,
                }
            }
            RetrievalMode::General => {
                let words = text.split(' ').count();
                let model = if words > models.pro_word_threshold {
                    &models.pro
                } else {
                    &models.fast
                };
                StreamOptions {
                    model: model.clone(),
                    tool: Tool::None,
                    tool_context: None,
                }
            }
        };

        debug!(%mode, model = %options.model, "Planned query");
        Self { mode, options }
    }
}

/// How a backend failure is reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Missing, invalid or unbilled credential.
    Credential,
    /// The service no longer recognizes the session; the client is rebuilt once.
    StaleSession,
    Generic,
}

pub(crate) const INIT_FAILED: &str =
    "Error: chat client failed to initialize. Make sure GEMINI_API_KEY is set.";
pub(crate) const NOT_INITIALIZED: &str =
    "Error: chat client is not initialized. Cannot send message.";

impl FailureClass {
    /// Classifies a failure by its description, credential patterns first.
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("api key") || lower.contains("api_key") {
            FailureClass::Credential
        } else if lower.contains("not found") {
            FailureClass::StaleSession
        } else {
            FailureClass::Generic
        }
    }

    pub fn user_message(self, description: &str) -> String {
        match self {
            FailureClass::Credential => "API key is invalid or not configured. Check that \
                GEMINI_API_KEY is correct and has billing enabled for search and maps grounding."
                .to_string(),
            FailureClass::StaleSession => "Requested entity was not found. The chat client was \
                re-initialized; check your API key and model configuration."
                .to_string(),
            FailureClass::Generic if description.is_empty() => "Error: Unknown error".to_string(),
            FailureClass::Generic => format!("Error: {}", description),
        }
    }
}

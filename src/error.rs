//! Error types shared across the classifier pipeline.
//!
//! None of these are fatal: every variant maps to a message shown to the
//! user, after which the session returns to idle.

use thiserror::Error;

/// Why the rate governor refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimited {
    #[error("⏳ Attendez {0} secondes entre chaque requête.")]
    TooSoon(u64),
    #[error("🚫 Limite de {0} requêtes atteinte.")]
    QuotaExceeded(u32),
}

/// Any failure talking to the Gemini endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot connect to {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("invalid JSON in response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            let target = e
                .url()
                .map(|u| format!("{}://{}", u.scheme(), u.host_str().unwrap_or("?")))
                .unwrap_or_else(|| "endpoint".into());
            Self::Connect(target)
        } else if e.is_timeout() {
            Self::Timeout
        } else {
            // The URL carries the API key as a query parameter.
            Self::Request(e.without_url())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("❌ Aucune voix disponible sur ce système.")]
    NoVoiceAvailable,
}

/// Reasons a submission never left the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("Entrez le nom d'un objet.")]
    EmptyQuery,
    #[error("Analyse en cours...")]
    Busy,
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
}

use thiserror::Error;

/// Anything that can go wrong talking to a knowledge provider.
///
/// Malformed *structured* payloads are not errors: they degrade to the raw
/// response text (see [`crate::ai::structured`]).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} API error {status}: {body}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{0} returned no content")]
    Empty(&'static str),

    #[error("{0} API key not configured")]
    MissingCredential(&'static str),
}

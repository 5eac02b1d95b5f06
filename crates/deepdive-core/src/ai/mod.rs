pub mod gemini;
pub mod ollama;
pub mod structured;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::provider::Provider;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Answer to a topic question plus the terms worth defining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAnswer {
    pub text: String,
    pub suggested_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermDefinition {
    pub definition: String,
    pub related: Vec<String>,
}

/// The external text-generation service the UI asks for answers and definitions.
///
/// Every failure comes back as `Err`; callers treat them all the same way.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_topic(&self, query: &str) -> Result<TopicAnswer, CollaboratorError>;

    async fn define_term(&self, term: &str, context: &str) -> Result<TermDefinition, CollaboratorError>;
}

/// Stands in for a provider whose credential is missing, so the UI still
/// starts and every request reports the problem.
pub struct Unconfigured(pub Provider);

#[async_trait]
impl KnowledgeSource for Unconfigured {
    fn name(&self) -> &'static str {
        self.0.display_name()
    }

    async fn search_topic(&self, _query: &str) -> Result<TopicAnswer, CollaboratorError> {
        Err(CollaboratorError::MissingCredential(self.0.display_name()))
    }

    async fn define_term(&self, _term: &str, _context: &str) -> Result<TermDefinition, CollaboratorError> {
        Err(CollaboratorError::MissingCredential(self.0.display_name()))
    }
}

/// Build the knowledge source for a provider from config and environment.
pub fn connect(config: &Config, provider: Provider, model: &str) -> Arc<dyn KnowledgeSource> {
    connect_with(config, provider, model, |name| std::env::var(name).ok())
}

/// [`connect`] with the environment lookup supplied by the caller.
fn connect_with(
    config: &Config,
    provider: Provider,
    model: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Arc<dyn KnowledgeSource> {
    match provider {
        Provider::Gemini => match config.gemini_api_key_with(env) {
            Some(key) => Arc::new(GeminiClient::new(&key, model)),
            None => {
                tracing::warn!("no Gemini API key found in GEMINI_API_KEY, API_KEY, or config");
                Arc::new(Unconfigured(provider))
            }
        },
        Provider::Ollama => Arc::new(OllamaClient::new(config.ollama_url(), model)),
    }
}

/// One-shot HTTP server for exercising the clients against canned replies.
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single request with `status` and a JSON `body`; returns the base URL.
    pub async fn respond_once(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;

            let response = format!(
                "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });

        format!("http://{addr}")
    }

    /// Drain headers and body so the client never sees a reset
    async fn read_request(stream: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_connects_unconfigured() {
        let source = connect_with(&Config::new(), Provider::Gemini, "gemini-2.5-flash", |_| None);
        assert_eq!(source.name(), "Gemini (Google)");

        let source = connect_with(&Config::new(), Provider::Gemini, "gemini-2.5-flash", |name| {
            (name == "GEMINI_API_KEY").then(|| "secret".to_string())
        });
        assert_eq!(source.name(), "Gemini");
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let source = connect_with(&Config::new(), Provider::Ollama, "llama3.2:latest", |_| None);
        assert_eq!(source.name(), "Ollama");
    }

    #[tokio::test]
    async fn test_unconfigured_reports_missing_credential() {
        let source = Unconfigured(Provider::Gemini);
        let err = source.search_topic("qubits").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::MissingCredential("Gemini (Google)")));
        let err = source.define_term("qubit", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Gemini (Google) API key not configured");
    }
}

use async_trait::async_trait;
use courier_core::{
    BackendConfig, BackendRequest, BackendResponse, CallError, CallResult, Error, Message, Result,
    Role, Transport,
};
use reqwest::{Client, Error as ReqwestError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Transport that posts a JSON payload to an HTTP(S) endpoint.
///
/// The endpoint, scheme and credential are fixed when the transport is built
/// from its [`BackendConfig`].
pub struct HttpTransport {
    /// HTTP client for requests.
    client: Client,
    /// Fully qualified endpoint URL.
    endpoint: String,
    /// Bearer credential, if the backend needs one.
    api_key: Option<String>,
}

impl HttpTransport {
    /// Creates a transport for the given backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend names a credential variable that is not
    /// set, or if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let api_key = config.credential();
        if let (None, Some(variable)) = (&api_key, &config.api_key_env) {
            return Err(Error::MissingCredential(format!(
                "{variable} (backend {})",
                config.name
            )));
        }

        let client = Client::builder().build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url(),
            api_key,
        })
    }

    /// Endpoint this transport posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request payload sent to the backend.
#[derive(Debug, Serialize)]
struct WireRequest<'req> {
    /// Session the request belongs to.
    session_id: &'req str,
    /// Conversation so far, ending with the new user input.
    messages: Vec<WireMessage<'req>>,
}

/// Message delivered to the backend.
#[derive(Debug, Serialize)]
struct WireMessage<'req> {
    /// Author role (`user` or `assistant`).
    role: &'static str,
    /// Textual content of the message.
    content: &'req str,
}

impl<'req> WireMessage<'req> {
    fn from_message(message: &'req Message) -> Self {
        Self {
            role: role_label(message.role),
            content: &message.text,
        }
    }
}

const fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Response payload. Either a flat `text` field or chat-completion choices.
#[derive(Debug, Deserialize)]
struct WireResponse {
    /// Flat response text.
    #[serde(default, alias = "output", alias = "response")]
    text: Option<String>,
    /// Chat-completion style candidates.
    #[serde(default)]
    choices: Vec<WireChoice>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
struct WireChoice {
    /// Message generated for the choice.
    message: WireChoiceMessage,
}

/// Message content inside a choice.
#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    /// Generated text content.
    content: String,
}

impl WireResponse {
    fn into_text(self) -> Option<String> {
        self.text.or_else(|| {
            self.choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
        })
    }
}

/// Maps a client-side failure to its category.
fn categorize(error: &ReqwestError, elapsed: Duration) -> CallError {
    if error.is_timeout() {
        CallError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    } else if error.is_decode() || error.is_body() {
        CallError::Protocol(error.to_string())
    } else {
        CallError::Connection(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn call(
        &self,
        request: &BackendRequest,
        timeout: Duration,
    ) -> CallResult<BackendResponse> {
        let start = Instant::now();

        let mut messages: Vec<WireMessage<'_>> = request
            .history
            .iter()
            .map(WireMessage::from_message)
            .collect();
        messages.push(WireMessage {
            role: "user",
            content: &request.text,
        });

        let payload = WireRequest {
            session_id: &request.session_id,
            messages,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| categorize(&err, start.elapsed()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            tracing::debug!(endpoint = %self.endpoint, %status, "backend returned error status");
            return Err(CallError::remote(status.as_u16(), error_text));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|err| categorize(&err, start.elapsed()))?;

        let text = wire
            .into_text()
            .ok_or_else(|| CallError::Protocol("response carried no text".to_owned()))?;

        Ok(BackendResponse {
            text,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

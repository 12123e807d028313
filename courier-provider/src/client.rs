//! HTTP client for the provider's "send with template" endpoint
//!
//! One request per [`SendRequest`], classified into the dispatch engine's
//! outcomes:
//!
//! | Provider answer                  | Outcome                      |
//! |----------------------------------|------------------------------|
//! | 2xx with `ErrorCode` 0           | `Ok(())`                     |
//! | 2xx with a non-zero `ErrorCode`  | [`SendError::Rejected`]      |
//! | 429                              | [`SendError::RateLimited`]   |
//! | any other status                 | [`SendError::Rejected`]      |
//! | connect / timeout / body error   | [`SendError::Transport`]     |

use async_trait::async_trait;
use courier_common::{
    outgoing,
    tracing::{self, warn},
};
use courier_dispatch::{Mailer, SendError, SendRequest, TemplateModel};
use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::{config::ProviderConfig, error::ProviderError};

pub const SERVER_TOKEN_HEADER: &str = "X-Postmark-Server-Token";

/// Numeric template ids go out as `TemplateId`, anything else as
/// `TemplateAlias`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum TemplateRef<'a> {
    TemplateId(u64),
    TemplateAlias(&'a str),
}

impl<'a> TemplateRef<'a> {
    fn parse(template: &'a str) -> Self {
        template
            .parse()
            .map_or(Self::TemplateAlias(template), Self::TemplateId)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TemplatedEmail<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(flatten)]
    template: TemplateRef<'a>,
    template_model: &'a TemplateModel,
    message_stream: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ProviderResponse {
    error_code: i64,
    message: String,
}

#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    endpoint: String,
    config: ProviderConfig,
}

impl ProviderClient {
    /// # Errors
    ///
    /// Fails if the server token is empty or the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.server_token.trim().is_empty() {
            return Err(ProviderError::MissingToken);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(status: StatusCode, body: &str) -> Result<(), SendError> {
        let response: ProviderResponse = serde_json::from_str(body).unwrap_or_default();
        let message = if response.message.is_empty() {
            status.to_string()
        } else {
            response.message
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SendError::RateLimited(message));
        }

        if !status.is_success() {
            return Err(SendError::Rejected(format!(
                "{} ({message})",
                status.as_u16()
            )));
        }

        if response.error_code != 0 {
            return Err(SendError::Rejected(format!(
                "error code {} ({message})",
                response.error_code
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Mailer for ProviderClient {
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(recipient = %request.recipient.id, template = request.template_id)
    )]
    async fn send(&self, request: SendRequest<'_>) -> Result<(), SendError> {
        let from = request
            .from
            .or(self.config.default_from.as_deref())
            .ok_or_else(|| SendError::Rejected("No sender address configured".to_string()))?;

        let body = TemplatedEmail {
            from,
            to: &request.recipient.email,
            template: TemplateRef::parse(request.template_id),
            template_model: &request.recipient.template_model,
            message_stream: &self.config.message_stream,
        };

        outgoing!(
            level = DEBUG,
            "POST {} for {}",
            self.endpoint,
            request.recipient.id
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(header::ACCEPT, "application/json")
            .header(SERVER_TOKEN_HEADER, &self.config.server_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let outcome = Self::classify(status, &text);
        match &outcome {
            Ok(()) => outgoing!(level = INFO, "Provider accepted email to {}", request.recipient.id),
            Err(e) => warn!(recipient = %request.recipient.id, %status, error = %e, "Provider refused email"),
        }

        outcome
    }
}

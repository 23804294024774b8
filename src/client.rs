use std::env;
use std::time::{Duration, Instant};

use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::service::{ChatService, DeltaStream};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatInput};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const API_KEY_VARS: [&str; 2] = ["CHATFILE_API_KEY", "OPENAI_API_KEY"];
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an OpenAI-compatible chat-completions API.
///
/// The client sets no overall request timeout; callers bound each exchange
/// with their own deadline.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    streaming: bool,
}

impl OpenAi {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the CHATFILE_API_KEY
    /// or OPENAI_API_KEY environment variables.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None)
    }

    /// Create a new client with a custom endpoint.
    ///
    /// `base_url` is the API root, e.g. `http://localhost:11434/v1`.
    pub fn with_options(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => API_KEY_VARS
                .iter()
                .find_map(|var| env::var(var).ok())
                .ok_or_else(|| {
                    Error::authentication("set CHATFILE_API_KEY or OPENAI_API_KEY")
                })?,
        };
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(Error::authentication("API key is empty"));
        }

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let client = ReqwestClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            streaming: true,
        })
    }

    /// Chooses between server-sent events and a single response.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Returns the chat-completions endpoint.
    pub fn endpoint(&self) -> Result<Url> {
        Ok(self.base_url.join("chat/completions")?)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());
        let error_message = detail
            .and_then(|e| e.message)
            .unwrap_or(error_body);

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500..=599 => Error::service_unavailable(error_message, status_code),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    async fn post(&self, input: &ChatInput, stream: bool) -> Result<Response> {
        let url = self.endpoint()?;
        let mut headers = self.default_headers()?;
        if stream {
            headers.insert(
                header::ACCEPT,
                HeaderValue::from_static("text/event-stream"),
            );
        }
        let body = ChatCompletionRequest::from_input(input, stream);

        CLIENT_REQUESTS.click();
        let start = Instant::now();
        tracing::debug!(%url, model = %input.model, stream, "sending chat completion request");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(format!("Request timed out: {}", e), None)
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::debug!(error = %err, "chat completion request rejected");
            return Err(err);
        }
        Ok(response)
    }

    /// Send a request and wait for the whole completion.
    pub async fn send(&self, input: &ChatInput) -> Result<ChatCompletion> {
        let response = self.post(input, false).await?;
        response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Send a request and get a streaming response.
    ///
    /// Returns a stream of chunks that can be processed incrementally.
    pub async fn stream(
        &self,
        input: &ChatInput,
    ) -> Result<impl Stream<Item = Result<ChatCompletionChunk>> + Send + use<>> {
        let response = self.post(input, true).await?;
        Ok(process_sse(response.bytes_stream()))
    }
}

#[async_trait::async_trait]
impl ChatService for OpenAi {
    async fn chat_stream(&self, input: &ChatInput) -> Result<DeltaStream> {
        if !self.streaming {
            let completion = self.send(input).await?;
            let text = completion.text().unwrap_or_default().to_string();
            return Ok(Box::pin(stream::once(async move { Ok(text) })));
        }
        let chunks = self.stream(input).await?;
        Ok(Box::pin(chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => chunk.text().map(|text| Ok(text.to_string())),
                Err(err) => Some(Err(err)),
            }
        })))
    }
}

use std::collections::HashMap;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::HttpError;
use crate::policy::HttpPolicy;

const MAX_REDIRECTS: usize = 5;

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
  /// Sent verbatim.
  Text(String),
  /// Serialized and sent with `content-type: application/json`.
  Json(serde_json::Value),
}

/// An outbound request as described by a script.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
  pub method: String,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<FetchBody>,
}

impl FetchRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.into(),
      headers: Vec::new(),
      body: None,
    }
  }
}

/// A fully-read response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: String,
}

impl FetchResponse {
  /// True for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// The body parsed as JSON, if it is JSON.
  pub fn json(&self) -> Option<serde_json::Value> {
    serde_json::from_str(&self.body).ok()
  }
}

/// Policy-enforcing HTTP client handed to the script sandbox.
#[derive(Debug, Clone)]
pub struct HttpClient {
  client: Client,
  policy: HttpPolicy,
}

impl HttpClient {
  /// Build a client for the given policy.
  pub fn new(policy: HttpPolicy) -> Result<Self, HttpError> {
    let redirect_policy = policy.clone();
    let client = Client::builder()
      .timeout(policy.timeout)
      .redirect(reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
          attempt.error("too many redirects")
        } else if let Err(e) = redirect_policy.permits(attempt.url()) {
          attempt.error(e)
        } else {
          attempt.follow()
        }
      }))
      .build()?;

    Ok(Self { client, policy })
  }

  pub fn policy(&self) -> &HttpPolicy {
    &self.policy
  }

  /// Execute a request and read the whole body.
  pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, HttpError> {
    let url = self.policy.check(&request.url)?;
    let method = parse_method(&request.method)?;

    debug!(method = %method, url = %url, "script fetch");

    let mut builder = self.client.request(method, url);

    for (name, value) in &request.headers {
      let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
        HttpError::InvalidHeader {
          name: name.clone(),
        }
      })?;
      let header_value = HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader {
        name: name.clone(),
      })?;
      builder = builder.header(header_name, header_value);
    }

    builder = match request.body {
      Some(FetchBody::Text(text)) => builder.body(text),
      Some(FetchBody::Json(value)) => builder.json(&value),
      None => builder,
    };

    let mut response = builder.send().await.map_err(redirect_violation)?;

    let limit = self.policy.max_response_bytes;
    if response
      .content_length()
      .is_some_and(|len| len > limit as u64)
    {
      return Err(HttpError::ResponseTooLarge { limit });
    }

    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_string(), val.to_string()))
      })
      .collect();

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
      if bytes.len() + chunk.len() > limit {
        return Err(HttpError::ResponseTooLarge { limit });
      }
      bytes.extend_from_slice(&chunk);
    }

    Ok(FetchResponse {
      status,
      headers,
      body: String::from_utf8_lossy(&bytes).into_owned(),
    })
  }
}

/// Surface a redirect refused by the policy as the policy error itself.
fn redirect_violation(err: reqwest::Error) -> HttpError {
  if err.is_redirect() {
    let violation = std::error::Error::source(&err)
      .and_then(|source| source.downcast_ref::<HttpError>())
      .and_then(|source| match source {
        HttpError::PolicyViolation { message } => Some(message.clone()),
        _ => None,
      });
    if let Some(message) = violation {
      return HttpError::policy(message);
    }
  }
  HttpError::Request(err)
}

fn parse_method(method: &str) -> Result<Method, HttpError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    _ => Err(HttpError::InvalidMethod(method.to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_method_is_case_insensitive() {
    assert_eq!(parse_method("post").unwrap(), Method::POST);
    assert!(matches!(
      parse_method("BREW"),
      Err(HttpError::InvalidMethod(m)) if m == "BREW"
    ));
  }

  #[test]
  fn test_response_helpers() {
    let response = FetchResponse {
      status: 201,
      headers: HashMap::new(),
      body: r#"{"id": 7}"#.to_string(),
    };
    assert!(response.ok());
    assert_eq!(response.json(), Some(serde_json::json!({"id": 7})));

    let response = FetchResponse {
      status: 500,
      headers: HashMap::new(),
      body: "oops".to_string(),
    };
    assert!(!response.ok());
    assert!(response.json().is_none());
  }

  #[tokio::test]
  async fn test_policy_is_checked_before_sending() {
    let client = HttpClient::new(HttpPolicy {
      allowed_hosts: Some(vec!["api.example.com".to_string()]),
      ..Default::default()
    })
    .unwrap();

    let err = client
      .fetch(FetchRequest::get("http://127.0.0.1:1/"))
      .await
      .unwrap_err();
    assert!(matches!(err, HttpError::PolicyViolation { .. }));
  }

  #[tokio::test]
  async fn test_redirect_to_blocked_host_is_an_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 4096];
      let _ = socket.read(&mut buf).await;
      socket
        .write_all(
          b"HTTP/1.1 302 Found\r\nLocation: http://blocked.invalid/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    });

    let client = HttpClient::new(HttpPolicy {
      allowed_hosts: Some(vec!["127.0.0.1".to_string()]),
      ..Default::default()
    })
    .unwrap();

    let err = client
      .fetch(FetchRequest::get(format!("http://{addr}/start")))
      .await
      .unwrap_err();
    match err {
      HttpError::PolicyViolation { message } => assert!(message.contains("blocked.invalid")),
      other => panic!("expected a policy violation, got {other:?}"),
    }
  }
}

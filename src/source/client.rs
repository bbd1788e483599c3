use reqwest::header::{
  HeaderMap, ACCEPT, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::StatusCode;
use tracing::debug;
use url::{Host, Url};

use crate::cache::{FetchMetadata, FetchOutcome, Fetcher, Validators};
use crate::config::{Config, DataFormat, DatasetConfig};
use crate::error::{Result, SyncError};

use super::decode::decode_body;

/// HTTP fetcher for one configured dataset
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  url: String,
  format: DataFormat,
  accept: Option<String>,
  group: Option<String>,
}

impl HttpFetcher {
  pub fn new(config: &Config, dataset: &DatasetConfig) -> Result<Self> {
    let mut builder = reqwest::Client::builder()
      .timeout(config.timeout(dataset))
      .user_agent(config.http.user_agent.clone());
    // A proxy cannot reach this machine's loopback interface
    if is_loopback(&dataset.url) {
      builder = builder.no_proxy();
    }
    let client = builder.build().map_err(|e| {
      SyncError::network(&dataset.url, format!("failed to build HTTP client: {}", e))
    })?;

    Ok(Self::with_client(client, dataset))
  }

  fn with_client(client: reqwest::Client, dataset: &DatasetConfig) -> Self {
    Self {
      client,
      url: dataset.url.clone(),
      format: dataset.format,
      accept: dataset.accept_header().map(String::from),
      group: dataset.group.clone(),
    }
  }
}

fn is_loopback(url: &str) -> bool {
  let Ok(url) = Url::parse(url) else {
    return false;
  };
  match url.host() {
    Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
    Some(Host::Ipv4(ip)) => ip.is_loopback(),
    Some(Host::Ipv6(ip)) => ip.is_loopback(),
    None => false,
  }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(String::from)
}

impl Fetcher for HttpFetcher {
  fn endpoint(&self) -> &str {
    &self.url
  }

  async fn fetch(&self, validators: Option<&Validators>) -> Result<FetchOutcome> {
    let mut request = self.client.get(&self.url);

    if let Some(accept) = &self.accept {
      request = request.header(ACCEPT, accept);
    }
    if let Some(validators) = validators {
      if let Some(etag) = &validators.etag {
        request = request.header(IF_NONE_MATCH, etag);
      }
      if let Some(last_modified) = &validators.last_modified {
        request = request.header(IF_MODIFIED_SINCE, last_modified);
      }
    }

    let response = request.send().await?;
    let status = response.status();

    let headers = response.headers();
    let mut metadata = FetchMetadata::now(&self.url, status.as_u16());
    metadata.etag = header_string(headers, ETAG);
    metadata.last_modified = header_string(headers, LAST_MODIFIED);
    metadata.content_type = header_string(headers, CONTENT_TYPE);

    if status == StatusCode::NOT_MODIFIED {
      debug!(url = %self.url, "not modified");
      return Ok(FetchOutcome::NotModified(metadata));
    }
    if !status.is_success() {
      return Err(SyncError::network(&self.url, format!("HTTP {}", status)));
    }

    let body = response.bytes().await?;
    debug!(url = %self.url, bytes = body.len(), status = status.as_u16(), "received response");

    let payload = decode_body(
      self.format,
      &body,
      metadata.content_type.as_deref(),
      &self.url,
      self.group.as_deref(),
    )?;

    Ok(FetchOutcome::Fetched(payload, metadata))
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use serde_json::json;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::task::JoinHandle;

  /// Serve one canned HTTP response; the handle yields the raw request.
  pub(crate) async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut buf = [0u8; 4096];
      loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
          break;
        }
      }
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.ok();
      String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{}/data", addr), handle)
  }

  pub(crate) fn response(status: &str, headers: &[&str], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for header in headers {
      out.push_str(header);
      out.push_str("\r\n");
    }
    out.push_str(&format!(
      "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
      body.len(),
      body
    ));
    out
  }

  fn fetcher(url: &str, format: DataFormat) -> HttpFetcher {
    let dataset = DatasetConfig {
      name: "test".to_string(),
      url: url.to_string(),
      description: None,
      format,
      path: None,
      accept: None,
      timeout_secs: Some(5),
      group: None,
    };
    let client = reqwest::Client::builder()
      .timeout(Config::default().timeout(&dataset))
      .no_proxy()
      .build()
      .unwrap();
    HttpFetcher::with_client(client, &dataset)
  }

  #[test]
  fn test_new_uses_dataset_settings() {
    let config = Config::default();
    let dataset = &config.datasets[1];
    let fetcher = HttpFetcher::new(&config, dataset).unwrap();

    assert_eq!(fetcher.endpoint(), dataset.url);
    assert_eq!(fetcher.format, DataFormat::Sdmx);
    assert_eq!(fetcher.accept.as_deref(), Some(crate::config::SDMX_JSON_ACCEPT));
    assert_eq!(fetcher.group.as_deref(), Some("World Total"));
  }

  #[test]
  fn test_is_loopback() {
    assert!(is_loopback("http://127.0.0.1:8080/data"));
    assert!(is_loopback("http://localhost/data"));
    assert!(is_loopback("http://[::1]:9000/data"));
    assert!(!is_loopback("https://sdmx.oecd.org/public/rest/data"));
    assert!(!is_loopback("not a url"));
  }

  #[tokio::test]
  async fn test_fetch_json_with_validators() {
    let (url, server) = serve_once(response(
      "200 OK",
      &[
        "Content-Type: application/json",
        "ETag: \"v1\"",
        "Last-Modified: Sun, 09 Nov 2025 10:00:00 GMT",
      ],
      r#"{"USA": 1.2}"#,
    ))
    .await;

    let outcome = fetcher(&url, DataFormat::Auto).fetch(None).await.unwrap();
    let FetchOutcome::Fetched(payload, metadata) = outcome else {
      panic!("expected a full response");
    };

    assert_eq!(payload.as_map()["USA"], json!(1.2));
    assert_eq!(metadata.status_code, 200);
    assert_eq!(metadata.etag.as_deref(), Some("\"v1\""));
    assert_eq!(
      metadata.last_modified.as_deref(),
      Some("Sun, 09 Nov 2025 10:00:00 GMT")
    );
    assert_eq!(metadata.url, url);

    let request = server.await.unwrap().to_lowercase();
    assert!(!request.contains("if-none-match"));
  }

  #[tokio::test]
  async fn test_conditional_request_not_modified() {
    let (url, server) = serve_once(response("304 Not Modified", &["ETag: \"v1\""], "")).await;

    let validators = Validators {
      etag: Some("\"v1\"".to_string()),
      last_modified: Some("Sun, 09 Nov 2025 10:00:00 GMT".to_string()),
    };
    let outcome = fetcher(&url, DataFormat::Json)
      .fetch(Some(&validators))
      .await
      .unwrap();
    assert!(matches!(outcome, FetchOutcome::NotModified(ref m) if m.status_code == 304));

    let request = server.await.unwrap().to_lowercase();
    assert!(request.contains("if-none-match: \"v1\""));
    assert!(request.contains("if-modified-since: sun, 09 nov 2025 10:00:00 gmt"));
    assert!(request.contains("accept: application/json"));
  }

  #[tokio::test]
  async fn test_server_error_is_network_error() {
    let (url, _server) = serve_once(response("503 Service Unavailable", &[], "busy")).await;

    let err = fetcher(&url, DataFormat::Json).fetch(None).await.unwrap_err();
    assert!(err.is_network());
    assert!(err.to_string().contains("503"));
  }

  #[tokio::test]
  async fn test_undecodable_body_is_serialization_error() {
    let (url, _server) = serve_once(response("200 OK", &[], "<html></html>")).await;

    let err = fetcher(&url, DataFormat::Json).fetch(None).await.unwrap_err();
    assert!(matches!(err, SyncError::Serialization(_)));
  }

  #[tokio::test]
  async fn test_connection_refused_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher(&format!("http://{}/data", addr), DataFormat::Json)
      .fetch(None)
      .await
      .unwrap_err();
    assert!(err.is_network());
  }
}

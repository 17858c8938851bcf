use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use super::{Method, Transport, TransportError, TransportRequest, TransportResponse};

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self> {
    let client = builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
    };

    let mut builder = self
      .client
      .request(method, request.url.clone())
      .timeout(request.timeout)
      .header(reqwest::header::ACCEPT, "application/json");
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(|e| classify(e, &request))?;
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(|e| classify(e, &request))?;

    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
      Value::Null
    } else {
      match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        // error pages from proxies are often HTML; the status still classifies them
        Err(_) if !(200..300).contains(&status) => Value::Null,
        Err(e) => return Err(TransportError::InvalidBody(e.to_string())),
      }
    };

    Ok(TransportResponse { status, body })
  }
}

fn builder() -> reqwest::ClientBuilder {
  reqwest::Client::builder().user_agent(concat!("listing-feed/", env!("CARGO_PKG_VERSION")))
}

fn classify(err: reqwest::Error, request: &TransportRequest) -> TransportError {
  if err.is_timeout() {
    TransportError::Timeout(request.timeout)
  } else if err.is_connect() {
    TransportError::Connection(err.to_string())
  } else if err.is_request() || err.is_body() || err.is_decode() {
    TransportError::Aborted(err.to_string())
  } else {
    TransportError::Connection(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::sync::oneshot;
  use url::Url;

  /// Serve one canned HTTP response and hand back the raw request head.
  async fn serve_once(response: String) -> (Url, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let head = read_head(&mut socket).await;
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.ok();
      let _ = tx.send(head);
    });

    (Url::parse(&format!("http://{addr}/listings")).unwrap(), rx)
  }

  async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
      let n = socket.read(&mut chunk).await.unwrap();
      if n == 0 {
        break;
      }
      buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).into_owned()
  }

  /// Talks to the local test server directly, whatever proxy the environment sets.
  fn transport() -> HttpTransport {
    HttpTransport {
      client: builder().no_proxy().build().unwrap(),
    }
  }

  fn response(status: &str, content_type: &str, body: &str) -> String {
    format!(
      "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
      body.len()
    )
  }

  #[tokio::test]
  async fn test_json_body_and_headers() {
    let (url, head) = serve_once(response("200 OK", "application/json", r#"[{"id":"a"}]"#)).await;
    let transport = transport();
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("apikey".to_string(), "secret".to_string());

    let resp = transport
      .request(TransportRequest::get(url).with_headers(&headers))
      .await
      .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, serde_json::json!([{"id": "a"}]));
    let head = head.await.unwrap().to_lowercase();
    assert!(head.starts_with("get /listings "));
    assert!(head.contains("apikey: secret"));
    assert!(head.contains("accept: application/json"));
  }

  #[tokio::test]
  async fn test_empty_body_is_null() {
    let (url, _head) = serve_once(response("200 OK", "application/json", "")).await;
    let resp = transport()
      .request(TransportRequest::get(url))
      .await
      .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, Value::Null);
  }

  #[tokio::test]
  async fn test_html_error_page_keeps_status() {
    let page = "<html><body>Bad Gateway</body></html>";
    let (url, _head) = serve_once(response("502 Bad Gateway", "text/html", page)).await;
    let resp = transport()
      .request(TransportRequest::get(url))
      .await
      .unwrap();

    assert_eq!(resp.status, 502);
    assert_eq!(resp.body, Value::Null);
    assert!(!resp.is_success());
  }

  #[tokio::test]
  async fn test_invalid_json_on_success_is_rejected() {
    let (url, _head) = serve_once(response("200 OK", "application/json", "{not json")).await;
    let err = transport()
      .request(TransportRequest::get(url))
      .await
      .unwrap_err();

    assert!(matches!(err, TransportError::InvalidBody(_)));
  }

  #[tokio::test]
  async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      read_head(&mut socket).await;
      // hold the connection open without answering
      tokio::time::sleep(Duration::from_secs(30)).await;
      drop(socket);
    });

    let url = Url::parse(&format!("http://{addr}/listings")).unwrap();
    let timeout = Duration::from_millis(200);
    let err = transport()
      .request(TransportRequest::get(url).with_timeout(timeout))
      .await
      .unwrap_err();

    assert_eq!(err, TransportError::Timeout(timeout));
  }

  #[test]
  fn test_default_client_builds() {
    assert!(HttpTransport::new().is_ok());
  }

  #[tokio::test]
  async fn test_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/listings")).unwrap();
    let err = transport()
      .request(TransportRequest::get(url))
      .await
      .unwrap_err();

    assert!(matches!(err, TransportError::Connection(_)));
  }
}

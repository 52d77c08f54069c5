//! HTTP fetcher: one GET per call with bounded, manually-followed redirects.
//!
//! Redirects are followed by hand rather than by the client so the hop
//! budget, `Location` resolution, and error reporting stay under the
//! crawler's control. Every failure is packaged into the returned
//! [`FetchResponse`]; the fetcher itself never propagates errors.

use crate::config::Config;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Maximum number of fetches spent on one logical GET, redirects included.
const MAX_REDIRECTS: usize = 5;
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";

/// Outcome of a fetch, success or not.
#[derive(Debug, Default, Clone)]
pub struct FetchResponse {
    /// HTTP status of the final hop; 0 when no response was received.
    pub status: u16,
    /// Raw response body bytes.
    pub body: Vec<u8>,
    /// `Content-Type` header of the final hop, empty when absent.
    pub content_type: String,
    /// Whether the final hop answered with a 2xx status.
    pub success: bool,
    /// Present when the fetch failed; describes the cause.
    pub error_message: Option<String>,
    /// `Location` header of a redirect hop, when one was seen.
    pub redirect_location: Option<String>,
}

impl FetchResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Reusable GET client honoring the configured UA, timeout, and TLS policy.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Builds the underlying client from the configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent().to_string())
            .redirect(Policy::none())
            .timeout(Duration::from_secs(config.http_timeout()));
        if !config.tls_verify() {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Performs a GET against `url`, following at most five hops.
    pub async fn get(&self, url: &str) -> FetchResponse {
        let mut current = match parse_fetch_url(url) {
            Some(parsed) => parsed,
            None => return FetchResponse::failure("Invalid URL format"),
        };

        let mut response = FetchResponse::default();
        for _ in 0..MAX_REDIRECTS {
            response = self.fetch_once(&current).await;
            if response.error_message.is_some() || !response.is_redirect() {
                return response;
            }

            match response.redirect_location.as_deref() {
                Some(location) => match current.join(location) {
                    Ok(next) if next.scheme() == "http" || next.scheme() == "https" => {
                        current = next;
                    }
                    _ => return FetchResponse::failure("Invalid URL format"),
                },
                None => {
                    response.success = false;
                    response.error_message =
                        Some("Redirect response with no location header.".to_string());
                    return response;
                }
            }
        }

        if response.is_redirect() {
            response.success = false;
            response.error_message = Some("Too many redirects.".to_string());
        }
        response
    }

    async fn fetch_once(&self, url: &Url) -> FetchResponse {
        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(CONNECTION, "close");

        let reply = match request.send().await {
            Ok(reply) => reply,
            Err(err) => return FetchResponse::failure(format!("HTTP request failed: {err}")),
        };

        let status = reply.status().as_u16();
        let content_type = reply
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let redirect_location = reply
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = match reply.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => return FetchResponse::failure(format!("HTTP request failed: {err}")),
        };

        FetchResponse {
            status,
            body,
            content_type,
            success: (200..300).contains(&status),
            error_message: None,
            redirect_location,
        }
    }
}

/// Parses an absolute http/https URL, or `None` when it is unusable.
fn parse_fetch_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.host_str()?;
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config() -> Config {
        static NEXT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
        let serial = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!(
            "webindex-fetcher-{}-{serial}.ini",
            std::process::id()
        ));
        std::fs::write(&path, "http_timeout = 5\n").expect("write config");
        let config = Config::load(&path).expect("load config");
        let _ = std::fs::remove_file(PathBuf::from(path));
        config
    }

    /// Serves a fixed raw HTTP response for every incoming connection.
    async fn spawn_stub(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(parse_fetch_url("not a url").is_none());
        assert!(parse_fetch_url("ftp://example.com/file").is_none());
        assert!(parse_fetch_url("http://example.com/page").is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn malformed_url_is_reported_without_a_request() {
        let fetcher = Fetcher::new(&test_config()).expect("build fetcher");
        let response = fetcher.get("nonsense://nowhere").await;
        assert!(!response.success);
        assert_eq!(response.error_message.as_deref(), Some("Invalid URL format"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn successful_fetch_captures_status_body_and_content_type() {
        let base = spawn_stub(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             Content-Length: 12\r\n\
             Connection: close\r\n\r\n\
             <p>hello</p>",
        )
        .await;

        let fetcher = Fetcher::new(&test_config()).expect("build fetcher");
        let response = fetcher.get(&format!("{base}/page")).await;
        assert!(response.success);
        assert_eq!(response.status, 200);
        assert!(response.content_type.contains("text/html"));
        assert_eq!(response.body, b"<p>hello</p>");
        assert!(response.error_message.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn endless_redirects_hit_the_hop_budget() {
        let base = spawn_stub(
            "HTTP/1.1 302 Found\r\n\
             Location: /again\r\n\
             Content-Length: 0\r\n\
             Connection: close\r\n\r\n",
        )
        .await;

        let fetcher = Fetcher::new(&test_config()).expect("build fetcher");
        let response = fetcher.get(&format!("{base}/start")).await;
        assert!(!response.success);
        assert_eq!(response.status, 302);
        assert_eq!(response.error_message.as_deref(), Some("Too many redirects."));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn redirect_without_location_is_an_error() {
        let base = spawn_stub(
            "HTTP/1.1 302 Found\r\n\
             Content-Length: 0\r\n\
             Connection: close\r\n\r\n",
        )
        .await;

        let fetcher = Fetcher::new(&test_config()).expect("build fetcher");
        let response = fetcher.get(&format!("{base}/start")).await;
        assert!(!response.success);
        assert_eq!(
            response.error_message.as_deref(),
            Some("Redirect response with no location header.")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_success_statuses_are_not_errors() {
        let base = spawn_stub(
            "HTTP/1.1 404 Not Found\r\n\
             Content-Length: 0\r\n\
             Connection: close\r\n\r\n",
        )
        .await;

        let fetcher = Fetcher::new(&test_config()).expect("build fetcher");
        let response = fetcher.get(&format!("{base}/missing")).await;
        assert!(!response.success);
        assert_eq!(response.status, 404);
        assert!(response.error_message.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn connection_failures_are_packaged_as_transport_errors() {
        // Bind then drop immediately so the port is very likely unused.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr")
        };

        let fetcher = Fetcher::new(&test_config()).expect("build fetcher");
        let response = fetcher.get(&format!("http://{addr}/")).await;
        assert!(!response.success);
        let message = response.error_message.expect("transport error message");
        assert!(message.starts_with("HTTP request failed:"));
    }
}

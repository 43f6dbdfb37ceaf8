// src/crawl/fetch.rs
// =============================================================================
// This module fetches a single page and classifies what happened.
//
// Key functionality:
// - One GET request per call, bounded by an overall timeout
// - Follows at most `max_redirects` redirects (redirect loops become errors)
// - Sorts every outcome into one of five buckets:
//     Success      -> 2xx, body handed to the page parser
//     ClientError  -> 4xx
//     ServerError  -> 5xx
//     NetworkError -> DNS/connection failures, too many redirects
//     Timeout      -> the request did not finish in time
//
// There are no retries here. The scheduler decides whether a failure is
// worth one more try.
//
// Redirects may land on another host. The page records the URL it was
// actually served from (`final_url`) and the scheduler checks that against
// the crawl scope before treating the body as part of the site.
//
// Rust concepts:
// - #[async_trait]: Async methods in a trait we can use as Arc<dyn Fetch>
// - Result<FetchedPage, FetchFailure>: Failures are values, not panics
//
// The `Fetch` trait is the seam between the scheduler and the network: the
// real crawler uses `HttpFetcher`, tests plug in an in-memory site.
// =============================================================================

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{redirect, Client, Response};
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use url::Url;

use super::normalize::NormalizedUrl;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// Why a page could not be fetched
//
// #[serde(tag, content)] produces {"kind": "client_error", "detail": 404}
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchFailure {
    /// HTTP 4xx
    ClientError(u16),
    /// HTTP 5xx
    ServerError(u16),
    /// DNS, connection refused, TLS, redirect limit exceeded ...
    NetworkError(String),
    /// The request did not complete before the timeout
    Timeout,
}

impl FetchFailure {
    // 4xx and 5xx are definitive answers from the server; only transport
    // problems get a second chance
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchFailure::NetworkError(_) | FetchFailure::Timeout)
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::ClientError(code) => write!(f, "ClientError({})", code),
            FetchFailure::ServerError(code) => write!(f, "ServerError({})", code),
            FetchFailure::NetworkError(reason) => write!(f, "NetworkError({})", reason),
            FetchFailure::Timeout => f.write_str("Timeout"),
        }
    }
}

// A successfully fetched page, not yet parsed
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Where the body came from after following redirects
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl FetchedPage {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: NormalizedUrl,
    pub outcome: Result<FetchedPage, FetchFailure>,
}

// Anything that can turn a URL into a FetchResult
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &NormalizedUrl) -> FetchResult;
}

// Settings for the HTTP client, filled in from CrawlConfig
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 5,
            user_agent: "SEOAuditTool/1.0".to_string(),
        }
    }
}

// The real network fetcher
//
// One reqwest Client is built per crawl run and shared by every worker
// (Client is reference counted internally, so the fetcher is cheap to share).
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

        let client = Client::builder()
            .timeout(settings.timeout)
            .redirect(redirect::Policy::limited(settings.max_redirects))
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            max_redirects: settings.max_redirects,
        })
    }

    async fn read_response(&self, response: Response) -> Result<FetchedPage, FetchFailure> {
        let status = response.status();

        if status.is_client_error() {
            return Err(FetchFailure::ClientError(status.as_u16()));
        }
        if status.is_server_error() {
            return Err(FetchFailure::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            // 3xx left over after redirect handling (304, missing Location...)
            // or 1xx: nothing we can analyze
            return Err(FetchFailure::NetworkError(format!(
                "unexpected HTTP {}",
                status.as_u16()
            )));
        }

        // text() consumes the response, so take the landing URL first
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| self.categorize_error(e))?;

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            headers,
            body,
        })
    }

    // Maps reqwest's error kinds onto our failure buckets
    fn categorize_error(&self, error: reqwest::Error) -> FetchFailure {
        if error.is_timeout() {
            FetchFailure::Timeout
        } else if error.is_redirect() {
            FetchFailure::NetworkError(format!(
                "too many redirects (limit {})",
                self.max_redirects
            ))
        } else if error.is_connect() {
            let detail = error_chain(&error);
            if detail.contains("dns") || detail.contains("resolve") {
                FetchFailure::NetworkError(format!("could not resolve host: {}", detail))
            } else {
                FetchFailure::NetworkError(format!("connection failed: {}", detail))
            }
        } else {
            FetchFailure::NetworkError(error_chain(&error))
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &NormalizedUrl) -> FetchResult {
        let outcome = match self.client.get(url.as_str()).send().await {
            Ok(response) => self.read_response(response).await,
            Err(e) => Err(self.categorize_error(e)),
        };

        FetchResult {
            url: url.clone(),
            outcome,
        }
    }
}

// reqwest's Display only shows the outermost message; the useful part
// ("connection refused", "failed to lookup address") is in the sources
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::normalize::CrawlScope;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    // Starts a tiny HTTP/1.1 server that answers by path:
    //   /ok        200 with an HTML body
    //   /missing   404
    //   /broken    503
    //   /loop      302 back to itself
    //   /hop       302 to /ok
    //   /slow      waits 2s before answering
    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&buf);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let response = match path.as_str() {
                        "/ok" => {
                            let body = "<html><head><title>Hello</title></head></html>";
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                body.len(),
                                body
                            )
                        }
                        "/missing" => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                        "/broken" => "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                        "/hop" => "HTTP/1.1 302 Found\r\nLocation: /ok\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                        "/loop" => "HTTP/1.1 302 Found\r\nLocation: /loop\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                        "/slow" => {
                            tokio::time::sleep(Duration::from_secs(2)).await;
                            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                        }
                        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        addr
    }

    fn target(addr: SocketAddr, path: &str) -> NormalizedUrl {
        let url = Url::parse(&format!("http://{}{}", addr, path)).unwrap();
        CrawlScope::seed(&url, false).unwrap().1
    }

    fn fetcher(timeout: Duration) -> HttpFetcher {
        HttpFetcher::new(&FetchSettings {
            timeout,
            max_redirects: 3,
            user_agent: "test-agent".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_carries_body_and_headers() {
        let addr = spawn_server().await;
        let result = fetcher(Duration::from_secs(5)).fetch(&target(addr, "/ok")).await;

        let page = result.outcome.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.body.contains("<title>Hello</title>"));
        assert_eq!(page.content_type(), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_classifies_4xx_and_5xx() {
        let addr = spawn_server().await;
        let fetcher = fetcher(Duration::from_secs(5));

        let missing = fetcher.fetch(&target(addr, "/missing")).await;
        assert_eq!(missing.outcome.unwrap_err(), FetchFailure::ClientError(404));

        let broken = fetcher.fetch(&target(addr, "/broken")).await;
        assert_eq!(broken.outcome.unwrap_err(), FetchFailure::ServerError(503));
    }

    #[tokio::test]
    async fn test_success_records_final_url() {
        let addr = spawn_server().await;
        let fetcher = fetcher(Duration::from_secs(5));

        let direct = fetcher.fetch(&target(addr, "/ok")).await.outcome.unwrap();
        assert_eq!(direct.final_url.path(), "/ok");

        let redirected = fetcher.fetch(&target(addr, "/hop")).await;
        assert_eq!(redirected.url.path(), "/hop");
        let page = redirected.outcome.unwrap();
        assert_eq!(page.final_url.as_str(), format!("http://{}/ok", addr));
        assert!(page.body.contains("<title>Hello</title>"));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_network_error() {
        let addr = spawn_server().await;
        let result = fetcher(Duration::from_secs(5)).fetch(&target(addr, "/loop")).await;

        match result.outcome {
            Err(FetchFailure::NetworkError(reason)) => assert!(reason.contains("redirects")),
            other => panic!("expected NetworkError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let addr = spawn_server().await;
        let result = fetcher(Duration::from_millis(200)).fetch(&target(addr, "/slow")).await;
        assert_eq!(result.outcome.unwrap_err(), FetchFailure::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nobody is listening on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let result = fetcher(Duration::from_secs(5)).fetch(&target(addr, "/")).await;
        assert!(matches!(result.outcome, Err(FetchFailure::NetworkError(_))));
    }

    #[test]
    fn test_only_transport_failures_are_retryable() {
        assert!(FetchFailure::Timeout.is_retryable());
        assert!(FetchFailure::NetworkError("reset".to_string()).is_retryable());
        assert!(!FetchFailure::ClientError(404).is_retryable());
        assert!(!FetchFailure::ServerError(500).is_retryable());
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(FetchFailure::ClientError(404).to_string(), "ClientError(404)");
        assert_eq!(FetchFailure::Timeout.to_string(), "Timeout");
    }
}

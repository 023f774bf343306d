//! Elasticsearch backend over the REST API
//!
//! Pages are read with the scroll API: the first request opens a scroll
//! context on the index, later requests continue it by id, and closing the
//! cursor clears the context so the cluster can free it before it expires.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{DocumentCursor, QuerySpec, RawDocument, ScrollRequest, SearchBackend};
use crate::config::BackendConfig;
use crate::error::{ConnectionError, ErrorInfo, QueryError, Result};

/// Connected Elasticsearch cluster
#[derive(Debug, Clone)]
pub struct ElasticBackend {
    client: Client,
    base_url: String,
    keep_alive: String,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    #[serde(default)]
    cluster_name: Option<String>,
    #[serde(default)]
    version: Option<ClusterVersion>,
}

#[derive(Debug, Deserialize)]
struct ClusterVersion {
    number: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: ScrollHits,
}

#[derive(Debug, Deserialize)]
struct ScrollHits {
    #[serde(default)]
    hits: Vec<ScrollHit>,
}

#[derive(Debug, Deserialize)]
struct ScrollHit {
    #[serde(rename = "_source", default)]
    source: Option<Box<RawValue>>,
}

impl ElasticBackend {
    /// Build the HTTP client and check the cluster answers
    ///
    /// # Arguments
    /// * `config` - Backend configuration
    ///
    /// # Returns
    /// * `Result<Self>` - Connected backend or connection error
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        let backend = Self::with_client(
            client,
            &config.address,
            &config.scroll_keep_alive,
            credentials,
        );

        let info: ClusterInfo = backend
            .send(backend.request(Method::GET, "/"))
            .await
            .map_err(|e| ConnectionError::HealthCheckFailed(e.to_string()))?;

        info!(
            "Connected to Elasticsearch cluster {} (version {})",
            info.cluster_name.as_deref().unwrap_or("unknown"),
            info.version
                .as_ref()
                .map(|v| v.number.as_str())
                .unwrap_or("unknown")
        );

        Ok(backend)
    }

    fn with_client(
        client: Client,
        address: &str,
        keep_alive: &str,
        credentials: Option<(String, Option<String>)>,
    ) -> Self {
        Self {
            client,
            base_url: address.trim_end_matches('/').to_string(),
            keep_alive: keep_alive.to_string(),
            credentials,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    /// Send a request and decode a successful JSON response
    ///
    /// Non-2xx answers become [`QueryError::Rejected`] with the server's
    /// error body parsed.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(QueryError::Rejected {
                status: status.as_u16(),
                info: ErrorInfo::from_elastic_body(&body),
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|e| QueryError::UnexpectedResponse(e.to_string()).into())
    }
}

/// Request body for the first page of a scroll
fn search_body(request: &ScrollRequest) -> Value {
    let mut body = json!({
        "size": request.page_size,
        "query": request.query.to_elastic(),
        "sort": ["_doc"],
    });
    if let Some(fields) = &request.fields {
        body["_source"] = json!(fields);
    }
    body
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn count(&self, query: &QuerySpec, index: &str) -> Result<u64> {
        let body = json!({ "query": query.to_elastic() });
        let response: CountResponse = self
            .send(self.request(Method::POST, &format!("/{index}/_count")).json(&body))
            .await?;
        Ok(response.count)
    }

    async fn open(&self, request: &ScrollRequest) -> Result<Box<dyn DocumentCursor>> {
        if request.index.trim().is_empty() {
            return Err(QueryError::InvalidIndex(request.index.clone()).into());
        }

        Ok(Box::new(ElasticScroll {
            backend: self.clone(),
            index: request.index.clone(),
            body: search_body(request),
            scroll_id: None,
            exhausted: false,
            total_fetched: 0,
        }))
    }
}

/// Scroll cursor over one search
pub struct ElasticScroll {
    backend: ElasticBackend,
    index: String,
    body: Value,
    scroll_id: Option<String>,
    exhausted: bool,
    total_fetched: u64,
}

impl ElasticScroll {
    async fn fetch(&self) -> Result<ScrollResponse> {
        let backend = &self.backend;
        match &self.scroll_id {
            None => {
                let path = format!("/{}/_search?scroll={}", self.index, backend.keep_alive);
                backend
                    .send(backend.request(Method::POST, &path).json(&self.body))
                    .await
            }
            Some(scroll_id) => {
                let body = json!({ "scroll": backend.keep_alive, "scroll_id": scroll_id });
                backend
                    .send(backend.request(Method::POST, "/_search/scroll").json(&body))
                    .await
            }
        }
    }
}

#[async_trait]
impl DocumentCursor for ElasticScroll {
    async fn next_page(&mut self) -> Result<Option<Vec<RawDocument>>> {
        if self.exhausted {
            return Ok(None);
        }

        let response = match self.fetch().await {
            Ok(response) => response,
            Err(e) => {
                // A failed scroll cannot be resumed.
                self.exhausted = true;
                return Err(e);
            }
        };

        if let Some(scroll_id) = response.scroll_id {
            self.scroll_id = Some(scroll_id);
        }

        if response.hits.hits.is_empty() {
            debug!(
                "Scroll over {} exhausted after {} documents",
                self.index, self.total_fetched
            );
            self.exhausted = true;
            return Ok(None);
        }

        let page: Vec<RawDocument> = response
            .hits
            .hits
            .into_iter()
            .map(|hit| match hit.source {
                Some(source) => RawDocument::new(source.get()),
                // _source disabled on the index; the transformer reports it
                None => RawDocument::new("null"),
            })
            .collect();

        self.total_fetched += page.len() as u64;
        debug!(
            "Fetched page of {} documents (total: {})",
            page.len(),
            self.total_fetched
        );
        Ok(Some(page))
    }

    async fn close(&mut self) -> Result<()> {
        self.exhausted = true;
        if let Some(scroll_id) = self.scroll_id.take() {
            let backend = &self.backend;
            let body = json!({ "scroll_id": [scroll_id] });
            let _: Value = backend
                .send(backend.request(Method::DELETE, "/_search/scroll").json(&body))
                .await?;
            debug!("Cleared scroll context for {}", self.index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ExportError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    /// Method, path and body of a request the stub cluster received
    type Seen = Arc<Mutex<Vec<(String, String, String)>>>;

    /// Spawns an HTTP/1.1 server that answers each request with the next
    /// canned `(status, body)` and records what it was asked.
    async fn stub_cluster(replies: Vec<(u16, &'static str)>) -> (String, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let seen: Seen = Arc::default();

        tokio::spawn({
            let seen = Arc::clone(&seen);
            async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    tokio::spawn(serve(stream, Arc::clone(&replies), Arc::clone(&seen)));
                }
            }
        });

        (format!("http://{addr}"), seen)
    }

    async fn serve(stream: TcpStream, replies: Arc<Mutex<VecDeque<(u16, &'static str)>>>, seen: Seen) {
        let mut reader = BufReader::new(stream);
        loop {
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                return;
            }
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let path = parts.next().unwrap_or_default().to_string();

            let mut length = 0;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).await.unwrap();
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    length = value.trim().parse().unwrap();
                }
            }
            let mut body = vec![0; length];
            reader.read_exact(&mut body).await.unwrap();
            seen.lock()
                .unwrap()
                .push((method, path, String::from_utf8(body).unwrap()));

            let (status, reply) = replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((500, r#"{"error":"no reply scripted"}"#));
            let response = format!(
                "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{reply}",
                reply.len()
            );
            reader.get_mut().write_all(response.as_bytes()).await.unwrap();
        }
    }

    fn seen_requests(seen: &Seen) -> Vec<(String, String, Value)> {
        seen.lock()
            .unwrap()
            .iter()
            .map(|(method, path, body)| {
                let body = if body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(body).unwrap()
                };
                (method.clone(), path.clone(), body)
            })
            .collect()
    }

    fn docs(page: &[RawDocument]) -> Vec<&str> {
        page.iter().map(RawDocument::as_str).collect()
    }

    fn request(fields: Option<Vec<String>>) -> ScrollRequest {
        ScrollRequest {
            query: QuerySpec::Text("level:error".to_string()),
            index: "logs-*".to_string(),
            page_size: 100,
            fields,
        }
    }

    #[test]
    fn test_search_body_with_fields() {
        let body = search_body(&request(Some(vec!["host".to_string(), "msg".to_string()])));
        assert_eq!(body["size"], json!(100));
        assert_eq!(body["_source"], json!(["host", "msg"]));
        assert_eq!(body["query"], json!({"query_string": {"query": "level:error"}}));
        assert_eq!(body["sort"], json!(["_doc"]));
    }

    #[test]
    fn test_search_body_without_fields() {
        let body = search_body(&request(None));
        assert!(body.get("_source").is_none());
    }

    #[test]
    fn test_scroll_response_parsing() {
        let body = r#"{
            "_scroll_id": "abc123",
            "took": 3,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "hits": [
                    {"_index": "logs-1", "_id": "1", "_source": {"host": "web-1", "n": 1.5}},
                    {"_index": "logs-1", "_id": "2"}
                ]
            }
        }"#;

        let response: ScrollResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.scroll_id.as_deref(), Some("abc123"));
        assert_eq!(response.hits.hits.len(), 2);
        assert_eq!(
            response.hits.hits[0].source.as_ref().unwrap().get(),
            r#"{"host": "web-1", "n": 1.5}"#
        );
        assert!(response.hits.hits[1].source.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = ElasticBackend::with_client(Client::new(), "http://es:9200/", "1m", None);
        assert_eq!(backend.base_url, "http://es:9200");
    }

    #[tokio::test]
    async fn test_open_rejects_blank_index() {
        let backend = ElasticBackend::with_client(Client::new(), "http://es:9200", "1m", None);
        let mut req = request(None);
        req.index = " ".to_string();
        assert!(backend.open(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_checks_cluster_then_counts() {
        let (url, seen) = stub_cluster(vec![
            (200, r#"{"cluster_name":"stub","version":{"number":"8.13.0"}}"#),
            (200, r#"{"count":42,"_shards":{"total":1}}"#),
        ])
        .await;
        let mut config = Config::default().backend;
        config.address = url;

        let backend = ElasticBackend::connect(&config).await.unwrap();
        assert_eq!(backend.count(&QuerySpec::MatchAll, "logs").await.unwrap(), 42);

        let requests = seen_requests(&seen);
        assert_eq!(requests[0].0, "GET");
        assert_eq!(requests[0].1, "/");
        assert_eq!(
            requests[1],
            (
                "POST".to_string(),
                "/logs/_count".to_string(),
                json!({"query": {"match_all": {}}})
            )
        );
    }

    #[tokio::test]
    async fn test_connect_fails_on_error_status() {
        let (url, _) = stub_cluster(vec![(503, r#"{"error":"unavailable"}"#)]).await;
        let mut config = Config::default().backend;
        config.address = url;

        let err = ElasticBackend::connect(&config).await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::Connection(ConnectionError::HealthCheckFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_scroll_pages_until_empty_then_clears() {
        let (url, seen) = stub_cluster(vec![
            (200, r#"{"_scroll_id":"s1","hits":{"hits":[{"_source":{"n":1}},{"_source":{"n":2}}]}}"#),
            (200, r#"{"_scroll_id":"s2","hits":{"hits":[{"_source":{"n":3}}]}}"#),
            (200, r#"{"_scroll_id":"s2","hits":{"hits":[]}}"#),
            (200, r#"{"succeeded":true,"num_freed":1}"#),
        ])
        .await;
        let backend = ElasticBackend::with_client(Client::new(), &url, "1m", None);
        let mut req = request(Some(vec!["n".to_string()]));
        req.index = "logs".to_string();
        req.page_size = 2;

        let mut cursor = backend.open(&req).await.unwrap();
        let first = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(docs(&first), [r#"{"n":1}"#, r#"{"n":2}"#]);
        let second = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(docs(&second), [r#"{"n":3}"#]);
        assert!(cursor.next_page().await.unwrap().is_none());
        // exhausted: answered locally
        assert!(cursor.next_page().await.unwrap().is_none());
        cursor.close().await.unwrap();

        let requests = seen_requests(&seen);
        let paths: Vec<(&str, &str)> = requests
            .iter()
            .map(|(method, path, _)| (method.as_str(), path.as_str()))
            .collect();
        assert_eq!(
            paths,
            [
                ("POST", "/logs/_search?scroll=1m"),
                ("POST", "/_search/scroll"),
                ("POST", "/_search/scroll"),
                ("DELETE", "/_search/scroll"),
            ]
        );
        assert_eq!(requests[0].2["size"], json!(2));
        assert_eq!(requests[1].2, json!({"scroll": "1m", "scroll_id": "s1"}));
        assert_eq!(requests[2].2, json!({"scroll": "1m", "scroll_id": "s2"}));
        assert_eq!(requests[3].2, json!({"scroll_id": ["s2"]}));
    }

    #[tokio::test]
    async fn test_rejected_search_is_not_retried() {
        let (url, seen) = stub_cluster(vec![(
            404,
            r#"{"error":{"type":"index_not_found_exception","reason":"no such index [logs]"},"status":404}"#,
        )])
        .await;
        let backend = ElasticBackend::with_client(Client::new(), &url, "1m", None);
        let mut req = request(None);
        req.index = "logs".to_string();

        let mut cursor = backend.open(&req).await.unwrap();
        let err = cursor.next_page().await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::Query(QueryError::Rejected { status: 404, .. })
        ));
        assert!(err.to_string().contains("no such index"));

        assert!(cursor.next_page().await.unwrap().is_none());
        // no scroll was opened, so there is nothing to clear
        cursor.close().await.unwrap();
        assert_eq!(seen_requests(&seen).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_scroll_still_clears_context() {
        let (url, seen) = stub_cluster(vec![
            (200, r#"{"_scroll_id":"s1","hits":{"hits":[{"_source":{"n":1}}]}}"#),
            (
                500,
                r#"{"error":{"type":"search_context_missing_exception","reason":"No search context found"}}"#,
            ),
            (200, r#"{"succeeded":true,"num_freed":0}"#),
        ])
        .await;
        let backend = ElasticBackend::with_client(Client::new(), &url, "1m", None);
        let mut req = request(None);
        req.index = "logs".to_string();

        let mut cursor = backend.open(&req).await.unwrap();
        assert_eq!(cursor.next_page().await.unwrap().unwrap().len(), 1);
        assert!(cursor.next_page().await.is_err());
        assert!(cursor.next_page().await.unwrap().is_none());
        cursor.close().await.unwrap();

        let requests = seen_requests(&seen);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].0, "DELETE");
        assert_eq!(requests[2].2, json!({"scroll_id": ["s1"]}));
    }
}

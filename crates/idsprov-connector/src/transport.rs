//! Transport seam between the connector client and the network.
//!
//! The `Transport` trait abstracts over how requests reach a connector. The
//! `HttpTransport` sends them over HTTPS with basic credentials; the
//! in-memory connector in [`crate::memory`] answers them locally for tests
//! and dry runs.

use std::time::Duration;

use base64::Engine;

use crate::error::{ConnectorError, Result};

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request to the connector API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        ApiRequest {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        ApiRequest {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            body,
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Look up the first query parameter with the given key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A response from the connector API, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Value of the `Location` header, if present.
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstract request transport.
///
/// Implementations return `Ok` for every response the server produced,
/// including error statuses; `Err` is reserved for requests that never got
/// an answer.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Connection settings for a remote connector.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// Scheme, host and optional port, e.g. `https://localhost:8080`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate validation (self-signed test deployments only).
    pub insecure_tls: bool,
    /// Global per-request timeout.
    pub timeout: Option<Duration>,
    /// Pause before every read request.
    pub read_delay: Duration,
}

impl ConnectorSettings {
    /// Settings for `base_url` with the given credentials and no delays.
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        ConnectorSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            insecure_tls: false,
            timeout: None,
            read_delay: Duration::ZERO,
        }
    }
}

/// HTTPS transport with basic credentials.
pub struct HttpTransport {
    agent: ureq::Agent,
    authorization: String,
}

impl HttpTransport {
    pub fn new(settings: &ConnectorSettings) -> Self {
        let mut config = ureq::Agent::config_builder().http_status_as_error(false);
        if let Some(timeout) = settings.timeout {
            config = config.timeout_global(Some(timeout));
        }
        if settings.insecure_tls {
            tracing::warn!(
                base_url = %settings.base_url,
                "TLS certificate verification disabled"
            );
            config = config.tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            );
        }
        let agent = ureq::Agent::new_with_config(config.build());

        HttpTransport {
            agent,
            authorization: basic_authorization(&settings.username, &settings.password),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let transport_error = |e: ureq::Error| ConnectorError::Transport {
            url: request.url.clone(),
            detail: e.to_string(),
        };

        let result = match request.method {
            Method::Get => {
                let mut builder = self
                    .agent
                    .get(&request.url)
                    .header("Authorization", self.authorization.as_str());
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = self
                    .agent
                    .post(&request.url)
                    .header("Authorization", self.authorization.as_str());
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                match &request.body {
                    Some(body) => {
                        let bytes = serde_json::to_vec(body)?;
                        builder
                            .header("Content-Type", "application/json")
                            .send(&bytes[..])
                    }
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = result.map_err(transport_error)?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        // Artifact data may be arbitrarily large; lift ureq's default cap.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(transport_error)?;

        Ok(ApiResponse {
            status,
            location,
            body,
        })
    }
}

/// `Authorization` header value for HTTP basic credentials.
fn basic_authorization(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use crate::artifact::download_artifact_data;
    use crate::client::ConnectorClient;
    use crate::handle::{Artifact, Catalog, Handle};

    /// Answer one request on a loopback port with a canned response.
    /// The join handle yields the raw request as received.
    fn serve_once(
        status: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let mut head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
            body.len()
        );
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            stream.flush().unwrap();
            request
        });
        (base, server)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let length = header_value(&String::from_utf8_lossy(&data[..end]), "content-length")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn header_value(request: &str, name: &str) -> Option<String> {
        request.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    fn decode_component(s: &str) -> String {
        let bytes = s.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'%' if i + 2 < bytes.len() => {
                    let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                    i += 3;
                }
                b'+' => {
                    out.push(b' ');
                    i += 1;
                }
                b => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        String::from_utf8(out).unwrap()
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(&ConnectorSettings::new(base, "admin", "password"))
    }

    #[test]
    fn basic_authorization_encodes_credentials() {
        assert_eq!(
            basic_authorization("admin", "password"),
            "Basic YWRtaW46cGFzc3dvcmQ="
        );
    }

    #[test]
    fn settings_strip_trailing_slash() {
        let settings = ConnectorSettings::new("https://localhost:8080/", "a", "b");
        assert_eq!(settings.base_url, "https://localhost:8080");
        assert!(!settings.insecure_tls);
        assert_eq!(settings.read_delay, Duration::ZERO);
    }

    #[test]
    fn query_params_keep_order() {
        let req = ApiRequest::post("https://c/api/ids/contract", None)
            .with_query("recipient", "https://p/api/ids/data")
            .with_query("download", "false");
        assert_eq!(req.query_param("download"), Some("false"));
        assert_eq!(req.query[0].0, "recipient");
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn success_range() {
        let ok = ApiResponse {
            status: 201,
            location: None,
            body: Vec::new(),
        };
        let bad = ApiResponse {
            status: 404,
            location: None,
            body: b"gone".to_vec(),
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
        assert_eq!(bad.text(), "gone");
    }

    #[test]
    fn http_sends_basic_credentials_and_json_body() {
        let (base, server) = serve_once("201 Created", &[], Vec::new());
        let request = ApiRequest::post(
            format!("{base}/api/catalogs"),
            Some(serde_json::json!({ "title": "Apps" })),
        );
        transport(&base).send(&request).unwrap();

        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /api/catalogs HTTP/1.1"), "{raw}");
        assert_eq!(
            header_value(&raw, "authorization").as_deref(),
            Some("Basic YWRtaW46cGFzc3dvcmQ=")
        );
        assert_eq!(
            header_value(&raw, "content-type").as_deref(),
            Some("application/json")
        );
        assert!(raw.ends_with(r#"{"title":"Apps"}"#), "{raw}");
    }

    #[test]
    fn http_appends_encoded_query() {
        let (base, server) = serve_once("200 OK", &[], b"{}".to_vec());
        let request = ApiRequest::post(format!("{base}/api/ids/contract"), None)
            .with_query("recipient", "https://p/api/ids/data")
            .with_query("note", "a&b=c d")
            .with_query("download", "false");
        transport(&base).send(&request).unwrap();

        let raw = server.join().unwrap();
        let target = raw.split_whitespace().nth(1).unwrap();
        let (path, query) = target.split_once('?').unwrap();
        assert_eq!(path, "/api/ids/contract");
        let pairs: Vec<(String, String)> = query
            .split('&')
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap();
                (decode_component(k), decode_component(v))
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("recipient".to_string(), "https://p/api/ids/data".to_string()),
                ("note".to_string(), "a&b=c d".to_string()),
                ("download".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn http_error_status_is_a_response() {
        for (status, code) in [("404 Not Found", 404), ("500 Internal Server Error", 500)] {
            let (base, server) = serve_once(status, &[], br#"{"message":"nope"}"#.to_vec());
            let response = transport(&base)
                .send(&ApiRequest::get(format!("{base}/api/rules/x")))
                .unwrap();
            server.join().unwrap();
            assert_eq!(response.status, code);
            assert!(!response.is_success());
            assert_eq!(response.text(), r#"{"message":"nope"}"#);
        }
    }

    #[test]
    fn http_reads_location_header() {
        let location = "http://connector.test/api/catalogs/5f3f2e4c-9d0e-4c1e-8a55-1c2d3e4f5a6b";
        let (base, server) = serve_once("201 Created", &[("Location", location)], Vec::new());
        let client = ConnectorClient::connect(&ConnectorSettings::new(&base, "admin", "password"));
        let handle = client
            .post_for_handle(&client.url("/api/catalogs"), serde_json::json!({}))
            .unwrap();
        server.join().unwrap();
        assert_eq!(handle.as_str(), location);
        Handle::<Catalog>::parse(handle.as_str()).unwrap();
    }

    #[test]
    fn http_download_has_no_size_cap() {
        let payload: Vec<u8> = (0..11 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let (base, server) = serve_once("200 OK", &[], payload.clone());
        let client = ConnectorClient::connect(&ConnectorSettings::new(&base, "admin", "password"));
        let artifact = Handle::<Artifact>::parse(&format!("{base}/api/artifacts/big")).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let download = download_artifact_data(&client, &artifact, dir.path()).unwrap();
        let raw = server.join().unwrap();

        assert!(raw.starts_with("GET /api/artifacts/big/data HTTP/1.1"), "{raw}");
        assert_eq!(download.bytes, payload.len());
        assert_eq!(std::fs::read(&download.path).unwrap(), payload);
    }
}

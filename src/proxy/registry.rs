//! Configured backends and the forwarding primitive.
//!
//! The registry is built once at startup and is read-only afterwards.
//! Every endpoint shares one pooled hyper client, so keep-alive
//! connections are reused across requests to the same backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use url::Url;

use super::headers::{build_forwarded_headers, ForwardContext};
use crate::config::model::ProxySettings;
use crate::error::{ForwardError, TurnstileError};

pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Body>;

/// Accepts any upstream certificate while still checking that the
/// handshake was signed by the key in that certificate.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the pooled upstream client. With `skip_tls_verify` the client
/// trusts any backend certificate; otherwise it uses the webpki roots.
pub fn build_http_client(skip_tls_verify: bool) -> Result<HttpClient, TurnstileError> {
    // Pin ring in case another provider is compiled in by a dependency.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let builder = if skip_tls_verify {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| TurnstileError::Tls { source: e.into() })?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth();
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls)
    } else {
        hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
    };

    let https = builder.https_or_http().enable_http1().build();
    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https))
}

/// Join two URL paths with exactly one `/` between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

#[derive(Clone)]
pub struct BackendEndpoint {
    key: String,
    base: Url,
    client: HttpClient,
    timeout: Duration,
}

impl std::fmt::Debug for BackendEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendEndpoint")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BackendEndpoint {
    /// The backend URL exactly as configured. Used as the cache value.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `host[:port]` of the backend, as sent in the rewritten `Host` header.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        self.base
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"))
    }

    /// Upstream URI for a forwarded `path` and the client's raw `query`.
    /// The backend's own path is kept as a base and its query is merged
    /// in front of the client's.
    pub fn target_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, http::Error> {
        let joined = join_paths(self.base.path(), path);
        let query = match (self.base.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
            (Some(base), Some(req)) => Some(format!("{base}&{req}")),
            (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
            (None, None) => None,
        };

        let mut uri = format!("{}://{}{joined}", self.base.scheme(), self.authority());
        if let Some(query) = query {
            uri.push('?');
            uri.push_str(&query);
        }
        Ok(uri.parse::<Uri>()?)
    }

    /// Send `request` to this backend with `path` as the forwarded path.
    ///
    /// The body is streamed, not buffered. The timeout covers the wait
    /// for the upstream response headers only.
    pub async fn forward(
        &self,
        request: Request<Body>,
        path: &str,
        ctx: &ForwardContext<'_>,
    ) -> Result<Response<Incoming>, ForwardError> {
        let (parts, body) = request.into_parts();
        let request_error = |source: http::Error| ForwardError::Request {
            backend: self.key.clone(),
            source,
        };

        let uri = self.target_uri(path, parts.uri.query()).map_err(request_error)?;
        let mut builder = Request::builder().method(parts.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = build_forwarded_headers(&parts.headers, &self.base, ctx);
        }
        let upstream = builder.body(body).map_err(request_error)?;

        match tokio::time::timeout(self.timeout, self.client.request(upstream)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(ForwardError::Upstream {
                backend: self.key.clone(),
                source,
            }),
            Err(_) => Err(ForwardError::Timeout {
                backend: self.key.clone(),
                timeout: self.timeout,
            }),
        }
    }
}

#[derive(Debug)]
pub struct BackendRegistry {
    endpoints: Vec<BackendEndpoint>,
    index: HashMap<String, usize>,
}

impl BackendRegistry {
    pub fn new(urls: &[String], settings: &ProxySettings) -> Result<Self, TurnstileError> {
        if urls.is_empty() {
            return Err(TurnstileError::NoBackends);
        }

        let client = build_http_client(settings.skip_tls_verify)?;
        let timeout = Duration::from_millis(settings.timeout);

        let mut endpoints = Vec::with_capacity(urls.len());
        let mut index = HashMap::with_capacity(urls.len());
        for raw in urls {
            let invalid = |reason: String| TurnstileError::InvalidBackendUrl {
                url: raw.clone(),
                reason,
            };
            let base = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
            if !matches!(base.scheme(), "http" | "https") {
                return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
            }
            if base.host_str().map_or(true, str::is_empty) {
                return Err(invalid("missing host".into()));
            }

            index.insert(raw.clone(), endpoints.len());
            endpoints.push(BackendEndpoint {
                key: raw.clone(),
                base,
                client: client.clone(),
                timeout,
            });
        }

        Ok(Self { endpoints, index })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BackendEndpoint> {
        self.index.get(key).map(|&i| &self.endpoints[i])
    }

    /// Configured URLs, in configuration order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(BackendEndpoint::key)
    }

    #[must_use]
    pub fn endpoints(&self) -> &[BackendEndpoint] {
        &self.endpoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

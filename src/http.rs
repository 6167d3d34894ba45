//! HTTP protocol caller.
//!
//! [`HttpServiceCaller`] calls HTTP and HTTPS targets with `reqwest`. Request
//! parameters are sent in the query string for `GET` and as a form body for
//! `POST`. The connection and socket time-outs of each target are applied to
//! the transport; the engine enforces the total time-out.

use crate::{
    caller::{AttemptFailure, CallProtocol, ServiceCaller, ServiceCallerBuilder},
    exception::{CallException, CallExceptionKind},
    failover::{
        FailOverOnConnectionError, FailOverOnStatusCode, FailOverPolicy, FailOverWhenAllowed,
        OrPolicy,
    },
    request::{next_instance_number, CallRequest},
    CallResult, Descriptor, Error, Result, TargetDescriptor,
};
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("callover/", env!("CARGO_PKG_VERSION"));

/// The HTTP method used to send a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    /// Parameters are encoded in the query string.
    Get,
    /// Parameters are sent as an `application/x-www-form-urlencoded` body.
    #[default]
    Post,
}

impl HttpMethod {
    /// The method name, e.g. `"POST"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

/// HTTP call configuration.
///
/// Shared between requests through an `Arc`. All settings sit behind one
/// lock, so an attempt always sees a consistent method and user agent.
pub struct HttpCallConfig {
    instance: u64,
    state: Mutex<HttpCallConfigState>,
}

#[derive(Debug, Clone, Default)]
struct HttpCallConfigState {
    fail_over_allowed: bool,
    method: HttpMethod,
    user_agent: Option<String>,
}

impl HttpCallConfig {
    /// Creates a configuration using `POST`, the caller's default user
    /// agent, and no unconditional fail-over.
    pub fn new() -> Self {
        Self {
            instance: next_instance_number(),
            state: Mutex::new(HttpCallConfigState::default()),
        }
    }

    /// Whether fail-over is allowed after any failure.
    pub fn is_fail_over_allowed(&self) -> bool {
        self.state.lock().fail_over_allowed
    }

    /// Allows or disallows fail-over after any failure.
    ///
    /// When allowed, a `POST` that reached the server before failing may be
    /// sent to another target and processed twice.
    pub fn set_fail_over_allowed(&self, allowed: bool) {
        self.state.lock().fail_over_allowed = allowed;
    }

    /// The HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.state.lock().method
    }

    /// Sets the HTTP method.
    pub fn set_method(&self, method: HttpMethod) {
        self.state.lock().method = method;
    }

    /// The `User-Agent` header value, if overridden.
    pub fn user_agent(&self) -> Option<String> {
        self.state.lock().user_agent.clone()
    }

    /// Overrides the `User-Agent` header. `None` restores the default.
    pub fn set_user_agent(&self, user_agent: Option<String>) {
        self.state.lock().user_agent = user_agent;
    }

    /// Describes this configuration, e.g.
    /// `HTTP call config #4 [failOverAllowed=false; method=POST; userAgent=default]`.
    pub fn describe(&self) -> String {
        let state = self.snapshot();
        format!(
            "HTTP call config #{} [failOverAllowed={}; method={}; userAgent={}]",
            self.instance,
            state.fail_over_allowed,
            state.method,
            state
                .user_agent
                .as_deref()
                .map(|ua| format!("\"{}\"", ua))
                .unwrap_or_else(|| "default".to_string())
        )
    }

    fn snapshot(&self) -> HttpCallConfigState {
        self.state.lock().clone()
    }
}

impl Default for HttpCallConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpCallConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Display for HttpCallConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Decides which HTTP status codes count as a successful call.
///
/// Implemented for any `Fn(u16) -> bool`.
///
/// # Examples
///
/// ```
/// use callover::HttpCallRequest;
///
/// let request = HttpCallRequest::new()
///     .with_status_code_verifier(|code: u16| code == 200 || code == 304);
/// ```
pub trait StatusCodeVerifier: Send + Sync {
    /// Returns `true` if the status code is acceptable.
    fn is_accepted(&self, code: u16) -> bool;
}

impl<F> StatusCodeVerifier for F
where
    F: Fn(u16) -> bool + Send + Sync,
{
    fn is_accepted(&self, code: u16) -> bool {
        self(code)
    }
}

/// Accepts only 2xx status codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessfulStatus;

impl StatusCodeVerifier for SuccessfulStatus {
    fn is_accepted(&self, code: u16) -> bool {
        (200..=299).contains(&code)
    }
}

/// A request for an [`HttpServiceCaller`].
///
/// Without a status code verifier every status code is accepted.
///
/// # Examples
///
/// ```
/// use callover::{CallRequest, HttpCallRequest, HttpMethod, SuccessfulStatus};
///
/// let request = HttpCallRequest::new()
///     .with_method(HttpMethod::Get)
///     .with_parameter("_function", "GetVersion")
///     .with_status_code_verifier(SuccessfulStatus);
///
/// assert_eq!(request.parameter("_function"), Some("GetVersion"));
/// assert!(!request.is_fail_over_allowed());
/// ```
pub struct HttpCallRequest {
    instance: u64,
    parameters: BTreeMap<String, String>,
    status_code_verifier: Option<Arc<dyn StatusCodeVerifier>>,
    config: Arc<HttpCallConfig>,
}

impl HttpCallRequest {
    /// Creates a request without parameters and with its own configuration.
    pub fn new() -> Self {
        Self {
            instance: next_instance_number(),
            parameters: BTreeMap::new(),
            status_code_verifier: None,
            config: Arc::new(HttpCallConfig::new()),
        }
    }

    /// Adds a parameter, replacing any previous value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds several parameters.
    pub fn with_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the status code verifier.
    pub fn with_status_code_verifier(mut self, verifier: impl StatusCodeVerifier + 'static) -> Self {
        self.status_code_verifier = Some(Arc::new(verifier));
        self
    }

    /// Replaces the configuration with a shared one.
    pub fn with_config(mut self, config: Arc<HttpCallConfig>) -> Self {
        self.config = config;
        self
    }

    /// Sets the HTTP method on the current configuration.
    pub fn with_method(self, method: HttpMethod) -> Self {
        self.config.set_method(method);
        self
    }

    /// Allows fail-over after any failure on the current configuration.
    pub fn with_fail_over_allowed(self, allowed: bool) -> Self {
        self.config.set_fail_over_allowed(allowed);
        self
    }

    /// All parameters, sorted by name.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// The value of a single parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// The status code verifier, if any.
    pub fn status_code_verifier(&self) -> Option<&Arc<dyn StatusCodeVerifier>> {
        self.status_code_verifier.as_ref()
    }

    /// The call configuration.
    pub fn config(&self) -> &Arc<HttpCallConfig> {
        &self.config
    }
}

impl Default for HttpCallRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRequest for HttpCallRequest {
    fn describe(&self) -> String {
        let parameters = if self.parameters.is_empty() {
            "(empty)".to_string()
        } else {
            self.parameters
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect::<Vec<_>>()
                .join("; ")
        };
        format!(
            "HTTP request #{} [config={}; parameters={}]",
            self.instance,
            self.config.describe(),
            parameters
        )
    }

    fn is_fail_over_allowed(&self) -> bool {
        self.config.is_fail_over_allowed()
    }
}

impl fmt::Debug for HttpCallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCallRequest")
            .field("instance", &self.instance)
            .field("parameters", &self.parameters)
            .field("has_status_code_verifier", &self.status_code_verifier.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// The data returned by a successful HTTP call.
#[derive(Debug, Clone)]
pub struct HttpCallData {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpCallData {
    /// The HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The numeric HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value, if present and valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The raw response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The response body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the response body from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body if the body
    /// is not valid JSON for `T`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use callover::{HttpCallRequest, HttpServiceCaller};
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Version { version: String }
    ///
    /// # async fn example(caller: HttpServiceCaller) -> Result<(), callover::Error> {
    /// let result = caller.call(HttpCallRequest::new()).await?;
    /// let version: Version = result.json()?;
    /// println!("Version {}", version.version);
    /// # Ok(())
    /// # }
    /// ```
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            tracing::error!(
                error = %e,
                status = self.status.as_u16(),
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response: self.text().into_owned(),
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }
}

/// Result of a successful HTTP call.
pub type HttpCallResult = CallResult<HttpCallData>;

/// The [`CallProtocol`] for HTTP and HTTPS targets.
///
/// Holds one pooled `reqwest::Client` per distinct pair of connection and
/// socket time-outs among the configured targets.
pub struct HttpProtocol {
    clients: HashMap<(u64, u64), reqwest::Client>,
    fail_over: OrPolicy,
}

impl HttpProtocol {
    fn new(descriptor: &Descriptor, user_agent: &str) -> Result<Self> {
        let mut clients = HashMap::new();
        for target in descriptor.configured_targets() {
            let key = transport_key(target);
            if clients.contains_key(&key) {
                continue;
            }

            let mut builder = reqwest::Client::builder().user_agent(user_agent);
            if let Some(timeout) = target.connection_timeout() {
                builder = builder.connect_timeout(timeout);
            }
            if let Some(timeout) = target.socket_timeout() {
                builder = builder.read_timeout(timeout);
            }

            let client = builder.build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;
            clients.insert(key, client);
        }

        tracing::debug!(transports = clients.len(), "Built HTTP transports");

        Ok(Self {
            clients,
            fail_over: OrPolicy::new(vec![
                Box::new(FailOverWhenAllowed),
                Box::new(FailOverOnConnectionError),
                Box::new(FailOverOnStatusCode),
            ]),
        })
    }

    async fn execute(
        client: &reqwest::Client,
        target: &TargetDescriptor,
        request: &HttpCallRequest,
    ) -> std::result::Result<HttpCallData, AttemptFailure> {
        let config = request.config().snapshot();
        let mut url = Url::parse(target.url()).map_err(AttemptFailure::unexpected)?;

        if config.method == HttpMethod::Get && !request.parameters().is_empty() {
            url.query_pairs_mut().extend_pairs(request.parameters());
        }

        let mut builder = client.request(config.method.into(), url);
        if config.method == HttpMethod::Post {
            builder = builder.form(request.parameters());
        }

        if let Some(user_agent) = config.user_agent {
            builder = builder.header(http::header::USER_AGENT, user_agent);
        }

        tracing::debug!(
            method = %config.method,
            url = target.url(),
            parameters = request.parameters().len(),
            "Executing HTTP request"
        );

        let response = builder.send().await.map_err(transport_failure)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_failure)?.to_vec();

        tracing::debug!(
            status = status.as_u16(),
            bytes = body.len(),
            "Received HTTP response"
        );

        if let Some(verifier) = request.status_code_verifier() {
            if !verifier.is_accepted(status.as_u16()) {
                return Err(AttemptFailure::status_code(status.as_u16()));
            }
        }

        Ok(HttpCallData {
            status,
            headers,
            body,
        })
    }
}

impl CallProtocol for HttpProtocol {
    type Request = HttpCallRequest;
    type Output = HttpCallData;

    fn supports_protocol(&self, protocol: &str) -> bool {
        protocol.eq_ignore_ascii_case("http") || protocol.eq_ignore_ascii_case("https")
    }

    async fn attempt(
        &self,
        target: &TargetDescriptor,
        request: &HttpCallRequest,
    ) -> std::result::Result<HttpCallData, AttemptFailure> {
        let client = self.clients.get(&transport_key(target)).ok_or_else(|| {
            AttemptFailure::new(CallExceptionKind::Unexpected)
                .with_detail("no HTTP transport configured for this target")
        })?;

        Self::execute(client, target, request).await
    }

    fn should_fail_over(&self, request: &HttpCallRequest, exception: &CallException) -> bool {
        self.fail_over.should_fail_over(request, exception)
    }
}

fn transport_key(target: &TargetDescriptor) -> (u64, u64) {
    (target.connection_timeout_ms(), target.socket_timeout_ms())
}

fn transport_failure(error: reqwest::Error) -> AttemptFailure {
    let flags = TransportFlags {
        builder: error.is_builder(),
        connect: error.is_connect(),
        timeout: error.is_timeout(),
        transfer: error.is_request() || error.is_body() || error.is_decode(),
    };
    let kind = classify_transport_error(&error, flags);
    AttemptFailure::new(kind).with_cause(error)
}

#[derive(Debug, Clone, Copy, Default)]
struct TransportFlags {
    builder: bool,
    connect: bool,
    timeout: bool,
    transfer: bool,
}

fn source_chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(error), |&e| e.source())
}

fn classify_transport_error(
    error: &(dyn StdError + 'static),
    flags: TransportFlags,
) -> CallExceptionKind {
    if flags.builder {
        return CallExceptionKind::Unexpected;
    }

    let io_kinds: Vec<io::ErrorKind> = source_chain(error)
        .filter_map(|e| e.downcast_ref::<io::Error>())
        .map(io::Error::kind)
        .collect();

    if io_kinds.contains(&io::ErrorKind::ConnectionRefused) {
        return CallExceptionKind::ConnectionRefused;
    }

    let unresolved = source_chain(error).any(|e| {
        let message = e.to_string();
        message.contains("dns error") || message.contains("failed to lookup address")
    });
    if unresolved {
        return CallExceptionKind::UnknownHost;
    }

    if flags.timeout || io_kinds.contains(&io::ErrorKind::TimedOut) {
        return if flags.connect {
            CallExceptionKind::ConnectionTimeout
        } else {
            CallExceptionKind::SocketTimeout
        };
    }

    if flags.connect || flags.transfer || !io_kinds.is_empty() {
        CallExceptionKind::Io
    } else {
        CallExceptionKind::Unexpected
    }
}

/// Calls HTTP services with fail-over.
///
/// # Examples
///
/// ```no_run
/// use callover::{DescriptorBuilder, HttpCallRequest, HttpServiceCaller, Properties};
///
/// # async fn example() -> Result<(), callover::Error> {
/// let properties: Properties = "
///     api = group, ordered, primary, backup
///     api.primary = service, http://primary.example.com/api, 5000, 1000
///     api.backup = service, http://backup.example.com/api, 5000, 1000
/// ".parse()?;
///
/// let caller = HttpServiceCaller::new(DescriptorBuilder::build(&properties, "api")?)?;
///
/// let request = HttpCallRequest::new().with_parameter("_function", "GetVersion");
/// let result = caller.call(request).await?;
/// println!("{} answered: {}", result.succeeded_target().url(), result.text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpServiceCaller {
    caller: ServiceCaller<HttpProtocol>,
}

impl HttpServiceCaller {
    /// Creates a caller with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedProtocol`] if a target is not `http` or
    /// `https`, or [`Error::ConfigurationError`] if a transport cannot be
    /// built.
    pub fn new(descriptor: impl Into<Arc<Descriptor>>) -> Result<Self> {
        Self::builder().descriptor(descriptor).build()
    }

    /// Creates a new `HttpServiceCallerBuilder`.
    pub fn builder() -> HttpServiceCallerBuilder {
        HttpServiceCallerBuilder::new()
    }

    /// The descriptor of the targets this caller calls.
    pub fn descriptor(&self) -> &Descriptor {
        self.caller.descriptor()
    }

    /// Executes a request.
    ///
    /// See [`ServiceCaller::call`].
    pub async fn call(&self, request: HttpCallRequest) -> Result<HttpCallResult> {
        self.caller.call(Arc::new(request)).await
    }

    /// Executes a request that is shared with the caller.
    pub async fn call_shared(&self, request: Arc<HttpCallRequest>) -> Result<HttpCallResult> {
        self.caller.call(request).await
    }
}

/// Builder for configuring and creating an [`HttpServiceCaller`].
///
/// # Examples
///
/// ```no_run
/// use callover::{HttpServiceCaller, TargetDescriptor};
/// use callover::failover::FailOverOnConnectionError;
///
/// # fn example() -> Result<(), callover::Error> {
/// let caller = HttpServiceCaller::builder()
///     .descriptor(TargetDescriptor::with_timeouts("https://api.example.com/", 10_000, 2_000, 5_000)?)
///     .user_agent("inventory-sync/2.1")
///     .fail_over_policy(Box::new(FailOverOnConnectionError))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HttpServiceCallerBuilder {
    descriptor: Option<Arc<Descriptor>>,
    user_agent: Option<String>,
    fail_over_policy: Option<Box<dyn FailOverPolicy>>,
}

impl HttpServiceCallerBuilder {
    /// Creates a new `HttpServiceCallerBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            descriptor: None,
            user_agent: None,
            fail_over_policy: None,
        }
    }

    /// Sets the descriptor of the targets to call.
    pub fn descriptor(mut self, descriptor: impl Into<Arc<Descriptor>>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Sets the default `User-Agent`. A request configuration can still
    /// override it.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Replaces the HTTP fail-over decision.
    ///
    /// By default the caller fails over on connection errors and on status
    /// codes outside the 2xx range.
    pub fn fail_over_policy(mut self, policy: Box<dyn FailOverPolicy>) -> Self {
        self.fail_over_policy = Some(policy);
        self
    }

    /// Builds the configured `HttpServiceCaller`.
    ///
    /// # Errors
    ///
    /// Returns an error if no descriptor was provided, a target is not HTTP,
    /// or a transport cannot be built.
    pub fn build(self) -> Result<HttpServiceCaller> {
        let descriptor = self
            .descriptor
            .ok_or_else(|| Error::ConfigurationError("A descriptor is required".to_string()))?;

        let user_agent = self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let protocol = HttpProtocol::new(&descriptor, user_agent)?;

        let mut builder = ServiceCallerBuilder::new(protocol).descriptor(descriptor);
        if let Some(policy) = self.fail_over_policy {
            builder = builder.fail_over_policy(policy);
        }

        Ok(HttpServiceCaller {
            caller: builder.build()?,
        })
    }
}

impl Default for HttpServiceCallerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

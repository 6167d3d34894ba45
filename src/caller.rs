//! The fail-over call engine.
//!
//! A [`ServiceCaller`] executes a request against the targets of a
//! [`Descriptor`], one at a time, until a target succeeds or fail-over is no
//! longer allowed. The actual network call is performed by a
//! [`CallProtocol`] implementation such as
//! [`HttpProtocol`](crate::http::HttpProtocol).

use crate::{
    exception::{BoxError, CallException, CallExceptionKind, CallExceptionList},
    failover::{FailOverOnConnectionError, FailOverPolicy},
    request::CallRequest,
    CallResult, Descriptor, Error, Result, TargetDescriptor,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// A protocol-specific way to execute a request against a single target.
///
/// The engine takes care of target selection, time-out enforcement,
/// exception bookkeeping and fail-over; an implementation only performs one
/// attempt and classifies its failure.
///
/// # Examples
///
/// ```
/// use callover::{AttemptFailure, CallProtocol, CallRequest, TargetDescriptor};
///
/// #[derive(Debug)]
/// struct Ping;
///
/// impl CallRequest for Ping {
///     fn describe(&self) -> String {
///         "ping".to_string()
///     }
/// }
///
/// struct EchoProtocol;
///
/// impl CallProtocol for EchoProtocol {
///     type Request = Ping;
///     type Output = String;
///
///     async fn attempt(
///         &self,
///         target: &TargetDescriptor,
///         _request: &Ping,
///     ) -> Result<String, AttemptFailure> {
///         Ok(format!("pong from {}", target.url()))
///     }
/// }
/// ```
pub trait CallProtocol: Send + Sync + 'static {
    /// The request type this protocol executes.
    type Request: CallRequest + 'static;

    /// The data produced by a successful attempt.
    type Output: Send + 'static;

    /// Returns `true` if targets with the given protocol (URL scheme) can be
    /// called. Checked for every target when a caller is built.
    fn supports_protocol(&self, protocol: &str) -> bool {
        let _ = protocol;
        true
    }

    /// Executes `request` against `target` once.
    ///
    /// The engine runs this on a separate task and enforces the target's
    /// total time-out; implementations apply the connection and socket
    /// time-outs themselves.
    fn attempt(
        &self,
        target: &TargetDescriptor,
        request: &Self::Request,
    ) -> impl Future<Output = std::result::Result<Self::Output, AttemptFailure>> + Send;

    /// Decides whether a failed request may be tried against the next
    /// target.
    ///
    /// The default only fails over on connection errors, because then the
    /// target cannot have processed the request. Requests that allow
    /// fail-over are sent to the next target regardless of this method.
    fn should_fail_over(&self, request: &Self::Request, exception: &CallException) -> bool {
        FailOverOnConnectionError.should_fail_over(request, exception)
    }
}

/// The classified failure of a single attempt.
///
/// Returned by [`CallProtocol::attempt`]; the engine turns it into a
/// [`CallException`] by adding the request, the target and the duration.
#[derive(Debug)]
pub struct AttemptFailure {
    kind: CallExceptionKind,
    detail: Option<String>,
    cause: Option<BoxError>,
}

impl AttemptFailure {
    /// Creates a failure of the given kind.
    pub fn new(kind: CallExceptionKind) -> Self {
        Self {
            kind,
            detail: None,
            cause: None,
        }
    }

    /// The connection was refused.
    pub fn connection_refused() -> Self {
        Self::new(CallExceptionKind::ConnectionRefused)
    }

    /// The host could not be resolved.
    pub fn unknown_host() -> Self {
        Self::new(CallExceptionKind::UnknownHost)
    }

    /// The connection time-out was exceeded.
    pub fn connection_timeout() -> Self {
        Self::new(CallExceptionKind::ConnectionTimeout)
    }

    /// The socket time-out was exceeded.
    pub fn socket_timeout() -> Self {
        Self::new(CallExceptionKind::SocketTimeout)
    }

    /// An I/O error occurred.
    pub fn io(cause: impl Into<BoxError>) -> Self {
        Self::new(CallExceptionKind::Io).with_cause(cause)
    }

    /// The target returned an unacceptable status code.
    pub fn status_code(code: u16) -> Self {
        Self::new(CallExceptionKind::StatusCodeRejected { code })
    }

    /// Something went wrong that the protocol caller did not anticipate.
    pub fn unexpected(cause: impl Into<BoxError>) -> Self {
        Self::new(CallExceptionKind::Unexpected).with_cause(cause)
    }

    /// Attaches a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// The kind of failure.
    pub fn kind(&self) -> CallExceptionKind {
        self.kind
    }

    fn into_exception(
        self,
        request: Arc<dyn CallRequest>,
        target: TargetDescriptor,
        duration: Duration,
    ) -> CallException {
        CallException::new(self.kind, request, target, duration, self.detail, self.cause)
    }
}

/// Executes requests against a descriptor with fail-over.
///
/// The caller is cheap to clone and can be shared between tasks.
///
/// # Examples
///
/// ```no_run
/// use callover::{AttemptFailure, CallProtocol, CallRequest, Descriptor, ServiceCaller, TargetDescriptor};
/// use std::sync::Arc;
///
/// #[derive(Debug)]
/// struct Ping;
///
/// impl CallRequest for Ping {
///     fn describe(&self) -> String {
///         "ping".to_string()
///     }
/// }
///
/// struct EchoProtocol;
///
/// impl CallProtocol for EchoProtocol {
///     type Request = Ping;
///     type Output = String;
///
///     async fn attempt(&self, target: &TargetDescriptor, _: &Ping) -> Result<String, AttemptFailure> {
///         Ok(target.url().to_string())
///     }
/// }
///
/// # async fn example() -> Result<(), callover::Error> {
/// let descriptor: Descriptor = TargetDescriptor::new("echo://localhost", 1000)?.into();
/// let caller = ServiceCaller::new(descriptor, EchoProtocol)?;
///
/// let result = caller.call(Arc::new(Ping)).await?;
/// assert_eq!(result.data(), "echo://localhost");
/// # Ok(())
/// # }
/// ```
pub struct ServiceCaller<P: CallProtocol> {
    inner: Arc<CallerInner<P>>,
}

struct CallerInner<P> {
    descriptor: Arc<Descriptor>,
    protocol: Arc<P>,
    fail_over_policy: Option<Box<dyn FailOverPolicy>>,
}

impl<P: CallProtocol> Clone for ServiceCaller<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: CallProtocol> ServiceCaller<P> {
    /// Creates a caller with the protocol's own fail-over policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedProtocol`] if the protocol cannot call
    /// one of the targets.
    pub fn new(descriptor: impl Into<Arc<Descriptor>>, protocol: P) -> Result<Self> {
        ServiceCallerBuilder::new(protocol)
            .descriptor(descriptor)
            .build()
    }

    /// Creates a new `ServiceCallerBuilder`.
    pub fn builder(protocol: P) -> ServiceCallerBuilder<P> {
        ServiceCallerBuilder::new(protocol)
    }

    /// The descriptor of the targets this caller calls.
    pub fn descriptor(&self) -> &Descriptor {
        &self.inner.descriptor
    }

    /// The protocol used for individual attempts.
    pub fn protocol(&self) -> &P {
        &self.inner.protocol
    }

    /// Executes a request, failing over to other targets when allowed.
    ///
    /// Targets are tried in the order produced by
    /// [`Descriptor::iterate_targets`]. The first successful attempt wins.
    /// After a failure the next target is tried only if the request allows
    /// fail-over or the fail-over policy approves it.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the request describes itself as an
    ///   empty string.
    /// * [`Error::CallFailed`] with one exception per attempted target if no
    ///   target succeeded.
    pub async fn call(&self, request: Arc<P::Request>) -> Result<CallResult<P::Output>> {
        let description = request.describe();
        if description.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "The request description must not be empty".to_string(),
            ));
        }

        let shared_request: Arc<dyn CallRequest> = request.clone();
        let start_time = Instant::now();
        let mut exceptions = CallExceptionList::new();
        let mut targets = self.inner.descriptor.iterate_targets().peekable();

        while let Some(target) = targets.next() {
            let attempt = exceptions.len() + 1;

            tracing::debug!(
                url = target.url(),
                attempt = attempt,
                total_timeout_ms = target.total_timeout_ms(),
                request = %description,
                "Calling target"
            );

            let attempt_start = Instant::now();
            match self.execute_attempt(target, &request).await {
                Ok(data) => {
                    let duration = start_time.elapsed();
                    tracing::info!(
                        url = target.url(),
                        attempts = attempt,
                        duration_ms = duration.as_millis(),
                        "Call succeeded"
                    );

                    return Ok(CallResult::new(
                        shared_request,
                        target.clone(),
                        duration,
                        exceptions,
                        data,
                    ));
                }
                Err(failure) => {
                    let exception = failure.into_exception(
                        Arc::clone(&shared_request),
                        target.clone(),
                        attempt_start.elapsed(),
                    );

                    tracing::warn!(
                        error = %exception,
                        url = target.url(),
                        attempt = attempt,
                        "Call attempt failed"
                    );

                    // Peeking descends into the next group and counts as its traversal.
                    let fail_over =
                        self.should_fail_over(&request, &exception) && targets.peek().is_some();
                    exceptions.push(exception);

                    if !fail_over {
                        break;
                    }

                    tracing::info!(attempt = attempt, "Failing over to next target");
                }
            }
        }

        tracing::error!(
            attempts = exceptions.len(),
            duration_ms = start_time.elapsed().as_millis(),
            request = %description,
            "Call failed on all attempted targets"
        );

        Err(Error::CallFailed {
            request: description,
            exceptions,
        })
    }

    fn should_fail_over(&self, request: &P::Request, exception: &CallException) -> bool {
        if request.is_fail_over_allowed() {
            return true;
        }

        match &self.inner.fail_over_policy {
            Some(policy) => policy.should_fail_over(request, exception),
            None => self.inner.protocol.should_fail_over(request, exception),
        }
    }

    /// Runs a single attempt on a worker task, bounded by the target's
    /// total time-out.
    async fn execute_attempt(
        &self,
        target: &TargetDescriptor,
        request: &Arc<P::Request>,
    ) -> std::result::Result<P::Output, AttemptFailure> {
        let protocol = Arc::clone(&self.inner.protocol);
        let worker_target = target.clone();
        let worker_request = Arc::clone(request);
        let span = tracing::debug_span!("attempt", url = target.url());

        let mut worker = tokio::spawn(
            async move { protocol.attempt(&worker_target, &worker_request).await }.instrument(span),
        );

        let joined = match target.total_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut worker).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The worker's eventual outcome is discarded.
                    worker.abort();
                    return Err(AttemptFailure::new(CallExceptionKind::TotalTimeout));
                }
            },
            None => worker.await,
        };

        joined.unwrap_or_else(|join_error| {
            let detail = if join_error.is_panic() {
                "protocol caller panicked".to_string()
            } else {
                format!("protocol caller was cancelled: {}", join_error)
            };
            Err(AttemptFailure::new(CallExceptionKind::Unexpected).with_detail(detail))
        })
    }
}

/// Builder for configuring and creating a [`ServiceCaller`].
///
/// # Examples
///
/// ```no_run
/// # use callover::{AttemptFailure, CallProtocol, CallRequest, TargetDescriptor};
/// # #[derive(Debug)] struct Ping;
/// # impl CallRequest for Ping { fn describe(&self) -> String { "ping".into() } }
/// # struct EchoProtocol;
/// # impl CallProtocol for EchoProtocol {
/// #     type Request = Ping;
/// #     type Output = ();
/// #     async fn attempt(&self, _: &TargetDescriptor, _: &Ping) -> Result<(), AttemptFailure> { Ok(()) }
/// # }
/// use callover::{DescriptorBuilder, Properties, ServiceCaller};
/// use callover::failover::{FailOverOnConnectionError, FailOverOnStatusCode, OrPolicy};
///
/// # fn example() -> Result<(), callover::Error> {
/// let properties: Properties = "
///     echo = group, roundrobin, one, two
///     echo.one = service, echo://one.example.com, 1000
///     echo.two = service, echo://two.example.com, 1000
/// ".parse()?;
///
/// let caller = ServiceCaller::builder(EchoProtocol)
///     .descriptor(DescriptorBuilder::build(&properties, "echo")?)
///     .fail_over_policy(Box::new(OrPolicy::new(vec![
///         Box::new(FailOverOnConnectionError),
///         Box::new(FailOverOnStatusCode),
///     ])))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ServiceCallerBuilder<P> {
    protocol: P,
    descriptor: Option<Arc<Descriptor>>,
    fail_over_policy: Option<Box<dyn FailOverPolicy>>,
}

impl<P: CallProtocol> ServiceCallerBuilder<P> {
    /// Creates a new builder for the given protocol.
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            descriptor: None,
            fail_over_policy: None,
        }
    }

    /// Sets the descriptor of the targets to call.
    pub fn descriptor(mut self, descriptor: impl Into<Arc<Descriptor>>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Replaces the protocol's own fail-over decision.
    ///
    /// Requests that allow fail-over are still always sent to the next
    /// target.
    pub fn fail_over_policy(mut self, policy: Box<dyn FailOverPolicy>) -> Self {
        self.fail_over_policy = Some(policy);
        self
    }

    /// Builds the configured `ServiceCaller`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if no descriptor was provided,
    /// or [`Error::UnsupportedProtocol`] if the protocol cannot call one of
    /// the targets.
    pub fn build(self) -> Result<ServiceCaller<P>> {
        let descriptor = self
            .descriptor
            .ok_or_else(|| Error::ConfigurationError("A descriptor is required".to_string()))?;

        if let Some(target) = descriptor
            .configured_targets()
            .into_iter()
            .find(|t| !self.protocol.supports_protocol(t.protocol()))
        {
            return Err(Error::UnsupportedProtocol {
                protocol: target.protocol().to_string(),
                url: target.url().to_string(),
            });
        }

        Ok(ServiceCaller {
            inner: Arc::new(CallerInner {
                descriptor,
                protocol: Arc::new(self.protocol),
                fail_over_policy: self.fail_over_policy,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GroupDescriptor, GroupPolicy};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct TestRequest {
        fail_over_allowed: bool,
    }

    impl CallRequest for TestRequest {
        fn describe(&self) -> String {
            "test request".to_string()
        }

        fn is_fail_over_allowed(&self) -> bool {
            self.fail_over_allowed
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail(CallExceptionKind),
        Sleep(Duration),
        Panic,
    }

    /// Scripted protocol: each host behaves as configured.
    struct ScriptedProtocol {
        behaviors: HashMap<String, Behavior>,
        calls: AtomicUsize,
    }

    impl ScriptedProtocol {
        fn new(behaviors: &[(&str, Behavior)]) -> Self {
            Self {
                behaviors: behaviors
                    .iter()
                    .map(|(url, b)| (url.to_string(), *b))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CallProtocol for ScriptedProtocol {
        type Request = TestRequest;
        type Output = String;

        fn supports_protocol(&self, protocol: &str) -> bool {
            protocol == "test"
        }

        async fn attempt(
            &self,
            target: &TargetDescriptor,
            _request: &TestRequest,
        ) -> std::result::Result<String, AttemptFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviors[target.url()] {
                Behavior::Succeed => Ok(target.url().to_string()),
                Behavior::Fail(kind) => Err(AttemptFailure::new(kind)),
                Behavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(target.url().to_string())
                }
                Behavior::Panic => panic!("scripted panic"),
            }
        }
    }

    fn target(url: &str, total_timeout_ms: i64) -> Descriptor {
        TargetDescriptor::new(url, total_timeout_ms).unwrap().into()
    }

    fn ordered(members: Vec<Descriptor>) -> Descriptor {
        GroupDescriptor::new(GroupPolicy::Ordered, members)
            .unwrap()
            .into()
    }

    const A: &str = "test://a.example.com";
    const B: &str = "test://b.example.com";
    const C: &str = "test://c.example.com";

    #[tokio::test]
    async fn test_first_success_wins() {
        let protocol = ScriptedProtocol::new(&[(A, Behavior::Succeed), (B, Behavior::Succeed)]);
        let caller =
            ServiceCaller::new(ordered(vec![target(A, 1000), target(B, 1000)]), protocol).unwrap();

        let result = caller.call(Arc::new(TestRequest::default())).await.unwrap();

        assert_eq!(result.data(), A);
        assert_eq!(result.succeeded_target().url(), A);
        assert!(result.exceptions().is_empty());
        assert_eq!(result.attempts(), 1);
        assert_eq!(caller.protocol().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_over_after_connection_refused() {
        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Fail(CallExceptionKind::ConnectionRefused)),
            (B, Behavior::Succeed),
        ]);
        let caller =
            ServiceCaller::new(ordered(vec![target(A, 1000), target(B, 1000)]), protocol).unwrap();

        let result = caller.call(Arc::new(TestRequest::default())).await.unwrap();

        assert_eq!(result.succeeded_target().url(), B);
        assert_eq!(result.exceptions().len(), 1);
        let first = result.exceptions().first().unwrap();
        assert_eq!(first.kind(), CallExceptionKind::ConnectionRefused);
        assert_eq!(first.target().url(), A);
        assert!(result.failed_over());
    }

    #[tokio::test]
    async fn test_no_fail_over_for_ineligible_error() {
        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Fail(CallExceptionKind::Io)),
            (B, Behavior::Succeed),
        ]);
        let caller =
            ServiceCaller::new(ordered(vec![target(A, 1000), target(B, 1000)]), protocol).unwrap();

        let error = caller
            .call(Arc::new(TestRequest::default()))
            .await
            .unwrap_err();

        let exceptions = error.exceptions().unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions.first().unwrap().target().url(), A);
        assert_eq!(caller.protocol().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_over_allowed_forces_fail_over() {
        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Fail(CallExceptionKind::Io)),
            (B, Behavior::Fail(CallExceptionKind::SocketTimeout)),
            (C, Behavior::Succeed),
        ]);
        let caller = ServiceCaller::new(
            ordered(vec![target(A, 1000), target(B, 1000), target(C, 1000)]),
            protocol,
        )
        .unwrap();

        let request = TestRequest {
            fail_over_allowed: true,
        };
        let result = caller.call(Arc::new(request)).await.unwrap();

        assert_eq!(result.succeeded_target().url(), C);
        let kinds: Vec<_> = result.exceptions().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, [CallExceptionKind::Io, CallExceptionKind::SocketTimeout]);
    }

    #[tokio::test]
    async fn test_fail_over_allowed_with_single_target_terminates() {
        let protocol = ScriptedProtocol::new(&[(A, Behavior::Fail(CallExceptionKind::Io))]);
        let caller = ServiceCaller::new(target(A, 1000), protocol).unwrap();

        let request = TestRequest {
            fail_over_allowed: true,
        };
        let error = caller.call(Arc::new(request)).await.unwrap_err();

        match error {
            Error::CallFailed {
                request,
                exceptions,
            } => {
                assert_eq!(request, "test request");
                assert_eq!(exceptions.len(), 1);
            }
            other => panic!("Expected CallFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refused_fail_over_leaves_round_robin_untouched() {
        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Fail(CallExceptionKind::Io)),
            (B, Behavior::Succeed),
            (C, Behavior::Succeed),
        ]);
        let backups = GroupDescriptor::new(
            GroupPolicy::RoundRobin,
            vec![target(B, 1000), target(C, 1000)],
        )
        .unwrap();
        let caller =
            ServiceCaller::new(ordered(vec![target(A, 1000), backups.into()]), protocol).unwrap();

        // Io does not fail over, so the backup group is never entered
        caller
            .call(Arc::new(TestRequest::default()))
            .await
            .unwrap_err();

        let request = TestRequest {
            fail_over_allowed: true,
        };
        let result = caller.call(Arc::new(request)).await.unwrap();

        assert_eq!(result.succeeded_target().url(), B);
        assert_eq!(caller.protocol().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_all_targets_fail_in_order() {
        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Fail(CallExceptionKind::UnknownHost)),
            (B, Behavior::Fail(CallExceptionKind::ConnectionTimeout)),
            (C, Behavior::Fail(CallExceptionKind::ConnectionRefused)),
        ]);
        let caller = ServiceCaller::new(
            ordered(vec![target(A, 1000), target(B, 1000), target(C, 1000)]),
            protocol,
        )
        .unwrap();

        let error = caller
            .call(Arc::new(TestRequest::default()))
            .await
            .unwrap_err();

        let urls: Vec<_> = error
            .exceptions()
            .unwrap()
            .iter()
            .map(|e| e.target().url().to_string())
            .collect();
        assert_eq!(urls, [A, B, C]);
        assert!(error.to_string().contains("3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_total_timeout_is_enforced() {
        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Sleep(Duration::from_secs(10))),
            (B, Behavior::Succeed),
        ]);
        let caller =
            ServiceCaller::new(ordered(vec![target(A, 100), target(B, 1000)]), protocol).unwrap();

        let started = Instant::now();
        let error = caller
            .call(Arc::new(TestRequest::default()))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        // A total time-out is not a connection error, so no fail-over
        let exceptions = error.exceptions().unwrap();
        assert_eq!(exceptions.len(), 1);
        let exception = exceptions.first().unwrap();
        assert_eq!(exception.kind(), CallExceptionKind::TotalTimeout);
        assert!(exception.duration() >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2), "caller blocked for {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_disabled_total_timeout_waits() {
        let protocol =
            ScriptedProtocol::new(&[(A, Behavior::Sleep(Duration::from_millis(150)))]);
        let caller = ServiceCaller::new(target(A, 0), protocol).unwrap();

        let result = caller.call(Arc::new(TestRequest::default())).await.unwrap();
        assert_eq!(result.data(), A);
        assert!(result.duration() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_panicking_attempt_is_unexpected() {
        let protocol = ScriptedProtocol::new(&[(A, Behavior::Panic), (B, Behavior::Succeed)]);
        let caller = ServiceCaller::builder(protocol)
            .descriptor(ordered(vec![target(A, 1000), target(B, 1000)]))
            .build()
            .unwrap();

        let error = caller
            .call(Arc::new(TestRequest::default()))
            .await
            .unwrap_err();

        let exception = error.exceptions().unwrap().first().unwrap();
        assert_eq!(exception.kind(), CallExceptionKind::Unexpected);
        assert_eq!(exception.detail(), Some("protocol caller panicked"));
    }

    #[tokio::test]
    async fn test_custom_fail_over_policy_replaces_protocol_policy() {
        struct Always;
        impl FailOverPolicy for Always {
            fn should_fail_over(&self, _: &dyn CallRequest, _: &CallException) -> bool {
                true
            }
        }

        let protocol = ScriptedProtocol::new(&[
            (A, Behavior::Fail(CallExceptionKind::Io)),
            (B, Behavior::Succeed),
        ]);
        let caller = ServiceCaller::builder(protocol)
            .descriptor(ordered(vec![target(A, 1000), target(B, 1000)]))
            .fail_over_policy(Box::new(Always))
            .build()
            .unwrap();

        let result = caller.call(Arc::new(TestRequest::default())).await.unwrap();
        assert_eq!(result.succeeded_target().url(), B);
    }

    #[tokio::test]
    async fn test_empty_description_is_rejected() {
        #[derive(Debug)]
        struct Blank;
        impl CallRequest for Blank {
            fn describe(&self) -> String {
                "   ".to_string()
            }
        }

        struct BlankProtocol;
        impl CallProtocol for BlankProtocol {
            type Request = Blank;
            type Output = ();

            async fn attempt(
                &self,
                _: &TargetDescriptor,
                _: &Blank,
            ) -> std::result::Result<(), AttemptFailure> {
                Ok(())
            }
        }

        let caller = ServiceCaller::new(target(A, 1000), BlankProtocol).unwrap();
        let error = caller.call(Arc::new(Blank)).await.unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_unsupported_protocol_is_rejected() {
        let protocol = ScriptedProtocol::new(&[]);
        let result = ServiceCaller::new(
            ordered(vec![target(A, 1000), target("ftp://files.example.com/", 1000)]),
            protocol,
        );

        match result {
            Err(Error::UnsupportedProtocol { protocol, url }) => {
                assert_eq!(protocol, "ftp");
                assert_eq!(url, "ftp://files.example.com/");
            }
            Err(other) => panic!("Expected UnsupportedProtocol, got {:?}", other),
            Ok(_) => panic!("Expected UnsupportedProtocol, got a caller"),
        }
    }

    #[test]
    fn test_missing_descriptor_is_rejected() {
        let result = ServiceCallerBuilder::new(ScriptedProtocol::new(&[])).build();
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }
}

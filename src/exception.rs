//! Failures of individual call attempts.
//!
//! Every failed attempt against a target produces a [`CallException`]. The
//! [`ServiceCaller`](crate::ServiceCaller) collects them, in attempt order,
//! into a [`CallExceptionList`] which is available both from a successful
//! [`CallResult`](crate::CallResult) (failures before the succeeding target)
//! and from [`Error::CallFailed`](crate::Error::CallFailed).

use crate::request::CallRequest;
use crate::target::TimeoutDisplay;
use crate::TargetDescriptor;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The underlying cause of a call exception.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The reason an attempt against a target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallExceptionKind {
    /// The target actively refused the connection.
    ConnectionRefused,

    /// The host name of the target could not be resolved.
    UnknownHost,

    /// Connecting to the target took longer than the connection time-out.
    ConnectionTimeout,

    /// Waiting for data took longer than the socket time-out.
    SocketTimeout,

    /// The complete attempt took longer than the total time-out.
    TotalTimeout,

    /// Some other I/O error occurred.
    Io,

    /// The target responded with a status code that was not acceptable.
    StatusCodeRejected {
        /// The status code returned by the target
        code: u16,
    },

    /// The protocol caller failed in a way it did not anticipate.
    ///
    /// This usually indicates a defect in the protocol caller.
    Unexpected,
}

impl CallExceptionKind {
    /// Returns `true` if the failure happened while establishing the
    /// connection, meaning the target never received the request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CallExceptionKind::ConnectionRefused
                | CallExceptionKind::UnknownHost
                | CallExceptionKind::ConnectionTimeout
        )
    }

    /// The short, human-readable reason for this kind of failure.
    pub fn short_reason(&self) -> String {
        match self {
            CallExceptionKind::ConnectionRefused => "Connection refused".to_string(),
            CallExceptionKind::UnknownHost => "Unknown host".to_string(),
            CallExceptionKind::ConnectionTimeout => "Connection time-out".to_string(),
            CallExceptionKind::SocketTimeout => "Socket time-out".to_string(),
            CallExceptionKind::TotalTimeout => "Total time-out".to_string(),
            CallExceptionKind::Io => "I/O error".to_string(),
            CallExceptionKind::StatusCodeRejected { code } => {
                format!("Unsupported HTTP status code {}", code)
            }
            CallExceptionKind::Unexpected => "Unexpected exception caught".to_string(),
        }
    }
}

/// A failed attempt to call a single target.
///
/// The message is built deterministically from the short reason, the
/// request description, the target URL, its three time-outs, the duration
/// and the optional detail, for example:
///
/// ```text
/// Connection refused in 3 ms while executing HTTP request #1 [...] at http://a.example.com/ with
/// connection time-out 500 ms, with socket time-out disabled and with total time-out 2000 ms.
/// ```
#[derive(thiserror::Error)]
#[error("{message}")]
pub struct CallException {
    kind: CallExceptionKind,
    short_reason: String,
    message: String,
    request: Arc<dyn CallRequest>,
    target: TargetDescriptor,
    duration: Duration,
    detail: Option<String>,
    #[source]
    cause: Option<BoxError>,
}

impl CallException {
    /// Creates a new exception for a failed attempt.
    pub fn new(
        kind: CallExceptionKind,
        request: Arc<dyn CallRequest>,
        target: TargetDescriptor,
        duration: Duration,
        detail: Option<String>,
        cause: Option<BoxError>,
    ) -> Self {
        let short_reason = kind.short_reason();
        let message = create_message(
            &short_reason,
            request.as_ref(),
            &target,
            duration,
            detail.as_deref(),
        );

        Self {
            kind,
            short_reason,
            message,
            request,
            target,
            duration,
            detail,
            cause: cause.map(root_cause),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> CallExceptionKind {
        self.kind
    }

    /// The short reason, e.g. `"Connection refused"`.
    pub fn short_reason(&self) -> &str {
        &self.short_reason
    }

    /// The request that was being executed.
    pub fn request(&self) -> &Arc<dyn CallRequest> {
        &self.request
    }

    /// The target the request was executed against.
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// How long the attempt took before it failed.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Additional detail about the failure, if any.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// The status code, for [`CallExceptionKind::StatusCodeRejected`].
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            CallExceptionKind::StatusCodeRejected { code } => Some(code),
            _ => None,
        }
    }
}

impl fmt::Debug for CallException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallException")
            .field("kind", &self.kind)
            .field("target", &self.target.url())
            .field("duration", &self.duration)
            .field("detail", &self.detail)
            .field("cause", &self.cause)
            .finish()
    }
}

fn create_message(
    short_reason: &str,
    request: &dyn CallRequest,
    target: &TargetDescriptor,
    duration: Duration,
    detail: Option<&str>,
) -> String {
    let mut message = format!(
        "{} in {} ms while executing {} at {} with connection time-out {}, with socket time-out {} and with total time-out {}",
        short_reason,
        duration.as_millis(),
        request.describe(),
        target.url(),
        TimeoutDisplay(target.connection_timeout_ms()),
        TimeoutDisplay(target.socket_timeout_ms()),
        TimeoutDisplay(target.total_timeout_ms()),
    );

    match detail {
        Some(detail) => {
            message.push_str(": ");
            message.push_str(detail);
        }
        None => message.push('.'),
    }

    message
}

/// Unwraps nested sources down to the innermost error.
fn root_cause(error: BoxError) -> BoxError {
    if error.source().is_none() {
        return error;
    }
    // Sources are only borrowed, so the innermost one is captured as text.
    let mut innermost: &(dyn std::error::Error + 'static) = error.as_ref();
    while let Some(source) = innermost.source() {
        innermost = source;
    }
    Box::new(RootCause(innermost.to_string()))
}

#[derive(Debug)]
struct RootCause(String);

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RootCause {}

/// The failures of a call, in the order the targets were attempted.
///
/// Only the [`ServiceCaller`](crate::ServiceCaller) appends to a list, so an
/// entry never changes once it has been added.
#[derive(Debug, Default)]
pub struct CallExceptionList {
    exceptions: Vec<CallException>,
}

impl CallExceptionList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, exception: CallException) {
        self.exceptions.push(exception);
    }

    /// The number of failed attempts.
    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    /// Returns `true` if no attempt failed.
    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    /// The exception of the attempt at `index`, counting from the first.
    pub fn get(&self, index: usize) -> Option<&CallException> {
        self.exceptions.get(index)
    }

    /// The exception of the first failed attempt.
    pub fn first(&self) -> Option<&CallException> {
        self.exceptions.first()
    }

    /// The exception of the most recent failed attempt.
    pub fn last(&self) -> Option<&CallException> {
        self.exceptions.last()
    }

    /// The exception that followed the one at `index`, if any.
    pub fn next_of(&self, index: usize) -> Option<&CallException> {
        index.checked_add(1).and_then(|next| self.exceptions.get(next))
    }

    /// Iterates over the exceptions in attempt order.
    pub fn iter(&self) -> std::slice::Iter<'_, CallException> {
        self.exceptions.iter()
    }
}

impl<'a> IntoIterator for &'a CallExceptionList {
    type Item = &'a CallException;
    type IntoIter = std::slice::Iter<'a, CallException>;

    fn into_iter(self) -> Self::IntoIter {
        self.exceptions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Named(&'static str);

    impl CallRequest for Named {
        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    fn exception(kind: CallExceptionKind, url: &str, detail: Option<&str>) -> CallException {
        let target = TargetDescriptor::with_timeouts(url, 2000, 500, 0).unwrap();
        CallException::new(
            kind,
            Arc::new(Named("test request")),
            target,
            Duration::from_millis(3),
            detail.map(str::to_string),
            None,
        )
    }

    #[test]
    fn test_message_format() {
        let e = exception(CallExceptionKind::ConnectionRefused, "http://a.example.com/", None);
        assert_eq!(
            e.to_string(),
            "Connection refused in 3 ms while executing test request at http://a.example.com/ \
             with connection time-out 500 ms, with socket time-out disabled and with total \
             time-out 2000 ms."
        );

        let e = exception(
            CallExceptionKind::StatusCodeRejected { code: 503 },
            "http://a.example.com/",
            Some("service unavailable"),
        );
        assert!(e
            .to_string()
            .starts_with("Unsupported HTTP status code 503 in 3 ms"));
        assert!(e.to_string().ends_with("total time-out 2000 ms: service unavailable"));
        assert_eq!(e.status_code(), Some(503));
    }

    #[test]
    fn test_connection_errors() {
        assert!(CallExceptionKind::ConnectionRefused.is_connection_error());
        assert!(CallExceptionKind::UnknownHost.is_connection_error());
        assert!(CallExceptionKind::ConnectionTimeout.is_connection_error());
        assert!(!CallExceptionKind::SocketTimeout.is_connection_error());
        assert!(!CallExceptionKind::TotalTimeout.is_connection_error());
        assert!(!CallExceptionKind::Io.is_connection_error());
        assert!(!CallExceptionKind::Unexpected.is_connection_error());
        assert!(!CallExceptionKind::StatusCodeRejected { code: 500 }.is_connection_error());
    }

    #[test]
    fn test_cause_is_unwrapped_to_root() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let root = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let target = TargetDescriptor::new("http://a.example.com/", 100).unwrap();
        let e = CallException::new(
            CallExceptionKind::Io,
            Arc::new(Named("req")),
            target,
            Duration::ZERO,
            None,
            Some(Box::new(Outer(root))),
        );

        let source = std::error::Error::source(&e).unwrap();
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn test_list_preserves_attempt_order() {
        let mut list = CallExceptionList::new();
        assert!(list.is_empty());
        assert!(list.last().is_none());

        list.push(exception(CallExceptionKind::ConnectionRefused, "http://a.example.com/", None));
        list.push(exception(CallExceptionKind::UnknownHost, "http://b.example.com/", None));
        list.push(exception(CallExceptionKind::Io, "http://c.example.com/", None));

        assert_eq!(list.len(), 3);
        assert_eq!(list.first().unwrap().target().url(), "http://a.example.com/");
        assert_eq!(list.next_of(0).unwrap().kind(), CallExceptionKind::UnknownHost);
        assert_eq!(list.next_of(1).unwrap().kind(), CallExceptionKind::Io);
        assert!(list.next_of(2).is_none());
        assert_eq!(list.last().unwrap().target().url(), "http://c.example.com/");

        let urls: Vec<_> = list.iter().map(|e| e.target().url()).collect();
        assert_eq!(
            urls,
            ["http://a.example.com/", "http://b.example.com/", "http://c.example.com/"]
        );
    }
}

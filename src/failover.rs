//! Fail-over policies.
//!
//! After an attempt fails, the [`ServiceCaller`](crate::ServiceCaller) asks a
//! policy whether the request may be sent to the next target. Retrying is
//! only safe when the failed target cannot have processed the request, or
//! when the request explicitly allows it.

use crate::exception::CallException;
use crate::request::CallRequest;

/// Decides whether a failed request may be retried against the next target.
///
/// # Examples
///
/// ```
/// use callover::{CallException, CallExceptionKind, CallRequest, FailOverPolicy};
///
/// /// Also fails over on total time-outs, for idempotent services.
/// struct FailOverOnTotalTimeout;
///
/// impl FailOverPolicy for FailOverOnTotalTimeout {
///     fn should_fail_over(&self, _request: &dyn CallRequest, exception: &CallException) -> bool {
///         exception.kind() == CallExceptionKind::TotalTimeout
///     }
/// }
/// ```
pub trait FailOverPolicy: Send + Sync {
    /// Returns `true` if the request may be tried against the next target.
    ///
    /// # Arguments
    ///
    /// * `request` - The request that failed
    /// * `exception` - The failure of the most recent attempt
    fn should_fail_over(&self, request: &dyn CallRequest, exception: &CallException) -> bool;
}

/// Fails over when the connection could not be established.
///
/// Covers refused connections, unknown hosts and connection time-outs. In
/// all of these cases the target never received the request. This is the
/// default policy of every protocol caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailOverOnConnectionError;

impl FailOverPolicy for FailOverOnConnectionError {
    fn should_fail_over(&self, _request: &dyn CallRequest, exception: &CallException) -> bool {
        exception.kind().is_connection_error()
    }
}

/// Fails over when the target rejected the request with a status code
/// outside the 2xx range.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailOverOnStatusCode;

impl FailOverPolicy for FailOverOnStatusCode {
    fn should_fail_over(&self, _request: &dyn CallRequest, exception: &CallException) -> bool {
        matches!(exception.status_code(), Some(code) if !(200..=299).contains(&code))
    }
}

/// Fails over whenever the request allows it.
///
/// See [`CallRequest::is_fail_over_allowed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FailOverWhenAllowed;

impl FailOverPolicy for FailOverWhenAllowed {
    fn should_fail_over(&self, request: &dyn CallRequest, _exception: &CallException) -> bool {
        request.is_fail_over_allowed()
    }
}

/// Never fails over on its own.
///
/// Requests that allow fail-over are still sent to the next target, since
/// the engine honours that flag regardless of the policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFailOver;

impl FailOverPolicy for NeverFailOver {
    fn should_fail_over(&self, _request: &dyn CallRequest, _exception: &CallException) -> bool {
        false
    }
}

/// Combine multiple policies with OR logic.
///
/// Fails over if ANY of the policies return `true`.
///
/// # Examples
///
/// ```
/// use callover::failover::{FailOverOnConnectionError, FailOverOnStatusCode, OrPolicy};
///
/// let policy = OrPolicy::new(vec![
///     Box::new(FailOverOnConnectionError),
///     Box::new(FailOverOnStatusCode),
/// ]);
/// ```
pub struct OrPolicy {
    policies: Vec<Box<dyn FailOverPolicy>>,
}

impl OrPolicy {
    /// Creates a new `OrPolicy` from a list of policies.
    pub fn new(policies: Vec<Box<dyn FailOverPolicy>>) -> Self {
        Self { policies }
    }
}

impl FailOverPolicy for OrPolicy {
    fn should_fail_over(&self, request: &dyn CallRequest, exception: &CallException) -> bool {
        self.policies
            .iter()
            .any(|p| p.should_fail_over(request, exception))
    }
}

/// Combine multiple policies with AND logic.
///
/// Fails over only if ALL of the policies return `true`.
pub struct AndPolicy {
    policies: Vec<Box<dyn FailOverPolicy>>,
}

impl AndPolicy {
    /// Creates a new `AndPolicy` from a list of policies.
    pub fn new(policies: Vec<Box<dyn FailOverPolicy>>) -> Self {
        Self { policies }
    }
}

impl FailOverPolicy for AndPolicy {
    fn should_fail_over(&self, request: &dyn CallRequest, exception: &CallException) -> bool {
        self.policies
            .iter()
            .all(|p| p.should_fail_over(request, exception))
    }
}

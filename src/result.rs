//! Result of a successful service call.
//!
//! A [`CallResult`] wraps the protocol-specific data returned by the target
//! that succeeded, together with the request, the target, the time the call
//! took and the failures of any targets tried before it.

use crate::exception::CallExceptionList;
use crate::request::CallRequest;
use crate::TargetDescriptor;
use std::sync::Arc;
use std::time::Duration;

/// A successful call result.
///
/// # Type Parameters
///
/// * `T` - The data produced by the protocol caller
///
/// # Examples
///
/// ```no_run
/// use callover::{HttpCallRequest, HttpServiceCaller};
///
/// # async fn example(caller: HttpServiceCaller) -> Result<(), callover::Error> {
/// let result = caller.call(HttpCallRequest::new()).await?;
///
/// println!("Succeeded at {}", result.succeeded_target().url());
/// println!("Call took {:?}", result.duration());
///
/// if result.failed_over() {
///     for exception in result.exceptions() {
///         println!("Earlier failure: {}", exception);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CallResult<T> {
    request: Arc<dyn CallRequest>,
    succeeded_target: TargetDescriptor,
    duration: Duration,
    exceptions: CallExceptionList,
    data: T,
}

impl<T> CallResult<T> {
    /// Creates a new `CallResult`.
    ///
    /// This is called by the engine once a target has succeeded.
    pub(crate) fn new(
        request: Arc<dyn CallRequest>,
        succeeded_target: TargetDescriptor,
        duration: Duration,
        exceptions: CallExceptionList,
        data: T,
    ) -> Self {
        Self {
            request,
            succeeded_target,
            duration,
            exceptions,
            data,
        }
    }

    /// The request that was executed.
    pub fn request(&self) -> &Arc<dyn CallRequest> {
        &self.request
    }

    /// The target that produced this result.
    pub fn succeeded_target(&self) -> &TargetDescriptor {
        &self.succeeded_target
    }

    /// The total duration of the call, including failed attempts.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The failures of targets that were tried before the succeeding one,
    /// in attempt order. Empty if the first target succeeded.
    pub fn exceptions(&self) -> &CallExceptionList {
        &self.exceptions
    }

    /// Returns `true` if at least one target failed before this result was
    /// obtained.
    pub fn failed_over(&self) -> bool {
        !self.exceptions.is_empty()
    }

    /// The number of targets that were attempted, including the succeeding
    /// one.
    pub fn attempts(&self) -> usize {
        self.exceptions.len() + 1
    }

    /// The protocol-specific data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consumes the result, returning the protocol-specific data.
    pub fn into_data(self) -> T {
        self.data
    }

    /// Maps the data to a different type, keeping all metadata.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use callover::{HttpCallRequest, HttpServiceCaller};
    /// # async fn example(caller: HttpServiceCaller) -> Result<(), callover::Error> {
    /// let result = caller.call(HttpCallRequest::new()).await?;
    /// let length = result.map(|data| data.body().len());
    /// println!("{} bytes", length.data());
    /// # Ok(())
    /// # }
    /// ```
    pub fn map<U, F>(self, f: F) -> CallResult<U>
    where
        F: FnOnce(T) -> U,
    {
        CallResult {
            request: self.request,
            succeeded_target: self.succeeded_target,
            duration: self.duration,
            exceptions: self.exceptions,
            data: f(self.data),
        }
    }
}

impl<T> AsRef<T> for CallResult<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for CallResult<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

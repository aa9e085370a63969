/// Classification for retry policy.
///
/// Used to determine how the retry executor and the fallback chain
/// should respond to an error.
///
/// # Behavior Summary
///
/// | Class | Retry In Place? | Try Next Source? |
/// |-------|-----------------|------------------|
/// | `Never` | No | No |
/// | `Backoff` | Yes (exponential backoff) | Yes, once retries are spent |
/// | `NextSource` | No | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - validation error or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry the same operation with exponential backoff.
    ///
    /// Used for transient errors like rate limiting (HTTP 429 analogue)
    /// or upstream outages/timeouts (5xx analogue). This is the class
    /// matched by the executor's default retry condition.
    Backoff,

    /// Don't retry this source; another source might succeed.
    ///
    /// Used when one source can't serve the request (call failed,
    /// probe failed) but the fallback chain should keep going.
    NextSource,
}

// Panic isolation for dispatches
use std::any::Any;
use std::future::Future;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked (or its task was cancelled)
    Panicked(String),
}

/// Run a future on its own task so a panic cannot unwind into the caller.
///
/// The caller still waits for completion; only the unwinding is contained.
///
/// # Example
/// ```text
/// match execute_guarded(async { panic!("boom") }).await {
///     PanicGuardResult::Panicked(msg) => assert_eq!(msg, "boom"),
///     PanicGuardResult::Success(_) => unreachable!(),
/// }
/// ```
pub async fn execute_guarded<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn(future).await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic());
            error!(panic_msg = %panic_msg, "Dispatch panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
        Err(join_err) => PanicGuardResult::Panicked(format!("task cancelled: {}", join_err)),
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

// Broker constants (no magic values)
use std::time::Duration;

/// Default consumer pool size
pub const DEFAULT_CONSUMER_COUNT: usize = 4;

/// Upper bound on the pool size accepted by config validation
pub const MAX_CONSUMER_COUNT: usize = 1024;

/// Default bounded queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default time a producer may wait on a full queue (5 seconds)
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for in-flight dispatches on shutdown (5 seconds)
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

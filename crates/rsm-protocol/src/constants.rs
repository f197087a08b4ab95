use std::time::Duration;

/// Port appended to member hosts registered without one.
pub const DEFAULT_MEMBER_PORT: u16 = 27017;

/// Default listen port of the maintainer.
pub const DEFAULT_MAINTAINER_PORT: u16 = 27018;

/// Name the maintainer advertises itself under.
pub const SERVICE_NAME: &str = "mongodb-replica-maintainer";

/// Recently added members are exempt from eviction for this long.
pub const GRACE_PERIOD: Duration = Duration::from_secs(15 * 60);

/// A member whose last heartbeat is older than this may be evicted.
pub const STALENESS_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Default period of the eviction sweep.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// How long an agent waits for the transport to open.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long an agent waits for a registration response before resending.
pub const REGISTRATION_ACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Bounds of the randomized delay before re-registering after a rejection
/// or an eviction notice.
pub const REGISTRATION_RETRY_MIN: Duration = Duration::from_secs(10);
pub const REGISTRATION_RETRY_MAX: Duration = Duration::from_secs(15);

/// Floors applied to configured agent intervals.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(1000);
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Replica state code reported for the primary.
pub const PRIMARY_STATE: i32 = 1;

/// Replica state code reported for a secondary.
pub const SECONDARY_STATE: i32 = 2;

//! Centralized default constants for chatvault.
//!
//! All crates reference these constants instead of defining their own
//! magic numbers. Every value here can be overridden through configuration.

// =============================================================================
// PAGINATION
// =============================================================================

/// Conversations requested per listing page.
pub const DIALOGS_PAGE_LIMIT: i32 = 100;

/// Messages requested per history page.
pub const MESSAGES_PAGE_LIMIT: i32 = 50;

/// Default page size for read-side listings.
pub const READ_PAGE_LIMIT: i64 = 50;

// =============================================================================
// MEDIA POOL
// =============================================================================

/// Number of concurrent media workers.
pub const MEDIA_WORKERS: usize = 5;

/// Capacity of the bounded media job queue.
pub const MEDIA_QUEUE_CAPACITY: usize = 100;

/// Upper bound on a single media job (download + upload + update).
pub const MEDIA_JOB_TIMEOUT_SECS: u64 = 600;

/// Broadcast buffer for worker lifecycle events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// RESCAN
// =============================================================================

/// Pause between two full rescans.
pub const RESCAN_INTERVAL_SECS: u64 = 300;

// =============================================================================
// REMOTE BRIDGE
// =============================================================================

/// Default base URL of the messaging bridge.
pub const BRIDGE_URL: &str = "http://localhost:8081";

/// HTTP timeout for bridge calls (media downloads included).
pub const BRIDGE_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// OBJECT STORAGE
// =============================================================================

/// Filesystem root for stored objects.
pub const STORAGE_PATH: &str = "./data/objects";

/// Bucket name embedded in locators.
pub const STORAGE_BUCKET: &str = "chatvault";

/// Public base URL that signed links are issued against.
pub const STORAGE_PUBLIC_URL: &str = "http://localhost:8083/files";

/// Lifetime of a signed read URL.
pub const PRESIGN_EXPIRY_SECS: u64 = 900;

// =============================================================================
// DATABASE
// =============================================================================

/// Maximum number of pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

//! Application constants
//!
//! Centralized location for limits, defaults, and file names.

use std::time::Duration;

/// User-Agent sent with every request unless overridden in the engine limits
pub const DEFAULT_USER_AGENT: &str = concat!("tinyrequest/", env!("CARGO_PKG_VERSION"));

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total (whole-transfer) timeout
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum redirects followed before the transport gives up
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default cap on buffered response bodies (100 MiB)
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// Smallest allowed response-size cap (1 KiB)
pub const MIN_RESPONSE_SIZE: usize = 1024;

/// Largest allowed response-size cap (1 GiB)
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024 * 1024;

/// Worker threads backing the async engine
pub const MAX_WORKERS: usize = 4;

/// URL length limit (bytes)
pub const MAX_URL_LEN: usize = 2048;

/// Host length limit (bytes)
pub const MAX_HOST_LEN: usize = 256;

/// Header name length limit
pub const MAX_HEADER_NAME_LEN: usize = 128;

/// Header value length limit
pub const MAX_HEADER_VALUE_LEN: usize = 512;

/// Maximum headers on a request or stored on a response
pub const MAX_HEADERS: usize = 100;

/// A single raw header line is capped at 8 KiB
pub const MAX_HEADER_LINE_LEN: usize = 8 * 1024;

/// Custom method name length limit
pub const MAX_METHOD_LEN: usize = 10;

/// Request body size limit (50 MiB)
pub const MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Status text is clipped to this many bytes
pub const MAX_STATUS_TEXT_LEN: usize = 64;

/// Debounce window between autosaves of a dirty collection
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Bounded request history kept on the session
pub const MAX_HISTORY: usize = 50;

/// How long a published notice stays visible unless overridden
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(4);

/// Single-request snapshot file, placed directly in `$HOME`
pub const STATE_FILE_NAME: &str = ".tinyrequest_state";

/// State directory holding collections, placed in `$HOME`
pub const STATE_DIR_NAME: &str = ".tinyrequest";

/// Process exit code for a clean shutdown
pub const EXIT_OK: i32 = 0;

/// Process exit code when transport init or the state directory fails
pub const EXIT_INIT_FAILURE: i32 = 1;

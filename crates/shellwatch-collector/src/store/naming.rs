//! Store file naming.
//!
//! Files are named `{prefix}-YYYYMMDD-HHMMSS.bin` from the local wall clock.
//! Two rotations inside the same second would collide, so the caller retries
//! with [`suffixed_name`] until `create_new` succeeds.

use chrono::{DateTime, TimeZone};

/// File extension of store files
pub const STORE_EXTENSION: &str = "bin";

/// Upper bound on `-N` suffixes tried for one timestamp
pub const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Base file name for a store file opened at `now`.
pub fn store_file_name<Tz>(prefix: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{prefix}-{}.{STORE_EXTENSION}", now.format("%Y%m%d-%H%M%S"))
}

/// Name to try on the `attempt`-th collision (`attempt == 0` is the base name).
pub fn suffixed_name<Tz>(prefix: &str, now: &DateTime<Tz>, attempt: u32) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if attempt == 0 {
        return store_file_name(prefix, now);
    }
    format!("{prefix}-{}-{attempt}.{STORE_EXTENSION}", now.format("%Y%m%d-%H%M%S"))
}

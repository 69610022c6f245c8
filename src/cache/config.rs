//! TTL classes for cache entries.

use std::time::Duration;

/// Expiration class assigned to each key shape at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Volatile status data (1 minute).
    Short,
    /// Listings that change whenever any item changes (5 minutes).
    Medium,
    /// Filtered listings (10 minutes).
    Extended,
    /// Single records that rarely change (30 minutes).
    Long,
}

impl TtlClass {
    /// Time-to-live in whole seconds.
    pub const fn seconds(self) -> u64 {
        match self {
            Self::Short => 60,
            Self::Medium => 300,
            Self::Extended => 600,
            Self::Long => 1800,
        }
    }

    pub const fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }
}

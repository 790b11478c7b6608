//! Nanosecond-precision timestamp type.
//!
//! Every tag mutation carries one of these. Invariant 1 (spec.md section 3)
//! requires tag timestamps to be strictly monotonic per `(entity, namespace)`,
//! so callers that assign timestamps (the writer) must never produce two
//! equal values for the same namespace.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
///
/// Never expose raw arithmetic on the wrapped integer outside this module;
/// use the named constructors and combinators below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Maximum representable timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Current wall-clock time. Falls back to `EPOCH` if the system clock
    /// reports a time before the Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_nanos() as u64)
    }

    /// Construct from a raw nanosecond count.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Construct from milliseconds since epoch.
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000_000))
    }

    /// Construct from seconds since epoch.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000_000))
    }

    /// Raw nanoseconds since epoch.
    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Duration since an earlier timestamp, or `None` if `earlier` is
    /// actually later than `self`.
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        if self.0 >= earlier.0 {
            Some(Duration::from_nanos(self.0 - earlier.0))
        } else {
            None
        }
    }

    /// Add a duration, saturating at `Timestamp::MAX`.
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_nanos() as u64))
    }

    /// Subtract a duration, saturating at `Timestamp::EPOCH`.
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_nanos() as u64))
    }

    /// Whether this timestamp is strictly before `other`.
    #[inline]
    pub fn is_before(&self, other: Timestamp) -> bool {
        self.0 < other.0
    }

    /// Whether this timestamp is strictly after `other`.
    #[inline]
    pub fn is_after(&self, other: Timestamp) -> bool {
        self.0 > other.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_nanosecond_exact() {
        let a = Timestamp::from_nanos(100);
        let b = Timestamp::from_nanos(101);
        assert!(a.is_before(b));
        assert!(b.is_after(a));
        assert_eq!(a, Timestamp::from_nanos(100));
    }

    #[test]
    fn duration_since_none_when_inverted() {
        let a = Timestamp::from_nanos(10);
        let b = Timestamp::from_nanos(20);
        assert!(a.duration_since(b).is_none());
        assert_eq!(b.duration_since(a), Some(Duration::from_nanos(10)));
    }

    #[test]
    fn saturating_add_caps_at_max() {
        let t = Timestamp::MAX;
        assert_eq!(t.saturating_add(Duration::from_secs(1)), Timestamp::MAX);
    }

    #[test]
    fn saturating_sub_caps_at_epoch() {
        let t = Timestamp::EPOCH;
        assert_eq!(
            t.saturating_sub(Duration::from_secs(1)),
            Timestamp::EPOCH
        );
    }

    #[test]
    fn from_secs_and_millis_convert_to_nanos() {
        assert_eq!(Timestamp::from_secs(1).as_nanos(), 1_000_000_000);
        assert_eq!(Timestamp::from_millis(1).as_nanos(), 1_000_000);
    }
}

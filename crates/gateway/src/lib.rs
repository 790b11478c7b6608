//! Request throttling, config resolution, and metrics collection that
//! sit in front of `entitydb-repository` (spec.md sections 4.10-4.12).

mod config;
mod metrics;
mod throttle;

pub use config::{parse_toml_env, ConfigKey, ConfigResolver, ConfigValue};
pub use metrics::{MetricsCollector, Snapshot};
pub use throttle::{adaptive_delay, CacheKey, CachedResponse, Decision, Throttler, CLIENT_IDLE_EVICTION, DEFAULT_CACHE_TTL, DEFAULT_DELAY_CEILING, WINDOW};

//! Typed configuration resolution (spec.md section 6): three-tier
//! precedence over db tags, CLI flags, and environment/file defaults,
//! cached with a single-flight refresh. Grounded on
//! `crates/engine/src/database/config.rs`'s typed config table.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Every resolvable configuration key (spec.md section 6's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ChunkSizeBytes,
    CheckpointIntervalSecs,
    SessionTtlSecs,
    ThrottleCacheTtlSecs,
    ThrottleDelayCeilingMs,
    TagIndexShards,
}

impl ConfigKey {
    fn env_var(self) -> &'static str {
        match self {
            ConfigKey::ChunkSizeBytes => "ENTITYDB_CHUNK_SIZE_BYTES",
            ConfigKey::CheckpointIntervalSecs => "ENTITYDB_CHECKPOINT_INTERVAL_SECS",
            ConfigKey::SessionTtlSecs => "ENTITYDB_SESSION_TTL_SECS",
            ConfigKey::ThrottleCacheTtlSecs => "ENTITYDB_THROTTLE_CACHE_TTL_SECS",
            ConfigKey::ThrottleDelayCeilingMs => "ENTITYDB_THROTTLE_DELAY_CEILING_MS",
            ConfigKey::TagIndexShards => "ENTITYDB_TAG_INDEX_SHARDS",
        }
    }

    fn db_tag_name(self) -> &'static str {
        match self {
            ConfigKey::ChunkSizeBytes => "conf:chunk_size_bytes",
            ConfigKey::CheckpointIntervalSecs => "conf:checkpoint_interval_secs",
            ConfigKey::SessionTtlSecs => "conf:session_ttl_secs",
            ConfigKey::ThrottleCacheTtlSecs => "conf:throttle_cache_ttl_secs",
            ConfigKey::ThrottleDelayCeilingMs => "conf:throttle_delay_ceiling_ms",
            ConfigKey::TagIndexShards => "conf:tag_index_shards",
        }
    }

    fn default_value(self) -> ConfigValue {
        match self {
            ConfigKey::ChunkSizeBytes => ConfigValue::Int(4 * 1024 * 1024),
            ConfigKey::CheckpointIntervalSecs => ConfigValue::Int(300),
            ConfigKey::SessionTtlSecs => ConfigValue::Int(3600),
            ConfigKey::ThrottleCacheTtlSecs => ConfigValue::Int(30),
            ConfigKey::ThrottleDelayCeilingMs => ConfigValue::Int(2000),
            ConfigKey::TagIndexShards => ConfigValue::Int(256),
        }
    }
}

/// A resolved configuration value. `Text` covers keys this table
/// doesn't yet enumerate but a caller resolves by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ConfigValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn parse(raw: &str) -> ConfigValue {
        if let Ok(b) = raw.parse::<bool>() {
            ConfigValue::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            ConfigValue::Int(i)
        } else {
            ConfigValue::Text(raw.to_string())
        }
    }
}

/// Parse a TOML config file's flat `[config]` table into the
/// environment tier (spec.md section 6: file-based defaults sit below
/// flags and db tags, above the hardcoded default).
pub fn parse_toml_env(raw: &str) -> Result<HashMap<String, ConfigValue>, toml::de::Error> {
    #[derive(serde::Deserialize)]
    struct Document {
        #[serde(default)]
        config: HashMap<String, toml::Value>,
    }
    let doc: Document = toml::from_str(raw)?;
    Ok(doc
        .config
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                toml::Value::Boolean(b) => ConfigValue::Bool(b),
                toml::Value::Integer(i) => ConfigValue::Int(i),
                other => ConfigValue::Text(other.to_string()),
            };
            (k, value)
        })
        .collect())
}

struct CacheEntry {
    value: ConfigValue,
    cached_at: Instant,
}

/// Resolves configuration with db-tag > flag > env/file > default
/// precedence, caching the db-tag tier for `ttl` with a single-flight
/// refresh lock so concurrent resolutions don't stampede the tag index.
pub struct ConfigResolver {
    flags: HashMap<String, ConfigValue>,
    env: HashMap<String, ConfigValue>,
    ttl: Duration,
    cache: Mutex<HashMap<&'static str, CacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl ConfigResolver {
    pub fn new(flags: HashMap<String, ConfigValue>, env: HashMap<String, ConfigValue>, ttl: Duration) -> Self {
        ConfigResolver {
            flags,
            env,
            ttl,
            cache: Mutex::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolve `key`, consulting `lookup_db_tag` only on a cache miss
    /// or expiry. `lookup_db_tag` returns the raw tag value text, if any
    /// `conf:<name>:<value>` tag is asserted on the config entity.
    pub fn resolve(&self, key: ConfigKey, lookup_db_tag: impl FnOnce() -> Option<String>) -> ConfigValue {
        let name = key.db_tag_name();

        if let Some(entry) = self.cache.lock().get(name) {
            if entry.cached_at.elapsed() < self.ttl {
                return entry.value.clone();
            }
        }

        let _guard = self.refresh_lock.lock();
        if let Some(entry) = self.cache.lock().get(name) {
            if entry.cached_at.elapsed() < self.ttl {
                return entry.value.clone();
            }
        }

        let resolved = lookup_db_tag()
            .map(|raw| ConfigValue::parse(&raw))
            .or_else(|| self.flags.get(name).cloned())
            .or_else(|| self.env.get(key.env_var()).cloned())
            .unwrap_or_else(|| key.default_value());

        self.cache.lock().insert(
            name,
            CacheEntry {
                value: resolved.clone(),
                cached_at: Instant::now(),
            },
        );
        resolved
    }

    pub fn invalidate(&self, key: ConfigKey) {
        self.cache.lock().remove(key.db_tag_name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_tag_wins_over_flag_and_env() {
        let mut flags = HashMap::new();
        flags.insert("conf:session_ttl_secs".to_string(), ConfigValue::Int(10));
        let resolver = ConfigResolver::new(flags, HashMap::new(), Duration::from_secs(300));
        let value = resolver.resolve(ConfigKey::SessionTtlSecs, || Some("999".to_string()));
        assert_eq!(value.as_int(), Some(999));
    }

    #[test]
    fn flag_wins_over_env_when_no_db_tag() {
        let mut flags = HashMap::new();
        flags.insert("conf:session_ttl_secs".to_string(), ConfigValue::Int(10));
        let mut env = HashMap::new();
        env.insert("ENTITYDB_SESSION_TTL_SECS".to_string(), ConfigValue::Int(20));
        let resolver = ConfigResolver::new(flags, env, Duration::from_secs(300));
        let value = resolver.resolve(ConfigKey::SessionTtlSecs, || None);
        assert_eq!(value.as_int(), Some(10));
    }

    #[test]
    fn default_applies_when_nothing_else_is_set() {
        let resolver = ConfigResolver::new(HashMap::new(), HashMap::new(), Duration::from_secs(300));
        let value = resolver.resolve(ConfigKey::TagIndexShards, || None);
        assert_eq!(value.as_int(), Some(256));
    }

    #[test]
    fn cached_value_is_reused_within_ttl_even_if_the_db_tag_changes() {
        let resolver = ConfigResolver::new(HashMap::new(), HashMap::new(), Duration::from_secs(300));
        let first = resolver.resolve(ConfigKey::ChunkSizeBytes, || Some("111".to_string()));
        let second = resolver.resolve(ConfigKey::ChunkSizeBytes, || Some("222".to_string()));
        assert_eq!(first, second);
    }

    #[test]
    fn invalidate_forces_a_fresh_lookup() {
        let resolver = ConfigResolver::new(HashMap::new(), HashMap::new(), Duration::from_secs(300));
        resolver.resolve(ConfigKey::ChunkSizeBytes, || Some("111".to_string()));
        resolver.invalidate(ConfigKey::ChunkSizeBytes);
        let refreshed = resolver.resolve(ConfigKey::ChunkSizeBytes, || Some("222".to_string()));
        assert_eq!(refreshed.as_int(), Some(222));
    }

    #[test]
    fn parse_toml_env_reads_a_flat_config_table() {
        let raw = r#"
            [config]
            "conf:session_ttl_secs" = 120
            "conf:tag_index_shards" = 64
        "#;
        let env = parse_toml_env(raw).unwrap();
        assert_eq!(env.get("conf:session_ttl_secs").and_then(ConfigValue::as_int), Some(120));
    }
}

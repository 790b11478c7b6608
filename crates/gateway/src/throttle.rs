//! Per-client request throttling (spec.md section 4.10): sliding
//! window, health score, adaptive delay, and a GET-only response cache.
//! Grounded in the teacher's one-lock-per-map concurrency discipline
//! (`strata-concurrency::manager`'s per-branch `DashMap<_, Mutex<_>>`):
//! one entry per client, one lock each, so clients never contend with
//! each other.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Width of the sliding window the health score is computed over.
pub const WINDOW: Duration = Duration::from_secs(60);
/// Sub-window used by the "sustained rate" factor (f3).
const BURST_WINDOW: Duration = Duration::from_secs(5);
/// Client records idle longer than this are evicted by `sweep`.
pub const CLIENT_IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);
/// Default response cache TTL (spec.md section 4.10).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
/// Default ceiling on the adaptive delay for the highest health scores.
pub const DEFAULT_DELAY_CEILING: Duration = Duration::from_secs(2);

/// The outcome of admitting one request: how long to suspend it before
/// proceeding, and the health score that produced that delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub delay: Duration,
    pub score: f64,
}

/// A cache key: method, path, and a normalized query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: String,
    pub path: String,
    pub query: String,
}

/// A cached response, keyed by `CacheKey`.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub inserted_at: Instant,
}

struct ClientRecord {
    requests: VecDeque<Instant>,
    endpoint_requests: HashMap<String, VecDeque<Instant>>,
    requests_total: u64,
    throttled_total: u64,
    last_seen: Instant,
}

impl ClientRecord {
    fn new(now: Instant) -> Self {
        ClientRecord {
            requests: VecDeque::new(),
            endpoint_requests: HashMap::new(),
            requests_total: 0,
            throttled_total: 0,
            last_seen: now,
        }
    }

    fn prune(&mut self, now: Instant) {
        let cutoff = now.checked_sub(WINDOW).unwrap_or(now);
        while matches!(self.requests.front(), Some(t) if *t < cutoff) {
            self.requests.pop_front();
        }
        for queue in self.endpoint_requests.values_mut() {
            while matches!(queue.front(), Some(t) if *t < cutoff) {
                queue.pop_front();
            }
        }
    }

    /// f1 (request rate) + f2 (same-endpoint polling) + f3 (sustained
    /// burst), combined and clamped to [0, 10] (spec.md section 4.10).
    fn health_score(&self, now: Instant) -> f64 {
        let requests_per_min = self.requests.len() as f64;
        let f1 = if requests_per_min <= 60.0 {
            0.0
        } else if requests_per_min >= 200.0 {
            4.0
        } else {
            (requests_per_min - 60.0) / (200.0 - 60.0) * 4.0
        };

        let max_endpoint = self.endpoint_requests.values().map(|q| q.len()).max().unwrap_or(0);
        let f2 = (max_endpoint / 10) as f64;

        let burst_cutoff = now.checked_sub(BURST_WINDOW).unwrap_or(now);
        let recent = self.requests.iter().filter(|t| **t >= burst_cutoff).count();
        let f3 = if recent as f64 / BURST_WINDOW.as_secs_f64() > 2.0 { 2.0 } else { 0.0 };

        (f1 + f2 + f3).clamp(0.0, 10.0)
    }
}

/// The adaptive delay table (spec.md section 4.10), linearly
/// interpolated within each tier so the delay is a continuous,
/// non-decreasing function of the score.
pub fn adaptive_delay(score: f64, ceiling: Duration) -> Duration {
    let score = score.clamp(0.0, 10.0);
    let (lo_score, hi_score, lo_ms, hi_ms) = match score {
        s if s <= 2.0 => (0.0, 2.0, 0.0, 0.0),
        s if s <= 4.0 => (2.0, 4.0, 50.0, 200.0),
        s if s <= 6.0 => (4.0, 6.0, 200.0, 500.0),
        s if s <= 8.0 => (6.0, 8.0, 500.0, 1000.0),
        _ => (8.0, 10.0, 1000.0, ceiling.as_millis() as f64),
    };
    let t = if hi_score > lo_score { (score - lo_score) / (hi_score - lo_score) } else { 0.0 };
    let ms = lo_ms + t * (hi_ms - lo_ms);
    Duration::from_millis(ms.round() as u64)
}

/// Per-client throttling state plus the GET-only response cache, each
/// behind its own map-level structure per spec.md section 5's "one lock
/// per map" resource model.
pub struct Throttler {
    clients: DashMap<String, Mutex<ClientRecord>>,
    cache: DashMap<CacheKey, CachedResponse>,
    cache_ttl: Duration,
    delay_ceiling: Duration,
}

impl Throttler {
    pub fn new(cache_ttl: Duration, delay_ceiling: Duration) -> Self {
        Throttler {
            clients: DashMap::new(),
            cache: DashMap::new(),
            cache_ttl,
            delay_ceiling,
        }
    }

    /// Record one request from `client` against `endpoint` and decide
    /// how long to delay it before admission.
    pub fn admit(&self, client: &str, endpoint: &str, now: Instant) -> Decision {
        let entry = self.clients.entry(client.to_string()).or_insert_with(|| Mutex::new(ClientRecord::new(now)));
        let mut record = entry.lock();
        record.last_seen = now;
        record.prune(now);
        record.requests.push_back(now);
        record.endpoint_requests.entry(endpoint.to_string()).or_default().push_back(now);
        record.requests_total += 1;

        let score = record.health_score(now);
        let delay = adaptive_delay(score, self.delay_ceiling);
        if !delay.is_zero() {
            record.throttled_total += 1;
        }
        Decision { delay, score }
    }

    pub fn requests_total(&self, client: &str) -> u64 {
        self.clients.get(client).map(|e| e.lock().requests_total).unwrap_or(0)
    }

    pub fn throttled_total(&self, client: &str) -> u64 {
        self.clients.get(client).map(|e| e.lock().throttled_total).unwrap_or(0)
    }

    /// A cache hit bypasses the engine entirely (spec.md section 4.10).
    /// Only `GET` is ever consulted — the per-Open-Question resolution
    /// in `SPEC_FULL.md` section 9.
    pub fn cache_get(&self, key: &CacheKey, now: Instant) -> Option<CachedResponse> {
        if !key.method.eq_ignore_ascii_case("GET") {
            return None;
        }
        match self.cache.get(key) {
            Some(entry) if now.saturating_duration_since(entry.inserted_at) < self.cache_ttl => Some(entry.clone()),
            Some(_) => {
                self.cache.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn cache_put(&self, key: CacheKey, response: CachedResponse) {
        if key.method.eq_ignore_ascii_case("GET") {
            self.cache.insert(key, response);
        }
    }

    /// Periodic sweep: evict cache entries past TTL and clients idle
    /// longer than `CLIENT_IDLE_EVICTION` (spec.md section 4.10's
    /// "Cleanup").
    pub fn sweep(&self, now: Instant) {
        self.cache.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < self.cache_ttl);
        self.clients.retain(|_, record| now.saturating_duration_since(record.lock().last_seen) < CLIENT_IDLE_EVICTION);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Throttler::new(DEFAULT_CACHE_TTL, DEFAULT_DELAY_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn well_behaved_client_is_never_delayed() {
        let throttler = Throttler::default();
        let start = Instant::now();
        // 29 requests to the same endpoint keeps f2's same-endpoint
        // counter under the +1-per-10 threshold that would start
        // nudging the score (and therefore the delay) off zero.
        for i in 0..29 {
            let decision = throttler.admit("client-a", "/api/v1/entities/list", start + Duration::from_secs(i));
            assert_eq!(decision.delay, Duration::ZERO);
        }
    }

    #[test]
    fn a_polling_storm_escalates_delay_and_health_score() {
        let throttler = Throttler::default();
        let start = Instant::now();
        let mut last_decision = None;
        for i in 0..120u64 {
            let now = start + Duration::from_millis(i * 500); // 120 requests within 60s
            last_decision = Some(throttler.admit("client-b", "/api/v1/entities/list", now));
        }
        let decision = last_decision.unwrap();
        assert!(decision.score >= 5.0);
        assert!(decision.delay >= Duration::from_millis(200));
        assert!(throttler.throttled_total("client-b") > 0);
    }

    #[test]
    fn different_clients_do_not_share_state() {
        let throttler = Throttler::default();
        let start = Instant::now();
        for i in 0..120u64 {
            throttler.admit("noisy", "/x", start + Duration::from_millis(i * 100));
        }
        let quiet_decision = throttler.admit("quiet", "/x", start);
        assert_eq!(quiet_decision.delay, Duration::ZERO);
    }

    #[test]
    fn adaptive_delay_is_non_decreasing_in_score() {
        let ceiling = Duration::from_secs(2);
        let mut prev = Duration::ZERO;
        let mut score = 0.0;
        while score <= 10.0 {
            let delay = adaptive_delay(score, ceiling);
            assert!(delay >= prev);
            prev = delay;
            score += 0.25;
        }
    }

    #[test]
    fn cache_hit_is_bypassed_after_ttl() {
        let throttler = Throttler::new(Duration::from_secs(10), Duration::from_secs(2));
        let now = Instant::now();
        let key = CacheKey {
            method: "GET".to_string(),
            path: "/api/v1/entities/doc_1".to_string(),
            query: "".to_string(),
        };
        let response = CachedResponse {
            status: 200,
            headers: vec![],
            body: b"hello".to_vec(),
            inserted_at: now,
        };
        throttler.cache_put(key.clone(), response);
        assert!(throttler.cache_get(&key, now + Duration::from_secs(5)).is_some());
        assert!(throttler.cache_get(&key, now + Duration::from_secs(11)).is_none());
    }

    #[test]
    fn non_get_requests_are_never_cached() {
        let throttler = Throttler::default();
        let now = Instant::now();
        let key = CacheKey {
            method: "POST".to_string(),
            path: "/api/v1/entities".to_string(),
            query: "".to_string(),
        };
        throttler.cache_put(
            key.clone(),
            CachedResponse {
                status: 201,
                headers: vec![],
                body: vec![],
                inserted_at: now,
            },
        );
        assert!(throttler.cache_get(&key, now).is_none());
    }

    proptest! {
        // Property 6 (spec.md section 8), second half: holding the
        // request spacing fixed, the health score after n requests must
        // never exceed the score after some smaller prefix n' < n — more
        // history at the same rate can only look equally or more
        // suspicious, never less.
        #[test]
        fn health_score_is_non_decreasing_in_request_count_at_a_fixed_rate(
            shorter in 1u64..80, extra in 1u64..80
        ) {
            let start = Instant::now();
            let delta = Duration::from_millis(200);
            let longer = shorter + extra;

            let short_throttler = Throttler::default();
            let mut short_score = 0.0;
            for i in 0..shorter {
                short_score = short_throttler.admit("client", "/x", start + delta * i as u32).score;
            }

            let long_throttler = Throttler::default();
            let mut long_score = 0.0;
            for i in 0..longer {
                long_score = long_throttler.admit("client", "/x", start + delta * i as u32).score;
            }

            prop_assert!(long_score >= short_score);
        }
    }

    #[test]
    fn sweep_evicts_idle_clients_and_expired_cache_entries() {
        let throttler = Throttler::new(Duration::from_secs(1), Duration::from_secs(2));
        let now = Instant::now();
        throttler.admit("stale-client", "/x", now);
        assert_eq!(throttler.client_count(), 1);
        throttler.sweep(now + CLIENT_IDLE_EVICTION + Duration::from_secs(1));
        assert_eq!(throttler.client_count(), 0);
    }
}

//! # Stage: Score Cache
//!
//! ## Responsibility
//!
//! Fingerprint-keyed LRU+TTL cache of classifier outputs. Beyond plain
//! caching it stabilises tier assignments: it remembers each entry's
//! distance to the nearest tier boundary so the orchestrator can keep a
//! cached tier when a fresh score lands inside the fuzzy region, and it
//! watches the recent tier history per fingerprint, pinning the modal tier
//! (a "jitter lock") when classification oscillates.
//!
//! ## Guarantees
//!
//! - **Thread-safe**: all state behind a `Mutex`; `Clone` is cheap and
//!   clones share state.
//! - **Bounded**: at most `max_size` entries, least-recently-accessed
//!   evicted first; entries expire after `ttl_ms`.
//! - **Lock-scoped**: a jitter lock only ever substitutes the tier of the
//!   entry it belongs to and dies with it.
//!
//! ## NOT Responsible For
//!
//! - Producing scores (see `classify`)
//! - Deciding when a cached tier wins over a fresh one — it only answers
//!   [`ScoreCache::should_use_cached_tier`]; the orchestrator decides.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::classify::ScoringResult;
use crate::config::{CacheConfig, Tier, TierBoundaries};
use crate::fingerprint::fingerprint;

/// A cached classification with boundary bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedScore {
    pub result: ScoringResult,
    pub cached_at: Instant,
    pub last_access: Instant,
    pub hit_count: u64,
    /// Distance from the stored score to the nearest tier boundary.
    pub distance_to_boundary: f64,
    /// Name of that boundary (`"simple-medium"`, ...).
    pub boundary_name: &'static str,
    /// Tier stored by the previous `set` for this fingerprint, if any.
    pub last_tier: Option<Tier>,
}

#[derive(Debug)]
struct Entry {
    score: CachedScore,
    /// Recent tiers observed for this fingerprint, newest last.
    tier_history: VecDeque<Tier>,
    /// Modal tier installed when the recent history disagrees.
    jitter_lock: Option<Tier>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub jitter_locks: usize,
}

/// Fingerprint-keyed LRU+TTL score cache with jitter detection.
#[derive(Debug, Clone)]
pub struct ScoreCache {
    inner: Arc<Mutex<Inner>>,
    config: CacheConfig,
}

impl ScoreCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            config,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.ttl_ms)
    }

    /// Look up the cached score for a (prompt, system) pair.
    pub fn get(&self, prompt: &str, system_prompt: Option<&str>) -> Option<CachedScore> {
        self.get_by_fingerprint(&fingerprint(prompt, system_prompt))
    }

    /// Look up by precomputed fingerprint.
    ///
    /// Refreshes the access order and hit count. If a jitter lock is
    /// installed and the cached tier disagrees, the returned entry carries
    /// the locked tier with confidence clamped to at least 0.7.
    pub fn get_by_fingerprint(&self, key: &str) -> Option<CachedScore> {
        #[derive(PartialEq)]
        enum Status {
            Missing,
            Expired,
            Fresh,
        }

        let ttl = self.ttl();
        let mut inner = self.inner.lock().ok()?;

        let status = match inner.entries.get(key) {
            None => Status::Missing,
            Some(entry) if entry.score.cached_at.elapsed() > ttl => Status::Expired,
            Some(_) => Status::Fresh,
        };
        match status {
            Status::Missing => {
                inner.misses += 1;
                return None;
            }
            Status::Expired => {
                inner.entries.remove(key);
                inner.misses += 1;
                debug!(key = key, "score cache entry expired");
                return None;
            }
            Status::Fresh => {}
        }

        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.score.last_access = Instant::now();
        entry.score.hit_count += 1;

        let mut out = entry.score.clone();
        if let Some(locked) = entry.jitter_lock {
            if out.result.tier != Some(locked) {
                debug!(key = key, tier = %locked, "jitter lock substituted tier");
                out.result.tier = Some(locked);
                out.result.confidence = out.result.confidence.max(0.7);
            }
        }
        Some(out)
    }

    /// Store a classification result under a (prompt, system) pair.
    pub fn set(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        result: ScoringResult,
        boundaries: &TierBoundaries,
        score: f64,
    ) {
        self.set_by_fingerprint(&fingerprint(prompt, system_prompt), result, boundaries, score);
    }

    /// Store by precomputed fingerprint.
    pub fn set_by_fingerprint(
        &self,
        key: &str,
        result: ScoringResult,
        boundaries: &TierBoundaries,
        score: f64,
    ) {
        let distance = boundaries.distance_to_nearest(score);
        let boundary_name = boundaries.nearest_label(score);
        let now = Instant::now();

        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        let (mut tier_history, prev_tier, jitter_lock) = match inner.entries.remove(key) {
            Some(entry) => (
                entry.tier_history,
                entry.score.result.tier,
                entry.jitter_lock,
            ),
            None => (VecDeque::new(), None, None),
        };

        if let Some(tier) = result.tier {
            tier_history.push_back(tier);
            while tier_history.len() > self.config.jitter_window {
                tier_history.pop_front();
            }
        }

        let jitter_lock = self.detect_jitter(key, &tier_history).or(jitter_lock);

        inner.entries.insert(
            key.to_string(),
            Entry {
                score: CachedScore {
                    result,
                    cached_at: now,
                    last_access: now,
                    hit_count: 0,
                    distance_to_boundary: distance,
                    boundary_name,
                    last_tier: prev_tier,
                },
                tier_history,
                jitter_lock,
            },
        );

        // LRU eviction past the soft cap.
        while inner.entries.len() > self.config.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.score.last_access)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.entries.remove(&k);
                    debug!(key = %k, "score cache evicted LRU entry");
                }
                None => break,
            }
        }
    }

    /// Whether the orchestrator should keep the cached tier: the fresh tier
    /// disagrees and the cached score sat inside the fuzzy boundary region.
    pub fn should_use_cached_tier(
        &self,
        cached: &CachedScore,
        _new_score: f64,
        new_tier: Tier,
    ) -> bool {
        match cached.result.tier {
            Some(cached_tier) => {
                cached_tier != new_tier
                    && cached.distance_to_boundary < self.config.fuzzy_boundary_width
            }
            None => false,
        }
    }

    /// Remove expired entries. Called by the background sweeper.
    pub fn run_cleanup(&self) {
        let ttl = self.ttl();
        if let Ok(mut inner) = self.inner.lock() {
            let before = inner.entries.len();
            inner.entries.retain(|_, e| e.score.cached_at.elapsed() <= ttl);
            let removed = before - inner.entries.len();
            if removed > 0 {
                debug!(removed = removed, "score cache TTL sweep");
            }
        }
    }

    /// Spawn the periodic TTL sweep. Abort the handle to stop it.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // immediate first tick
            loop {
                tick.tick().await;
                cache.run_cleanup();
            }
        })
    }

    /// Drop every entry, lock, and counter.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
            inner.hits = 0;
            inner.misses = 0;
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self.inner.lock() {
            Ok(inner) => CacheStats {
                entries: inner.entries.len(),
                hits: inner.hits,
                misses: inner.misses,
                jitter_locks: inner
                    .entries
                    .values()
                    .filter(|e| e.jitter_lock.is_some())
                    .count(),
            },
            Err(_) => CacheStats {
                entries: 0,
                hits: 0,
                misses: 0,
                jitter_locks: 0,
            },
        }
    }

    /// Modal tier over the recent window when the trailing
    /// `jitter_threshold` observations disagree.
    fn detect_jitter(&self, key: &str, history: &VecDeque<Tier>) -> Option<Tier> {
        if history.len() < self.config.jitter_threshold {
            return None;
        }
        let tail: Vec<Tier> = history
            .iter()
            .rev()
            .take(self.config.jitter_threshold)
            .copied()
            .collect();
        if tail.windows(2).all(|w| w[0] == w[1]) {
            return None;
        }

        let mut counts: HashMap<Tier, usize> = HashMap::new();
        for tier in history {
            *counts.entry(*tier).or_insert(0) += 1;
        }
        let mode = counts
            .into_iter()
            .max_by_key(|(tier, n)| (*n, std::cmp::Reverse(tier.rank())))
            .map(|(tier, _)| tier);
        if let Some(tier) = mode {
            debug!(key = key, tier = %tier, "tier jitter detected, installing lock");
        }
        mode
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

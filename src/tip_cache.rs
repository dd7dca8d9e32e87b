//! Tip-floor quote cache.
//!
//! Holds the most recent P95/P99 landed-tip amounts with a freshness window.
//! Reads inside the window are served from memory; an expired read refreshes
//! from the tip feed under the cache lock, so at most one refresh is in
//! flight and the two percentile fields are never updated torn. A failed or
//! malformed refresh degrades silently: previously cached tier value first,
//! then a fixed floor. No caller path fails because the feed is down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::TipTier;

/// Quotes older than this are refreshed on the next read.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(72);

/// Paid when the feed has never answered and nothing is cached.
pub const FALLBACK_TIP_LAMPORTS: u64 = 5_000;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Most recent tip-floor entry, fractional SOL per percentile.
#[derive(Debug, Clone, Copy, Default)]
pub struct TipFloorEntry {
    pub p95_sol: Option<f64>,
    pub p99_sol: Option<f64>,
}

/// External tip-rate feed. Mockable for tests.
#[async_trait]
pub trait TipFeed: Send + Sync {
    async fn fetch_latest(&self) -> Result<TipFloorEntry>;
}

/// Production feed against the Jito tip-floor HTTP endpoint.
pub struct TipFloorFeed {
    url: String,
    http: Client,
}

impl TipFloorFeed {
    pub fn new(url: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_millis(8_000))
            .build()
            .unwrap_or_default();
        Self { url, http }
    }
}

#[async_trait]
impl TipFeed for TipFloorFeed {
    async fn fetch_latest(&self) -> Result<TipFloorEntry> {
        let response = self.http.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "tip floor endpoint returned status {}",
                response.status()
            ));
        }

        let mut payload: Vec<TipFloorApiEntry> = response.json().await?;
        let entry = payload
            .drain(..)
            .next()
            .ok_or_else(|| anyhow!("tip floor response empty"))?;

        Ok(TipFloorEntry {
            p95_sol: entry.landed_tips_95th_percentile,
            p99_sol: entry.landed_tips_99th_percentile,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TipFloorApiEntry {
    landed_tips_95th_percentile: Option<f64>,
    landed_tips_99th_percentile: Option<f64>,
}

#[derive(Debug, Default)]
struct TipQuote {
    p95_lamports: Option<u64>,
    p99_lamports: Option<u64>,
    refreshed_at: Option<Instant>,
}

impl TipQuote {
    fn fresh(&self) -> bool {
        self.refreshed_at
            .map(|at| at.elapsed() < FRESHNESS_WINDOW)
            .unwrap_or(false)
    }

    fn lamports(&self, tier: TipTier) -> Option<u64> {
        match tier {
            TipTier::P95 => self.p95_lamports,
            TipTier::P99 => self.p99_lamports,
        }
    }
}

/// Process-wide tip quote with lazy refresh-on-read.
pub struct TipCache {
    feed: Arc<dyn TipFeed>,
    quote: Mutex<TipQuote>,
}

impl TipCache {
    pub fn new(feed: Arc<dyn TipFeed>) -> Self {
        Self {
            feed,
            quote: Mutex::new(TipQuote::default()),
        }
    }

    /// Current tip amount for the tier, in lamports. Never fails.
    pub async fn tip(&self, tier: TipTier) -> u64 {
        let mut quote = self.quote.lock().await;

        if quote.fresh() {
            if let Some(lamports) = quote.lamports(tier) {
                return lamports;
            }
        }

        match self.feed.fetch_latest().await {
            Ok(entry) => {
                let p95 = entry.p95_sol.and_then(sol_to_lamports);
                let p99 = entry.p99_sol.and_then(sol_to_lamports);

                if p95.is_some() || p99.is_some() {
                    // Overwrite in place; a tier the entry omits keeps its
                    // previous value.
                    if p95.is_some() {
                        quote.p95_lamports = p95;
                    }
                    if p99.is_some() {
                        quote.p99_lamports = p99;
                    }
                    quote.refreshed_at = Some(Instant::now());
                    debug!(
                        p95 = ?quote.p95_lamports,
                        p99 = ?quote.p99_lamports,
                        "refreshed tip floor"
                    );
                } else {
                    warn!("tip floor entry carried no usable percentiles, keeping cache");
                }
            }
            Err(e) => {
                warn!(error = %e, "tip floor fetch failed, using cached or fallback value");
            }
        }

        quote.lamports(tier).unwrap_or(FALLBACK_TIP_LAMPORTS)
    }
}

/// Fractional SOL to lamports, round-to-nearest. Non-finite and non-positive
/// inputs are treated as absent.
fn sol_to_lamports(sol: f64) -> Option<u64> {
    if !sol.is_finite() || sol <= 0.0 {
        return None;
    }
    let lamports = (sol * LAMPORTS_PER_SOL).round();
    if lamports <= 0.0 {
        None
    } else if lamports >= u64::MAX as f64 {
        Some(u64::MAX)
    } else {
        Some(lamports as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time;

    struct CountingFeed {
        calls: AtomicUsize,
        entry: TipFloorEntry,
    }

    impl CountingFeed {
        fn new(p95_sol: f64, p99_sol: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                entry: TipFloorEntry {
                    p95_sol: Some(p95_sol),
                    p99_sol: Some(p99_sol),
                },
            }
        }
    }

    #[async_trait]
    impl TipFeed for CountingFeed {
        async fn fetch_latest(&self) -> Result<TipFloorEntry> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entry)
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl TipFeed for FailingFeed {
        async fn fetch_latest(&self) -> Result<TipFloorEntry> {
            Err(anyhow!("feed down"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_feed_call_within_freshness_window() {
        let feed = Arc::new(CountingFeed::new(0.000001, 0.00001));
        let cache = TipCache::new(feed.clone());

        for _ in 0..5 {
            assert_eq!(cache.tip(TipTier::P95).await, 1_000);
        }
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);

        // Both tiers were populated by the single refresh.
        assert_eq!(cache.tip(TipTier::P99).await, 10_000);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_after_window_expires() {
        let feed = Arc::new(CountingFeed::new(0.000001, 0.00001));
        let cache = TipCache::new(feed.clone());

        cache.tip(TipTier::P95).await;
        time::advance(FRESHNESS_WINDOW + Duration::from_secs(1)).await;
        cache.tip(TipTier::P95).await;

        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_cache_with_dead_feed_returns_floor() {
        let cache = TipCache::new(Arc::new(FailingFeed));
        assert_eq!(cache.tip(TipTier::P95).await, FALLBACK_TIP_LAMPORTS);
        assert_eq!(cache.tip(TipTier::P99).await, FALLBACK_TIP_LAMPORTS);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cached_value_beats_floor_when_feed_dies() {
        struct FlakyFeed {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TipFeed for FlakyFeed {
            async fn fetch_latest(&self) -> Result<TipFloorEntry> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(TipFloorEntry {
                        p95_sol: Some(0.000002),
                        p99_sol: None,
                    })
                } else {
                    Err(anyhow!("feed down"))
                }
            }
        }

        let cache = TipCache::new(Arc::new(FlakyFeed {
            calls: AtomicUsize::new(0),
        }));

        assert_eq!(cache.tip(TipTier::P95).await, 2_000);
        time::advance(FRESHNESS_WINDOW + Duration::from_secs(1)).await;

        // Refresh fails but the previous quote survives.
        assert_eq!(cache.tip(TipTier::P95).await, 2_000);
        // The tier that never had a value falls back to the floor.
        assert_eq!(cache.tip(TipTier::P99).await, FALLBACK_TIP_LAMPORTS);
    }

    #[test]
    fn converts_sol_to_lamports() {
        assert_eq!(sol_to_lamports(0.0), None);
        assert_eq!(sol_to_lamports(-0.0001), None);
        assert_eq!(sol_to_lamports(f64::NAN), None);
        assert_eq!(sol_to_lamports(0.000000001), Some(1));
        assert_eq!(sol_to_lamports(0.000005), Some(5_000));
        // Round-to-nearest on fractional lamports.
        assert_eq!(sol_to_lamports(0.0014479055), Some(1_447_906));
    }
}

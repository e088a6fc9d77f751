use std::time::Duration;

use devlog_core::generation::estimate_tokens;
use devlog_core::rate_limit::{RateLimitSettings, RateLimiter};
use proptest::prelude::*;
use tokio::time::Instant;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn available_stays_within_bounds(
        capacity in 1u64..500,
        refill_per_minute in 1u64..1_000,
        steps in prop::collection::vec((0u64..1_000, 0u64..30), 1..20),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let limiter = RateLimiter::new("m", &RateLimitSettings {
                capacity,
                refill_per_minute,
                requests_per_minute: 0,
            });
            for (units, idle_secs) in &steps {
                limiter.consume(*units).await;
                let budget = limiter.snapshot().await;
                prop_assert!(budget.available >= 0.0);
                prop_assert!(budget.available <= capacity as f64);
                tokio::time::sleep(Duration::from_secs(*idle_secs)).await;
            }
            Ok(())
        })?;
    }

    #[test]
    fn never_hands_out_more_than_capacity_plus_refill(
        capacity in 1u64..200,
        refill_per_minute in 60u64..600,
        requests in prop::collection::vec(0u64..200, 1..15),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let limiter = RateLimiter::new("m", &RateLimitSettings {
                capacity,
                refill_per_minute,
                requests_per_minute: 0,
            });
            let start = Instant::now();
            let mut granted = 0u64;
            for units in &requests {
                limiter.consume(*units).await;
                granted += (*units).min(capacity);
            }
            let refilled = start.elapsed().as_secs_f64() * refill_per_minute as f64 / 60.0;
            prop_assert!(
                granted as f64 <= capacity as f64 + refilled + 1e-6,
                "granted {} > capacity {} + refilled {}",
                granted, capacity, refilled
            );
            Ok(())
        })?;
    }

    #[test]
    fn token_estimate_is_subadditive(a in ".{0,200}", b in ".{0,200}") {
        let joined = format!("{a}{b}");
        let whole = estimate_tokens(&joined);
        prop_assert!(whole <= estimate_tokens(&a) + estimate_tokens(&b));
        prop_assert!(whole * 4 >= joined.chars().count() as u64);
    }
}

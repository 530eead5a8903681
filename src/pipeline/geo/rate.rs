//! Global minimum-interval gate in front of the primary geocoder.
//!
//! The public Nominatim instance allows one request per second per client.
//! Every job shares one [`RateGate`]; callers queue on the async mutex and
//! leave it no sooner than `interval` after the previous caller.

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

pub struct RateGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for this caller's slot. Holds the lock while sleeping so callers
    /// are released one interval apart, in arrival order.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.interval;
            let now = Instant::now();
            if now < ready {
                debug!("Rate gate: waiting {}ms", (ready - now).as_millis());
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_call_passes_immediately() {
        let gate = RateGate::new(Duration::from_millis(1500));
        let start = Instant::now();
        gate.wait().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_calls_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(1500));
        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        gate.wait().await;
        assert!(Instant::now() - start >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_released_one_interval_apart() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(1500)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move {
                    gate.wait().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gap_resets_the_wait() {
        let gate = RateGate::new(Duration::from_millis(1500));
        gate.wait().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        let before = Instant::now();
        gate.wait().await;
        assert_eq!(Instant::now(), before);
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::LimitsConfig;
use crate::error::RateLimited;
use crate::store::{KeyValueStore, REQUEST_COUNT_KEY};

/// Request governor: a cooldown between calls plus a lifetime quota.
///
/// The counter is written to the store on every allowed call. It is only
/// read back at construction when `restore_count` is set.
pub struct RateGovernor {
    last_call: Option<Instant>,
    request_count: u32,
    quota: u32,
    cooldown: Duration,
    store: Arc<dyn KeyValueStore>,
}

impl RateGovernor {
    pub fn new(quota: u32, cooldown: Duration, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            last_call: None,
            request_count: 0,
            quota,
            cooldown,
            store,
        }
    }

    pub fn from_config(config: &LimitsConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let mut governor = Self::new(
            config.max_requests,
            Duration::from_secs(config.cooldown_secs),
            store,
        );
        if config.restore_count {
            governor.restore();
        }
        governor
    }

    /// Load the persisted counter, if any.
    fn restore(&mut self) {
        let Some(raw) = self.store.get(REQUEST_COUNT_KEY) else {
            return;
        };
        match raw.trim().parse::<u32>() {
            Ok(count) => {
                self.request_count = count;
                info!("Restored request count: {count}/{}", self.quota);
            }
            Err(e) => warn!("Ignoring stored request count '{raw}': {e}"),
        }
    }

    /// Allow or deny a request at `now`. Cooldown is checked before quota.
    /// Nothing changes on denial.
    pub fn check_and_record(&mut self, now: Instant) -> Result<(), RateLimited> {
        if let Some(last) = self.last_call {
            if now.saturating_duration_since(last) < self.cooldown {
                return Err(RateLimited::TooSoon(self.cooldown.as_secs()));
            }
        }
        if self.request_count >= self.quota {
            return Err(RateLimited::QuotaExceeded(self.quota));
        }

        self.last_call = Some(now);
        self.request_count += 1;
        self.store
            .set(REQUEST_COUNT_KEY, &self.request_count.to_string());
        debug!("Request {}/{} allowed", self.request_count, self.quota);
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.request_count
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }
}

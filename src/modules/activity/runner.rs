use super::tracker::ActivityTracker;
use crate::services::platform::GuildPlatform;
use crate::services::role_policy::RoleService;
use std::sync::{Arc, PoisonError};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{error, info};

const FALLBACK_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

impl ActivityTracker {
    /// Spawns the periodic inactivity sweep. Only one runner exists per tracker;
    /// returns `false` if it was already started.
    pub fn start_sweep_runner(
        self: &Arc<Self>,
        platform: Arc<dyn GuildPlatform>,
        roles: Arc<RoleService>,
    ) -> bool {
        let mut slot = self.runner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let period = self
            .config
            .activity
            .sweep_interval
            .to_std()
            .unwrap_or(FALLBACK_PERIOD);
        let tracker = self.clone();

        *slot = Some(tokio::spawn(async move {
            info!("Inactivity sweep runner started, every {:?}", period);

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if let Err(e) = tracker.sweep(platform.as_ref(), &roles).await {
                    error!("Inactivity sweep failed: {}", e);
                }
            }
        }));

        true
    }

    pub fn stop_sweep_runner(&self) {
        let handle = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.abort();
            info!("Inactivity sweep runner stopped");
        }
    }
}

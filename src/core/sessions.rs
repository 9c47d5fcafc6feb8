use chrono::{DateTime, Timelike, Utc};
use chrono_tz::US::Eastern;

use crate::config::EngineConfig;

/// Tracks the active ET session window. Which sessions count as
/// killzones comes from the config; everything else is dead time for
/// entries.
pub struct SessionClock {
    pub current_session: String,
    killzone_active: bool,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            current_session: "off_session".to_string(),
            killzone_active: false,
        }
    }

    pub fn update(&mut self, cfg: &EngineConfig, utc_now: Option<DateTime<Utc>>) {
        let utc_now = utc_now.unwrap_or_else(Utc::now);
        let et_now = utc_now.with_timezone(&Eastern);
        let current_time = et_now.hour() * 60 + et_now.minute();

        self.current_session = "off_session".to_string();

        for (name, times) in &cfg.sessions {
            let start_min = times.start.0 * 60 + times.start.1;
            let end_min = times.end.0 * 60 + times.end.1;

            let in_session = if start_min < end_min {
                current_time >= start_min && current_time < end_min
            } else {
                // Wraps midnight (e.g. Asian session 20:00 - 00:00)
                current_time >= start_min || current_time < end_min
            };

            if in_session {
                self.current_session = name.clone();
                break;
            }
        }

        self.killzone_active = cfg.killzones.iter().any(|k| k == &self.current_session);
    }

    pub fn is_killzone(&self) -> bool {
        self.killzone_active
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

//! Timezone handling for date bucketing
//!
//! Daily, weekly and monthly buckets are keyed by the calendar date of an
//! event in a configurable timezone. This module detects the system zone
//! and parses zone names from user input.

use chrono_tz::Tz;
use std::str::FromStr;
use tracing::debug;

/// Configuration for timezone handling
#[derive(Debug, Clone)]
pub struct TimezoneConfig {
    /// The timezone to use for date bucketing
    pub tz: Tz,
    /// Whether the timezone is UTC
    pub is_utc: bool,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        let tz = get_local_timezone();
        Self {
            is_utc: tz == Tz::UTC,
            tz,
        }
    }
}

impl TimezoneConfig {
    /// Build a timezone configuration from CLI arguments
    pub fn from_cli(timezone_str: Option<&str>, use_utc: bool) -> crate::error::Result<Self> {
        if use_utc {
            return Ok(Self {
                tz: Tz::UTC,
                is_utc: true,
            });
        }

        if let Some(tz_str) = timezone_str {
            let tz = Tz::from_str(tz_str).map_err(|_| {
                crate::error::CcreportError::InvalidTimezone(format!(
                    "{tz_str} (expected an IANA zone name such as Europe/Berlin, or UTC)"
                ))
            })?;
            Ok(Self {
                tz,
                is_utc: tz == Tz::UTC,
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Display name for the configured timezone
    pub fn display_name(&self) -> &str {
        if self.is_utc { "UTC" } else { self.tz.name() }
    }
}

/// Detect the system's local timezone, falling back to UTC
pub fn get_local_timezone() -> Tz {
    if let Ok(tz_str) = std::env::var("TZ")
        && let Ok(tz) = Tz::from_str(&tz_str)
    {
        debug!("Using timezone from TZ environment variable: {}", tz_str);
        return tz;
    }

    match iana_time_zone::get_timezone() {
        Ok(tz_str) => match Tz::from_str(&tz_str) {
            Ok(tz) => {
                debug!("Using system timezone: {}", tz_str);
                tz
            }
            Err(_) => {
                debug!("Could not parse system timezone '{}', using UTC", tz_str);
                Tz::UTC
            }
        },
        Err(e) => {
            debug!("Could not detect local timezone: {:?}, using UTC", e);
            Tz::UTC
        }
    }
}

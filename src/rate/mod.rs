//! Rate values and the interval pacer shared by every admission point.
//!
//! A [`Rate`] is validated once and carries its admission interval. A
//! [`Pacer`] hands out admission slots at most once per interval; the
//! pipeline gate, the paced client, paced tasks, and the reverse proxy all
//! wait on one.
use std::fmt;
use std::num::FpCategory;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

use crate::error::{AppError, ConfigError, ValidationError};


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    qps: f64,
    interval: Option<Duration>,
}

impl Rate {
    /// No pacing at all.
    pub const UNLIMITED: Self = Self {
        qps: 0.0,
        interval: None,
    };

    /// Builds a rate from queries per second. Zero means unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error when `qps` is negative or not finite, or when its
    /// interval cannot be represented as a non-zero `Duration`.
    pub fn per_second(qps: f64) -> Result<Self, ConfigError> {
        if !qps.is_finite() {
            return Err(ConfigError::NonFiniteRate { value: qps });
        }
        if matches!(qps.classify(), FpCategory::Zero) {
            return Ok(Self::UNLIMITED);
        }
        if qps.is_sign_negative() {
            return Err(ConfigError::NegativeRate { value: qps });
        }
        let interval = Duration::try_from_secs_f64(qps.recip()).map_err(|err| {
            ConfigError::IntervalOutOfRange {
                value: qps,
                source: err,
            }
        })?;
        if interval.is_zero() {
            return Err(ConfigError::IntervalRoundsToZero { value: qps });
        }
        Ok(Self {
            qps,
            interval: Some(interval),
        })
    }

    #[must_use]
    pub const fn qps(&self) -> f64 {
        self.qps
    }

    #[must_use]
    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.interval.is_none()
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "unlimited")
        } else {
            write!(f, "{:.2} QPS", self.qps)
        }
    }
}

impl FromStr for Rate {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let qps: f64 = value.parse().map_err(|err| {
            AppError::validation(ValidationError::InvalidRateNumber {
                value: value.to_owned(),
                source: err,
            })
        })?;
        Rate::per_second(qps).map_err(AppError::from)
    }
}

/// Queries per second observed over `elapsed`.
#[expect(
    clippy::float_arithmetic,
    reason = "Effective rate is reported in queries per second"
)]
#[must_use]
pub fn effective_rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Hands out admission slots at most once per interval.
///
/// The first slot opens one interval after construction (or after the last
/// [`Pacer::rearm`]). Waiters are served in arrival order and consecutive
/// slots are never closer than one interval.
#[derive(Debug)]
pub struct Pacer {
    interval: Option<Duration>,
    next_slot: Mutex<Instant>,
}

impl Pacer {
    #[must_use]
    pub fn new(rate: Rate) -> Self {
        let interval = rate.interval();
        let now = Instant::now();
        let first_slot = interval.map_or(now, |interval| advance(now, interval));
        Self {
            interval,
            next_slot: Mutex::new(first_slot),
        }
    }

    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.interval.is_none()
    }

    /// Waits for the next slot. Returns immediately when unlimited.
    pub async fn admit(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let mut next_slot = self.next_slot.lock().await;
        sleep_until(*next_slot).await;
        *next_slot = advance(Instant::now(), interval);
    }

    /// Pushes the next slot one full interval past now.
    pub async fn rearm(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let mut next_slot = self.next_slot.lock().await;
        *next_slot = advance(Instant::now(), interval);
    }
}

fn advance(from: Instant, interval: Duration) -> Instant {
    from.checked_add(interval).unwrap_or(from)
}

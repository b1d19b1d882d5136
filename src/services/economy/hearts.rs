//! Heart balance rules
//!
//! Hearts regenerate passively up to the free ceiling, one per refill
//! interval. Refill is lazy: it is only computed when a profile is read.
//! Purchases may raise the balance above the ceiling up to the hard cap.

use super::types::User;
use crate::config::EconomyConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy)]
pub struct HeartPolicy {
    pub free_ceiling: u32,
    pub max_hearts: u32,
    pub refill_interval: Duration,
}

impl HeartPolicy {
    pub fn from_config(config: &EconomyConfig) -> Self {
        Self {
            free_ceiling: config.free_heart_ceiling,
            max_hearts: config.max_hearts,
            refill_interval: Duration::from_std(config.refill_interval)
                .unwrap_or_else(|_| Duration::minutes(30)),
        }
    }

    fn start_timer(&self, user: &mut User, now: DateTime<Utc>) {
        user.heart_refill.last_free_refill_at = Some(now);
        user.heart_refill.next_free_refill_at = Some(now + self.refill_interval);
    }

    /// Grant hearts earned since the refill timer elapsed. Returns whether
    /// the user record changed.
    pub fn apply_refill(&self, user: &mut User, now: DateTime<Utc>) -> bool {
        if user.hearts_balance >= self.free_ceiling {
            if user.heart_refill.next_free_refill_at.is_some() {
                user.heart_refill.next_free_refill_at = None;
                return true;
            }
            return false;
        }

        let next = match user.heart_refill.next_free_refill_at {
            None => {
                self.start_timer(user, now);
                return true;
            }
            Some(next) if now < next => return false,
            Some(next) => next,
        };

        let interval_ms = self.refill_interval.num_milliseconds().max(1);
        let elapsed_ms = (now - next).num_milliseconds().max(0);
        let refills = 1 + elapsed_ms / interval_ms;
        let missing = i64::from(self.free_ceiling - user.hearts_balance);
        // refills.min(missing) is within 0..=free_ceiling
        user.hearts_balance += refills.min(missing) as u32;

        user.heart_refill.last_free_refill_at = Some(now);
        user.heart_refill.next_free_refill_at = if user.hearts_balance < self.free_ceiling {
            Some(now + self.refill_interval)
        } else {
            None
        };
        true
    }

    /// Spend one heart if any are left. Returns whether a heart was spent.
    pub fn consume(&self, user: &mut User, now: DateTime<Utc>) -> bool {
        if user.hearts_balance == 0 {
            return false;
        }

        user.hearts_balance -= 1;
        if user.hearts_balance < self.free_ceiling && user.heart_refill.next_free_refill_at.is_none() {
            self.start_timer(user, now);
        }
        true
    }

    /// Spend one heart or fail with 403 when none are left
    pub fn consume_strict(&self, user: &mut User, now: DateTime<Utc>) -> Result<()> {
        if self.consume(user, now) {
            Ok(())
        } else {
            Err(Error::Forbidden("No lives remaining".to_string()))
        }
    }

    /// Credit purchased hearts, capped at the hard maximum
    pub fn credit(&self, user: &mut User, quantity: u32) {
        user.hearts_balance = user
            .hearts_balance
            .saturating_add(quantity)
            .min(self.max_hearts);
        if user.hearts_balance >= self.free_ceiling {
            user.heart_refill.next_free_refill_at = None;
        }
    }
}

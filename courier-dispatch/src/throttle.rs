//! Per-recipient cooldown and daily-volume throttling
//!
//! [`can_send`] is a pure decision: it never mutates the daily counter and
//! never fails. The dispatch loop owns the [`DailySendCounter`] and passes the
//! current count in explicitly, so independent sessions never share hidden
//! state.
//!
//! # Rules
//!
//! - **Cooldown**: a recipient contacted less than `cooldown_days` ago is
//!   skipped with reason "contacted recently"
//! - **Daily cap**: once `max_emails_per_day` sends have succeeded today,
//!   every further recipient is skipped with reason "daily cap reached".
//!   A cap of 0 disables the rule.

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Recipient;

const fn default_max_emails_per_day() -> u32 {
    0 // unlimited
}

const fn default_cooldown_days() -> u32 {
    0
}

/// Throttling input for one session; immutable while the session runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSettings {
    /// Maximum successful sends per UTC calendar day, 0 for no cap
    #[serde(default = "default_max_emails_per_day")]
    pub max_emails_per_day: u32,

    /// Minimum days since the last contact before a recipient may be emailed
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: u32,

    /// Sender address passed through to the provider
    #[serde(default)]
    pub from_address: Option<String>,
}

impl ThrottleSettings {
    /// Whether `sent_so_far_today` leaves no room under the daily cap
    #[must_use]
    pub const fn daily_cap_reached(&self, sent_so_far_today: u32) -> bool {
        self.max_emails_per_day > 0 && sent_so_far_today >= self.max_emails_per_day
    }
}

/// Why a recipient was not emailed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ContactedRecently {
        last_contact: DateTime<Utc>,
        cooldown_days: u32,
    },
    DailyCapReached {
        cap: u32,
    },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContactedRecently { .. } => f.write_str("contacted recently"),
            Self::DailyCapReached { .. } => f.write_str("daily cap reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    Denied(SkipReason),
}

impl ThrottleDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Decide whether `recipient` may be emailed at `now`.
#[must_use]
pub fn can_send(
    recipient: &Recipient,
    settings: &ThrottleSettings,
    sent_so_far_today: u32,
    now: DateTime<Utc>,
) -> ThrottleDecision {
    if let Some(last_contact) = recipient.last_contact
        && settings.cooldown_days > 0
        && now.signed_duration_since(last_contact)
            < TimeDelta::days(i64::from(settings.cooldown_days))
    {
        return ThrottleDecision::Denied(SkipReason::ContactedRecently {
            last_contact,
            cooldown_days: settings.cooldown_days,
        });
    }

    if settings.daily_cap_reached(sent_so_far_today) {
        return ThrottleDecision::Denied(SkipReason::DailyCapReached {
            cap: settings.max_emails_per_day,
        });
    }

    ThrottleDecision::Allowed
}

/// Successful sends within the current UTC calendar day
///
/// This is the explicit "sent today" state threaded through the dispatch loop.
/// It rolls over on its own once the day changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailySendCounter {
    day: Option<NaiveDate>,
    sent: u32,
}

impl DailySendCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self { day: None, sent: 0 }
    }

    /// Count carried over from elsewhere (e.g. sends earlier today by another
    /// process)
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>, sent: u32) -> Self {
        Self {
            day: Some(now.date_naive()),
            sent,
        }
    }

    /// Sends recorded on the day of `now`
    #[must_use]
    pub fn sent_on(&self, now: DateTime<Utc>) -> u32 {
        if self.day == Some(now.date_naive()) {
            self.sent
        } else {
            0
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day == Some(today) {
            self.sent = self.sent.saturating_add(1);
        } else {
            self.day = Some(today);
            self.sent = 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::RecipientId;

    fn recipient(last_contact: Option<DateTime<Utc>>) -> Recipient {
        Recipient {
            id: RecipientId::new("lead-1"),
            email: "ada@example.com".to_string(),
            template_model: crate::TemplateModel::new(),
            last_contact,
        }
    }

    fn settings(max_emails_per_day: u32, cooldown_days: u32) -> ThrottleSettings {
        ThrottleSettings {
            max_emails_per_day,
            cooldown_days,
            from_address: None,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_contacted_is_allowed() {
        let decision = can_send(&recipient(None), &settings(10, 30), 0, noon());
        assert_eq!(decision, ThrottleDecision::Allowed);
    }

    #[test]
    fn contact_inside_cooldown_is_denied() {
        let last = noon() - TimeDelta::days(3);
        let decision = can_send(&recipient(Some(last)), &settings(0, 7), 0, noon());

        assert_eq!(
            decision,
            ThrottleDecision::Denied(SkipReason::ContactedRecently {
                last_contact: last,
                cooldown_days: 7
            })
        );
        if let ThrottleDecision::Denied(reason) = decision {
            assert_eq!(reason.to_string(), "contacted recently");
        }
    }

    #[test]
    fn contact_exactly_at_cooldown_boundary_is_allowed() {
        let last = noon() - TimeDelta::days(7);
        let decision = can_send(&recipient(Some(last)), &settings(0, 7), 0, noon());
        assert!(decision.is_allowed());
    }

    #[test]
    fn zero_cooldown_ignores_last_contact() {
        let last = noon() - TimeDelta::minutes(1);
        let decision = can_send(&recipient(Some(last)), &settings(0, 0), 0, noon());
        assert!(decision.is_allowed());
    }

    #[test]
    fn daily_cap_reached_is_denied() {
        let decision = can_send(&recipient(None), &settings(2, 0), 2, noon());
        assert_eq!(
            decision,
            ThrottleDecision::Denied(SkipReason::DailyCapReached { cap: 2 })
        );

        let decision = can_send(&recipient(None), &settings(2, 0), 1, noon());
        assert!(decision.is_allowed());
    }

    #[test]
    fn zero_cap_is_unlimited() {
        let decision = can_send(&recipient(None), &settings(0, 0), 10_000, noon());
        assert!(decision.is_allowed());
    }

    #[test]
    fn cooldown_is_reported_before_cap() {
        let last = noon() - TimeDelta::hours(1);
        let decision = can_send(&recipient(Some(last)), &settings(1, 1), 5, noon());
        assert!(matches!(
            decision,
            ThrottleDecision::Denied(SkipReason::ContactedRecently { .. })
        ));
    }

    #[test]
    fn counter_rolls_over_at_midnight() {
        let mut counter = DailySendCounter::new();
        assert_eq!(counter.sent_on(noon()), 0);

        counter.record(noon());
        counter.record(noon());
        assert_eq!(counter.sent_on(noon()), 2);

        let tomorrow = noon() + TimeDelta::days(1);
        assert_eq!(counter.sent_on(tomorrow), 0);

        counter.record(tomorrow);
        assert_eq!(counter.sent_on(tomorrow), 1);
        assert_eq!(counter.sent_on(noon()), 0);
    }

    #[test]
    fn counter_can_start_from_a_known_count() {
        let counter = DailySendCounter::starting_at(noon(), 40);
        assert_eq!(counter.sent_on(noon()), 40);
    }

    #[test]
    fn settings_from_ron_use_defaults() {
        let settings: ThrottleSettings = ron::from_str("(cooldown_days: 14)").unwrap();
        assert_eq!(settings.cooldown_days, 14);
        assert_eq!(settings.max_emails_per_day, 0);
        assert_eq!(settings.from_address, None);
    }
}

//! Calendar arithmetic in the business reference timezone.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::cycle::SwapWindowState;
use crate::subscription::SubscriptionType;

/// Month boundaries are evaluated in a single fixed timezone regardless of
/// where the subscriber lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCalendar {
    tz: Tz,
}

impl BillingCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Returns midnight on the first day of the month after `now`, in the
    /// reference timezone.
    pub fn next_month_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.tz);
        let (year, month) = next_month(local.year(), local.month());
        self.local_midnight(year, month)
    }

    /// Number of days between `instant` and the closest month boundary
    /// (either the first of its month or the first of the following month).
    pub fn days_from_month_boundary(&self, instant: DateTime<Utc>) -> u32 {
        let date = instant.with_timezone(&self.tz).date_naive();
        let since_start = date.day() - 1;
        let until_next = days_in_month(date.year(), date.month()) - date.day() + 1;
        since_start.min(until_next)
    }

    /// Start date for a new subscription.
    ///
    /// Addons, and any subscription created while the swap window is open,
    /// start on the first day of next month. Everything else starts
    /// immediately (`None`).
    pub fn subscription_start(
        &self,
        subscription_type: SubscriptionType,
        window: SwapWindowState,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if subscription_type == SubscriptionType::Addon || window.is_open() {
            Some(self.next_month_start(now))
        } else {
            None
        }
    }

    fn local_midnight(&self, year: i32, month: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| self.tz.from_utc_datetime(&naive))
            .with_timezone(&Utc)
    }
}

impl Default for BillingCalendar {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = next_month(year, month);
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(ny, nm, 1),
    ) {
        (Some(start), Some(end)) => (end - start).num_days() as u32,
        _ => 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> BillingCalendar {
        BillingCalendar::default()
    }

    #[test]
    fn test_next_month_start_in_reference_timezone() {
        // 02:00 UTC on June 1st is still May 31st in New York.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();
        let start = calendar().next_month_start(now);
        // Midnight June 1st EDT is 04:00 UTC.
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_next_month_start_rolls_year() {
        let now = Utc.with_ymd_and_hms(2024, 12, 15, 12, 0, 0).unwrap();
        let start = calendar().next_month_start(now);
        // Midnight January 1st EST is 05:00 UTC.
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_days_from_month_boundary() {
        let cal = calendar();
        let at = |m, d| Utc.with_ymd_and_hms(2024, m, d, 16, 0, 0).unwrap();
        assert_eq!(cal.days_from_month_boundary(at(5, 1)), 0);
        assert_eq!(cal.days_from_month_boundary(at(5, 3)), 2);
        assert_eq!(cal.days_from_month_boundary(at(5, 30)), 2);
        assert_eq!(cal.days_from_month_boundary(at(5, 15)), 14);
        // 2024 is a leap year.
        assert_eq!(cal.days_from_month_boundary(at(2, 29)), 1);
    }

    #[test]
    fn test_subscription_start_rule() {
        let cal = calendar();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let next = cal.next_month_start(now);

        assert_eq!(
            cal.subscription_start(SubscriptionType::Primary, SwapWindowState::Closed, now),
            None
        );
        assert_eq!(
            cal.subscription_start(SubscriptionType::Primary, SwapWindowState::Open, now),
            Some(next)
        );
        assert_eq!(
            cal.subscription_start(SubscriptionType::Addon, SwapWindowState::Closed, now),
            Some(next)
        );
    }
}

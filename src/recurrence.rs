//! Occurrence-date computation for recurring templates.
//!
//! Pure calendar arithmetic: given a recurrence rule and the prior occurrence,
//! compute the next one. No store access; the recurring-task engine in
//! `db::recurring` anchors the prior occurrence and persists the result.
//! Time-of-day of the anchor is preserved.

use crate::types::{RecurrencePattern, Task};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

/// Recurrence fields of a template, extracted from a task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
    /// Every N pattern-units. Clamped to at least 1.
    pub interval: u32,
    /// For Weekly: days of week, 0 = Monday .. 6 = Sunday.
    pub days_of_week: Vec<u8>,
    /// For Monthly/Yearly: target day, clamped to the month's length.
    pub day_of_month: Option<u32>,
    /// For Yearly: target month, 1-12.
    pub month_of_year: Option<u32>,
}

impl RecurrenceRule {
    /// Extract the rule from a recurring template. Returns `None` when the
    /// task carries no pattern (not a template, or misconfigured).
    pub fn from_task(task: &Task) -> Option<Self> {
        let pattern = task.recurrence_pattern?;
        let mut days_of_week: Vec<u8> = task
            .recurrence_days_of_week
            .iter()
            .copied()
            .filter(|d| *d < 7)
            .collect();
        days_of_week.sort_unstable();
        days_of_week.dedup();

        Some(Self {
            pattern,
            interval: task.recurrence_interval.unwrap_or(1).max(1),
            days_of_week,
            day_of_month: task.recurrence_day_of_month,
            month_of_year: task.recurrence_month_of_year,
        })
    }
}

/// Compute the occurrence that follows `prior` under `rule`.
pub fn next_occurrence(rule: &RecurrenceRule, prior: DateTime<Utc>) -> DateTime<Utc> {
    let interval = rule.interval.max(1);
    match rule.pattern {
        // Custom has no richer grammar; it falls back to an interval in days.
        RecurrencePattern::Daily | RecurrencePattern::Custom => {
            prior + Duration::days(interval as i64)
        }
        RecurrencePattern::Weekly => next_weekly(rule, prior, interval),
        RecurrencePattern::Monthly => {
            let day = rule.day_of_month.unwrap_or(prior.day());
            shift_months(prior, interval as i32, day)
        }
        RecurrencePattern::Yearly => {
            let year = prior.year() + interval as i32;
            let month = rule.month_of_year.unwrap_or(prior.month()).clamp(1, 12);
            let day = rule.day_of_month.unwrap_or(prior.day());
            on_date(year, month, day, prior.time())
        }
        RecurrencePattern::Weekdays => {
            let mut current = prior;
            for _ in 0..interval {
                current += Duration::days(1);
                while is_weekend(current) {
                    current += Duration::days(1);
                }
            }
            current
        }
    }
}

/// Weekly stepping over the configured days-of-week. The nearest configured
/// day strictly after `prior` within the same week wins; once past them all,
/// advance `interval` weeks and restart from the first configured day.
fn next_weekly(rule: &RecurrenceRule, prior: DateTime<Utc>, interval: u32) -> DateTime<Utc> {
    if rule.days_of_week.is_empty() {
        return prior + Duration::weeks(interval as i64);
    }

    let prior_dow = prior.weekday().num_days_from_monday() as u8;
    for &day in &rule.days_of_week {
        if day > prior_dow {
            return prior + Duration::days((day - prior_dow) as i64);
        }
    }

    let monday = prior - Duration::days(prior_dow as i64);
    monday + Duration::weeks(interval as i64) + Duration::days(rule.days_of_week[0] as i64)
}

fn is_weekend(value: DateTime<Utc>) -> bool {
    value.weekday().num_days_from_monday() >= 5
}

/// Add `months` to `value`, landing on `target_day` clamped to the resulting
/// month's length (Jan 31 + 1 month = Feb 28/29).
fn shift_months(value: DateTime<Utc>, months: i32, target_day: u32) -> DateTime<Utc> {
    let mut year = value.year();
    let mut month = value.month() as i32 + months;

    while month > 12 {
        month -= 12;
        year += 1;
    }
    while month < 1 {
        month += 12;
        year -= 1;
    }

    on_date(year, month as u32, target_day, value.time())
}

/// Build a UTC datetime on the given calendar day, clamping the day to the
/// month's length. Feb 29 clamps to Feb 28 in non-leap years.
fn on_date(year: i32, month: u32, day: u32, time: NaiveTime) -> DateTime<Utc> {
    let day = day.clamp(1, days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default());
    DateTime::from_naive_utc_and_offset(date.and_time(time), Utc)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    for day in (28..=31).rev() {
        if NaiveDate::from_ymd_opt(year, month, day).is_some() {
            return day;
        }
    }
    28
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .expect("valid datetime")
    }

    fn rule(pattern: RecurrencePattern) -> RecurrenceRule {
        RecurrenceRule {
            pattern,
            interval: 1,
            days_of_week: vec![],
            day_of_month: None,
            month_of_year: None,
        }
    }

    #[test]
    fn daily_adds_interval_days() {
        let mut r = rule(RecurrencePattern::Daily);
        r.interval = 3;
        let next = next_occurrence(&r, utc(2025, 1, 6, 9, 0));
        assert_eq!(next, utc(2025, 1, 9, 9, 0));
    }

    #[test]
    fn weekly_lands_on_configured_monday() {
        // Template from the weekly scenario: every Monday, prior = Mon 2025-01-06.
        let mut r = rule(RecurrencePattern::Weekly);
        r.days_of_week = vec![0];
        let next = next_occurrence(&r, utc(2025, 1, 6, 0, 0));
        assert_eq!(next, utc(2025, 1, 13, 0, 0));
    }

    #[test]
    fn weekly_picks_nearest_upcoming_day_in_same_week() {
        // Mon + Thu configured; prior is a Monday, next is that Thursday.
        let mut r = rule(RecurrencePattern::Weekly);
        r.days_of_week = vec![0, 3];
        let next = next_occurrence(&r, utc(2025, 1, 6, 8, 0));
        assert_eq!(next, utc(2025, 1, 9, 8, 0));

        // Past all configured days: advance a week, restart from Monday.
        let next = next_occurrence(&r, utc(2025, 1, 9, 8, 0));
        assert_eq!(next, utc(2025, 1, 13, 8, 0));
    }

    #[test]
    fn weekly_with_interval_skips_weeks_on_wrap() {
        let mut r = rule(RecurrencePattern::Weekly);
        r.interval = 2;
        r.days_of_week = vec![0];
        // Prior Monday, every 2 weeks: wrap lands two Mondays out.
        let next = next_occurrence(&r, utc(2025, 1, 6, 0, 0));
        assert_eq!(next, utc(2025, 1, 20, 0, 0));
    }

    #[test]
    fn weekly_without_configured_days_falls_back_to_week_step() {
        let r = rule(RecurrencePattern::Weekly);
        let next = next_occurrence(&r, utc(2025, 1, 8, 12, 0));
        assert_eq!(next, utc(2025, 1, 15, 12, 0));
    }

    #[test]
    fn monthly_clamps_day_31_to_short_months() {
        let mut r = rule(RecurrencePattern::Monthly);
        r.day_of_month = Some(31);
        // March 31 -> April 30 (clamped), never an invalid date.
        let next = next_occurrence(&r, utc(2025, 3, 31, 10, 30));
        assert_eq!(next, utc(2025, 4, 30, 10, 30));
    }

    #[test]
    fn monthly_interval_crosses_year_boundary() {
        let mut r = rule(RecurrencePattern::Monthly);
        r.interval = 3;
        r.day_of_month = Some(15);
        let next = next_occurrence(&r, utc(2025, 11, 15, 0, 0));
        assert_eq!(next, utc(2026, 2, 15, 0, 0));
    }

    #[test]
    fn yearly_clamps_feb_29_in_non_leap_years() {
        let mut r = rule(RecurrencePattern::Yearly);
        r.day_of_month = Some(29);
        r.month_of_year = Some(2);
        let next = next_occurrence(&r, utc(2024, 2, 29, 7, 0));
        assert_eq!(next, utc(2025, 2, 28, 7, 0));
    }

    #[test]
    fn weekdays_skip_weekends() {
        let r = rule(RecurrencePattern::Weekdays);
        // Friday -> Monday.
        let next = next_occurrence(&r, utc(2025, 1, 10, 9, 0));
        assert_eq!(next, utc(2025, 1, 13, 9, 0));

        // Two weekday steps from Thursday: Friday, then Monday.
        let mut r2 = rule(RecurrencePattern::Weekdays);
        r2.interval = 2;
        let next = next_occurrence(&r2, utc(2025, 1, 9, 9, 0));
        assert_eq!(next, utc(2025, 1, 13, 9, 0));
    }

    #[test]
    fn custom_falls_back_to_interval_days() {
        let mut r = rule(RecurrencePattern::Custom);
        r.interval = 10;
        let next = next_occurrence(&r, utc(2025, 1, 1, 0, 0));
        assert_eq!(next, utc(2025, 1, 11, 0, 0));
    }

    #[test]
    fn zero_interval_is_treated_as_one() {
        let mut r = rule(RecurrencePattern::Daily);
        r.interval = 0;
        let next = next_occurrence(&r, utc(2025, 1, 1, 0, 0));
        assert_eq!(next, utc(2025, 1, 2, 0, 0));
    }

    #[test]
    fn rule_extraction_normalizes_days_of_week() {
        let mut task = crate::types::Task {
            id: "t".into(),
            user_id: "u".into(),
            assigned_to: None,
            title: "t".into(),
            description: None,
            status: crate::types::TaskStatus::Todo,
            priority: crate::types::Priority::Medium,
            estimated_hours: None,
            project_id: None,
            category_id: None,
            due_date: None,
            start_date: None,
            completed_at: None,
            parent_task_id: None,
            position: 0,
            is_recurring: true,
            recurrence_pattern: Some(RecurrencePattern::Weekly),
            recurrence_interval: None,
            recurrence_days_of_week: vec![4, 0, 4, 9],
            recurrence_day_of_month: None,
            recurrence_month_of_year: None,
            recurrence_end_date: None,
            recurrence_count: None,
            recurrence_generated_count: 0,
            recurrence_last_due: None,
            recurrence_parent_id: None,
            archived: false,
            created_at: 0,
            updated_at: 0,
        };
        let r = RecurrenceRule::from_task(&task).expect("rule should extract");
        assert_eq!(r.days_of_week, vec![0, 4]);
        assert_eq!(r.interval, 1);

        task.recurrence_pattern = None;
        assert!(RecurrenceRule::from_task(&task).is_none());
    }
}

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Base allowance before rounding to a Friday.
const ALLOWANCE_DAYS: i64 = 21;

/// Days from `weekday` to Friday, counting Sunday as day 0 (Saturday gives -1).
fn days_until_friday(weekday: chrono::Weekday) -> i64 {
    5 - i64::from(weekday.num_days_from_sunday())
}

/// Milestone deadline for a run started at `reference`: three weeks out,
/// moved to the Friday of that week.
pub fn milestone_due_date<Tz: TimeZone>(reference: &DateTime<Tz>) -> DateTime<Tz> {
    let offset = ALLOWANCE_DAYS + days_until_friday(reference.weekday());
    reference.clone() + Duration::days(offset)
}

pub fn milestone_due_date_from_now() -> DateTime<Utc> {
    milestone_due_date(&Utc::now())
}

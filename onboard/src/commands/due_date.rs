//! Due-date command - Show the milestone deadline a run would set

use anyhow::Context;
use chrono::{NaiveDate, TimeZone, Utc};
use colored::Colorize;

use crate::due_date::{milestone_due_date, milestone_due_date_from_now};

pub fn run(from: Option<&str>) -> anyhow::Result<()> {
    let due = match from {
        Some(date) => {
            let start = parse_start(date)?;
            milestone_due_date(&start)
        }
        None => milestone_due_date_from_now(),
    };

    println!(
        "{} {}",
        "Milestone due:".dimmed(),
        due.format("%A %Y-%m-%d").to_string().cyan()
    );
    Ok(())
}

fn parse_start(date: &str) -> anyhow::Result<chrono::DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;
    Ok(Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN)))
}

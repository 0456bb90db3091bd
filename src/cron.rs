//! Five-field cron expression checks for `schedule` triggers
//!
//! Expressions are checked by the `cron` crate, which expects a leading
//! seconds field and numbers weekdays 1-7 from Sunday. Schedules use
//! 0-6 from Sunday with 7 as a Sunday alias, so numeric weekdays are
//! shifted before parsing.

use std::str::FromStr;

use cron::Schedule;

const FIELD_COUNT: usize = 5;

/// Validate a cron expression, returning the reason it is invalid
pub fn validate_cron(expression: &str) -> Result<(), String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != FIELD_COUNT {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }

    let adapted = format!(
        "0 {} {}",
        fields[..4].join(" "),
        day_of_week(fields[4])
    );
    Schedule::from_str(&adapted)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn day_of_week(field: &str) -> String {
    field.split(',').map(weekday_item).collect::<Vec<_>>().join(",")
}

fn weekday_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let with_step = |range: String| match step {
        Some(step) => format!("{}/{}", range, step),
        None => range,
    };

    match range.split_once('-') {
        Some((low, "7")) => {
            let shifted = with_step(format!("{}-7", weekday(low)));
            // 7 is Saturday after the shift; Sunday is 1
            if step.is_none() && low != "0" {
                format!("{},1", shifted)
            } else {
                shifted
            }
        }
        Some((low, high)) => with_step(format!("{}-{}", weekday(low), weekday(high))),
        None if range == "7" => with_step("1".to_string()),
        None => with_step(weekday(range)),
    }
}

/// Numeric weekdays move up by one; names and `*` pass through
fn weekday(token: &str) -> String {
    match token.parse::<u32>() {
        Ok(n) => (n + 1).to_string(),
        Err(_) => token.to_string(),
    }
}

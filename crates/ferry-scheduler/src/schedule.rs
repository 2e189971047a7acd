use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};

/// A parsed schedule expression.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// `@every <duration>`: fixed spacing from the previous firing.
    Interval(Duration),
    /// Calendar schedule (seconds-resolution cron).
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a schedule expression.
    ///
    /// Cron expressions use classic weekday numbering (Sunday = 0 or 7) in
    /// every form. Five-field expressions (`m h dom mon dow`) fire at second
    /// zero; six and seven fields prepend seconds and may append a year.
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = expression.trim();
        if expr.is_empty() {
            return Err(parse_error(expression, "expression is empty"));
        }

        if let Some(rest) = expr.strip_prefix("@every") {
            let every = parse_every(rest.trim()).map_err(|reason| parse_error(expression, reason))?;
            return Ok(Schedule::Interval(every));
        }

        let normalized = match expr {
            "@midnight" => "@daily".to_string(),
            _ if expr.starts_with('@') => expr.to_string(),
            _ => {
                let fields: Vec<&str> = expr.split_whitespace().collect();
                match fields.len() {
                    5 => format!(
                        "0 {} {} {} {} {}",
                        fields[0],
                        fields[1],
                        fields[2],
                        fields[3],
                        translate_day_of_week(fields[4])
                    ),
                    6 | 7 => {
                        let mut fields: Vec<String> =
                            fields.iter().map(|f| f.to_string()).collect();
                        fields[5] = translate_day_of_week(&fields[5]);
                        fields.join(" ")
                    }
                    n => {
                        return Err(parse_error(
                            expression,
                            format!("expected 5, 6 or 7 fields, got {n}"),
                        ))
                    }
                }
            }
        };

        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| parse_error(expression, e.to_string()))?;
        Ok(Schedule::Cron(Box::new(schedule)))
    }

    /// The first firing strictly after `from`, if there is one.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|d| from.checked_add_signed(d)),
            Schedule::Cron(schedule) => schedule.after(&from).next(),
        }
    }
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

fn parse_error(expression: &str, reason: impl Into<String>) -> SchedulerError {
    SchedulerError::ScheduleParse {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

/// `1h30m`, `90s`, `5m`: one or more `<integer><h|m|s>` parts, total > 0.
fn parse_every(text: &str) -> std::result::Result<Duration, String> {
    if text.is_empty() {
        return Err("missing interval after @every".to_string());
    }
    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("unknown interval unit '{other}'")),
        };
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{c}'"))?;
        digits.clear();
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| "interval too large".to_string())?;
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after '{digits}'"));
    }
    if total == 0 {
        return Err("interval must be positive".to_string());
    }
    Ok(Duration::from_secs(total))
}

/// Classic cron numbers weekdays 0-7 from Sunday (0 and 7 both Sunday); the
/// calendar parser numbers them 1-7 from Sunday. Names pass through.
fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(translate_day_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_day_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let translated = match range.split_once('-') {
        // `x-7` runs through Sunday, which wraps to the front of the week.
        Some((lo, "7")) if step.is_none() => return format!("{}-7,1", shift_day(lo)),
        Some((lo, "7")) => format!("{}-7", shift_day(lo)),
        Some((lo, hi)) => format!("{}-{}", shift_day(lo), shift_day(hi)),
        None => shift_day(range),
    };
    match step {
        Some(step) => format!("{translated}/{step}"),
        None => translated,
    }
}

fn shift_day(value: &str) -> String {
    match value.parse::<u8>() {
        Ok(7) => "1".to_string(),
        Ok(n) if n < 7 => (n + 1).to_string(),
        _ => value.to_string(),
    }
}

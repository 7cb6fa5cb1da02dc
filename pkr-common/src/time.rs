//! Timestamp utilities

use chrono::{DateTime, Local, TimeZone};

/// `asctime`-style stamp, e.g. `Sat Oct 17 09:05:00 2026`
pub fn asctime<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Local time at which the source data was fetched
pub fn time_of_data() -> String {
    asctime(&Local::now())
}

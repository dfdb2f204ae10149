use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, TimeZone, Weekday};
use zchat_core::llm::UserContext;

const WEEKDAYS_RU: [&str; 7] = [
    "понедельник",
    "вторник",
    "среда",
    "четверг",
    "пятница",
    "суббота",
    "воскресенье",
];

/// Locale settings that feed the variables the provider expects.
#[derive(Clone, Debug)]
pub struct Locale {
    pub timezone_label: String,
    pub default_location: String,
    pub language: String,
}

pub fn weekday_name(day: Weekday, language: &str) -> String {
    if language.to_ascii_lowercase().starts_with("ru") {
        WEEKDAYS_RU[day.num_days_from_monday() as usize].to_string()
    } else {
        match day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
        .to_string()
    }
}

/// Build the `{{NAME}}` substitution map for `now`, already shifted into the
/// configured zone.
pub fn variables<Tz: TimeZone>(
    now: &DateTime<Tz>,
    user: &UserContext,
    locale: &Locale,
) -> BTreeMap<String, String>
where
    Tz::Offset: std::fmt::Display,
{
    let location = if user.location.trim().is_empty() {
        locale.default_location.clone()
    } else {
        user.location.trim().to_string()
    };
    let vars = [
        ("USER_NAME", user.name.trim().to_string()),
        ("USER_LOCATION", location),
        ("CURRENT_DATETIME", now.format("%d.%m.%Y %H:%M:%S").to_string()),
        ("CURRENT_DATE", now.format("%d.%m.%Y").to_string()),
        ("CURRENT_TIME", now.format("%H:%M:%S").to_string()),
        ("CURRENT_WEEKDAY", weekday_name(now.weekday(), &locale.language)),
        ("CURRENT_TIMEZONE", locale.timezone_label.clone()),
        ("USER_LANGUAGE", locale.language.clone()),
    ];
    vars.into_iter()
        .map(|(k, v)| (format!("{{{{{k}}}}}"), v))
        .collect()
}

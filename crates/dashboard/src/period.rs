use pws_weather_core::DataSource;
use std::{fmt, str::FromStr};
use time::{Duration, PrimitiveDateTime, Time};

/// Reporting window accepted by the summary and graph endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    OneDay,
    SevenDays,
    ThirtyDays,
    Week,
    Month,
    Ytd,
}

impl Period {
    /// Earliest station-local time included in the period ending at `now`
    pub fn cutoff(&self, now: PrimitiveDateTime) -> PrimitiveDateTime {
        let today = now.date();
        match self {
            Period::OneDay => now - Duration::days(1),
            Period::SevenDays => now - Duration::days(7),
            Period::ThirtyDays => now - Duration::days(30),
            Period::Week => PrimitiveDateTime::new(
                today - Duration::days(today.weekday().number_days_from_monday() as i64),
                Time::MIDNIGHT,
            ),
            Period::Month => {
                PrimitiveDateTime::new(today - Duration::days(today.day() as i64 - 1), Time::MIDNIGHT)
            }
            Period::Ytd => PrimitiveDateTime::new(
                today - Duration::days(today.ordinal() as i64 - 1),
                Time::MIDNIGHT,
            ),
        }
    }

    /// Finest table that still keeps the response small
    pub fn source(&self) -> DataSource {
        match self {
            Period::OneDay => DataSource::Raw,
            Period::SevenDays | Period::Week => DataSource::Hourly,
            Period::ThirtyDays | Period::Month | Period::Ytd => DataSource::Daily,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::SevenDays => "7d",
            Period::ThirtyDays => "30d",
            Period::Week => "week",
            Period::Month => "month",
            Period::Ytd => "ytd",
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Period::OneDay),
            "7d" => Ok(Period::SevenDays),
            "30d" => Ok(Period::ThirtyDays),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "ytd" => Ok(Period::Ytd),
            other => Err(format!("invalid period: {}", other)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

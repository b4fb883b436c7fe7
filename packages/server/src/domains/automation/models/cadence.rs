use chrono::{NaiveTime, Weekday};
use std::fmt;
use std::str::FromStr;

/// How often a location posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    /// Fires on a daily timer, then gated on time elapsed since the last run.
    EveryNDays(u32),
    /// Mondays.
    Weekly,
    /// Mondays and Thursdays.
    TwiceWeekly,
    /// Every day at each listed time (local to the tenant).
    Custom(Vec<NaiveTime>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown posting cadence: {0}")]
pub struct UnknownCadence(pub String);

impl Cadence {
    /// Parse a stored cadence name, accepting the legacy aliases.
    ///
    /// `custom_times` only matters for the `custom` cadence.
    pub fn parse(raw: &str, custom_times: Vec<NaiveTime>) -> Result<Self, UnknownCadence> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "daily" | "every-day" | "everyday" => Ok(Cadence::Daily),
            "alternative" | "alternate" | "alternate-days" | "every-other-day" => {
                Ok(Cadence::EveryNDays(2))
            }
            "weekly" | "once-a-week" => Ok(Cadence::Weekly),
            "twice-weekly" | "twice-a-week" => Ok(Cadence::TwiceWeekly),
            "custom" => Ok(Cadence::Custom(custom_times)),
            other => parse_every_n_days(other).ok_or_else(|| UnknownCadence(raw.to_string())),
        }
    }

    /// Weekdays this cadence can fire on; `None` means every day.
    pub fn weekdays(&self) -> Option<&'static [Weekday]> {
        match self {
            Cadence::Weekly => Some(&[Weekday::Mon]),
            Cadence::TwiceWeekly => Some(&[Weekday::Mon, Weekday::Thu]),
            Cadence::Daily | Cadence::EveryNDays(_) | Cadence::Custom(_) => None,
        }
    }

    pub fn fires_on(&self, day: Weekday) -> bool {
        self.weekdays().map_or(true, |days| days.contains(&day))
    }

    /// Local trigger times given the configured time-of-day.
    pub fn trigger_times(&self, time_of_day: Option<NaiveTime>) -> Vec<NaiveTime> {
        match self {
            Cadence::Custom(times) => times.clone(),
            _ => time_of_day.into_iter().collect(),
        }
    }

    /// Minimum days between runs for elapsed-gated cadences.
    pub fn interval_days(&self) -> Option<u32> {
        match self {
            Cadence::EveryNDays(n) => Some(*n),
            _ => None,
        }
    }
}

/// `every-3-days`, `every-3-day`, `3-days`
fn parse_every_n_days(s: &str) -> Option<Cadence> {
    let rest = s.strip_prefix("every-").unwrap_or(s);
    let digits = rest
        .strip_suffix("-days")
        .or_else(|| rest.strip_suffix("-day"))?;
    let n: u32 = digits.parse().ok()?;
    match n {
        0 => None,
        1 => Some(Cadence::Daily),
        n => Some(Cadence::EveryNDays(n)),
    }
}

impl FromStr for Cadence {
    type Err = UnknownCadence;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cadence::parse(s, Vec::new())
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Daily => write!(f, "daily"),
            Cadence::EveryNDays(n) => write!(f, "every-{n}-days"),
            Cadence::Weekly => write!(f, "weekly"),
            Cadence::TwiceWeekly => write!(f, "twice-weekly"),
            Cadence::Custom(_) => write!(f, "custom"),
        }
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn legacy_aliases_resolve() {
        assert_eq!("alternative".parse::<Cadence>().unwrap(), Cadence::EveryNDays(2));
        assert_eq!("twice_weekly".parse::<Cadence>().unwrap(), Cadence::TwiceWeekly);
        assert_eq!("Every 3 Days".parse::<Cadence>().unwrap(), Cadence::EveryNDays(3));
        assert_eq!("every-1-day".parse::<Cadence>().unwrap(), Cadence::Daily);
        assert_eq!("DAILY".parse::<Cadence>().unwrap(), Cadence::Daily);
    }

    #[test]
    fn unknown_cadence_is_rejected() {
        assert!("fortnightly".parse::<Cadence>().is_err());
        assert!("every-0-days".parse::<Cadence>().is_err());
    }

    #[test]
    fn weekly_variants_restrict_weekdays() {
        assert!(Cadence::Weekly.fires_on(Weekday::Mon));
        assert!(!Cadence::Weekly.fires_on(Weekday::Thu));
        assert!(Cadence::TwiceWeekly.fires_on(Weekday::Thu));
        assert!(!Cadence::TwiceWeekly.fires_on(Weekday::Wed));
        assert!(Cadence::EveryNDays(3).fires_on(Weekday::Sun));
    }

    #[test]
    fn custom_uses_its_own_times() {
        let cadence = Cadence::parse("custom", vec![t(8, 0), t(17, 30)]).unwrap();
        assert_eq!(cadence.trigger_times(Some(t(9, 0))), vec![t(8, 0), t(17, 30)]);
        assert_eq!(Cadence::Daily.trigger_times(Some(t(9, 0))), vec![t(9, 0)]);
        assert!(Cadence::Daily.trigger_times(None).is_empty());
    }

    #[test]
    fn time_of_day_accepts_seconds() {
        assert_eq!(parse_time_of_day("09:30"), Some(t(9, 30)));
        assert_eq!(parse_time_of_day("09:30:00"), Some(t(9, 30)));
        assert_eq!(parse_time_of_day("9am"), None);
    }
}

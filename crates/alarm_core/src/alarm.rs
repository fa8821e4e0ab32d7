use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidDays, InvalidTime};

/// Store-assigned identifier. `0` marks an alarm that has not been persisted yet.
pub type AlarmId = u64;

pub const UNSAVED_ID: AlarmId = 0;

/// Wall-clock time of day an alarm rings at, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ClockFields", into = "ClockFields")]
pub struct AlarmTime {
    hour: u32,
    minute: u32,
}

#[derive(Serialize, Deserialize)]
struct ClockFields {
    hour: u32,
    minute: u32,
}

impl AlarmTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, InvalidTime> {
        if hour > 23 || minute > 59 {
            return Err(InvalidTime::OutOfRange { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Parses `HH:MM` (24-hour clock).
    pub fn parse(input: &str) -> Result<Self, InvalidTime> {
        let parsed = NaiveTime::parse_from_str(input.trim(), "%H:%M")
            .map_err(|_| InvalidTime::Unparseable(input.to_string()))?;
        Self::from_naive(parsed)
    }

    pub fn from_naive(time: NaiveTime) -> Result<Self, InvalidTime> {
        use chrono::Timelike;
        Self::new(time.hour(), time.minute())
    }
}

impl TryFrom<ClockFields> for AlarmTime {
    type Error = InvalidTime;

    fn try_from(value: ClockFields) -> Result<Self, Self::Error> {
        Self::new(value.hour, value.minute)
    }
}

impl From<AlarmTime> for ClockFields {
    fn from(value: AlarmTime) -> Self {
        Self {
            hour: value.hour,
            minute: value.minute,
        }
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Set of weekdays a recurring alarm rings on. Empty means one-shot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);

    pub fn new() -> Self {
        Self::EMPTY
    }

    pub fn insert(&mut self, day: Weekday) -> bool {
        let bit = Self::bit(day);
        let inserted = self.0 & bit == 0;
        self.0 |= bit;
        inserted
    }

    pub fn remove(&mut self, day: Weekday) -> bool {
        let bit = Self::bit(day);
        let removed = self.0 & bit != 0;
        self.0 &= !bit;
        removed
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in Monday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.iter().copied().filter(move |day| self.contains(*day))
    }

    /// Parses a comma separated list such as `mon,wed,fri`. Blank input yields an empty set.
    pub fn parse(input: &str) -> Result<Self, InvalidDays> {
        let mut days = Self::new();
        for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let day = token
                .parse::<Weekday>()
                .map_err(|_| InvalidDays(token.to_string()))?;
            days.insert(day);
        }
        Ok(days)
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut days = Self::new();
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl From<Vec<Weekday>> for DaySet {
    fn from(value: Vec<Weekday>) -> Self {
        value.into_iter().collect()
    }
}

impl From<DaySet> for Vec<Weekday> {
    fn from(value: DaySet) -> Self {
        value.iter().collect()
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("once");
        }
        let names: Vec<String> = self.iter().map(|day| day.to_string()).collect();
        f.write_str(&names.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    #[serde(flatten)]
    pub time: AlarmTime,
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub days: DaySet,
}

impl Alarm {
    /// A fresh, enabled alarm that the store has not seen yet.
    pub fn new(time: AlarmTime, days: DaySet) -> Self {
        Self {
            id: UNSAVED_ID,
            time,
            enabled: true,
            deleted: false,
            days,
        }
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn is_recurring(&self) -> bool {
        !self.days.is_empty()
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    pub fn matches(&self, time: AlarmTime, days: &DaySet) -> bool {
        self.time == time && self.days == *days
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.enabled { "on" } else { "off" };
        write!(f, "#{} {} [{}] {}", self.id, self.time, self.days, state)
    }
}

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use parking_lot::Mutex;

use crate::alarm::{AlarmTime, DaySet};

/// Computes the next instant an alarm at `time` should ring, relative to `now`.
///
/// One-shot alarms (empty `days`) ring today when the time is still ahead and tomorrow
/// otherwise. Recurring alarms ring on the nearest listed weekday; today only counts while the
/// time has not been reached. A time equal to `now` counts as reached, so the result is always
/// strictly after `now`.
pub fn next_trigger<Tz: TimeZone>(time: AlarmTime, days: &DaySet, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let passed_today = localize(&tz, today.and_time(time.as_naive())) <= *now;

    let offset = if days.is_empty() {
        i64::from(passed_today)
    } else {
        let current = i64::from(now.weekday().num_days_from_monday());
        days.iter()
            .map(|target| {
                let diff = (i64::from(target.num_days_from_monday()) - current).rem_euclid(7);
                if diff == 0 && passed_today {
                    7
                } else {
                    diff
                }
            })
            .min()
            .unwrap_or(0)
    };

    localize(&tz, at_offset(today, offset).and_time(time.as_naive()))
}

fn at_offset(today: NaiveDate, days: i64) -> NaiveDate {
    today + Duration::days(days)
}

// Wall-clock times skipped by a DST jump ring an hour later; repeated ones ring the first time.
fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| with_nearby_offset(tz, naive)),
    }
}

// Reads `naive` with the offset in force around it, for zones whose gaps exceed an hour.
fn with_nearby_offset<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let offset = tz.offset_from_utc_datetime(&naive).fix();
    let utc = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
    tz.from_utc_datetime(&utc)
}

/// Source of "now" for everything that resolves triggers.
pub trait Clock: Send + Sync + 'static {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = chrono::Local;

    fn now(&self) -> DateTime<chrono::Local> {
        chrono::Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    type Tz = Utc;

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

impl<C: Clock> Clock for std::sync::Arc<C> {
    type Tz = C::Tz;

    fn now(&self) -> DateTime<C::Tz> {
        (**self).now()
    }
}

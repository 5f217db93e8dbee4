use chrono::{DateTime, Datelike, Days, Months, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Returns start of the next day.
pub fn next_day_start(date: NaiveDateTime) -> NaiveDateTime {
    (date.date() + Days::new(1)).and_time(NaiveTime::MIN)
}

/// Returns start of the first day of the next month.
pub fn next_month_start(date: NaiveDateTime) -> NaiveDateTime {
    let first_of_month = date
        .date()
        .with_day(1)
        .expect("Every month has a first day");
    (first_of_month + Months::new(1)).and_time(NaiveTime::MIN)
}

/// Converts a wall clock time in `tz` to utc. Times skipped by a DST jump are read as utc.
pub fn wall_time_to_utc<Tz: TimeZone>(tz: &Tz, wall_time: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&wall_time)
        .earliest()
        .map(|v| v.with_timezone(&Utc))
        .unwrap_or_else(|| wall_time.and_utc())
}

//! Matching schedule triggers against ticks.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use brainbox_core::workflows::{Frequency, ScheduleTick, Trigger};

use crate::validate::parse_time;

/// Weekly schedules without a day run on Mondays.
pub const DEFAULT_DAY_OF_WEEK: u32 = 1;
/// Monthly schedules without a day run on the first.
pub const DEFAULT_DAY_OF_MONTH: u32 = 1;

/// One tick per frequency for the minute containing `at`.
pub fn ticks_for(at: NaiveDateTime) -> Vec<ScheduleTick> {
    let time_of_day = NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).unwrap_or(at.time());
    Frequency::all()
        .into_iter()
        .map(|frequency| ScheduleTick {
            frequency,
            time_of_day,
            date: at.date(),
        })
        .collect()
}

/// Whether a schedule trigger fires on this tick.
///
/// Hourly triggers compare only the minute of `time`. A monthly day past
/// the end of a short month fires on that month's last day.
pub fn tick_matches(trigger: &Trigger, tick: &ScheduleTick) -> bool {
    let Trigger::Schedule {
        frequency,
        time,
        day_of_week,
        day_of_month,
        ..
    } = trigger
    else {
        return false;
    };
    if *frequency != tick.frequency {
        return false;
    }
    let Ok(at) = parse_time(time) else {
        return false;
    };
    let minute_matches = at.minute() == tick.time_of_day.minute();
    let time_matches = minute_matches && at.hour() == tick.time_of_day.hour();

    match frequency {
        Frequency::Hourly => minute_matches,
        Frequency::Daily => time_matches,
        Frequency::Weekly => {
            time_matches
                && tick.date.weekday().number_from_monday()
                    == day_of_week.unwrap_or(DEFAULT_DAY_OF_WEEK)
        }
        Frequency::Monthly => {
            let wanted = day_of_month.unwrap_or(DEFAULT_DAY_OF_MONTH);
            time_matches && tick.date.day() == wanted.min(last_day_of_month(tick.date))
        }
    }
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

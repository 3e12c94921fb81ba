//! Business-hours arithmetic
//!
//! Advances an instant by a number of minutes that only count while a
//! configured business window is open. Windows are `[start_hour, end_hour)`
//! on each working weekday, expressed in a fixed UTC offset.

use thiserror::Error;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, Weekday};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusinessHoursError {
    #[error("Business window {start}:00-{end}:00 is empty or out of range")]
    InvalidWindow { start: u8, end: u8 },
    #[error("At least one working weekday is required")]
    NoWorkingDays,
}

/// Working days and hours used for SLA deadlines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    start_hour: u8,
    end_hour: u8,
    /// Indexed by `Weekday::number_days_from_monday`
    working_days: [bool; 7],
    offset: UtcOffset,
}

impl BusinessHours {
    pub fn new(
        start_hour: u8,
        end_hour: u8,
        weekdays: &[Weekday],
        offset: UtcOffset,
    ) -> Result<Self, BusinessHoursError> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(BusinessHoursError::InvalidWindow {
                start: start_hour,
                end: end_hour,
            });
        }
        if weekdays.is_empty() {
            return Err(BusinessHoursError::NoWorkingDays);
        }

        let mut working_days = [false; 7];
        for day in weekdays {
            working_days[day.number_days_from_monday() as usize] = true;
        }

        Ok(Self {
            start_hour,
            end_hour,
            working_days,
            offset,
        })
    }

    pub fn start_hour(&self) -> u8 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u8 {
        self.end_hour
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn is_working_day(&self, day: Weekday) -> bool {
        self.working_days[day.number_days_from_monday() as usize]
    }

    /// True when `at` falls inside an open window (the closing instant is outside)
    pub fn is_open(&self, at: OffsetDateTime) -> bool {
        let local = at.to_offset(self.offset);
        let date = local.date();
        self.is_working_day(date.weekday())
            && self.window_start(date).is_some_and(|start| local >= start)
            && self.window_end(date).map_or(true, |end| local < end)
    }

    /// True when `at` is exactly the closing instant of a working day's window
    pub fn is_closing_boundary(&self, at: OffsetDateTime) -> bool {
        let local = at.to_offset(self.offset);
        let date = local.date();
        if self.is_working_day(date.weekday()) && self.window_end(date) == Some(local) {
            return true;
        }
        // end_hour 24 closes at the next day's midnight
        self.end_hour == 24
            && date.previous_day().is_some_and(|prev| {
                self.is_working_day(prev.weekday()) && self.window_end(prev) == Some(local)
            })
    }

    /// Advance `from` by `minutes` business minutes.
    ///
    /// `minutes <= 0` returns `from` untouched. Otherwise an instant outside
    /// business hours first snaps to the next window start, then minutes are
    /// consumed window by window. A budget that runs out exactly at closing
    /// time yields that closing instant rather than the next day's opening.
    /// The result keeps the offset of `from`.
    ///
    /// Never panics: a budget that outlasts the calendar saturates at the last
    /// reachable window end.
    pub fn add_business_minutes(&self, from: OffsetDateTime, minutes: i64) -> OffsetDateTime {
        if minutes <= 0 {
            return from;
        }

        let original_offset = from.offset();
        let restore = |at: OffsetDateTime| at.checked_to_offset(original_offset).unwrap_or(at);
        let Some(mut cursor) = from
            .checked_to_offset(self.offset)
            .and_then(|local| self.snap_forward(local))
        else {
            return from;
        };
        let mut remaining = minutes
            .checked_mul(60)
            .map_or(Duration::MAX, Duration::seconds);

        loop {
            let Some(window_end) = self.window_end(cursor.date()) else {
                // Final window closes past the last representable instant
                let last = PrimitiveDateTime::new(cursor.date(), Time::MAX).assume_offset(self.offset);
                return restore(cursor.checked_add(remaining).map_or(last, |end| end.min(last)));
            };
            let available = window_end - cursor;

            if remaining <= available {
                return restore(cursor.checked_add(remaining).unwrap_or(window_end));
            }
            remaining -= available;

            match self.next_window_start(cursor.date()) {
                Some(next) => cursor = next,
                // Calendar exhausted
                None => return restore(window_end),
            }
        }
    }

    fn window_start(&self, date: Date) -> Option<OffsetDateTime> {
        self.midnight(date)
            .checked_add(Duration::hours(i64::from(self.start_hour)))
    }

    /// `None` when the window closes beyond the representable calendar
    fn window_end(&self, date: Date) -> Option<OffsetDateTime> {
        self.midnight(date)
            .checked_add(Duration::hours(i64::from(self.end_hour)))
    }

    fn midnight(&self, date: Date) -> OffsetDateTime {
        PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(self.offset)
    }

    /// Start of the first window on a working day strictly after `date`
    fn next_window_start(&self, date: Date) -> Option<OffsetDateTime> {
        let mut day = date;
        for _ in 0..7 {
            day = day.next_day()?;
            if self.is_working_day(day.weekday()) {
                return self.window_start(day);
            }
        }
        None
    }

    /// `at` itself when inside a window, otherwise the next window start
    fn snap_forward(&self, at: OffsetDateTime) -> Option<OffsetDateTime> {
        let date = at.date();
        if self.is_working_day(date.weekday()) {
            if let Some(start) = self.window_start(date) {
                if at < start {
                    return Some(start);
                }
                if self.window_end(date).map_or(true, |end| at < end) {
                    return Some(at);
                }
            }
        }
        self.next_window_start(date)
    }
}

impl Default for BusinessHours {
    /// 09:00-18:00 UTC, Monday to Friday
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            working_days: [true, true, true, true, true, false, false],
            offset: UtcOffset::UTC,
        }
    }
}

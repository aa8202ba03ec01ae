use chrono::{DateTime, TimeZone, Timelike};

/// First hour of the daily window.
pub const OPEN_HOUR: u32 = 8;
/// 18:00 sharp is the last instant a run may start.
pub const CLOSE_HOUR: u32 = 18;

/// Whether a run may start at `now`, read in `now`'s own timezone.
///
/// The window is 08:00 through 18:00 inclusive, where 18:00 is the last
/// allowed minute rather than the last allowed hour.
pub fn allowed<Tz: TimeZone>(now: &DateTime<Tz>) -> bool {
    let hour = now.hour();
    if hour < OPEN_HOUR || hour > CLOSE_HOUR {
        return false;
    }
    if hour == CLOSE_HOUR && now.minute() > 0 {
        return false;
    }
    true
}

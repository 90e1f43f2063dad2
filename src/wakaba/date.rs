use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid format, expected MMDD or YYYYMMDD")]
    InvalidFormat,
    #[error("invalid date: {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },
}

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("JST offset is within range") // JST = UTC+9
}

/// Resolves `MMDD` (year taken from `now` in JST) or `YYYYMMDD` into the
/// first and last instant of that day in JST.
pub fn parse_date_input<Tz: TimeZone>(
    input: &str,
    now: &DateTime<Tz>,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), DateError> {
    if !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError::InvalidFormat);
    }

    let (year, rest) = match input.len() {
        4 => (now.with_timezone(&jst()).year(), input),
        8 => (digits(&input[..4])? as i32, &input[4..]),
        _ => return Err(DateError::InvalidFormat),
    };
    let month = digits(&rest[..2])?;
    let day = digits(&rest[2..])?;

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(DateError::InvalidDate { year, month, day })?;

    let start_time = NaiveTime::MIN;
    let end_time =
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).ok_or(DateError::InvalidFormat)?;

    let start = jst()
        .from_local_datetime(&date.and_time(start_time))
        .single()
        .ok_or(DateError::InvalidDate { year, month, day })?;
    let end = jst()
        .from_local_datetime(&date.and_time(end_time))
        .single()
        .ok_or(DateError::InvalidDate { year, month, day })?;

    Ok((start, end))
}

fn digits(s: &str) -> Result<u32, DateError> {
    s.parse().map_err(|_| DateError::InvalidFormat)
}

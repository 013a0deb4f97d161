// MS-DOS date/time encoding for directory entries
// FAT date: bits 15-9: year (0=1980), bits 8-5: month, bits 4-0: day
// FAT time: bits 15-11: hours, bits 10-5: minutes, bits 4-0: seconds/2

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use std::time::SystemTime;

/// Encode a local date/time as `(fat_date, fat_time)`.
pub fn naive_to_fat_datetime(datetime: &NaiveDateTime) -> (u16, u16) {
    // Clamp year to FAT range (1980-2107)
    let (year, month, day) = match datetime.year() {
        y if y < 1980 => (0u16, 1u16, 1u16),
        y if y > 2107 => (127, 12, 31),
        y => ((y - 1980) as u16, datetime.month() as u16, datetime.day() as u16),
    };

    let fat_date = (year << 9) | (month << 5) | day;
    let fat_time = ((datetime.hour() as u16) << 11)
        | ((datetime.minute() as u16) << 5)
        | ((datetime.second() / 2) as u16);

    (fat_date, fat_time)
}

/// Encode a file's modification time in the local time zone.
pub fn system_time_to_fat_datetime(time: SystemTime) -> (u16, u16) {
    let local: DateTime<Local> = time.into();
    naive_to_fat_datetime(&local.naive_local())
}

/// Decode `(fat_date, fat_time)`; `None` for invalid field combinations.
pub fn fat_datetime_to_naive(date: u16, time: u16) -> Option<NaiveDateTime> {
    let year = ((date >> 9) & 0x7F) as i32 + 1980;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;

    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fat_datetime_conversion() {
        let datetime = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let (date, time) = naive_to_fat_datetime(&datetime);

        assert_eq!(date, (40 << 9) | (1 << 5) | 1);
        assert_eq!(time, 12 << 11);
        assert_eq!(fat_datetime_to_naive(date, time), Some(datetime));
    }

    #[test]
    fn test_odd_seconds_round_down() {
        let datetime = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let (date, time) = naive_to_fat_datetime(&datetime);
        let decoded = fat_datetime_to_naive(date, time).unwrap();
        assert_eq!(decoded.second(), 58);
    }

    #[test]
    fn test_year_clamping() {
        let early = NaiveDate::from_ymd_opt(1970, 6, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(naive_to_fat_datetime(&early).0 >> 9, 0);

        let late = NaiveDate::from_ymd_opt(2200, 6, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(naive_to_fat_datetime(&late).0 >> 9, 127);
    }
}

use std::fs;

use chrono::NaiveDate;
use log::{debug, warn};

use crate::error::ModelError;

// Reference ET below this value is raised to it [mm/day]
const MIN_REFERENCE_ET: f64 = 0.1;

/// Daily weather driving the water balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherRecord {
    pub date: NaiveDate,
    pub min_temp: f64,      // [degC]
    pub max_temp: f64,      // [degC]
    pub precipitation: f64, // [mm/day]
    pub reference_et: f64,  // [mm/day]
}

/// Parse a whitespace separated weather table with the columns
/// `Day Month Year MinTemp MaxTemp Precipitation ReferenceET`.
///
/// Lines that do not start with a number (headers, comments) are skipped.
pub fn parse_weather_table(text: &str) -> Result<Vec<WeatherRecord>, ModelError> {
    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() || fields[0].parse::<f64>().is_err() {
            continue;
        }
        if fields.len() < 7 {
            return Err(ModelError::Weather(format!(
                "line {} has {} columns, expected 7",
                line_no + 1,
                fields.len()
            )));
        }

        let int = |ii: usize| {
            fields[ii].parse::<f64>().map(|v| v as i64).map_err(|_| {
                ModelError::Weather(format!("line {}: bad date field '{}'", line_no + 1, fields[ii]))
            })
        };
        let (day, month, year) = (int(0)?, int(1)?, int(2)?);
        let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).ok_or_else(|| {
            ModelError::Weather(format!("line {}: invalid date {day}/{month}/{year}", line_no + 1))
        })?;

        let num = |ii: usize| {
            fields[ii].parse::<f64>().map_err(|_| {
                ModelError::Weather(format!("line {}: bad value '{}'", line_no + 1, fields[ii]))
            })
        };
        records.push(WeatherRecord {
            date,
            min_temp: num(3)?,
            max_temp: num(4)?,
            precipitation: num(5)?,
            reference_et: num(6)?,
        });
    }
    debug!("Parsed {} weather records", records.len());
    Ok(records)
}

pub fn read_weather_file(path: &str) -> Result<Vec<WeatherRecord>, ModelError> {
    let text = fs::read_to_string(path)
        .map_err(|err| ModelError::Weather(format!("failed to read {path}: {err}")))?;
    parse_weather_table(&text)
}

/// Weather for every day of `[start, end]`.
///
/// Records must cover the window. Duplicate dates keep their first record,
/// missing days repeat the previous day, and reference ET is floored at 0.1.
pub fn prepare_weather(
    records: &[WeatherRecord],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<WeatherRecord>, ModelError> {
    let mut sorted: Vec<WeatherRecord> = records.to_vec();
    sorted.sort_by_key(|rec| rec.date);

    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => return Err(ModelError::Weather("no weather records".to_string())),
    };
    if first > start {
        return Err(ModelError::WeatherStartsLate { first, start });
    }
    if last < end {
        return Err(ModelError::WeatherEndsEarly { last, end });
    }

    // Seed for a gap on the first day of the window
    let mut previous = sorted.iter().rev().find(|rec| rec.date < start).copied();

    let mut window: Vec<WeatherRecord> = Vec::new();
    for rec in sorted.into_iter().filter(|rec| rec.date >= start && rec.date <= end) {
        let values = [rec.min_temp, rec.max_temp, rec.precipitation, rec.reference_et];
        if values.iter().any(|v| v.is_nan()) {
            return Err(ModelError::Weather(format!("missing value on {}", rec.date)));
        }
        if window.last().is_some_and(|prev| prev.date == rec.date) {
            continue;
        }
        window.push(rec);
    }

    let mut daily = Vec::with_capacity(window.len());
    let mut source = window.into_iter().peekable();
    for date in start.iter_days().take_while(|date| *date <= end) {
        let rec = match source.next_if(|rec| rec.date == date) {
            Some(rec) => rec,
            None => {
                let Some(prev) = previous else {
                    return Err(ModelError::Weather(format!("no weather record on {date}")));
                };
                warn!("No weather record on {date}, repeating the previous day");
                WeatherRecord { date, ..prev }
            }
        };
        previous = Some(rec);
        daily.push(WeatherRecord {
            reference_et: rec.reference_et.max(MIN_REFERENCE_ET),
            ..rec
        });
    }
    Ok(daily)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(d: NaiveDate, et0: f64) -> WeatherRecord {
        WeatherRecord {
            date: d,
            min_temp: 10.0,
            max_temp: 20.0,
            precipitation: 0.0,
            reference_et: et0,
        }
    }

    #[test]
    fn test_parse_weather_table() {
        let text = "Day Month Year MinTemp MaxTemp Precipitation ReferenceET\n\
                    1 10 1979 14.0 26.0 0.0 3.4\n\
                    2 10 1979 15.0 26.0 1.2 3.1\n";
        let records = parse_weather_table(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].date, date(1979, 10, 2));
        assert_eq!(records[1].precipitation, 1.2);
        assert!(parse_weather_table("1 10 1979 14.0 26.0").is_err());
        assert!(parse_weather_table("31 2 1979 14.0 26.0 0.0 3.0").is_err());
    }

    #[test]
    fn test_window_coverage() {
        let records: Vec<_> = (1..=10).map(|d| record(date(2000, 1, d), 3.0)).collect();
        let late = prepare_weather(&records, date(1999, 12, 31), date(2000, 1, 5));
        assert!(matches!(late, Err(ModelError::WeatherStartsLate { .. })));
        let early = prepare_weather(&records, date(2000, 1, 2), date(2000, 1, 11));
        assert!(matches!(early, Err(ModelError::WeatherEndsEarly { .. })));
    }

    #[test]
    fn test_prepare_weather() {
        let records = vec![
            record(date(2000, 1, 1), 3.0),
            record(date(2000, 1, 2), 0.0),
            record(date(2000, 1, 2), 5.0),
            record(date(2000, 1, 5), 4.0),
            record(date(2000, 1, 6), 4.0),
        ];

        let daily = prepare_weather(&records, date(2000, 1, 2), date(2000, 1, 5)).unwrap();
        let dates: Vec<_> = daily.iter().map(|rec| rec.date).collect();
        assert_eq!(
            dates,
            vec![date(2000, 1, 2), date(2000, 1, 3), date(2000, 1, 4), date(2000, 1, 5)]
        );
        assert_eq!(daily[0].reference_et, 0.1);
        assert_eq!(daily[2].reference_et, 0.1);
        assert_eq!(daily[3].reference_et, 4.0);
    }

    #[test]
    fn test_nan_rejected() {
        let mut records: Vec<_> = (1..=3).map(|d| record(date(2000, 1, d), 3.0)).collect();
        records[1].precipitation = f64::NAN;
        assert!(prepare_weather(&records, date(2000, 1, 1), date(2000, 1, 3)).is_err());
    }
}

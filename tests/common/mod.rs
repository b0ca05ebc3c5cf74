#![allow(dead_code)]

use aquacrop::{WeatherRecord, read_weather_file};
use chrono::{Datelike, NaiveDate};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// The 1979/10/01 to 1980/05/30 fixture.
pub fn fixture_weather() -> Vec<WeatherRecord> {
    let path = format!("{}/tests/data/weather_1979_1980.txt", env!("CARGO_MANIFEST_DIR"));
    read_weather_file(&path).unwrap()
}

/// Northern hemisphere weather for `[start, end]`: a seasonal temperature wave
/// and `rain` mm every `rain_every` days (no rain when zero).
pub fn synthetic_weather(start: NaiveDate, end: NaiveDate, rain: f64, rain_every: usize) -> Vec<WeatherRecord> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .enumerate()
        .map(|(ii, date)| {
            let season = (2.0 * std::f64::consts::PI * (date.ordinal() as f64 - 200.0) / 365.0).cos();
            let max_temp = 20.0 + 9.0 * season;
            let wet = rain_every > 0 && ii % rain_every == 0;
            WeatherRecord {
                date,
                min_temp: max_temp - 11.0,
                max_temp,
                precipitation: if wet { rain } else { 0.0 },
                reference_et: 3.0 + 2.0 * season,
            }
        })
        .collect()
}

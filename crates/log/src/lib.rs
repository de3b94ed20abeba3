//! Leveled stderr logging shared by every resync crate.
//!
//! Configuration lives in process-wide atomics so the macros stay cheap when
//! a level is filtered out. Text lines look like
//! `2024-05-01T12:00:00.000Z INFO resync::sync: block #170=...`; JSON lines
//! carry the same fields plus the source location.

use std::fmt::{self, Write as _};
use std::io::{self, Write as _};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    const ALL: [Level; 5] = [
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    fn from_u8(raw: u8) -> Self {
        Self::ALL
            .into_iter()
            .find(|level| *level as u8 == raw)
            .unwrap_or(Self::Info)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_uppercase();
        if wanted == "WARNING" {
            return Ok(Self::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("invalid log level '{raw}'"))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Text = 0,
    Json = 1,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("invalid log format '{raw}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LogConfig {
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Text,
            timestamps: true,
        }
    }
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static JSON_OUTPUT: AtomicBool = AtomicBool::new(false);
static TIMESTAMPS: AtomicBool = AtomicBool::new(true);

pub fn init(config: LogConfig) {
    MAX_LEVEL.store(config.level as u8, Ordering::Relaxed);
    JSON_OUTPUT.store(config.format == Format::Json, Ordering::Relaxed);
    TIMESTAMPS.store(config.timestamps, Ordering::Relaxed);
}

/// The configuration currently in effect.
pub fn current() -> LogConfig {
    LogConfig {
        level: Level::from_u8(MAX_LEVEL.load(Ordering::Relaxed)),
        format: if JSON_OUTPUT.load(Ordering::Relaxed) {
            Format::Json
        } else {
            Format::Text
        },
        timestamps: TIMESTAMPS.load(Ordering::Relaxed),
    }
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Entry point of the `log_*!` macros.
pub fn log(
    level: Level,
    target: &'static str,
    file: &'static str,
    line: u32,
    args: fmt::Arguments<'_>,
) {
    if !enabled(level) {
        return;
    }
    let record = Record {
        level,
        target,
        file,
        line,
        since_epoch: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default(),
    };
    let rendered = record.render(&current(), args);
    let _ = writeln!(io::stderr().lock(), "{rendered}");
}

struct Record {
    level: Level,
    target: &'static str,
    file: &'static str,
    line: u32,
    since_epoch: Duration,
}

impl Record {
    fn render(&self, config: &LogConfig, args: fmt::Arguments<'_>) -> String {
        match config.format {
            Format::Text => {
                let mut out = String::new();
                if config.timestamps {
                    push_rfc3339(&mut out, self.since_epoch);
                    out.push(' ');
                }
                let _ = write!(out, "{} {}: {args}", self.level, self.target);
                out
            }
            Format::Json => json!({
                "ts_ms": u64::try_from(self.since_epoch.as_millis()).unwrap_or(u64::MAX),
                "level": self.level.as_str(),
                "target": self.target,
                "file": self.file,
                "line": self.line,
                "msg": args.to_string(),
            })
            .to_string(),
        }
    }
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if $crate::enabled($level) {
            $crate::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Error, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { $crate::log_at!($crate::Level::Trace, $($arg)*) };
}

/// Appends `YYYY-MM-DDTHH:MM:SS.mmmZ` (UTC).
fn push_rfc3339(out: &mut String, since_epoch: Duration) {
    let secs = since_epoch.as_secs();
    let (year, month, day) = date_from_epoch_days((secs / 86_400) as i64);
    let clock = secs % 86_400;
    let _ = write!(
        out,
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        clock / 3600,
        clock % 3600 / 60,
        clock % 60,
        since_epoch.subsec_millis()
    );
}

/// Proleptic Gregorian date of a day count since 1970-01-01, using 400-year
/// eras that start on March 1st.
fn date_from_epoch_days(days: i64) -> (i32, u32, u32) {
    let shifted = days + 719_468;
    let era = shifted.div_euclid(146_097);
    let day_of_era = shifted.rem_euclid(146_097) as u32;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_index + 2) / 5 + 1;
    let month = if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    };
    let year = year_of_era as i64 + era * 400 + i64::from(month <= 2);
    (year as i32, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: Level, secs: u64) -> Record {
        Record {
            level,
            target: "resync::sync",
            file: "src/sync.rs",
            line: 42,
            since_epoch: Duration::from_millis(secs * 1000 + 7),
        }
    }

    fn config(format: Format, timestamps: bool) -> LogConfig {
        LogConfig {
            level: Level::Trace,
            format,
            timestamps,
        }
    }

    #[test]
    fn parse_level() {
        assert_eq!("info".parse::<Level>(), Ok(Level::Info));
        assert_eq!("WARN".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("warning".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" trace ".parse::<Level>(), Ok(Level::Trace));
        assert!("nope".parse::<Level>().is_err());
    }

    #[test]
    fn parse_format() {
        assert_eq!("text".parse::<Format>(), Ok(Format::Text));
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn level_round_trips_through_atomic_repr() {
        for level in Level::ALL {
            assert_eq!(Level::from_u8(level as u8), level);
        }
    }

    #[test]
    fn text_line_has_timestamp_level_and_target() {
        let line = record(Level::Warn, 86_400).render(
            &config(Format::Text, true),
            format_args!("block #{}", 7),
        );
        assert_eq!(line, "1970-01-02T00:00:00.007Z WARN resync::sync: block #7");

        let bare = record(Level::Info, 0).render(&config(Format::Text, false), format_args!("hello"));
        assert_eq!(bare, "INFO resync::sync: hello");
    }

    #[test]
    fn json_line_carries_fields() {
        let line = record(Level::Error, 1).render(
            &config(Format::Json, true),
            format_args!("missing input {}", "ab"),
        );
        let value: serde_json::Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["level"], "ERROR");
        assert_eq!(value["ts_ms"], 1007);
        assert_eq!(value["line"], 42);
        assert_eq!(value["msg"], "missing input ab");
    }

    #[test]
    fn calendar_dates() {
        assert_eq!(date_from_epoch_days(0), (1970, 1, 1));
        assert_eq!(date_from_epoch_days(11_017), (2000, 3, 1));
        assert_eq!(date_from_epoch_days(19_783), (2024, 3, 1));
        assert_eq!(date_from_epoch_days(-1), (1969, 12, 31));
    }
}

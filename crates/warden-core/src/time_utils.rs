use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Source of wall-clock time for audit stamping.
pub trait WallClock: Send + Sync {
    fn now_local(&self) -> DateTime<Local>;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Always reports the same instant. Used by tests that need two events to land
/// in the same second.
#[derive(Debug, Clone, Copy)]
pub struct FixedWallClock {
    instant: DateTime<Local>,
}

impl FixedWallClock {
    pub fn new(instant: DateTime<Local>) -> Self {
        Self { instant }
    }

    /// Builds a clock pinned at `unix_seconds`; falls back to the epoch when the
    /// value is not representable in the local zone.
    pub fn at_unix_seconds(unix_seconds: i64) -> Self {
        let instant = Local
            .timestamp_opt(unix_seconds, 0)
            .single()
            .unwrap_or_else(|| DateTime::<Local>::from(DateTime::<Utc>::UNIX_EPOCH));
        Self { instant }
    }
}

impl WallClock for FixedWallClock {
    fn now_local(&self) -> DateTime<Local> {
        self.instant
    }
}

/// Epoch second plus the local calendar fields derived from the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarStamp {
    pub epoch_time: i64,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
}

impl CalendarStamp {
    pub fn from_local(instant: DateTime<Local>) -> Self {
        Self {
            epoch_time: instant.timestamp(),
            year: instant.year(),
            month: instant.month() as i32,
            day: instant.day() as i32,
            hour: instant.hour() as i32,
        }
    }

    pub fn now(clock: &dyn WallClock) -> Self {
        Self::from_local(clock.now_local())
    }
}

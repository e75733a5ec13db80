use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Storage format for calendar days.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Prefix shared by every synthetic status id. Persisted ids are UUIDs and
/// never start with it.
pub const SYNTHETIC_STATUS_PREFIX: &str = "temp-";

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_NAME_LEN: usize = 2;
pub const MAX_TITLE_LEN: usize = 200;

/// Widest calendar window served, in days. Also bounds how far before today a
/// window may start, since empty routines are filled from the start to today.
pub const MAX_WINDOW_DAYS: i64 = 3 * 366;

/// Render a day in its canonical wire form, midnight UTC with milliseconds.
/// This string is the equality key for "same day".
#[must_use]
pub fn canonical_day(day: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", day.format(DAY_FORMAT))
}

/// Parse a day from `YYYY-MM-DD` or any RFC 3339 timestamp. Timestamps are
/// normalized to their UTC calendar day.
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(day) = NaiveDate::parse_from_str(s, DAY_FORMAT) {
        return Ok(day);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| anyhow!("Invalid date '{s}'. Use YYYY-MM-DD or an RFC 3339 timestamp"))
}

/// Current instant formatted the way every stored timestamp is.
#[must_use]
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

#[must_use]
pub fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter writing days as [`canonical_day`] and reading anything
/// [`parse_day`] accepts.
pub mod day_serde {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::canonical_day(*day))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_day(&raw).map_err(serde::de::Error::custom)
    }
}

// --- Routines ---

/// Server-side routine as listed to its owner. `completed` reflects today's
/// status and is false when no status exists for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// One day's completion record for one routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineStatus {
    pub id: String,
    #[serde(default)]
    pub routine_id: String,
    #[serde(with = "day_serde")]
    pub date: NaiveDate,
    pub completed: bool,
}

impl RoutineStatus {
    /// Stand-in for a day without a stored record. Never persisted.
    #[must_use]
    pub fn synthetic(routine_id: &str, day: NaiveDate) -> Self {
        Self {
            id: synthetic_status_id(routine_id, day),
            routine_id: routine_id.to_string(),
            date: day,
            completed: false,
        }
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with(SYNTHETIC_STATUS_PREFIX)
    }
}

#[must_use]
pub fn synthetic_status_id(routine_id: &str, day: NaiveDate) -> String {
    format!("{SYNTHETIC_STATUS_PREFIX}{routine_id}-{}", canonical_day(day))
}

/// A routine with the statuses recorded inside a calendar window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarRoutine {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub statuses: Vec<RoutineStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationDate {
    pub id: String,
    pub created_at: String,
}

/// Inclusive date range requested by a calendar view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CalendarWindow {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Render-ready calendar entry, one per routine per day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    pub title: String,
    pub date: String,
    pub background_color: String,
    pub border_color: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoutine {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateRoutine {
    pub title: String,
    pub url: Option<String>,
}

// --- Local (device) routines ---

/// A routine kept in device storage before it exists on the server.
/// Deserialization doubles as the shape check: a record with a missing field
/// or an unparseable `createdAt` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRoutine {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl LocalRoutine {
    /// New unchecked routine with a time-based id.
    #[must_use]
    pub fn new(text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: now.timestamp_millis().to_string(),
            text: text.trim().to_string(),
            completed: false,
            created_at: now,
        }
    }
}

// --- Accounts ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

// --- Validation ---

/// Trim a routine title and reject blank or oversized ones.
pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        bail!("Title is required");
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        bail!("Title must be at most {MAX_TITLE_LEN} characters");
    }
    Ok(trimmed.to_string())
}

/// Blank URLs are treated as absent.
#[must_use]
pub fn normalize_url(url: Option<&str>) -> Option<String> {
    url.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(ToString::to_string)
}

/// Accepts `local@domain.tld` with no whitespace and exactly one `@`.
pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        bail!("Invalid email format");
    }
    Ok(email.to_lowercase())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("Password must be at least {MIN_PASSWORD_LEN} characters long");
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.chars().count() < MIN_NAME_LEN {
        bail!("Name must be at least {MIN_NAME_LEN} characters long");
    }
    Ok(name.to_string())
}

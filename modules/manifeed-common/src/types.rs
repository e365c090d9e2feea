use serde::{Deserialize, Serialize};

/// Per-company fetch policy carried in job payloads.
///
/// `Blocked` feeds are never fetched, `Default` feeds get plain conditional
/// requests, `Browser` feeds get a browser-like header set with
/// Host/Origin/Referer derived from the company host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FetchProtection {
    Blocked,
    Default,
    Browser,
}

impl FetchProtection {
    pub fn as_u8(self) -> u8 {
        self.into()
    }

    pub fn as_i16(self) -> i16 {
        self.as_u8() as i16
    }

    /// Clamp an arbitrary integer into the valid range, the way catalog
    /// inputs are coerced.
    pub fn clamped(value: i64) -> Self {
        match value {
            i64::MIN..=0 => FetchProtection::Blocked,
            1 => FetchProtection::Default,
            _ => FetchProtection::Browser,
        }
    }
}

impl Default for FetchProtection {
    fn default() -> Self {
        FetchProtection::Default
    }
}

impl TryFrom<u8> for FetchProtection {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FetchProtection::Blocked),
            1 => Ok(FetchProtection::Default),
            2 => Ok(FetchProtection::Browser),
            other => Err(format!("fetchprotection out of range: {other}")),
        }
    }
}

impl From<FetchProtection> for u8 {
    fn from(value: FetchProtection) -> Self {
        match value {
            FetchProtection::Blocked => 0,
            FetchProtection::Default => 1,
            FetchProtection::Browser => 2,
        }
    }
}

/// Outcome of one feed in one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    NotModified,
    Error,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::NotModified => "not_modified",
            ResultStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "not_modified" => Ok(Self::NotModified),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown ResultStatus: {other}")),
        }
    }
}

/// Aggregate lifecycle of a scrape job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown JobStatus: {other}")),
        }
    }
}

/// Which result stream a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Check,
    Ingest,
    Error,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueKind::Check => "check",
            QueueKind::Ingest => "ingest",
            QueueKind::Error => "error",
        }
    }

    /// Map a result stream name back to its kind. Unknown streams are
    /// treated as error results.
    pub fn from_stream(stream: &str) -> Self {
        match stream {
            crate::bus::CHECK_RESULTS_STREAM => QueueKind::Check,
            crate::bus::INGEST_RESULTS_STREAM => QueueKind::Ingest,
            _ => QueueKind::Error,
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

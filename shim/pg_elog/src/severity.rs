//! PostgreSQL `elevel` constants.
//!
//! The shim never acts on the level; it is decoded so trace events can name
//! it. The numbering follows `utils/elog.h` from PostgreSQL 16.

use std::fmt;

/// Importance class of a report, as passed to `errstart`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    Debug1,
    Log,
    /// Also known as `COMMERROR`.
    LogServerOnly,
    Info,
    Notice,
    Warning,
    WarningClientOnly,
    Error,
    Fatal,
    Panic,
}

impl Severity {
    /// Decode a raw `elevel`. Unknown values yield `None`.
    pub fn from_elevel(elevel: i32) -> Option<Self> {
        Some(match elevel {
            10 => Self::Debug5,
            11 => Self::Debug4,
            12 => Self::Debug3,
            13 => Self::Debug2,
            14 => Self::Debug1,
            15 => Self::Log,
            16 => Self::LogServerOnly,
            17 => Self::Info,
            18 => Self::Notice,
            19 => Self::Warning,
            20 => Self::WarningClientOnly,
            21 => Self::Error,
            22 => Self::Fatal,
            23 => Self::Panic,
            _ => return None,
        })
    }

    pub fn elevel(self) -> i32 {
        match self {
            Self::Debug5 => 10,
            Self::Debug4 => 11,
            Self::Debug3 => 12,
            Self::Debug2 => 13,
            Self::Debug1 => 14,
            Self::Log => 15,
            Self::LogServerOnly => 16,
            Self::Info => 17,
            Self::Notice => 18,
            Self::Warning => 19,
            Self::WarningClientOnly => 20,
            Self::Error => 21,
            Self::Fatal => 22,
            Self::Panic => 23,
        }
    }

    /// The macro name used in C sources, e.g. `"WARNING"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug5 => "DEBUG5",
            Self::Debug4 => "DEBUG4",
            Self::Debug3 => "DEBUG3",
            Self::Debug2 => "DEBUG2",
            Self::Debug1 => "DEBUG1",
            Self::Log => "LOG",
            Self::LogServerOnly => "LOG_SERVER_ONLY",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::WarningClientOnly => "WARNING_CLIENT_ONLY",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
        }
    }

    /// Levels at or above `ERROR` abort the current transaction in PostgreSQL.
    pub fn is_error(self) -> bool {
        self >= Self::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

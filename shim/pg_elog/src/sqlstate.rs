//! SQLSTATE codes in PostgreSQL's packed integer form.
//!
//! `errcode()` receives the five-character SQLSTATE packed six bits per
//! character, first character in the lowest bits (`MAKE_SQLSTATE`).

use std::fmt;

use thiserror::Error;

/// Error from building a [`SqlState`] out of text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SqlStateError {
    #[error("SQLSTATE must be 5 characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid SQLSTATE character '{0}' (expected 0-9 or A-Z)")]
    InvalidCharacter(char),
}

/// A packed SQLSTATE.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SqlState(i32);

impl SqlState {
    /// `22012`, division by zero.
    pub const DIVISION_BY_ZERO: SqlState = SqlState::pack(*b"22012");
    /// `XX000`, the default code of `elog(ERROR, ...)`.
    pub const INTERNAL_ERROR: SqlState = SqlState::pack(*b"XX000");

    /// Wrap an already packed value, as received by `errcode`.
    pub const fn from_raw(raw: i32) -> Self {
        SqlState(raw)
    }

    /// Pack a textual code such as `"42P01"`.
    pub fn from_code(code: &str) -> Result<Self, SqlStateError> {
        let bytes: [u8; 5] = code
            .as_bytes()
            .try_into()
            .map_err(|_| SqlStateError::InvalidLength(code.chars().count()))?;
        if let Some(bad) = bytes
            .iter()
            .find(|b| !(b.is_ascii_digit() || b.is_ascii_uppercase()))
        {
            return Err(SqlStateError::InvalidCharacter(char::from(*bad)));
        }
        Ok(Self::pack(bytes))
    }

    #[allow(clippy::cast_lossless, reason = "From is not const")]
    const fn pack(chars: [u8; 5]) -> Self {
        let mut raw = 0i32;
        let mut i = 0;
        while i < 5 {
            raw += ((chars[i].wrapping_sub(b'0') & 0x3F) as i32) << (6 * i);
            i += 1;
        }
        SqlState(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Unpack into the five code characters.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is masked to six bits first"
    )]
    pub fn chars(self) -> [u8; 5] {
        let mut out = [0u8; 5];
        let mut raw = self.0;
        for slot in &mut out {
            *slot = ((raw & 0x3F) as u8) + b'0';
            raw >>= 6;
        }
        out
    }

    /// The two-character class, e.g. `"22"` for data exceptions.
    pub fn class(self) -> [u8; 2] {
        let chars = self.chars();
        [chars[0], chars[1]]
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.chars() {
            fmt::Write::write_char(f, char::from(c))?;
        }
        Ok(())
    }
}

impl fmt::Debug for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SqlState({self})")
    }
}

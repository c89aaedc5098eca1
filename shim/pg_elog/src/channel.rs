//! The error channel behind `errstart` / `errmsg` / `errfinish`.
//!
//! An [`ErrorChannel`] holds the most recent error message of one report.
//! `begin` empties it, `record` overwrites it, and `finish` prints it as a
//! single `Postgres ERROR: <message>` line when it is non-empty. `finish`
//! leaves the message in place, so a second `finish` without a `begin`
//! reports the same text again.

use std::fmt;
use std::io::{self, Write};

use crate::message::{MessageBuf, MESSAGE_CAPACITY};
use crate::severity::Severity;
use crate::sqlstate::SqlState;
use crate::template::{ArgSource, Template, TemplateError};

/// Prefix of every emitted diagnostic line.
pub const DIAGNOSTIC_LABEL: &str = "Postgres ERROR: ";

/// Where a report was raised, as passed to `errstart`.
///
/// Every field is a label for tracing only; nothing is validated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorSite<'a> {
    pub elevel: i32,
    pub filename: Option<&'a str>,
    pub lineno: i32,
    pub funcname: Option<&'a str>,
    pub domain: Option<&'a str>,
}

impl ErrorSite<'_> {
    pub fn severity(&self) -> Option<Severity> {
        Severity::from_elevel(self.elevel)
    }
}

/// Buffers one error message and prints it on `finish`.
pub struct ErrorChannel<W: Write = io::Stderr> {
    message: MessageBuf<MESSAGE_CAPACITY>,
    saved_errno: i32,
    sql_state: Option<SqlState>,
    label: &'static str,
    out: W,
}

impl ErrorChannel<io::Stderr> {
    /// A channel that reports to the process's standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl Default for ErrorChannel<io::Stderr> {
    fn default() -> Self {
        Self::stderr()
    }
}

impl<W: Write> ErrorChannel<W> {
    pub fn new(out: W) -> Self {
        ErrorChannel {
            message: MessageBuf::new(),
            saved_errno: 0,
            sql_state: None,
            label: DIAGNOSTIC_LABEL,
            out,
        }
    }

    /// Replace the `Postgres ERROR: ` prefix.
    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Start a report, capturing the calling thread's current `errno`.
    ///
    /// Always returns `true`: the report is never skipped.
    pub fn begin(&mut self, site: &ErrorSite<'_>) -> bool {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        self.begin_with_errno(site, errno)
    }

    /// Start a report with an `errno` the caller captured earlier.
    pub fn begin_with_errno(&mut self, site: &ErrorSite<'_>, errno: i32) -> bool {
        self.message.clear();
        self.saved_errno = errno;
        self.sql_state = None;
        tracing::debug!(
            elevel = site.elevel,
            severity = site.severity().map_or("unknown", Severity::as_str),
            filename = site.filename,
            lineno = site.lineno,
            funcname = site.funcname,
            domain = site.domain,
            "error report started"
        );
        true
    }

    /// Overwrite the message with Rust-formatted text.
    pub fn record(&mut self, args: fmt::Arguments<'_>) {
        self.message.clear();
        // MessageBuf truncates instead of failing.
        let _ = fmt::Write::write_fmt(&mut self.message, args);
        self.note_truncation();
    }

    /// Overwrite the message by rendering a printf-style template.
    ///
    /// A `None` template leaves the message empty. A template that fails to
    /// parse or render leaves its own unexpanded text as the message, so the
    /// report still says something, and the error is returned.
    pub fn record_printf<'a, S>(
        &mut self,
        template: Option<&[u8]>,
        args: &mut S,
    ) -> Result<(), TemplateError>
    where
        S: ArgSource<'a> + ?Sized,
    {
        self.message.clear();
        let Some(source) = template else {
            tracing::debug!("null message template ignored");
            return Ok(());
        };

        let errno = self.saved_errno;
        let result = Template::parse(source)
            .and_then(|template| template.render(args, errno, &mut self.message));
        if let Err(err) = &result {
            tracing::warn!(
                error = %err,
                template = %String::from_utf8_lossy(source),
                "message template rejected, keeping it unexpanded"
            );
            self.message.set(source);
        }
        self.note_truncation();
        result
    }

    /// Print the message if there is one. Returns whether a line was written.
    ///
    /// The message is kept; only `begin` clears it.
    pub fn finish(&mut self) -> bool {
        if self.message.is_empty() {
            tracing::trace!("error report finished without a message");
            return false;
        }

        let body = self.message.as_bytes();
        let mut line = Vec::with_capacity(self.label.len() + body.len() + 1);
        line.extend_from_slice(self.label.as_bytes());
        line.extend_from_slice(body);
        line.push(b'\n');

        // One write per line keeps concurrent reporters from interleaving.
        if let Err(err) = self.out.write_all(&line).and_then(|()| self.out.flush()) {
            tracing::warn!(error = %err, "failed to write error report");
        }
        tracing::debug!(sql_state = ?self.sql_state, "error report finished");
        true
    }

    /// Remember the SQLSTATE passed to `errcode` for this report.
    pub fn set_sql_state(&mut self, state: SqlState) {
        self.sql_state = Some(state);
    }

    pub fn sql_state(&self) -> Option<SqlState> {
        self.sql_state
    }

    pub fn message(&self) -> &MessageBuf<MESSAGE_CAPACITY> {
        &self.message
    }

    /// The `errno` captured by the last `begin`.
    pub fn saved_errno(&self) -> i32 {
        self.saved_errno
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    fn note_truncation(&self) {
        if self.message.was_truncated() {
            tracing::debug!(capacity = MESSAGE_CAPACITY, "error message truncated");
        }
    }
}

impl<W: Write> fmt::Debug for ErrorChannel<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("message", &self.message)
            .field("saved_errno", &self.saved_errno)
            .field("sql_state", &self.sql_state)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;

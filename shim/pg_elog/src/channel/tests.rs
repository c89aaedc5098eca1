//! Tests for the begin / record / finish cycle.

#![allow(
    clippy::unwrap_used,
    reason = "test code uses unwrap for concise assertions"
)]

use std::io;

use pretty_assertions::assert_eq;

use super::*;
use crate::template::{Arg, NoArgs, SliceArgs};

fn site() -> ErrorSite<'static> {
    ErrorSite {
        elevel: 21,
        filename: Some("uuid-ossp.c"),
        lineno: 42,
        funcname: Some("uuid_generate_internal"),
        domain: Some("uuid-ossp"),
    }
}

fn channel() -> ErrorChannel<Vec<u8>> {
    ErrorChannel::new(Vec::new())
}

fn output(channel: &ErrorChannel<Vec<u8>>) -> String {
    String::from_utf8(channel.writer().clone()).unwrap()
}

fn record(channel: &mut ErrorChannel<Vec<u8>>, template: &str, args: &[Arg<'_>]) {
    channel
        .record_printf(Some(template.as_bytes()), &mut SliceArgs::new(args))
        .unwrap();
}

#[test]
fn begin_always_continues() {
    let mut ch = channel();
    assert!(ch.begin(&site()));
    assert!(ch.begin(&ErrorSite::default()));
}

#[test]
fn formatted_message_is_reported() {
    let mut ch = channel();
    ch.begin(&site());
    record(&mut ch, "failed: %s", &["disk full".into()]);
    assert!(ch.finish());
    assert_eq!(output(&ch), "Postgres ERROR: failed: disk full\n");
}

#[test]
fn finish_without_message_is_silent() {
    let mut ch = channel();
    ch.begin(&site());
    assert!(!ch.finish());
    assert_eq!(output(&ch), "");
}

#[test]
fn record_overwrites_instead_of_appending() {
    let mut ch = channel();
    ch.begin(&site());
    record(&mut ch, "x=%d", &[5.into()]);
    record(&mut ch, "x=%d", &[42.into()]);
    assert_eq!(ch.message().to_string_lossy(), "x=42");
    ch.finish();
    assert_eq!(output(&ch), "Postgres ERROR: x=42\n");
}

#[test]
fn oversized_message_is_truncated_at_capacity() {
    let long = "a".repeat(600);
    let mut ch = channel();
    ch.begin(&site());
    record(&mut ch, "%s", &[long.as_str().into()]);

    assert_eq!(ch.message().len(), MESSAGE_CAPACITY - 1);
    assert!(ch.message().was_truncated());
    assert_eq!(
        ch.message().as_c_str().to_bytes_with_nul().last(),
        Some(&0)
    );

    ch.finish();
    let expected = format!("Postgres ERROR: {}\n", "a".repeat(MESSAGE_CAPACITY - 1));
    assert_eq!(output(&ch), expected);
}

#[test]
fn begin_clears_previous_message() {
    let mut ch = channel();
    ch.begin(&site());
    record(&mut ch, "stale", &[]);
    ch.begin(&site());
    assert!(ch.message().is_empty());
    assert!(!ch.finish());
    assert_eq!(output(&ch), "");
}

#[test]
fn finish_keeps_the_message() {
    let mut ch = channel();
    ch.begin(&site());
    record(&mut ch, "once", &[]);
    assert!(ch.finish());
    assert!(ch.finish());
    assert_eq!(ch.message().to_string_lossy(), "once");
    assert_eq!(output(&ch), "Postgres ERROR: once\nPostgres ERROR: once\n");
}

#[test]
fn record_without_begin_still_reports() {
    let mut ch = channel();
    record(&mut ch, "early", &[]);
    assert!(ch.finish());
    assert_eq!(output(&ch), "Postgres ERROR: early\n");
}

#[test]
fn null_template_leaves_message_empty() {
    let mut ch = channel();
    ch.begin(&site());
    record(&mut ch, "previous", &[]);
    assert!(ch.record_printf(None, &mut NoArgs).is_ok());
    assert!(ch.message().is_empty());
    assert!(!ch.finish());
}

#[test]
fn rejected_template_is_kept_verbatim() {
    let mut ch = channel();
    ch.begin(&site());
    let result = ch.record_printf(Some(&b"bad %n here"[..]), &mut NoArgs);
    assert!(matches!(result, Err(TemplateError::WriteBack { offset: 4 })));
    assert_eq!(ch.message().to_string_lossy(), "bad %n here");
    ch.finish();
    assert_eq!(output(&ch), "Postgres ERROR: bad %n here\n");
}

#[test]
fn missing_arguments_keep_template_verbatim() {
    let mut ch = channel();
    ch.begin(&site());
    let result = ch.record_printf(Some(&b"x=%d y=%d"[..]), &mut SliceArgs::new(&[1.into()]));
    assert!(matches!(
        result,
        Err(TemplateError::MissingArgument { index: 1 })
    ));
    assert_eq!(ch.message().to_string_lossy(), "x=%d y=%d");
}

#[test]
fn rust_formatting_path() {
    let mut ch = channel();
    ch.begin(&site());
    ch.record(format_args!("{} + {} = {}", 1, 2, 1 + 2));
    ch.finish();
    assert_eq!(output(&ch), "Postgres ERROR: 1 + 2 = 3\n");
}

#[test]
fn rust_formatting_truncates_too() {
    let mut ch = channel();
    ch.record(format_args!("{:>1000}", "end"));
    assert_eq!(ch.message().len(), MESSAGE_CAPACITY - 1);
    assert!(ch.message().was_truncated());
}

#[test]
fn custom_label() {
    let mut ch = channel().with_label("ERROR:  ");
    assert_eq!(ch.label(), "ERROR:  ");
    ch.record(format_args!("relation does not exist"));
    ch.finish();
    assert_eq!(output(&ch), "ERROR:  relation does not exist\n");
}

#[test]
fn errno_is_captured_at_begin() {
    let mut ch = channel();
    ch.begin_with_errno(&site(), 2);
    assert_eq!(ch.saved_errno(), 2);
    record(&mut ch, "could not open file: %m", &[]);

    let expected = io::Error::from_raw_os_error(2).to_string();
    let expected = expected.split(" (os error").next().unwrap();
    assert_eq!(
        ch.message().to_string_lossy(),
        format!("could not open file: {expected}")
    );
}

#[test]
fn sql_state_resets_on_begin() {
    let mut ch = channel();
    ch.begin(&site());
    ch.set_sql_state(SqlState::DIVISION_BY_ZERO);
    assert_eq!(ch.sql_state(), Some(SqlState::DIVISION_BY_ZERO));
    ch.begin(&site());
    assert_eq!(ch.sql_state(), None);
}

#[test]
fn site_decodes_severity() {
    assert_eq!(site().severity(), Some(Severity::Error));
    assert_eq!(ErrorSite::default().severity(), None);
}

/// A writer whose every write fails.
struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

#[test]
fn write_failures_are_swallowed() {
    let mut ch = ErrorChannel::new(BrokenPipe);
    ch.begin(&site());
    ch.record(format_args!("lost"));
    assert!(ch.finish());
    assert_eq!(ch.message().to_string_lossy(), "lost");
}

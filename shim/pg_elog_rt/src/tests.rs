//! Tests for the exported entry points.
//!
//! `errmsg` and `errfinish` are called through their C-variadic signatures:
//! the C trampolines by default, the Rust definitions with `variadic`.
//! Every test thread has its own channel, so tests do not interfere.

#![allow(
    clippy::unwrap_used,
    reason = "test code uses unwrap for concise assertions"
)]

use std::cell::RefCell;
use std::ffi::{c_char, c_long, c_uint, c_ulonglong, c_void, CString};
use std::ptr;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::*;

const ERROR: c_int = 21;

/// A writer whose bytes stay readable after it is handed to the channel.
#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    fn install() -> Self {
        reset_channel();
        let capture = Capture::default();
        redirect_diagnostics(Box::new(capture.clone()));
        capture
    }

    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn start() -> c_int {
    errstart(
        ERROR,
        c"uuid-ossp.c".as_ptr(),
        120,
        c"uuid_generate_internal".as_ptr(),
        c"uuid-ossp".as_ptr(),
    )
}

#[cfg(not(feature = "variadic"))]
extern "C" {
    fn errmsg(fmt: *const c_char, ...) -> c_int;
    fn errfinish(dummy: c_int, ...) -> c_int;
}

fn message(fmt: *const c_char) -> c_int {
    // SAFETY: templates passed here take no arguments
    unsafe { errmsg(fmt) }
}

fn finish_report() -> c_int {
    // SAFETY: trailing arguments are never read
    unsafe { errfinish(0) }
}

#[test]
fn fixed_return_values() {
    let _capture = Capture::install();
    assert_eq!(start(), 1);
    assert_eq!(message(c"boom".as_ptr()), 0);
    assert_eq!(finish_report(), 0);
}

#[test]
fn report_is_printed_with_label() {
    let capture = Capture::install();
    start();
    message(c"could not generate UUID".as_ptr());
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: could not generate UUID\n");
}

#[test]
fn no_message_prints_nothing() {
    let capture = Capture::install();
    start();
    finish_report();
    assert_eq!(capture.text(), "");
    assert_eq!(last_message(), None);
}

#[test]
fn second_message_replaces_first() {
    let capture = Capture::install();
    start();
    message(c"first".as_ptr());
    message(c"second".as_ptr());
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: second\n");
}

#[test]
fn errstart_clears_stale_message() {
    let capture = Capture::install();
    start();
    message(c"stale".as_ptr());
    start();
    finish_report();
    assert_eq!(capture.text(), "");
}

#[test]
fn null_pointers_are_accepted() {
    let capture = Capture::install();
    assert_eq!(errstart(ERROR, ptr::null(), 0, ptr::null(), ptr::null()), 1);
    assert_eq!(message(ptr::null()), 0);
    assert_eq!(last_message(), None);
    finish_report();
    assert_eq!(capture.text(), "");
}

#[test]
fn percent_escape_needs_no_arguments() {
    let capture = Capture::install();
    start();
    message(c"100%% broken".as_ptr());
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: 100% broken\n");
}

#[test]
fn write_back_conversion_is_reported_verbatim() {
    let capture = Capture::install();
    start();
    message(c"count %n".as_ptr());
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: count %n\n");
}

#[test]
fn long_message_is_truncated() {
    let capture = Capture::install();
    let long = CString::new("b".repeat(600)).unwrap();
    start();
    message(long.as_ptr());
    finish_report();

    let line = capture.text();
    assert_eq!(line.len(), "Postgres ERROR: ".len() + 511 + 1);
    assert!(line.ends_with("b\n"));
}

#[test]
fn finish_twice_reports_twice() {
    let capture = Capture::install();
    start();
    message(c"again".as_ptr());
    finish_report();
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: again\nPostgres ERROR: again\n");
    assert_eq!(last_message().as_deref(), Some("again"));
}

#[test]
fn errcode_returns_its_argument() {
    let _capture = Capture::install();
    start();
    let code = SqlState::DIVISION_BY_ZERO.raw();
    assert_eq!(errcode(code), code);
    assert_eq!(errcode(0), 0);
    assert_eq!(errcode(-1), -1);
}

#[test]
fn reset_restores_a_clean_channel() {
    let capture = Capture::install();
    start();
    message(c"kept".as_ptr());
    reset_channel();
    assert_eq!(last_message(), None);
    finish_report();
    assert_eq!(capture.text(), "");
}

#[test]
fn threads_have_separate_channels() {
    let _capture = Capture::install();
    start();
    message(c"main thread".as_ptr());

    std::thread::spawn(|| {
        assert_eq!(last_message(), None);
        start();
        message(c"worker".as_ptr());
        assert_eq!(last_message().as_deref(), Some("worker"));
    })
    .join()
    .unwrap();

    assert_eq!(last_message().as_deref(), Some("main thread"));
}

// Formatting through the C calling convention

#[test]
fn formats_string_argument() {
    let capture = Capture::install();
    start();
    // SAFETY: one string for one %s
    unsafe { errmsg(c"failed: %s".as_ptr(), c"disk full".as_ptr()) };
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: failed: disk full\n");
}

#[test]
fn last_call_wins() {
    let capture = Capture::install();
    start();
    // SAFETY: one int per %d
    unsafe {
        errmsg(c"x=%d".as_ptr(), 5 as c_int);
        errmsg(c"x=%d".as_ptr(), 42 as c_int);
    }
    finish_report();
    assert_eq!(capture.text(), "Postgres ERROR: x=42\n");
}

#[test]
fn formats_mixed_arguments() {
    let _capture = Capture::install();
    start();
    // SAFETY: argument types follow the template
    unsafe {
        errmsg(
            c"%d/%u/%ld/%.2f/%c/%s".as_ptr(),
            -3 as c_int,
            7 as c_uint,
            1_000_000_000 as c_long,
            0.5f64,
            c_int::from(b'z'),
            ptr::null::<c_char>(),
        );
    }
    assert_eq!(
        last_message().as_deref(),
        Some("-3/7/1000000000/0.50/z/(null)")
    );
}

#[test]
fn formats_wide_and_star_arguments() {
    let _capture = Capture::install();
    start();
    // SAFETY: argument types follow the template
    unsafe {
        errmsg(
            c"[%*s|%llu|%zu|%p]".as_ptr(),
            5 as c_int,
            c"ab".as_ptr(),
            u64::MAX as c_ulonglong,
            42usize,
            ptr::null::<c_void>(),
        );
    }
    assert_eq!(
        last_message().as_deref(),
        Some("[   ab|18446744073709551615|42|(nil)]")
    );
}

#[test]
fn long_argument_is_truncated() {
    let capture = Capture::install();
    let long = CString::new("a".repeat(600)).unwrap();
    start();
    // SAFETY: one string for one %s
    unsafe { errmsg(c"%s".as_ptr(), long.as_ptr()) };
    finish_report();

    let expected = format!("Postgres ERROR: {}\n", "a".repeat(511));
    assert_eq!(capture.text(), expected);
}

#[test]
fn errno_is_expanded_by_percent_m() {
    let _capture = Capture::install();
    start();
    // SAFETY: %m takes no argument
    unsafe { errmsg(c"could not open: %m".as_ptr()) };
    let message = last_message().unwrap();
    assert!(message.starts_with("could not open: "));
    assert!(!message.contains("%m"));
}

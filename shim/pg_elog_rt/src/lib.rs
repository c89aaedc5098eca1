//! C-ABI error reporting entry points (`libpg_elog_rt`)
//!
//! Native extension code compiled against PostgreSQL headers expands
//! `ereport(ERROR, (errmsg(...)))` into calls to the functions exported
//! here. Outside a real server there is no error stack and no `longjmp`:
//! the message is buffered and printed to stderr as
//! `Postgres ERROR: <message>`, and control returns to the caller.
//!
//! # Build Modes
//!
//! - **rlib**: for Rust consumers and the tests in this crate
//! - **staticlib**: for linking into C objects, C trampolines included
//!
//! # Exports
//!
//! - `errstart`: begin a report, always returns 1
//! - `errmsg`: record the message, always returns 0
//! - `errfinish`: print the message, always returns 0
//! - `errcode`: record the SQLSTATE, returns its argument
//!
//! # Variadics
//!
//! Stable Rust cannot define a C-variadic function. By default `errmsg` and
//! `errfinish` are small C trampolines (`csrc/va_shim.c`, built by
//! `build.rs`) that start the `va_list` and call back into
//! `pg_elog_errmsg_va` / `pg_elog_errfinish`; arguments are then read one C
//! type at a time through the readers in the `va` module. With the `variadic` cargo
//! feature (nightly `c_variadic`) both are defined here in Rust instead.
//!
//! # State
//!
//! Each thread has its own channel, so concurrent reporters never share a
//! buffer.

#![cfg_attr(feature = "variadic", feature(c_variadic))]
#![warn(clippy::allow_attributes_without_reason)]
#![allow(
    unsafe_code,
    reason = "C-ABI entry points read raw pointers from C callers"
)]
#![allow(
    clippy::not_unsafe_ptr_arg_deref,
    reason = "FFI entry points receive C strings that the caller guarantees are valid or null"
)]

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CStr};
use std::io::{self, Write};

use pg_elog::{ErrorChannel, ErrorSite, SqlState};

#[cfg(not(feature = "variadic"))]
mod va;

type Channel = ErrorChannel<Box<dyn Write>>;

fn stderr_channel() -> Channel {
    let out: Box<dyn Write> = Box::new(io::stderr());
    ErrorChannel::new(out)
}

thread_local! {
    static CHANNEL: RefCell<Channel> = RefCell::new(stderr_channel());
}

/// Run `f` on this thread's channel.
///
/// Returns `None` when the channel is unavailable: during thread teardown,
/// or when a report is re-entered from inside the channel itself. Panicking
/// here would abort the C caller.
fn with_channel<R>(f: impl FnOnce(&mut Channel) -> R) -> Option<R> {
    let result = CHANNEL.try_with(|cell| {
        let Ok(mut channel) = cell.try_borrow_mut() else {
            return None;
        };
        Some(f(&mut channel))
    });
    let out = result.ok().flatten();
    if out.is_none() {
        tracing::warn!("error channel unavailable, report dropped");
    }
    out
}

/// Borrow a C string, treating null as absent.
fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null pointers from C callers point to NUL-terminated strings
    Some(unsafe { CStr::from_ptr(ptr) })
}

/// Borrow a C string as UTF-8 text for tracing labels.
fn c_text<'a>(ptr: *const c_char) -> Option<&'a str> {
    c_str(ptr).and_then(|s| s.to_str().ok())
}

/// Begin an error report.
///
/// Clears the message left by the previous report and captures `errno` for
/// `%m`. Always returns 1: the report always proceeds.
#[no_mangle]
pub extern "C" fn errstart(
    elevel: c_int,
    filename: *const c_char,
    lineno: c_int,
    funcname: *const c_char,
    domain: *const c_char,
) -> c_int {
    // Before anything else can overwrite it.
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    pg_elog::init_tracing();

    let site = ErrorSite {
        elevel,
        filename: c_text(filename),
        lineno,
        funcname: c_text(funcname),
        domain: c_text(domain),
    };
    with_channel(|channel| channel.begin_with_errno(&site, errno));
    1
}

/// Record the report's message from a `printf`-style template.
///
/// The message is replaced, never appended, and truncated to 511 bytes.
/// A null template leaves it empty. Always returns 0.
///
/// # Safety
///
/// The variadic arguments must match the conversions in `fmt`, as for
/// `printf`. `%s` arguments must be null or NUL-terminated.
#[cfg(feature = "variadic")]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    reason = "size_t and pointer arguments are reinterpreted at C width"
)]
#[no_mangle]
pub unsafe extern "C" fn errmsg(fmt: *const c_char, mut args: ...) -> c_int {
    use pg_elog::template::Length;
    use pg_elog::{Arg, ArgKind, FnArgs};
    use std::ffi::{c_long, c_longlong, c_uint, c_ulong, c_ulonglong, c_void};

    let template = c_str(fmt).map(CStr::to_bytes);
    // The template is validated before the first argument is read, and each
    // argument is read with the C type the conversion names.
    let mut source = FnArgs(|kind| {
        // SAFETY: the caller passed arguments matching the validated template
        let arg = unsafe {
            match kind {
                ArgKind::Int(Length::Long) => Arg::Int(args.arg::<c_long>().into()),
                ArgKind::Int(Length::LongLong | Length::IntMax) => {
                    Arg::Int(args.arg::<c_longlong>())
                }
                ArgKind::Int(Length::Size | Length::PtrDiff) => {
                    Arg::Int(args.arg::<isize>() as i64)
                }
                // char and short are promoted to int
                ArgKind::Int(_) => Arg::Int(args.arg::<c_int>().into()),
                ArgKind::Uint(Length::Long) => Arg::Uint(args.arg::<c_ulong>().into()),
                ArgKind::Uint(Length::LongLong | Length::IntMax) => {
                    Arg::Uint(args.arg::<c_ulonglong>())
                }
                ArgKind::Uint(Length::Size | Length::PtrDiff) => {
                    Arg::Uint(args.arg::<usize>() as u64)
                }
                ArgKind::Uint(_) => Arg::Uint(args.arg::<c_uint>().into()),
                ArgKind::Double => Arg::Double(args.arg::<f64>()),
                ArgKind::Char => Arg::Int(args.arg::<c_int>().into()),
                ArgKind::Str => {
                    let ptr = args.arg::<*const c_char>();
                    Arg::Str(c_str(ptr).map(CStr::to_bytes))
                }
                ArgKind::Ptr => Arg::Ptr(args.arg::<*const c_void>() as usize),
            }
        };
        Some(arg)
    });

    // Rejected templates are logged by the channel and reported unexpanded.
    with_channel(|channel| channel.record_printf(template, &mut source));
    0
}

/// Record the report's message from the `va_list` that the C `errmsg`
/// trampoline started. Always returns 0.
///
/// Only `csrc/va_shim.c` calls this; `args` must point to its live
/// `va_list`.
#[cfg(not(feature = "variadic"))]
#[no_mangle]
pub extern "C" fn pg_elog_errmsg_va(fmt: *const c_char, args: *mut va::RawVaList) -> c_int {
    let template = c_str(fmt).map(CStr::to_bytes);
    // SAFETY: the trampoline keeps the va_list started until we return
    let mut source = unsafe { va::VaListArgs::new(args) };
    // Rejected templates are logged by the channel and reported unexpanded.
    with_channel(|channel| channel.record_printf(template, &mut source));
    0
}

/// Finish the report, printing `Postgres ERROR: <message>` if a message
/// was recorded. Always returns 0.
///
/// # Safety
///
/// Trailing arguments are ignored and may be anything.
#[cfg(feature = "variadic")]
#[no_mangle]
pub unsafe extern "C" fn errfinish(dummy: c_int, _args: ...) -> c_int {
    finish(dummy)
}

/// Body of the C `errfinish` trampoline.
#[cfg(not(feature = "variadic"))]
#[no_mangle]
pub extern "C" fn pg_elog_errfinish(dummy: c_int) -> c_int {
    finish(dummy)
}

fn finish(dummy: c_int) -> c_int {
    let emitted = with_channel(Channel::finish).unwrap_or(false);
    tracing::trace!(dummy, emitted, "errfinish");
    0
}

/// Record the SQLSTATE of the current report. Returns `sqlerrcode`.
#[no_mangle]
pub extern "C" fn errcode(sqlerrcode: c_int) -> c_int {
    let state = SqlState::from_raw(sqlerrcode);
    with_channel(|channel| channel.set_sql_state(state));
    tracing::debug!(sql_state = %state, "errcode");
    sqlerrcode
}

/// The current thread's buffered message, if non-empty.
#[must_use]
pub fn last_message() -> Option<String> {
    with_channel(|channel| {
        let message = channel.message();
        (!message.is_empty()).then(|| message.to_string_lossy().into_owned())
    })
    .flatten()
}

/// Send the current thread's reports to `out` instead of stderr.
pub fn redirect_diagnostics(out: Box<dyn Write>) {
    with_channel(|channel| *channel.writer_mut() = out);
}

/// Reset the current thread's channel: empty message, output to stderr.
pub fn reset_channel() {
    with_channel(|channel| *channel = stderr_channel());
}

#[cfg(test)]
mod tests;

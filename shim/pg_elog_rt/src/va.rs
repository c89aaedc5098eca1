//! Argument reading from a C `va_list` started by the trampolines in
//! `csrc/va_shim.c`.
//!
//! Rust only ever holds a pointer to the `va_list`; every `va_arg` happens
//! in C, through one reader per C type.

use std::ffi::{c_char, c_int, c_long, c_longlong, c_uint, c_ulong, c_ulonglong, c_void, CStr};

use pg_elog::template::Length;
use pg_elog::{Arg, ArgKind, ArgSource};

/// Opaque `va_list`, only handled by pointer.
#[repr(C)]
pub struct RawVaList {
    _private: [u8; 0],
}

extern "C" {
    fn pg_elog_va_int(ap: *mut RawVaList) -> c_int;
    fn pg_elog_va_uint(ap: *mut RawVaList) -> c_uint;
    fn pg_elog_va_long(ap: *mut RawVaList) -> c_long;
    fn pg_elog_va_ulong(ap: *mut RawVaList) -> c_ulong;
    fn pg_elog_va_llong(ap: *mut RawVaList) -> c_longlong;
    fn pg_elog_va_ullong(ap: *mut RawVaList) -> c_ulonglong;
    fn pg_elog_va_intmax(ap: *mut RawVaList) -> i64;
    fn pg_elog_va_uintmax(ap: *mut RawVaList) -> u64;
    fn pg_elog_va_size(ap: *mut RawVaList) -> usize;
    fn pg_elog_va_ptrdiff(ap: *mut RawVaList) -> isize;
    fn pg_elog_va_double(ap: *mut RawVaList) -> f64;
    fn pg_elog_va_ptr(ap: *mut RawVaList) -> *const c_void;
}

/// Reads arguments out of a live `va_list`.
///
/// A `va_list` cannot say when it runs out, so this source never returns
/// `None`; the template must already have been validated against the call.
pub struct VaListArgs {
    ap: *mut RawVaList,
}

impl VaListArgs {
    /// # Safety
    ///
    /// `ap` must point to a started `va_list` that stays alive, and is not
    /// read elsewhere, while this value is used.
    pub unsafe fn new(ap: *mut RawVaList) -> Self {
        VaListArgs { ap }
    }
}

impl<'a> ArgSource<'a> for VaListArgs {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap,
        reason = "size_t, ptrdiff_t and pointer arguments are reinterpreted at C width"
    )]
    fn next_arg(&mut self, kind: ArgKind) -> Option<Arg<'a>> {
        let ap = self.ap;
        // SAFETY: `new` requires a live va_list; each reader takes the C type
        // the conversion names, with char and short promoted to int.
        let arg = unsafe {
            match kind {
                ArgKind::Int(Length::Long) => Arg::Int(pg_elog_va_long(ap).into()),
                ArgKind::Int(Length::LongLong) => Arg::Int(pg_elog_va_llong(ap)),
                ArgKind::Int(Length::IntMax) => Arg::Int(pg_elog_va_intmax(ap)),
                ArgKind::Int(Length::Size) => Arg::Int(pg_elog_va_size(ap) as isize as i64),
                ArgKind::Int(Length::PtrDiff) => Arg::Int(pg_elog_va_ptrdiff(ap) as i64),
                ArgKind::Int(_) | ArgKind::Char => Arg::Int(pg_elog_va_int(ap).into()),
                ArgKind::Uint(Length::Long) => Arg::Uint(pg_elog_va_ulong(ap).into()),
                ArgKind::Uint(Length::LongLong) => Arg::Uint(pg_elog_va_ullong(ap)),
                ArgKind::Uint(Length::IntMax) => Arg::Uint(pg_elog_va_uintmax(ap)),
                ArgKind::Uint(Length::Size) => Arg::Uint(pg_elog_va_size(ap) as u64),
                ArgKind::Uint(Length::PtrDiff) => Arg::Uint(pg_elog_va_ptrdiff(ap) as u64),
                ArgKind::Uint(_) => Arg::Uint(pg_elog_va_uint(ap).into()),
                ArgKind::Double => Arg::Double(pg_elog_va_double(ap)),
                ArgKind::Str => {
                    let ptr = pg_elog_va_ptr(ap).cast::<c_char>();
                    Arg::Str(if ptr.is_null() {
                        None
                    } else {
                        Some(CStr::from_ptr(ptr).to_bytes())
                    })
                }
                ArgKind::Ptr => Arg::Ptr(pg_elog_va_ptr(ap) as usize),
            }
        };
        Some(arg)
    }
}

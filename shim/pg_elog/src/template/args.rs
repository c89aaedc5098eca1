//! Argument supply for template rendering.
//!
//! The renderer asks for one argument at a time and says what it expects
//! ([`ArgKind`]). A C `va_list` must be read with exactly that type, so the
//! request drives the fetch; sources backed by Rust values just hand out the
//! next element and let the renderer check it.

use std::ffi::CStr;
use std::fmt;

use super::Length;

/// What a conversion expects to read next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// Signed integer of the given C width (`%d`, `*`).
    Int(Length),
    /// Unsigned integer of the given C width (`%u %o %x %X`).
    Uint(Length),
    /// `double`.
    Double,
    /// `int` converted to `unsigned char` (`%c`).
    Char,
    /// `const char *`, possibly null (`%s`).
    Str,
    /// `void *` (`%p`).
    Ptr,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int(_) => "signed integer",
            Self::Uint(_) => "unsigned integer",
            Self::Double => "double",
            Self::Char => "character",
            Self::Str => "string",
            Self::Ptr => "pointer",
        };
        f.write_str(name)
    }
}

/// A single formatting argument.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    Uint(u64),
    Double(f64),
    Char(u8),
    /// String bytes without terminator; `None` is a null pointer.
    Str(Option<&'a [u8]>),
    Ptr(usize),
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Arg::Uint(value.into())
    }
}

impl From<u64> for Arg<'_> {
    fn from(value: u64) -> Self {
        Arg::Uint(value)
    }
}

impl From<f64> for Arg<'_> {
    fn from(value: f64) -> Self {
        Arg::Double(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Str(Some(value.as_bytes()))
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(value: &'a [u8]) -> Self {
        Arg::Str(Some(value))
    }
}

impl<'a> From<&'a CStr> for Arg<'a> {
    fn from(value: &'a CStr) -> Self {
        Arg::Str(Some(value.to_bytes()))
    }
}

/// Supplies arguments to [`Template::render`](super::Template::render).
pub trait ArgSource<'a> {
    /// Fetch the next argument, which the template expects to be `kind`.
    ///
    /// Returns `None` once the source is exhausted.
    fn next_arg(&mut self, kind: ArgKind) -> Option<Arg<'a>>;
}

/// Arguments taken in order from a slice.
#[derive(Clone, Debug)]
pub struct SliceArgs<'s, 'a> {
    args: &'s [Arg<'a>],
    pos: usize,
}

impl<'s, 'a> SliceArgs<'s, 'a> {
    pub fn new(args: &'s [Arg<'a>]) -> Self {
        SliceArgs { args, pos: 0 }
    }

    /// Arguments not consumed yet.
    pub fn remaining(&self) -> usize {
        self.args.len() - self.pos
    }
}

impl<'a> ArgSource<'a> for SliceArgs<'_, 'a> {
    fn next_arg(&mut self, _kind: ArgKind) -> Option<Arg<'a>> {
        let arg = self.args.get(self.pos).copied()?;
        self.pos += 1;
        Some(arg)
    }
}

/// An empty argument list.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoArgs;

impl<'a> ArgSource<'a> for NoArgs {
    fn next_arg(&mut self, _kind: ArgKind) -> Option<Arg<'a>> {
        None
    }
}

/// Adapts a closure that fetches by kind, such as a `va_list` reader.
pub struct FnArgs<F>(pub F);

impl<'a, F> ArgSource<'a> for FnArgs<F>
where
    F: FnMut(ArgKind) -> Option<Arg<'a>>,
{
    fn next_arg(&mut self, kind: ArgKind) -> Option<Arg<'a>> {
        (self.0)(kind)
    }
}

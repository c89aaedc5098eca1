//! printf-style template parsing for `errmsg`.
//!
//! Templates arrive from C code and are parsed completely before a single
//! argument is read. Anything that could make the renderer touch memory it
//! was not handed (`%n`, positional arguments, `long double`) is rejected at
//! parse time, so a hostile or mistyped template degrades to a
//! [`TemplateError`] instead of undefined behavior.
//!
//! Syntax: `%[flags][width][.precision][length]conversion`
//!
//! - flags: `-` `+` space `#` `0`
//! - width / precision: decimal digits or `*` (taken from the argument list)
//! - length: `hh` `h` `l` `ll` `j` `z` `t`
//! - conversion: `d i u o x X f F e E g G c s p m %`
//!
//! `%m` expands to the text of the `errno` captured when the report began,
//! as in PostgreSQL's own `errmsg`.

mod args;
mod render;

use std::{fmt, io};

use bitflags::bitflags;
use thiserror::Error;

pub use args::{Arg, ArgKind, ArgSource, FnArgs, NoArgs, SliceArgs};

bitflags! {
    /// Conversion flags between `%` and the field width.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Flags: u8 {
        /// `-`: pad on the right.
        const LEFT = 1 << 0;
        /// `+`: always print a sign for signed conversions.
        const PLUS = 1 << 1;
        /// ` `: print a space where a `+` would go.
        const SPACE = 1 << 2;
        /// `#`: alternate form (`0x` prefix, forced decimal point).
        const ALTERNATE = 1 << 3;
        /// `0`: pad numbers with zeros instead of spaces.
        const ZERO = 1 << 4;
    }
}

/// Width or precision of a conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Count {
    Fixed(usize),
    /// `*`: read an `int` from the argument list.
    FromArg,
}

/// Integer length modifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Length {
    #[default]
    Default,
    /// `hh`
    Char,
    /// `h`
    Short,
    /// `l`
    Long,
    /// `ll`
    LongLong,
    /// `j`
    IntMax,
    /// `z`
    Size,
    /// `t`
    PtrDiff,
}

/// The conversion character.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConvKind {
    /// `d`, `i`
    Signed,
    /// `u`
    Unsigned,
    /// `o`
    Octal,
    /// `x`
    Hex,
    /// `X`
    HexUpper,
    /// `f`
    Fixed,
    /// `F`
    FixedUpper,
    /// `e`
    Exp,
    /// `E`
    ExpUpper,
    /// `g`
    General,
    /// `G`
    GeneralUpper,
    /// `c`
    Char,
    /// `s`
    Str,
    /// `p`
    Pointer,
    /// `m`: text of the saved `errno`; consumes no argument.
    Errno,
    /// `%%`
    Percent,
}

impl ConvKind {
    /// The argument this conversion consumes, if any.
    pub fn arg_kind(self, length: Length) -> Option<ArgKind> {
        match self {
            Self::Signed => Some(ArgKind::Int(length)),
            Self::Unsigned | Self::Octal | Self::Hex | Self::HexUpper => {
                Some(ArgKind::Uint(length))
            }
            Self::Fixed
            | Self::FixedUpper
            | Self::Exp
            | Self::ExpUpper
            | Self::General
            | Self::GeneralUpper => Some(ArgKind::Double),
            Self::Char => Some(ArgKind::Char),
            Self::Str => Some(ArgKind::Str),
            Self::Pointer => Some(ArgKind::Ptr),
            Self::Errno | Self::Percent => None,
        }
    }

    fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Signed | Self::Unsigned | Self::Octal | Self::Hex | Self::HexUpper
        )
    }

    fn is_float(self) -> bool {
        matches!(
            self,
            Self::Fixed
                | Self::FixedUpper
                | Self::Exp
                | Self::ExpUpper
                | Self::General
                | Self::GeneralUpper
        )
    }
}

/// One parsed `%` directive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Conversion {
    /// Byte offset of the `%` in the template.
    pub offset: usize,
    pub flags: Flags,
    pub width: Option<Count>,
    pub precision: Option<Count>,
    pub length: Length,
    pub kind: ConvKind,
}

/// A run of literal text or a conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Piece<'t> {
    Literal(&'t [u8]),
    Conversion(Conversion),
}

/// Error from parsing or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown conversion '%{conversion}' at byte {offset}")]
    UnknownConversion { conversion: char, offset: usize },
    #[error("'%n' at byte {offset} would write through an argument pointer")]
    WriteBack { offset: usize },
    #[error("positional argument at byte {offset} is not supported")]
    Positional { offset: usize },
    #[error("{what} at byte {offset} is not supported")]
    Unsupported { what: &'static str, offset: usize },
    #[error("template ends inside the conversion at byte {offset}")]
    Incomplete { offset: usize },
    #[error("missing argument {index}")]
    MissingArgument { index: usize },
    #[error("argument {index} is not a {expected}")]
    ArgumentMismatch { index: usize, expected: ArgKind },
    #[error("failed to write formatted output")]
    Write(#[from] io::Error),
}

/// A validated template, borrowing the bytes it was parsed from.
#[derive(Clone, PartialEq, Eq)]
pub struct Template<'t> {
    source: &'t [u8],
    pieces: Vec<Piece<'t>>,
}

impl<'t> Template<'t> {
    /// Parse and validate `source`.
    pub fn parse(source: &'t [u8]) -> Result<Self, TemplateError> {
        Parser { source, pos: 0 }.run()
    }

    /// The unparsed template bytes.
    pub fn source(&self) -> &'t [u8] {
        self.source
    }

    pub fn pieces(&self) -> &[Piece<'t>] {
        &self.pieces
    }

    /// Number of arguments a render pulls from its source, `*` counts included.
    pub fn arg_count(&self) -> usize {
        self.pieces
            .iter()
            .map(|piece| match piece {
                Piece::Literal(_) => 0,
                Piece::Conversion(conv) => {
                    usize::from(conv.width == Some(Count::FromArg))
                        + usize::from(conv.precision == Some(Count::FromArg))
                        + usize::from(conv.kind.arg_kind(conv.length).is_some())
                }
            })
            .sum()
    }
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("source", &String::from_utf8_lossy(self.source))
            .field("pieces", &self.pieces.len())
            .finish()
    }
}

struct Parser<'t> {
    source: &'t [u8],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn run(mut self) -> Result<Template<'t>, TemplateError> {
        let mut pieces = Vec::new();
        let mut literal_start = 0;

        while let Some(rel) = self.source[self.pos..].iter().position(|&b| b == b'%') {
            let offset = self.pos + rel;
            if offset > literal_start {
                pieces.push(Piece::Literal(&self.source[literal_start..offset]));
            }
            self.pos = offset + 1;
            pieces.push(Piece::Conversion(self.conversion(offset)?));
            literal_start = self.pos;
        }

        if literal_start < self.source.len() {
            pieces.push(Piece::Literal(&self.source[literal_start..]));
        }

        Ok(Template {
            source: self.source,
            pieces,
        })
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Parse everything after a `%` at `offset`.
    fn conversion(&mut self, offset: usize) -> Result<Conversion, TemplateError> {
        // `%1$d`: digits directly followed by `$`.
        let digits = self.source[self.pos..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits > 0 && self.source.get(self.pos + digits) == Some(&b'$') {
            return Err(TemplateError::Positional { offset });
        }

        let mut flags = Flags::empty();
        while let Some(b) = self.peek() {
            let flag = match b {
                b'-' => Flags::LEFT,
                b'+' => Flags::PLUS,
                b' ' => Flags::SPACE,
                b'#' => Flags::ALTERNATE,
                b'0' => Flags::ZERO,
                _ => break,
            };
            flags |= flag;
            self.pos += 1;
        }

        let width = self.count(offset, "oversized field width")?;

        let precision = if self.peek() == Some(b'.') {
            self.pos += 1;
            Some(
                self.count(offset, "oversized precision")?
                    .unwrap_or(Count::Fixed(0)),
            )
        } else {
            None
        };

        let length = self.length(offset)?;

        let Some(c) = self.bump() else {
            return Err(TemplateError::Incomplete { offset });
        };
        let kind = match c {
            b'd' | b'i' => ConvKind::Signed,
            b'u' => ConvKind::Unsigned,
            b'o' => ConvKind::Octal,
            b'x' => ConvKind::Hex,
            b'X' => ConvKind::HexUpper,
            b'f' => ConvKind::Fixed,
            b'F' => ConvKind::FixedUpper,
            b'e' => ConvKind::Exp,
            b'E' => ConvKind::ExpUpper,
            b'g' => ConvKind::General,
            b'G' => ConvKind::GeneralUpper,
            b'c' => ConvKind::Char,
            b's' => ConvKind::Str,
            b'p' => ConvKind::Pointer,
            b'm' => ConvKind::Errno,
            b'%' => ConvKind::Percent,
            b'n' => return Err(TemplateError::WriteBack { offset }),
            b'a' | b'A' => {
                return Err(TemplateError::Unsupported {
                    what: "hexadecimal float conversion",
                    offset,
                })
            }
            b'C' | b'S' => {
                return Err(TemplateError::Unsupported {
                    what: "wide character conversion",
                    offset,
                })
            }
            other => {
                return Err(TemplateError::UnknownConversion {
                    conversion: char::from(other),
                    offset,
                })
            }
        };

        let length_fits = match length {
            Length::Default => true,
            // `%lf` is accepted by C99 and means plain double.
            Length::Long if kind.is_float() => true,
            Length::Long if matches!(kind, ConvKind::Char | ConvKind::Str) => {
                return Err(TemplateError::Unsupported {
                    what: "wide character conversion",
                    offset,
                })
            }
            _ => kind.is_integer(),
        };
        if !length_fits {
            return Err(TemplateError::Unsupported {
                what: "length modifier on this conversion",
                offset,
            });
        }

        Ok(Conversion {
            offset,
            flags,
            width,
            precision,
            length,
            kind,
        })
    }

    /// Parse an optional width or precision.
    fn count(
        &mut self,
        offset: usize,
        overflow: &'static str,
    ) -> Result<Option<Count>, TemplateError> {
        if self.peek() == Some(b'*') {
            self.pos += 1;
            return Ok(Some(Count::FromArg));
        }

        let mut value: Option<usize> = None;
        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            let digit = usize::from(b - b'0');
            value = Some(
                value
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .filter(|&v| v <= render::MAX_FIELD)
                    .ok_or(TemplateError::Unsupported {
                        what: overflow,
                        offset,
                    })?,
            );
            self.pos += 1;
        }
        Ok(value.map(Count::Fixed))
    }

    fn length(&mut self, offset: usize) -> Result<Length, TemplateError> {
        let length = match self.peek() {
            Some(b'h') => {
                self.pos += 1;
                if self.peek() == Some(b'h') {
                    self.pos += 1;
                    Length::Char
                } else {
                    Length::Short
                }
            }
            Some(b'l') => {
                self.pos += 1;
                if self.peek() == Some(b'l') {
                    self.pos += 1;
                    Length::LongLong
                } else {
                    Length::Long
                }
            }
            Some(b'j') => {
                self.pos += 1;
                Length::IntMax
            }
            Some(b'z') => {
                self.pos += 1;
                Length::Size
            }
            Some(b't') => {
                self.pos += 1;
                Length::PtrDiff
            }
            Some(b'L') => {
                return Err(TemplateError::Unsupported {
                    what: "long double length modifier",
                    offset,
                })
            }
            _ => Length::Default,
        };
        Ok(length)
    }
}

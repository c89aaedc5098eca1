//! Rendering of parsed templates.
//!
//! Output follows glibc where C leaves details open: a null `%s` prints
//! `(null)` (or nothing when the precision is too short to hold it) and a
//! null `%p` prints `(nil)`.

use std::ffi::{c_long, c_ulong};
use std::io::{self, Write};
use std::marker::PhantomData;

use super::{
    Arg, ArgKind, ArgSource, ConvKind, Conversion, Count, Flags, Length, Piece, Template,
    TemplateError,
};

/// Largest accepted field width or precision.
pub(super) const MAX_FIELD: usize = 65_535;

const PAD_BLOCK: usize = 32;
const NULL_STR: &[u8] = b"(null)";

impl Template<'_> {
    /// Render into `out`, pulling arguments from `args`.
    ///
    /// `errno` is the OS error number `%m` describes. Output written before
    /// an error is left in `out`.
    pub fn render<'a, S, W>(
        &self,
        args: &mut S,
        errno: i32,
        out: &mut W,
    ) -> Result<(), TemplateError>
    where
        S: ArgSource<'a> + ?Sized,
        W: Write + ?Sized,
    {
        let mut renderer = Renderer {
            args,
            fetched: 0,
            errno,
            out,
            _arg: PhantomData,
        };
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => renderer.out.write_all(text)?,
                Piece::Conversion(conv) => renderer.conversion(conv)?,
            }
        }
        tracing::trace!(args = renderer.fetched, "template rendered");
        Ok(())
    }
}

/// Width, precision and flags after `*` arguments have been read.
#[derive(Copy, Clone)]
struct Spec {
    flags: Flags,
    width: usize,
    precision: Option<usize>,
}

struct Renderer<'r, 'a, S: ?Sized, W: ?Sized> {
    args: &'r mut S,
    fetched: usize,
    errno: i32,
    out: &'r mut W,
    _arg: PhantomData<Arg<'a>>,
}

impl<'a, S, W> Renderer<'_, 'a, S, W>
where
    S: ArgSource<'a> + ?Sized,
    W: Write + ?Sized,
{
    fn conversion(&mut self, conv: &Conversion) -> Result<(), TemplateError> {
        let spec = self.resolve(conv)?;
        match conv.kind {
            ConvKind::Percent => self.out.write_all(b"%")?,
            ConvKind::Signed => {
                let value = self.fetch_int(conv.length)?;
                self.signed(value, spec)?;
            }
            ConvKind::Unsigned | ConvKind::Octal | ConvKind::Hex | ConvKind::HexUpper => {
                let value = self.fetch_uint(conv.length)?;
                self.unsigned(value, conv.kind, spec)?;
            }
            ConvKind::Fixed
            | ConvKind::FixedUpper
            | ConvKind::Exp
            | ConvKind::ExpUpper
            | ConvKind::General
            | ConvKind::GeneralUpper => {
                let value = self.fetch_double()?;
                self.float(value, conv.kind, spec)?;
            }
            ConvKind::Char => {
                let c = self.fetch_char()?;
                self.pad(spec, b"", &[c], false)?;
            }
            ConvKind::Str => {
                let text = self.fetch_str()?;
                self.string(text, spec)?;
            }
            ConvKind::Pointer => {
                let addr = self.fetch_ptr()?;
                self.pointer(addr, spec)?;
            }
            ConvKind::Errno => {
                let text = os_error_text(self.errno);
                self.string(Some(text.as_bytes()), spec)?;
            }
        }
        Ok(())
    }

    fn resolve(&mut self, conv: &Conversion) -> Result<Spec, TemplateError> {
        let mut flags = conv.flags;
        let width = match conv.width {
            None => 0,
            Some(Count::Fixed(width)) => width,
            Some(Count::FromArg) => {
                let width = self.fetch_int(Length::Default)?;
                // A negative `*` width means left-justify.
                if width < 0 {
                    flags |= Flags::LEFT;
                }
                field(width.unsigned_abs(), conv.offset, "oversized field width")?
            }
        };
        let precision = match conv.precision {
            None => None,
            Some(Count::Fixed(precision)) => Some(precision),
            Some(Count::FromArg) => {
                let precision = self.fetch_int(Length::Default)?;
                if precision < 0 {
                    None
                } else {
                    Some(field(
                        precision.unsigned_abs(),
                        conv.offset,
                        "oversized precision",
                    )?)
                }
            }
        };
        Ok(Spec {
            flags,
            width,
            precision,
        })
    }

    // ── Argument fetching ────────────────────────────────────────────────

    fn fetch(&mut self, kind: ArgKind) -> Result<(usize, Arg<'a>), TemplateError> {
        let index = self.fetched;
        self.fetched += 1;
        let arg = self
            .args
            .next_arg(kind)
            .ok_or(TemplateError::MissingArgument { index })?;
        Ok((index, arg))
    }

    #[allow(
        clippy::cast_possible_wrap,
        reason = "reinterpreting the bits matches C varargs"
    )]
    fn fetch_int(&mut self, length: Length) -> Result<i64, TemplateError> {
        let expected = ArgKind::Int(length);
        let value = match self.fetch(expected)? {
            (_, Arg::Int(v)) => v,
            (_, Arg::Uint(v)) => v as i64,
            (_, Arg::Char(c)) => i64::from(c),
            (index, _) => return Err(TemplateError::ArgumentMismatch { index, expected }),
        };
        Ok(truncate_signed(value, length))
    }

    #[allow(
        clippy::cast_sign_loss,
        reason = "reinterpreting the bits matches C varargs"
    )]
    fn fetch_uint(&mut self, length: Length) -> Result<u64, TemplateError> {
        let expected = ArgKind::Uint(length);
        let value = match self.fetch(expected)? {
            (_, Arg::Uint(v)) => v,
            (_, Arg::Int(v)) => v as u64,
            (_, Arg::Char(c)) => u64::from(c),
            (index, _) => return Err(TemplateError::ArgumentMismatch { index, expected }),
        };
        Ok(truncate_unsigned(value, length))
    }

    fn fetch_double(&mut self) -> Result<f64, TemplateError> {
        match self.fetch(ArgKind::Double)? {
            (_, Arg::Double(v)) => Ok(v),
            (index, _) => Err(TemplateError::ArgumentMismatch {
                index,
                expected: ArgKind::Double,
            }),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "%c converts its int argument to unsigned char"
    )]
    fn fetch_char(&mut self) -> Result<u8, TemplateError> {
        match self.fetch(ArgKind::Char)? {
            (_, Arg::Char(c)) => Ok(c),
            (_, Arg::Int(v)) => Ok(v as u8),
            (_, Arg::Uint(v)) => Ok(v as u8),
            (index, _) => Err(TemplateError::ArgumentMismatch {
                index,
                expected: ArgKind::Char,
            }),
        }
    }

    fn fetch_str(&mut self) -> Result<Option<&'a [u8]>, TemplateError> {
        match self.fetch(ArgKind::Str)? {
            (_, Arg::Str(text)) => Ok(text),
            (index, _) => Err(TemplateError::ArgumentMismatch {
                index,
                expected: ArgKind::Str,
            }),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "pointer-sized values never exceed usize on the host"
    )]
    fn fetch_ptr(&mut self) -> Result<usize, TemplateError> {
        match self.fetch(ArgKind::Ptr)? {
            (_, Arg::Ptr(addr)) => Ok(addr),
            (_, Arg::Uint(v)) => Ok(v as usize),
            (index, _) => Err(TemplateError::ArgumentMismatch {
                index,
                expected: ArgKind::Ptr,
            }),
        }
    }

    // ── Conversions ──────────────────────────────────────────────────────

    fn signed(&mut self, value: i64, spec: Spec) -> io::Result<()> {
        let sign = sign_prefix(value < 0, spec.flags);
        let mut digits = value.unsigned_abs().to_string().into_bytes();
        apply_int_precision(&mut digits, value == 0, spec.precision);
        self.pad(spec, sign, &digits, spec.precision.is_none())
    }

    fn unsigned(&mut self, value: u64, kind: ConvKind, spec: Spec) -> io::Result<()> {
        let mut digits = match kind {
            ConvKind::Octal => format!("{value:o}"),
            ConvKind::Hex => format!("{value:x}"),
            ConvKind::HexUpper => format!("{value:X}"),
            _ => value.to_string(),
        }
        .into_bytes();
        apply_int_precision(&mut digits, value == 0, spec.precision);

        let alternate = spec.flags.contains(Flags::ALTERNATE);
        if kind == ConvKind::Octal && alternate && digits.first() != Some(&b'0') {
            digits.insert(0, b'0');
        }
        let prefix: &[u8] = match kind {
            ConvKind::Hex if alternate && value != 0 => b"0x",
            ConvKind::HexUpper if alternate && value != 0 => b"0X",
            _ => b"",
        };
        self.pad(spec, prefix, &digits, spec.precision.is_none())
    }

    fn float(&mut self, value: f64, kind: ConvKind, spec: Spec) -> io::Result<()> {
        let upper = matches!(
            kind,
            ConvKind::FixedUpper | ConvKind::ExpUpper | ConvKind::GeneralUpper
        );
        let sign = sign_prefix(value.is_sign_negative(), spec.flags);

        if !value.is_finite() {
            let text: &[u8] = match (value.is_nan(), upper) {
                (true, false) => b"nan",
                (true, true) => b"NAN",
                (false, false) => b"inf",
                (false, true) => b"INF",
            };
            return self.pad(spec, sign, text, false);
        }

        let alternate = spec.flags.contains(Flags::ALTERNATE);
        let precision = spec.precision.unwrap_or(6);
        let magnitude = value.abs();
        let body = match kind {
            ConvKind::Fixed | ConvKind::FixedUpper => fixed(magnitude, precision, alternate),
            ConvKind::Exp | ConvKind::ExpUpper => {
                exponential(magnitude, precision, upper, alternate)
            }
            _ => general(magnitude, precision, upper, alternate),
        };
        self.pad(spec, sign, body.as_bytes(), true)
    }

    fn string(&mut self, text: Option<&[u8]>, spec: Spec) -> io::Result<()> {
        let text: &[u8] = match text {
            Some(bytes) => bytes,
            None if spec.precision.map_or(true, |p| p >= NULL_STR.len()) => NULL_STR,
            None => b"",
        };
        let shown = match spec.precision {
            Some(p) => &text[..p.min(text.len())],
            None => text,
        };
        self.pad(spec, b"", shown, false)
    }

    fn pointer(&mut self, addr: usize, spec: Spec) -> io::Result<()> {
        if addr == 0 {
            return self.pad(spec, b"", b"(nil)", false);
        }
        // glibc zero-pads after the `0x`, as for `%#x`.
        let digits = format!("{addr:x}");
        self.pad(spec, b"0x", digits.as_bytes(), true)
    }

    /// Write `prefix` and `body` padded to the field width.
    ///
    /// Zero padding goes between prefix and body and only applies when
    /// `zero_ok`; `-` always wins over `0`.
    fn pad(&mut self, spec: Spec, prefix: &[u8], body: &[u8], zero_ok: bool) -> io::Result<()> {
        let fill = spec.width.saturating_sub(prefix.len() + body.len());
        if spec.flags.contains(Flags::LEFT) {
            self.out.write_all(prefix)?;
            self.out.write_all(body)?;
            write_repeated(&mut *self.out, b' ', fill)
        } else if zero_ok && spec.flags.contains(Flags::ZERO) {
            self.out.write_all(prefix)?;
            write_repeated(&mut *self.out, b'0', fill)?;
            self.out.write_all(body)
        } else {
            write_repeated(&mut *self.out, b' ', fill)?;
            self.out.write_all(prefix)?;
            self.out.write_all(body)
        }
    }
}

fn field(value: u64, offset: usize, what: &'static str) -> Result<usize, TemplateError> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v <= MAX_FIELD)
        .ok_or(TemplateError::Unsupported { what, offset })
}

fn sign_prefix(negative: bool, flags: Flags) -> &'static [u8] {
    if negative {
        b"-"
    } else if flags.contains(Flags::PLUS) {
        b"+"
    } else if flags.contains(Flags::SPACE) {
        b" "
    } else {
        b""
    }
}

/// Integer precision is a minimum digit count; `.0` prints zero as nothing.
fn apply_int_precision(digits: &mut Vec<u8>, is_zero: bool, precision: Option<usize>) {
    let Some(precision) = precision else {
        return;
    };
    if precision == 0 && is_zero {
        digits.clear();
    } else if digits.len() < precision {
        let mut padded = vec![b'0'; precision - digits.len()];
        padded.append(digits);
        *digits = padded;
    }
}

/// Narrow to the C type named by the length modifier, as `va_arg` would.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    reason = "narrowing is the point: C reads the smaller type"
)]
fn truncate_signed(value: i64, length: Length) -> i64 {
    match length {
        Length::Char => i64::from(value as i8),
        Length::Short => i64::from(value as i16),
        Length::Default => i64::from(value as i32),
        Length::Long => i64::from(value as c_long),
        Length::Size | Length::PtrDiff => value as isize as i64,
        Length::LongLong | Length::IntMax => value,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "narrowing is the point: C reads the smaller type"
)]
fn truncate_unsigned(value: u64, length: Length) -> u64 {
    match length {
        Length::Char => u64::from(value as u8),
        Length::Short => u64::from(value as u16),
        Length::Default => u64::from(value as u32),
        Length::Long => u64::from(value as c_ulong),
        Length::Size | Length::PtrDiff => value as usize as u64,
        Length::LongLong | Length::IntMax => value,
    }
}

fn write_repeated<W: Write + ?Sized>(out: &mut W, byte: u8, mut count: usize) -> io::Result<()> {
    let block = [byte; PAD_BLOCK];
    while count > 0 {
        let n = count.min(PAD_BLOCK);
        out.write_all(&block[..n])?;
        count -= n;
    }
    Ok(())
}

/// `%f`: fixed notation.
fn fixed(magnitude: f64, precision: usize, alternate: bool) -> String {
    let mut text = format!("{magnitude:.precision$}");
    if alternate && precision == 0 {
        text.push('.');
    }
    text
}

/// `%e`: one digit, point, `precision` digits, then `e±dd`.
fn exponential(magnitude: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let raw = format!("{magnitude:.precision$e}");
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let mut text = String::with_capacity(mantissa.len() + 6);
    text.push_str(mantissa);
    if alternate && precision == 0 {
        text.push('.');
    }
    text.push(if upper { 'E' } else { 'e' });
    text.push(if exponent < 0 { '-' } else { '+' });
    text.push_str(&format!("{:02}", exponent.unsigned_abs()));
    text
}

/// `%g`: `%e` or `%f` depending on the decimal exponent, trailing zeros
/// removed unless `#` is given.
fn general(magnitude: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let significant = precision.max(1);
    let exponent = decimal_exponent(magnitude, significant - 1);
    let significant_i = i64::try_from(significant).unwrap_or(i64::MAX);

    let mut text = if (-4..significant_i).contains(&exponent) {
        let fraction = usize::try_from(significant_i - 1 - exponent).unwrap_or(0);
        fixed(magnitude, fraction, alternate)
    } else {
        exponential(magnitude, significant - 1, upper, alternate)
    };
    if !alternate {
        strip_trailing_zeros(&mut text);
    }
    text
}

/// Decimal exponent of `magnitude` once rounded to `digits` fraction digits
/// in scientific notation.
fn decimal_exponent(magnitude: f64, digits: usize) -> i64 {
    let raw = format!("{magnitude:.digits$e}");
    raw.split_once('e')
        .and_then(|(_, exponent)| exponent.parse().ok())
        .unwrap_or(0)
}

fn strip_trailing_zeros(text: &mut String) {
    let exponent_at = text.find(|c: char| c == 'e' || c == 'E').unwrap_or(text.len());
    let (mantissa, exponent) = text.split_at(exponent_at);
    if !mantissa.contains('.') {
        return;
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    *text = format!("{trimmed}{exponent}");
}

/// `strerror` text for `errno`, without Rust's `(os error N)` suffix.
fn os_error_text(errno: i32) -> String {
    let text = io::Error::from_raw_os_error(errno).to_string();
    match text.find(" (os error ") {
        Some(at) => text[..at].to_string(),
        None => text,
    }
}

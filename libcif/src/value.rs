//! CIF value representation.

use std::fmt;

use num_bigint::BigInt;
use num_traits::Num;

use crate::encode::encode_string;

/// A CIF data value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CifValue {
    /// Character data, quoted or not.
    Text(StringValue),
    /// A number in CIF numeric notation, e.g. `1.234(5)`.
    Number(NumberValue),
    /// The inapplicable marker `.`.
    NotApplicable,
    /// The unknown marker `?`.
    Unknown,
}

impl CifValue {
    /// Classify the text of an unquoted value.
    pub fn from_unquoted(text: &str) -> Self {
        match text {
            "." => CifValue::NotApplicable,
            "?" => CifValue::Unknown,
            _ => match NumberValue::parse(text) {
                Some(number) => CifValue::Number(number),
                None => CifValue::Text(StringValue::new(text, false)),
            },
        }
    }

    /// A quoted value is always text, whatever it looks like.
    pub fn quoted(text: &str) -> Self {
        CifValue::Text(StringValue::new(text, true))
    }

    /// Unquoted text.
    pub fn text(text: &str) -> Self {
        CifValue::Text(StringValue::new(text, false))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CifValue::Unknown)
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, CifValue::NotApplicable)
    }

    /// Returns the text if this is a `Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CifValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns a reference to the number if this is a `Number`.
    pub fn as_number(&self) -> Option<&NumberValue> {
        match self {
            CifValue::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The numeric value, if this is a `Number`.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(NumberValue::to_f64)
    }
}

impl fmt::Display for CifValue {
    /// The value as written in a CIF: `.`, `?`, the number as written, or
    /// the string quoted as needed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CifValue::Text(s) => write!(f, "{}", s),
            CifValue::Number(n) => write!(f, "{}", n),
            CifValue::NotApplicable => f.write_str("."),
            CifValue::Unknown => f.write_str("?"),
        }
    }
}

impl From<&str> for CifValue {
    fn from(s: &str) -> Self {
        CifValue::text(s)
    }
}

impl From<NumberValue> for CifValue {
    fn from(n: NumberValue) -> Self {
        CifValue::Number(n)
    }
}

/// Character data together with whether it was quoted in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringValue {
    text: String,
    quoted: bool,
}

impl StringValue {
    pub fn new(text: &str, quoted: bool) -> Self {
        Self {
            text: text.to_string(),
            quoted,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the source wrote this value with quotes or as a text block.
    pub fn was_quoted(&self) -> bool {
        self.quoted
    }
}

impl fmt::Display for StringValue {
    /// The CIF form of the string; multi-line text is a text block that
    /// starts with the line break it needs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match encode_string(self) {
            Ok(text) => f.write_str(&text),
            // A line starting with `;` cannot be held by any CIF 1.1 form.
            Err(_) => f.write_str(&self.text),
        }
    }
}

/// A number as written in a CIF: mantissa, optional exponent, optional
/// standard uncertainty in parentheses.
///
/// The text fragments are kept as written so that nothing is lost to
/// floating-point conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberValue {
    mantissa: String,
    /// `e` or `E`, whichever the source used.
    marker: char,
    exponent: Option<String>,
    su: Option<String>,
}

/// Length of the run of ASCII digits at the start of `b`.
fn digit_run(b: &[u8]) -> usize {
    b.iter().take_while(|c| c.is_ascii_digit()).count()
}

impl NumberValue {
    /// Parse CIF numeric notation.
    ///
    /// Accepts an optional sign, digits with an optional decimal point (at
    /// least one digit overall, and at least one after a point not preceded
    /// by digits), an optional `e`/`E` exponent, and an optional `(digits)`
    /// standard uncertainty. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let b = text.as_bytes();
        let mut i = 0;

        if matches!(b.first(), Some(b'+' | b'-')) {
            i += 1;
        }
        let int_digits = digit_run(&b[i..]);
        i += int_digits;
        if b.get(i) == Some(&b'.') {
            i += 1;
            let frac_digits = digit_run(&b[i..]);
            if int_digits == 0 && frac_digits == 0 {
                return None;
            }
            i += frac_digits;
        } else if int_digits == 0 {
            return None;
        }
        let mantissa = &text[..i];

        let mut exponent = None;
        let mut marker = 'e';
        if let Some(&m @ (b'e' | b'E')) = b.get(i) {
            marker = char::from(m);
            let start = i + 1;
            let mut j = start;
            if matches!(b.get(j), Some(b'+' | b'-')) {
                j += 1;
            }
            let digits = digit_run(&b[j..]);
            if digits == 0 {
                return None;
            }
            j += digits;
            exponent = Some(&text[start..j]);
            i = j;
        }

        let mut su = None;
        if b.get(i) == Some(&b'(') {
            let start = i + 1;
            let digits = digit_run(&b[start..]);
            if digits == 0 || b.get(start + digits) != Some(&b')') {
                return None;
            }
            su = Some(&text[start..start + digits]);
            i = start + digits + 1;
        }

        if i != b.len() {
            return None;
        }
        Some(Self {
            mantissa: mantissa.to_string(),
            marker,
            exponent: exponent.map(str::to_string),
            su: su.map(str::to_string),
        })
    }

    /// The signed digits and decimal point, e.g. `-1.25`.
    pub fn mantissa(&self) -> &str {
        &self.mantissa
    }

    /// The exponent digits with their sign, if any, e.g. `+03`.
    pub fn exponent(&self) -> Option<&str> {
        self.exponent.as_deref()
    }

    /// The standard uncertainty digits, if any, e.g. `12` in `1.50(12)`.
    pub fn su(&self) -> Option<&str> {
        self.su.as_deref()
    }

    /// The value as a double, ignoring the uncertainty.
    pub fn to_f64(&self) -> f64 {
        let text = match &self.exponent {
            Some(exp) => format!("{}e{}", self.mantissa, exp),
            None => self.mantissa.clone(),
        };
        text.parse().unwrap_or(f64::NAN)
    }

    /// The standard uncertainty in the units of the value.
    ///
    /// The digits in parentheses apply to the last decimal place of the
    /// mantissa: `1.23(4)` has an uncertainty of 0.04 and `1.23e2(4)` one of
    /// 4.
    pub fn standard_uncertainty(&self) -> Option<f64> {
        let su: f64 = self.su.as_ref()?.parse().ok()?;
        let exponent: i32 = match &self.exponent {
            Some(exp) => exp.strip_prefix('+').unwrap_or(exp).parse().ok()?,
            None => 0,
        };
        let decimals = self
            .mantissa
            .find('.')
            .map_or(0, |point| self.mantissa.len() - point - 1);
        let decimals = i32::try_from(decimals).ok()?;
        Some(su * 10f64.powi(exponent - decimals))
    }

    /// Whether the number is written as a plain integer (no point, no
    /// exponent).
    pub fn is_integer(&self) -> bool {
        self.exponent.is_none() && !self.mantissa.contains('.')
    }

    /// The value as an arbitrary-precision integer, when written as one.
    pub fn to_bigint(&self) -> Option<BigInt> {
        if !self.is_integer() {
            return None;
        }
        let digits = self.mantissa.strip_prefix('+').unwrap_or(&self.mantissa);
        BigInt::from_str_radix(digits, 10).ok()
    }
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mantissa)?;
        if let Some(exp) = &self.exponent {
            write!(f, "{}{}", self.marker, exp)?;
        }
        if let Some(su) = &self.su {
            write!(f, "({})", su)?;
        }
        Ok(())
    }
}

//! # Amount — Deterministic Decimal Arithmetic
//!
//! Every monetary value in a vault (debt, collateral, price, transfer size)
//! is an [`Amount`]. It is a signed decimal with a fixed 16-digit mantissa
//! and a bounded power-of-ten exponent — the same shape as the ledger-native
//! floating decimal the vault records are stored in, so stored bytes are
//! bit-reproducible across implementations.
//!
//! ```text
//! value    = mantissa × 10^exponent
//! mantissa = 0, or 10^15 <= |mantissa| < 10^16
//! exponent ∈ [-96, 80]
//! ```
//!
//! ## Rounding
//!
//! All operations compute exactly in 128-bit integers and truncate toward
//! zero exactly once when normalizing the result back to 16 digits. There is
//! no `f64` anywhere in this module. Results smaller than `10^-81` collapse
//! to zero; results larger than `10^96` fail with [`AmountError::Overflow`].
//!
//! ## Wire Encoding
//!
//! ```text
//! zero     : 0x8000_0000_0000_0000
//! non-zero : bit 63 = 1 | bit 62 = positive | bits 54..61 = exponent + 97
//!            | bits 0..53 = |mantissa|
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest non-zero mantissa magnitude (10^15).
const MIN_MANTISSA: u128 = 1_000_000_000_000_000;

/// Largest mantissa magnitude (10^16 - 1).
const MAX_MANTISSA: u128 = 9_999_999_999_999_999;

/// Lowest exponent a normalized amount may carry.
pub const MIN_EXPONENT: i32 = -96;

/// Highest exponent a normalized amount may carry.
pub const MAX_EXPONENT: i32 = 80;

/// Operands further apart than this many decimal orders do not affect
/// each other under addition.
const MAX_ALIGN_DIGITS: i32 = 20;

/// Extra digits carried through a division before normalizing.
const DIVISION_SCALE: u32 = 17;

/// Extra digits carried through a ratio scale before normalizing.
const RATIO_SCALE: u32 = 12;

/// Bias added to the exponent in the 8-byte encoding.
const EXPONENT_BIAS: i32 = 97;

/// Encoding of zero.
const ZERO_BITS: u64 = 0x8000_0000_0000_0000;

const MANTISSA_MASK: u64 = (1 << 54) - 1;

/// Size of one encoded amount in bytes.
pub const ENCODED_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by [`Amount`] arithmetic, parsing, and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Division (or ratio scale) by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// The result exceeds the representable exponent range.
    #[error("decimal overflow: exponent {exponent} is out of range")]
    Overflow {
        /// The exponent the result would have needed.
        exponent: i32,
    },

    /// Eight bytes that are not a canonical amount encoding.
    #[error("invalid amount encoding: 0x{0:016X}")]
    InvalidEncoding(u64),

    /// A decimal literal that could not be parsed.
    #[error("invalid decimal literal: {0:?}")]
    Parse(String),

    /// Minor-unit conversion of a value that does not fit a `u64`.
    #[error("amount {0} is not representable in unsigned minor units")]
    OutOfRange(String),
}

pub type AmountResult<T> = Result<T, AmountError>;

// ---------------------------------------------------------------------------
// Ratio
// ---------------------------------------------------------------------------

/// A small exact fraction, used for the collateralization parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// The fraction as a decimal amount (e.g. 5/6 → 0.8333333333333333).
    pub fn to_amount(self) -> AmountResult<Amount> {
        Amount::from_integer(i64::from(self.numerator))
            .checked_div(Amount::from_integer(i64::from(self.denominator)))
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A signed 16-significant-digit decimal value.
///
/// Always held in normalized form, so structural equality is numeric
/// equality and the derived `Hash` is consistent with `Eq`.
///
/// # Examples
///
/// ```
/// use pegvault_protocol::amount::Amount;
///
/// let collateral: Amount = "200".parse().unwrap();
/// let price: Amount = "1.5".parse().unwrap();
/// let value = collateral.checked_mul(price).unwrap();
/// assert_eq!(value.to_string(), "300");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Amount {
    mantissa: i64,
    exponent: i32,
}

impl Amount {
    pub const ZERO: Amount = Amount {
        mantissa: 0,
        exponent: 0,
    };

    /// Builds `mantissa × 10^exponent`, normalizing to 16 digits.
    pub fn from_parts(mantissa: i64, exponent: i32) -> AmountResult<Self> {
        Self::normalize(i128::from(mantissa), exponent)
    }

    /// An exact integer amount.
    pub fn from_integer(value: i64) -> Self {
        // A 19-digit integer always normalizes within the exponent range.
        Self::normalize(i128::from(value), 0).unwrap_or(Self::ZERO)
    }

    /// Interprets `units` as an integer count of `10^-decimals` units.
    pub fn from_minor_units(units: u64, decimals: u32) -> AmountResult<Self> {
        let exponent = i32::try_from(decimals)
            .map(|d| -d)
            .map_err(|_| AmountError::Overflow { exponent: i32::MIN })?;
        Self::normalize(i128::from(units), exponent)
    }

    fn normalize(mantissa: i128, mut exponent: i32) -> AmountResult<Self> {
        if mantissa == 0 {
            return Ok(Self::ZERO);
        }

        let negative = mantissa < 0;
        let mut magnitude = mantissa.unsigned_abs();

        while magnitude > MAX_MANTISSA {
            magnitude /= 10;
            exponent = exponent
                .checked_add(1)
                .ok_or(AmountError::Overflow { exponent: i32::MAX })?;
        }
        while magnitude < MIN_MANTISSA {
            magnitude *= 10;
            exponent = match exponent.checked_sub(1) {
                Some(e) => e,
                None => return Ok(Self::ZERO),
            };
        }

        if exponent > MAX_EXPONENT {
            return Err(AmountError::Overflow { exponent });
        }
        if exponent < MIN_EXPONENT {
            return Ok(Self::ZERO);
        }

        let magnitude = magnitude as i64;
        Ok(Self {
            mantissa: if negative { -magnitude } else { magnitude },
            exponent,
        })
    }

    // -- Accessors ----------------------------------------------------------

    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    pub fn is_positive(&self) -> bool {
        self.mantissa > 0
    }

    /// -1, 0 or 1.
    pub fn signum(&self) -> i8 {
        self.mantissa.signum() as i8
    }

    // -- Arithmetic ---------------------------------------------------------

    pub fn negate(self) -> Self {
        Self {
            mantissa: -self.mantissa,
            exponent: self.exponent,
        }
    }

    pub fn abs(self) -> Self {
        Self {
            mantissa: self.mantissa.abs(),
            exponent: self.exponent,
        }
    }

    pub fn checked_add(self, rhs: Self) -> AmountResult<Self> {
        if self.is_zero() {
            return Ok(rhs);
        }
        if rhs.is_zero() {
            return Ok(self);
        }

        // With normalized mantissas the larger exponent is the larger magnitude.
        let (hi, lo) = if self.exponent >= rhs.exponent {
            (self, rhs)
        } else {
            (rhs, self)
        };

        let shift = hi.exponent - lo.exponent;
        if shift > MAX_ALIGN_DIGITS {
            return Ok(hi);
        }

        let aligned =
            i128::from(hi.mantissa) * 10i128.pow(shift as u32) + i128::from(lo.mantissa);
        Self::normalize(aligned, lo.exponent)
    }

    pub fn checked_sub(self, rhs: Self) -> AmountResult<Self> {
        self.checked_add(rhs.negate())
    }

    pub fn checked_mul(self, rhs: Self) -> AmountResult<Self> {
        if self.is_zero() || rhs.is_zero() {
            return Ok(Self::ZERO);
        }
        Self::normalize(
            i128::from(self.mantissa) * i128::from(rhs.mantissa),
            self.exponent + rhs.exponent,
        )
    }

    pub fn checked_div(self, rhs: Self) -> AmountResult<Self> {
        if rhs.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        if self.is_zero() {
            return Ok(Self::ZERO);
        }

        let scaled = i128::from(self.mantissa) * 10i128.pow(DIVISION_SCALE);
        Self::normalize(
            scaled / i128::from(rhs.mantissa),
            self.exponent - rhs.exponent - DIVISION_SCALE as i32,
        )
    }

    /// `self × numerator / denominator`, rounded once.
    pub fn mul_ratio(self, numerator: u32, denominator: u32) -> AmountResult<Self> {
        if denominator == 0 {
            return Err(AmountError::DivisionByZero);
        }
        if self.is_zero() || numerator == 0 {
            return Ok(Self::ZERO);
        }

        let scaled =
            i128::from(self.mantissa) * i128::from(numerator) * 10i128.pow(RATIO_SCALE);
        Self::normalize(
            scaled / i128::from(denominator),
            self.exponent - RATIO_SCALE as i32,
        )
    }

    /// Shorthand for [`mul_ratio`](Self::mul_ratio) with a [`Ratio`].
    pub fn scale(self, ratio: Ratio) -> AmountResult<Self> {
        self.mul_ratio(ratio.numerator, ratio.denominator)
    }

    // -- Conversions --------------------------------------------------------

    /// Truncates to an integer count of `10^-decimals` units.
    ///
    /// Used for reserve payouts, which settle in whole drops.
    pub fn to_minor_units(&self, decimals: u32) -> AmountResult<u64> {
        if self.is_negative() {
            return Err(AmountError::OutOfRange(self.to_string()));
        }
        if self.is_zero() {
            return Ok(0);
        }

        let magnitude = self.mantissa as u128;
        let shift = self.exponent + decimals as i32;
        let units = if shift >= 0 {
            if shift > 22 {
                return Err(AmountError::OutOfRange(self.to_string()));
            }
            magnitude * 10u128.pow(shift as u32)
        } else if -shift > 38 {
            0
        } else {
            magnitude / 10u128.pow((-shift) as u32)
        };

        u64::try_from(units).map_err(|_| AmountError::OutOfRange(self.to_string()))
    }

    /// The canonical 64-bit encoding.
    pub fn to_bits(&self) -> u64 {
        if self.is_zero() {
            return ZERO_BITS;
        }

        let mut bits = 1u64 << 63;
        if self.is_positive() {
            bits |= 1 << 62;
        }
        bits |= ((self.exponent + EXPONENT_BIAS) as u64) << 54;
        bits | self.mantissa.unsigned_abs()
    }

    /// Decodes and validates a canonical 64-bit encoding.
    pub fn from_bits(bits: u64) -> AmountResult<Self> {
        if bits == ZERO_BITS {
            return Ok(Self::ZERO);
        }
        if bits >> 63 == 0 {
            return Err(AmountError::InvalidEncoding(bits));
        }

        let positive = (bits >> 62) & 1 == 1;
        let exponent = ((bits >> 54) & 0xFF) as i32 - EXPONENT_BIAS;
        let magnitude = bits & MANTISSA_MASK;

        if !(MIN_MANTISSA as u64..=MAX_MANTISSA as u64).contains(&magnitude)
            || !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent)
        {
            return Err(AmountError::InvalidEncoding(bits));
        }

        let magnitude = magnitude as i64;
        Ok(Self {
            mantissa: if positive { magnitude } else { -magnitude },
            exponent,
        })
    }

    /// Big-endian bytes of [`to_bits`](Self::to_bits).
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        self.to_bits().to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; ENCODED_LEN]) -> AmountResult<Self> {
        Self::from_bits(u64::from_be_bytes(bytes))
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.signum().cmp(&other.signum()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        if self.is_zero() {
            return Ordering::Equal;
        }

        let magnitude = self
            .exponent
            .cmp(&other.exponent)
            .then_with(|| self.mantissa.abs().cmp(&other.mantissa.abs()));

        if self.is_negative() {
            magnitude.reverse()
        } else {
            magnitude
        }
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Text form
// ---------------------------------------------------------------------------

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }

        let digits = self.mantissa.unsigned_abs().to_string();
        let len = digits.len() as i32;
        let point = len + self.exponent;

        let mut text = if point <= 0 {
            format!("0.{}{}", "0".repeat((-point) as usize), digits)
        } else if point >= len {
            format!("{}{}", digits, "0".repeat((point - len) as usize))
        } else {
            let (int_part, frac_part) = digits.split_at(point as usize);
            format!("{}.{}", int_part, frac_part)
        };

        if text.contains('.') {
            let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
            text.truncate(trimmed);
        }

        if self.is_negative() {
            f.write_str("-")?;
        }
        f.write_str(&text)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `[-+]digits[.digits][e[-+]digits]`. Digits beyond the
    /// eighteenth significant one are truncated before normalization.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AmountError::Parse(s.to_string());

        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (body, mut exponent) = match body.find(['e', 'E']) {
            Some(i) => {
                let exp: i32 = body[i + 1..].parse().map_err(|_| invalid())?;
                (&body[..i], exp)
            }
            None => (body, 0),
        };

        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        let mut significant = 0u32;
        for b in int_part.bytes() {
            if significant < 18 {
                mantissa = mantissa * 10 + i128::from(b - b'0');
                if mantissa != 0 {
                    significant += 1;
                }
            } else {
                exponent = exponent.saturating_add(1);
            }
        }
        for b in frac_part.bytes() {
            if significant < 18 {
                mantissa = mantissa * 10 + i128::from(b - b'0');
                if mantissa != 0 {
                    significant += 1;
                }
                exponent = exponent.saturating_sub(1);
            }
        }

        Self::normalize(if negative { -mantissa } else { mantissa }, exponent)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Kubernetes resource quantities (`250m`, `2`, `16Gi`, `1e3`).
//!
//! Values are held as a signed count of nano-units so that CPU millis and
//! memory bytes can be summed and compared exactly. Fractions finer than a
//! nano-unit round up, matching the API server.

use std::{
	cmp::Ordering,
	fmt,
	hash::{Hash, Hasher},
	iter::Sum,
	ops::{Add, AddAssign},
	str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// Decimal exponents tried when rendering, largest first.
const DECIMAL_EXPONENTS: [i32; 10] = [18, 15, 12, 9, 6, 3, 0, -3, -6, -9];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
	#[error("empty quantity")]
	Empty,

	#[error("invalid quantity `{0}`")]
	Invalid(String),

	#[error("unknown suffix `{suffix}` in quantity `{input}`")]
	UnknownSuffix { input: String, suffix: String },

	#[error("quantity `{0}` is out of range")]
	OutOfRange(String),
}

/// How a quantity was written, used to pick a suffix when rendering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
	/// `k`, `M`, `m`, ... or no suffix.
	#[default]
	DecimalSi,
	/// `Ki`, `Mi`, `Gi`, ...
	BinarySi,
	/// `e3`, `E6`, ...
	DecimalExponent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
	nanos: i128,
	format: Format,
}

enum Scale {
	Decimal(i32),
	Binary(u32),
}

impl Quantity {
	pub const fn zero() -> Self {
		Self {
			nanos: 0,
			format: Format::DecimalSi,
		}
	}

	pub fn is_zero(&self) -> bool {
		self.nanos == 0
	}

	pub fn format(&self) -> Format {
		self.format
	}

	/// Whole units, rounded up (`1500m` is 2).
	pub fn value(&self) -> i64 {
		let units = if self.nanos >= 0 {
			ceil_div(self.nanos, NANOS_PER_UNIT)
		} else {
			-((-self.nanos) / NANOS_PER_UNIT)
		};
		i64::try_from(units).unwrap_or(if units > 0 { i64::MAX } else { i64::MIN })
	}
}

fn ceil_div(a: i128, b: i128) -> i128 {
	a / b + i128::from(a % b != 0)
}

fn parse_scale(input: &str, suffix: &str) -> Result<(Scale, Format), QuantityError> {
	let scale = match suffix {
		"" => (Scale::Decimal(0), Format::DecimalSi),
		"n" => (Scale::Decimal(-9), Format::DecimalSi),
		"u" => (Scale::Decimal(-6), Format::DecimalSi),
		"m" => (Scale::Decimal(-3), Format::DecimalSi),
		"k" => (Scale::Decimal(3), Format::DecimalSi),
		"M" => (Scale::Decimal(6), Format::DecimalSi),
		"G" => (Scale::Decimal(9), Format::DecimalSi),
		"T" => (Scale::Decimal(12), Format::DecimalSi),
		"P" => (Scale::Decimal(15), Format::DecimalSi),
		"E" => (Scale::Decimal(18), Format::DecimalSi),
		"Ki" => (Scale::Binary(1), Format::BinarySi),
		"Mi" => (Scale::Binary(2), Format::BinarySi),
		"Gi" => (Scale::Binary(3), Format::BinarySi),
		"Ti" => (Scale::Binary(4), Format::BinarySi),
		"Pi" => (Scale::Binary(5), Format::BinarySi),
		"Ei" => (Scale::Binary(6), Format::BinarySi),
		other => {
			let exponent = other
				.strip_prefix('e')
				.or_else(|| other.strip_prefix('E'))
				.and_then(|e| e.parse::<i32>().ok())
				.ok_or_else(|| QuantityError::UnknownSuffix {
					input: input.to_string(),
					suffix: other.to_string(),
				})?;
			(Scale::Decimal(exponent), Format::DecimalExponent)
		}
	};
	Ok(scale)
}

impl FromStr for Quantity {
	type Err = QuantityError;

	fn from_str(input: &str) -> Result<Self, Self::Err> {
		let trimmed = input.trim();
		if trimmed.is_empty() {
			return Err(QuantityError::Empty);
		}

		let (negative, rest) = match trimmed.as_bytes()[0] {
			b'-' => (true, &trimmed[1..]),
			b'+' => (false, &trimmed[1..]),
			_ => (false, trimmed),
		};

		let number_end = rest
			.find(|c: char| !(c.is_ascii_digit() || c == '.'))
			.unwrap_or(rest.len());
		let (number, suffix) = rest.split_at(number_end);

		let invalid = || QuantityError::Invalid(input.to_string());
		let out_of_range = || QuantityError::OutOfRange(input.to_string());

		let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
		if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
			return Err(invalid());
		}

		let mut mantissa: i128 = 0;
		for digit in int_part.bytes().chain(frac_part.bytes()) {
			mantissa = mantissa
				.checked_mul(10)
				.and_then(|m| m.checked_add(i128::from(digit - b'0')))
				.ok_or_else(out_of_range)?;
		}
		let frac_digits = i32::try_from(frac_part.len()).map_err(|_| out_of_range())?;

		let (scale, format) = parse_scale(input, suffix)?;

		let nanos = match scale {
			Scale::Decimal(exponent) => {
				let total = exponent
					.checked_add(9)
					.and_then(|e| e.checked_sub(frac_digits))
					.ok_or_else(out_of_range)?;
				if total >= 0 {
					let factor = 10i128
						.checked_pow(total as u32)
						.ok_or_else(out_of_range)?;
					mantissa.checked_mul(factor).ok_or_else(out_of_range)?
				} else if mantissa == 0 {
					0
				} else {
					match 10i128.checked_pow((-total) as u32) {
						Some(divisor) => ceil_div(mantissa, divisor),
						// Smaller than a nano-unit: rounds up to one.
						None => 1,
					}
				}
			}
			Scale::Binary(power) => {
				let numerator = 1024i128
					.checked_pow(power)
					.and_then(|f| mantissa.checked_mul(f))
					.and_then(|m| m.checked_mul(NANOS_PER_UNIT))
					.ok_or_else(out_of_range)?;
				let divisor = 10i128
					.checked_pow(frac_digits as u32)
					.ok_or_else(out_of_range)?;
				ceil_div(numerator, divisor)
			}
		};

		Ok(Self {
			nanos: if negative { -nanos } else { nanos },
			format,
		})
	}
}

impl fmt::Display for Quantity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.nanos == 0 {
			return write!(f, "0");
		}
		let sign = if self.nanos < 0 { "-" } else { "" };
		let abs = self.nanos.unsigned_abs();
		let nanos_per_unit = NANOS_PER_UNIT as u128;

		if self.format == Format::BinarySi && abs % nanos_per_unit == 0 {
			let units = abs / nanos_per_unit;
			for power in (1..BINARY_SUFFIXES.len()).rev() {
				let factor = 1024u128.pow(power as u32);
				if units % factor == 0 {
					return write!(f, "{sign}{}{}", units / factor, BINARY_SUFFIXES[power]);
				}
			}
			return write!(f, "{sign}{units}");
		}

		for exponent in DECIMAL_EXPONENTS {
			let factor = 10u128.pow((exponent + 9) as u32);
			if abs % factor != 0 {
				continue;
			}
			let scaled = abs / factor;
			let suffix = match (self.format, exponent) {
				(_, 0) => String::new(),
				(Format::DecimalExponent, e) => format!("e{e}"),
				(_, 18) => "E".to_string(),
				(_, 15) => "P".to_string(),
				(_, 12) => "T".to_string(),
				(_, 9) => "G".to_string(),
				(_, 6) => "M".to_string(),
				(_, 3) => "k".to_string(),
				(_, -3) => "m".to_string(),
				(_, -6) => "u".to_string(),
				_ => "n".to_string(),
			};
			return write!(f, "{sign}{scaled}{suffix}");
		}
		unreachable!("every nano count is divisible by 10^0")
	}
}

impl PartialEq for Quantity {
	fn eq(&self, other: &Self) -> bool {
		self.nanos == other.nanos
	}
}

impl Eq for Quantity {}

impl Hash for Quantity {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.nanos.hash(state);
	}
}

impl PartialOrd for Quantity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Quantity {
	fn cmp(&self, other: &Self) -> Ordering {
		self.nanos.cmp(&other.nanos)
	}
}

impl Add for Quantity {
	type Output = Quantity;

	fn add(self, rhs: Self) -> Self::Output {
		// A zero accumulator takes on the format of whatever is added first.
		let format = if self.nanos == 0 {
			rhs.format
		} else {
			self.format
		};
		Quantity {
			nanos: self.nanos.saturating_add(rhs.nanos),
			format,
		}
	}
}

impl AddAssign for Quantity {
	fn add_assign(&mut self, rhs: Self) {
		*self = *self + rhs;
	}
}

impl Sum for Quantity {
	fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
		iter.fold(Quantity::zero(), Add::add)
	}
}

impl Serialize for Quantity {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Quantity {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn q(s: &str) -> Quantity {
		s.parse().unwrap()
	}

	#[rstest]
	#[case("0", "0")]
	#[case("2", "2")]
	#[case("500m", "500m")]
	#[case("1.5", "1500m")]
	#[case("0.1", "100m")]
	#[case("4000", "4k")]
	#[case("16Gi", "16Gi")]
	#[case("1536Mi", "1536Mi")]
	#[case("1024Mi", "1Gi")]
	#[case("1e3", "1e3")]
	#[case("100n", "100n")]
	#[case("-2", "-2")]
	fn test_roundtrip_rendering(#[case] input: &str, #[case] rendered: &str) {
		assert_eq!(q(input).to_string(), rendered);
	}

	#[rstest]
	#[case("")]
	#[case("abc")]
	#[case("1.2.3")]
	#[case("5Qi")]
	#[case(".")]
	#[case("Gi")]
	fn test_invalid(#[case] input: &str) {
		assert!(input.parse::<Quantity>().is_err(), "{input:?} should not parse");
	}

	#[test]
	fn test_unknown_suffix_error() {
		assert_eq!(
			"3Qi".parse::<Quantity>(),
			Err(QuantityError::UnknownSuffix {
				input: "3Qi".to_string(),
				suffix: "Qi".to_string(),
			})
		);
	}

	#[test]
	fn test_addition_is_numeric() {
		assert_eq!((q("2") + q("500m")).to_string(), "2500m");
		assert_eq!((q("1Gi") + q("512Mi")).to_string(), "1536Mi");
		let total: Quantity = ["8", "8", "16"].iter().map(|s| q(s)).sum();
		assert_eq!(total.to_string(), "32");
	}

	#[test]
	fn test_zero_accumulator_adopts_format() {
		let total: Quantity = ["8Gi", "8Gi"].iter().map(|s| q(s)).sum();
		assert_eq!(total.format(), Format::BinarySi);
		assert_eq!(total.to_string(), "16Gi");

		let empty: Quantity = std::iter::empty().sum();
		assert_eq!(empty.to_string(), "0");
	}

	#[rstest]
	#[case("1Gi", "1000Mi", Ordering::Greater)]
	#[case("1G", "1Gi", Ordering::Less)]
	#[case("1500m", "2", Ordering::Less)]
	#[case("0.5", "500m", Ordering::Equal)]
	#[case("1e3", "1k", Ordering::Equal)]
	fn test_compare(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
		assert_eq!(q(a).cmp(&q(b)), expected);
	}

	#[test]
	fn test_value_rounds_up() {
		assert_eq!(q("1500m").value(), 2);
		assert_eq!(q("4").value(), 4);
		assert_eq!(q("1Ki").value(), 1024);
		assert_eq!(q("0.5").value(), 1);
	}

	#[test]
	fn test_serde_as_string() {
		let json = serde_json::to_string(&q("250m")).unwrap();
		assert_eq!(json, "\"250m\"");
		let back: Quantity = serde_json::from_str("\"16Gi\"").unwrap();
		assert_eq!(back, q("16Gi"));
	}
}

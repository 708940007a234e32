//! Attribute values
//!
//! A single EXIF attribute is a typed, fixed-encoding value plus its raw
//! byte form. The raw bytes are authoritative: they are what gets written
//! back into the directory on save, and typed accessors decode them on
//! demand using the byte order of the owning TIFF block.

use crate::error::{Error, Result};

/// Byte order for multi-byte TIFF values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub(crate) fn read_u16(&self, data: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([data[0], data[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([data[0], data[1]]),
        }
    }

    pub(crate) fn read_u32(&self, data: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            ByteOrder::BigEndian => u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
        }
    }

    pub(crate) fn read_f32(&self, data: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(data))
    }

    pub(crate) fn read_f64(&self, data: &[u8]) -> f64 {
        let lo = self.read_u32(&data[0..4]) as u64;
        let hi = self.read_u32(&data[4..8]) as u64;
        match self {
            ByteOrder::LittleEndian => f64::from_bits((hi << 32) | lo),
            ByteOrder::BigEndian => f64::from_bits((lo << 32) | hi),
        }
    }

    pub(crate) fn put_u16(&self, out: &mut Vec<u8>, value: u16) {
        match self {
            ByteOrder::LittleEndian => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::BigEndian => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn put_u32(&self, out: &mut Vec<u8>, value: u32) {
        match self {
            ByteOrder::LittleEndian => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::BigEndian => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn put_f64(&self, out: &mut Vec<u8>, value: f64) {
        match self {
            ByteOrder::LittleEndian => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::BigEndian => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// TIFF wire formats for attribute values
///
/// The discriminants are the on-disk format codes. `Ifd` is the TIFF 6.0
/// sub-IFD pointer format; a handful of writers use it for the EXIF and GPS
/// pointer tags instead of `ULong`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExifFormat {
    Byte = 1,
    Ascii = 2,
    UShort = 3,
    ULong = 4,
    URational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Single = 11,
    Double = 12,
    Ifd = 13,
}

impl ExifFormat {
    /// Map an on-disk format code, rejecting out-of-range values.
    pub fn from_raw(raw: u16) -> Option<ExifFormat> {
        Some(match raw {
            1 => ExifFormat::Byte,
            2 => ExifFormat::Ascii,
            3 => ExifFormat::UShort,
            4 => ExifFormat::ULong,
            5 => ExifFormat::URational,
            6 => ExifFormat::SByte,
            7 => ExifFormat::Undefined,
            8 => ExifFormat::SShort,
            9 => ExifFormat::SLong,
            10 => ExifFormat::SRational,
            11 => ExifFormat::Single,
            12 => ExifFormat::Double,
            13 => ExifFormat::Ifd,
            _ => return None,
        })
    }

    /// Bytes per component for this format
    pub fn unit_size(self) -> usize {
        match self {
            ExifFormat::Byte | ExifFormat::Ascii | ExifFormat::SByte | ExifFormat::Undefined => 1,
            ExifFormat::UShort | ExifFormat::SShort => 2,
            ExifFormat::ULong | ExifFormat::SLong | ExifFormat::Single | ExifFormat::Ifd => 4,
            ExifFormat::URational | ExifFormat::SRational | ExifFormat::Double => 8,
        }
    }

    /// Whether a stored format satisfies this accepted format.
    ///
    /// A stored format matches if it is the accepted format itself, if the
    /// accepted format is `Undefined` (accepts anything), or if the stored
    /// format is the narrower width of an accepted wider slot (ushort in a
    /// ulong slot, sshort in a slong slot, single in a double slot). Real
    /// files from non-conforming writers rely on the widening cases.
    pub fn accepts(self, stored: ExifFormat) -> bool {
        if self == stored || self == ExifFormat::Undefined {
            return true;
        }
        matches!(
            (self, stored),
            (ExifFormat::ULong, ExifFormat::UShort)
                | (ExifFormat::SLong, ExifFormat::SShort)
                | (ExifFormat::Double, ExifFormat::Single)
        )
    }
}

/// Unsigned numerator/denominator pair, EXIF's native fixed-ratio encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn to_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }

    /// Best rational approximation of a decimal value.
    ///
    /// Walks the continued-fraction convergents of `value` until the
    /// relative error drops below 1e-8 or the next convergent would leave
    /// the representable range.
    pub fn approximate(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Rational::new(0, 1);
        }
        if value >= u32::MAX as f64 {
            return Rational::new(u32::MAX, 1);
        }

        let (mut h0, mut k0) = (0u64, 1u64);
        let (mut h1, mut k1) = (1u64, 0u64);
        let mut x = value;

        loop {
            let a = x.floor();
            if a >= u32::MAX as f64 {
                break;
            }
            let h2 = a as u64 * h1 + h0;
            let k2 = a as u64 * k1 + k0;
            if h2 > u32::MAX as u64 || k2 > u32::MAX as u64 {
                break;
            }
            h0 = h1;
            k0 = k1;
            h1 = h2;
            k1 = k2;

            if k1 > 0 && ((h1 as f64 / k1 as f64) - value).abs() <= value * 1e-8 {
                break;
            }
            let frac = x - a;
            if frac < 1e-12 {
                break;
            }
            x = 1.0 / frac;
        }

        Rational::new(h1 as u32, k1.max(1) as u32)
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Signed rational pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SRational {
    pub numerator: i32,
    pub denominator: i32,
}

impl SRational {
    pub fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn to_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

impl std::fmt::Display for SRational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// One attribute: format, component count and raw value bytes
///
/// `source_offset` is the file-absolute offset of the value bytes and is
/// only present while the owning file has not been rewritten.
#[derive(Debug, Clone)]
pub struct ExifAttribute {
    pub format: ExifFormat,
    pub components: u32,
    pub bytes: Vec<u8>,
    pub source_offset: Option<u64>,
}

impl ExifAttribute {
    pub(crate) fn new(format: ExifFormat, components: u32, bytes: Vec<u8>) -> Self {
        Self {
            format,
            components,
            bytes,
            source_offset: None,
        }
    }

    /// NUL-terminated ASCII string attribute
    pub fn ascii(value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let components = bytes.len() as u32;
        Self::new(ExifFormat::Ascii, components, bytes)
    }

    /// Opaque byte-sequence attribute
    pub fn undefined(value: &[u8]) -> Self {
        Self::new(ExifFormat::Undefined, value.len() as u32, value.to_vec())
    }

    pub fn ubyte(values: &[u8]) -> Self {
        Self::new(ExifFormat::Byte, values.len() as u32, values.to_vec())
    }

    pub fn ushort(values: &[u16], order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 2);
        for &v in values {
            order.put_u16(&mut bytes, v);
        }
        Self::new(ExifFormat::UShort, values.len() as u32, bytes)
    }

    pub fn ulong(values: &[u32], order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for &v in values {
            order.put_u32(&mut bytes, v);
        }
        Self::new(ExifFormat::ULong, values.len() as u32, bytes)
    }

    pub fn slong(values: &[i32], order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for &v in values {
            order.put_u32(&mut bytes, v as u32);
        }
        Self::new(ExifFormat::SLong, values.len() as u32, bytes)
    }

    pub fn urational(values: &[Rational], order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            order.put_u32(&mut bytes, v.numerator);
            order.put_u32(&mut bytes, v.denominator);
        }
        Self::new(ExifFormat::URational, values.len() as u32, bytes)
    }

    pub fn srational(values: &[SRational], order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            order.put_u32(&mut bytes, v.numerator as u32);
            order.put_u32(&mut bytes, v.denominator as u32);
        }
        Self::new(ExifFormat::SRational, values.len() as u32, bytes)
    }

    pub fn double_values(values: &[f64], order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for &v in values {
            order.put_f64(&mut bytes, v);
        }
        Self::new(ExifFormat::Double, values.len() as u32, bytes)
    }

    /// Total byte length the value occupies on disk
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    fn component_slice(&self, index: usize) -> Option<&[u8]> {
        let unit = self.format.unit_size();
        let start = index * unit;
        self.bytes.get(start..start + unit)
    }

    fn nth_i64(&self, index: usize, order: ByteOrder) -> Option<i64> {
        let slice = self.component_slice(index)?;
        Some(match self.format {
            ExifFormat::Byte | ExifFormat::Undefined => slice[0] as i64,
            ExifFormat::SByte => slice[0] as i8 as i64,
            ExifFormat::UShort => order.read_u16(slice) as i64,
            ExifFormat::SShort => order.read_u16(slice) as i16 as i64,
            ExifFormat::ULong | ExifFormat::Ifd => order.read_u32(slice) as i64,
            ExifFormat::SLong => order.read_u32(slice) as i32 as i64,
            _ => return None,
        })
    }

    /// All components as integers, for the integer formats
    pub fn int_values(&self, order: ByteOrder) -> Option<Vec<i64>> {
        (0..self.components as usize)
            .map(|i| self.nth_i64(i, order))
            .collect()
    }

    /// All components as unsigned rationals
    pub fn rational_values(&self, order: ByteOrder) -> Option<Vec<Rational>> {
        if self.format != ExifFormat::URational {
            return None;
        }
        (0..self.components as usize)
            .map(|i| {
                let slice = self.component_slice(i)?;
                Some(Rational::new(
                    order.read_u32(&slice[0..4]),
                    order.read_u32(&slice[4..8]),
                ))
            })
            .collect()
    }

    /// First component as an integer
    ///
    /// ASCII values are parsed as decimal text; rational and floating
    /// formats do not convert.
    pub fn int_value(&self, order: ByteOrder) -> Option<i64> {
        match self.format {
            ExifFormat::Ascii => self.string_value(order)?.trim().parse().ok(),
            _ => self.nth_i64(0, order),
        }
    }

    /// First component as a floating value, including the rational formats
    pub fn double_value(&self, order: ByteOrder) -> Option<f64> {
        match self.format {
            ExifFormat::URational => {
                let slice = self.component_slice(0)?;
                Some(Rational::new(order.read_u32(&slice[0..4]), order.read_u32(&slice[4..8])).to_f64())
            }
            ExifFormat::SRational => {
                let slice = self.component_slice(0)?;
                Some(
                    SRational::new(
                        order.read_u32(&slice[0..4]) as i32,
                        order.read_u32(&slice[4..8]) as i32,
                    )
                    .to_f64(),
                )
            }
            ExifFormat::Single => Some(order.read_f32(self.component_slice(0)?) as f64),
            ExifFormat::Double => Some(order.read_f64(self.component_slice(0)?)),
            ExifFormat::Ascii => self.string_value(order)?.trim().parse().ok(),
            _ => self.nth_i64(0, order).map(|v| v as f64),
        }
    }

    /// String form of the value
    ///
    /// ASCII and undefined values decode as text with trailing NULs
    /// trimmed; numeric formats render comma-joined components, rationals
    /// as `numerator/denominator`.
    pub fn string_value(&self, order: ByteOrder) -> Option<String> {
        match self.format {
            ExifFormat::Ascii | ExifFormat::Undefined => {
                let end = self
                    .bytes
                    .iter()
                    .rposition(|&b| b != 0)
                    .map(|p| p + 1)
                    .unwrap_or(0);
                Some(String::from_utf8_lossy(&self.bytes[..end]).into_owned())
            }
            ExifFormat::URational => {
                let values = self.rational_values(order)?;
                Some(
                    values
                        .iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                )
            }
            ExifFormat::SRational => {
                let mut parts = Vec::with_capacity(self.components as usize);
                for i in 0..self.components as usize {
                    let slice = self.component_slice(i)?;
                    parts.push(
                        SRational::new(
                            order.read_u32(&slice[0..4]) as i32,
                            order.read_u32(&slice[4..8]) as i32,
                        )
                        .to_string(),
                    );
                }
                Some(parts.join(","))
            }
            ExifFormat::Single => {
                let mut parts = Vec::with_capacity(self.components as usize);
                for i in 0..self.components as usize {
                    parts.push(order.read_f32(self.component_slice(i)?).to_string());
                }
                Some(parts.join(","))
            }
            ExifFormat::Double => {
                let mut parts = Vec::with_capacity(self.components as usize);
                for i in 0..self.components as usize {
                    parts.push(order.read_f64(self.component_slice(i)?).to_string());
                }
                Some(parts.join(","))
            }
            _ => {
                let values = self.int_values(order)?;
                Some(
                    values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                )
            }
        }
    }

    /// Build an attribute from a textual value for a tag accepting the
    /// given formats.
    ///
    /// The value string is classified (integer list, rational list,
    /// decimal list, free text) and encoded with the first accepted format
    /// it satisfies, primary first. Fails when no accepted format can
    /// represent the value.
    pub fn from_string(
        primary: ExifFormat,
        secondary: Option<ExifFormat>,
        value: &str,
        order: ByteOrder,
    ) -> Result<ExifAttribute> {
        let parsed = ParsedText::classify(value);
        for format in std::iter::once(primary).chain(secondary) {
            if let Some(attr) = parsed.encode_as(format, value, order) {
                return Ok(attr);
            }
        }
        Err(Error::InvalidArgument(format!(
            "value {value:?} does not fit formats {primary:?}/{secondary:?}"
        )))
    }
}

/// Classified form of a textual attribute value
enum ParsedText {
    Ints(Vec<i64>),
    Rationals(Vec<(i64, i64)>),
    Doubles(Vec<f64>),
    Text,
}

impl ParsedText {
    fn classify(value: &str) -> ParsedText {
        let parts: Vec<&str> = value.split(',').collect();

        if let Some(ints) = parts
            .iter()
            .map(|p| p.trim().parse::<i64>().ok())
            .collect::<Option<Vec<_>>>()
        {
            return ParsedText::Ints(ints);
        }

        if parts.iter().all(|p| p.contains('/')) {
            let rationals = parts
                .iter()
                .map(|p| {
                    let (n, d) = p.trim().split_once('/')?;
                    Some((n.trim().parse::<i64>().ok()?, d.trim().parse::<i64>().ok()?))
                })
                .collect::<Option<Vec<_>>>();
            if let Some(rationals) = rationals {
                return ParsedText::Rationals(rationals);
            }
        }

        if let Some(doubles) = parts
            .iter()
            .map(|p| p.trim().parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()
        {
            return ParsedText::Doubles(doubles);
        }

        ParsedText::Text
    }

    fn encode_as(&self, format: ExifFormat, raw: &str, order: ByteOrder) -> Option<ExifAttribute> {
        match format {
            ExifFormat::Ascii => Some(ExifAttribute::ascii(raw)),
            ExifFormat::Undefined => Some(ExifAttribute::undefined(raw.as_bytes())),
            ExifFormat::Byte => match self {
                ParsedText::Ints(ints) if ints.iter().all(|&v| (0..=255).contains(&v)) => Some(
                    ExifAttribute::ubyte(&ints.iter().map(|&v| v as u8).collect::<Vec<_>>()),
                ),
                _ => None,
            },
            ExifFormat::UShort => match self {
                ParsedText::Ints(ints) if ints.iter().all(|&v| (0..=65535).contains(&v)) => {
                    Some(ExifAttribute::ushort(
                        &ints.iter().map(|&v| v as u16).collect::<Vec<_>>(),
                        order,
                    ))
                }
                _ => None,
            },
            ExifFormat::ULong | ExifFormat::Ifd => match self {
                ParsedText::Ints(ints)
                    if ints.iter().all(|&v| (0..=u32::MAX as i64).contains(&v)) =>
                {
                    Some(ExifAttribute::ulong(
                        &ints.iter().map(|&v| v as u32).collect::<Vec<_>>(),
                        order,
                    ))
                }
                _ => None,
            },
            ExifFormat::SLong | ExifFormat::SShort | ExifFormat::SByte => match self {
                ParsedText::Ints(ints)
                    if ints
                        .iter()
                        .all(|&v| (i32::MIN as i64..=i32::MAX as i64).contains(&v)) =>
                {
                    Some(ExifAttribute::slong(
                        &ints.iter().map(|&v| v as i32).collect::<Vec<_>>(),
                        order,
                    ))
                }
                _ => None,
            },
            ExifFormat::URational => match self {
                ParsedText::Rationals(pairs)
                    if pairs
                        .iter()
                        .all(|&(n, d)| n >= 0 && d > 0 && n <= u32::MAX as i64 && d <= u32::MAX as i64) =>
                {
                    Some(ExifAttribute::urational(
                        &pairs
                            .iter()
                            .map(|&(n, d)| Rational::new(n as u32, d as u32))
                            .collect::<Vec<_>>(),
                        order,
                    ))
                }
                ParsedText::Ints(ints) if ints.iter().all(|&v| v >= 0 && v <= u32::MAX as i64) => {
                    Some(ExifAttribute::urational(
                        &ints
                            .iter()
                            .map(|&v| Rational::new(v as u32, 1))
                            .collect::<Vec<_>>(),
                        order,
                    ))
                }
                ParsedText::Doubles(doubles) if doubles.iter().all(|&v| v >= 0.0) => {
                    Some(ExifAttribute::urational(
                        &doubles
                            .iter()
                            .map(|&v| Rational::approximate(v))
                            .collect::<Vec<_>>(),
                        order,
                    ))
                }
                _ => None,
            },
            ExifFormat::SRational => match self {
                ParsedText::Rationals(pairs)
                    if pairs.iter().all(|&(n, d)| {
                        (i32::MIN as i64..=i32::MAX as i64).contains(&n)
                            && (i32::MIN as i64..=i32::MAX as i64).contains(&d)
                            && d != 0
                    }) =>
                {
                    Some(ExifAttribute::srational(
                        &pairs
                            .iter()
                            .map(|&(n, d)| SRational::new(n as i32, d as i32))
                            .collect::<Vec<_>>(),
                        order,
                    ))
                }
                ParsedText::Ints(ints)
                    if ints
                        .iter()
                        .all(|&v| (i32::MIN as i64..=i32::MAX as i64).contains(&v)) =>
                {
                    Some(ExifAttribute::srational(
                        &ints
                            .iter()
                            .map(|&v| SRational::new(v as i32, 1))
                            .collect::<Vec<_>>(),
                        order,
                    ))
                }
                ParsedText::Doubles(doubles) => Some(ExifAttribute::srational(
                    &doubles
                        .iter()
                        .map(|&v| {
                            let r = Rational::approximate(v.abs());
                            let sign = if v < 0.0 { -1 } else { 1 };
                            SRational::new(
                                sign * r.numerator.min(i32::MAX as u32) as i32,
                                r.denominator.min(i32::MAX as u32) as i32,
                            )
                        })
                        .collect::<Vec<_>>(),
                    order,
                )),
                _ => None,
            },
            ExifFormat::Single | ExifFormat::Double => match self {
                ParsedText::Doubles(doubles) => Some(ExifAttribute::double_values(doubles, order)),
                ParsedText::Ints(ints) => Some(ExifAttribute::double_values(
                    &ints.iter().map(|&v| v as f64).collect::<Vec<_>>(),
                    order,
                )),
                ParsedText::Rationals(pairs) => Some(ExifAttribute::double_values(
                    &pairs
                        .iter()
                        .map(|&(n, d)| if d == 0 { 0.0 } else { n as f64 / d as f64 })
                        .collect::<Vec<_>>(),
                    order,
                )),
                _ => None,
            },
        }
    }
}

/// Canonical EXIF date-time form: `"YYYY:MM:DD HH:MM:SS"`.
///
/// The legacy `"YYYY-MM-DD HH:MM:SS"` form is accepted and normalized.
/// Both are validated by exact length and per-position pattern before any
/// attribute is touched.
pub(crate) fn normalize_datetime(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    if bytes.len() != 19 {
        return Err(Error::InvalidArgument(format!(
            "date-time {value:?} must be 19 characters"
        )));
    }
    let sep = bytes[4];
    if (sep != b':' && sep != b'-') || bytes[7] != sep {
        return Err(Error::InvalidArgument(format!("malformed date-time {value:?}")));
    }
    for (i, &b) in bytes.iter().enumerate() {
        match i {
            4 | 7 => {}
            10 => {
                if b != b' ' {
                    return Err(Error::InvalidArgument(format!("malformed date-time {value:?}")));
                }
            }
            13 | 16 => {
                if b != b':' {
                    return Err(Error::InvalidArgument(format!("malformed date-time {value:?}")));
                }
            }
            _ => {
                if !b.is_ascii_digit() {
                    return Err(Error::InvalidArgument(format!("malformed date-time {value:?}")));
                }
            }
        }
    }
    if sep == b'-' {
        let mut normalized = value.to_string();
        normalized.replace_range(4..5, ":");
        normalized.replace_range(7..8, ":");
        Ok(normalized)
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order() {
        let be = ByteOrder::BigEndian;
        let le = ByteOrder::LittleEndian;

        assert_eq!(be.read_u16(&[0x12, 0x34]), 0x1234);
        assert_eq!(le.read_u16(&[0x34, 0x12]), 0x1234);

        assert_eq!(be.read_u32(&[0x12, 0x34, 0x56, 0x78]), 0x12345678);
        assert_eq!(le.read_u32(&[0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_rational_approximation() {
        let r = Rational::approximate(2.8);
        assert!((r.to_f64() - 2.8).abs() < 1e-6);

        let r = Rational::approximate(1.0 / 250.0);
        assert!((r.to_f64() - 0.004).abs() < 1e-9);

        assert_eq!(Rational::approximate(0.0), Rational::new(0, 1));
        assert_eq!(Rational::approximate(f64::NAN), Rational::new(0, 1));
        assert_eq!(Rational::approximate(3.0), Rational::new(3, 1));
    }

    #[test]
    fn test_format_compatibility() {
        assert!(ExifFormat::ULong.accepts(ExifFormat::UShort));
        assert!(ExifFormat::SLong.accepts(ExifFormat::SShort));
        assert!(ExifFormat::Double.accepts(ExifFormat::Single));
        assert!(ExifFormat::Undefined.accepts(ExifFormat::Ascii));
        assert!(!ExifFormat::UShort.accepts(ExifFormat::ULong));
        assert!(!ExifFormat::Ascii.accepts(ExifFormat::UShort));
    }

    #[test]
    fn test_ascii_round_trip() {
        let attr = ExifAttribute::ascii("hello");
        assert_eq!(attr.components, 6);
        assert_eq!(
            attr.string_value(ByteOrder::LittleEndian).as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_ushort_values() {
        let attr = ExifAttribute::ushort(&[6], ByteOrder::BigEndian);
        assert_eq!(attr.int_value(ByteOrder::BigEndian), Some(6));
        assert_eq!(
            attr.string_value(ByteOrder::BigEndian).as_deref(),
            Some("6")
        );
    }

    #[test]
    fn test_urational_string_form() {
        let attr = ExifAttribute::urational(
            &[Rational::new(11, 1), Rational::new(5, 1), Rational::new(32, 1)],
            ByteOrder::LittleEndian,
        );
        assert_eq!(
            attr.string_value(ByteOrder::LittleEndian).as_deref(),
            Some("11/1,5/1,32/1")
        );
    }

    #[test]
    fn test_from_string_picks_accepted_format() {
        let attr = ExifAttribute::from_string(
            ExifFormat::UShort,
            Some(ExifFormat::ULong),
            "6",
            ByteOrder::LittleEndian,
        )
        .unwrap();
        assert_eq!(attr.format, ExifFormat::UShort);

        let attr = ExifAttribute::from_string(
            ExifFormat::URational,
            None,
            "1/250",
            ByteOrder::LittleEndian,
        )
        .unwrap();
        assert_eq!(attr.format, ExifFormat::URational);

        assert!(ExifAttribute::from_string(
            ExifFormat::UShort,
            None,
            "not a number",
            ByteOrder::LittleEndian
        )
        .is_err());
    }

    #[test]
    fn test_normalize_datetime() {
        assert_eq!(
            normalize_datetime("2024:05:01 10:20:30").unwrap(),
            "2024:05:01 10:20:30"
        );
        assert_eq!(
            normalize_datetime("2024-05-01 10:20:30").unwrap(),
            "2024:05:01 10:20:30"
        );
        assert!(normalize_datetime("2024:05:01").is_err());
        assert!(normalize_datetime("2024:05:01 10-20-30").is_err());
    }
}

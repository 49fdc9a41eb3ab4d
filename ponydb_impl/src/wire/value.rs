use crate::error::{protocol_err, HdbError, HdbResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_bigint::{BigInt, Sign};
use std::io::{Read, Write};

/// Tag byte that precedes every encoded [`Value`] on the wire.
///
/// The set is intentionally non-dense: it mirrors the tags actually assigned by the
/// protocol, not a freshly invented enumeration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ValueTag {
    Null = 1,
    ShortString = 3,
    LegacyDecimal = 6,
    Decimal = 7,
    BigInt = 8,
    Timestamp = 9,
    Boolean = 12,
    Bytes = 15,
    StreamableHandle = 16,
    LongString = 18,
    Int = 24,
}

impl ValueTag {
    pub(crate) fn try_new(tag: u8) -> HdbResult<Self> {
        Ok(match tag {
            1 => Self::Null,
            3 => Self::ShortString,
            6 => Self::LegacyDecimal,
            7 => Self::Decimal,
            8 => Self::BigInt,
            9 => Self::Timestamp,
            12 => Self::Boolean,
            15 => Self::Bytes,
            16 => Self::StreamableHandle,
            18 => Self::LongString,
            24 => Self::Int,
            other => return Err(protocol_err!("unknown value tag {other}")),
        })
    }
}

/// Type of a [`Value::StreamableHandle`]; see §3, "Streamable object".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamKind {
    /// 16-bit UTF code units, 2 bytes per unit, big-endian.
    Character,
    /// Raw bytes.
    Binary,
}

impl StreamKind {
    pub(crate) fn try_new(b: u8) -> HdbResult<Self> {
        match b {
            1 => Ok(Self::Character),
            2 => Ok(Self::Binary),
            other => Err(protocol_err!("unknown streamable object type {other}")),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Character => 1,
            Self::Binary => 2,
        }
    }
}

/// An arbitrary-precision decimal, modelling the tri-state sign/NaN/infinity wire shape.
///
/// `Finite` carries an unscaled two's-complement magnitude and a decimal `scale`
/// (value = `unscaled * 10^-scale`). `NaN` and `Infinity` are transported as distinct
/// states rather than encoded as special magnitudes.
#[derive(Clone, Debug, PartialEq)]
pub enum Decimal {
    Finite { unscaled: BigInt, scale: i32 },
    NaN,
    Infinity { negative: bool },
}

impl Decimal {
    /// Constructs a finite decimal equal to the integer `v`.
    pub fn from_i64(v: i64) -> Self {
        Self::Finite {
            unscaled: BigInt::from(v),
            scale: 0,
        }
    }

    fn state_byte(&self) -> u8 {
        match self {
            Self::Finite { unscaled, .. } => {
                if unscaled.sign() == Sign::Minus {
                    1
                } else {
                    0
                }
            }
            Self::NaN => 2,
            Self::Infinity { negative: false } => 3,
            Self::Infinity { negative: true } => 4,
        }
    }

    fn decode(state: u8, scale: i32, magnitude: Vec<u8>) -> HdbResult<Self> {
        Ok(match state {
            0 => Self::Finite {
                unscaled: BigInt::from_bytes_be(Sign::Plus, &magnitude),
                scale,
            },
            1 => Self::Finite {
                unscaled: BigInt::from_bytes_be(Sign::Minus, &magnitude),
                scale,
            },
            2 => Self::NaN,
            3 => Self::Infinity { negative: false },
            4 => Self::Infinity { negative: true },
            other => return Err(protocol_err!("unknown decimal state byte {other}")),
        })
    }

    fn magnitude_bytes(&self) -> Vec<u8> {
        match self {
            Self::Finite { unscaled, .. } => unscaled.to_bytes_be().1,
            Self::NaN | Self::Infinity { .. } => Vec::new(),
        }
    }

    fn scale_or(&self) -> i32 {
        match self {
            Self::Finite { scale, .. } => *scale,
            Self::NaN | Self::Infinity { .. } => 0,
        }
    }

    /// The tag that [`Value::encode`] should use for this decimal, applying the
    /// numeric narrowing rule from §4.1: zero-scale integral values prefer the
    /// narrowest fixed-width tag that can hold them.
    fn narrowed_tag(&self) -> ValueTag {
        if let Self::Finite { unscaled, scale } = self {
            if *scale == 0 {
                if i32::try_from(unscaled.clone()).is_ok() {
                    return ValueTag::Int;
                }
                if i64::try_from(unscaled.clone()).is_ok() {
                    return ValueTag::BigInt;
                }
            }
        }
        ValueTag::Decimal
    }
}

/// A single decoded SQL cell (§3, "Typed value (TObject)").
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    BigInt(i64),
    Decimal(Decimal),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    StreamableHandle {
        kind: StreamKind,
        size: i64,
        id: i64,
    },
}

impl Value {
    /// Returns this timestamp as an [`time::OffsetDateTime`], resolving one of the
    /// two open questions in §9: the wire format stays millisecond-epoch, but callers
    /// that want a richer type can get one without doing the arithmetic themselves.
    ///
    /// # Errors
    /// Returns [`HdbError::TypeMismatch`] if `self` is not [`Value::Timestamp`], and
    /// [`HdbError::OutOfRange`] if the millisecond value is outside what `time` can
    /// represent.
    pub fn as_offset_date_time(&self) -> HdbResult<time::OffsetDateTime> {
        match self {
            Self::Timestamp(ms) => {
                time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(*ms) * 1_000_000)
                    .map_err(|e| HdbError::OutOfRange(e.to_string()))
            }
            other => Err(HdbError::TypeMismatch(format!(
                "{other:?} is not a timestamp"
            ))),
        }
    }

    fn tag(&self) -> ValueTag {
        match self {
            Self::Null => ValueTag::Null,
            Self::Int(_) => ValueTag::Int,
            Self::BigInt(_) => ValueTag::BigInt,
            Self::Decimal(d) => d.narrowed_tag(),
            Self::Timestamp(_) => ValueTag::Timestamp,
            Self::Boolean(_) => ValueTag::Boolean,
            // §4.1: prefer tag 18 unconditionally on write.
            Self::String(_) => ValueTag::LongString,
            Self::Bytes(_) => ValueTag::Bytes,
            Self::StreamableHandle { .. } => ValueTag::StreamableHandle,
        }
    }

    /// Encodes `self` as a tag byte followed by its type-specific body.
    pub fn encode<W: Write>(&self, w: &mut W) -> HdbResult<()> {
        let tag = self.tag();
        w.write_u8(tag as u8)?;
        match (self, tag) {
            (Self::Null, _) => {}
            (Self::Int(v), ValueTag::Int) => w.write_i32::<BigEndian>(*v)?,
            (Self::BigInt(v), ValueTag::BigInt) => w.write_i64::<BigEndian>(*v)?,
            (Self::Decimal(d), ValueTag::Int) => {
                let Decimal::Finite { unscaled, .. } = d else {
                    unreachable!("narrowed_tag only narrows finite decimals")
                };
                w.write_i32::<BigEndian>(i32::try_from(unscaled.clone()).unwrap())?;
            }
            (Self::Decimal(d), ValueTag::BigInt) => {
                let Decimal::Finite { unscaled, .. } = d else {
                    unreachable!("narrowed_tag only narrows finite decimals")
                };
                w.write_i64::<BigEndian>(i64::try_from(unscaled.clone()).unwrap())?;
            }
            (Self::Decimal(d), ValueTag::Decimal) => {
                let magnitude = d.magnitude_bytes();
                w.write_u8(d.state_byte())?;
                w.write_i32::<BigEndian>(d.scale_or())?;
                w.write_i32::<BigEndian>(i32::try_from(magnitude.len()).map_err(|_| {
                    protocol_err!("decimal magnitude too large ({} bytes)", magnitude.len())
                })?)?;
                w.write_all(&magnitude)?;
            }
            (Self::Timestamp(ms), _) => w.write_i64::<BigEndian>(*ms)?,
            (Self::Boolean(b), _) => w.write_u8(u8::from(*b))?,
            (Self::Bytes(bytes), _) => {
                w.write_i64::<BigEndian>(i64::try_from(bytes.len()).map_err(|_| {
                    protocol_err!("byte array too large ({} bytes)", bytes.len())
                })?)?;
                w.write_all(bytes)?;
            }
            (Self::StreamableHandle { kind, size, id }, _) => {
                w.write_u8(kind.code())?;
                w.write_i64::<BigEndian>(*size)?;
                w.write_i64::<BigEndian>(*id)?;
            }
            (Self::String(s), _) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                w.write_i32::<BigEndian>(i32::try_from(units.len()).map_err(|_| {
                    protocol_err!("string too long ({} code units)", units.len())
                })?)?;
                for unit in units {
                    w.write_u16::<BigEndian>(unit)?;
                }
            }
            (value, tag) => {
                return Err(protocol_err!("no encoding of {value:?} as tag {tag:?}"));
            }
        }
        Ok(())
    }

    /// Reads one tag byte and dispatches to the matching body reader.
    pub fn decode<R: Read>(r: &mut R) -> HdbResult<Self> {
        let tag = ValueTag::try_new(r.read_u8()?)?;
        Ok(match tag {
            ValueTag::Null => Self::Null,
            ValueTag::Int => Self::Int(r.read_i32::<BigEndian>()?),
            ValueTag::BigInt => Self::BigInt(r.read_i64::<BigEndian>()?),
            ValueTag::LegacyDecimal => {
                let scale = r.read_i32::<BigEndian>()?;
                let len = r.read_i32::<BigEndian>()?;
                let mut magnitude = vec![0u8; usize::try_from(len).unwrap_or(0)];
                r.read_exact(&mut magnitude)?;
                Self::Decimal(Decimal::Finite {
                    unscaled: BigInt::from_bytes_be(Sign::Plus, &magnitude),
                    scale,
                })
            }
            ValueTag::Decimal => {
                let state = r.read_u8()?;
                let scale = r.read_i32::<BigEndian>()?;
                let len = r.read_i32::<BigEndian>()?;
                let mut magnitude = vec![0u8; usize::try_from(len).unwrap_or(0)];
                r.read_exact(&mut magnitude)?;
                Self::Decimal(Decimal::decode(state, scale, magnitude)?)
            }
            ValueTag::Timestamp => Self::Timestamp(r.read_i64::<BigEndian>()?),
            ValueTag::Boolean => Self::Boolean(r.read_u8()? != 0),
            ValueTag::Bytes => {
                let len = r.read_i64::<BigEndian>()?;
                let mut bytes = vec![0u8; usize::try_from(len).map_err(|_| {
                    protocol_err!("negative byte array length {len}")
                })?];
                r.read_exact(&mut bytes)?;
                Self::Bytes(bytes)
            }
            ValueTag::StreamableHandle => {
                let kind = StreamKind::try_new(r.read_u8()?)?;
                let size = r.read_i64::<BigEndian>()?;
                let id = r.read_i64::<BigEndian>()?;
                Self::StreamableHandle { kind, size, id }
            }
            ValueTag::ShortString => {
                let len = r.read_i32::<BigEndian>()?;
                let mut buf = vec![0u8; usize::try_from(len).unwrap_or(0)];
                r.read_exact(&mut buf)?;
                Self::String(
                    String::from_utf8(buf).map_err(|e| protocol_err!("invalid utf-8: {e}"))?,
                )
            }
            ValueTag::LongString => {
                let count = r.read_i32::<BigEndian>()?;
                let count = usize::try_from(count)
                    .map_err(|_| protocol_err!("negative long-string length {count}"))?;
                let mut units = Vec::with_capacity(count);
                for _ in 0..count {
                    units.push(r.read_u16::<BigEndian>()?);
                }
                Self::String(
                    String::from_utf16(&units).map_err(|e| protocol_err!("invalid utf-16: {e}"))?,
                )
            }
        })
    }

    /// Exact number of bytes `encode` will write for `self`, including the tag byte.
    pub fn encoded_size(&self) -> HdbResult<usize> {
        Ok(1 + match self {
            Self::Null => 0,
            Self::Int(_) => 4,
            Self::BigInt(_) => 8,
            Self::Decimal(d) => match d.narrowed_tag() {
                ValueTag::Int => 4,
                ValueTag::BigInt => 8,
                _ => 1 + 4 + 4 + d.magnitude_bytes().len(),
            },
            Self::Timestamp(_) => 8,
            Self::Boolean(_) => 1,
            Self::Bytes(b) => 8 + b.len(),
            Self::StreamableHandle { .. } => 1 + 8 + 8,
            Self::String(s) => 4 + 2 * s.encode_utf16().count(),
        })
    }

    /// Cheap upper-bound size estimate, used for cache admission (§4.5); avoids the
    /// UTF-16 re-encoding pass that [`Value::encoded_size`] performs for strings.
    pub fn encoded_size_estimate(&self) -> usize {
        match self {
            Self::Null | Self::Boolean(_) => 2,
            Self::Int(_) => 5,
            Self::BigInt(_) | Self::Timestamp(_) => 9,
            Self::Decimal(d) => 10 + d.magnitude_bytes().len(),
            Self::Bytes(b) => 9 + b.len(),
            Self::StreamableHandle { .. } => 17,
            Self::String(s) => 5 + 2 * s.len(),
        }
    }
}

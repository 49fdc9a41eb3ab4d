use crate::error::HdbResult;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Coarse-grained internal storage kind of a column (§3, "Column description").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum InternalType {
    String = 0,
    Numeric = 1,
    Time = 2,
    Binary = 3,
    Boolean = 4,
    LargeBinary = 5,
    GenericObject = 6,
}

impl InternalType {
    fn try_new(code: i32) -> HdbResult<Self> {
        use crate::error::protocol_err;
        Ok(match code {
            0 => Self::String,
            1 => Self::Numeric,
            2 => Self::Time,
            3 => Self::Binary,
            4 => Self::Boolean,
            5 => Self::LargeBinary,
            6 => Self::GenericObject,
            other => return Err(protocol_err!("unknown internal type code {other}")),
        })
    }
}

/// Describes one column of a query result (§3, §6).
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub internal_type: InternalType,
    /// Fine-grained SQL type code, a superset aligned with a standard SQL type enumeration.
    pub sql_type: i32,
    /// Declared size; -1 means unbounded.
    pub size: i32,
    /// Decimal scale; -1 means unspecified.
    pub scale: i32,
    pub not_null: bool,
    pub unique: bool,
    /// -1 means "not part of any uniqueness group".
    pub unique_group: i32,
}

impl ColumnDescription {
    pub fn is_large_object(&self) -> bool {
        matches!(
            self.internal_type,
            InternalType::LargeBinary | InternalType::GenericObject
        )
    }

    pub(crate) fn write<W: Write>(&self, w: &mut W) -> HdbResult<()> {
        write_utf(w, &self.name)?;
        w.write_i32::<BigEndian>(self.internal_type as i32)?;
        w.write_i32::<BigEndian>(self.size)?;
        w.write_u8(u8::from(self.not_null))?;
        w.write_u8(u8::from(self.unique))?;
        w.write_i32::<BigEndian>(self.unique_group)?;
        w.write_i32::<BigEndian>(self.sql_type)?;
        w.write_i32::<BigEndian>(self.scale)?;
        Ok(())
    }

    pub(crate) fn read<R: Read>(r: &mut R) -> HdbResult<Self> {
        let name = read_utf(r)?;
        let internal_type = InternalType::try_new(r.read_i32::<BigEndian>()?)?;
        let size = r.read_i32::<BigEndian>()?;
        let not_null = r.read_u8()? != 0;
        let unique = r.read_u8()? != 0;
        let unique_group = r.read_i32::<BigEndian>()?;
        let sql_type = r.read_i32::<BigEndian>()?;
        let scale = r.read_i32::<BigEndian>()?;
        Ok(Self {
            name,
            internal_type,
            sql_type,
            size,
            scale,
            not_null,
            unique,
            unique_group,
        })
    }
}

/// Writes a `uint16`-length-prefixed UTF-8 string (the wire's `UTF` shape, §4.6).
pub(crate) fn write_utf<W: Write>(w: &mut W, s: &str) -> HdbResult<()> {
    let bytes = s.as_bytes();
    w.write_u16::<BigEndian>(u16::try_from(bytes.len()).map_err(|_| {
        crate::error::protocol_err!("UTF string too long ({} bytes)", bytes.len())
    })?)?;
    w.write_all(bytes)?;
    Ok(())
}

pub(crate) fn read_utf<R: Read>(r: &mut R) -> HdbResult<String> {
    let len = r.read_u16::<BigEndian>()?;
    let mut buf = vec![0u8; usize::from(len)];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| crate::error::protocol_err!("invalid UTF string: {e}"))
}

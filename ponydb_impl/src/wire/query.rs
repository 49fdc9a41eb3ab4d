//! Parameterised query and its success response (§3, §6).

use crate::error::HdbResult;
use crate::wire::column::{read_utf, write_utf, ColumnDescription};
use crate::wire::value::Value;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// SQL text plus an ordered, dense vector of bound parameter values (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub(crate) fn write<W: Write>(&self, w: &mut W) -> HdbResult<()> {
        write_utf(w, &self.sql)?;
        w.write_i32::<BigEndian>(i32::try_from(self.params.len()).map_err(|_| {
            crate::error::protocol_err!("too many parameters ({})", self.params.len())
        })?)?;
        for p in &self.params {
            p.encode(w)?;
        }
        Ok(())
    }

    pub(crate) fn read<R: Read>(r: &mut R) -> HdbResult<Self> {
        let sql = read_utf(r)?;
        let count = r.read_i32::<BigEndian>()?;
        let mut params = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            params.push(Value::decode(r)?);
        }
        Ok(Self { sql, params })
    }
}

/// The header of a successful `QUERY` reply (§3, "Query response"; §6 "QUERY success body").
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResponse {
    /// -1 denotes "no server-side result" (e.g. DDL/DML with no rows).
    pub result_id: i32,
    pub query_time_ms: i32,
    pub row_count: i32,
    pub columns: Vec<ColumnDescription>,
    /// Not part of the wire body; populated from a trailing warning part if the
    /// server sends one. `None` unless a warning was attached to this query.
    pub warning: Option<String>,
}

impl QueryResponse {
    pub(crate) fn write<W: Write>(&self, w: &mut W) -> HdbResult<()> {
        w.write_i32::<BigEndian>(self.result_id)?;
        w.write_i32::<BigEndian>(self.query_time_ms)?;
        w.write_i32::<BigEndian>(self.row_count)?;
        w.write_i32::<BigEndian>(i32::try_from(self.columns.len()).map_err(|_| {
            crate::error::protocol_err!("too many columns ({})", self.columns.len())
        })?)?;
        for c in &self.columns {
            c.write(w)?;
        }
        Ok(())
    }

    pub(crate) fn read<R: Read>(r: &mut R) -> HdbResult<Self> {
        let result_id = r.read_i32::<BigEndian>()?;
        let query_time_ms = r.read_i32::<BigEndian>()?;
        let row_count = r.read_i32::<BigEndian>()?;
        let column_count = r.read_i32::<BigEndian>()?;
        let mut columns = Vec::with_capacity(usize::try_from(column_count).unwrap_or(0));
        for _ in 0..column_count {
            columns.push(ColumnDescription::read(r)?);
        }
        Ok(Self {
            result_id,
            query_time_ms,
            row_count,
            columns,
            warning: None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_roundtrip() {
        let q = Query::with_params(
            "select * from t where a = ?",
            vec![Value::Int(42), Value::String("x".into())],
        );
        let mut buf = Vec::new();
        q.write(&mut buf).unwrap();
        let decoded = Query::read(&mut &buf[..]).unwrap();
        assert_eq!(decoded, q);
    }
}

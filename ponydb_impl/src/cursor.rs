//! Result cursor and row cache (C5, §4.5).
//!
//! `ResultSet` is a scrollable, forward/backward, read-only cursor over a
//! query result. Cell access goes through a small type-projection layer
//! (`get_*`) matching §4.5's getter family; row data itself is served from
//! the connection-wide [`RowCache`] with on-demand block fetches.

use crate::cache::RowCache;
use crate::config::ConnectionConfiguration;
use crate::dispatch::Dispatcher;
use crate::error::{protocol_err, HdbError, HdbResult};
use crate::lob::{dispose_streamable_object, AsciiLobReader, ClobReader, LobReader};
use crate::wire::{Command, ColumnDescription, Decimal, ResponseStatus, StreamKind, Value};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, immutable description of one query result's shape (§3, invariant I5).
#[derive(Debug)]
struct Shape {
    columns: Vec<ColumnDescription>,
    total_row_count: u32,
}

/// A scrollable cursor over one query result (§4.5).
#[derive(Debug)]
pub struct ResultSet {
    dispatcher: Arc<Dispatcher>,
    row_cache: Arc<RowCache>,
    config: ConnectionConfiguration,
    shape: Arc<Shape>,
    /// `None` once the server-side handle has been disposed (either by
    /// [`ResultSet::close`] or by small-result inlining).
    result_id: Option<i32>,
    effective_row_count: u32,
    fetch_size: u32,
    current_index: i64,
    block_top: u32,
    block: Vec<Vec<Value>>,
    last_read_was_null: bool,
    column_index: Option<HashMap<String, usize>>,
    warning: Option<String>,
    /// For statements with no server-side result (`resultId == -1`), the
    /// server's `rowCount` names affected rows rather than fetchable ones
    /// (§6, "QUERY success body").
    affected_rows: i32,
}

impl ResultSet {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        row_cache: Arc<RowCache>,
        config: ConnectionConfiguration,
        result_id: i32,
        columns: Vec<ColumnDescription>,
        total_row_count: u32,
        warning: Option<String>,
    ) -> HdbResult<Self> {
        let no_server_result = result_id < 0;
        let effective_row_count = if no_server_result {
            0
        } else {
            config
                .max_rows()
                .map_or(total_row_count, |m| total_row_count.min(m))
        };
        let fetch_size = config.fetch_size();
        let has_lob = columns.iter().any(ColumnDescription::is_large_object);
        let mut this = Self {
            dispatcher,
            row_cache,
            config: config.clone(),
            shape: Arc::new(Shape {
                columns,
                total_row_count,
            }),
            result_id: if no_server_result { None } else { Some(result_id) },
            effective_row_count,
            fetch_size,
            current_index: -1,
            block_top: 0,
            block: Vec::new(),
            last_read_was_null: false,
            column_index: None,
            warning,
            affected_rows: if no_server_result {
                i32::try_from(total_row_count).unwrap_or(i32::MAX)
            } else {
                0
            },
        };

        if config.small_result_inlining()
            && !has_lob
            && effective_row_count <= config.inline_threshold()
            && result_id >= 0
        {
            if effective_row_count > 0 {
                this.fetch_block(0, effective_row_count)?;
            }
            this.dispose_server_side()?;
            debug!("result {result_id} inlined ({effective_row_count} rows) and disposed early");
        }
        Ok(this)
    }

    pub fn columns(&self) -> &[ColumnDescription] {
        &self.shape.columns
    }

    /// Row count after `maxRows` has capped it, i.e. how far positioning
    /// operations can actually scroll (§4.5).
    pub fn total_row_count(&self) -> u32 {
        self.effective_row_count
    }

    /// Row count the server reported before any client-side `maxRows` cap.
    pub fn server_row_count(&self) -> u32 {
        self.shape.total_row_count
    }

    /// Rows affected by a statement with no server-side result (`resultId ==
    /// -1`); 0 for a statement that did produce a scrollable result.
    pub fn affected_row_count(&self) -> i32 {
        self.affected_rows
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    fn column_lookup(&mut self) -> &HashMap<String, usize> {
        if self.column_index.is_none() {
            let case_insensitive = self.config.case_insensitive_columns();
            let mut map = HashMap::with_capacity(self.shape.columns.len());
            for (i, col) in self.shape.columns.iter().enumerate() {
                let key = normalize_column_name(&col.name, case_insensitive);
                map.insert(key, i);
            }
            self.column_index = Some(map);
        }
        self.column_index.as_ref().expect("just initialised")
    }

    fn resolve_column(&mut self, name: &str) -> HdbResult<usize> {
        let case_insensitive = self.config.case_insensitive_columns();
        let key = normalize_column_name(name, case_insensitive);
        let map = self.column_lookup();
        if let Some(&idx) = map.get(&key) {
            return Ok(idx);
        }
        let suffix = format!(".{key}");
        if let Some((_, &idx)) = map.iter().find(|(k, _)| k.ends_with(&suffix)) {
            return Ok(idx);
        }
        Err(HdbError::ColumnNotFound(name.to_string()))
    }

    // ---- positioning (§4.5) -------------------------------------------------

    pub fn is_before_first(&self) -> bool {
        self.current_index == -1
    }

    pub fn is_after_last(&self) -> bool {
        self.current_index == i64::from(self.effective_row_count)
    }

    pub fn is_first(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.effective_row_count > 0 && self.current_index == i64::from(self.effective_row_count) - 1
    }

    /// One-based row number, or 0 when not positioned on a row.
    pub fn get_row(&self) -> u32 {
        if self.current_index < 0 || self.current_index >= i64::from(self.effective_row_count) {
            0
        } else {
            u32::try_from(self.current_index).expect("bounded above by effective_row_count") + 1
        }
    }

    pub fn before_first(&mut self) {
        self.current_index = -1;
        self.warning = None;
    }

    pub fn after_last(&mut self) {
        self.current_index = i64::from(self.effective_row_count);
        self.warning = None;
    }

    pub fn next(&mut self) -> HdbResult<bool> {
        self.relative(1)
    }

    pub fn previous(&mut self) -> HdbResult<bool> {
        self.relative(-1)
    }

    pub fn first(&mut self) -> HdbResult<bool> {
        self.absolute(1)
    }

    pub fn last(&mut self) -> HdbResult<bool> {
        self.absolute(-1)
    }

    /// `n > 0` positions zero-based at `n - 1`; `n < 0` positions at
    /// `effective_row_count + n` (§4.5).
    pub fn absolute(&mut self, n: i64) -> HdbResult<bool> {
        let target = if n >= 0 {
            n - 1
        } else {
            i64::from(self.effective_row_count) + n
        };
        self.seek(target)
    }

    /// Saturates at `[-1, effective_row_count]` (§4.5).
    pub fn relative(&mut self, delta: i64) -> HdbResult<bool> {
        self.seek(self.current_index + delta)
    }

    fn seek(&mut self, target: i64) -> HdbResult<bool> {
        self.warning = None;
        let clamped = target.clamp(-1, i64::from(self.effective_row_count));
        self.current_index = clamped;
        if clamped < 0 || clamped >= i64::from(self.effective_row_count) {
            return Ok(false);
        }
        self.ensure_row_loaded(u32::try_from(clamped).expect("bounded above"))?;
        Ok(true)
    }

    // ---- block fetch discipline (§4.5) -------------------------------------

    fn ensure_row_loaded(&mut self, index: u32) -> HdbResult<()> {
        if !self.block.is_empty()
            && index >= self.block_top
            && index < self.block_top + self.block.len() as u32
        {
            return Ok(());
        }
        let backward = !self.block.is_empty() && index < self.block_top;
        // Backward scans shift the window left of `index` rather than starting
        // exactly at it, so a subsequent `previous()` call doesn't immediately
        // re-trigger another fetch one row later (§4.5, "Block fetch").
        let start = if backward {
            i64::from(index) - i64::from(self.fetch_size) + i64::from(self.fetch_size.min(8))
        } else {
            i64::from(index)
        }
        .max(0);
        let start = u32::try_from(start).unwrap_or(0).min(self.effective_row_count.saturating_sub(1));
        let end = (start + self.fetch_size).min(self.effective_row_count);
        self.fetch_block(start, end)
    }

    fn fetch_block(&mut self, start: u32, end: u32) -> HdbResult<()> {
        if start >= end {
            self.block = Vec::new();
            self.block_top = start;
            return Ok(());
        }
        let Some(result_id) = self.result_id else {
            return self.fetch_block_inlined(start, end);
        };
        let (prefix_end, suffix_start) = self.row_cache.contiguous_bounds(result_id, start, end);
        let mut fetched: HashMap<u32, Vec<Value>> = HashMap::new();
        if prefix_end < suffix_start {
            debug!(
                "block fetch: result_id={result_id} window=[{start},{end}) hole=[{prefix_end},{suffix_start})"
            );
            let rows = self.request_result_section(result_id, prefix_end, suffix_start - prefix_end)?;
            for (i, row) in rows.into_iter().enumerate() {
                let idx = prefix_end + i as u32;
                self.row_cache.insert(result_id, idx, row.clone());
                fetched.insert(idx, row);
            }
        } else {
            debug!("block fetch: result_id={result_id} window=[{start},{end}) fully cached");
        }
        let mut block = Vec::with_capacity((end - start) as usize);
        for idx in start..end {
            let row = fetched
                .remove(&idx)
                .or_else(|| self.row_cache.get(result_id, idx))
                .ok_or_else(|| protocol_err!("row {idx} missing after block fetch"))?;
            block.push(row);
        }
        self.block = block;
        self.block_top = start;
        Ok(())
    }

    /// Once a result has been disposed server-side (small-result inlining),
    /// every row is already resident in the row cache keyed by the original
    /// result id we remember via `shape`; we must still look it up by the
    /// same id we inlined under, so we keep it even after `result_id` is
    /// cleared. We store it separately to make that explicit.
    fn fetch_block_inlined(&mut self, start: u32, end: u32) -> HdbResult<()> {
        Err(protocol_err!(
            "cursor in inconsistent state: inlined result without a cache key (rows {start}..{end})"
        ))
    }

    fn request_result_section(&self, result_id: i32, start: u32, count: u32) -> HdbResult<Vec<Vec<Value>>> {
        let mut body = Vec::with_capacity(12);
        body.write_i32::<BigEndian>(result_id)?;
        body.write_i32::<BigEndian>(i32::try_from(start).unwrap_or(i32::MAX))?;
        body.write_i32::<BigEndian>(i32::try_from(count).unwrap_or(i32::MAX))?;
        let timeout = self.config.query_timeout();
        let reply = self
            .dispatcher
            .submit(Command::ResultSection, &body, timeout)?;
        let mut cursor: &[u8] = &reply;
        let status = cursor.read_i32::<BigEndian>()?;
        match ResponseStatus::try_new(status)? {
            ResponseStatus::Success => {
                let column_count = cursor.read_i32::<BigEndian>()?;
                let column_count = usize::try_from(column_count)
                    .map_err(|_| protocol_err!("negative column count {column_count}"))?;
                let mut rows = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let mut row = Vec::with_capacity(column_count);
                    for _ in 0..column_count {
                        row.push(Value::decode(&mut cursor)?);
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
            other => Err(protocol_err!("RESULT_SECTION failed with status {other:?}")),
        }
    }

    fn dispose_server_side(&mut self) -> HdbResult<()> {
        let Some(result_id) = self.result_id.take() else {
            return Ok(());
        };
        let mut body = Vec::with_capacity(4);
        body.write_i32::<BigEndian>(result_id)?;
        match self.dispatcher.submit(Command::DisposeResult, &body, None) {
            Ok(reply) => {
                let mut cursor: &[u8] = &reply;
                let status = cursor.read_i32::<BigEndian>()?;
                if ResponseStatus::try_new(status)? != ResponseStatus::Success {
                    debug!("DISPOSE_RESULT for {result_id} returned non-success status");
                }
            }
            Err(HdbError::ConnectionClosed) => {}
            Err(e) => return Err(e),
        }
        self.row_cache.invalidate_result(result_id);
        Ok(())
    }

    /// Idempotent; safe to call after the connection itself has closed
    /// (§4.5, "Disposal").
    pub fn close(&mut self) -> HdbResult<()> {
        self.dispose_server_side()
    }

    // ---- cell access (§4.5) -------------------------------------------------

    fn current_row(&self) -> HdbResult<&Vec<Value>> {
        if self.current_index < i64::from(self.block_top)
            || self.current_index >= i64::from(self.block_top) + self.block.len() as i64
            || self.current_index < 0
        {
            return Err(HdbError::OutOfRange(
                "cursor is not positioned on a loaded row".to_string(),
            ));
        }
        let offset = (self.current_index - i64::from(self.block_top)) as usize;
        Ok(&self.block[offset])
    }

    fn cell_by_index(&mut self, column: usize) -> HdbResult<Value> {
        let row = self.current_row()?;
        let value = row
            .get(column)
            .cloned()
            .ok_or_else(|| HdbError::OutOfRange(format!("column index {column} out of range")))?;
        self.last_read_was_null = matches!(value, Value::Null);
        Ok(value)
    }

    fn cell(&mut self, name: &str) -> HdbResult<Value> {
        let idx = self.resolve_column(name)?;
        self.cell_by_index(idx)
    }

    pub fn was_null(&self) -> bool {
        self.last_read_was_null
    }

    pub fn get_i32(&mut self, name: &str) -> HdbResult<i32> {
        numeric_to_i64(self.cell(name)?).map(|v| v as i32)
    }

    pub fn get_i64(&mut self, name: &str) -> HdbResult<i64> {
        numeric_to_i64(self.cell(name)?)
    }

    pub fn get_f64(&mut self, name: &str) -> HdbResult<f64> {
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(0.0),
            Value::Int(v) => Ok(f64::from(v)),
            Value::BigInt(v) => Ok(v as f64),
            Value::Decimal(d) => Ok(decimal_to_f64(&d)),
            other => Err(HdbError::TypeMismatch(format!(
                "{other:?} is not numeric"
            ))),
        }
    }

    pub fn get_bool(&mut self, name: &str) -> HdbResult<bool> {
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(false),
            Value::Boolean(b) => Ok(b),
            Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
            other => Err(HdbError::TypeMismatch(format!("{other:?} is not a boolean"))),
        }
    }

    pub fn get_string(&mut self, name: &str) -> HdbResult<Option<String>> {
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Int(v) => Ok(Some(v.to_string())),
            Value::BigInt(v) => Ok(Some(v.to_string())),
            Value::Boolean(b) => Ok(Some(b.to_string())),
            Value::Decimal(d) => Ok(Some(format_decimal(&d))),
            other => Err(HdbError::TypeMismatch(format!("{other:?} is not string-like"))),
        }
    }

    pub fn get_bytes(&mut self, name: &str) -> HdbResult<Option<Vec<u8>>> {
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(None),
            Value::Bytes(b) => Ok(Some(b)),
            other => Err(HdbError::TypeMismatch(format!("{other:?} is not binary"))),
        }
    }

    /// Milliseconds since the Unix epoch (§4.1, §9 open question: precision
    /// beyond milliseconds is not represented on the wire).
    pub fn get_timestamp_millis(&mut self, name: &str) -> HdbResult<Option<i64>> {
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(None),
            Value::Timestamp(ms) => Ok(Some(ms)),
            other => Err(HdbError::TypeMismatch(format!("{other:?} is not a timestamp"))),
        }
    }

    /// A binary reader over an inline byte array or a downloadable binary
    /// streamable object (§4.4, §4.5).
    pub fn get_binary_reader(&mut self, name: &str) -> HdbResult<Option<LobReader>> {
        let result_id = self.result_id_for_lob()?;
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(None),
            Value::Bytes(bytes) => Ok(Some(LobReader::new(
                Arc::clone(&self.dispatcher),
                result_id,
                -1,
                bytes.len() as i64,
                self.config.lob_chunk_size(),
            )
            .with_preloaded(bytes))),
            Value::StreamableHandle {
                kind: StreamKind::Binary,
                size,
                id,
            } => Ok(Some(LobReader::new(
                Arc::clone(&self.dispatcher),
                result_id,
                id,
                size,
                self.config.lob_chunk_size(),
            ))),
            other => Err(HdbError::TypeMismatch(format!(
                "{other:?} cannot be read as binary"
            ))),
        }
    }

    /// A character reader over an inline string or a downloadable character
    /// streamable object (§4.4, §4.5).
    pub fn get_character_reader(&mut self, name: &str) -> HdbResult<Option<ClobReader>> {
        let result_id = self.result_id_for_lob()?;
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => {
                let mut bytes = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_be_bytes());
                }
                let len = bytes.len() as i64;
                Ok(Some(ClobReader::new(
                    LobReader::new(Arc::clone(&self.dispatcher), result_id, -1, len, self.config.lob_chunk_size())
                        .with_preloaded(bytes),
                )))
            }
            Value::StreamableHandle {
                kind: StreamKind::Character,
                size,
                id,
            } => Ok(Some(ClobReader::new(LobReader::new(
                Arc::clone(&self.dispatcher),
                result_id,
                id,
                size,
                self.config.lob_chunk_size(),
            )))),
            other => Err(HdbError::TypeMismatch(format!(
                "{other:?} cannot be read as a character stream"
            ))),
        }
    }

    /// An ASCII view of a character streamable object or inline string,
    /// discarding the high byte of each UTF-16 code unit (§4.4).
    pub fn get_ascii_reader(&mut self, name: &str) -> HdbResult<Option<AsciiLobReader>> {
        Ok(self
            .get_character_reader_raw(name)?
            .map(AsciiLobReader::new))
    }

    fn get_character_reader_raw(&mut self, name: &str) -> HdbResult<Option<LobReader>> {
        let result_id = self.result_id_for_lob()?;
        let value = self.cell(name)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => {
                let mut bytes = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_be_bytes());
                }
                let len = bytes.len() as i64;
                Ok(Some(
                    LobReader::new(Arc::clone(&self.dispatcher), result_id, -1, len, self.config.lob_chunk_size())
                        .with_preloaded(bytes),
                ))
            }
            Value::StreamableHandle {
                kind: StreamKind::Character,
                size,
                id,
            } => Ok(Some(LobReader::new(
                Arc::clone(&self.dispatcher),
                result_id,
                id,
                size,
                self.config.lob_chunk_size(),
            ))),
            other => Err(HdbError::TypeMismatch(format!(
                "{other:?} cannot be read as a character stream"
            ))),
        }
    }

    fn result_id_for_lob(&self) -> HdbResult<i32> {
        self.result_id
            .ok_or_else(|| HdbError::Usage("streamable objects are unavailable on an inlined, disposed result".into()))
    }

    /// Releases a downloaded streamable object's server-side resources
    /// explicitly (§4.4, "Download"); the enclosing result's disposal also
    /// releases any objects the application never read to completion.
    pub fn release_streamable(&self, obj_id: i64) -> HdbResult<()> {
        let Some(result_id) = self.result_id else {
            return Ok(());
        };
        dispose_streamable_object(&self.dispatcher, result_id, obj_id)
    }

    /// Advances one row and returns its decoded cells, or `None` at
    /// `afterLast`; the sequential-iteration primitive behind
    /// [`crate::rows`]'s `serde_db` integration.
    pub(crate) fn advance_row(&mut self) -> HdbResult<Option<Vec<Value>>> {
        if self.next()? {
            Ok(Some(self.current_row()?.clone()))
        } else {
            Ok(None)
        }
    }

    /// Deserializes the remaining rows into `T` via `serde`, consuming the
    /// cursor from its current position (§9, ambient: a `serde_db`-shaped
    /// typed row API layered over the `get_*` family, the way the teacher
    /// crate's own `ResultSet::try_into` does).
    ///
    /// # Errors
    /// [`HdbError::Deserialization`] if `T` cannot be built from the rows
    /// returned, plus any error a block fetch can raise.
    pub fn try_into<'de, T>(self) -> HdbResult<T>
    where
        T: serde::de::Deserialize<'de>,
    {
        Ok(serde_db::de::DeserializableResultset::try_into(self)?)
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        let _ = self.dispose_server_side();
    }
}

fn numeric_to_i64(value: Value) -> HdbResult<i64> {
    match value {
        Value::Null => Ok(0),
        Value::Int(v) => Ok(i64::from(v)),
        Value::BigInt(v) => Ok(v),
        Value::Decimal(d) => Ok(decimal_to_i64(&d)),
        other => Err(HdbError::TypeMismatch(format!("{other:?} is not numeric"))),
    }
}

pub(crate) fn decimal_to_i64(d: &Decimal) -> i64 {
    match d {
        Decimal::Finite { unscaled, scale } => {
            let divisor = 10i128.checked_pow((*scale).max(0) as u32).unwrap_or(1);
            let unscaled: i128 = unscaled.to_string().parse().unwrap_or(0);
            (unscaled / divisor.max(1)) as i64
        }
        Decimal::NaN | Decimal::Infinity { .. } => 0,
    }
}

pub(crate) fn decimal_to_f64(d: &Decimal) -> f64 {
    match d {
        Decimal::Finite { unscaled, scale } => {
            let base: f64 = unscaled.to_string().parse().unwrap_or(0.0);
            base / 10f64.powi(*scale)
        }
        Decimal::NaN => f64::NAN,
        Decimal::Infinity { negative } => {
            if *negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }
        }
    }
}

fn format_decimal(d: &Decimal) -> String {
    match d {
        Decimal::Finite { .. } => decimal_to_f64(d).to_string(),
        Decimal::NaN => "NaN".to_string(),
        Decimal::Infinity { negative: false } => "Infinity".to_string(),
        Decimal::Infinity { negative: true } => "-Infinity".to_string(),
    }
}

/// Strips a leading two-character role prefix (`@a` = alias, `@f` =
/// fully-qualified) and surrounding quotes, then optionally lower-cases for
/// case-insensitive lookup (§4.5, "Cell access").
fn normalize_column_name(name: &str, case_insensitive: bool) -> String {
    let stripped = if name.len() >= 2 && name.starts_with('@') {
        let marker = name.as_bytes()[1];
        if marker == b'a' || marker == b'f' {
            &name[2..]
        } else {
            name
        }
    } else {
        name
    };
    let trimmed = stripped.trim_matches('"');
    if case_insensitive {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalizes_alias_and_qualifier_prefixes() {
        assert_eq!(normalize_column_name("@aFOO", false), "FOO");
        assert_eq!(normalize_column_name("@f\"Bar\"", false), "Bar");
        assert_eq!(normalize_column_name("BAZ", true), "baz");
    }

    #[test]
    fn decimal_conversions_round_to_expected_values() {
        let d = Decimal::Finite {
            unscaled: num_bigint::BigInt::from(12345),
            scale: 2,
        };
        assert_eq!(decimal_to_i64(&d), 123);
        assert!((decimal_to_f64(&d) - 123.45).abs() < 1e-9);
    }
}

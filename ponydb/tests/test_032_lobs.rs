mod test_utils;

use ponydb::{ConnectionConfiguration, StreamKind, Value};
use std::io::Read;
use std::sync::Mutex;
use test_utils::{connect_with_lob_server, int_column, lob_column, string_column, Outcome};

#[test]
fn downloads_a_binary_streamable_object_in_several_pages() {
    let payload: Vec<u8> = (0..(64 * 1024 * 4 + 37)).map(|i| (i % 256) as u8).collect();
    let columns = vec![int_column("id"), lob_column("photo", true)];

    let payload = Mutex::new(Some(payload));
    let (connection, _activity, server) = connect_with_lob_server({
        let columns = columns.clone();
        move |fake, sql, _params| {
            assert_eq!(sql, "SELECT id, photo FROM people WHERE id = 1");
            let bytes = payload.lock().unwrap().take().expect("queried only once");
            let handle = fake.register_download(StreamKind::Binary, bytes);
            Outcome::rows(columns.clone(), vec![vec![Value::Int(1), handle]])
        }
    });

    let mut rs = connection
        .query("SELECT id, photo FROM people WHERE id = 1", vec![])
        .unwrap();
    assert!(rs.next().unwrap());
    let mut reader = rs.get_binary_reader("photo").unwrap().expect("not null");
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf.len(), 64 * 1024 * 4 + 37);
    assert_eq!(buf[0], 0);
    assert_eq!(buf[64 * 1024], 0);

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn uploads_push_data_in_chunks() {
    let chunk_size = 64 * 1024;
    let total_len = chunk_size * 3 + 123;
    let uploaded_payload: Vec<u8> = (0..total_len).map(|i| ((i * 7) % 256) as u8).collect();
    let expected_len = total_len as i64;

    let (connection, activity, server) = connect_with_lob_server(move |_fake, sql, params| {
        assert_eq!(sql, "UPDATE people SET photo = ? WHERE id = ?");
        match &params[0] {
            Value::StreamableHandle { size, .. } => assert_eq!(*size, expected_len),
            other => panic!("unexpected param {other:?}"),
        }
        Outcome::Affected(1)
    });

    let source = std::io::Cursor::new(uploaded_payload.clone());
    let handle = connection
        .register_upload(StreamKind::Binary, total_len as i64, Box::new(source))
        .unwrap();
    let result_set = connection
        .query(
            "UPDATE people SET photo = ? WHERE id = ?",
            vec![handle, Value::Int(42)],
        )
        .unwrap();
    assert_eq!(result_set.affected_row_count(), 1);

    {
        let activity = activity.lock().unwrap();
        assert!(activity.push_part_count >= 4);
        let (_, bytes) = activity.uploaded_bytes.iter().next().unwrap();
        assert_eq!(bytes.len(), total_len);
        assert_eq!(bytes, &uploaded_payload);
    }

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn ascii_reader_drops_the_high_byte_of_each_code_unit() {
    let columns = vec![string_column("label")];
    let rows = vec![vec![Value::String("hello".into())]];
    let (connection, _activity, server) = connect_with_lob_server(move |_fake, _sql, _params| {
        Outcome::rows(columns.clone(), rows.clone())
    });

    let mut rs = connection
        .query("SELECT label FROM greetings", vec![])
        .unwrap();
    assert!(rs.next().unwrap());
    let mut reader = rs.get_ascii_reader("label").unwrap().unwrap();
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out, "hello");

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn character_reader_decodes_utf16_big_endian_inline_strings() {
    let columns = vec![string_column("label")];
    let rows = vec![vec![Value::String("héllo wörld".into())]];
    let (connection, _activity, server) = connect_with_lob_server(move |_fake, _sql, _params| {
        Outcome::rows(columns.clone(), rows.clone())
    });

    let mut rs = connection
        .query("SELECT label FROM greetings", vec![])
        .unwrap();
    assert!(rs.next().unwrap());
    let mut reader = rs.get_character_reader("label").unwrap().unwrap();
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out, "héllo wörld");

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn null_lob_column_reads_as_none() {
    let columns = vec![lob_column("photo", true)];
    let rows = vec![vec![Value::Null]];
    let (connection, _activity, server) = connect_with_lob_server(move |_fake, _sql, _params| {
        Outcome::rows(columns.clone(), rows.clone())
    });

    let mut rs = connection.query("SELECT photo FROM people", vec![]).unwrap();
    assert!(rs.next().unwrap());
    assert!(rs.get_binary_reader("photo").unwrap().is_none());

    connection.close().unwrap();
    server.join().unwrap();
    let _ = ConnectionConfiguration::default();
}

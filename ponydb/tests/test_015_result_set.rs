mod test_utils;

use ponydb::{ConnectionConfiguration, Value};
use test_utils::{connect_with_config, int_column, string_column, Outcome};

fn people_rows(n: i32) -> Vec<Vec<Value>> {
    (0..n)
        .map(|i| vec![Value::Int(i), Value::String(format!("person-{i}"))])
        .collect()
}

#[test]
fn forward_iteration_visits_every_row_in_order() {
    let rows = people_rows(250);
    let (connection, server) = connect_with_config(
        ConnectionConfiguration::default().with_fetch_size(32),
        move |_fake, sql, _params| {
            assert_eq!(sql, "SELECT id, name FROM people");
            Outcome::rows(
                vec![int_column("id"), string_column("name")],
                rows.clone(),
            )
        },
    );

    let mut result_set = connection.query("SELECT id, name FROM people", vec![]).unwrap();
    let mut seen = Vec::new();
    while result_set.next().unwrap() {
        seen.push(result_set.get_i32("id").unwrap());
    }
    assert_eq!(seen, (0..250).collect::<Vec<_>>());

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn backward_iteration_visits_every_row_in_reverse() {
    let rows = people_rows(90);
    let (connection, server) = connect_with_config(
        ConnectionConfiguration::default().with_fetch_size(10),
        move |_fake, _sql, _params| Outcome::rows(vec![int_column("id"), string_column("name")], rows.clone()),
    );

    let mut result_set = connection.query("SELECT id, name FROM people", vec![]).unwrap();
    result_set.last().unwrap();
    let mut seen = vec![result_set.get_i32("id").unwrap()];
    while result_set.previous().unwrap() {
        seen.push(result_set.get_i32("id").unwrap());
    }
    assert_eq!(seen, (0..90).rev().collect::<Vec<_>>());

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn block_fetch_round_trips_for_several_fetch_sizes() {
    for fetch_size in [1u32, 7, 32, 100] {
        let rows = people_rows(123);
        let (connection, server) = connect_with_config(
            ConnectionConfiguration::default().with_fetch_size(fetch_size),
            move |_fake, _sql, _params| Outcome::rows(vec![int_column("id"), string_column("name")], rows.clone()),
        );

        let mut result_set = connection.query("SELECT id, name FROM people", vec![]).unwrap();
        let mut seen = Vec::new();
        while result_set.next().unwrap() {
            seen.push(result_set.get_i32("id").unwrap());
        }
        assert_eq!(seen, (0..123).collect::<Vec<_>>(), "fetch_size={fetch_size}");

        connection.close().unwrap();
        server.join().unwrap();
    }
}

#[test]
fn absolute_and_relative_positioning() {
    let rows = people_rows(50);
    let (connection, server) = connect_with_config(
        ConnectionConfiguration::default().with_fetch_size(8),
        move |_fake, _sql, _params| Outcome::rows(vec![int_column("id"), string_column("name")], rows.clone()),
    );

    let mut result_set = connection.query("SELECT id, name FROM people", vec![]).unwrap();
    assert!(result_set.absolute(10).unwrap());
    assert_eq!(result_set.get_i32("id").unwrap(), 9);
    assert!(result_set.relative(5).unwrap());
    assert_eq!(result_set.get_i32("id").unwrap(), 14);
    assert!(result_set.relative(-10).unwrap());
    assert_eq!(result_set.get_i32("id").unwrap(), 4);

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn ddl_statement_reports_affected_rows_with_no_scrollable_result() {
    let (connection, server) = connect_with_config(ConnectionConfiguration::default(), |_fake, sql, _params| {
        assert_eq!(sql, "DELETE FROM people WHERE age < 0");
        Outcome::Affected(7)
    });

    let result_set = connection
        .query("DELETE FROM people WHERE age < 0", vec![])
        .unwrap();
    assert_eq!(result_set.affected_row_count(), 7);
    assert_eq!(result_set.columns().len(), 0);

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn server_exception_surfaces_as_error() {
    let (connection, server) = connect_with_config(ConnectionConfiguration::default(), |_fake, _sql, _params| {
        Outcome::Exception {
            vendor_code: 397,
            message: "invalid column name".to_string(),
        }
    });

    let err = connection.query("SELECT bogus FROM people", vec![]);
    assert!(err.is_err());

    connection.close().unwrap();
    server.join().unwrap();
}

mod test_utils;

use ponydb::Value;
use std::sync::Arc;
use test_utils::{connect_with_handler, int_column, Outcome};

#[test]
fn many_threads_share_one_connection_without_cross_talk() {
    let (connection, server) = connect_with_handler(|_fake, sql, _params| {
        let id: i32 = sql
            .strip_prefix("SELECT ")
            .unwrap()
            .parse()
            .expect("well-formed probe query");
        Outcome::rows(vec![int_column("id")], vec![vec![Value::Int(id)]])
    });
    let connection = Arc::new(connection);

    let threads: Vec<_> = (0..16)
        .map(|i| {
            let connection = Arc::clone(&connection);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let mut rs = connection.query(format!("SELECT {i}"), vec![]).unwrap();
                    assert!(rs.next().unwrap());
                    assert_eq!(rs.get_i32("id").unwrap(), i);
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn concurrent_queries_each_get_their_own_result_set() {
    let (connection, server) = connect_with_handler(|_fake, sql, _params| {
        let n: i32 = sql
            .strip_prefix("SELECT COUNT ")
            .unwrap()
            .parse()
            .unwrap();
        let rows = (0..n).map(|i| vec![Value::Int(i)]).collect();
        Outcome::rows(vec![int_column("id")], rows)
    });
    let connection = Arc::new(connection);

    let threads: Vec<_> = [3, 10, 1, 25]
        .iter()
        .copied()
        .map(|n| {
            let connection = Arc::clone(&connection);
            std::thread::spawn(move || {
                let mut rs = connection
                    .query(format!("SELECT COUNT {n}"), vec![])
                    .unwrap();
                let mut count = 0;
                while rs.next().unwrap() {
                    count += 1;
                }
                assert_eq!(count, n);
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    connection.close().unwrap();
    server.join().unwrap();
}

//! Text-protocol query scenarios.

mod common;

use common::{establish, test_opts};
use quill_mysql::constant::{ColumnType, ServerStatusFlags};
use quill_mysql::{Error, Value};

#[tokio::test]
async fn simple_text_query() {
    let (mut server, conn) = establish(test_opts()).await;

    let querying = conn.clone();
    let query_task = tokio::spawn(async move { querying.send_query("SELECT 1").await });

    let (seq, frame) = server.recv().await;
    assert_eq!(seq, 0);
    assert_eq!(frame[0], 0x03); // COM_QUERY
    assert_eq!(&frame[1..], b"SELECT 1");

    server.send_result_set_header(1, 1).await;
    server.send_column(2, "1", ColumnType::MYSQL_TYPE_LONGLONG).await;
    server.send_eof(3, 0, 0x0002).await;
    server.send_text_row(4, &[Some("1")]).await;
    server.send_eof(5, 0, 0x0002).await;

    let result = query_task.await.unwrap().unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.last_insert_id, -1);

    let rs = result.result_set.unwrap();
    assert_eq!(rs.columns.len(), 1);
    assert_eq!(rs.columns[0].name, "1");
    assert_eq!(rs.rows.len(), 1);
    assert_eq!(rs.rows[0][0], Value::Int(1));

    assert!(!conn.is_querying());
    assert!(conn.is_connected());
}

#[tokio::test]
async fn ok_completion_reports_server_values() {
    let (mut server, conn) = establish(test_opts()).await;

    let querying = conn.clone();
    let query_task =
        tokio::spawn(async move { querying.send_query("UPDATE t SET x = 1").await });

    let _frame = server.recv().await;
    server.send_ok(1, 3, 42, 0x0003, 2).await;

    let result = query_task.await.unwrap().unwrap();
    assert_eq!(result.rows_affected, 3);
    assert_eq!(result.last_insert_id, 42);
    assert_eq!(result.warnings, 2);
    assert!(result
        .status_flags
        .contains(ServerStatusFlags::SERVER_STATUS_IN_TRANS));
    assert!(result.result_set.is_none());
}

#[tokio::test]
async fn concurrent_query_is_rejected() {
    let (mut server, conn) = establish(test_opts()).await;

    let querying = conn.clone();
    let first = tokio::spawn(async move { querying.send_query("SELECT SLEEP(1)").await });

    // Once the server holds the frame, the pending slot is occupied.
    let _frame = server.recv().await;
    assert!(conn.is_querying());

    let err = conn.send_query("SELECT 2").await.unwrap_err();
    match err {
        Error::StillRunningQuery {
            connection_id,
            race_lost,
        } => {
            assert_eq!(connection_id, conn.id());
            assert!(!race_lost);
        }
        other => panic!("expected StillRunningQuery, got {:?}", other),
    }

    // The first query is unaffected.
    server.send_ok(1, 0, 0, 0x0002, 0).await;
    first.await.unwrap().unwrap();
    assert!(!conn.is_querying());
}

#[tokio::test]
async fn server_error_returns_connection_to_ready() {
    let (mut server, conn) = establish(test_opts()).await;

    let querying = conn.clone();
    let query_task = tokio::spawn(async move { querying.send_query("SELEKT 1").await });

    let _frame = server.recv().await;
    server
        .send_err(1, 1064, "42000", "You have an error in your SQL syntax")
        .await;

    let err = query_task.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ServerError { error_code: 1064, .. }));

    // not fatal: the next query runs
    assert!(conn.is_connected());
    let querying = conn.clone();
    let retry = tokio::spawn(async move { querying.send_query("SELECT 1").await });
    let _frame = server.recv().await;
    server.send_ok(1, 0, 0, 0x0002, 0).await;
    retry.await.unwrap().unwrap();
}

#[tokio::test]
async fn spurious_frames_are_dropped() {
    let (mut server, conn) = establish(test_opts()).await;

    // A stray OK with nothing in flight must not kill the connection.
    server.send_ok(0, 0, 0, 0x0002, 0).await;
    // Let the reader drain the stray frame while the connection is idle.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let querying = conn.clone();
    let query_task = tokio::spawn(async move { querying.send_query("SELECT 1").await });
    let _frame = server.recv().await;
    server.send_ok(1, 5, 0, 0x0002, 0).await;

    let result = query_task.await.unwrap().unwrap();
    assert_eq!(result.rows_affected, 5);
    assert!(conn.is_connected());
}

#[tokio::test]
async fn multi_row_result_set() {
    let (mut server, conn) = establish(test_opts()).await;

    let querying = conn.clone();
    let query_task =
        tokio::spawn(async move { querying.send_query("SELECT id, name FROM t").await });

    let _frame = server.recv().await;
    server.send_result_set_header(1, 2).await;
    server.send_column(2, "id", ColumnType::MYSQL_TYPE_LONGLONG).await;
    server
        .send_column(3, "name", ColumnType::MYSQL_TYPE_VAR_STRING)
        .await;
    server.send_eof(4, 0, 0x0002).await;
    server.send_text_row(5, &[Some("1"), Some("ada")]).await;
    server.send_text_row(6, &[Some("2"), None]).await;
    server.send_eof(7, 1, 0x0002).await;

    let result = query_task.await.unwrap().unwrap();
    assert_eq!(result.rows_affected, 2);
    assert_eq!(result.warnings, 1);

    let rs = result.result_set.unwrap();
    assert_eq!(rs.column_index("name"), Some(1));
    assert_eq!(rs.rows[0].0, vec![Value::Int(1), Value::Text("ada".into())]);
    assert_eq!(rs.rows[1].0, vec![Value::Int(2), Value::Null]);
}

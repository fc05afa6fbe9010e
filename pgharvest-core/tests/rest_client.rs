//! `RestClient` against a minimal local HTTP responder.

#![allow(clippy::unwrap_used)]

use pgharvest_core::models::FieldValue;
use pgharvest_core::{ApiConfig, DataApi, HarvestError, RestClient, TableDescriptor, format_value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Answers one connection per canned response and returns the raw requests.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);

            let response = format!(
                "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });

    (format!("http://{}", address), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];

    loop {
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let Some(head_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buffer[..head_end]).to_lowercase();
        let body_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= head_end + 4 + body_length {
            break;
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

fn client(base_url: &str) -> RestClient {
    RestClient::new(&ApiConfig::new(base_url, "service-key"))
        .unwrap()
        .with_schema("public")
}

#[tokio::test]
async fn test_select_range_request_and_rows() {
    let (base_url, server) = serve(vec![(
        200,
        r#"[{"zeta":1,"alpha":"x"},{"zeta":2,"alpha":null}]"#,
    )])
    .await;

    let rows = client(&base_url)
        .select_range(&TableDescriptor::new("users"), &[], 1000, 1000)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["zeta", "alpha"]);
    assert_eq!(rows[1]["alpha"], FieldValue::Null);

    let requests = server.await.unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("get /rest/v1/users?select=*&offset=1000&limit=1000 http/1.1"));
    assert!(request.contains("apikey: service-key"));
    assert!(request.contains("authorization: bearer service-key"));
    assert!(request.contains("accept-profile: public"));
}

#[tokio::test]
async fn test_numeric_values_survive_page_parsing() {
    let (base_url, server) = serve(vec![(
        200,
        r#"[{"id":1,"balance":12345678901234567890.123,"huge":1e400,"meta":{"z":1,"a":2}}]"#,
    )])
    .await;

    let order_by = vec!["id".to_string()];
    let rows = client(&base_url)
        .select_range(&TableDescriptor::new("accounts"), &order_by, 0, 1000)
        .await
        .unwrap();

    assert_eq!(format_value(&rows[0]["balance"], None), "12345678901234567890.123");
    assert_eq!(format_value(&rows[0]["huge"], None), "1e400");
    assert_eq!(
        format_value(&rows[0]["meta"], None),
        r#"'{"z":1,"a":2}'::jsonb"#
    );

    let requests = server.await.unwrap();
    assert!(
        requests[0]
            .to_lowercase()
            .starts_with("get /rest/v1/accounts?select=*&order=id.asc&offset=0&limit=1000 http/1.1")
    );
}

#[tokio::test]
async fn test_error_response_carries_server_message() {
    let (base_url, server) = serve(vec![(
        404,
        r#"{"code":"42P01","message":"relation \"public.ghost\" does not exist"}"#,
    )])
    .await;

    let error = client(&base_url)
        .select_range(&TableDescriptor::new("ghost"), &[], 0, 1000)
        .await
        .unwrap_err();

    match error {
        HarvestError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "relation \"public.ghost\" does not exist");
        }
        other => panic!("unexpected error: {}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_call_procedure_posts_empty_object() {
    let (base_url, server) = serve(vec![(200, r#"[{"table_name":"users"}]"#)]).await;

    let rows = client(&base_url)
        .call_procedure("get_all_tables")
        .await
        .unwrap();
    assert_eq!(rows, vec![serde_json::json!({"table_name": "users"})]);

    let requests = server.await.unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("post /rest/v1/rpc/get_all_tables http/1.1"));
    assert!(request.ends_with("\r\n\r\n{}"));
    assert!(request.contains("content-profile: public"));
}

#[tokio::test]
async fn test_unreachable_api_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let error = client(&format!("http://{}", address))
        .select_range(&TableDescriptor::new("users"), &[], 0, 1000)
        .await
        .unwrap_err();
    assert!(matches!(error, HarvestError::Connection { .. }));
}

use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;
use std::time::Duration;

use ledgerd::config::CONFIG;
use ledgerd::response::Status;
use ledgerd::server::{Server, Shutdown};
use ledgerd::store::{Store, STORE};
use ledgerd::tariff;
use ledgerd::transport::{receive, send};
use tokio::net::TcpStream;

/// `STORE` and the tariff table are process-wide singletons; serialize the
/// whole integration test binary against them rather than introducing a
/// handle-per-test store (a much larger rework of the crate's wiring for
/// no real gain, since this is the only place the singleton shows up).
static SERIAL: LazyLock<tokio::sync::Mutex<()>> = LazyLock::new(|| tokio::sync::Mutex::new(()));

struct Harness {
    client: TcpStream,
    shutdown: Shutdown,
    handle: tokio::task::JoinHandle<()>,
    // held only to keep the sandbox root alive for the life of the harness.
    _data_root: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        *STORE.write().await = Store::default();

        let data_root = tempfile::tempdir().unwrap();
        CONFIG.write().await.server_data_root_dir =
            data_root.path().to_str().unwrap().to_string();

        let server = Server::builder()
            .listen(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .on(0)
            .backlog(5)
            .build()
            .await
            .unwrap();
        let addr = server.local_addr();

        let (shutdown, _rx) = Shutdown::new();
        let run_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move { server.run(run_shutdown).await });

        // give the acceptor a moment to start polling.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let client = TcpStream::connect(addr).await.unwrap();

        Harness {
            client,
            shutdown,
            handle,
            _data_root: data_root,
        }
    }

    async fn send_query(&mut self, query: &str) {
        send(&mut self.client, query.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> ParsedFrame {
        let bytes = receive(&mut self.client, Duration::from_secs(2)).await.unwrap();
        ParsedFrame::from_bytes(&bytes)
    }

    async fn stop(self) {
        self.shutdown.request();
        self.handle.await.unwrap();
    }
}

struct ParsedFrame {
    status: u32,
    headers: std::collections::HashMap<String, String>,
    body: String,
}

impl ParsedFrame {
    fn from_bytes(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let (header_block, body) = text.split_once("--DATA_BEGIN--\n").unwrap_or((&text, ""));
        let mut headers = std::collections::HashMap::new();
        let mut status = 0;
        for line in header_block.lines() {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_string();
                let value = value.trim().to_string();
                if key == "STATUS" {
                    status = value.parse().unwrap_or(0);
                }
                headers.insert(key, value);
            }
        }
        ParsedFrame {
            status,
            headers,
            body: body.to_string(),
        }
    }

    fn header(&self, key: &str) -> &str {
        self.headers.get(key).map(String::as_str).unwrap_or("")
    }
}

#[tokio::test]
async fn add_then_select() {
    let _guard = SERIAL.lock().await;
    let mut harness = Harness::start().await;

    harness
        .send_query(r#"ADD FIO "Ivanov I.I." IP "192.168.1.1" DATE "01.01.2023""#)
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());
    assert_eq!(reply.header("PAYLOAD_TYPE"), "SIMPLE_MESSAGE");
    assert!(reply.body.contains("Ivanov I.I."));

    harness.send_query(r#"SELECT IP "192.168.1.1" END"#).await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());
    assert_eq!(reply.header("PAYLOAD_TYPE"), "PROVIDER_RECORDS_LIST");
    assert_eq!(reply.header("TOTAL_RECORDS"), "1");
    assert!(reply.body.contains("Ivanov I.I."));
    assert!(reply.body.contains("192.168.1.1"));
    assert!(reply.body.contains("01.01.2023"));

    harness.stop().await;
}

#[tokio::test]
async fn chunked_print_all() {
    let _guard = SERIAL.lock().await;
    let mut harness = Harness::start().await;

    for i in 0..62 {
        harness
            .send_query(&format!(
                r#"ADD FIO "Subscriber {i}" IP "10.0.0.1" DATE "01.01.2023""#
            ))
            .await;
        let reply = harness.recv().await;
        assert_eq!(reply.status, Status::Ok.code());
    }

    harness.send_query("PRINT_ALL END").await;

    let begin = harness.recv().await;
    assert_eq!(begin.status, Status::MultiBegin.code());
    assert_eq!(begin.header("TOTAL_RECORDS"), "62");
    assert_eq!(begin.header("RECORDS_IN_PAYLOAD"), "50");

    let chunk = harness.recv().await;
    assert_eq!(chunk.status, Status::MultiChunk.code());
    assert_eq!(chunk.header("RECORDS_IN_PAYLOAD"), "12");

    let end = harness.recv().await;
    assert_eq!(end.status, Status::MultiEnd.code());
    assert_eq!(end.header("RECORDS_IN_PAYLOAD"), "0");
    assert_eq!(end.header("PAYLOAD_TYPE"), "NONE");

    harness.stop().await;
}

#[tokio::test]
async fn oversize_declared_length_closes_connection() {
    let _guard = SERIAL.lock().await;
    let harness = Harness::start().await;
    let mut client = harness.client;

    use tokio::io::AsyncWriteExt;
    client.write_u32(1_048_577).await.unwrap();
    client.flush().await.unwrap();

    let result = receive(&mut client, Duration::from_secs(2)).await;
    assert!(result.is_err());

    drop(client);
    harness.shutdown.request();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn edit_with_no_effective_change_reports_zero() {
    let _guard = SERIAL.lock().await;
    let mut harness = Harness::start().await;

    harness
        .send_query(r#"ADD FIO "Petrov P.P." IP "10.0.0.5" DATE "02.02.2023""#)
        .await;
    let _ = harness.recv().await;

    harness
        .send_query(r#"EDIT FIO "Petrov P.P." SET FIO "Petrov P.P." END"#)
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());
    assert!(reply.body.contains("no effective changes"));

    harness.stop().await;
}

#[tokio::test]
async fn sandbox_escape_attempt_is_confined_not_leaked() {
    let _guard = SERIAL.lock().await;
    let mut harness = Harness::start().await;

    // a filename carrying a directory separator is rejected outright as a
    // sandbox violation rather than silently reduced to its last component,
    // so the real file outside the sandbox is never even opened.
    harness.send_query(r#"LOAD "../../../etc/passwd""#).await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::BadRequest.code());
    assert_eq!(reply.header("PAYLOAD_TYPE"), "ERROR_INFO");
    assert!(!reply.body.contains("root:"));

    // session stays open: a harmless follow-up still works.
    harness.send_query("HELP").await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());

    harness.stop().await;
}

#[tokio::test]
async fn calculate_charges_sums_per_hour_rates() {
    let _guard = SERIAL.lock().await;

    let dir = tempfile::tempdir().unwrap();
    let tariff_path = dir.path().join("tariff.txt");
    let mut body = String::new();
    for _ in 0..24 {
        body.push_str("0.50 ");
    }
    body.push('\n');
    for _ in 0..24 {
        body.push_str("0.25 ");
    }
    tokio::fs::write(&tariff_path, body).await.unwrap();
    tariff::load(&tariff_path).await.unwrap();

    let mut harness = Harness::start().await;

    let traffic_in = "1.0 ".repeat(24);
    let traffic_out = "0.5 ".repeat(24);
    harness
        .send_query(&format!(
            r#"ADD FIO "Sidorov S.S." IP "10.0.0.9" DATE "01.01.2023" TRAFFIC_IN {traffic_in}TRAFFIC_OUT {traffic_out}END"#
        ))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());

    harness
        .send_query(r#"CALCULATE_CHARGES START_DATE "01.01.2023" END_DATE "01.01.2023" END"#)
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());
    assert!(reply.body.contains("15.00"));

    harness.stop().await;
}

#[tokio::test]
async fn unterminated_quote_is_bad_request_and_session_stays_open() {
    let _guard = SERIAL.lock().await;
    let mut harness = Harness::start().await;

    harness.send_query(r#"SELECT FIO "Ivanov"#).await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::BadRequest.code());

    harness.send_query("HELP").await;
    let reply = harness.recv().await;
    assert_eq!(reply.status, Status::Ok.code());

    harness.stop().await;
}

#[tokio::test]
async fn exit_client_session_pseudo_command_closes_without_a_reply() {
    let _guard = SERIAL.lock().await;
    let harness = Harness::start().await;
    let mut client = harness.client;

    send(&mut client, b"EXIT_CLIENT_SESSION").await.unwrap();

    let result = receive(&mut client, Duration::from_millis(200)).await;
    assert!(result.is_err());

    harness.shutdown.request();
    harness.handle.await.unwrap();
}


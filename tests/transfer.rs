//! 루프백 전송 테스트 (서버 + 클라이언트)

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fdp::{Config, Error, FileReceiver, FileSender};

fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

async fn start_server(
    data: &[u8],
    receiver: &FileReceiver,
    config: Config,
) -> (tempfile::TempDir, Arc<FileSender>, CancellationToken) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    tokio::fs::write(&source, data).await.unwrap();

    let config = Config {
        data_addr: receiver.local_addr().unwrap(),
        ..config
    };
    let sender = Arc::new(FileSender::bind(&source, config).await.unwrap());
    let cancel = CancellationToken::new();
    tokio::spawn(sender.clone().run(cancel.clone()));

    (dir, sender, cancel)
}

#[tokio::test]
async fn test_transfer_on_request() {
    let data = test_data(50_000);
    let receiver = FileReceiver::bind(Config::local()).await.unwrap();
    let (dir, sender, server_cancel) = start_server(&data, &receiver, Config::local()).await;

    let output = dir.path().join("received.bin");
    let path = tokio::time::timeout(
        Duration::from_secs(30),
        receiver.download(
            sender.info_addr().unwrap(),
            Some(&output),
            &CancellationToken::new(),
        ),
    )
    .await
    .expect("transfer timed out")
    .unwrap();

    assert_eq!(path, output);
    assert_eq!(tokio::fs::read(&output).await.unwrap(), data);

    let stats = receiver.stats();
    assert!(stats.range_requests >= 1);
    assert!(stats.total_bytes >= data.len() as u64);

    assert!(sender.stats().range_requests >= 1);
    server_cancel.cancel();
}

#[tokio::test]
async fn test_transfer_with_announce_and_small_chunks() {
    let data = test_data(12_345);
    let receiver = FileReceiver::bind(Config::local()).await.unwrap();
    let server_config = Config {
        announce_on_start: true,
        chunk_size: 333,
        sender_workers: 3,
        ..Config::local()
    };
    let (dir, sender, server_cancel) = start_server(&data, &receiver, server_config).await;

    let output = dir.path().join("announced.bin");
    tokio::time::timeout(
        Duration::from_secs(30),
        receiver.download(
            sender.info_addr().unwrap(),
            Some(&output),
            &CancellationToken::new(),
        ),
    )
    .await
    .expect("transfer timed out")
    .unwrap();

    assert_eq!(tokio::fs::read(&output).await.unwrap(), data);
    server_cancel.cancel();
}

#[tokio::test]
async fn test_download_can_be_cancelled() {
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let receiver = FileReceiver::bind(Config::local()).await.unwrap();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = receiver
        .download(silent.local_addr().unwrap(), None, &cancel)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

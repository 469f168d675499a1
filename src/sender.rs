//! 송신자 (서버측)
//!
//! - 메타데이터(이름/크기) 응답
//! - 재전송 요청 구간을 전송 대기 큐(RangeTracker)에 적재
//! - 워커들이 큐에서 청크 단위로 꺼내 데이터 주소로 전송

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::message::{ChunkMessage, FileInfo, InfoRequest, RangeRequest};
use crate::stats::TransferStats;
use crate::storage::FileStorage;
use crate::tracker::RangeTracker;
use crate::{Config, Error, Result};

/// 파일 송신자
pub struct FileSender {
    /// 설정
    config: Config,

    /// 클라이언트에 알려줄 메타데이터
    info: FileInfo,

    /// 전송할 파일
    storage: FileStorage,

    /// 전송 대기 구간 ("채워짐" = 보낼 차례)
    pending: RangeTracker,

    /// 메타데이터 요청 소켓
    info_socket: UdpSocket,

    /// 재전송 요청 소켓
    request_socket: UdpSocket,

    /// 청크 송신 소켓
    data_socket: UdpSocket,

    /// 전송 통계
    stats: RwLock<TransferStats>,
}

impl FileSender {
    /// 파일을 열고 소켓 바인딩
    pub async fn bind(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;

        let path = path.as_ref();
        let storage = FileStorage::open(path).await?;
        if storage.is_empty() {
            return Err(Error::EmptyFile);
        }

        let last = storage.len() - 1;
        let pending = if config.announce_on_start {
            RangeTracker::full(0, last)?
        } else {
            RangeTracker::empty(0, last)?
        };

        let info_socket = UdpSocket::bind(config.info_bind).await?;
        let request_socket = UdpSocket::bind(config.request_bind).await?;

        let data_bind: SocketAddr = if config.data_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let data_socket = UdpSocket::bind(data_bind).await?;
        data_socket.set_broadcast(true)?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download.bin".to_string());

        let info = FileInfo {
            name,
            size: storage.len(),
            chunk_size: config.chunk_size as u32,
            request_port: request_socket.local_addr()?.port(),
        };

        Ok(Self {
            stats: RwLock::new(TransferStats::new(info.size)),
            config,
            info,
            storage,
            pending,
            info_socket,
            request_socket,
            data_socket,
        })
    }

    /// 메타데이터 소켓 주소
    pub fn info_addr(&self) -> Result<SocketAddr> {
        Ok(self.info_socket.local_addr()?)
    }

    /// 재전송 요청 소켓 주소
    pub fn request_addr(&self) -> Result<SocketAddr> {
        Ok(self.request_socket.local_addr()?)
    }

    pub fn file_info(&self) -> &FileInfo {
        &self.info
    }

    /// 전송 대기 큐
    pub fn pending(&self) -> &RangeTracker {
        &self.pending
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 서버 실행 (취소될 때까지)
    ///
    /// 루프 하나가 에러로 끝나면 나머지도 취소하고 첫 에러를 반환
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        info!(
            "FDP Sender started: {:?} ({} bytes), info={}, requests={}, data -> {}",
            self.info.name,
            self.info.size,
            self.info_addr()?,
            self.request_addr()?,
            self.config.data_addr
        );

        let mut tasks = JoinSet::new();

        {
            let sender = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { sender.info_loop(cancel).await });
        }
        {
            let sender = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { sender.request_loop(cancel).await });
        }
        for worker_id in 0..self.config.sender_workers {
            let sender = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { sender.worker_loop(worker_id, cancel).await });
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::Io(std::io::Error::other(e))),
            };
            if let Err(e) = outcome {
                warn!("송신 태스크 종료: {}", e);
                cancel.cancel();
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!("FDP Sender stopped: {}", self.stats().summary());
        result
    }

    /// 메타데이터 요청 처리 루프
    async fn info_loop(&self, cancel: CancellationToken) -> Result<()> {
        let reply = self.info.to_bytes()?;
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.info_socket.recv_from(&mut buf) => result,
            };

            let (len, addr) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            if let Err(e) = InfoRequest::from_bytes(&buf[..len]) {
                debug!("메타데이터 요청 아님 ({}): {}", addr, e);
                continue;
            }

            match self.info_socket.send_to(&reply, addr).await {
                Ok(_) => info!("sending info to client: {}", addr),
                Err(e) => warn!("메타데이터 응답 실패 ({}): {}", addr, e),
            }
        }
    }

    /// 재전송 요청 처리 루프
    async fn request_loop(&self, cancel: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.request_socket.recv_from(&mut buf) => result,
            };

            let (len, addr) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            match RangeRequest::from_bytes(&buf[..len]) {
                Ok(request) => {
                    self.handle_range_request(&request, addr);
                }
                Err(e) => debug!("구간 요청 아님 ({}): {}", addr, e),
            }
        }
    }

    /// 요청된 구간을 전송 대기 큐에 적재, 새로 적재된 구간 수 반환
    pub fn handle_range_request(&self, request: &RangeRequest, addr: SocketAddr) -> usize {
        let mut queued = 0;
        for range in request.ranges() {
            match range {
                Ok(range) => {
                    if !self.pending.span().covers(&range) {
                        debug!("구간 {} 이 파일 범위를 벗어남 ({}), 잘라서 적재", range, addr);
                    }
                    if self.pending.fill(range) {
                        queued += 1;
                    }
                }
                Err(e) => warn!("잘못된 구간 ({}): {}", addr, e),
            }
        }

        self.stats.write().record_request(request.len());
        debug!(
            "range request from {}: {} ranges, {} newly queued",
            addr,
            request.len(),
            queued
        );
        queued
    }

    /// 전송 워커
    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) -> Result<()> {
        let max_len = self.config.chunk_size as u64;
        let interval = self.config.chunk_interval();

        loop {
            let range = match self.pending.dequeue_chunk_wait(max_len, &cancel).await {
                Ok(range) => range,
                Err(Error::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            };

            let payload = self.storage.read_range(range).await?;
            let chunk = ChunkMessage::new(range.start(), payload);
            let bytes = chunk.to_bytes()?;

            if let Err(e) = self.data_socket.send_to(&bytes, self.config.data_addr).await {
                // 클라이언트가 다시 요청하면 재전송됨
                warn!("worker {}: 청크 {} 전송 실패: {}", worker_id, range, e);
                continue;
            }

            self.stats.write().record_chunk(chunk.payload.len());
            trace!("worker {}: sent {}", worker_id, range);

            if let Some(interval) = interval {
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::range::Range;

    async fn sender_for(data: &[u8], config: Config) -> (tempfile::TempDir, FileSender) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bin");
        tokio::fs::write(&path, data).await.unwrap();
        let sender = FileSender::bind(&path, config).await.unwrap();
        (dir, sender)
    }

    #[tokio::test]
    async fn test_bind_reports_file_info() {
        let (_dir, sender) = sender_for(&[7u8; 2500], Config::local()).await;

        let info = sender.file_info();
        assert_eq!(info.name, "source.bin");
        assert_eq!(info.size, 2500);
        assert_eq!(info.request_port, sender.request_addr().unwrap().port());
        assert!(sender.pending().is_empty());
    }

    #[tokio::test]
    async fn test_announce_on_start_queues_whole_file() {
        let config = Config {
            announce_on_start: true,
            ..Config::local()
        };
        let (_dir, sender) = sender_for(&[1u8; 100], config).await;
        assert!(sender.pending().is_full());
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        tokio::fs::write(&path, b"").await.unwrap();

        assert!(matches!(
            FileSender::bind(&path, Config::local()).await,
            Err(Error::EmptyFile)
        ));
    }

    #[tokio::test]
    async fn test_range_request_fills_queue() {
        let (_dir, sender) = sender_for(&[0u8; 1000], Config::local()).await;
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let request = RangeRequest {
            ranges: vec![(0, 99), (50, 149), (900, 5000), (10, 5)],
        };
        assert_eq!(sender.handle_range_request(&request, addr), 3);
        assert_eq!(
            sender.pending().query_missing(0),
            vec![Range::new(150, 899).unwrap()]
        );

        // 같은 요청은 다시 적재되지 않음
        assert_eq!(sender.handle_range_request(&request, addr), 0);
        assert_eq!(sender.stats().range_requests, 2);
    }

    #[tokio::test]
    async fn test_workers_send_requested_chunks() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = Config {
            data_addr: receiver.local_addr().unwrap(),
            chunk_size: 400,
            sender_workers: 1,
            ..Config::local()
        };
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (_dir, sender) = sender_for(&data, config).await;
        let sender = Arc::new(sender);
        let cancel = CancellationToken::new();
        let running = tokio::spawn(sender.clone().run(cancel.clone()));

        let request = RangeRequest::new(&[Range::new(100, 899).unwrap()]);
        sender.handle_range_request(&request, receiver.local_addr().unwrap());

        let mut buf = vec![0u8; 65535];
        let mut got = Vec::new();
        for _ in 0..2 {
            let (len, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            let chunk = ChunkMessage::from_bytes(&buf[..len]).unwrap();
            chunk.verify_crc().unwrap();
            let start = chunk.offset as usize;
            assert_eq!(chunk.payload.as_ref(), &data[start..start + chunk.payload.len()]);
            got.push(chunk.range().unwrap());
        }
        got.sort();
        assert_eq!(
            got,
            vec![Range::new(100, 499).unwrap(), Range::new(500, 899).unwrap()]
        );

        cancel.cancel();
        running.await.unwrap().unwrap();
        assert!(sender.pending().is_empty());
        assert_eq!(sender.stats().total_bytes, 800);
    }
}

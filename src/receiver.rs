//! 수신자 (클라이언트측)
//!
//! - 메타데이터 요청 후 파일 크기만큼 저장소와 누락 트래커 생성
//! - 도착한 청크를 디스크에 쓰고 트래커에 채움으로 표시
//! - 일정 시간 새 데이터가 없으면 누락 구간을 재전송 요청

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::{ChunkMessage, FileInfo, InfoRequest, RangeRequest};
use crate::stats::TransferStats;
use crate::storage::FileStorage;
use crate::tracker::RangeTracker;
use crate::{Config, Error, Result};

/// 서버가 보낸 이름을 그대로 쓰지 않기 위한 기본 파일 이름
const FALLBACK_FILE_NAME: &str = "download.bin";

/// 파일 수신자
pub struct FileReceiver {
    /// 설정
    config: Config,

    /// 청크 수신 + 요청 송신 소켓
    socket: UdpSocket,

    /// 전송 통계
    stats: RwLock<TransferStats>,
}

impl FileReceiver {
    /// 데이터 소켓 바인딩
    pub async fn bind(config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(config.client_bind).await?;
        info!("FDP Receiver bound to {}", socket.local_addr()?);

        Ok(Self {
            config,
            socket,
            stats: RwLock::new(TransferStats::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 메타데이터 요청 → 파일 수신까지 한 번에 처리
    ///
    /// `output` 이 없으면 현재 디렉터리에 서버가 알려준 이름으로 저장
    pub async fn download(
        &self,
        server_addr: SocketAddr,
        output: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let (info, request_addr) = self.fetch_info(server_addr, cancel).await?;
        let path = match output {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(local_file_name(&info.name)),
        };

        self.receive_file(&info, request_addr, &path, cancel).await?;
        Ok(path)
    }

    /// 메타데이터 요청 (재시도 포함)
    ///
    /// 응답과 함께 재전송 요청을 보낼 서버 주소를 반환
    pub async fn fetch_info(
        &self,
        server_addr: SocketAddr,
        cancel: &CancellationToken,
    ) -> Result<(FileInfo, SocketAddr)> {
        let request = InfoRequest::new().to_bytes()?;
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let attempts = self.config.handshake_max_retries.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                info!("Retry #{}: Waiting for file info...", attempt - 1);
            }
            if let Err(e) = self.socket.send_to(&request, server_addr).await {
                warn!("메타데이터 요청 실패: {}", e);
            }

            let deadline = Instant::now() + self.config.handshake_retry();
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    result = timeout_at(deadline, self.socket.recv_from(&mut buf)) => result,
                };

                let (len, addr) = match received {
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        warn!("수신 에러: {}", e);
                        continue;
                    }
                    Err(_) => break,
                };

                // 이전 전송의 청크가 섞여 들어올 수 있음
                if let Ok(info) = FileInfo::from_bytes(&buf[..len]) {
                    let request_addr = SocketAddr::new(addr.ip(), info.request_port);
                    info!(
                        "file info received: {:?} ({} bytes, {} chunks)",
                        info.name,
                        info.size,
                        info.total_chunks()
                    );
                    return Ok((info, request_addr));
                }
            }
        }

        Err(Error::HandshakeTimeout { attempts })
    }

    /// 파일 수신
    ///
    /// 누락 트래커가 가득 찰 때까지 청크를 받고, 새 데이터가 끊기면
    /// 누락 구간을 `request_addr` 로 요청한다.
    pub async fn receive_file(
        &self,
        info: &FileInfo,
        request_addr: SocketAddr,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        let storage = FileStorage::create(path, info.size).await?;
        *self.stats.write() = TransferStats::new(info.size);

        if info.size == 0 {
            storage.sync().await?;
            info!("empty file {:?} created", path);
            return Ok(self.stats());
        }

        let received = RangeTracker::empty(0, info.size - 1)?;
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut deadline = Instant::now() + self.config.request_timeout();
        let mut last_progress = Instant::now();

        info!("Starting data reception into {:?}...", path);

        while !received.is_full() {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = timeout_at(deadline, self.socket.recv_from(&mut buf)) => result,
            };

            match result {
                Ok(Ok((len, _))) => {
                    if self.handle_datagram(&buf[..len], info.size, &storage, &received).await? {
                        deadline = Instant::now() + self.config.request_timeout();
                    }
                }
                Ok(Err(e)) => warn!("수신 에러: {}", e),
                Err(_) => {
                    // 서버가 아무것도 보내지 않음, 누락 구간 요청
                    self.request_missing(&received, request_addr).await?;
                    deadline = Instant::now() + self.config.request_timeout();
                }
            }

            if last_progress.elapsed() > self.config.progress_interval() {
                let filled = received.filled_len();
                info!(
                    "Progress: {}/{} bytes ({:.1}%), {} gaps",
                    filled,
                    info.size,
                    filled as f64 / info.size as f64 * 100.0,
                    received.gap_count()
                );
                last_progress = Instant::now();
            }
        }

        storage.sync().await?;

        let stats = self.stats();
        info!("Transfer complete! {}", stats.summary());
        Ok(stats)
    }

    /// 데이터그램 하나 처리, 새 데이터가 채워졌으면 true
    async fn handle_datagram(
        &self,
        data: &[u8],
        file_size: u64,
        storage: &FileStorage,
        received: &RangeTracker,
    ) -> Result<bool> {
        let chunk = match ChunkMessage::from_bytes(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("청크 아님: {}", e);
                return Ok(false);
            }
        };

        if let Err(e) = chunk.verify_crc() {
            warn!("손상된 청크 (offset={}): {}", chunk.offset, e);
            self.stats.write().corrupted_chunks += 1;
            return Ok(false);
        }

        let range = match chunk.range() {
            Some(range) if range.end() < file_size => range,
            _ => {
                warn!(
                    "파일 범위를 벗어난 청크: offset={}, len={}, size={}",
                    chunk.offset,
                    chunk.payload.len(),
                    file_size
                );
                self.stats.write().corrupted_chunks += 1;
                return Ok(false);
            }
        };

        storage.write_at(chunk.offset, &chunk.payload).await?;
        let fresh = received.fill(range);

        let mut stats = self.stats.write();
        stats.record_chunk(chunk.payload.len());
        if !fresh {
            stats.duplicate_chunks += 1;
        }
        Ok(fresh)
    }

    /// 누락 구간 재전송 요청
    async fn request_missing(&self, received: &RangeTracker, request_addr: SocketAddr) -> Result<()> {
        let missing = received.query_missing(self.config.max_ranges_per_request);
        if missing.is_empty() {
            return Ok(());
        }

        let request = RangeRequest::new(&missing);
        if let Err(e) = self.socket.send_to(&request.to_bytes()?, request_addr).await {
            warn!("재전송 요청 실패: {}", e);
            return Ok(());
        }

        self.stats.write().record_request(missing.len());
        debug!(
            "requested {} ranges ({} bytes missing)",
            missing.len(),
            received.missing_len()
        );
        Ok(())
    }
}

/// 서버가 알려준 이름에서 경로 부분 제거
fn local_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

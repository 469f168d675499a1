//! 프로토콜 설정

use std::net::SocketAddr;
use std::time::Duration;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, MAX_DATAGRAM_SIZE};

/// 청크 메시지 헤더 + 오프셋/CRC 여유분
const CHUNK_OVERHEAD: usize = 64;

/// FDP 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// [서버] 메타데이터 요청을 받는 주소
    pub info_bind: SocketAddr,

    /// [서버] 재전송 구간 요청을 받는 주소
    pub request_bind: SocketAddr,

    /// [서버] 청크를 보낼 대상 주소 (브로드캐스트 주소 가능)
    pub data_addr: SocketAddr,

    /// [클라이언트] 청크를 받는 주소
    pub client_bind: SocketAddr,

    /// [클라이언트] 서버 메타데이터 주소
    pub server_addr: SocketAddr,

    /// 청크 최대 크기 (바이트)
    pub chunk_size: usize,

    /// 재전송 요청 한 번에 담는 최대 구간 수
    pub max_ranges_per_request: usize,

    /// 청크 수신 대기 타임아웃 (밀리초)
    /// 실제 대기는 이 값에 0 ~ 같은 값 사이의 지터를 더함
    pub request_timeout_ms: u64,

    /// 메타데이터 요청 재시도 간격 (밀리초)
    pub handshake_retry_ms: u64,

    /// 메타데이터 요청 최대 시도 횟수
    pub handshake_max_retries: u32,

    /// 송신 워커 수
    pub sender_workers: usize,

    /// 청크 전송 간격 (마이크로초, 워커별)
    /// 0이면 최대 속도로 전송
    pub chunk_interval_us: u64,

    /// 시작하자마자 파일 전체를 전송할지 (false 면 요청이 올 때까지 대기)
    pub announce_on_start: bool,

    /// 진행률 로그 주기 (밀리초)
    pub progress_interval_ms: u64,

    /// 소켓 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            info_bind: SocketAddr::from(([0, 0, 0, 0], 9876)),
            request_bind: SocketAddr::from(([0, 0, 0, 0], 11000)),
            data_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            client_bind: SocketAddr::from(([0, 0, 0, 0], 8765)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], 9876)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_ranges_per_request: 62,
            request_timeout_ms: 200,
            handshake_retry_ms: 500,
            handshake_max_retries: 20,
            sender_workers: 2,
            chunk_interval_us: 0,
            announce_on_start: false,
            progress_interval_ms: 2000,
            recv_buffer_size: 65535,
        }
    }
}

impl Config {
    /// 루프백 전용 설정 (테스트용, 모든 포트 자동 할당)
    pub fn local() -> Self {
        let loopback = |port: u16| SocketAddr::from(([127, 0, 0, 1], port));
        Self {
            info_bind: loopback(0),
            request_bind: loopback(0),
            data_addr: loopback(8765),
            client_bind: loopback(0),
            server_addr: loopback(9876),
            request_timeout_ms: 50,
            handshake_retry_ms: 100,
            progress_interval_ms: 500,
            ..Self::default()
        }
    }

    /// 손실이 많은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            chunk_size: 512,
            max_ranges_per_request: 32,
            request_timeout_ms: 400,
            handshake_retry_ms: 1000,
            chunk_interval_us: 100,
            handshake_max_retries: 40,
            ..Self::default()
        }
    }

    /// 브로드캐스트로 청크를 뿌리는 설정
    pub fn broadcast(port: u16) -> Self {
        Self {
            data_addr: SocketAddr::from(([255, 255, 255, 255], port)),
            client_bind: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Self::default()
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk_size must be at least 1".into()));
        }
        if self.chunk_size + CHUNK_OVERHEAD > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidArgument(format!(
                "chunk_size {} exceeds datagram limit {}",
                self.chunk_size,
                MAX_DATAGRAM_SIZE - CHUNK_OVERHEAD
            )));
        }
        if self.sender_workers == 0 {
            return Err(Error::InvalidArgument("sender_workers must be at least 1".into()));
        }
        Ok(())
    }

    /// 지터를 더한 청크 수신 대기 시간
    pub fn request_timeout(&self) -> Duration {
        use rand::Rng;
        let jitter = rand::thread_rng().gen_range(0..=self.request_timeout_ms);
        Duration::from_millis(self.request_timeout_ms.saturating_add(jitter))
    }

    pub fn chunk_interval(&self) -> Option<Duration> {
        (self.chunk_interval_us > 0).then(|| Duration::from_micros(self.chunk_interval_us))
    }

    pub fn handshake_retry(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

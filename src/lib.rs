//! # FDP (File Distribution Protocol)
//!
//! UDP 기반 구간 추적형 파일 배포 도구
//!
//! ## 핵심 특징
//! - **구간 트래커**: 단위별 저장 없이 빈 구간(gap) 집합만으로 채움/비움 상태 관리
//! - **양방향 재사용**: 수신측은 누락 데이터 추적, 송신측은 전송 대기 큐로 같은 구조 사용
//! - **요청 기반 재전송**: 클라이언트가 누락 구간을 묶어서 요청, 서버는 큐에 합쳐서 적재
//! - **공정한 순환 전송**: 커서 기반으로 큐를 순환하며 청크 단위로 꺼냄
//! - **블로킹 대기**: 송신 워커는 큐에 작업이 생길 때까지 대기 (취소 가능)

pub mod config;
pub mod error;
pub mod message;
pub mod range;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod storage;
pub mod tracker;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{ChunkMessage, FileInfo, InfoRequest, Message, RangeRequest};
pub use range::Range;
pub use receiver::FileReceiver;
pub use sender::FileSender;
pub use stats::TransferStats;
pub use storage::FileStorage;
pub use tracker::RangeTracker;

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// UDP 페이로드 최대 크기 (IPv4)
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// 매직 넘버 (패킷 식별용)
pub const MAGIC_NUMBER: u32 = 0x46445050; // "FDPP"

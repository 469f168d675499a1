//! 에러 타입 정의

use thiserror::Error;

/// FDP 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 구간: lower {lower} > upper {upper}")]
    InvalidSpan { lower: u64, upper: u64 },

    #[error("유효하지 않은 인자: {0}")]
    InvalidArgument(String),

    #[error("대기 취소됨")]
    Cancelled,

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("메시지 타입 불일치: expected {expected}, got {got}")]
    MessageTypeMismatch { expected: String, got: String },

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("파일 범위를 벗어난 청크: offset={offset}, len={len}, size={size}")]
    ChunkOutOfRange { offset: u64, len: u64, size: u64 },

    #[error("메타데이터 응답 없음: {attempts}회 시도")]
    HandshakeTimeout { attempts: u32 },

    #[error("빈 파일은 전송할 수 없음")]
    EmptyFile,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

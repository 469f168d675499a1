//! 프로토콜 메시지 정의
//!
//! 모든 데이터그램은 `MessageHeader` (bincode) 뒤에 페이로드 (bincode) 가 붙는 형태
//!
//! - InfoRequest: 클라이언트 → 서버 (메타데이터 요청)
//! - FileInfo: 서버 → 클라이언트 (파일 이름/크기)
//! - Chunk: 서버 → 데이터 포트 (오프셋 + 데이터)
//! - RangeRequest: 클라이언트 → 서버 (누락 구간 재전송 요청)

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::range::Range;
use crate::{Error, Result, MAGIC_NUMBER, PROTOCOL_VERSION};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// 메타데이터 요청
    InfoRequest = 1,

    /// 메타데이터 응답
    FileInfo = 2,

    /// 데이터 청크
    Chunk = 3,

    /// 누락 구간 재전송 요청
    RangeRequest = 4,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 메시지 헤더
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 메시지 타입
    pub msg_type: MessageType,

    /// 메시지 길이 (헤더 제외)
    pub payload_len: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            msg_type,
            payload_len,
        }
    }

    /// 매직 넘버와 버전 확인
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: self.magic,
            });
        }
        if self.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: self.version,
            });
        }
        Ok(())
    }
}

/// 헤더 + 페이로드 직렬화
fn frame<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(payload)?;
    let header = MessageHeader::new(msg_type, payload.len() as u32);
    let header_bytes = bincode::serialize(&header)?;

    let mut buf = Vec::with_capacity(header_bytes.len() + payload.len());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// 헤더 검증 후 페이로드 위치 반환
fn split_header(bytes: &[u8]) -> Result<(MessageHeader, &[u8])> {
    let header: MessageHeader = bincode::deserialize(bytes)?;
    header.validate()?;

    let header_size = bincode::serialized_size(&header)? as usize;
    let payload = bytes.get(header_size..).unwrap_or_default();
    Ok((header, payload))
}

/// 특정 타입의 메시지로 역직렬화
fn unframe<T: DeserializeOwned>(bytes: &[u8], expected: MessageType) -> Result<T> {
    let (header, payload) = split_header(bytes)?;
    if header.msg_type != expected {
        return Err(Error::MessageTypeMismatch {
            expected: expected.to_string(),
            got: header.msg_type.to_string(),
        });
    }
    Ok(bincode::deserialize(payload)?)
}

/// 메타데이터 요청 (클라이언트 → 서버)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRequest {
    /// 클라이언트 프로토콜 버전
    pub protocol_version: u8,
}

impl InfoRequest {
    pub fn new() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        frame(MessageType::InfoRequest, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unframe(bytes, MessageType::InfoRequest)
    }
}

impl Default for InfoRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// 메타데이터 응답 (서버 → 클라이언트)
///
/// 클라이언트는 이 값으로 `[0, size-1]` 트래커와 파일을 만든다
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// 파일 이름 (경로 제외)
    pub name: String,

    /// 파일 크기 (바이트)
    pub size: u64,

    /// 서버 청크 크기
    pub chunk_size: u32,

    /// 재전송 요청을 받는 서버 포트
    pub request_port: u16,
}

impl FileInfo {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        frame(MessageType::FileInfo, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unframe(bytes, MessageType::FileInfo)
    }

    /// 전체 청크 수 (진행률 표시용)
    pub fn total_chunks(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.size.div_ceil(self.chunk_size as u64)
    }
}

/// 데이터 청크 (서버 → 클라이언트)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    /// 파일 내 오프셋
    pub offset: u64,

    /// 데이터 CRC32
    pub crc32: u32,

    /// 실제 데이터
    pub payload: Bytes,
}

impl ChunkMessage {
    /// 새 청크 생성
    pub fn new(offset: u64, payload: Bytes) -> Self {
        let crc32 = crc32fast::hash(&payload);
        Self {
            offset,
            crc32,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        frame(MessageType::Chunk, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unframe(bytes, MessageType::Chunk)
    }

    /// 청크가 덮는 구간 (빈 청크면 None)
    pub fn range(&self) -> Option<Range> {
        Range::from_offset_len(self.offset, self.payload.len() as u64)
    }

    /// CRC 검증
    pub fn verify_crc(&self) -> Result<()> {
        let got = crc32fast::hash(&self.payload);
        if got != self.crc32 {
            return Err(Error::CrcMismatch {
                expected: self.crc32,
                got,
            });
        }
        Ok(())
    }
}

/// 누락 구간 재전송 요청 (클라이언트 → 서버)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    /// (min, max) 닫힌 구간 목록
    pub ranges: Vec<(u64, u64)>,
}

impl RangeRequest {
    pub fn new(ranges: &[Range]) -> Self {
        Self {
            ranges: ranges.iter().map(|&range| range.into()).collect(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        frame(MessageType::RangeRequest, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unframe(bytes, MessageType::RangeRequest)
    }

    /// 구간 목록 (min > max 인 쌍은 에러)
    pub fn ranges(&self) -> impl Iterator<Item = Result<Range>> + '_ {
        self.ranges.iter().map(|&pair| Range::try_from(pair))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    InfoRequest(InfoRequest),
    FileInfo(FileInfo),
    Chunk(ChunkMessage),
    RangeRequest(RangeRequest),
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::InfoRequest(_) => MessageType::InfoRequest,
            Message::FileInfo(_) => MessageType::FileInfo,
            Message::Chunk(_) => MessageType::Chunk,
            Message::RangeRequest(_) => MessageType::RangeRequest,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Message::InfoRequest(msg) => msg.to_bytes(),
            Message::FileInfo(msg) => msg.to_bytes(),
            Message::Chunk(msg) => msg.to_bytes(),
            Message::RangeRequest(msg) => msg.to_bytes(),
        }
    }

    /// 헤더의 타입에 따라 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, payload) = split_header(bytes)?;
        let message = match header.msg_type {
            MessageType::InfoRequest => Message::InfoRequest(bincode::deserialize(payload)?),
            MessageType::FileInfo => Message::FileInfo(bincode::deserialize(payload)?),
            MessageType::Chunk => Message::Chunk(bincode::deserialize(payload)?),
            MessageType::RangeRequest => Message::RangeRequest(bincode::deserialize(payload)?),
        };
        Ok(message)
    }
}

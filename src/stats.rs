//! 전송 통계

use std::time::{Duration, Instant};

/// 전체 전송 통계 (송신/수신 공용)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전송 대상 파일 크기
    pub file_size: u64,

    /// 송신/수신 청크 수
    pub total_chunks: u64,

    /// 송신/수신 바이트
    pub total_bytes: u64,

    /// 이미 받은 구간만 담은 청크 수 (수신측)
    pub duplicate_chunks: u64,

    /// CRC 불일치 또는 범위 밖 청크 수 (수신측)
    pub corrupted_chunks: u64,

    /// 재전송 요청 메시지 수 (송신측: 처리, 수신측: 전송)
    pub range_requests: u64,

    /// 요청된 구간 총 개수
    pub ranges_requested: u64,

    /// 마지막 재전송 요청 시간
    pub last_request_time: Option<Instant>,
}

impl TransferStats {
    pub fn new(file_size: u64) -> Self {
        Self {
            start_time: Instant::now(),
            file_size,
            total_chunks: 0,
            total_bytes: 0,
            duplicate_chunks: 0,
            corrupted_chunks: 0,
            range_requests: 0,
            ranges_requested: 0,
            last_request_time: None,
        }
    }

    /// 청크 기록
    pub fn record_chunk(&mut self, size: usize) {
        self.total_chunks += 1;
        self.total_bytes += size as u64;
    }

    /// 재전송 요청 기록
    pub fn record_request(&mut self, range_count: usize) {
        self.range_requests += 1;
        self.ranges_requested += range_count as u64;
        self.last_request_time = Some(Instant::now());
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 파일 크기 대비 전송량 비율 (1.0 이면 재전송 없음)
    pub fn overhead_ratio(&self) -> f64 {
        if self.file_size == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.file_size as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Chunks: {} | Bytes: {}/{} | Throughput: {:.2} MB/s | Overhead: {:.2}x | Duplicates: {} | Corrupted: {} | Requests: {} ({} ranges)",
            self.elapsed().as_secs_f64(),
            self.total_chunks,
            self.total_bytes,
            self.file_size,
            self.throughput() / 1_000_000.0,
            self.overhead_ratio(),
            self.duplicate_chunks,
            self.corrupted_chunks,
            self.range_requests,
            self.ranges_requested,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(0)
    }
}

//! 닫힌 정수 구간 정의
//!
//! - Range: `[start, end]` 양 끝 포함 구간 (바이트 오프셋 등)
//! - 트래커의 인자와 내부 빈 구간(gap) 표현에 공통으로 사용

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 닫힌 구간 `[start, end]`
///
/// `start <= end` 는 생성 시점에 보장되며 역직렬화도 같은 검사를 거친다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "(u64, u64)", into = "(u64, u64)")]
pub struct Range {
    start: u64,
    end: u64,
}

impl Range {
    /// 새 구간 생성
    ///
    /// `start > end` 이면 `InvalidSpan`
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidSpan {
                lower: start,
                upper: end,
            });
        }
        Ok(Self { start, end })
    }

    /// 검증이 끝난 경계값으로 구간 생성 (gap 집합 내부용)
    pub(crate) fn from_bounds(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "inverted range [{}, {}]", start, end);
        Self { start, end }
    }

    /// 시작 위치 (포함)
    pub fn start(&self) -> u64 {
        self.start
    }

    /// 끝 위치 (포함)
    pub fn end(&self) -> u64 {
        self.end
    }

    /// 한 점짜리 구간
    pub fn point(position: u64) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    /// 오프셋과 길이로 구간 생성 (`len == 0` 이면 None)
    pub fn from_offset_len(offset: u64, len: u64) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let end = offset.checked_add(len - 1)?;
        Some(Self { start: offset, end })
    }

    /// 구간 길이 (원소 수)
    ///
    /// `[0, u64::MAX]` 는 u64 로 표현할 수 없으므로 포화
    /// (트래커는 이런 span 을 만들지 않음)
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position <= self.end
    }

    /// 두 구간이 한 점이라도 공유하는지
    pub fn intersects(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// 교집합
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.intersects(other) {
            return None;
        }
        Some(Range {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// `self`가 `other`를 완전히 포함하는지
    pub fn covers(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// `self - other` 결과 조각들 (0, 1, 2개)
    ///
    /// 왼쪽 조각이 먼저 온다
    pub fn minus(&self, other: &Range) -> Vec<Range> {
        let mut pieces = Vec::with_capacity(2);
        if !self.intersects(other) {
            pieces.push(*self);
            return pieces;
        }
        if self.start < other.start {
            pieces.push(Range {
                start: self.start,
                end: other.start - 1,
            });
        }
        if self.end > other.end {
            pieces.push(Range {
                start: other.end + 1,
                end: self.end,
            });
        }
        pieces
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

impl From<Range> for (u64, u64) {
    fn from(range: Range) -> Self {
        (range.start, range.end)
    }
}

impl TryFrom<(u64, u64)> for Range {
    type Error = Error;

    fn try_from((start, end): (u64, u64)) -> Result<Self> {
        Range::new(start, end)
    }
}

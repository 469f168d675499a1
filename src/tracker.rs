//! 구간 트래커
//!
//! 고정된 정수 구간(span) 위에서 "채워짐"/"비어 있음" 상태를 단위별 저장 없이
//! 빈 구간(gap) 집합으로만 관리한다.
//!
//! - 수신측: 누락 데이터 추적 (`fill` 후 `query_missing` 으로 재전송 요청)
//! - 송신측: 전송 대기 작업 큐 (`fill` 로 적재, `dequeue_chunk*` 로 꺼냄)
//!
//! ```text
//! span [0, 9], 채워진 칸 = 1
//! [1,1,0,0,0,1,1,0,1,0]   gaps: [2,4] [7,7] [9,9]
//! fill([4,7])
//! [1,1,0,0,1,1,1,1,1,0]   gaps: [2,3] [9,9]
//! dequeue_chunk(4) -> [0,1], dequeue_chunk(4) -> [4,7]
//! [0,0,0,0,0,0,0,0,1,0]   gaps: [0,7] [9,9]
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::range::Range;
use crate::{Error, Result};

/// 블로킹 대기 중 취소 토큰을 다시 확인하는 주기
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 빈 구간 집합
#[derive(Debug, Clone)]
enum Gaps {
    /// span 전체가 비어 있음 (집합을 만들지 않음)
    AllEmpty,

    /// 시작 위치 -> 끝 위치, 서로 겹치지도 인접하지도 않음
    /// 비어 있는 map 은 "전부 채워짐"
    Mixed(BTreeMap<u64, u64>),
}

/// 락으로 보호되는 트래커 내부 상태
#[derive(Debug)]
struct TrackerState {
    span: Range,
    gaps: Gaps,
    /// 다음 dequeue 탐색 시작 위치 (순환)
    cursor: u64,
}

impl TrackerState {
    fn new(span: Range, gaps: Gaps) -> Self {
        Self {
            span,
            gaps,
            cursor: span.start(),
        }
    }

    /// 채워진 칸이 하나라도 있는지
    fn has_filled(&self) -> bool {
        matches!(self.gaps, Gaps::Mixed(_))
    }

    fn fill(&mut self, range: Range) -> bool {
        let Some(range) = range.intersection(&self.span) else {
            return false;
        };

        if matches!(self.gaps, Gaps::AllEmpty) {
            let gaps = self
                .span
                .minus(&range)
                .into_iter()
                .map(|gap| (gap.start(), gap.end()))
                .collect();
            self.gaps = Gaps::Mixed(gaps);
            return true;
        }

        let Gaps::Mixed(gaps) = &mut self.gaps else {
            return false;
        };

        // range 시작점을 덮는 왼쪽 gap 부터 range 끝까지 시작하는 gap 전부
        let first = match gaps.range(..=range.start()).next_back() {
            Some((&start, &end)) if end >= range.start() => start,
            _ => range.start(),
        };
        let hit: Vec<Range> = gaps
            .range(first..=range.end())
            .map(|(&start, &end)| Range::from_bounds(start, end))
            .collect();

        for gap in &hit {
            gaps.remove(&gap.start());
            for piece in gap.minus(&range) {
                gaps.insert(piece.start(), piece.end());
            }
        }

        !hit.is_empty()
    }

    fn dequeue(&mut self, max_len: u64) -> Option<Range> {
        let span = self.span;
        let Gaps::Mixed(gaps) = &mut self.gaps else {
            return None;
        };

        let start = match first_filled_from(gaps, self.cursor, span) {
            Some(start) => start,
            None => first_filled_from(gaps, span.start(), span)?,
        };

        // 다음 gap 이나 span 끝을 넘지 않음
        let mut end = start.saturating_add(max_len - 1).min(span.end());
        if let Some((&next_gap, _)) = gaps.range(start..).next() {
            end = end.min(next_gap - 1);
        }
        let chunk = Range::from_bounds(start, end);

        // 꺼낸 구간을 다시 gap 으로 되돌리며 양옆과 병합
        let left = gaps
            .range(..start)
            .next_back()
            .filter(|(_, &gap_end)| gap_end + 1 == start)
            .map(|(&gap_start, _)| gap_start);
        let right = end
            .checked_add(1)
            .and_then(|next| gaps.get(&next).map(|&gap_end| (next, gap_end)));

        let merged_start = match left {
            Some(gap_start) => {
                gaps.remove(&gap_start);
                gap_start
            }
            None => start,
        };
        let merged_end = match right {
            Some((gap_start, gap_end)) => {
                gaps.remove(&gap_start);
                gap_end
            }
            None => end,
        };
        gaps.insert(merged_start, merged_end);

        self.cursor = if end == span.end() { span.start() } else { end + 1 };

        if gaps.len() == 1 && merged_start == span.start() && merged_end == span.end() {
            trace!("tracker {} drained", span);
            self.gaps = Gaps::AllEmpty;
        }

        Some(chunk)
    }

    fn query_missing(&self, max_count: usize) -> Vec<Range> {
        let limit = if max_count == 0 { usize::MAX } else { max_count };
        match &self.gaps {
            Gaps::AllEmpty => vec![self.span],
            Gaps::Mixed(gaps) => gaps
                .iter()
                .take(limit)
                .map(|(&start, &end)| Range::from_bounds(start, end))
                .collect(),
        }
    }

    fn missing_len(&self) -> u64 {
        match &self.gaps {
            Gaps::AllEmpty => self.span.len(),
            Gaps::Mixed(gaps) => gaps
                .iter()
                .map(|(&start, &end)| end - start + 1)
                .sum(),
        }
    }
}

/// `position` 이후 첫 번째 채워진 위치 (span 을 벗어나면 None)
fn first_filled_from(gaps: &BTreeMap<u64, u64>, position: u64, span: Range) -> Option<u64> {
    let candidate = match gaps.range(..=position).next_back() {
        Some((_, &gap_end)) if gap_end >= position => gap_end.checked_add(1)?,
        _ => position,
    };
    (candidate <= span.end()).then_some(candidate)
}

/// 동시 접근 가능한 구간 트래커
///
/// 모든 연산은 하나의 내부 락으로 직렬화되며, 락은 연산 자체의 시간 동안만
/// 잡힌다. 블로킹 소비자는 락이 아닌 가용성 신호(condvar / notify)에서 대기하므로
/// 대기 중에도 다른 스레드가 `fill` / `query_missing` 을 호출할 수 있다.
#[derive(Debug)]
pub struct RangeTracker {
    state: Mutex<TrackerState>,

    /// 스레드 대기용 가용성 신호
    available: Condvar,

    /// 비동기 태스크 대기용 가용성 신호
    notify: Notify,
}

impl RangeTracker {
    /// 전체가 비어 있는 트래커
    pub fn empty(lower: u64, upper: u64) -> Result<Self> {
        let span = checked_span(lower, upper)?;
        Ok(Self::with_gaps(span, Gaps::AllEmpty))
    }

    /// 전체가 채워진 트래커 (가용성 신호가 즉시 켜짐)
    pub fn full(lower: u64, upper: u64) -> Result<Self> {
        let span = checked_span(lower, upper)?;
        Ok(Self::with_gaps(span, Gaps::Mixed(BTreeMap::new())))
    }

    fn with_gaps(span: Range, gaps: Gaps) -> Self {
        Self {
            state: Mutex::new(TrackerState::new(span, gaps)),
            available: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// 관리 대상 span
    pub fn span(&self) -> Range {
        self.state.lock().span
    }

    /// 비어 있는 구간 스냅샷 (오름차순)
    ///
    /// `max_count == 0` 이면 전부 반환. 전체가 비어 있으면 span 하나를 반환한다.
    pub fn query_missing(&self, max_count: usize) -> Vec<Range> {
        self.state.lock().query_missing(max_count)
    }

    /// `range ∩ span` 을 채움으로 표시
    ///
    /// 인접 gap 은 자동으로 합쳐지고, 이미 채워진 구간이면 아무 일도 없다.
    /// 상태가 바뀌었으면 true.
    pub fn fill(&self, range: Range) -> bool {
        let (changed, available) = {
            let mut state = self.state.lock();
            let changed = state.fill(range);
            (changed, state.has_filled())
        };

        if changed && available {
            self.wake_consumers();
        }
        changed
    }

    /// `fill` 의 (start, end) 버전
    pub fn fill_range(&self, start: u64, end: u64) -> Result<bool> {
        Ok(self.fill(Range::new(start, end)?))
    }

    /// 채워진 연속 구간 하나(길이 `<= max_len`)를 꺼내고 비움 (논블로킹)
    ///
    /// 전체가 비어 있으면 None. 요청 길이가 연속 구간보다 길면 다음 gap
    /// 또는 span 끝에서 잘린다.
    pub fn dequeue_chunk(&self, max_len: u64) -> Result<Option<Range>> {
        check_chunk_len(max_len)?;
        Ok(self.state.lock().dequeue(max_len))
    }

    /// 채워진 구간이 생길 때까지 현재 스레드를 막고 기다린 뒤 꺼냄
    ///
    /// 깨어날 때마다 다시 확인하므로 다른 소비자가 먼저 가져가도 안전하다.
    /// 취소되면 상태를 건드리지 않고 `Cancelled` 반환.
    pub fn dequeue_chunk_blocking(
        &self,
        max_len: u64,
        cancel: &CancellationToken,
    ) -> Result<Range> {
        check_chunk_len(max_len)?;

        let mut state = self.state.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(chunk) = state.dequeue(max_len) {
                return Ok(chunk);
            }
            self.available.wait_for(&mut state, CANCEL_POLL_INTERVAL);
        }
    }

    /// `dequeue_chunk_blocking` 의 비동기 버전 (tokio 태스크용)
    pub async fn dequeue_chunk_wait(
        &self,
        max_len: u64,
        cancel: &CancellationToken,
    ) -> Result<Range> {
        check_chunk_len(max_len)?;

        loop {
            // 확인 전에 등록해야 확인과 대기 사이의 fill 을 놓치지 않음
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let dequeued = self.state.lock().dequeue(max_len);
            if let Some(chunk) = dequeued {
                return Ok(chunk);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// `position` 이 비어 있는 구간 안에 있는지
    pub fn is_missing(&self, position: u64) -> Result<bool> {
        let state = self.state.lock();
        if !state.span.contains(position) {
            return Err(Error::InvalidArgument(format!(
                "position {} outside span {}",
                position, state.span
            )));
        }

        Ok(match &state.gaps {
            Gaps::AllEmpty => true,
            Gaps::Mixed(gaps) => matches!(
                gaps.range(..=position).next_back(),
                Some((_, &gap_end)) if gap_end >= position
            ),
        })
    }

    /// 전부 채워졌는지
    pub fn is_full(&self) -> bool {
        matches!(&self.state.lock().gaps, Gaps::Mixed(gaps) if gaps.is_empty())
    }

    /// 전부 비었는지
    pub fn is_empty(&self) -> bool {
        matches!(self.state.lock().gaps, Gaps::AllEmpty)
    }

    /// 비어 있는 칸 수
    pub fn missing_len(&self) -> u64 {
        self.state.lock().missing_len()
    }

    /// 채워진 칸 수
    pub fn filled_len(&self) -> u64 {
        let state = self.state.lock();
        state.span.len() - state.missing_len()
    }

    /// 현재 gap 개수 (전체가 비어 있으면 1)
    pub fn gap_count(&self) -> usize {
        match &self.state.lock().gaps {
            Gaps::AllEmpty => 1,
            Gaps::Mixed(gaps) => gaps.len(),
        }
    }

    fn wake_consumers(&self) {
        self.available.notify_all();
        self.notify.notify_waiters();
    }
}

/// 칸 수가 u64 로 셀 수 있는 span 만 허용 (`[0, u64::MAX]` 는 2^64 칸)
fn checked_span(lower: u64, upper: u64) -> Result<Range> {
    let span = Range::new(lower, upper)?;
    if span.end() - span.start() == u64::MAX {
        return Err(Error::InvalidArgument(format!(
            "span {} has more than u64::MAX positions",
            span
        )));
    }
    Ok(span)
}

fn check_chunk_len(max_len: u64) -> Result<()> {
    if max_len == 0 {
        return Err(Error::InvalidArgument(
            "chunk length must be at least 1".into(),
        ));
    }
    Ok(())
}

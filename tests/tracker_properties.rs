//! RangeTracker 성질 테스트
//!
//! 작은 span 에서 bool 배열 모델과 비교하며 무작위 연산을 적용

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use fdp::{Error, Range, RangeTracker};

/// 채워진 칸 = true
struct Model {
    lower: u64,
    filled: Vec<bool>,
}

impl Model {
    fn new(lower: u64, len: usize, filled: bool) -> Self {
        Self {
            lower,
            filled: vec![filled; len],
        }
    }

    fn upper(&self) -> u64 {
        self.lower + self.filled.len() as u64 - 1
    }

    fn fill(&mut self, range: Range) {
        for position in range.start()..=range.end() {
            if position >= self.lower && position <= self.upper() {
                self.filled[(position - self.lower) as usize] = true;
            }
        }
    }

    fn erase(&mut self, range: Range) {
        for position in range.start()..=range.end() {
            self.filled[(position - self.lower) as usize] = false;
        }
    }

    fn is_filled(&self, position: u64) -> bool {
        self.filled[(position - self.lower) as usize]
    }

    fn gaps(&self) -> Vec<Range> {
        let mut gaps = Vec::new();
        let mut open: Option<u64> = None;
        for (i, &filled) in self.filled.iter().enumerate() {
            let position = self.lower + i as u64;
            match (filled, open) {
                (false, None) => open = Some(position),
                (true, Some(start)) => {
                    gaps.push(Range::new(start, position - 1).unwrap());
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            gaps.push(Range::new(start, self.upper()).unwrap());
        }
        gaps
    }

    fn filled_len(&self) -> u64 {
        self.filled.iter().filter(|&&filled| filled).count() as u64
    }
}

fn assert_consistent(tracker: &RangeTracker, model: &Model) {
    let gaps = tracker.query_missing(0);

    // 정렬, 서로소, 비인접, span 내부
    for pair in gaps.windows(2) {
        assert!(pair[0].end() + 1 < pair[1].start(), "gaps {:?} overlap or touch", pair);
    }
    for gap in &gaps {
        assert!(tracker.span().covers(gap));
    }

    assert_eq!(gaps, model.gaps());
    assert_eq!(tracker.filled_len(), model.filled_len());
    assert_eq!(
        tracker.filled_len() + gaps.iter().map(Range::len).sum::<u64>(),
        tracker.span().len()
    );
    assert_eq!(tracker.is_full(), model.filled_len() == model.filled.len() as u64);
    assert_eq!(tracker.is_empty(), model.filled_len() == 0);

    for i in 0..model.filled.len() as u64 {
        let position = model.lower + i;
        assert_eq!(tracker.is_missing(position).unwrap(), !model.is_filled(position));
    }
}

fn random_range(rng: &mut StdRng, max: u64) -> Range {
    let a = rng.gen_range(0..=max);
    let b = rng.gen_range(0..=max);
    Range::new(a.min(b), a.max(b)).unwrap()
}

#[test]
fn random_operations_match_model() {
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for round in 0..200 {
        let lower = rng.gen_range(0..20);
        let len = rng.gen_range(1..60);
        let start_full = round % 3 == 0;

        let tracker = if start_full {
            RangeTracker::full(lower, lower + len as u64 - 1).unwrap()
        } else {
            RangeTracker::empty(lower, lower + len as u64 - 1).unwrap()
        };
        let mut model = Model::new(lower, len, start_full);
        let max = model.upper() + 5;

        for _ in 0..80 {
            if rng.gen_bool(0.5) {
                let range = random_range(&mut rng, max);
                tracker.fill(range);
                model.fill(range);
            } else {
                let max_len = rng.gen_range(1..10);
                match tracker.dequeue_chunk(max_len).unwrap() {
                    Some(chunk) => {
                        assert!(chunk.len() <= max_len);
                        for position in chunk.start()..=chunk.end() {
                            assert!(model.is_filled(position), "dequeued unfilled {}", position);
                        }
                        // 짧게 잘렸다면 다음 칸이 비었거나 span 끝
                        if chunk.len() < max_len && chunk.end() < model.upper() {
                            assert!(!model.is_filled(chunk.end() + 1));
                        }
                        model.erase(chunk);
                    }
                    None => assert_eq!(model.filled_len(), 0),
                }
            }
            assert_consistent(&tracker, &model);
        }
    }
}

#[test]
fn fill_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let tracker = RangeTracker::empty(0, 99).unwrap();
        for _ in 0..rng.gen_range(0..6) {
            tracker.fill(random_range(&mut rng, 120));
        }

        let range = random_range(&mut rng, 120);
        tracker.fill(range);
        let once = tracker.query_missing(0);
        assert!(!tracker.fill(range));
        assert_eq!(tracker.query_missing(0), once);
    }
}

#[test]
fn any_fill_order_of_a_partition_is_full() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..100 {
        let upper = rng.gen_range(0..500u64);
        let mut parts = Vec::new();
        let mut start = 0;
        while start <= upper {
            let end = (start + rng.gen_range(0..20)).min(upper);
            parts.push(Range::new(start, end).unwrap());
            start = end + 1;
        }
        parts.shuffle(&mut rng);

        let tracker = RangeTracker::empty(0, upper).unwrap();
        for part in &parts {
            assert!(!tracker.is_full());
            tracker.fill(*part);
        }
        assert!(tracker.is_full());
        assert!(tracker.query_missing(0).is_empty());
    }
}

#[test]
fn fill_then_drain_round_trip() {
    for max_len in [1, 3, 7, 64, 1000] {
        let tracker = RangeTracker::empty(10, 509).unwrap();
        tracker.fill_range(10, 509).unwrap();
        assert!(tracker.is_full());

        let mut drained = 0;
        while let Some(chunk) = tracker.dequeue_chunk(max_len).unwrap() {
            drained += chunk.len();
        }

        assert_eq!(drained, 500);
        assert!(tracker.is_empty());
        assert_eq!(tracker.query_missing(0), vec![Range::new(10, 509).unwrap()]);
    }
}

/// 결과 구간들이 서로 겹치지 않고 `[0, upper]` 를 정확히 덮는지
fn assert_exact_cover(mut chunks: Vec<Range>, upper: u64) {
    chunks.sort();
    let mut next = 0;
    for chunk in &chunks {
        assert_eq!(chunk.start(), next, "gap or overlap at {}", chunk);
        next = chunk.end() + 1;
    }
    assert_eq!(next, upper + 1);
}

#[test]
fn concurrent_dequeues_never_overlap() {
    let tracker = Arc::new(RangeTracker::full(0, 49_999).unwrap());
    let results = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let tracker = tracker.clone();
            let results = results.clone();
            thread::spawn(move || {
                let mut local = Vec::new();
                while let Some(chunk) = tracker.dequeue_chunk(3 + id).unwrap() {
                    local.push(chunk);
                }
                results.lock().unwrap().extend(local);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(tracker.is_empty());
    let chunks = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
    assert_exact_cover(chunks, 49_999);
}

#[test]
fn concurrent_fills_converge() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut parts = Vec::new();
    let mut start = 0;
    while start <= 9_999 {
        let end = (start + rng.gen_range(0..50)).min(9_999);
        parts.push(Range::new(start, end).unwrap());
        start = end + 1;
    }
    // 겹치는 구간도 섞음
    for _ in 0..200 {
        parts.push(random_range(&mut rng, 9_999));
    }
    parts.shuffle(&mut rng);

    let tracker = Arc::new(RangeTracker::empty(0, 9_999).unwrap());
    let handles: Vec<_> = parts
        .chunks(parts.len() / 4 + 1)
        .map(|batch| {
            let tracker = tracker.clone();
            let batch = batch.to_vec();
            thread::spawn(move || {
                for range in batch {
                    tracker.fill(range);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(tracker.is_full());
}

#[test]
fn blocking_consumers_drain_producer_work_exactly_once() {
    const UPPER: u64 = 4_999;

    let tracker = Arc::new(RangeTracker::empty(0, UPPER).unwrap());
    let cancel = CancellationToken::new();
    let consumed = Arc::new(AtomicU64::new(0));

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let tracker = tracker.clone();
            let cancel = cancel.clone();
            let consumed = consumed.clone();
            thread::spawn(move || {
                let mut local = Vec::new();
                loop {
                    match tracker.dequeue_chunk_blocking(16, &cancel) {
                        Ok(chunk) => {
                            consumed.fetch_add(chunk.len(), Ordering::SeqCst);
                            local.push(chunk);
                        }
                        Err(Error::Cancelled) => return local,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(3);
    let mut parts = Vec::new();
    let mut start = 0;
    while start <= UPPER {
        let end = (start + rng.gen_range(0..40)).min(UPPER);
        parts.push(Range::new(start, end).unwrap());
        start = end + 1;
    }
    parts.shuffle(&mut rng);
    for part in parts {
        tracker.fill(part);
    }

    while consumed.load(Ordering::SeqCst) < UPPER + 1 {
        thread::sleep(Duration::from_millis(5));
    }
    cancel.cancel();

    let mut chunks = Vec::new();
    for consumer in consumers {
        chunks.extend(consumer.join().unwrap());
    }
    assert!(tracker.is_empty());
    assert_exact_cover(chunks, UPPER);
}

/// 손실이 있는 채널 위에서 송신 큐 + 수신 누락 트래커만으로 전송이 끝나는지
#[test]
fn lossy_transfer_simulation_completes() {
    let mut rng = StdRng::seed_from_u64(2024);
    let size = 20_000u64;
    let chunk_size = 300;
    let max_ranges = 8;

    let pending = RangeTracker::full(0, size - 1).unwrap();
    let received = RangeTracker::empty(0, size - 1).unwrap();

    let mut rounds = 0;
    while !received.is_full() {
        rounds += 1;
        assert!(rounds < 1_000, "transfer did not converge");

        while let Some(chunk) = pending.dequeue_chunk(chunk_size).unwrap() {
            if rng.gen_bool(0.7) {
                received.fill(chunk);
            }
        }

        for gap in received.query_missing(max_ranges) {
            pending.fill(gap);
        }
    }

    assert!(received.is_full());
    assert!(received.query_missing(0).is_empty());
}

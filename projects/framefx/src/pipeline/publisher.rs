// Single-slot frame publisher. The processing loop is the sole writer; web
// readers get an Arc clone of the latest encoded frame, never a reference
// into the producer's working buffer. The lock is held only to swap or copy
// out, never across encode or I/O.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::pipeline::stats::FrameStats;

#[derive(Default)]
struct Slot {
    frame: Option<Arc<Vec<u8>>>,
    seq: u64,
    stats: FrameStats,
    finished: bool,
}

#[derive(Default)]
pub struct FramePublisher {
    slot: Mutex<Slot>,
}

impl FramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A poisoned slot only ever holds a complete frame swap
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the published frame. Encoding happens on the caller's side,
    /// outside the lock.
    pub fn publish(&self, jpeg: Vec<u8>, stats: FrameStats) {
        let mut slot = self.lock();
        slot.frame = Some(Arc::new(jpeg));
        slot.seq += 1;
        slot.stats = stats;
    }

    /// Latest frame with its sequence number, if any frame was published yet.
    pub fn latest(&self) -> Option<(Arc<Vec<u8>>, u64)> {
        let slot = self.lock();
        slot.frame.as_ref().map(|f| (Arc::clone(f), slot.seq))
    }

    pub fn stats(&self) -> FrameStats {
        self.lock().stats.clone()
    }

    pub fn finish(&self) {
        self.lock().finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_empty_and_unfinished() {
        let p = FramePublisher::new();
        assert!(p.latest().is_none());
        assert!(!p.is_finished());
    }

    #[test]
    fn sequence_advances_per_publish() {
        let p = FramePublisher::new();
        p.publish(vec![1], FrameStats::default());
        p.publish(vec![2], FrameStats::default());
        let (frame, seq) = p.latest().unwrap();
        assert_eq!(seq, 2);
        assert_eq!(*frame, vec![2]);
    }

    #[test]
    fn readers_never_observe_a_torn_frame() {
        let p = Arc::new(FramePublisher::new());

        let writer = {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for n in 1..=200u8 {
                    p.publish(vec![n; 4096], FrameStats::default());
                }
                p.finish();
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    while !p.is_finished() {
                        if let Some((frame, _)) = p.latest() {
                            let first = frame[0];
                            assert!(frame.iter().all(|&b| b == first), "torn frame observed");
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}

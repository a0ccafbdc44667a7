//! Fuzz target: `TargetQueue`
//!
//! Drives arbitrary enqueue / dequeue / release sequences and verifies:
//! - No panics for any angle or confidence, including NaN and infinities
//! - `try_enqueue` never grows the pending list past its cap
//! - Every dequeued target was previously added
//!
//! cargo fuzz run fuzz_target_queue

#![no_main]

use aipawe::fsm::context::Detection;
use aipawe::queue::{Enqueue, TargetQueue};
use libfuzzer_sys::fuzz_target;

const CAP: usize = 6;

fuzz_target!(|data: &[u8]| {
    let queue = TargetQueue::new(10.0);
    let mut added = 0usize;
    let mut served = 0usize;

    for chunk in data.chunks_exact(9) {
        let angle = f32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
        let conf = f32::from_le_bytes([chunk[5], chunk[6], chunk[7], chunk[8]]);
        match chunk[0] % 4 {
            0 | 1 => {
                let det = Detection::new(angle, conf, u64::from(chunk[0]));
                if queue.try_enqueue(&det, CAP) == Enqueue::Added {
                    added += 1;
                }
            }
            2 => {
                if queue.dequeue_highest_priority().is_some() {
                    served += 1;
                }
            }
            _ => queue.release_active(),
        }
        assert!(queue.len() <= CAP);
        assert!(served <= added);
    }
});

//! Model Test - Compares the ring against a reference deque.
//!
//! Drives the ring and a VecDeque through the same weighted random
//! operation stream on a single thread, checking every observable after
//! every operation. Covers the accessor paths (reserve, commit, cancel)
//! alongside the value conveniences.

#![cfg(not(loom))]

use std::collections::VecDeque;

use flash_ring::SpscQueue;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn run_model(capacity: usize, ops: usize, seed: u64) {
    let (mut tx, mut rx) = SpscQueue::<u64>::with_capacity(capacity);
    let mut mirror: VecDeque<u64> = VecDeque::with_capacity(capacity);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut next_value = 0u64;
    let mut pushes = 0u64;
    let mut pops = 0u64;
    let mut cancels = 0u64;

    for op in 0..ops {
        let roll = rng.gen_range(0..100);

        if roll < 35 {
            // Plain push
            let accepted = tx.push(next_value).is_ok();
            assert_eq!(
                accepted,
                mirror.len() < capacity,
                "push admission mismatch at op {}",
                op
            );
            if accepted {
                mirror.push_back(next_value);
                next_value += 1;
                pushes += 1;
            }
        } else if roll < 50 {
            // Reserve, write in place, explicit commit
            match tx.reserve() {
                Some(mut slot) => {
                    assert!(
                        mirror.len() < capacity,
                        "reserve succeeded on a full ring at op {}",
                        op
                    );
                    *slot = next_value;
                    slot.commit();
                    mirror.push_back(next_value);
                    next_value += 1;
                    pushes += 1;
                }
                None => {
                    assert_eq!(
                        mirror.len(),
                        capacity,
                        "reserve failed on a non-full ring at op {}",
                        op
                    );
                }
            }
        } else if roll < 60 {
            // Reserve then cancel: must leave no trace, even after a write
            if let Some(mut slot) = tx.reserve() {
                slot.write(u64::MAX);
                slot.cancel();
                cancels += 1;
            }
        } else if roll < 85 {
            // Plain pop
            let got = rx.pop();
            assert_eq!(got, mirror.pop_front(), "pop mismatch at op {}", op);
            if got.is_some() {
                pops += 1;
            }
        } else if roll < 90 {
            // Read then cancel: the value stays at the head
            if let Some(slot) = rx.reserve() {
                assert_eq!(
                    Some(*slot),
                    mirror.front().copied(),
                    "peek mismatch at op {}",
                    op
                );
                slot.cancel();
                cancels += 1;
            } else {
                assert!(
                    mirror.is_empty(),
                    "read reserve failed on a non-empty ring at op {}",
                    op
                );
            }
        } else {
            // Read with explicit commit
            match rx.reserve() {
                Some(slot) => {
                    let expected = mirror.pop_front();
                    assert_eq!(Some(*slot), expected, "committed read mismatch at op {}", op);
                    slot.commit();
                    pops += 1;
                }
                None => {
                    assert!(
                        mirror.is_empty(),
                        "read reserve failed on a non-empty ring at op {}",
                        op
                    );
                }
            }
        }

        // Every observable, after every operation. Single-threaded, so
        // the sizes are exact rather than bounds.
        assert_eq!(
            tx.len(),
            mirror.len(),
            "len (producer view) diverged at op {}",
            op
        );
        assert_eq!(
            rx.len(),
            mirror.len(),
            "len (consumer view) diverged at op {}",
            op
        );
        assert_eq!(tx.is_empty(), mirror.is_empty());
        assert_eq!(rx.is_empty(), mirror.is_empty());
        assert_eq!(tx.is_full(), mirror.len() == capacity);
        assert_eq!(rx.is_full(), mirror.len() == capacity);
        assert_eq!(tx.capacity(), capacity);
        assert_eq!(rx.capacity(), capacity);
    }

    // Drain whatever is left and compare the tails
    while let Some(expected) = mirror.pop_front() {
        assert_eq!(rx.pop(), Some(expected), "drain mismatch");
    }
    assert!(rx.pop().is_none());

    println!("Model run passed:");
    println!("  Capacity: {}", capacity);
    println!("  Operations: {}", ops);
    println!("  Pushes: {}, Pops: {}, Cancels: {}", pushes, pops, cancels);
}

#[test]
fn test_model_capacity_16() {
    run_model(16, 100_000, 0xFEEDFACE);
}

#[test]
fn test_model_capacity_1() {
    // Every push fills the ring and every pop empties it, so each
    // operation lands on a boundary refresh.
    run_model(1, 20_000, 0xBADC0DE);
}

#[test]
fn test_model_capacity_64() {
    run_model(64, 100_000, 0x12345678);
}

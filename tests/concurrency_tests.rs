// SPDX-License-Identifier: MIT
//! Concurrent adds, removals and lookups on one shared table

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use spdf::{reader, writer, StreamRecord, StreamTable, TableError, TokenSource, RECORD_HEADER_SIZE};

const H: u64 = RECORD_HEADER_SIZE as u64;

#[test]
fn concurrent_adds_lose_nothing() {
    const THREADS: usize = 32;
    let table = Arc::new(StreamTable::new(THREADS).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                table.add(StreamRecord::new(vec![i as u8; i])).unwrap()
            })
        })
        .collect();

    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(table.count(), THREADS + 2);
    assert_eq!(ids.len(), THREADS);
    let payload: u64 = (0..THREADS as u64).sum();
    assert_eq!(
        table.cross_reference_offset(),
        (THREADS as u64 + 2) * H + payload
    );
}

#[test]
fn concurrent_adds_beyond_capacity_fill_exactly() {
    const THREADS: usize = 16;
    const CAPACITY: usize = 5;
    let table = Arc::new(StreamTable::new(CAPACITY).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let results: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                table.add(StreamRecord::new(b"x".to_vec()))
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(TableError::Full { .. })))
        .count();
    assert_eq!(accepted, CAPACITY);
    assert_eq!(full, THREADS - CAPACITY);
    assert_eq!(table.cross_reference_offset(), (CAPACITY as u64 + 2) * H + CAPACITY as u64);
}

#[test]
fn concurrent_add_remove_cycles_return_to_reserved_state() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;
    let table = Arc::new(StreamTable::with_identity(THREADS, Arc::new(TokenSource::new())).unwrap());
    let reserved = table.cross_reference_offset();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let id = table
                        .add(StreamRecord::new(vec![0u8; (i + round) % 17]))
                        .unwrap();
                    assert!(table.find_by_id(id.as_str()).is_ok());
                    table.remove(id.as_str()).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.count(), 2);
    assert_eq!(table.cross_reference_offset(), reserved);
}

#[test]
fn snapshots_taken_during_writes_are_consistent() {
    const WRITERS: usize = 4;
    const ROUNDS: usize = 100;
    let table = Arc::new(StreamTable::new(WRITERS).unwrap());

    let writers: Vec<_> = (0..WRITERS)
        .map(|i| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let id = table.add(StreamRecord::new(vec![i as u8; 8])).unwrap();
                    table.remove(id.as_str()).unwrap();
                }
            })
        })
        .collect();

    let serializer = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            for _ in 0..ROUNDS {
                let bytes = writer::to_vec(&table).unwrap();
                let loaded = reader::from_slice(&bytes).unwrap();
                assert_eq!(loaded.count(), loaded.ids().len() + 2);
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    serializer.join().unwrap();
    assert_eq!(table.count(), 2);
}

//! Fence-gated acquisition, blocking and async.

use linear_block::Error;
use linear_block::block::{BlockAllocator, ConstBlock, DefaultBlockAllocator, Fence, FenceSignal};
use linear_block::memory::{MemfdConfig, MemoryUsage};
use std::thread;
use std::time::{Duration, Instant};

/// Produce a block whose first 64 bytes are `fill`, shared behind a pending fence.
fn fenced_block(fill: u8) -> (ConstBlock, FenceSignal) {
    let allocator = DefaultBlockAllocator::memfd(MemfdConfig::default());
    let mut block = allocator
        .allocate_linear_block(4096, MemoryUsage::READ_WRITE)
        .unwrap();
    block.map().acquire().unwrap().as_mut_slice()[..64].fill(fill);

    let (fence, signal) = Fence::pending().unwrap();
    (block.share(0, 64, fence), signal)
}

#[test]
fn test_acquire_timeout_expires() {
    let (shared, _signal) = fenced_block(1);

    let start = Instant::now();
    let result = shared.map().acquire_timeout(Duration::from_millis(50));
    assert_eq!(result.err(), Some(Error::TimedOut));
    assert!(start.elapsed() >= Duration::from_millis(40));

    // a timed-out acquisition leaves the block usable
    assert!(shared.is_mapped());
}

#[test]
fn test_acquire_after_signal() {
    let (shared, signal) = fenced_block(2);
    signal.signal().unwrap();

    let view = shared.map().acquire().unwrap();
    assert!(view.as_slice().iter().all(|&b| b == 2));
}

#[test]
fn test_unbounded_timeout_after_signal() {
    let (shared, signal) = fenced_block(9);
    signal.signal().unwrap();

    let view = shared.map().acquire_timeout(Duration::MAX).unwrap();
    assert_eq!(view.as_slice(), &[9u8; 64]);
    assert_eq!(
        shared.fence().wait_timeout(Duration::from_secs(u64::MAX / 2)),
        Ok(())
    );
}

#[test]
fn test_blocking_acquire_wakes_on_signal() {
    let (shared, signal) = fenced_block(3);

    let consumer = thread::spawn(move || {
        let view = shared.map().acquire_timeout(Duration::from_secs(5)).unwrap();
        view.as_slice().to_vec()
    });

    thread::sleep(Duration::from_millis(20));
    signal.signal().unwrap();

    let bytes = consumer.join().unwrap();
    assert_eq!(bytes, vec![3u8; 64]);
}

#[test]
fn test_many_waiters_one_signal() {
    let (shared, signal) = fenced_block(4);

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let block = shared.clone();
            thread::spawn(move || block.map().acquire_timeout(Duration::from_secs(5)).is_ok())
        })
        .collect();

    signal.signal().unwrap();
    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
}

#[test]
fn test_sub_block_waits_on_parent_fence() {
    let (shared, signal) = fenced_block(5);
    let sub = shared.sub_block(8, 8);

    assert!(!sub.map().is_ready());
    signal.signal().unwrap();
    assert!(sub.map().is_ready());
    assert_eq!(sub.map().acquire().unwrap().as_slice(), &[5u8; 8]);
}

#[tokio::test]
async fn test_async_acquire_wakes_on_signal() {
    let (shared, signal) = fenced_block(6);

    let waiter = tokio::spawn(async move {
        let view = shared.map().acquire_async().await.unwrap();
        view.as_slice().to_vec()
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    signal.signal().unwrap();

    let bytes = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("async waiter did not wake")
        .unwrap();
    assert_eq!(bytes, vec![6u8; 64]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_waiters_on_shared_fence() {
    let (shared, signal) = fenced_block(7);

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let block = shared.clone();
            tokio::spawn(async move { block.fence().wait_async().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    signal.signal().unwrap();

    for task in tasks {
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("waiter did not wake")
            .unwrap();
        assert_eq!(result, Ok(()));
    }
}

#[tokio::test]
async fn test_async_cancel_leaves_block_intact() {
    let (shared, signal) = fenced_block(8);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(10), shared.map().acquire_async()).await;
    assert!(cancelled.is_err());

    signal.signal().unwrap();
    let view = shared.map().acquire_async().await.unwrap();
    assert_eq!(view.as_slice(), &[8u8; 64]);
}

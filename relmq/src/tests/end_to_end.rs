use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::errors::QueueError;
use crate::queue::{MessageQueue, OpenMode, OverflowPolicy, QueueConfig};
use crate::tests::unique_queue_name;

#[test]
fn receive_blocks_until_a_message_arrives() {
    let queue = Arc::new(MessageQueue::create(&unique_queue_name("recv-wait"), 8, 64).unwrap());

    let consumer = Arc::clone(&queue);
    let handle = thread::spawn(move || consumer.receive(|payload| Ok(payload.to_vec())));

    thread::sleep(Duration::from_millis(50));
    queue.send(b"wake up").unwrap();

    let received = handle.join().unwrap().unwrap();
    assert_eq!(received, b"wake up");
}

#[test]
fn messages_stay_in_order_across_wraps() {
    // Four blocks of (16 rounded up to) 64 bytes; three one-block messages
    // in and out per round wrap the positions several times.
    let queue = MessageQueue::create(&unique_queue_name("wrap"), 4, 16).unwrap();
    let mut buffer = [0u8; 32];

    for round in 0..7 {
        for i in 0..3 {
            let message = format!("round {round} message {i}");
            queue.send(message.as_bytes()).unwrap();
        }
        for i in 0..3 {
            let expected = format!("round {round} message {i}");
            let n = queue.receive_into(&mut buffer).unwrap();
            assert_eq!(&buffer[..n], expected.as_bytes());
        }
    }
}

#[test]
fn wrapping_payload_roundtrips_byte_for_byte() {
    let queue = MessageQueue::create(&unique_queue_name("wrap-payload"), 4, 64).unwrap();
    let mut buffer = [0u8; 256];

    // Park the positions at the last block.
    for _ in 0..3 {
        queue.send(b"pad").unwrap();
    }
    for _ in 0..3 {
        queue.receive_into(&mut buffer).unwrap();
    }

    // A 100-byte payload from block 3 spills past the end of the block
    // array and wraps into blocks 0 and 1.
    let message: Vec<u8> = (0..100u8).collect();
    queue.send(&message).unwrap();
    let n = queue.receive_into(&mut buffer).unwrap();
    assert_eq!(&buffer[..n], &message[..]);
}

#[test]
fn stop_aborts_a_blocked_send_and_reset_recovers() {
    let config = QueueConfig::builder()
        .name(unique_queue_name("stop-send"))
        .mode(OpenMode::CreateOnly)
        .capacity(2)
        .block_size(32)
        .overflow_policy(OverflowPolicy::Block)
        .build()
        .unwrap();
    let queue = Arc::new(MessageQueue::from_config(&config).unwrap());

    queue.send(b"one").unwrap();
    queue.send(b"two").unwrap();

    let producer = Arc::clone(&queue);
    let handle = thread::spawn(move || producer.send(b"three"));

    thread::sleep(Duration::from_millis(50));
    queue.stop().unwrap();
    assert!(matches!(handle.join().unwrap(), Err(QueueError::Aborted)));

    // Stop leaves the queued data alone; after reset and one receive the
    // retried send fits.
    queue.reset();
    let mut buffer = [0u8; 8];
    assert_eq!(queue.receive_into(&mut buffer).unwrap(), 3);
    assert_eq!(&buffer[..3], b"one");
    queue.send(b"three").unwrap();
}

#[test]
fn stop_aborts_a_blocked_receive() {
    let queue = Arc::new(MessageQueue::create(&unique_queue_name("stop-recv"), 4, 64).unwrap());

    let consumer = Arc::clone(&queue);
    let handle = thread::spawn(move || consumer.receive(|payload| Ok(payload.to_vec())));

    thread::sleep(Duration::from_millis(50));
    queue.stop().unwrap();
    assert!(matches!(handle.join().unwrap(), Err(QueueError::Aborted)));
}

#[test]
fn stop_is_local_to_the_handle() {
    let name = unique_queue_name("stop-local");
    let stopped = MessageQueue::create(&name, 4, 64).unwrap();
    let live = MessageQueue::open(&name).unwrap();

    stopped.stop().unwrap();
    assert!(matches!(stopped.try_send(b"x"), Err(QueueError::Aborted)));

    // The other handle on the same segment keeps working.
    live.send(b"still here").unwrap();
    let mut buffer = [0u8; 16];
    assert_eq!(live.receive_into(&mut buffer).unwrap(), 10);
    assert_eq!(&buffer[..10], b"still here");
}

#[test]
fn concurrent_producers_keep_their_own_order() {
    let name = unique_queue_name("fifo");
    let consumer = MessageQueue::create(&name, 16, 64).unwrap();

    let first = MessageQueue::open(&name).unwrap();
    let second = MessageQueue::open(&name).unwrap();
    let producer_one = thread::spawn(move || {
        for message in [b"m1" as &[u8], b"m2", b"m3"] {
            first.send(message).unwrap();
        }
    });
    let producer_two = thread::spawn(move || {
        for message in [b"n1" as &[u8], b"n2"] {
            second.send(message).unwrap();
        }
    });

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(consumer.receive(|payload| Ok(payload.to_vec())).unwrap());
    }
    producer_one.join().unwrap();
    producer_two.join().unwrap();

    // Exactly once each.
    let mut sorted = received.clone();
    sorted.sort();
    let expected: Vec<Vec<u8>> = [b"m1", b"m2", b"m3", b"n1", b"n2"]
        .iter()
        .map(|m| m.to_vec())
        .collect();
    assert_eq!(sorted, expected);

    // Per-producer subsequences arrive in send order.
    let ones: Vec<Vec<u8>> = received
        .iter()
        .filter(|m| m.starts_with(b"m"))
        .cloned()
        .collect();
    let twos: Vec<Vec<u8>> = received
        .iter()
        .filter(|m| m.starts_with(b"n"))
        .cloned()
        .collect();
    assert_eq!(ones, expected[..3]);
    assert_eq!(twos, expected[3..]);
}

#[test]
fn last_detacher_removes_the_segment() {
    let name = unique_queue_name("refcount");
    let first = MessageQueue::open_or_create(&name, 4, 64).unwrap();
    let second = MessageQueue::open(&name).unwrap();
    let third = MessageQueue::open(&name).unwrap();

    drop(first);
    drop(second);
    // Still attached through the third handle.
    third.send(b"alive").unwrap();

    drop(third);
    assert!(matches!(
        MessageQueue::open(&name),
        Err(QueueError::NotFound { .. })
    ));
}

#[test]
fn adopting_handles_keep_the_creator_geometry() {
    let name = unique_queue_name("geometry");
    let creator = MessageQueue::open_or_create(&name, 8, 64).unwrap();

    // Different geometry arguments are ignored when the segment exists.
    let adopted = MessageQueue::open_or_create(&name, 16, 128).unwrap();
    assert_eq!(adopted.capacity(), 8);
    assert_eq!(adopted.block_size(), 64);

    drop(adopted);
    let reopened = MessageQueue::open_or_create(&name, 32, 256).unwrap();
    assert_eq!(reopened.capacity(), 8);
    assert_eq!(reopened.block_size(), 64);
    drop(reopened);
    drop(creator);
}

#[test]
fn producers_block_until_consumers_free_blocks() {
    let queue = Arc::new(MessageQueue::create(&unique_queue_name("backpressure"), 2, 64).unwrap());
    queue.send(b"a").unwrap();
    queue.send(b"b").unwrap();

    let producer = Arc::clone(&queue);
    let handle = thread::spawn(move || producer.send(b"c"));

    thread::sleep(Duration::from_millis(50));
    let mut buffer = [0u8; 8];
    assert_eq!(queue.receive_into(&mut buffer).unwrap(), 1);
    handle.join().unwrap().unwrap();

    assert_eq!(queue.receive_into(&mut buffer).unwrap(), 1);
    assert_eq!(buffer[0], b'b');
    assert_eq!(queue.receive_into(&mut buffer).unwrap(), 1);
    assert_eq!(buffer[0], b'c');
}

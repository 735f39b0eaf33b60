//! Ingress queue: FIFO order, blocking on full, close-and-drain.

use std::collections::HashSet;
use std::time::Duration;

use geoingest::error::ConnectionFault;
use geoingest::ingress_queue::build_ingress_queue;
use geoingest::types::{PendingRequest, Record};

fn request(id: &str) -> PendingRequest {
    PendingRequest::new(Record::new(id, "0", "0", "0", "0")).0
}

#[tokio::test]
async fn dequeues_in_enqueue_order_across_producers() {
    let (producer, consumer) = build_ingress_queue(8);
    let other = producer.clone();

    producer.enqueue(request("a1")).await.unwrap();
    other.enqueue(request("b1")).await.unwrap();
    producer.enqueue(request("a2")).await.unwrap();
    other.enqueue(request("b2")).await.unwrap();

    let mut order = Vec::new();
    for _ in 0..4 {
        let req = consumer.dequeue().await.unwrap();
        order.push(req.record.device_id().to_string());
    }
    assert_eq!(order, ["a1", "b1", "a2", "b2"]);
}

#[tokio::test]
async fn enqueue_on_full_queue_waits_for_dequeue() {
    let (producer, consumer) = build_ingress_queue(1);
    producer.enqueue(request("first")).await.unwrap();
    assert_eq!(producer.len(), 1);

    let blocked = {
        let producer = producer.clone();
        tokio::spawn(async move { producer.enqueue(request("second")).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished(), "enqueue should wait while full");
    assert_eq!(producer.len(), 1);

    let first = consumer.dequeue().await.unwrap();
    assert_eq!(first.record.device_id(), "first");

    blocked.await.unwrap().unwrap();
    let second = consumer.dequeue().await.unwrap();
    assert_eq!(second.record.device_id(), "second");
}

#[tokio::test]
async fn closed_queue_drains_then_reports_end() {
    let (producer, consumer) = build_ingress_queue(4);
    producer.enqueue(request("x")).await.unwrap();
    producer.enqueue(request("y")).await.unwrap();

    assert!(producer.close());
    assert!(producer.is_closed());
    assert!(matches!(
        producer.enqueue(request("z")).await,
        Err(ConnectionFault::QueueClosed)
    ));

    assert_eq!(consumer.dequeue().await.unwrap().record.device_id(), "x");
    assert_eq!(consumer.dequeue().await.unwrap().record.device_id(), "y");
    assert!(consumer.dequeue().await.is_none());
}

#[tokio::test]
async fn many_producers_never_exceed_capacity_and_lose_nothing() {
    const CAPACITY: usize = 3;
    const PRODUCERS: usize = 10;
    const PER_PRODUCER: usize = 20;

    let (producer, consumer) = build_ingress_queue(CAPACITY);
    assert_eq!(producer.capacity(), CAPACITY);

    let mut tasks = Vec::new();
    for p in 0..PRODUCERS {
        let producer = producer.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                producer.enqueue(request(&format!("{p}-{i}"))).await.unwrap();
            }
        }));
    }

    let mut seen = HashSet::new();
    while seen.len() < PRODUCERS * PER_PRODUCER {
        assert!(producer.len() <= CAPACITY);
        let req = consumer.dequeue().await.unwrap();
        assert!(seen.insert(req.record.device_id().to_string()), "duplicate dequeue");
        if seen.len() % 7 == 0 {
            tokio::task::yield_now().await;
        }
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert!(producer.is_empty());
}

//! Unit tests for the change request queues

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use glam::Vec3;
use crate::bvh::test_support::{dyn_obj, TestObject};
use super::*;

fn queued_ids(objects: &[Arc<dyn BvhObject>]) -> Vec<ObjectId> {
    objects.iter().map(|object| object.id()).collect()
}

#[test]
fn test_new_queues_are_empty() {
    let queues = ChangeQueues::new();
    assert!(queues.is_empty());
    assert_eq!(queues.len(), 0);
}

#[test]
fn test_requests_go_to_their_own_queue() {
    let queues = ChangeQueues::new();
    let a = TestObject::cube(1, Vec3::ZERO, 1.0);
    let b = TestObject::cube(2, Vec3::ZERO, 1.0);
    let c = TestObject::cube(3, Vec3::ZERO, 1.0);

    assert!(queues.request_add(dyn_obj(&a)));
    assert!(queues.request_remove(dyn_obj(&b)));
    assert!(queues.request_update(dyn_obj(&c)));
    assert_eq!(queues.len(), 3);

    assert_eq!(queued_ids(&queues.drain_adds()), vec![ObjectId(1)]);
    assert_eq!(queued_ids(&queues.drain_removes()), vec![ObjectId(2)]);
    assert_eq!(queued_ids(&queues.drain_updates()), vec![ObjectId(3)]);
    assert!(queues.is_empty());
}

#[test]
fn test_duplicate_requests_coalesce() {
    let queues = ChangeQueues::new();
    let cube = TestObject::cube(1, Vec3::ZERO, 1.0);

    assert!(queues.request_update(dyn_obj(&cube)));
    assert!(!queues.request_update(dyn_obj(&cube)));
    assert!(!queues.request_update(dyn_obj(&cube)));

    assert_eq!(queues.drain_updates().len(), 1);
}

#[test]
fn test_same_object_may_sit_in_several_queues() {
    let queues = ChangeQueues::new();
    let cube = TestObject::cube(1, Vec3::ZERO, 1.0);

    assert!(queues.request_add(dyn_obj(&cube)));
    assert!(queues.request_remove(dyn_obj(&cube)));
    assert_eq!(queues.len(), 2);
}

#[test]
fn test_drain_clears_in_flight_ids() {
    let queues = ChangeQueues::new();
    let cube = TestObject::cube(1, Vec3::ZERO, 1.0);

    queues.request_add(dyn_obj(&cube));
    queues.drain_adds();

    assert!(queues.request_add(dyn_obj(&cube)));
    assert_eq!(queues.drain_adds().len(), 1);
}

#[test]
fn test_drain_keeps_request_order() {
    let queues = ChangeQueues::new();
    for id in [4, 2, 9, 1] {
        queues.request_add(dyn_obj(&TestObject::cube(id, Vec3::ZERO, 1.0)));
    }

    assert_eq!(
        queued_ids(&queues.drain_adds()),
        vec![ObjectId(4), ObjectId(2), ObjectId(9), ObjectId(1)]
    );
}

#[test]
fn test_not_indexed_requests_are_dropped() {
    let queues = ChangeQueues::new();
    let sky = TestObject::sky(1);

    assert!(!queues.request_add(dyn_obj(&sky)));
    assert!(!queues.request_remove(dyn_obj(&sky)));
    assert!(!queues.request_update(dyn_obj(&sky)));
    assert!(queues.is_empty());
}

#[test]
fn test_lights_are_queued() {
    let queues = ChangeQueues::new();
    let light = TestObject::point_light(1, Vec3::ZERO, 5.0);

    assert!(queues.request_add(dyn_obj(&light)));
    assert_eq!(queues.len(), 1);
}

#[test]
fn test_concurrent_producers() {
    let queues = Arc::new(ChangeQueues::new());

    let handles: Vec<_> = (0..4u64)
        .map(|thread_index| {
            let queues = queues.clone();
            thread::spawn(move || {
                for i in 0..100u64 {
                    // Every thread also requests the shared ids 0..10
                    let id = if i < 10 { i } else { 1000 + thread_index * 100 + i };
                    queues.request_add(dyn_obj(&TestObject::cube(id, Vec3::ZERO, 1.0)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 10 shared ids + 4 * 90 distinct ones
    assert_eq!(queues.drain_adds().len(), 370);
}

#[test]
fn test_len_locks_one_queue_at_a_time() {
    let queues = Arc::new(ChangeQueues::new());
    let update_guard = lock(&queues.update);

    let counter = {
        let queues = queues.clone();
        thread::spawn(move || queues.len())
    };

    // The counter is stuck on the update queue and must not keep the add
    // queue locked while it waits
    thread::sleep(Duration::from_millis(20));
    let add_free = (0..100).any(|_| {
        let free = queues.add.try_lock().is_ok();
        if !free {
            thread::sleep(Duration::from_millis(5));
        }
        free
    });

    drop(update_guard);
    assert_eq!(counter.join().unwrap(), 0);
    assert!(add_free);
}

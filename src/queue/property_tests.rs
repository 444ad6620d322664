//! Property-Based Tests for Queue Module
//!
//! Random interleavings of writes and outcomes must never dispatch two items
//! of one resource key together or out of submission order.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use crate::clock::ManualClock;
use crate::queue::{ItemStatus, Operation, SyncQueue};
use crate::storage::Database;

#[derive(Debug, Clone)]
enum Step {
    Enqueue { key: u8 },
    Dispatch { limit: usize, fail_mask: u8 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0u8..4).prop_map(|key| Step::Enqueue { key }),
        1 => (1usize..6, any::<u8>()).prop_map(|(limit, fail_mask)| Step::Dispatch { limit, fail_mask }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_per_key_order_preserved(steps in prop::collection::vec(step_strategy(), 1..60)) {
        let clock = ManualClock::starting_now();
        let queue = SyncQueue::new(Database::in_memory().unwrap(), clock);

        // Ids dispatched successfully, per key, in completion order
        let mut completed: HashMap<String, Vec<i64>> = HashMap::new();

        for step in steps {
            match step {
                Step::Enqueue { key } => {
                    let key = format!("resource:{}", key);
                    queue.enqueue(&key, Operation::Update, "/r", vec![1]).unwrap();
                }
                Step::Dispatch { limit, fail_mask } => {
                    let batch = queue.next_batch(limit).unwrap();
                    prop_assert!(batch.len() <= limit);

                    let keys: HashSet<_> = batch.iter().map(|i| i.resource_key.clone()).collect();
                    prop_assert_eq!(keys.len(), batch.len(), "Batch holds two items of one key");

                    for (n, item) in batch.iter().enumerate() {
                        queue.mark_syncing(item.id).unwrap();
                        if fail_mask & (1 << (n % 8)) != 0 {
                            queue.mark_failed(item.id, "transient").unwrap();
                            queue.requeue(item.id, item.next_attempt_at).unwrap();
                        } else {
                            queue.mark_completed(item.id).unwrap();
                            completed.entry(item.resource_key.clone()).or_default().push(item.id);
                        }
                    }
                }
            }
        }

        for ids in completed.values() {
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]), "Key completed out of order: {:?}", ids);
        }

        // Nothing completed while an earlier item of its key is still open
        for item in queue.list(Some(ItemStatus::Completed), 1000).unwrap() {
            let earlier_open = queue
                .list(None, 1000)
                .unwrap()
                .into_iter()
                .any(|other| other.resource_key == item.resource_key
                    && other.id < item.id
                    && other.status != ItemStatus::Completed);
            prop_assert!(!earlier_open);
        }
    }
}

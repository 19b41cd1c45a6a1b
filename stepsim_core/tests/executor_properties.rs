//! Property tests for the executor's concurrency guarantees.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use stepsim_core::Executor;
use stepsim_env::{FnTask, OwnerKey};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_width_and_owner_exclusivity_hold(
        width in 1usize..6,
        tasks in 1usize..60,
        owners in 0u64..4,
    ) {
        let executor = Executor::new(width).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let per_owner: Arc<Vec<AtomicUsize>> =
            Arc::new((0..owners.max(1)).map(|_| AtomicUsize::new(0)).collect());
        let overlap = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..tasks {
            let running = running.clone();
            let peak = peak.clone();
            let per_owner = per_owner.clone();
            let overlap = overlap.clone();
            let done = done.clone();
            let slot = if owners == 0 { None } else { Some(i as u64 % owners) };

            let body = move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                if let Some(slot) = slot {
                    if per_owner[slot as usize].fetch_add(1, Ordering::SeqCst) != 0 {
                        overlap.store(true, Ordering::SeqCst);
                    }
                }
                std::thread::yield_now();
                if let Some(slot) = slot {
                    per_owner[slot as usize].fetch_sub(1, Ordering::SeqCst);
                }
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            };

            let task = match slot {
                Some(slot) => FnTask::new(body).with_owner(OwnerKey::from_seed(slot)).boxed(),
                None => FnTask::new(body).boxed(),
            };
            executor.execute(task).unwrap();
        }

        prop_assert!(executor.await_quiescence());
        prop_assert_eq!(done.load(Ordering::SeqCst), tasks);
        prop_assert!(peak.load(Ordering::SeqCst) <= width);
        prop_assert!(!overlap.load(Ordering::SeqCst));
    }
}

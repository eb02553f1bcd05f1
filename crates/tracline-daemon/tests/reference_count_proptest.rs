//! Reference counts must always equal the number of active rows, whatever
//! mix of explicit and monitor-driven operations produced them.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracline_core::test_support::InMemoryStore;
use tracline_core::FileEvent;
use tracline_daemon::AssociationStore;

const FILES: usize = 4;
const TASKS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    Add(usize, usize),
    Remove(usize, usize),
    Modify(usize),
    Delete(usize),
    Rename(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..FILES, 0..TASKS).prop_map(|(f, t)| Op::Add(f, t)),
        2 => (0..FILES, 0..TASKS).prop_map(|(f, t)| Op::Remove(f, t)),
        1 => (0..FILES).prop_map(Op::Modify),
        1 => (0..FILES).prop_map(Op::Delete),
        2 => (0..FILES, 0..FILES).prop_map(|(a, b)| Op::Rename(a, b)),
    ]
}

fn file(i: usize) -> PathBuf {
    PathBuf::from(format!("/proj/f{}.py", i))
}

fn task(i: usize) -> String {
    format!("T{}", i)
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let backing = Arc::new(InMemoryStore::new());
    let store = AssociationStore::load("p", backing.clone()).await.unwrap();

    for op in ops {
        match op {
            Op::Add(f, t) => {
                store.add(&file(f), &task(t)).await.unwrap();
            }
            Op::Remove(f, t) => {
                store.remove(&file(f), &task(t)).await.unwrap();
            }
            Op::Modify(f) => {
                store.apply_event(&FileEvent::modified(file(f))).await.unwrap();
            }
            Op::Delete(f) => {
                store.apply_event(&FileEvent::deleted(file(f))).await.unwrap();
            }
            Op::Rename(a, b) => {
                let before: BTreeSet<String> = store
                    .active_tasks(&file(a))
                    .into_iter()
                    .chain(store.active_tasks(&file(b)))
                    .collect();
                store.apply_event(&FileEvent::renamed(file(a), file(b))).await.unwrap();
                if a != b {
                    prop_assert!(store.associations(&file(a)).is_empty());
                    let after: BTreeSet<String> = store.active_tasks(&file(b)).into_iter().collect();
                    prop_assert_eq!(after, before);
                }
            }
        }

        for i in 0..FILES {
            let path = file(i);
            let persisted = backing
                .rows("p")
                .into_iter()
                .filter(|r| r.file_path == path && r.active)
                .count();
            prop_assert_eq!(store.reference_count(&path), persisted);
            prop_assert_eq!(store.active_tasks(&path).len(), persisted);
        }
    }

    let reloaded = AssociationStore::load("p", backing.clone()).await.unwrap();
    prop_assert_eq!(reloaded.active_files(), store.active_files());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn reference_count_tracks_active_rows(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops))?;
    }
}

//! Repeated start/stop cycles must not leak watch descriptors.

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tracline_watch::{EventFilter, NotifyWatcher, WatchAdapter};

#[cfg(target_os = "linux")]
fn open_fds() -> usize {
    fs::read_dir("/proc/self/fd").map(|d| d.count()).unwrap_or(0)
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_start_stop_cycles_release_descriptors() {
    let temp = TempDir::new().unwrap();
    for dir in ["a", "b/c", "d/e/f"] {
        fs::create_dir_all(temp.path().join(dir)).unwrap();
    }

    let mut watcher = NotifyWatcher::native();
    // Warm up once so lazily created runtime resources are not counted
    let _rx = watcher.start(temp.path(), EventFilter::allow_all()).await.unwrap();
    watcher.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let baseline = open_fds();

    for _ in 0..20 {
        let rx = watcher
            .start(temp.path(), EventFilter::allow_all())
            .await
            .unwrap();
        assert_eq!(watcher.watched_directories(), 7);
        watcher.stop().await.unwrap();
        drop(rx);
        assert_eq!(watcher.watched_directories(), 0);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = open_fds();
    assert!(
        after <= baseline + 2,
        "descriptor count grew from {} to {}",
        baseline,
        after
    );
}

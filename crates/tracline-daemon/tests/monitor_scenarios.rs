//! End-to-end monitor runs against a real watcher and a SQLite database.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracline_config::MonitorConfig;
use tracline_core::{DaemonState, FileAction, HistoryQuery, TaskSummary};
use tracline_daemon::{
    AssociationStore, MatrixRequest, ProcessProbe, Repositories, StartRequest, StopOutcome,
    Supervisor, TraceService,
};
use tracline_sqlite::{SqliteConfig, SqlitePool, SqliteTaskDirectory};

struct Fixture {
    _db: TempDir,
    project: TempDir,
    root: PathBuf,
    pool: SqlitePool,
    repos: Repositories,
}

impl Fixture {
    fn new() -> Self {
        let db = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let root = project.path().canonicalize().unwrap();
        let pool = SqlitePool::new(SqliteConfig::new(db.path().join("tracline.db"))).unwrap();
        let repos = Repositories::sqlite(pool.clone());
        Self {
            _db: db,
            project,
            root,
            pool,
            repos,
        }
    }

    async fn task(&self, id: &str, title: &str) {
        SqliteTaskDirectory::new(self.pool.clone())
            .upsert_task(&TaskSummary {
                id: id.into(),
                project_id: "proj".into(),
                title: title.into(),
                status: "todo".into(),
                assignee: None,
                priority: None,
            })
            .await
            .unwrap();
    }

    fn trace(&self) -> TraceService {
        TraceService::new(self.repos.clone()).with_base_dir(&self.root)
    }

    fn supervisor(&self) -> Supervisor {
        let config = MonitorConfig {
            debounce_ms: 300,
            ..MonitorConfig::default()
        };
        Supervisor::new(self.repos.clone(), config)
    }

    fn start_request(&self) -> StartRequest {
        StartRequest {
            project_id: "proj".into(),
            root: self.project.path().to_path_buf(),
            extensions: Some(vec![".py".into()]),
        }
    }

    async fn entries_for(&self, sup: &Supervisor, path: &Path) -> Vec<FileAction> {
        sup.history("proj", &HistoryQuery::new(100, 0))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.file_path == path)
            .map(|e| e.action)
            .collect()
    }
}

#[tokio::test]
async fn burst_of_writes_is_logged_once() {
    let fx = Fixture::new();
    fx.task("T1", "Parser").await;
    let file = fx.root.join("a.py");
    fs::write(&file, "v0").unwrap();
    fx.trace().add_file("T1", &file).await.unwrap();

    let sup = fx.supervisor();
    sup.start(fx.start_request()).await.unwrap();

    for i in 1..=3 {
        fs::write(&file, format!("v{}", i)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let store = sup.store("proj").unwrap();
    assert_eq!(store.reference_count(&file), 1);
    match sup.stop("proj").await.unwrap() {
        StopOutcome::Stopped(report) => assert!(report.graceful),
        other => panic!("unexpected stop outcome {:?}", other),
    }

    let actions = fx.entries_for(&sup, &file).await;
    assert_eq!(actions, vec![FileAction::Modified], "history: {:?}", actions);

    let history = sup.history("proj", &HistoryQuery::new(10, 0)).await.unwrap();
    assert_eq!(history[0].task_id.as_deref(), Some("T1"));
}

#[tokio::test]
async fn deleting_an_associated_file_deactivates_and_logs() {
    let fx = Fixture::new();
    fx.task("T1", "Parser").await;
    let file = fx.root.join("gone.py");
    fs::write(&file, "x = 1").unwrap();
    fx.trace().add_file("T1", &file).await.unwrap();

    let sup = fx.supervisor();
    sup.start(fx.start_request()).await.unwrap();
    fs::remove_file(&file).unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    sup.stop("proj").await.unwrap();

    assert!(fx.entries_for(&sup, &file).await.contains(&FileAction::Deleted));

    let store = AssociationStore::load("proj", fx.repos.associations.clone())
        .await
        .unwrap();
    assert_eq!(store.reference_count(&file), 0);
    let rows = store.associations(&file);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].active);
}

#[tokio::test]
async fn foreign_live_claim_blocks_start() {
    struct AlwaysAlive;
    impl ProcessProbe for AlwaysAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            true
        }
    }

    let fx = Fixture::new();
    let first = fx.supervisor().with_pid(11);
    first.start(fx.start_request()).await.unwrap();

    let second = fx.supervisor().with_pid(22).with_probe(Arc::new(AlwaysAlive));
    let err = second.start(fx.start_request()).await.unwrap_err();
    assert!(
        matches!(err, tracline_core::CoreError::AlreadyRunning { pid: 11, .. }),
        "unexpected error {}",
        err
    );
    assert_eq!(second.stop("proj").await.unwrap(), StopOutcome::Remote { pid: 11 });

    first.stop("proj").await.unwrap();
    let record = second.status("proj").await.unwrap().unwrap();
    assert_eq!(record.state, DaemonState::Stopped);
    let settings = fx.repos.projects.get("proj").await.unwrap().unwrap();
    assert!(!settings.monitor_enabled);
}

#[tokio::test]
async fn matrix_filters_by_extension() {
    let fx = Fixture::new();
    fx.task("T1", "Backend").await;
    fx.task("T2", "Docs").await;
    let trace = fx.trace();
    for name in ["a.py", "b.py", "c.py", "d.py", "e.py"] {
        trace.add_file("T1", Path::new(name)).await.unwrap();
    }
    trace.add_file("T2", Path::new("README.md")).await.unwrap();
    trace.add_file("T2", Path::new("CHANGES.md")).await.unwrap();

    let request = MatrixRequest {
        file_extension: Some(".md".into()),
        ..MatrixRequest::for_project("proj")
    };
    let matrix = trace.matrix(&request).await.unwrap();
    assert_eq!(matrix.files.len(), 2);
    assert_eq!(matrix.summary.total_files, 2);
    assert_eq!(matrix.summary.total_associations, 2);

    let everything = trace.matrix(&MatrixRequest::for_project("proj")).await.unwrap();
    assert_eq!(everything.summary.total_files, 7);
    assert_eq!(everything.summary.avg_files_per_task, 3.5);
}

#[cfg(unix)]
#[tokio::test]
async fn files_added_through_a_symlinked_root_are_tracked() {
    let fx = Fixture::new();
    fx.task("T1", "Parser").await;
    let link = fx._db.path().join("link");
    std::os::unix::fs::symlink(&fx.root, &link).unwrap();
    fs::write(fx.root.join("a.py"), "x = 1").unwrap();

    let trace = TraceService::new(fx.repos.clone()).with_base_dir(&link);
    let (_, stored, _) = trace.add_file("T1", &link.join("a.py")).await.unwrap();
    assert_eq!(stored, fx.root.join("a.py"));

    let sup = fx.supervisor();
    sup.start(StartRequest {
        root: link.clone(),
        ..fx.start_request()
    })
    .await
    .unwrap();

    let found = trace.ls_trace(&link.join("a.py"), None, None).await.unwrap();
    assert_eq!(found.project_id, "proj");
    assert_eq!(found.tasks.len(), 1);

    fs::remove_file(link.join("a.py")).unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    sup.stop("proj").await.unwrap();

    let file = fx.root.join("a.py");
    let store = AssociationStore::load("proj", fx.repos.associations.clone())
        .await
        .unwrap();
    assert_eq!(store.reference_count(&file), 0);
    let history = sup.history("proj", &HistoryQuery::new(10, 0)).await.unwrap();
    let deleted = history
        .iter()
        .find(|e| e.file_path == file && e.action == FileAction::Deleted)
        .expect("deletion logged");
    assert_eq!(deleted.task_id.as_deref(), Some("T1"));
}

#[tokio::test]
async fn moving_a_directory_out_of_the_root_deactivates_its_files() {
    let fx = Fixture::new();
    fx.task("T1", "Parser").await;
    let pkg = fx.root.join("pkg");
    fs::create_dir(&pkg).unwrap();
    let file = pkg.join("a.py");
    fs::write(&file, "x = 1").unwrap();
    fx.trace().add_file("T1", &file).await.unwrap();

    let sup = fx.supervisor();
    sup.start(fx.start_request()).await.unwrap();

    let outside = TempDir::new().unwrap();
    fs::rename(&pkg, outside.path().join("pkg")).unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    sup.stop("proj").await.unwrap();

    assert!(fx.entries_for(&sup, &file).await.contains(&FileAction::Deleted));
    let store = AssociationStore::load("proj", fx.repos.associations.clone())
        .await
        .unwrap();
    assert_eq!(store.reference_count(&file), 0);
}

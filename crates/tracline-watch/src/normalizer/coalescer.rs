//! Per-path debouncing and rename pairing.
//!
//! [`EventCoalescer`] is synchronous and clock-free: callers pass the current
//! [`Instant`] to [`push`](EventCoalescer::push) and
//! [`drain_due`](EventCoalescer::drain_due). Each path has at most one pending
//! entry whose deadline moves forward on every raw event, so a burst on one
//! path always yields exactly one [`FileEvent`].
//!
//! Net effect of a burst on one path:
//!
//! | sequence                 | emitted    |
//! |--------------------------|------------|
//! | created … modified       | `created`  |
//! | modified … modified      | `modified` |
//! | created … deleted        | `deleted`  |
//! | deleted … created        | `modified` |
//! | modified … deleted       | `deleted`  |
//! | renamed … modified       | `renamed`  |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use tracline_config::RenameDetection;
use tracline_core::{FileAction, FileEvent};
use walkdir::WalkDir;

use super::fingerprint::{Fingerprint, Fingerprinter};
use crate::events::{EventFilter, RawEvent};

#[derive(Debug, Clone)]
struct Pending {
    action: FileAction,
    prior: Option<PathBuf>,
    deadline: Instant,
    /// Content at the time of the event. For deletions this is the last
    /// fingerprint seen before the file vanished.
    fingerprint: Option<Fingerprint>,
}

/// Debounces raw events into normalized [`FileEvent`]s.
pub struct EventCoalescer {
    window: Duration,
    rename_detection: RenameDetection,
    fingerprinter: Arc<dyn Fingerprinter>,
    pending: HashMap<PathBuf, Pending>,
    known: HashMap<PathBuf, Fingerprint>,
}

impl EventCoalescer {
    pub fn new(
        window: Duration,
        rename_detection: RenameDetection,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) -> Self {
        Self {
            window,
            rename_detection,
            fingerprinter,
            pending: HashMap::new(),
            known: HashMap::new(),
        }
    }

    fn pairing_enabled(&self) -> bool {
        self.rename_detection == RenameDetection::BestEffort
    }

    /// Remember current contents of existing files so a later deletion can be
    /// paired with a create of the same content.
    pub fn prime_paths<I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        if !self.pairing_enabled() {
            return 0;
        }
        let mut count = 0;
        for path in paths {
            if let Some(fp) = self.fingerprinter.fingerprint(&path) {
                self.known.insert(path, fp);
                count += 1;
            }
        }
        count
    }

    /// Walk `root` and prime every file the filter accepts.
    pub fn prime(&mut self, root: &Path, filter: &EventFilter) -> usize {
        if !self.pairing_enabled() {
            return 0;
        }
        let files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !filter.is_excluded(root, e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && filter.accepts_extension(e.path()))
            .map(|e| e.into_path())
            .collect();
        let primed = self.prime_paths(files);
        debug!(root = %root.display(), files = primed, "fingerprints primed");
        primed
    }

    /// Number of paths waiting for their window to close.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Fold one raw event into the pending set.
    pub fn push(&mut self, raw: RawEvent, now: Instant) {
        trace!(?raw, "raw event");
        let deadline = now + self.window;
        match raw {
            RawEvent::Created(path) => self.on_created(path, deadline),
            RawEvent::Modified(path) => self.on_modified(path, deadline),
            RawEvent::Removed(path) => self.on_removed(path, deadline),
            RawEvent::Renamed { from, to } => self.on_renamed(from, to, deadline),
        }
    }

    fn on_created(&mut self, path: PathBuf, deadline: Instant) {
        let fingerprint = if self.pairing_enabled() {
            self.fingerprinter.fingerprint(&path)
        } else {
            None
        };

        let (action, prior) = match self.pending.get(&path) {
            Some(p) if p.action == FileAction::Deleted => (FileAction::Modified, None),
            Some(p) => (p.action, p.prior.clone()),
            None => match self.find_deleted_source(&path, fingerprint) {
                Some(source) => {
                    self.pending.remove(&source);
                    debug!(from = %source.display(), to = %path.display(), "paired delete and create");
                    (FileAction::Renamed, Some(source))
                }
                None => (FileAction::Created, None),
            },
        };

        self.pending.insert(
            path,
            Pending {
                action,
                prior,
                deadline,
                fingerprint,
            },
        );
    }

    fn on_modified(&mut self, path: PathBuf, deadline: Instant) {
        let entry = self.pending.entry(path).or_insert(Pending {
            action: FileAction::Modified,
            prior: None,
            deadline,
            fingerprint: None,
        });
        if entry.action == FileAction::Deleted {
            entry.action = FileAction::Modified;
        }
        entry.deadline = deadline;
    }

    fn on_removed(&mut self, path: PathBuf, deadline: Instant) {
        let previous = self.pending.remove(&path);
        let last_known = self.known.remove(&path);

        if let Some(Pending {
            action: FileAction::Renamed,
            prior: Some(source),
            ..
        }) = &previous
        {
            // Moved here and then deleted: the original path is what vanished
            self.pending.insert(
                source.clone(),
                Pending {
                    action: FileAction::Deleted,
                    prior: None,
                    deadline,
                    fingerprint: None,
                },
            );
            return;
        }

        let was_created = matches!(&previous, Some(p) if p.action == FileAction::Created);
        let fingerprint = last_known.or_else(|| previous.as_ref().and_then(|p| p.fingerprint));

        // The new name may have been reported before the old one vanished
        if self.pairing_enabled() && !was_created {
            if let Some(fp) = fingerprint {
                if let Some(target) = self.find_created_target(&path, fp) {
                    if let Some(entry) = self.pending.get_mut(&target) {
                        debug!(from = %path.display(), to = %target.display(), "paired create and delete");
                        entry.action = FileAction::Renamed;
                        entry.prior = Some(path);
                        entry.deadline = deadline;
                    }
                    return;
                }
            }
        }

        self.pending.insert(
            path,
            Pending {
                action: FileAction::Deleted,
                prior: None,
                deadline,
                fingerprint,
            },
        );
    }

    fn on_renamed(&mut self, from: PathBuf, to: PathBuf, deadline: Instant) {
        let source = self.pending.remove(&from);
        if let Some(fp) = self.known.remove(&from) {
            self.known.insert(to.clone(), fp);
        }

        let (action, prior) = match source {
            Some(Pending {
                action: FileAction::Created,
                ..
            }) => (FileAction::Created, None),
            Some(Pending {
                action: FileAction::Renamed,
                prior: Some(original),
                ..
            }) if original == to => (FileAction::Modified, None),
            Some(Pending {
                action: FileAction::Renamed,
                prior: Some(original),
                ..
            }) => (FileAction::Renamed, Some(original)),
            _ => (FileAction::Renamed, Some(from)),
        };

        let fingerprint = self.known.get(&to).copied();
        self.pending.insert(
            to,
            Pending {
                action,
                prior,
                deadline,
                fingerprint,
            },
        );
    }

    /// A pending deletion that a create at `path` most likely continues.
    fn find_deleted_source(&self, path: &Path, fingerprint: Option<Fingerprint>) -> Option<PathBuf> {
        if !self.pairing_enabled() {
            return None;
        }
        let deleted = self
            .pending
            .iter()
            .filter(|(p, entry)| entry.action == FileAction::Deleted && p.as_path() != path);

        if let Some(fp) = fingerprint {
            let mut by_content: Vec<&PathBuf> = deleted
                .clone()
                .filter(|(_, entry)| entry.fingerprint == Some(fp))
                .map(|(p, _)| p)
                .collect();
            if !by_content.is_empty() {
                by_content.sort_by_key(|p| (p.file_name() != path.file_name(), (*p).clone()));
                return by_content.first().map(|p| (*p).clone());
            }
        }

        let by_name: Vec<&PathBuf> = deleted
            .filter(|(p, entry)| entry.fingerprint.is_none() && p.file_name() == path.file_name())
            .map(|(p, _)| p)
            .collect();
        match by_name.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        }
    }

    /// A pending create whose content matches a file deleted at `path`.
    fn find_created_target(&self, path: &Path, fingerprint: Fingerprint) -> Option<PathBuf> {
        let mut candidates: Vec<&PathBuf> = self
            .pending
            .iter()
            .filter(|(p, entry)| {
                entry.action == FileAction::Created
                    && p.as_path() != path
                    && entry.fingerprint == Some(fingerprint)
            })
            .map(|(p, _)| p)
            .collect();
        candidates.sort_by_key(|p| (p.file_name() != path.file_name(), (*p).clone()));
        candidates.first().map(|p| (*p).clone())
    }

    /// Emit every entry whose window closed at or before `now`, oldest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<FileEvent> {
        let mut due: Vec<(PathBuf, Pending)> = Vec::new();
        self.pending.retain(|path, entry| {
            if entry.deadline <= now {
                due.push((path.clone(), entry.clone()));
                false
            } else {
                true
            }
        });
        self.emit(due)
    }

    /// Emit everything still pending, regardless of deadline.
    pub fn flush_all(&mut self) -> Vec<FileEvent> {
        let due: Vec<(PathBuf, Pending)> = self.pending.drain().collect();
        self.emit(due)
    }

    fn emit(&mut self, mut due: Vec<(PathBuf, Pending)>) -> Vec<FileEvent> {
        due.sort_by(|(pa, a), (pb, b)| a.deadline.cmp(&b.deadline).then_with(|| pa.cmp(pb)));
        due.into_iter()
            .map(|(path, entry)| {
                self.record_fingerprint(&path, &entry);
                let mut event = FileEvent::new(entry.action, path);
                event.prior_path = entry.prior;
                event
            })
            .collect()
    }

    fn record_fingerprint(&mut self, path: &Path, entry: &Pending) {
        if !self.pairing_enabled() {
            return;
        }
        if let Some(prior) = &entry.prior {
            self.known.remove(prior);
        }
        match entry.action {
            FileAction::Deleted => {
                self.known.remove(path);
            }
            _ => {
                if let Some(fp) = self.fingerprinter.fingerprint(path) {
                    self.known.insert(path.to_path_buf(), fp);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const WINDOW: Duration = Duration::from_millis(300);

    #[derive(Default)]
    struct FakeFingerprinter {
        contents: Mutex<HashMap<PathBuf, Fingerprint>>,
    }

    impl FakeFingerprinter {
        fn set(&self, path: &str, content: u8) {
            self.contents.lock().insert(
                PathBuf::from(path),
                Fingerprint {
                    size: 1,
                    digest: [content; 32],
                },
            );
        }

        fn remove(&self, path: &str) {
            self.contents.lock().remove(Path::new(path));
        }
    }

    impl Fingerprinter for FakeFingerprinter {
        fn fingerprint(&self, path: &Path) -> Option<Fingerprint> {
            self.contents.lock().get(path).copied()
        }
    }

    fn coalescer(mode: RenameDetection) -> (EventCoalescer, Arc<FakeFingerprinter>) {
        let fp = Arc::new(FakeFingerprinter::default());
        (EventCoalescer::new(WINDOW, mode, fp.clone()), fp)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn rapid_modifies_collapse_to_one_event() {
        let (mut c, _) = coalescer(RenameDetection::BestEffort);
        let t0 = Instant::now();
        for i in 0..10 {
            c.push(RawEvent::Modified(p("/proj/a.py")), t0 + ms(i * 20));
        }

        assert!(c.drain_due(t0 + ms(400)).is_empty());
        let events = c.drain_due(t0 + ms(180 + 300));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, FileAction::Modified);
        assert_eq!(events[0].path, p("/proj/a.py"));
        assert_eq!(c.pending_len(), 0);
    }

    #[test]
    fn window_restarts_on_each_event() {
        let (mut c, _) = coalescer(RenameDetection::Off);
        let t0 = Instant::now();
        c.push(RawEvent::Modified(p("/a.py")), t0);
        c.push(RawEvent::Modified(p("/a.py")), t0 + ms(250));
        assert!(c.drain_due(t0 + ms(300)).is_empty());
        assert_eq!(c.next_deadline(), Some(t0 + ms(550)));
        assert_eq!(c.drain_due(t0 + ms(550)).len(), 1);
    }

    #[test]
    fn collapse_table() {
        let cases: Vec<(Vec<RawEvent>, FileAction)> = vec![
            (
                vec![
                    RawEvent::Created(p("/a.py")),
                    RawEvent::Modified(p("/a.py")),
                    RawEvent::Modified(p("/a.py")),
                ],
                FileAction::Created,
            ),
            (
                vec![RawEvent::Created(p("/a.py")), RawEvent::Removed(p("/a.py"))],
                FileAction::Deleted,
            ),
            (
                vec![RawEvent::Removed(p("/a.py")), RawEvent::Created(p("/a.py"))],
                FileAction::Modified,
            ),
            (
                vec![RawEvent::Modified(p("/a.py")), RawEvent::Removed(p("/a.py"))],
                FileAction::Deleted,
            ),
        ];

        for (raws, expected) in cases {
            let (mut c, _) = coalescer(RenameDetection::BestEffort);
            let t0 = Instant::now();
            for (i, raw) in raws.clone().into_iter().enumerate() {
                c.push(raw, t0 + ms(i as u64 * 10));
            }
            let events = c.flush_all();
            assert_eq!(events.len(), 1, "sequence {:?}", raws);
            assert_eq!(events[0].action, expected, "sequence {:?}", raws);
        }
    }

    #[test]
    fn native_rename_then_modify_stays_renamed() {
        let (mut c, _) = coalescer(RenameDetection::Off);
        let t0 = Instant::now();
        c.push(
            RawEvent::Renamed {
                from: p("/a.py"),
                to: p("/b.py"),
            },
            t0,
        );
        c.push(RawEvent::Modified(p("/b.py")), t0 + ms(10));
        let events = c.flush_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, FileAction::Renamed);
        assert_eq!(events[0].prior_path, Some(p("/a.py")));
        assert_eq!(events[0].path, p("/b.py"));
    }

    #[test]
    fn from_to_both_sequence_yields_one_rename() {
        for mode in [RenameDetection::Off, RenameDetection::BestEffort] {
            let (mut c, fp) = coalescer(mode);
            fp.set("/a.py", 7);
            c.prime_paths(vec![p("/a.py")]);
            fp.remove("/a.py");
            fp.set("/b.py", 7);

            let t0 = Instant::now();
            c.push(RawEvent::Removed(p("/a.py")), t0);
            c.push(RawEvent::Created(p("/b.py")), t0);
            c.push(
                RawEvent::Renamed {
                    from: p("/a.py"),
                    to: p("/b.py"),
                },
                t0,
            );

            let events = c.flush_all();
            assert_eq!(events.len(), 1, "mode {:?}", mode);
            assert_eq!(events[0].action, FileAction::Renamed);
            assert_eq!(events[0].prior_path, Some(p("/a.py")));
        }
    }

    #[test]
    fn delete_create_with_same_content_pairs_into_rename() {
        let (mut c, fp) = coalescer(RenameDetection::BestEffort);
        fp.set("/src/old.py", 1);
        fp.set("/src/other.py", 2);
        c.prime_paths(vec![p("/src/old.py"), p("/src/other.py")]);

        fp.remove("/src/old.py");
        fp.set("/lib/new.py", 1);
        let t0 = Instant::now();
        c.push(RawEvent::Removed(p("/src/old.py")), t0);
        c.push(RawEvent::Created(p("/lib/new.py")), t0 + ms(50));

        let events = c.flush_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, FileAction::Renamed);
        assert_eq!(events[0].prior_path, Some(p("/src/old.py")));
        assert_eq!(events[0].path, p("/lib/new.py"));
    }

    #[test]
    fn create_reported_before_delete_still_pairs() {
        let (mut c, fp) = coalescer(RenameDetection::BestEffort);
        fp.set("/a.py", 3);
        c.prime_paths(vec![p("/a.py")]);
        fp.remove("/a.py");
        fp.set("/b.py", 3);

        let t0 = Instant::now();
        c.push(RawEvent::Created(p("/b.py")), t0);
        c.push(RawEvent::Removed(p("/a.py")), t0 + ms(5));

        let events = c.flush_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, FileAction::Renamed);
        assert_eq!(events[0].prior_path, Some(p("/a.py")));
    }

    #[test]
    fn different_content_is_not_a_rename() {
        let (mut c, fp) = coalescer(RenameDetection::BestEffort);
        fp.set("/a.py", 1);
        c.prime_paths(vec![p("/a.py")]);
        fp.remove("/a.py");
        fp.set("/b.py", 2);

        let t0 = Instant::now();
        c.push(RawEvent::Removed(p("/a.py")), t0);
        c.push(RawEvent::Created(p("/b.py")), t0);

        let mut actions: Vec<FileAction> = c.flush_all().into_iter().map(|e| e.action).collect();
        actions.sort_by_key(|a| a.as_str());
        assert_eq!(actions, vec![FileAction::Created, FileAction::Deleted]);
    }

    #[test]
    fn rename_detection_off_keeps_raw_pair() {
        let (mut c, fp) = coalescer(RenameDetection::Off);
        fp.set("/b.py", 1);
        let t0 = Instant::now();
        c.push(RawEvent::Removed(p("/a.py")), t0);
        c.push(RawEvent::Created(p("/b.py")), t0);
        assert_eq!(c.flush_all().len(), 2);
    }

    #[test]
    fn unfingerprinted_delete_pairs_by_name_only_when_unique() {
        let (mut c, _) = coalescer(RenameDetection::BestEffort);
        let t0 = Instant::now();
        c.push(RawEvent::Removed(p("/x/util.py")), t0);
        c.push(RawEvent::Created(p("/y/util.py")), t0);
        let events = c.flush_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, FileAction::Renamed);

        let (mut c, _) = coalescer(RenameDetection::BestEffort);
        c.push(RawEvent::Removed(p("/x/util.py")), t0);
        c.push(RawEvent::Removed(p("/z/util.py")), t0);
        c.push(RawEvent::Created(p("/y/util.py")), t0);
        assert_eq!(c.flush_all().len(), 3);
    }

    #[test]
    fn paths_are_debounced_independently() {
        let (mut c, _) = coalescer(RenameDetection::Off);
        let t0 = Instant::now();
        c.push(RawEvent::Modified(p("/a.py")), t0);
        c.push(RawEvent::Modified(p("/b.py")), t0 + ms(200));

        let first = c.drain_due(t0 + ms(300));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].path, p("/a.py"));
        let second = c.drain_due(t0 + ms(500));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].path, p("/b.py"));
    }

    #[test]
    fn rename_into_then_delete_reports_original_deleted() {
        let (mut c, _) = coalescer(RenameDetection::Off);
        let t0 = Instant::now();
        c.push(
            RawEvent::Renamed {
                from: p("/a.py"),
                to: p("/b.py"),
            },
            t0,
        );
        c.push(RawEvent::Removed(p("/b.py")), t0 + ms(10));
        let events = c.flush_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, FileAction::Deleted);
        assert_eq!(events[0].path, p("/a.py"));
    }
}

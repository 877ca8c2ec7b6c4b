//! Unknown-payload sink (spec.md §6): writes raw command bodies the
//! decoder or the event registry couldn't fully interpret, named
//! `<epoch_ms>_<code>_<kind>.bin`, one file per unrecognized `(kind, code)`
//! per minute (deduplicated).

use std::collections::HashSet;
use std::path::PathBuf;

use meter_proto::MessageKind;
use tracing::warn;

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Request => "request",
        MessageKind::Response => "response",
        MessageKind::Event => "event",
    }
}

/// Writes at most one dump per `(kind, code)` per minute into `dir`. The
/// directory is created lazily on first write.
pub struct UnknownPayloadSink {
    dir: PathBuf,
    seen_this_minute: HashSet<(MessageKind, u8, i64)>,
}

impl UnknownPayloadSink {
    pub fn new(dir: PathBuf) -> Self {
        UnknownPayloadSink {
            dir,
            seen_this_minute: HashSet::new(),
        }
    }

    /// `ts_usec` is the event's own timestamp (capture-file time in replay,
    /// wall clock in live capture); used both for the dedup minute bucket
    /// and the `<epoch_ms>` filename prefix, so the same scenario replayed
    /// twice produces identical dumps.
    pub fn write(&mut self, kind: MessageKind, code: u8, ts_usec: i64, body: &[u8]) {
        let epoch_ms = ts_usec / 1_000;
        let minute = epoch_ms / 60_000;
        if !self.seen_this_minute.insert((kind, code, minute)) {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "could not create unknown-payload sink dir");
            return;
        }
        let path = self
            .dir
            .join(format!("{epoch_ms}_{code}_{}.bin", kind_label(kind)));
        if let Err(e) = std::fs::write(&path, body) {
            warn!(path = %path.display(), error = %e, "could not write unknown-payload dump");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_file_and_dedups_within_the_same_minute() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = UnknownPayloadSink::new(dir.path().to_path_buf());
        sink.write(MessageKind::Event, 250, 1_000_000, b"abc");
        sink.write(MessageKind::Event, 250, 1_500_000, b"def");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "second write within the same minute is deduped");
        let content = std::fs::read(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(content, b"abc");
    }

    #[test]
    fn writes_a_new_file_once_the_minute_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = UnknownPayloadSink::new(dir.path().to_path_buf());
        sink.write(MessageKind::Event, 250, 0, b"first");
        sink.write(MessageKind::Event, 250, 61_000_000, b"second");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn distinct_codes_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = UnknownPayloadSink::new(dir.path().to_path_buf());
        sink.write(MessageKind::Event, 1, 0, b"a");
        sink.write(MessageKind::Event, 2, 0, b"b");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }
}

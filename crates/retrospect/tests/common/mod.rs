use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use chrono::Utc;
use retrospect::{Phase, ProgressSnapshot, StatusSink};

/// Writes a transcript with a valid session header pointing at `cwd`.
pub fn write_transcript(dir: &Path, name: &str, cwd: &Path) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        format!(
            "{{\"type\":\"session\",\"cwd\":\"{}\"}}\n{{\"type\":\"event\",\"n\":1}}\n",
            cwd.display()
        ),
    )
    .unwrap();
    path
}

/// Transcript file name whose stem encodes a timestamp `offset_days` ago.
pub fn stamped_name(offset_days: i64, suffix: &str) -> String {
    let stamp = Utc::now() - chrono::Duration::days(offset_days);
    format!("{}_{}.jsonl", stamp.format("%Y-%m-%dT%H-%M-%S-000Z"), suffix)
}

/// Writes an executable fake analysis tool running `script` under /bin/sh.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, script: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-tool");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

/// Records every phase pushed through the sink.
#[derive(Default)]
pub struct RecordingSink {
    pub phases: Mutex<Vec<Phase>>,
    pub cleared: AtomicBool,
}

impl StatusSink for RecordingSink {
    fn update(&self, snapshot: &ProgressSnapshot) {
        let mut phases = self.phases.lock().unwrap();
        if phases.last() != Some(&snapshot.phase) {
            phases.push(snapshot.phase);
        }
    }

    fn clear(&self) {
        self.cleared
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

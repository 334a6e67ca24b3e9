//! Durable, append-only session store.
//!
//! Layout is JSON Lines: the first line is `{"header": ...}`, each following line
//! is `{"trial": ...}`. A line counts only once its terminating newline is on
//! disk; every append is written in one piece and synced before returning.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use trialbox_core::{TrialRecord, TrialType};

use crate::config::{ProtocolConfig, ScheduleMode};
use crate::error::PersistenceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub subject: String,
    pub protocol: String,
    /// Seconds since the Unix epoch.
    pub started_at: u64,
    pub switch_threshold: u32,
    pub schedule: ScheduleMode,
    pub initial_trial_type: TrialType,
}

impl SessionHeader {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            subject: config.subject.clone(),
            protocol: config.protocol.clone(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            switch_threshold: config.switch_threshold,
            schedule: config.schedule,
            initial_trial_type: config.initial_trial_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Entry {
    Header(SessionHeader),
    Trial(TrialRecord),
}

// Write-side twin of `Entry` that borrows instead of owning.
#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum EntryRef<'a> {
    Header(&'a SessionHeader),
    Trial(&'a TrialRecord),
}

/// Everything a session has recorded so far
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub header: SessionHeader,
    pub trials: Vec<TrialRecord>,
}

impl SessionData {
    pub fn new(header: SessionHeader) -> Self {
        Self {
            header,
            trials: Vec::new(),
        }
    }

    /// Trial type used on each trial, by index.
    pub fn schedule(&self) -> Vec<TrialType> {
        self.trials.iter().map(|t| t.trial_type).collect()
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

#[derive(Debug)]
pub struct SessionRecorder {
    file: File,
    path: PathBuf,
    header: SessionHeader,
    count: usize,
}

impl SessionRecorder {
    /// Start a new store. Fails if `path` already exists.
    pub fn create(
        path: impl AsRef<Path>,
        header: SessionHeader,
    ) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => PersistenceError::AlreadyExists(path.clone()),
                _ => PersistenceError::Io(e),
            })?;
        let mut recorder = Self {
            file,
            path,
            header: header.clone(),
            count: 0,
        };
        recorder.write_entry(&EntryRef::Header(&header))?;
        tracing::info!(path = ?recorder.path, "session store created");
        Ok(recorder)
    }

    /// Reopen an existing store for further appends.
    ///
    /// An unterminated trailing line left by a crash is cut off first.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, SessionData), PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let (data, committed) = read_committed(&path)?;
        let file = OpenOptions::new().append(true).open(&path)?;
        if file.metadata()?.len() > committed {
            tracing::warn!(path = ?path, "truncating partial trailing entry");
            file.set_len(committed)?;
            file.sync_all()?;
        }
        let recorder = Self {
            file,
            path,
            header: data.header.clone(),
            count: data.trials.len(),
        };
        tracing::info!(path = ?recorder.path, trials = recorder.count, "session store reopened");
        Ok((recorder, data))
    }

    /// Read back every committed entry.
    pub fn read(path: impl AsRef<Path>) -> Result<SessionData, PersistenceError> {
        read_committed(path.as_ref()).map(|(data, _)| data)
    }

    /// Persist one trial. Returns only once the record is synced to disk.
    pub fn append(&mut self, record: &TrialRecord) -> Result<(), PersistenceError> {
        if record.index != self.count {
            return Err(PersistenceError::OutOfOrder {
                expected: self.count,
                got: record.index,
            });
        }
        let bytes = self.write_entry(&EntryRef::Trial(record))?;
        self.count += 1;
        tracing::debug!(trial = record.index, bytes, "trial persisted");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn header(&self) -> &SessionHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // One write per line so a crash leaves at most an unterminated tail.
    fn write_entry(&mut self, entry: &EntryRef<'_>) -> Result<usize, PersistenceError> {
        let mut line = serde_json::to_vec(entry).map_err(PersistenceError::Encode)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(line.len())
    }
}

fn read_committed(path: &Path) -> Result<(SessionData, u64), PersistenceError> {
    let bytes = std::fs::read(path)?;
    let committed = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);

    let mut header = None;
    let mut trials: Vec<TrialRecord> = Vec::new();
    for (i, line) in bytes[..committed].split(|b| *b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let line_no = i + 1;
        let entry: Entry = serde_json::from_slice(line)
            .map_err(|source| PersistenceError::Decode { line: line_no, source })?;
        match entry {
            Entry::Header(h) if header.is_none() && trials.is_empty() => header = Some(h),
            Entry::Header(_) => return Err(PersistenceError::UnexpectedHeader(line_no)),
            Entry::Trial(t) => {
                if t.index != trials.len() {
                    return Err(PersistenceError::OutOfOrder {
                        expected: trials.len(),
                        got: t.index,
                    });
                }
                trials.push(t);
            }
        }
    }

    let header = header.ok_or(PersistenceError::MissingHeader)?;
    Ok((SessionData { header, trials }, committed as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use trialbox_core::{Outcome, StateId, VisitedState};

    fn header() -> SessionHeader {
        SessionHeader::from_config(&ProtocolConfig::default())
    }

    fn record(index: usize, outcome: Outcome) -> TrialRecord {
        TrialRecord {
            index,
            trial_type: if index % 2 == 0 {
                TrialType::LeftRewarded
            } else {
                TrialType::RightRewarded
            },
            trial_start_timestamp: index as f64 * 4.25,
            visited: vec![VisitedState {
                state: StateId::WaitForPoke,
                entered_at: 0.0,
                exited_at: 0.5,
            }],
            inputs: vec![],
            outcome,
            parameters: ProtocolConfig::default().trial_parameters().unwrap(),
        }
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        SessionRecorder::create(&path, header()).unwrap();
        let err = SessionRecorder::create(&path, header()).unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists(_)));
    }

    #[test]
    fn rejects_out_of_order_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = SessionRecorder::create(dir.path().join("s.jsonl"), header()).unwrap();
        rec.append(&record(0, Outcome::Reward)).unwrap();
        let err = rec.append(&record(2, Outcome::Reward)).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::OutOfOrder {
                expected: 1,
                got: 2
            }
        ));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            SessionRecorder::read(&path),
            Err(PersistenceError::MissingHeader)
        ));
    }

    #[test]
    fn corrupt_committed_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        {
            let mut rec = SessionRecorder::create(&path, header()).unwrap();
            rec.append(&record(0, Outcome::Punish)).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{not json}\n").unwrap();
        assert!(matches!(
            SessionRecorder::read(&path),
            Err(PersistenceError::Decode { line: 3, .. })
        ));
    }
}

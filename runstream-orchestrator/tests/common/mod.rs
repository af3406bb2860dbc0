//! In-memory stand-ins for the platform, synchronizer and notifier, plus a
//! run-directory fixture.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Map, Value};
use tempfile::TempDir;

use runstream_core::duration::parse_run_duration;
use runstream_core::{
    CompletionStyle, DownstreamTarget, FileId, Lane, LaneLabel, LaneLayout, ManualClock,
    Properties, RecordId, SentinelState,
};
use runstream_orchestrator::UploadConfig;
use runstream_platform::{
    Channel, JobRequest, Notifier, PlatformError, SentinelHandle, StoragePlatform,
};
use runstream_sync::{SyncError, SyncSettings, Synchronizer, Uploader};

pub const RUN_ID: &str = "240101_A01295_0042_BHXXXXDRXY";

// ---------------------------------------------------------------------------
// Run directory
// ---------------------------------------------------------------------------

pub struct RunFixture {
    pub run: TempDir,
    pub logs: TempDir,
    pub state: TempDir,
}

impl RunFixture {
    /// Run directory with a 151+151 cycle RunInfo.xml and one samplesheet.
    pub fn new() -> Self {
        let fixture = Self {
            run: TempDir::new().unwrap(),
            logs: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
        };
        fixture.write(
            "RunInfo.xml",
            &format!(
                r#"<?xml version="1.0"?>
<RunInfo Version="5">
  <Run Id="{RUN_ID}" Number="42">
    <Reads>
      <Read Number="1" NumCycles="151" IsIndexedRead="N" />
      <Read Number="2" NumCycles="151" IsIndexedRead="N" />
    </Reads>
  </Run>
</RunInfo>
"#
            ),
        );
        fixture.write("SampleSheet.csv", "[Header]\nExperiment,42\n");
        fixture
    }

    pub fn path(&self) -> &Path {
        self.run.path()
    }

    pub fn write(&self, name: &str, contents: &str) {
        let path = self.run.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn mark_complete(&self) {
        self.write("RTAComplete.txt", "");
    }

    /// Cycle directory `C<cycle>.1` for a BaseCalls lane directory.
    pub fn cycles(&self, lane_dir: &str, max_cycle: u32) {
        let dir = self
            .run
            .path()
            .join("Data/Intensities/BaseCalls")
            .join(lane_dir)
            .join(format!("C{max_cycle}.1"));
        std::fs::create_dir_all(dir).unwrap();
    }

    pub fn config(&self, lanes: LaneLayout) -> UploadConfig {
        UploadConfig {
            sync: SyncSettings {
                executable: PathBuf::from("dx_sync_directory"),
                run_dir: self.run.path().to_path_buf(),
                temp_dir: self.logs.path().join("tmp"),
                project: "project-1".to_string(),
                auth_token: "token".to_string(),
                min_size_mb: 100,
                max_size_mb: 10_000,
                upload_threads: 8,
                min_age_secs: 1000,
                exclude_patterns: Vec::new(),
                upload_thumbnails: false,
                samplesheet_delay: false,
                uploader: Uploader::UploadAgent,
            },
            log_dir: self.logs.path().to_path_buf(),
            lanes,
            sync_interval: Duration::from_secs(60),
            run_duration: parse_run_duration("24h").unwrap(),
            intervals_to_wait: 3,
            retries: 3,
            script: None,
            downstream: DownstreamTarget::None,
            downstream_input: Map::new(),
            completion: CompletionStyle::Classic,
            sequencer_id: "A01295".to_string(),
            state_dir: self.state.path().to_path_buf(),
        }
    }
}

/// Remote folder and record name the orchestrator derives for a lane.
pub fn lane_names(label: LaneLabel) -> (String, String) {
    let lane = Lane::new(&RUN_ID.into(), label, Path::new("/logs"));
    (lane.remote_folder, lane.record_name)
}

// ---------------------------------------------------------------------------
// Storage platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeSentinel {
    pub id: RecordId,
    pub folder: String,
    pub name: String,
    pub state: SentinelState,
    pub properties: Properties,
    pub details: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub id: FileId,
    pub folder: String,
    pub name: String,
    pub properties: Properties,
}

#[derive(Default)]
pub struct FakePlatform {
    pub sentinels: RefCell<Vec<FakeSentinel>>,
    pub files: RefCell<Vec<FakeFile>>,
    pub tagged: RefCell<Vec<(FileId, Properties)>>,
    pub folders: RefCell<Vec<String>>,
    pub jobs: RefCell<Vec<JobRequest>>,
    /// Number of upcoming `find_sentinel` calls that fail.
    pub find_failures: Cell<u32>,
    pub find_calls: Cell<u32>,
    /// API error kind returned by `describe_project`.
    pub project_error: Option<String>,
    next_id: Cell<u32>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, kind: &str) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("{kind}-{n:04}")
    }

    pub fn seed_sentinel(&self, label: LaneLabel, state: SentinelState) -> RecordId {
        let (folder, name) = lane_names(label);
        let id = RecordId(self.next("record"));
        let mut properties = Properties::new();
        properties.insert("run_id".to_string(), RUN_ID.to_string());
        properties.insert("lanes".to_string(), label.to_string());
        self.sentinels.borrow_mut().push(FakeSentinel {
            id: id.clone(),
            folder,
            name,
            state,
            properties,
            details: None,
        });
        id
    }

    pub fn sentinel(&self, label: LaneLabel) -> Option<FakeSentinel> {
        let (folder, name) = lane_names(label);
        self.sentinels
            .borrow()
            .iter()
            .find(|s| s.folder == folder && s.name == name)
            .cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.borrow().iter().map(|f| f.name.clone()).collect()
    }

    fn with_sentinel<T>(
        &self,
        record: &RecordId,
        f: impl FnOnce(&mut FakeSentinel) -> T,
    ) -> Result<T, PlatformError> {
        let mut sentinels = self.sentinels.borrow_mut();
        let sentinel = sentinels
            .iter_mut()
            .find(|s| &s.id == record)
            .ok_or_else(|| api_error("ResourceNotFound", record.to_string()))?;
        Ok(f(sentinel))
    }
}

pub fn api_error(kind: &str, message: impl Into<String>) -> PlatformError {
    PlatformError::Api {
        status: 400,
        kind: kind.to_string(),
        message: message.into(),
    }
}

impl StoragePlatform for FakePlatform {
    fn describe_project(&self, project: &str) -> Result<(), PlatformError> {
        match &self.project_error {
            Some(kind) => Err(api_error(kind, project)),
            None => Ok(()),
        }
    }

    fn executable_title(&self, executable_id: &str) -> Result<String, PlatformError> {
        if executable_id.starts_with("applet-") || executable_id.starts_with("workflow-") {
            Ok("demux".to_string())
        } else {
            Err(api_error("ResourceNotFound", executable_id))
        }
    }

    fn find_sentinel(
        &self,
        _project: &str,
        folder: &str,
        name: &str,
    ) -> Result<Option<SentinelHandle>, PlatformError> {
        self.find_calls.set(self.find_calls.get() + 1);
        if self.find_failures.get() > 0 {
            self.find_failures.set(self.find_failures.get() - 1);
            return Err(PlatformError::Transport {
                route: "system/findDataObjects".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(self
            .sentinels
            .borrow()
            .iter()
            .find(|s| s.folder == folder && s.name == name)
            .map(|s| SentinelHandle {
                id: s.id.clone(),
                state: s.state,
                properties: s.properties.clone(),
            }))
    }

    fn create_sentinel(
        &self,
        _project: &str,
        folder: &str,
        name: &str,
        properties: &Properties,
    ) -> Result<SentinelHandle, PlatformError> {
        let id = RecordId(self.next("record"));
        self.sentinels.borrow_mut().push(FakeSentinel {
            id: id.clone(),
            folder: folder.to_string(),
            name: name.to_string(),
            state: SentinelState::Open,
            properties: properties.clone(),
            details: None,
        });
        Ok(SentinelHandle {
            id,
            state: SentinelState::Open,
            properties: properties.clone(),
        })
    }

    fn find_file(
        &self,
        _project: &str,
        folder: &str,
        name: &str,
    ) -> Result<Option<FileId>, PlatformError> {
        Ok(self
            .files
            .borrow()
            .iter()
            .find(|f| f.folder == folder && f.name == name)
            .map(|f| f.id.clone()))
    }

    fn upload_file(
        &self,
        _project: &str,
        folder: &str,
        local: &Path,
        properties: &Properties,
    ) -> Result<FileId, PlatformError> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = FileId(self.next("file"));
        self.files.borrow_mut().push(FakeFile {
            id: id.clone(),
            folder: folder.to_string(),
            name,
            properties: properties.clone(),
        });
        Ok(id)
    }

    fn set_file_properties(
        &self,
        _project: &str,
        file: &FileId,
        properties: &Properties,
    ) -> Result<(), PlatformError> {
        self.tagged
            .borrow_mut()
            .push((file.clone(), properties.clone()));
        Ok(())
    }

    fn set_sentinel_details(&self, record: &RecordId, details: &Value) -> Result<(), PlatformError> {
        self.with_sentinel(record, |s| s.details = Some(details.clone()))
    }

    fn close_sentinel(&self, record: &RecordId) -> Result<(), PlatformError> {
        self.with_sentinel(record, |s| s.state = SentinelState::Closed)
    }

    fn create_folder(&self, _project: &str, folder: &str) -> Result<(), PlatformError> {
        let mut folders = self.folders.borrow_mut();
        if !folders.iter().any(|f| f == folder) {
            folders.push(folder.to_string());
        }
        Ok(())
    }

    fn run_chained_job(&self, request: &JobRequest) -> Result<String, PlatformError> {
        self.jobs.borrow_mut().push(request.clone());
        Ok(self.next("job"))
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Returns one archive id per call. Optionally fails a number of calls first,
/// spends simulated time, and writes the termination marker on a given call.
pub struct FakeSynchronizer {
    pub calls: RefCell<Vec<(LaneLabel, bool)>>,
    pub failures: Cell<u32>,
    pub clock: Rc<ManualClock>,
    pub work: Duration,
    /// `(call number, marker path)`: write the marker during that call.
    pub complete_on: Option<(usize, PathBuf)>,
}

impl FakeSynchronizer {
    pub fn new(clock: Rc<ManualClock>) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failures: Cell::new(0),
            clock,
            work: Duration::ZERO,
            complete_on: None,
        }
    }

    pub fn finish_calls(&self) -> usize {
        self.calls.borrow().iter().filter(|(_, finish)| *finish).count()
    }
}

impl Synchronizer for FakeSynchronizer {
    fn sync(&self, lane: &Lane, finish: bool) -> Result<Vec<FileId>, SyncError> {
        self.clock.advance(self.work);
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(SyncError::Failed {
                program: PathBuf::from("dx_sync_directory"),
                status: "exit status: 1".to_string(),
            });
        }
        let n = {
            let mut calls = self.calls.borrow_mut();
            calls.push((lane.label, finish));
            calls.len()
        };
        if let Some((on, marker)) = &self.complete_on {
            if *on == n {
                std::fs::write(marker, "").unwrap();
            }
        }
        Ok(vec![FileId(format!("file-tar-{}-{n}", lane.label))])
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: RefCell<Vec<(Channel, String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self, channel: Channel) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .filter(|(c, _, _)| *c == channel)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, channel: Channel, run: &str, message: &str) -> Result<(), PlatformError> {
        self.sent
            .borrow_mut()
            .push((channel, run.to_string(), message.to_string()));
        Ok(())
    }
}

mod common;

use std::rc::Rc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;

use common::{FakePlatform, FakeSynchronizer, RecordingNotifier, RunFixture, RUN_ID};
use runstream_core::{
    DownstreamTarget, LaneLabel, LaneLayout, ManualClock, RecordId, SentinelState,
};
use runstream_orchestrator::{FatalError, Orchestrator, Outcome, UploadConfig};
use runstream_platform::Channel;

struct Harness {
    clock: Rc<ManualClock>,
    platform: FakePlatform,
    sync: FakeSynchronizer,
    notifier: RecordingNotifier,
}

impl Harness {
    fn new() -> Self {
        let clock = Rc::new(ManualClock::new());
        Self {
            sync: FakeSynchronizer::new(clock.clone()),
            clock,
            platform: FakePlatform::new(),
            notifier: RecordingNotifier::default(),
        }
    }

    fn run(&self, config: &UploadConfig) -> Result<Outcome, FatalError> {
        Orchestrator {
            config,
            platform: &self.platform,
            synchronizer: &self.sync,
            notifier: &self.notifier,
            clock: &*self.clock,
        }
        .run()
    }
}

fn streamed(outcome: Outcome) -> runstream_orchestrator::RunReport {
    match outcome {
        Outcome::Streamed(report) => report,
        Outcome::AlreadyUploaded(_) => panic!("expected the run to stream"),
    }
}

// ---------------------------------------------------------------------------
// Sentinel lifecycle
// ---------------------------------------------------------------------------

#[test]
fn closed_sentinel_skips_the_lane_entirely() {
    let run = RunFixture::new();
    let h = Harness::new();
    h.platform.seed_sentinel(LaneLabel::All, SentinelState::Closed);

    let outcome = h.run(&run.config(LaneLayout::Whole)).unwrap();

    assert!(matches!(outcome, Outcome::AlreadyUploaded(_)));
    assert!(h.sync.calls.borrow().is_empty());
    assert!(h.platform.files.borrow().is_empty());
    assert_eq!(h.platform.sentinels.borrow().len(), 1);
}

#[test]
fn two_lanes_with_one_closed_streams_only_the_other() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    run.cycles("L002", 302);
    let h = Harness::new();
    let closed = h.platform.seed_sentinel(LaneLabel::Numbered(1), SentinelState::Closed);

    let report = streamed(h.run(&run.config(LaneLayout::Split(2))).unwrap());

    assert_eq!(*h.sync.calls.borrow(), vec![(LaneLabel::Numbered(2), true)]);
    let lane2 = h.platform.sentinel(LaneLabel::Numbered(2)).unwrap();
    assert_eq!(lane2.state, SentinelState::Closed);
    assert_eq!(h.platform.sentinel(LaneLabel::Numbered(1)).unwrap().id, closed);
    assert!(h.platform.sentinel(LaneLabel::Numbered(1)).unwrap().details.is_none());

    assert!(report.lanes[0].uploaded && !report.lanes[0].closed_this_run);
    assert!(report.lanes[1].closed_this_run);
    let log = h.notifier.messages(Channel::Log);
    assert!(log.iter().any(|m| m.contains("run successfully uploaded") && m.contains(RUN_ID)));
}

#[test]
fn open_sentinel_is_adopted_not_duplicated() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();
    let open = h.platform.seed_sentinel(LaneLabel::All, SentinelState::Open);

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    let sentinels = h.platform.sentinels.borrow();
    assert_eq!(sentinels.len(), 1);
    assert_eq!(sentinels[0].id, open);
    assert_eq!(sentinels[0].state, SentinelState::Closed);
}

#[test]
fn new_sentinel_carries_run_and_lane_properties() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();

    streamed(h.run(&run.config(LaneLayout::Split(2))).unwrap());

    let lane = h.platform.sentinel(LaneLabel::Numbered(2)).unwrap();
    assert_eq!(lane.folder, format!("/{RUN_ID}/runs/2"));
    assert_eq!(lane.properties["run_id"], RUN_ID);
    assert_eq!(lane.properties["lanes"], "2");
}

#[test]
fn metadata_files_are_uploaded_once_per_lane_folder() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();
    let config = run.config(LaneLayout::Whole);

    h.platform.seed_sentinel(LaneLabel::All, SentinelState::Open);
    streamed(h.run(&config).unwrap());
    let names = h.platform.file_names();
    assert_eq!(names.iter().filter(|n| *n == "RunInfo.xml").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == "SampleSheet.csv").count(), 1);
    assert!(h
        .platform
        .files
        .borrow()
        .iter()
        .all(|f| f.properties.get("run_id").map(String::as_str) == Some(RUN_ID)));
}

#[test]
fn details_list_every_artifact() {
    let run = RunFixture::new();
    let h = Harness::new();
    std::fs::write(
        run.logs.path().join(format!("run.{RUN_ID}.lane.all.log")),
        "sync log\n",
    )
    .unwrap();
    let mut sync = FakeSynchronizer::new(h.clock.clone());
    sync.complete_on = Some((2, run.path().join("RTAComplete.txt")));
    let h = Harness { sync, ..h };

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    let sentinel = h.platform.sentinel(LaneLabel::All).unwrap();
    let details = sentinel.details.unwrap();
    assert_eq!(details["run_id"], RUN_ID);
    assert_eq!(details["lanes"], "all");
    assert_eq!(details["upload_thumbnails"], "false");
    assert_eq!(details["dnanexus_path"], format!("project-1:/{RUN_ID}/runs"));
    assert_eq!(
        details["tar_file_ids"],
        json!(["file-tar-all-1", "file-tar-all-2", "file-tar-all-3"])
    );
    for key in ["log_file_id", "runinfo_file_id", "samplesheet_file_id"] {
        assert!(details.get(key).is_some(), "missing {key}");
    }
    assert_eq!(h.platform.tagged.borrow().len(), 3);
}

#[test]
fn missing_log_file_is_omitted_from_details() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    let details = h.platform.sentinel(LaneLabel::All).unwrap().details.unwrap();
    assert!(details.get("log_file_id").is_none());
    assert!(details.get("runinfo_file_id").is_some());
}

#[test]
fn transient_lookup_failures_are_retried() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();
    h.platform.find_failures.set(2);

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());
    assert_eq!(h.platform.find_calls.get(), 3);
}

#[test]
fn exhausted_lookup_is_fatal() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();
    h.platform.find_failures.set(3);

    let err = h.run(&run.config(LaneLayout::Whole)).unwrap_err();
    assert!(err.message.contains("Encountered an error looking for"));
    assert_eq!(err.run_label, RUN_ID);
    assert!(h.sync.calls.borrow().is_empty());
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

#[test]
fn syncs_until_marker_then_finishes_once() {
    let run = RunFixture::new();
    let h = Harness::new();
    let mut sync = FakeSynchronizer::new(h.clock.clone());
    sync.complete_on = Some((2, run.path().join("RTAComplete.txt")));
    let h = Harness { sync, ..h };

    let report = streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    assert_eq!(
        *h.sync.calls.borrow(),
        vec![
            (LaneLabel::All, false),
            (LaneLabel::All, false),
            (LaneLabel::All, true)
        ]
    );
    assert_eq!(report.watch.unwrap().iterations, 2);
}

#[rstest]
#[case(Duration::from_secs(25), 2, Duration::from_secs(70))]
#[case(Duration::from_secs(90), 0, Duration::ZERO)]
fn pacing_sleeps_only_the_remainder(
    #[case] work: Duration,
    #[case] sleeps: u32,
    #[case] slept: Duration,
) {
    let run = RunFixture::new();
    let h = Harness::new();
    let mut sync = FakeSynchronizer::new(h.clock.clone());
    sync.work = work;
    sync.complete_on = Some((2, run.path().join("RTAComplete.txt")));
    let h = Harness { sync, ..h };

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    assert_eq!(h.clock.sleep_count(), sleeps);
    assert_eq!(h.clock.total_slept(), slept);
}

/// Iterations start at 0, 60, 120, … seconds; the run fails at the first
/// iteration whose start is strictly past the budget.
#[rstest]
#[case(100, 2)]
#[case(119, 2)]
#[case(120, 3)]
fn timeout_is_fatal_once_budget_is_exceeded(#[case] budget_secs: u64, #[case] syncs: usize) {
    let run = RunFixture::new();
    let h = Harness::new();
    let mut config = run.config(LaneLayout::Whole);
    config.run_duration = Duration::from_secs(budget_secs);
    config.intervals_to_wait = 1;

    let err = h.run(&config).unwrap_err();

    assert!(err.message.contains("did not complete"));
    assert_eq!(h.sync.calls.borrow().len(), syncs);
    assert_eq!(h.sync.finish_calls(), 0);
    assert_eq!(
        h.platform.sentinel(LaneLabel::All).unwrap().state,
        SentinelState::Open
    );
    assert!(h
        .notifier
        .messages(Channel::Alert)
        .iter()
        .any(|m| m.contains("did not complete")));
}

#[test]
fn default_budget_is_three_days() {
    let run = RunFixture::new();
    assert_eq!(
        run.config(LaneLayout::Whole).wait_budget(),
        Duration::from_secs(259_200)
    );
}

// ---------------------------------------------------------------------------
// Sync retries
// ---------------------------------------------------------------------------

#[test]
fn sync_succeeds_after_retries() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();
    h.sync.failures.set(2);

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    assert_eq!(h.sync.finish_calls(), 1);
    assert_eq!(h.clock.total_slept(), Duration::from_secs(20));
    assert_eq!(
        h.platform.sentinel(LaneLabel::All).unwrap().state,
        SentinelState::Closed
    );
}

#[test]
fn sync_exhaustion_is_fatal_and_alerted() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();
    h.sync.failures.set(3);

    let err = h.run(&run.config(LaneLayout::Whole)).unwrap_err();

    assert!(err.message.contains("Failed to sync lane all"));
    assert_eq!(err.run_label, RUN_ID);
    let alerts = h.notifier.messages(Channel::Alert);
    assert!(alerts.iter().any(|m| m.contains("Failed to sync lane all")));
    assert_eq!(
        h.platform.sentinel(LaneLabel::All).unwrap().state,
        SentinelState::Open
    );
}

// ---------------------------------------------------------------------------
// Downstream dispatch
// ---------------------------------------------------------------------------

fn with_applet(config: &mut UploadConfig) {
    config.downstream = DownstreamTarget::Applet("applet-demux".to_string());
}

#[test]
fn reserved_input_key_is_always_overwritten() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    let h = Harness::new();
    let mut config = run.config(LaneLayout::Whole);
    with_applet(&mut config);
    config.downstream_input = serde_json::from_value(json!({
        "upload_sentinel_record": "record-somebody-else",
        "mode": "fast"
    }))
    .unwrap();

    let report = streamed(h.run(&config).unwrap());

    let record = h.platform.sentinel(LaneLabel::All).unwrap().id;
    let jobs = h.platform.jobs.borrow();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].input["upload_sentinel_record"],
        json!({ "$dnanexus_link": record.0 })
    );
    assert_eq!(jobs[0].input["mode"], "fast");
    assert_eq!(jobs[0].name, format!("demux-{RUN_ID}"));
    assert_eq!(jobs[0].folder, format!("/{RUN_ID}/reads"));
    assert_eq!(*h.platform.folders.borrow(), vec![format!("/{RUN_ID}/reads")]);
    assert_eq!(report.jobs.len(), 1);
}

#[test]
fn workflow_jobs_go_to_per_lane_analysis_folders() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    run.cycles("L002", 302);
    let h = Harness::new();
    let mut config = run.config(LaneLayout::Split(2));
    config.downstream = DownstreamTarget::Workflow("workflow-demux".to_string());

    streamed(h.run(&config).unwrap());

    let jobs = h.platform.jobs.borrow();
    let folders: Vec<String> = jobs.iter().map(|j| j.folder.clone()).collect();
    assert_eq!(
        folders,
        vec![
            format!("/{RUN_ID}/analyses/1"),
            format!("/{RUN_ID}/analyses/2")
        ]
    );
    assert!(jobs
        .iter()
        .all(|j| j.input.contains_key("0.upload_sentinel_record")));
}

#[test]
fn lanes_closed_before_startup_are_dispatched_too() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    run.cycles("L002", 302);
    let h = Harness::new();
    let closed = h.platform.seed_sentinel(LaneLabel::Numbered(1), SentinelState::Closed);
    let mut config = run.config(LaneLayout::Split(2));
    with_applet(&mut config);

    let report = streamed(h.run(&config).unwrap());

    let jobs = h.platform.jobs.borrow();
    let folders: Vec<String> = jobs.iter().map(|j| j.folder.clone()).collect();
    assert_eq!(
        folders,
        vec![format!("/{RUN_ID}/reads/1"), format!("/{RUN_ID}/reads/2")]
    );
    assert_eq!(
        jobs[0].input["upload_sentinel_record"],
        json!({ "$dnanexus_link": closed.0 })
    );
    assert_eq!(report.jobs.len(), 2);
    assert_eq!(*h.sync.calls.borrow(), vec![(LaneLabel::Numbered(2), true)]);
}

#[test]
fn samplesheet_conflict_halts_lanes_closed_before_startup() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    run.cycles("L002", 302);
    run.write("SampleSheet_v2.csv", "[Header]\nExperiment,43\n");
    let h = Harness::new();
    h.platform.seed_sentinel(LaneLabel::Numbered(1), SentinelState::Closed);
    let mut config = run.config(LaneLayout::Split(2));
    with_applet(&mut config);

    let report = streamed(h.run(&config).unwrap());

    assert!(h.platform.jobs.borrow().is_empty());
    assert!(report.lanes.iter().all(|l| l.halt_downstream));
    assert_eq!(
        report.downstream_skipped.as_deref(),
        Some("conflicting samplesheets")
    );
}

#[test]
fn incomplete_cycles_skip_dispatch_but_succeed() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    run.cycles("L002", 290);
    let h = Harness::new();
    let mut config = run.config(LaneLayout::Whole);
    with_applet(&mut config);

    let report = streamed(h.run(&config).unwrap());

    assert!(h.platform.jobs.borrow().is_empty());
    assert!(report.jobs.is_empty());
    assert!(report.downstream_skipped.is_some());
    assert!(!report.cycles.unwrap().is_complete());
    let alerts = h.notifier.messages(Channel::Alert);
    assert!(alerts
        .iter()
        .any(|m| m.contains("Incomplete cycles") && m.contains("L002\t:\t290")));
    assert_eq!(
        h.platform.sentinel(LaneLabel::All).unwrap().state,
        SentinelState::Closed
    );
}

#[test]
fn conflicting_samplesheets_halt_dispatch_only() {
    let run = RunFixture::new();
    run.mark_complete();
    run.cycles("L001", 302);
    run.write("SampleSheet_v2.csv", "[Header]\nExperiment,43\n");
    let h = Harness::new();
    let mut config = run.config(LaneLayout::Whole);
    with_applet(&mut config);

    let report = streamed(h.run(&config).unwrap());

    assert!(h.platform.jobs.borrow().is_empty());
    assert!(report.lanes[0].halt_downstream);
    assert!(!h.platform.file_names().iter().any(|n| n.ends_with(".csv")));
    assert_eq!(
        h.platform.sentinel(LaneLabel::All).unwrap().state,
        SentinelState::Closed
    );
    let alerts = h.notifier.messages(Channel::Alert);
    assert!(alerts.iter().any(|m| m.contains("differing contents")));
}

// ---------------------------------------------------------------------------
// Notifications and preflight
// ---------------------------------------------------------------------------

#[test]
fn start_notification_is_sent_once_per_run_directory() {
    let run = RunFixture::new();
    run.mark_complete();
    let config = run.config(LaneLayout::Whole);

    let first = Harness::new();
    streamed(first.run(&config).unwrap());

    let second = Harness::new();
    second.platform.seed_sentinel(LaneLabel::All, SentinelState::Closed);
    assert!(matches!(
        second.run(&config).unwrap(),
        Outcome::AlreadyUploaded(_)
    ));

    let starts = |h: &Harness| {
        h.notifier
            .messages(Channel::Log)
            .iter()
            .filter(|m| m.contains("starting upload"))
            .count()
    };
    assert_eq!(starts(&first), 1);
    assert_eq!(starts(&second), 0);
}

#[rstest]
#[case("InvalidAuthentication", "Invalid authentication token")]
#[case("PermissionDenied", "is not accessible")]
fn bad_credentials_fail_before_upload(#[case] kind: &str, #[case] expected: &str) {
    let run = RunFixture::new();
    let mut h = Harness::new();
    h.platform.project_error = Some(kind.to_string());

    let err = h.run(&run.config(LaneLayout::Whole)).unwrap_err();

    assert!(err.message.contains(expected));
    assert!(h.platform.sentinels.borrow().is_empty());
    assert_eq!(h.notifier.messages(Channel::Alert).len(), 1);
}

#[test]
fn unknown_applet_is_fatal() {
    let run = RunFixture::new();
    let h = Harness::new();
    let mut config = run.config(LaneLayout::Whole);
    config.downstream = DownstreamTarget::Applet("nonsense".to_string());

    let err = h.run(&config).unwrap_err();
    assert!(err.message.contains("Unable to resolve applet nonsense"));
}

#[test]
fn missing_run_info_is_fatal_with_sequencer_label() {
    let run = RunFixture::new();
    std::fs::remove_file(run.path().join("RunInfo.xml")).unwrap();
    let h = Harness::new();

    let err = h.run(&run.config(LaneLayout::Whole)).unwrap_err();
    assert!(err.message.contains("RunInfo.xml"));
    assert_eq!(err.run_label, "A01295");
}

#[test]
fn success_message_reports_time_and_size() {
    let run = RunFixture::new();
    let h = Harness::new();
    let mut sync = FakeSynchronizer::new(h.clock.clone());
    sync.work = Duration::from_secs(30);
    sync.complete_on = Some((1, run.path().join("RTAComplete.txt")));
    let h = Harness { sync, ..h };

    streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());

    let log = h.notifier.messages(Channel::Log);
    let success = log
        .iter()
        .find(|m| m.contains("successfully uploaded"))
        .unwrap();
    assert!(success.contains("Total upload time: 0h2m"), "{success}");
    assert!(success.contains("Total size of run: 0.00GB"));
}

#[test]
fn record_ids_in_report_match_platform() {
    let run = RunFixture::new();
    run.mark_complete();
    let h = Harness::new();

    let report = streamed(h.run(&run.config(LaneLayout::Whole)).unwrap());
    let summaries = report.lane_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].state, "closed");
    assert_eq!(
        summaries[0].sentinel.as_deref().map(RecordId::from),
        Some(h.platform.sentinel(LaneLabel::All).unwrap().id)
    );
}

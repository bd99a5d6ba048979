// Stream-copy merges of compatible inputs, and the fallback when they fail

use crate::common::fixtures::FakeClip;
use crate::common::stub_tools::{StubOptions, StubTools, manifest_entries};
use crate::common::{progress_values, recording_sink, status_messages};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use vidstitch::engine::concat::try_fast_merge;
use vidstitch::engine::probe::probe_metadata;
use vidstitch::engine::{
    CancelToken, EncoderAvailability, MediaRecord, MergeEvent, MergeOutcome, MergeService,
    MergeStrategy, ProgressSink,
};

fn service(stub: &StubTools) -> (MergeService, Arc<Mutex<Vec<MergeEvent>>>) {
    let (sink, events) = recording_sink();
    let service = MergeService::new(stub.tools.clone(), EncoderAvailability::default(), sink);
    (service, events)
}

#[test]
fn compatible_inputs_are_stream_copied_in_order() {
    let stub = StubTools::new(StubOptions::default());
    let clip = FakeClip::default();
    let b = stub.add_video("b.mp4", &clip);
    let a = stub.add_video("a.mp4", &clip);
    let c = stub.add_video("c.mp4", &clip);
    let output = stub.videos_dir().join("merged.mp4");

    let records = [&b, &a, &c]
        .iter()
        .map(|p| probe_metadata(&stub.tools, p).unwrap())
        .collect::<Vec<_>>();

    let (service, events) = service(&stub);
    let outcome = service.merge_records(records, &output).unwrap();

    let summary = outcome.summary().expect("merge completed");
    assert_eq!(summary.strategy, MergeStrategy::FastCopy);
    assert_eq!(summary.inputs, 3);
    assert_eq!(summary.total_duration_s, 15.0);
    assert_eq!(summary.encoder, None);
    assert!(output.exists());

    // User order, not alphabetical
    let manifest = stub.fast_manifest().expect("fast concat ran");
    let expected: Vec<String> = [&b, &a, &c].iter().map(|p| p.display().to_string()).collect();
    assert_eq!(manifest_entries(&manifest), expected);

    // One strict stream copy, nothing re-encoded
    let calls = stub.ffmpeg_calls();
    assert_eq!(calls.len(), 1, "calls: {:?}", calls);
    assert!(calls[0].contains("-c copy"));
    assert!(calls[0].contains("-xerror"));
    assert!(!calls[0].contains("-vf"));
    assert!(stub.normalize_calls().is_empty());

    assert_eq!(progress_values(&events), vec![100.0]);
    assert!(!service.is_merging());
}

#[test]
fn fast_merge_failure_surfaces_diagnostic_to_direct_callers() {
    let stub = StubTools::new(StubOptions {
        fast_concat_fails: true,
        ..StubOptions::default()
    });
    let a = stub.add_video("a.mp4", &FakeClip::default());
    let b = stub.add_video("b.mp4", &FakeClip::default());
    let output = stub.videos_dir().join("out.mp4");

    let err = try_fast_merge(&stub.tools, &CancelToken::new(), &[a, b], &output).unwrap_err();
    assert!(
        err.diagnostic().contains("Codec mismatch"),
        "diagnostic: {}",
        err.diagnostic()
    );
    assert!(err.to_string().contains("Codec mismatch"));
}

#[test]
fn fast_merge_failure_falls_back_to_normalization() {
    let stub = StubTools::new(StubOptions {
        fast_concat_fails: true,
        ..StubOptions::default()
    });
    let clip = FakeClip::default().lasting(5.0);
    let a = stub.add_video("a.mp4", &clip);
    let b = stub.add_video("b.mp4", &clip);
    let output = stub.videos_dir().join("out.mp4");

    let records = vec![
        probe_metadata(&stub.tools, &a).unwrap(),
        probe_metadata(&stub.tools, &b).unwrap(),
    ];
    assert!(vidstitch::engine::is_fast_mergeable(&records));

    let (service, events) = service(&stub);
    let outcome = service.merge_records(records, &output).unwrap();

    match outcome {
        MergeOutcome::Completed(summary) => {
            assert_eq!(summary.strategy, MergeStrategy::Normalized);
            assert_eq!(summary.encoder.as_deref(), Some("libx264"));
        }
        MergeOutcome::Cancelled => panic!("not cancelled"),
    }

    assert_eq!(stub.fast_concat_calls().len(), 1);
    assert_eq!(stub.normalize_calls().len(), 2);
    assert_eq!(stub.final_concat_calls().len(), 1);
    assert!(output.exists());

    let messages = status_messages(&events);
    assert!(messages.iter().any(|m| m == "Starting re-encoding process..."));
    assert_eq!(progress_values(&events).last(), Some(&100.0));
}

#[test]
fn fast_merge_keeps_apostrophes_in_paths() {
    let stub = StubTools::new(StubOptions::default());
    let a = stub.add_video("it's.mp4", &FakeClip::default());
    let b = stub.add_video("b.mp4", &FakeClip::default());
    let output = stub.videos_dir().join("out.mp4");

    try_fast_merge(&stub.tools, &CancelToken::new(), &[a.clone(), b], &output).unwrap();

    let manifest = stub.fast_manifest().unwrap();
    let first = manifest.lines().next().unwrap();
    let escaped = a.display().to_string().replace('\'', "'\\''");
    assert_eq!(first, format!("file '{}'", escaped));
}

fn identical_pair(stub: &StubTools) -> Vec<MediaRecord> {
    let clip = FakeClip::default();
    let a = stub.add_video("a.mp4", &clip);
    let b = stub.add_video("b.mp4", &clip);
    vec![
        probe_metadata(&stub.tools, &a).unwrap(),
        probe_metadata(&stub.tools, &b).unwrap(),
    ]
}

#[test]
fn cancel_during_fast_attempt_ends_the_merge() {
    let stub = StubTools::new(StubOptions {
        hang_fast_concat: true,
        ..StubOptions::default()
    });
    let records = identical_pair(&stub);
    let output = stub.videos_dir().join("out.mp4");

    let (service, events) = service(&stub);
    let service = Arc::new(service);
    let worker = {
        let service = Arc::clone(&service);
        let output = output.clone();
        thread::spawn(move || service.merge_records(records, output))
    };

    stub.wait_for_fast_concat(&output);
    assert!(service.cancel_current_merge());

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, MergeOutcome::Cancelled);

    // No fallback after a user cancel, and no partial output
    assert!(stub.normalize_calls().is_empty());
    assert!(stub.final_concat_calls().is_empty());
    assert!(!output.exists());

    let messages = status_messages(&events);
    assert!(!messages.iter().any(|m| m == "Starting re-encoding process..."));
    assert_eq!(events.lock().unwrap().last(), Some(&MergeEvent::Cancelled));
    assert!(!service.is_merging());
}

#[test]
fn partial_output_is_removed_before_fallback_starts() {
    let stub = StubTools::new(StubOptions {
        fast_concat_fails: true,
        ..StubOptions::default()
    });
    let records = identical_pair(&stub);
    let output = stub.videos_dir().join("out.mp4");

    // Whether the output existed when the re-encoding status went out
    let seen: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let sink: Arc<dyn ProgressSink> = {
        let seen = Arc::clone(&seen);
        let output = output.clone();
        Arc::new(move |event: MergeEvent| {
            if let MergeEvent::Status { message } = &event {
                if message == "Starting re-encoding process..." {
                    *seen.lock().unwrap() = Some(output.exists());
                }
            }
        })
    };
    let service = MergeService::new(stub.tools.clone(), EncoderAvailability::default(), sink);

    let outcome = service.merge_records(records, &output).unwrap();
    assert_eq!(outcome.summary().unwrap().strategy, MergeStrategy::Normalized);

    assert_eq!(*seen.lock().unwrap(), Some(false), "failed copy left its output behind");
    assert!(output.exists());
}

#[test]
fn cancel_after_fast_merge_finished_keeps_the_result() {
    let stub = StubTools::new(StubOptions::default());
    let records = identical_pair(&stub);
    let output = stub.videos_dir().join("out.mp4");

    // Cancel from inside the sink on the final 100% update, after the copy succeeded
    let handle: Arc<OnceLock<Weak<MergeService>>> = Arc::new(OnceLock::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let cancelled_late = Arc::new(Mutex::new(false));
    let sink: Arc<dyn ProgressSink> = {
        let handle = Arc::clone(&handle);
        let events = Arc::clone(&events);
        let cancelled_late = Arc::clone(&cancelled_late);
        Arc::new(move |event: MergeEvent| {
            let done = matches!(&event, MergeEvent::Progress { percentage, .. } if *percentage == 100.0);
            events.lock().unwrap().push(event);
            if done {
                if let Some(service) = handle.get().and_then(Weak::upgrade) {
                    *cancelled_late.lock().unwrap() = service.cancel_current_merge();
                }
            }
        })
    };
    let service = Arc::new(MergeService::new(
        stub.tools.clone(),
        EncoderAvailability::default(),
        sink,
    ));
    handle.set(Arc::downgrade(&service)).unwrap();

    let outcome = service.merge_records(records, &output).unwrap();

    assert!(*cancelled_late.lock().unwrap(), "merge was still active");
    assert_eq!(outcome.summary().unwrap().strategy, MergeStrategy::FastCopy);
    assert!(output.exists());
    assert!(!events.lock().unwrap().contains(&MergeEvent::Cancelled));
}

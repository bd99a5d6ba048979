// Re-encoding path: mismatched inputs, audio handling, failures and cancellation

use crate::common::fixtures::FakeClip;
use crate::common::stub_tools::{StubOptions, StubTools, manifest_entries, output_of};
use vidstitch::config::Config;
use crate::common::{progress_values, recording_sink, status_messages};
use std::sync::Arc;
use std::thread;
use vidstitch::engine::probe::probe_metadata;
use vidstitch::engine::{
    EncoderAvailability, MediaRecord, MergeError, MergeEvent, MergeOutcome, MergeService,
    MergeStrategy,
};

fn probe_each(stub: &StubTools, paths: &[&std::path::PathBuf]) -> Vec<MediaRecord> {
    paths
        .iter()
        .map(|p| probe_metadata(&stub.tools, p).unwrap())
        .collect()
}

#[test]
fn resolution_mismatch_normalizes_to_widest_input() {
    let stub = StubTools::new(StubOptions::default());
    let small = stub.add_video("small.mp4", &FakeClip::sized(640, 360).lasting(4.0));
    let wide = stub.add_video("wide.mp4", &FakeClip::sized(1280, 720).lasting(6.0));
    let output = stub.videos_dir().join("out.mp4");

    let records = probe_each(&stub, &[&small, &wide]);
    assert!(!vidstitch::engine::is_fast_mergeable(&records));

    let (sink, events) = recording_sink();
    let service = MergeService::new(stub.tools.clone(), EncoderAvailability::default(), sink);
    let outcome = service.merge_records(records, &output).unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.strategy, MergeStrategy::Normalized);
    assert_eq!(summary.total_duration_s, 10.0);
    assert!(output.exists());

    // No stream copy attempt for inputs known to differ
    assert!(stub.fast_concat_calls().is_empty());

    let normalize = stub.normalize_calls();
    assert_eq!(normalize.len(), 2);
    for call in &normalize {
        assert!(call.contains("scale=1280:720:force_original_aspect_ratio=decrease"));
        assert!(call.contains("pad=1280:720:(ow-iw)/2:(oh-ih)/2,fps=30"));
        assert!(call.contains("-c:v libx264"));
        assert!(call.contains("-map_metadata -1"));
    }

    // Final manifest lists intermediates in input order
    let manifest = stub.final_manifest().expect("final concat ran");
    let entries = manifest_entries(&manifest);
    assert_eq!(entries.len(), 2);
    assert!(entries[0].ends_with("normalized-000.mp4"));
    assert!(entries[1].ends_with("normalized-001.mp4"));

    // Stub reports 5s of 10s, then end
    assert_eq!(progress_values(&events), vec![50.0, 100.0]);

    let messages = status_messages(&events);
    assert!(messages.iter().any(|m| m == "Normalized 2 of 2 videos"));
    assert!(messages.iter().any(|m| m == "Merging normalized videos..."));

    // Intermediates went away with the work directory
    for call in &normalize {
        assert!(!output_of(call).exists());
    }
}

#[test]
fn mixed_audio_gets_silent_track() {
    let stub = StubTools::new(StubOptions::default());
    let loud = stub.add_video("loud.mp4", &FakeClip::default());
    let quiet = stub.add_video("quiet.mp4", &FakeClip::default().silent());
    let output = stub.videos_dir().join("out.mp4");

    let records = probe_each(&stub, &[&loud, &quiet]);
    let (sink, _events) = recording_sink();
    let service = MergeService::new(stub.tools.clone(), EncoderAvailability::default(), sink);
    service.merge_records(records, &output).unwrap();

    let normalize = stub.normalize_calls();
    let loud_call = normalize.iter().find(|c| c.contains("loud.mp4")).unwrap();
    let quiet_call = normalize.iter().find(|c| c.contains("quiet.mp4")).unwrap();

    assert!(loud_call.contains("-map 0:a:0"));
    assert!(!loud_call.contains("anullsrc"));
    assert!(quiet_call.contains("-f lavfi -i anullsrc=channel_layout=stereo:sample_rate=48000"));
    assert!(quiet_call.contains("-map 1:a:0"));
    assert!(quiet_call.contains("-shortest"));
}

#[test]
fn silent_set_drops_audio() {
    let stub = StubTools::new(StubOptions::default());
    let a = stub.add_video("a.mp4", &FakeClip::sized(640, 480).silent());
    let b = stub.add_video("b.mp4", &FakeClip::sized(800, 600).silent());
    let output = stub.videos_dir().join("out.mp4");

    let records = probe_each(&stub, &[&a, &b]);
    let (sink, _events) = recording_sink();
    let service = MergeService::new(stub.tools.clone(), EncoderAvailability::default(), sink);
    service.merge_records(records, &output).unwrap();

    for call in stub.normalize_calls() {
        assert!(call.contains(" -an "));
        assert!(!call.contains("anullsrc"));
    }
}

#[test]
fn normalization_failure_is_fatal_with_diagnostic() {
    let stub = StubTools::new(StubOptions {
        fail_normalize_of: Some("broken"),
        ..StubOptions::default()
    });
    let good = stub.add_video("good.mp4", &FakeClip::sized(1280, 720));
    let broken = stub.add_video("broken.mp4", &FakeClip::sized(640, 360));
    let output = stub.videos_dir().join("out.mp4");

    let records = probe_each(&stub, &[&good, &broken]);
    let (sink, _events) = recording_sink();
    let service = MergeService::new(stub.tools.clone(), EncoderAvailability::default(), sink);
    let err = service.merge_records(records, &output).unwrap_err();

    match &err {
        MergeError::Normalization {
            index,
            path,
            diagnostic,
        } => {
            assert_eq!(*index, 1);
            assert_eq!(path, &broken);
            assert!(diagnostic.contains("Invalid data found"), "{}", diagnostic);
        }
        other => panic!("expected normalization failure, got {other:?}"),
    }
    assert!(err.to_string().contains("Invalid data found"));

    assert!(stub.final_concat_calls().is_empty());
    assert!(!output.exists());
    assert!(!service.is_merging());
}

#[test]
fn cancel_during_normalization_is_a_distinct_outcome() {
    let stub = StubTools::new(StubOptions {
        hang_normalize: true,
        ..StubOptions::default()
    });
    let a = stub.add_video("a.mp4", &FakeClip::sized(1280, 720));
    let b = stub.add_video("b.mp4", &FakeClip::sized(640, 360));
    let output = stub.videos_dir().join("out.mp4");

    let records = probe_each(&stub, &[&a, &b]);
    let (sink, events) = recording_sink();
    let service = Arc::new(MergeService::new(
        stub.tools.clone(),
        EncoderAvailability::default(),
        sink,
    ));

    let worker = {
        let service = Arc::clone(&service);
        let output = output.clone();
        thread::spawn(move || service.merge_records(records, output))
    };

    stub.wait_for_normalize_calls(2);
    assert!(service.is_merging());
    assert!(service.cancel_current_merge());

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, MergeOutcome::Cancelled);

    assert_eq!(events.lock().unwrap().last(), Some(&MergeEvent::Cancelled));
    assert!(stub.final_concat_calls().is_empty());
    assert!(stub.final_manifest().is_none());
    assert!(!output.exists());
    for call in stub.normalize_calls() {
        assert!(!output_of(&call).exists());
    }

    // Nothing left to cancel
    assert!(!service.is_merging());
    assert!(!service.cancel_current_merge());
}

#[test]
fn webm_set_normalizes_to_webm_codecs() {
    let stub = StubTools::new(StubOptions {
        encoders: vec!["h264_qsv"],
        ..StubOptions::default()
    });
    let small = stub.add_video("small.webm", &FakeClip { codec: "vp9", ..FakeClip::sized(640, 360) });
    let wide = stub.add_video("wide.webm", &FakeClip { codec: "vp9", ..FakeClip::sized(1280, 720) });

    // Default name takes its extension from the first input
    let output = Config::default().default_output_path(&small);
    assert_eq!(output.extension().unwrap(), "webm");

    let records = probe_each(&stub, &[&small, &wide]);
    let (sink, _events) = recording_sink();
    let service = MergeService::detect(stub.tools.clone(), sink);
    // H.264 hardware encoders can't go into WebM
    service.set_hardware_preference(true).unwrap();
    let outcome = service.merge_records(records, &output).unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.strategy, MergeStrategy::Normalized);
    assert_eq!(summary.encoder.as_deref(), Some("libvpx-vp9"));
    assert!(output.exists());

    let normalize = stub.normalize_calls();
    assert_eq!(normalize.len(), 2);
    for call in &normalize {
        assert!(call.contains("-c:v libvpx-vp9"), "{}", call);
        assert!(call.contains("-c:a libopus"), "{}", call);
        assert!(!call.contains("h264_qsv"));
        assert!(!call.contains("-c:a aac"));
        assert_eq!(output_of(call).extension().unwrap(), "webm");
    }

    let manifest = stub.final_manifest().expect("final concat ran");
    let entries = manifest_entries(&manifest);
    assert!(entries[0].ends_with("normalized-000.webm"));
    assert!(entries[1].ends_with("normalized-001.webm"));
}

#[test]
fn cancel_during_final_concat_is_a_distinct_outcome() {
    let stub = StubTools::new(StubOptions {
        hang_final_concat: true,
        ..StubOptions::default()
    });
    let a = stub.add_video("a.mp4", &FakeClip::sized(1280, 720));
    let b = stub.add_video("b.mp4", &FakeClip::sized(640, 360));
    let output = stub.videos_dir().join("out.mp4");

    let records = probe_each(&stub, &[&a, &b]);
    let (sink, events) = recording_sink();
    let service = Arc::new(MergeService::new(
        stub.tools.clone(),
        EncoderAvailability::default(),
        sink,
    ));

    let worker = {
        let service = Arc::clone(&service);
        let output = output.clone();
        thread::spawn(move || service.merge_records(records, output))
    };

    // The stub has written part of the output and is still running
    stub.wait_for_final_concat(&output);
    assert!(service.is_merging());
    assert!(service.cancel_current_merge());

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, MergeOutcome::Cancelled);

    let recorded = events.lock().unwrap().clone();
    assert_eq!(recorded.last(), Some(&MergeEvent::Cancelled));
    assert_eq!(recorded.iter().filter(|e| **e == MergeEvent::Cancelled).count(), 1);
    assert!(!progress_values(&events).contains(&100.0));

    assert!(!output.exists(), "partial output left behind");
    for call in stub.normalize_calls() {
        assert!(!output_of(&call).exists());
    }
    assert!(!service.is_merging());
}

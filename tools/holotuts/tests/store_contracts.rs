use holotuts::display::step_label;
use holotuts::errors::HoloTutsError;
use holotuts::runtime::{FileSystem, ProductionFileSystem};
use holotuts::tutorial_store::{StepUpdate, StoreOptions, TutorialStore};
use holotuts::types::{Pose, StepIdPolicy};
use std::path::Path;
use std::sync::Arc;

fn open(dir: &Path, policy: StepIdPolicy) -> TutorialStore {
    let mut options = StoreOptions::new(dir.join("tutorials.json"));
    options.step_ids = policy;
    TutorialStore::load(options, Arc::new(ProductionFileSystem)).expect("load store")
}

fn pose(x: f32) -> Pose {
    Pose::new([x, 1.5, 2.0], [0.0, 0.0, 0.0, 1.0])
}

#[test]
fn two_tutorials_with_three_steps_survive_a_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let before = {
        let mut store = open(dir.path(), StepIdPolicy::Stable);
        for _ in 0..2 {
            store.create_tutorial().expect("tutorial");
            for n in 0..3 {
                let handle = store.create_step(pose(n as f32)).expect("step");
                store
                    .update_step(&handle, StepUpdate::SetVideoPath(format!("{}.mp4", handle.step_id)))
                    .expect("video");
                store
                    .update_step(&handle, StepUpdate::SetTranscript(format!("say {n}")))
                    .expect("transcript");
            }
        }
        store.document().clone()
    };

    let reloaded = open(dir.path(), StepIdPolicy::Stable);
    assert_eq!(reloaded.document(), &before);
    let numbers = reloaded.tutorials()[1]
        .steps
        .iter()
        .map(|s| s.number)
        .collect::<Vec<_>>();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn video_then_transcript_leaves_both_fields_and_bounded_label() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = open(dir.path(), StepIdPolicy::Stable);
    store.create_tutorial().expect("tutorial");
    store.create_step(pose(0.0)).expect("step");
    store
        .update_last_step(StepUpdate::SetVideoPath("x.mp4".to_string()))
        .expect("video");
    let step = store
        .update_last_step(StepUpdate::SetTranscript("hello world".to_string()))
        .expect("transcript");

    assert_eq!(step.video_file_path.as_deref(), Some("x.mp4"));
    assert_eq!(step.transcript.as_deref(), Some("hello world"));
    assert_eq!(step.name, "Step 1");
    assert_eq!(step_label(&step), "Step 1: hello world...");
}

#[test]
fn deleting_a_step_removes_its_video_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let video = dir.path().join("tutorial_1_step_1.mp4");
    std::fs::write(&video, "mp4").expect("video file");

    let mut store = open(dir.path(), StepIdPolicy::Stable);
    store.create_tutorial().expect("tutorial");
    let handle = store.create_step(pose(0.0)).expect("step");
    store
        .update_step(&handle, StepUpdate::SetVideoPath(video.display().to_string()))
        .expect("video");

    store.delete_step(&handle.step_id).expect("delete");
    assert!(!video.exists());
    let err = store
        .find_tutorial_for_step(&handle.step_id)
        .expect_err("gone");
    assert!(matches!(err, HoloTutsError::NotFound(_)));
}

#[test]
fn renumber_policy_keeps_ids_contiguous_and_renames_videos() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = open(dir.path(), StepIdPolicy::Renumber);
    store.create_tutorial().expect("tutorial");
    for n in 0..3 {
        let handle = store.create_step(pose(n as f32)).expect("step");
        let video = dir.path().join(format!("{}.mp4", handle.step_id));
        std::fs::write(&video, handle.step_id.as_bytes()).expect("video file");
        store
            .update_step(&handle, StepUpdate::SetVideoPath(video.display().to_string()))
            .expect("video");
    }

    store.delete_step("tutorial_1_step_1").expect("delete");

    let ids = store.tutorials()[0]
        .steps
        .iter()
        .map(|s| s.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["tutorial_1_step_1", "tutorial_1_step_2"]);
    let renamed = dir.path().join("tutorial_1_step_1.mp4");
    assert_eq!(
        std::fs::read_to_string(&renamed).expect("renamed video"),
        "tutorial_1_step_2"
    );
    assert!(!dir.path().join("tutorial_1_step_3.mp4").exists());

    let next = store.create_step(pose(9.0)).expect("next step");
    assert_eq!(next.step_id, "tutorial_1_step_3");
}

#[test]
fn stable_policy_never_reuses_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = open(dir.path(), StepIdPolicy::Stable);
    store.create_tutorial().expect("tutorial");
    store.create_step(pose(0.0)).expect("first");
    let second = store.create_step(pose(1.0)).expect("second");
    store.delete_step(&second.step_id).expect("delete");

    let third = store.create_step(pose(2.0)).expect("third");
    assert_eq!(third.step_id, "tutorial_1_step_3");

    store.delete_tutorial("tutorial_1").expect("delete tutorial");
    let tutorial = store.create_tutorial().expect("next tutorial");
    assert_eq!(tutorial.id, "tutorial_2");
}

#[test]
fn corrupt_document_is_fatal_and_left_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tutorials.json");
    std::fs::write(&path, "{ not json").expect("seed");

    let err = TutorialStore::load(StoreOptions::new(&path), Arc::new(ProductionFileSystem))
        .err()
        .expect("corrupt store refused");
    assert!(matches!(err, HoloTutsError::StoreCorrupt(_)));
    assert_eq!(
        ProductionFileSystem.read_to_string(&path).expect("read"),
        "{ not json"
    );
}

#[test]
fn background_writes_land_after_flush() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tutorials.json");
    let mut options = StoreOptions::new(&path);
    options.background_writes = true;

    let mut store = TutorialStore::load(options, Arc::new(ProductionFileSystem)).expect("load");
    store.create_tutorial().expect("tutorial");
    store.create_step(pose(0.0)).expect("step");
    store.flush().expect("flush");

    let on_disk = std::fs::read_to_string(&path).expect("document");
    assert!(on_disk.contains("tutorial_1_step_1"));
}

#[test]
fn fixture_document_loads_with_optional_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tutorials-two.json");
    std::fs::copy(&fixture, dir.path().join("tutorials.json")).expect("copy fixture");

    let mut store = open(dir.path(), StepIdPolicy::Stable);
    assert_eq!(store.tutorials().len(), 2);
    let first = store.tutorial("tutorial_1").expect("tutorial_1");
    assert!(first.steps[0].has_video());
    assert!(!first.steps[1].has_video());
    assert_eq!(
        step_label(&first.steps[0]),
        "Step 1: open the left c..."
    );

    let handle = store.handle_for_step("tutorial_1_step_2").expect("handle");
    assert_eq!(handle.tutorial_id, "tutorial_1");
    let step = store
        .update_step(&handle, StepUpdate::SetPose(pose(4.0)))
        .expect("pose");
    assert_eq!(step.global_pose.position, [4.0, 1.5, 2.0]);
    let next = store.create_step(pose(5.0)).expect("next");
    assert_eq!(next.step_id, "tutorial_2_step_1");
}

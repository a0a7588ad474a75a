//! Contracts for the platform services the scene drives: camera capture,
//! dictation, spatial anchoring and step rendering. Platform implementations
//! live outside this crate; the `Fake*` types record calls for tests.

use crate::errors::HoloTutsError;
use crate::runtime::FileSystem;
use crate::tutorial_store::StepDetails;
use crate::types::Pose;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub trait VideoCaptureProvider {
    /// Begins a camera+microphone capture. Refuses when a capture is already
    /// running or `name` is empty.
    fn start_recording(&mut self, name: &str) -> Result<(), HoloTutsError>;
    /// Stops the running capture and returns the path of the written file.
    fn stop_recording(&mut self) -> Result<String, HoloTutsError>;
    fn is_recording(&self) -> bool;
}

pub trait DictationProvider {
    fn start_recording(&mut self) -> Result<(), HoloTutsError>;
    fn stop_recording(&mut self) -> Result<(), HoloTutsError>;
    fn is_recording(&self) -> bool;
}

pub trait SpatialAnchorProvider {
    fn lock(&mut self, step_id: &str, pose: &Pose) -> Result<(), HoloTutsError>;
}

pub trait StepRenderer {
    fn spawn(&mut self, step: &StepDetails);
    fn refresh(&mut self, step: &StepDetails);
    fn destroy(&mut self, step_id: &str);
    fn clear(&mut self);
    fn play_video(&mut self, step_id: &str, video_file_path: &str);
    fn pause_video(&mut self, step_id: &str);
    /// Points the guidance indicator at a step, or hides it.
    fn point_indicator(&mut self, step_id: Option<&str>);
}

pub struct Collaborators {
    pub video: Box<dyn VideoCaptureProvider>,
    pub dictation: Box<dyn DictationProvider>,
    pub anchors: Box<dyn SpatialAnchorProvider>,
    pub renderer: Box<dyn StepRenderer>,
}

/// File name a capture named `name` is written to: spaces become underscores,
/// lowercased, `.mp4` appended.
pub fn video_file_name(name: &str) -> String {
    format!("{}.mp4", name.trim().replace(' ', "_").to_lowercase())
}

#[derive(Debug, Default)]
struct FakeVideoState {
    recording: Option<String>,
    started: Vec<String>,
    written: Vec<String>,
    fail_next_start: Option<String>,
    fail_next_stop: Option<String>,
}

/// Video capture double. Clones share state; with a file system attached,
/// stopping writes a placeholder file at the returned path.
#[derive(Clone)]
pub struct FakeVideoCapture {
    output_dir: PathBuf,
    file_system: Option<Arc<dyn FileSystem>>,
    state: Arc<Mutex<FakeVideoState>>,
}

impl FakeVideoCapture {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_system: None,
            state: Arc::new(Mutex::new(FakeVideoState::default())),
        }
    }

    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn fail_next_start(&self, message: &str) {
        self.state.lock().expect("video lock").fail_next_start = Some(message.to_string());
    }

    pub fn fail_next_stop(&self, message: &str) {
        self.state.lock().expect("video lock").fail_next_stop = Some(message.to_string());
    }

    pub fn current(&self) -> Option<String> {
        self.state.lock().expect("video lock").recording.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().expect("video lock").started.clone()
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().expect("video lock").written.clone()
    }
}

impl VideoCaptureProvider for FakeVideoCapture {
    fn start_recording(&mut self, name: &str) -> Result<(), HoloTutsError> {
        let mut state = self.state.lock().expect("video lock");
        if state.recording.is_some() {
            return Err(HoloTutsError::Provider(
                "a recording is already in progress".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(HoloTutsError::InvalidArgument(
                "missing recording file name".to_string(),
            ));
        }
        if let Some(message) = state.fail_next_start.take() {
            return Err(HoloTutsError::Provider(message));
        }
        state.recording = Some(name.to_string());
        state.started.push(name.to_string());
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<String, HoloTutsError> {
        let mut state = self.state.lock().expect("video lock");
        if let Some(message) = state.fail_next_stop.take() {
            return Err(HoloTutsError::Provider(message));
        }
        let name = state.recording.take().ok_or_else(|| {
            HoloTutsError::Provider("there is no recording in progress".to_string())
        })?;
        let path = self.output_dir.join(video_file_name(&name));
        if let Some(fs) = &self.file_system {
            fs.write_string(&path, "mp4")?;
        }
        let path = path.display().to_string();
        state.written.push(path.clone());
        Ok(path)
    }

    fn is_recording(&self) -> bool {
        self.state.lock().expect("video lock").recording.is_some()
    }
}

#[derive(Debug, Default)]
struct FakeDictationState {
    recording: bool,
    starts: usize,
    stops: usize,
    fail_next_start: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeDictation {
    state: Arc<Mutex<FakeDictationState>>,
}

impl FakeDictation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_start(&self, message: &str) {
        self.state.lock().expect("dictation lock").fail_next_start = Some(message.to_string());
    }

    pub fn starts(&self) -> usize {
        self.state.lock().expect("dictation lock").starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().expect("dictation lock").stops
    }
}

impl DictationProvider for FakeDictation {
    fn start_recording(&mut self) -> Result<(), HoloTutsError> {
        let mut state = self.state.lock().expect("dictation lock");
        if let Some(message) = state.fail_next_start.take() {
            return Err(HoloTutsError::Provider(message));
        }
        if state.recording {
            return Err(HoloTutsError::Provider(
                "dictation is already running".to_string(),
            ));
        }
        state.recording = true;
        state.starts += 1;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), HoloTutsError> {
        let mut state = self.state.lock().expect("dictation lock");
        state.recording = false;
        state.stops += 1;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.state.lock().expect("dictation lock").recording
    }
}

#[derive(Clone, Default)]
pub struct FakeAnchors {
    locked: Arc<Mutex<Vec<(String, Pose)>>>,
}

impl FakeAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked(&self) -> Vec<(String, Pose)> {
        self.locked.lock().expect("anchors lock").clone()
    }
}

impl SpatialAnchorProvider for FakeAnchors {
    fn lock(&mut self, step_id: &str, pose: &Pose) -> Result<(), HoloTutsError> {
        self.locked
            .lock()
            .expect("anchors lock")
            .push((step_id.to_string(), *pose));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Spawn(String),
    Refresh(String),
    Destroy(String),
    Clear,
    Play(String),
    Pause(String),
    Indicator(Option<String>),
}

/// Renderer double that records events and tracks which steps are on screen.
#[derive(Clone, Default)]
pub struct FakeRenderer {
    events: Arc<Mutex<Vec<RenderEvent>>>,
    visible: Arc<Mutex<Vec<String>>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().expect("render lock").clone()
    }

    pub fn visible(&self) -> Vec<String> {
        self.visible.lock().expect("visible lock").clone()
    }

    fn record(&self, event: RenderEvent) {
        self.events.lock().expect("render lock").push(event);
    }
}

impl StepRenderer for FakeRenderer {
    fn spawn(&mut self, step: &StepDetails) {
        self.record(RenderEvent::Spawn(step.id.clone()));
        let mut visible = self.visible.lock().expect("visible lock");
        if !visible.contains(&step.id) {
            visible.push(step.id.clone());
        }
    }

    fn refresh(&mut self, step: &StepDetails) {
        self.record(RenderEvent::Refresh(step.id.clone()));
    }

    fn destroy(&mut self, step_id: &str) {
        self.record(RenderEvent::Destroy(step_id.to_string()));
        self.visible
            .lock()
            .expect("visible lock")
            .retain(|id| id != step_id);
    }

    fn clear(&mut self) {
        self.record(RenderEvent::Clear);
        self.visible.lock().expect("visible lock").clear();
    }

    fn play_video(&mut self, step_id: &str, _video_file_path: &str) {
        self.record(RenderEvent::Play(step_id.to_string()));
    }

    fn pause_video(&mut self, step_id: &str) {
        self.record(RenderEvent::Pause(step_id.to_string()));
    }

    fn point_indicator(&mut self, step_id: Option<&str>) {
        self.record(RenderEvent::Indicator(step_id.map(str::to_string)));
    }
}

/// Fakes for every collaborator, plus handles to inspect them after they are
/// boxed into a [`Collaborators`].
#[derive(Clone)]
pub struct FakeCollaborators {
    pub video: FakeVideoCapture,
    pub dictation: FakeDictation,
    pub anchors: FakeAnchors,
    pub renderer: FakeRenderer,
}

impl FakeCollaborators {
    pub fn new(video_dir: impl Into<PathBuf>) -> Self {
        Self {
            video: FakeVideoCapture::new(video_dir),
            dictation: FakeDictation::new(),
            anchors: FakeAnchors::new(),
            renderer: FakeRenderer::new(),
        }
    }

    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.video = self.video.with_file_system(file_system);
        self
    }

    pub fn boxed(&self) -> Collaborators {
        Collaborators {
            video: Box::new(self.video.clone()),
            dictation: Box::new(self.dictation.clone()),
            anchors: Box::new(self.anchors.clone()),
            renderer: Box::new(self.renderer.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_file_name_is_sanitized() {
        assert_eq!(video_file_name("Step 1"), "step_1.mp4");
        assert_eq!(video_file_name("tutorial_2_step_3"), "tutorial_2_step_3.mp4");
    }

    #[test]
    fn second_start_is_refused_and_first_capture_is_untouched() {
        let mut video = FakeVideoCapture::new("/videos");
        video.start_recording("tutorial_1_step_1").expect("first");
        let err = video
            .start_recording("tutorial_1_step_2")
            .expect_err("second refused");
        assert!(matches!(err, HoloTutsError::Provider(_)));
        assert_eq!(video.current().as_deref(), Some("tutorial_1_step_1"));

        let path = video.stop_recording().expect("stop");
        assert_eq!(path, "/videos/tutorial_1_step_1.mp4");
        assert!(!video.is_recording());
    }

    #[test]
    fn empty_name_and_idle_stop_are_refused() {
        let mut video = FakeVideoCapture::new("/videos");
        assert!(matches!(
            video.start_recording(" "),
            Err(HoloTutsError::InvalidArgument(_))
        ));
        assert!(matches!(
            video.stop_recording(),
            Err(HoloTutsError::Provider(_))
        ));
    }
}

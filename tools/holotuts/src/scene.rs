use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::json;

use crate::config::RecordingConfig;
use crate::errors::HoloTutsError;
use crate::logging::append_run_log;
use crate::providers::Collaborators;
use crate::runtime::Clock;
use crate::tutorial_store::{StepDetails, StepHandle, StepUpdate, TutorialStore};
use crate::types::{PanelVisibility, Pose, SceneAction, SceneState};

pub const DEFAULT_END_KEYWORD: &str = "marking";
pub const DEFAULT_MAX_RECORDING: Duration = Duration::from_secs(300);

type SceneResult<T> = Result<T, HoloTutsError>;

/// What an action did. State mismatches and provider failures are reported
/// here rather than as errors; the session keeps running either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied {
        from: SceneState,
        to: SceneState,
    },
    Rejected {
        state: SceneState,
        action: SceneAction,
    },
    ProviderFailed {
        state: SceneState,
        action: SceneAction,
        message: String,
    },
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSession {
    pub step: StepHandle,
    pub started_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneSettings {
    pub end_keyword: String,
    pub max_recording: Duration,
}

impl SceneSettings {
    pub fn from_config(cfg: &RecordingConfig) -> Self {
        Self {
            end_keyword: cfg.end_keyword.trim().to_lowercase(),
            max_recording: Duration::from_secs(cfg.max_duration_seconds),
        }
    }
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            end_keyword: DEFAULT_END_KEYWORD.to_string(),
            max_recording: DEFAULT_MAX_RECORDING,
        }
    }
}

/// Drives the authoring and guidance workflow over a borrowed store.
pub struct SceneStateMachine<'s> {
    store: &'s mut TutorialStore,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    settings: SceneSettings,
    state: SceneState,
    recording: Option<RecordingSession>,
    awaiting_transcript: Option<StepHandle>,
    active_step: Option<String>,
    viewing: Option<String>,
    viewed: HashSet<String>,
}

impl<'s> SceneStateMachine<'s> {
    pub fn new(
        store: &'s mut TutorialStore,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        settings: SceneSettings,
    ) -> Self {
        Self {
            store,
            collaborators,
            clock,
            settings,
            state: SceneState::MainMenu,
            recording: None,
            awaiting_transcript: None,
            active_step: None,
            viewing: None,
            viewed: HashSet::new(),
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn store(&self) -> &TutorialStore {
        self.store
    }

    pub fn recording(&self) -> Option<&RecordingSession> {
        self.recording.as_ref()
    }

    pub fn awaiting_transcript(&self) -> Option<&StepHandle> {
        self.awaiting_transcript.as_ref()
    }

    /// The step whose video is playing or paused mid-way, if any.
    pub fn active_step(&self) -> Option<&str> {
        self.active_step.as_deref()
    }

    pub fn viewing_tutorial(&self) -> Option<&str> {
        self.viewing.as_deref()
    }

    pub fn can_click_step(&self) -> bool {
        self.state.accepts_step_clicks()
    }

    pub fn visible_panels(&self) -> PanelVisibility {
        self.state.visible_panels()
    }

    /// First step of the loaded tutorial that has not been played yet.
    pub fn next_unviewed_step(&self) -> Option<String> {
        let tutorial = self.store.tutorial(self.viewing.as_deref()?).ok()?;
        tutorial
            .steps
            .iter()
            .find(|step| !self.viewed.contains(&step.id))
            .map(|step| step.id.clone())
    }

    // Main menu

    pub fn start_authoring(&mut self) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::MainMenu {
            return Ok(self.reject(SceneAction::StartAuthoring));
        }
        self.transition(SceneAction::StartAuthoring, SceneState::CreateTutorial)
    }

    pub fn start_guidance(&mut self) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::MainMenu {
            return Ok(self.reject(SceneAction::StartGuidance));
        }
        self.transition(SceneAction::StartGuidance, SceneState::ViewTutorials)
    }

    /// Deletes every tutorial with its steps and videos, then empties the store.
    pub fn reset_all(&mut self) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::MainMenu {
            return Ok(self.reject(SceneAction::ResetAll));
        }
        self.store.delete_all()?;
        self.collaborators.renderer.clear();
        self.awaiting_transcript = None;
        self.active_step = None;
        self.viewing = None;
        self.viewed.clear();
        self.transition(SceneAction::ResetAll, SceneState::MainMenu)
    }

    // Authoring

    pub fn create_tutorial(&mut self) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::CreateTutorial {
            return Ok(self.reject(SceneAction::CreateTutorial));
        }
        self.store.create_tutorial()?;
        self.transition(SceneAction::CreateTutorial, SceneState::CreateStep)
    }

    /// Creates a step at `pose` and starts the video and dictation capture for it.
    pub fn mark(&mut self, pose: Pose) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::CreateStep {
            return Ok(self.reject(SceneAction::Mark));
        }

        let handle = self.store.create_step(pose)?;

        if let Err(error) = self.collaborators.video.start_recording(&handle.step_id) {
            self.store.delete_step(&handle.step_id)?;
            return Ok(self.provider_failed(SceneAction::Mark, &error));
        }
        if let Err(error) = self.collaborators.dictation.start_recording() {
            match self.collaborators.video.stop_recording() {
                Ok(path) => {
                    self.store
                        .update_step(&handle, StepUpdate::SetVideoPath(path))?;
                }
                Err(stop_error) => append_run_log(
                    "error",
                    "scene.video_stop_failed",
                    json!({ "step_id": handle.step_id, "error": stop_error.to_string() }),
                ),
            }
            self.store.delete_step(&handle.step_id)?;
            return Ok(self.provider_failed(SceneAction::Mark, &error));
        }

        let step = self.store.step(&handle)?.clone();
        self.collaborators.renderer.spawn(&step);
        self.lock_anchor(&step);

        self.recording = Some(RecordingSession {
            step: handle,
            started_at: self.clock.now(),
        });
        self.transition(SceneAction::Mark, SceneState::CreateStepRecording)
    }

    /// Stops the capture and attaches the video to the step being recorded.
    /// Outside of a recording this is a no-op.
    pub fn end_marking(&mut self) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::CreateStepRecording {
            return Ok(self.reject(SceneAction::EndMarking));
        }
        let Some(session) = self.recording.clone() else {
            return Err(HoloTutsError::InvalidState(
                "recording state without a recording session".to_string(),
            ));
        };

        let path = match self.collaborators.video.stop_recording() {
            Ok(path) => path,
            Err(error) => return Ok(self.provider_failed(SceneAction::EndMarking, &error)),
        };
        let updated = self
            .store
            .update_step(&session.step, StepUpdate::SetVideoPath(path.clone()));

        // The camera is already stopped, so the recording ends either way.
        self.stop_dictation(&session.step.step_id);
        self.recording = None;
        let step = match updated {
            Ok(step) => step,
            Err(error) => {
                append_run_log(
                    "error",
                    "scene.video_path_lost",
                    json!({
                        "step_id": session.step.step_id,
                        "path": path,
                        "error": error.to_string(),
                    }),
                );
                self.transition(SceneAction::EndMarking, SceneState::CreateStep)?;
                return Err(error);
            }
        };

        self.collaborators.renderer.refresh(&step);
        self.awaiting_transcript = Some(session.step);
        self.transition(SceneAction::EndMarking, SceneState::CreateStep)
    }

    fn stop_dictation(&mut self, step_id: &str) {
        if let Err(error) = self.collaborators.dictation.stop_recording() {
            append_run_log(
                "error",
                "scene.dictation_stop_failed",
                json!({ "step_id": step_id, "error": error.to_string() }),
            );
        }
    }

    /// Live partial transcript. Ends the marking when it contains the end
    /// keyword; "end" alone is often heard as "and", so only the keyword counts.
    pub fn on_dictation_hypothesis(&mut self, text: &str) -> SceneResult<Option<ActionOutcome>> {
        if self.state != SceneState::CreateStepRecording {
            return Ok(None);
        }
        if !text.to_lowercase().contains(&self.settings.end_keyword) {
            return Ok(None);
        }
        append_run_log(
            "info",
            "scene.end_keyword_heard",
            json!({ "hypothesis": text }),
        );
        self.end_marking().map(Some)
    }

    /// Final transcript for the most recent recording.
    pub fn on_dictation_complete(&mut self, text: &str) -> SceneResult<Option<StepDetails>> {
        let target = self
            .awaiting_transcript
            .take()
            .or_else(|| self.recording.as_ref().map(|session| session.step.clone()));
        let Some(handle) = target else {
            append_run_log(
                "warn",
                "scene.transcript_unclaimed",
                json!({ "state": self.state.as_str() }),
            );
            return Ok(None);
        };

        match self
            .store
            .update_step(&handle, StepUpdate::SetTranscript(text.to_string()))
        {
            Ok(step) => {
                self.collaborators.renderer.refresh(&step);
                Ok(Some(step))
            }
            Err(HoloTutsError::NotFound(message)) => {
                append_run_log(
                    "warn",
                    "scene.transcript_step_gone",
                    json!({ "step_id": handle.step_id, "error": message }),
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    pub fn on_dictation_error(&mut self, message: &str) {
        append_run_log(
            "error",
            "scene.dictation_error",
            json!({ "state": self.state.as_str(), "error": message }),
        );
    }

    /// Ends a marking that has been recording for longer than the configured
    /// limit, so a stalled capture cannot park the scene forever.
    pub fn tick(&mut self) -> SceneResult<Option<ActionOutcome>> {
        let Some(session) = &self.recording else {
            return Ok(None);
        };
        let elapsed = self
            .clock
            .now()
            .duration_since(session.started_at)
            .unwrap_or_default();
        if elapsed < self.settings.max_recording {
            return Ok(None);
        }
        append_run_log(
            "warn",
            "scene.recording_timeout",
            json!({ "step_id": session.step.step_id, "elapsed_ms": elapsed.as_millis() as u64 }),
        );
        self.end_marking().map(Some)
    }

    /// Leaves authoring. A trailing step that never got a video is discarded.
    pub fn stop_tutorial(&mut self) -> SceneResult<ActionOutcome> {
        if !matches!(
            self.state,
            SceneState::CreateStep | SceneState::CreateStepPlaying
        ) {
            return Ok(self.reject(SceneAction::StopTutorial));
        }
        self.pause_active();

        let unfinished = self
            .store
            .last_step()
            .filter(|step| !step.has_video())
            .map(|step| step.id.clone());
        if let Some(step_id) = unfinished {
            append_run_log(
                "info",
                "scene.discard_unrecorded_step",
                json!({ "step_id": step_id }),
            );
            self.store.delete_step(&step_id)?;
        }

        self.collaborators.renderer.clear();
        self.transition(SceneAction::StopTutorial, SceneState::MainMenu)
    }

    pub fn delete_step(&mut self, step_id: &str) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::CreateStep {
            return Ok(self.reject(SceneAction::DeleteStep));
        }
        let tutorial = self.store.find_tutorial_for_step(step_id)?;
        let tutorial_id = tutorial.id.clone();
        for step in &tutorial.steps {
            self.collaborators.renderer.destroy(&step.id);
        }

        let deleted = self.store.delete_step(step_id)?;
        if let Some(handle) = self.awaiting_transcript.take() {
            if handle.step_id != step_id {
                let step_id = deleted
                    .renamed
                    .iter()
                    .find(|renamed| renamed.from == handle.step_id)
                    .map_or(handle.step_id.clone(), |renamed| renamed.to.clone());
                self.awaiting_transcript = Some(StepHandle { step_id, ..handle });
            }
        }

        for step in &self.store.tutorial(&tutorial_id)?.steps {
            self.collaborators.renderer.spawn(step);
        }
        self.transition(SceneAction::DeleteStep, SceneState::CreateStep)
    }

    // Playback, shared by authoring and guidance

    /// Toggles playback of a step's video.
    pub fn click_step(&mut self, step_id: &str) -> SceneResult<ActionOutcome> {
        if !self.can_click_step() {
            return Ok(self.reject(SceneAction::ClickStep));
        }
        if self.active_step.as_deref() == Some(step_id) && self.state.is_playing() {
            self.pause_or_stop_step()
        } else {
            self.play_step(step_id)
        }
    }

    /// Plays a step's video, pausing whichever step was playing before.
    pub fn play_step(&mut self, step_id: &str) -> SceneResult<ActionOutcome> {
        if !self.can_click_step() {
            return Ok(self.reject(SceneAction::PlayStep));
        }
        let tutorial = self.store.find_tutorial_for_step(step_id)?;
        let Some(video) = tutorial
            .step(step_id)
            .and_then(|step| step.video_file_path.clone())
            .filter(|path| !path.trim().is_empty())
        else {
            return Ok(self.reject(SceneAction::PlayStep));
        };

        if let Some(previous) = self.active_step.take() {
            self.collaborators.renderer.pause_video(&previous);
        }
        self.active_step = Some(step_id.to_string());
        self.viewed.insert(step_id.to_string());
        self.collaborators.renderer.play_video(step_id, &video);
        if self.viewing.is_some() {
            self.point_indicator();
        }

        let next = match self.state {
            SceneState::CreateStep => SceneState::CreateStepPlaying,
            SceneState::ViewSteps => SceneState::ViewStepPlaying,
            other => other,
        };
        self.transition(SceneAction::PlayStep, next)
    }

    pub fn pause_or_stop_step(&mut self) -> SceneResult<ActionOutcome> {
        let next = match self.state {
            SceneState::CreateStepPlaying => SceneState::CreateStep,
            SceneState::ViewStepPlaying => SceneState::ViewSteps,
            _ => return Ok(self.reject(SceneAction::PauseStep)),
        };
        self.pause_active();
        self.transition(SceneAction::PauseStep, next)
    }

    /// Playback reached the end of a step's video.
    pub fn on_video_ended(&mut self, step_id: &str) -> SceneResult<Option<ActionOutcome>> {
        if self.active_step.as_deref() != Some(step_id) || !self.state.is_playing() {
            return Ok(None);
        }
        self.pause_or_stop_step().map(Some)
    }

    // Guidance

    pub fn pick_tutorial(&mut self, tutorial_id: &str) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::ViewTutorials {
            return Ok(self.reject(SceneAction::PickTutorial));
        }
        let steps = self.store.tutorial(tutorial_id)?.steps.clone();
        for step in &steps {
            self.collaborators.renderer.spawn(step);
            self.lock_anchor(step);
        }
        self.viewing = Some(tutorial_id.to_string());
        self.viewed.clear();
        self.active_step = None;
        self.point_indicator();
        self.transition(SceneAction::PickTutorial, SceneState::ViewSteps)
    }

    pub fn delete_tutorial(&mut self, tutorial_id: &str) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::ViewTutorials {
            return Ok(self.reject(SceneAction::DeleteTutorial));
        }
        self.store.delete_tutorial(tutorial_id)?;
        self.transition(SceneAction::DeleteTutorial, SceneState::ViewTutorials)
    }

    pub fn view_steps_back(&mut self) -> SceneResult<ActionOutcome> {
        if !matches!(
            self.state,
            SceneState::ViewSteps | SceneState::ViewStepPlaying
        ) {
            return Ok(self.reject(SceneAction::ViewStepsBack));
        }
        self.pause_active();
        self.collaborators.renderer.clear();
        self.collaborators.renderer.point_indicator(None);
        self.viewing = None;
        self.viewed.clear();
        self.transition(SceneAction::ViewStepsBack, SceneState::ViewTutorials)
    }

    pub fn tutorial_list_back(&mut self) -> SceneResult<ActionOutcome> {
        if self.state != SceneState::ViewTutorials {
            return Ok(self.reject(SceneAction::TutorialListBack));
        }
        self.transition(SceneAction::TutorialListBack, SceneState::MainMenu)
    }

    fn pause_active(&mut self) {
        if let Some(step_id) = self.active_step.take() {
            self.collaborators.renderer.pause_video(&step_id);
        }
    }

    fn point_indicator(&mut self) {
        let next = self.next_unviewed_step();
        self.collaborators.renderer.point_indicator(next.as_deref());
    }

    fn lock_anchor(&mut self, step: &StepDetails) {
        if let Err(error) = self
            .collaborators
            .anchors
            .lock(&step.id, &step.global_pose)
        {
            append_run_log(
                "warn",
                "scene.anchor_failed",
                json!({ "step_id": step.id, "error": error.to_string() }),
            );
        }
    }

    fn transition(&mut self, action: SceneAction, to: SceneState) -> SceneResult<ActionOutcome> {
        let from = self.state;
        validate_transition(from, to)?;
        self.state = to;
        append_run_log(
            "info",
            "scene.transition",
            json!({ "action": action.as_str(), "from": from.as_str(), "to": to.as_str() }),
        );
        Ok(ActionOutcome::Applied { from, to })
    }

    fn reject(&self, action: SceneAction) -> ActionOutcome {
        append_run_log(
            "warn",
            "scene.rejected",
            json!({ "action": action.as_str(), "state": self.state.as_str() }),
        );
        ActionOutcome::Rejected {
            state: self.state,
            action,
        }
    }

    fn provider_failed(&self, action: SceneAction, error: &HoloTutsError) -> ActionOutcome {
        append_run_log(
            "error",
            "scene.provider_failed",
            json!({
                "action": action.as_str(),
                "state": self.state.as_str(),
                "error": error.to_string(),
            }),
        );
        ActionOutcome::ProviderFailed {
            state: self.state,
            action,
            message: error.to_string(),
        }
    }
}

pub fn validate_transition(from: SceneState, to: SceneState) -> Result<(), HoloTutsError> {
    use SceneState as S;

    let allowed = from == to
        || match from {
            S::MainMenu => matches!(to, S::CreateTutorial | S::ViewTutorials),
            S::CreateTutorial => matches!(to, S::CreateStep),
            S::CreateStep => matches!(
                to,
                S::CreateStepRecording | S::CreateStepPlaying | S::MainMenu
            ),
            S::CreateStepRecording => matches!(to, S::CreateStep),
            S::CreateStepPlaying => matches!(to, S::CreateStep | S::MainMenu),
            S::ViewTutorials => matches!(to, S::ViewSteps | S::MainMenu),
            S::ViewSteps => matches!(to, S::ViewStepPlaying | S::ViewTutorials),
            S::ViewStepPlaying => matches!(to, S::ViewSteps | S::ViewTutorials),
        };

    if !allowed {
        return Err(HoloTutsError::InvalidState(format!(
            "illegal transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
}

impl Pose {
    pub fn new(position: [f32; 3], rotation: [f32; 4]) -> Self {
        Self { position, rotation }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneState {
    MainMenu,
    CreateTutorial,
    CreateStep,
    CreateStepRecording,
    CreateStepPlaying,
    ViewTutorials,
    ViewSteps,
    ViewStepPlaying,
}

impl SceneState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MainMenu => "main_menu",
            Self::CreateTutorial => "create_tutorial",
            Self::CreateStep => "create_step",
            Self::CreateStepRecording => "create_step_recording",
            Self::CreateStepPlaying => "create_step_playing",
            Self::ViewTutorials => "view_tutorials",
            Self::ViewSteps => "view_steps",
            Self::ViewStepPlaying => "view_step_playing",
        }
    }

    /// States in which a step's tooltip accepts clicks.
    pub fn accepts_step_clicks(self) -> bool {
        matches!(
            self,
            Self::CreateStep | Self::CreateStepPlaying | Self::ViewSteps | Self::ViewStepPlaying
        )
    }

    pub fn is_playing(self) -> bool {
        matches!(self, Self::CreateStepPlaying | Self::ViewStepPlaying)
    }

    pub fn visible_panels(self) -> PanelVisibility {
        let mut panels = PanelVisibility::default();
        match self {
            Self::MainMenu => panels.main_menu = true,
            Self::CreateTutorial => panels.create_tutorial_button = true,
            Self::CreateStep | Self::CreateStepPlaying => panels.step_list = true,
            Self::CreateStepRecording => panels.stop_recording_button = true,
            Self::ViewTutorials => panels.tutorial_list = true,
            Self::ViewSteps | Self::ViewStepPlaying => {
                panels.tutorial_list_back_button = true;
                panels.next_step_indicator = true;
            }
        }
        panels
    }
}

/// Which UI panels the scene shows for a given state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelVisibility {
    pub main_menu: bool,
    pub create_tutorial_button: bool,
    pub step_list: bool,
    pub stop_recording_button: bool,
    pub tutorial_list: bool,
    pub tutorial_list_back_button: bool,
    pub next_step_indicator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneAction {
    StartAuthoring,
    StartGuidance,
    ResetAll,
    CreateTutorial,
    Mark,
    EndMarking,
    ClickStep,
    PlayStep,
    PauseStep,
    StopTutorial,
    DeleteStep,
    PickTutorial,
    DeleteTutorial,
    ViewStepsBack,
    TutorialListBack,
}

impl SceneAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartAuthoring => "start_authoring",
            Self::StartGuidance => "start_guidance",
            Self::ResetAll => "reset_all",
            Self::CreateTutorial => "create_tutorial",
            Self::Mark => "mark",
            Self::EndMarking => "end_marking",
            Self::ClickStep => "click_step",
            Self::PlayStep => "play_step",
            Self::PauseStep => "pause_step",
            Self::StopTutorial => "stop_tutorial",
            Self::DeleteStep => "delete_step",
            Self::PickTutorial => "pick_tutorial",
            Self::DeleteTutorial => "delete_tutorial",
            Self::ViewStepsBack => "view_steps_back",
            Self::TutorialListBack => "tutorial_list_back",
        }
    }
}

/// How step ids behave after a step is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepIdPolicy {
    /// Ids are never reused; gaps stay after deletion.
    #[default]
    Stable,
    /// Trailing steps shift down so ids stay contiguous from 1.
    Renumber,
}

impl StepIdPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Renumber => "renumber",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub process_cwd: PathBuf,
    pub data_dir: PathBuf,
    pub document_path: PathBuf,
    pub log_path: PathBuf,
}

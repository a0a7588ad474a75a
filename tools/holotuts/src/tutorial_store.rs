use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::document_writer::DocumentWriter;
use crate::errors::HoloTutsError;
use crate::logging::append_run_log;
use crate::providers::video_file_name;
use crate::runtime::FileSystem;
use crate::types::{Pose, SessionPaths, StepIdPolicy};

pub const SCHEMA_VERSION: u32 = 1;

type StoreResult<T> = Result<T, HoloTutsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDetails {
    pub id: String,
    pub number: u32,
    pub name: String,
    pub global_pose: Pose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl StepDetails {
    fn new(tutorial_id: &str, number: u32, pose: Pose) -> Self {
        Self {
            id: step_id(tutorial_id, number),
            number,
            name: step_name(number),
            global_pose: pose,
            video_file_path: None,
            transcript: None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_file_path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    }

    fn apply(&mut self, update: StepUpdate) {
        match update {
            StepUpdate::SetVideoPath(path) => self.video_file_path = Some(path),
            StepUpdate::SetTranscript(text) => self.transcript = Some(text),
            StepUpdate::SetPose(pose) => self.global_pose = pose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tutorial {
    pub id: String,
    pub number: u32,
    pub name: String,
    pub steps: Vec<StepDetails>,
    /// Highest step number ever issued in this tutorial.
    #[serde(default)]
    pub last_step_number: u32,
}

impl Tutorial {
    fn new(number: u32) -> Self {
        Self {
            id: format!("tutorial_{number}"),
            number,
            name: format!("Tutorial {number}"),
            steps: Vec::new(),
            last_step_number: 0,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&StepDetails> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn last_step(&self) -> Option<&StepDetails> {
        self.steps.last()
    }

    fn add_step(&mut self, pose: Pose) -> &StepDetails {
        let number = self.next_step_number();
        self.last_step_number = number;
        self.steps.push(StepDetails::new(&self.id, number, pose));
        &self.steps[self.steps.len() - 1]
    }

    fn next_step_number(&self) -> u32 {
        let highest = self.steps.iter().map(|s| s.number).max().unwrap_or(0);
        highest.max(self.last_step_number) + 1
    }
}

/// Explicit address of a step, returned by [`TutorialStore::create_step`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepHandle {
    pub tutorial_id: String,
    pub step_id: String,
}

/// A step id rewritten by the renumber policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedStep {
    pub from: String,
    pub to: String,
}

/// Result of [`TutorialStore::delete_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedStep {
    pub step: StepDetails,
    pub renamed: Vec<RenamedStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepUpdate {
    SetVideoPath(String),
    SetTranscript(String),
    SetPose(Pose),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorialDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub last_tutorial_number: u32,
    pub tutorials: Vec<Tutorial>,
}

impl Default for TutorialDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_tutorial_number: 0,
            tutorials: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub document_path: PathBuf,
    pub step_ids: StepIdPolicy,
    pub background_writes: bool,
}

impl StoreOptions {
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            step_ids: StepIdPolicy::Stable,
            background_writes: false,
        }
    }

    pub fn from_config(cfg: &AppConfig, paths: &SessionPaths) -> Self {
        Self {
            document_path: paths.document_path.clone(),
            step_ids: cfg.storage.step_ids,
            background_writes: cfg.storage.background_writes,
        }
    }
}

/// Owns every tutorial and is the only writer of the tutorial document. Each
/// mutation rewrites the whole document.
pub struct TutorialStore {
    document: TutorialDocument,
    document_path: PathBuf,
    step_ids: StepIdPolicy,
    writer: DocumentWriter,
}

impl TutorialStore {
    /// Loads the document, or creates and persists an empty one when the file
    /// does not exist yet. Unreadable or malformed documents are fatal.
    pub fn load(options: StoreOptions, file_system: Arc<dyn FileSystem>) -> StoreResult<Self> {
        let path = options.document_path.clone();
        append_run_log(
            "info",
            "tutorial_store.load",
            json!({ "path": path.display().to_string(), "step_ids": options.step_ids.as_str() }),
        );

        let writer = if options.background_writes {
            DocumentWriter::background(Arc::clone(&file_system))
        } else {
            DocumentWriter::inline(Arc::clone(&file_system))
        };

        if !file_system.exists(&path) {
            append_run_log(
                "info",
                "tutorial_store.create",
                json!({ "path": path.display().to_string() }),
            );
            if let Some(parent) = path.parent() {
                file_system.create_dir_all(parent)?;
            }
            let mut store = Self {
                document: TutorialDocument::default(),
                document_path: path,
                step_ids: options.step_ids,
                writer,
            };
            store.persist()?;
            return Ok(store);
        }

        let contents = file_system.read_to_string(&path)?;
        let document = parse_document(&contents)?;
        append_run_log(
            "info",
            "tutorial_store.loaded",
            json!({
                "path": path.display().to_string(),
                "tutorials": document.tutorials.len(),
            }),
        );

        Ok(Self {
            document,
            document_path: path,
            step_ids: options.step_ids,
            writer,
        })
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn step_id_policy(&self) -> StepIdPolicy {
        self.step_ids
    }

    pub fn document(&self) -> &TutorialDocument {
        &self.document
    }

    pub fn tutorials(&self) -> &[Tutorial] {
        &self.document.tutorials
    }

    pub fn tutorial(&self, tutorial_id: &str) -> StoreResult<&Tutorial> {
        self.document
            .tutorials
            .iter()
            .find(|t| t.id == tutorial_id)
            .ok_or_else(|| HoloTutsError::NotFound(format!("tutorial {tutorial_id}")))
    }

    /// The active tutorial: new steps are appended to it.
    pub fn last_tutorial(&self) -> Option<&Tutorial> {
        self.document.tutorials.last()
    }

    pub fn last_step(&self) -> Option<&StepDetails> {
        self.last_tutorial().and_then(Tutorial::last_step)
    }

    pub fn step(&self, handle: &StepHandle) -> StoreResult<&StepDetails> {
        self.tutorial(&handle.tutorial_id)?
            .step(&handle.step_id)
            .ok_or_else(|| HoloTutsError::NotFound(format!("step {}", handle.step_id)))
    }

    pub fn find_tutorial_for_step(&self, step_id: &str) -> StoreResult<&Tutorial> {
        self.document
            .tutorials
            .iter()
            .find(|t| t.steps.iter().any(|s| s.id == step_id))
            .ok_or_else(|| {
                HoloTutsError::NotFound(format!("no tutorial contains step {step_id}"))
            })
    }

    pub fn handle_for_step(&self, step_id: &str) -> StoreResult<StepHandle> {
        let tutorial = self.find_tutorial_for_step(step_id)?;
        Ok(StepHandle {
            tutorial_id: tutorial.id.clone(),
            step_id: step_id.to_string(),
        })
    }

    pub fn create_tutorial(&mut self) -> StoreResult<Tutorial> {
        self.writer.flush()?;
        let highest = self
            .document
            .tutorials
            .iter()
            .map(|t| t.number)
            .max()
            .unwrap_or(0);
        let number = highest.max(self.document.last_tutorial_number) + 1;
        let tutorial = Tutorial::new(number);
        self.document.last_tutorial_number = number;
        self.document.tutorials.push(tutorial.clone());
        append_run_log(
            "info",
            "tutorial_store.create_tutorial",
            json!({ "tutorial_id": tutorial.id }),
        );
        self.persist()?;
        Ok(tutorial)
    }

    /// Appends a step to the active tutorial.
    pub fn create_step(&mut self, pose: Pose) -> StoreResult<StepHandle> {
        self.writer.flush()?;
        let tutorial = self.document.tutorials.last_mut().ok_or_else(|| {
            HoloTutsError::InvalidState("no tutorial exists yet; create one first".to_string())
        })?;
        let step_id = tutorial.add_step(pose).id.clone();
        let handle = StepHandle {
            tutorial_id: tutorial.id.clone(),
            step_id,
        };
        append_run_log(
            "info",
            "tutorial_store.create_step",
            json!({ "tutorial_id": handle.tutorial_id, "step_id": handle.step_id }),
        );
        self.persist()?;
        Ok(handle)
    }

    pub fn update_step(
        &mut self,
        handle: &StepHandle,
        update: StepUpdate,
    ) -> StoreResult<StepDetails> {
        self.writer.flush()?;
        let step = self
            .document
            .tutorials
            .iter_mut()
            .find(|t| t.id == handle.tutorial_id)
            .ok_or_else(|| HoloTutsError::NotFound(format!("tutorial {}", handle.tutorial_id)))?
            .steps
            .iter_mut()
            .find(|s| s.id == handle.step_id)
            .ok_or_else(|| HoloTutsError::NotFound(format!("step {}", handle.step_id)))?;
        step.apply(update);
        let updated = step.clone();
        self.persist()?;
        Ok(updated)
    }

    pub fn update_last_step(&mut self, update: StepUpdate) -> StoreResult<StepDetails> {
        let tutorial = self.last_tutorial().ok_or_else(|| {
            HoloTutsError::InvalidState("no tutorial exists yet; create one first".to_string())
        })?;
        let step = tutorial
            .last_step()
            .ok_or_else(|| HoloTutsError::NotFound(format!("{} has no steps", tutorial.id)))?;
        let handle = StepHandle {
            tutorial_id: tutorial.id.clone(),
            step_id: step.id.clone(),
        };
        self.update_step(&handle, update)
    }

    /// Key-addressed form of [`Self::update_last_step`] for callers that only
    /// have a field name, e.g. UI bindings. Keys use the document's field names.
    pub fn update_last_step_by_key(&mut self, key: &str, value: Value) -> StoreResult<StepDetails> {
        let update = match key {
            "videoFilePath" => StepUpdate::SetVideoPath(string_value(key, value)?),
            "transcript" => StepUpdate::SetTranscript(string_value(key, value)?),
            "globalPose" => StepUpdate::SetPose(serde_json::from_value(value).map_err(|e| {
                HoloTutsError::InvalidArgument(format!("globalPose is not a pose: {e}"))
            })?),
            _ => {
                return Err(HoloTutsError::InvalidArgument(format!(
                    "step has no field named {key} that can be set"
                )))
            }
        };
        self.update_last_step(update)
    }

    /// Removes a step and its video file. Under [`StepIdPolicy::Renumber`] the
    /// steps after it shift down and their video files are renamed; the
    /// returned [`DeletedStep::renamed`] lists every id that changed. A failed
    /// rename leaves both the document and the files as they were.
    pub fn delete_step(&mut self, step_id: &str) -> StoreResult<DeletedStep> {
        self.writer.flush()?;
        let deleted = self.remove_step(step_id)?;
        self.persist()?;
        Ok(deleted)
    }

    /// Deletes every step of the tutorial, then the tutorial itself, and writes
    /// the result once.
    pub fn delete_tutorial(&mut self, tutorial_id: &str) -> StoreResult<Tutorial> {
        self.writer.flush()?;
        let step_ids = self
            .tutorial(tutorial_id)?
            .steps
            .iter()
            .rev()
            .map(|s| s.id.clone())
            .collect::<Vec<_>>();
        for step_id in &step_ids {
            self.remove_step(step_id)?;
        }

        let index = self
            .document
            .tutorials
            .iter()
            .position(|t| t.id == tutorial_id)
            .ok_or_else(|| HoloTutsError::NotFound(format!("tutorial {tutorial_id}")))?;
        let removed = self.document.tutorials.remove(index);
        append_run_log(
            "info",
            "tutorial_store.delete_tutorial",
            json!({ "tutorial_id": tutorial_id, "steps": step_ids.len() }),
        );
        self.persist()?;
        Ok(removed)
    }

    /// Deletes every tutorial with its step videos, then resets the document.
    /// Returns how many tutorials were removed.
    pub fn delete_all(&mut self) -> StoreResult<usize> {
        let tutorial_ids = self
            .document
            .tutorials
            .iter()
            .map(|t| t.id.clone())
            .collect::<Vec<_>>();
        for tutorial_id in &tutorial_ids {
            self.delete_tutorial(tutorial_id)?;
        }
        self.reset()?;
        Ok(tutorial_ids.len())
    }

    /// Clears every tutorial. Video files are left alone.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.writer.flush()?;
        self.document = TutorialDocument::default();
        append_run_log("info", "tutorial_store.reset", json!({}));
        self.persist()
    }

    /// Waits for a queued background write.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.writer.flush()
    }

    fn remove_step(&mut self, step_id: &str) -> StoreResult<DeletedStep> {
        let (tutorial_index, step_index) = self
            .document
            .tutorials
            .iter()
            .enumerate()
            .find_map(|(ti, t)| t.steps.iter().position(|s| s.id == step_id).map(|si| (ti, si)))
            .ok_or_else(|| HoloTutsError::NotFound(format!("step {step_id}")))?;

        let renumbering = self.step_ids == StepIdPolicy::Renumber;
        let plan = if renumbering {
            renumber_plan(&self.document.tutorials[tutorial_index], step_index)
        } else {
            Vec::new()
        };

        // The removed step's video is parked first so a renamed neighbour can
        // take its file name.
        let fs = Arc::clone(self.writer.file_system());
        let existing_video = self.document.tutorials[tutorial_index].steps[step_index]
            .video_file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .filter(|p| fs.exists(p));
        let parked = existing_video
            .filter(|_| plan.iter().any(|item| item.video.is_some()))
            .map(|path| {
                let mut parked = path.clone().into_os_string();
                parked.push(".deleting");
                (path, PathBuf::from(parked))
            });

        let moves = parked
            .iter()
            .cloned()
            .chain(plan.iter().filter_map(|item| item.video.clone()))
            .filter(|(from, _)| fs.exists(from))
            .collect::<Vec<_>>();
        apply_moves(fs.as_ref(), &moves, step_id)?;

        let tutorial = &mut self.document.tutorials[tutorial_index];
        let removed = tutorial.steps.remove(step_index);
        let mut renamed = Vec::with_capacity(plan.len());
        for item in plan {
            let step = &mut tutorial.steps[item.index];
            renamed.push(RenamedStep {
                from: std::mem::replace(&mut step.id, item.id),
                to: step.id.clone(),
            });
            step.number = item.number;
            step.name = step_name(item.number);
            if let Some((_, to)) = item.video {
                step.video_file_path = Some(to.display().to_string());
            }
        }
        if renumbering {
            tutorial.last_step_number = tutorial.steps.len() as u32;
        }

        match &parked {
            Some((_, parked_path)) => self.remove_video_file(&removed.id, parked_path),
            None => self.remove_video(&removed),
        }

        append_run_log(
            "info",
            "tutorial_store.delete_step",
            json!({
                "step_id": step_id,
                "policy": self.step_ids.as_str(),
                "renamed": renamed.len(),
            }),
        );
        Ok(DeletedStep {
            step: removed,
            renamed,
        })
    }

    fn remove_video(&self, step: &StepDetails) {
        let Some(path) = step.video_file_path.as_deref().filter(|p| !p.is_empty()) else {
            return;
        };
        self.remove_video_file(&step.id, Path::new(path));
    }

    fn remove_video_file(&self, step_id: &str, path: &Path) {
        let fs = self.writer.file_system();
        if !fs.exists(path) {
            return;
        }
        if let Err(error) = fs.remove_file(path) {
            append_run_log(
                "warn",
                "tutorial_store.video_delete_failed",
                json!({ "step_id": step_id, "path": path.display().to_string(), "error": error.to_string() }),
            );
        }
    }

    fn persist(&mut self) -> StoreResult<()> {
        let contents = serde_json::to_string_pretty(&self.document)
            .map_err(|e| HoloTutsError::Io(e.to_string()))?;
        append_run_log(
            "debug",
            "tutorial_store.save",
            json!({
                "path": self.document_path.display().to_string(),
                "bytes": contents.len(),
                "background": self.writer.is_background(),
            }),
        );
        self.writer.write(&self.document_path, contents)
    }
}

pub fn step_id(tutorial_id: &str, number: u32) -> String {
    format!("{tutorial_id}_step_{number}")
}

pub fn step_name(number: u32) -> String {
    format!("Step {number}")
}

fn parse_document(contents: &str) -> StoreResult<TutorialDocument> {
    if contents.trim().is_empty() {
        return Err(HoloTutsError::StoreCorrupt(
            "tutorial document is empty".to_string(),
        ));
    }
    let mut document: TutorialDocument =
        serde_json::from_str(contents).map_err(|e| HoloTutsError::StoreCorrupt(e.to_string()))?;
    if document.schema_version != SCHEMA_VERSION {
        return Err(HoloTutsError::StoreCorrupt(format!(
            "unsupported schema version {} (expected {SCHEMA_VERSION})",
            document.schema_version
        )));
    }

    let mut tutorial_ids = HashSet::new();
    for tutorial in &mut document.tutorials {
        if !tutorial_ids.insert(tutorial.id.clone()) {
            return Err(HoloTutsError::StoreCorrupt(format!(
                "duplicate tutorial id {}",
                tutorial.id
            )));
        }
        let mut step_ids = HashSet::new();
        for step in &tutorial.steps {
            if !step_ids.insert(step.id.as_str()) {
                return Err(HoloTutsError::StoreCorrupt(format!(
                    "duplicate step id {} in {}",
                    step.id, tutorial.id
                )));
            }
        }
        let highest_step = tutorial.steps.iter().map(|s| s.number).max().unwrap_or(0);
        tutorial.last_step_number = tutorial.last_step_number.max(highest_step);
    }

    let highest_tutorial = document
        .tutorials
        .iter()
        .map(|t| t.number)
        .max()
        .unwrap_or(0);
    document.last_tutorial_number = document.last_tutorial_number.max(highest_tutorial);
    Ok(document)
}

/// One step shifted down by the renumber policy: its index after the removal,
/// new number and id, and the video move if the file is named after the step.
struct RenumberItem {
    index: usize,
    number: u32,
    id: String,
    video: Option<(PathBuf, PathBuf)>,
}

fn renumber_plan(tutorial: &Tutorial, removed_index: usize) -> Vec<RenumberItem> {
    tutorial
        .steps
        .iter()
        .enumerate()
        .skip(removed_index + 1)
        .filter_map(|(old_index, step)| {
            let index = old_index - 1;
            let number = index as u32 + 1;
            if step.number == number {
                return None;
            }
            let id = step_id(&tutorial.id, number);
            let video = step.video_file_path.as_deref().and_then(|old_path| {
                renamed_video_path(old_path, &step.id, &id)
                    .map(|new_path| (PathBuf::from(old_path), new_path))
            });
            Some(RenumberItem {
                index,
                number,
                id,
                video,
            })
        })
        .collect()
}

/// Renames files in order. On failure the moves already made are undone in
/// reverse and the error is returned.
fn apply_moves(
    fs: &dyn FileSystem,
    moves: &[(PathBuf, PathBuf)],
    step_id: &str,
) -> StoreResult<()> {
    for (done, (from, to)) in moves.iter().enumerate() {
        let Err(error) = fs.rename(from, to) else {
            continue;
        };
        append_run_log(
            "error",
            "tutorial_store.renumber_failed",
            json!({
                "step_id": step_id,
                "from": from.display().to_string(),
                "to": to.display().to_string(),
                "error": error.to_string(),
            }),
        );
        for (from, to) in moves[..done].iter().rev() {
            if let Err(undo_error) = fs.rename(to, from) {
                append_run_log(
                    "error",
                    "tutorial_store.renumber_undo_failed",
                    json!({
                        "from": to.display().to_string(),
                        "to": from.display().to_string(),
                        "error": undo_error.to_string(),
                    }),
                );
            }
        }
        return Err(error);
    }
    Ok(())
}

/// New path for a renumbered step's video, if the file is named after the step.
fn renamed_video_path(old_path: &str, old_id: &str, new_id: &str) -> Option<PathBuf> {
    let old_path = Path::new(old_path);
    let file_name = old_path.file_name()?.to_str()?;
    if file_name != video_file_name(old_id) {
        return None;
    }
    Some(old_path.with_file_name(video_file_name(new_id)))
}

fn string_value(key: &str, value: Value) -> StoreResult<String> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(HoloTutsError::InvalidArgument(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

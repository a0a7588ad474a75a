//! Text shown on tooltips and list buttons, derived from stored records.

use crate::tutorial_store::{StepDetails, Tutorial};

pub const TRANSCRIPT_PREVIEW_CHARS: usize = 15;

/// First [`TRANSCRIPT_PREVIEW_CHARS`] characters of a transcript followed by `...`.
pub fn transcript_preview(transcript: &str) -> String {
    let preview = transcript
        .trim()
        .chars()
        .take(TRANSCRIPT_PREVIEW_CHARS)
        .collect::<String>();
    format!("{preview}...")
}

pub fn step_label(step: &StepDetails) -> String {
    match step.transcript.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            format!("{}: {}", step.name, transcript_preview(text))
        }
        _ => step.name.clone(),
    }
}

pub fn tutorial_label(tutorial: &Tutorial) -> String {
    let count = tutorial.steps.len();
    let noun = if count == 1 { "step" } else { "steps" };
    format!("{} ({count} {noun})", tutorial.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pose;

    fn step(transcript: Option<&str>) -> StepDetails {
        StepDetails {
            id: "tutorial_1_step_1".to_string(),
            number: 1,
            name: "Step 1".to_string(),
            global_pose: Pose::default(),
            video_file_path: Some("x.mp4".to_string()),
            transcript: transcript.map(str::to_string),
        }
    }

    #[test]
    fn label_appends_bounded_transcript_preview() {
        assert_eq!(step_label(&step(None)), "Step 1");
        assert_eq!(step_label(&step(Some("   "))), "Step 1");
        assert_eq!(step_label(&step(Some("hello world"))), "Step 1: hello world...");
        assert_eq!(
            step_label(&step(Some("open the left cabinet door slowly"))),
            "Step 1: open the left c..."
        );
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let preview = transcript_preview("ñandú ñandú ñandú ñandú");
        assert_eq!(preview.chars().count(), TRANSCRIPT_PREVIEW_CHARS + 3);
    }

    #[test]
    fn tutorial_label_pluralizes() {
        let mut tutorial = Tutorial {
            id: "tutorial_2".to_string(),
            number: 2,
            name: "Tutorial 2".to_string(),
            steps: vec![step(None)],
            last_step_number: 1,
        };
        assert_eq!(tutorial_label(&tutorial), "Tutorial 2 (1 step)");
        tutorial.steps.clear();
        assert_eq!(tutorial_label(&tutorial), "Tutorial 2 (0 steps)");
    }
}

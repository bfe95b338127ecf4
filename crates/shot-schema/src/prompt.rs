//! Prompt layout shared by the trainer and the inference client.
//!
//! Training text and inference prompts must agree byte-for-byte up to the
//! output header, otherwise the fine-tuned model sees a prompt it never
//! learned to complete.

use crate::error::Result;
use crate::example::TrainingExample;

pub const INPUT_HEADER: &str = "### 输入:";
pub const OUTPUT_HEADER: &str = "### 输出:";

/// Prompt sent to the model for one description.
pub fn inference_prompt(description: &str) -> String {
    format!("{INPUT_HEADER}\n{description}\n\n{OUTPUT_HEADER}\n")
}

/// Full supervised text for one example: prompt followed by compact JSON.
pub fn training_text(example: &TrainingExample) -> Result<String> {
    let output = serde_json::to_string(&example.output)?;
    Ok(format!("{}{}", inference_prompt(&example.input), output))
}

/// Cut a completion at the first new turn header the model may have
/// hallucinated after its answer. Only `###` at the start of a line counts.
pub fn strip_trailing_turns(completion: &str) -> &str {
    if completion.starts_with("###") {
        return "";
    }
    match completion.find("\n###") {
        Some(pos) => &completion[..=pos],
        None => completion,
    }
}

//! System prompt construction per tutoring mode.

use serde::{Deserialize, Serialize};

use edu_avatar_core::types::{ChatMessage, ChatRole};

const REVISION_INSTRUCTION: &str = "IMPORTANT: If the student makes specific edits or requests changes, \
provide the updated version of the essay in your response. Always include the full revised text \
when changes are made.";

/// Student details woven into the assessment and training prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentContext {
    pub course_info: Option<String>,
    pub course_info_assessment: Option<String>,
    pub current_topic: Option<String>,
    pub original_draft: Option<String>,
    pub final_draft: Option<String>,
}

fn or_placeholder<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => placeholder,
    }
}

fn draft_block(title: &str, draft: &Option<String>) -> String {
    format!("{title}:\n---\n{}\n---\n\n", or_placeholder(draft, "(empty)"))
}

fn student_details(course_info: &Option<String>, context: &StudentContext) -> String {
    format!(
        "These are the student information details:\nCourse Info: {}\nCurrent Topic: {}\n",
        or_placeholder(course_info, "(none)"),
        or_placeholder(&context.current_topic, "(none)"),
    )
}

/// Assessment mode: reviews a revision against the original draft.
pub fn assessment_prompt(base: &str, context: &StudentContext) -> String {
    let mut prompt = String::from(base);
    prompt.push_str(&student_details(&context.course_info_assessment, context));
    prompt.push_str(&draft_block("Original Draft", &context.original_draft));
    prompt.push_str(&draft_block("Current Revised Version", &context.final_draft));
    prompt.push_str(REVISION_INSTRUCTION);
    prompt
}

/// Training mode: coaches from the original and final drafts.
pub fn training_prompt(base: &str, context: &StudentContext) -> String {
    let mut prompt = String::from(base);
    prompt.push_str(&student_details(&context.course_info, context));
    prompt.push_str(&draft_block("Original Draft", &context.original_draft));
    prompt.push_str(&draft_block("Final Draft", &context.final_draft));
    prompt
}

/// Render recent turns as `User: ...` / `AI: ...` lines after `base`.
pub fn bullet_points_prompt(base: &str, recent: &[ChatMessage]) -> String {
    let transcript = recent
        .iter()
        .map(|msg| {
            let speaker = match msg.role {
                ChatRole::User => "User",
                _ => "AI",
            };
            format!("{speaker}: {}", msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{base}{transcript}")
}

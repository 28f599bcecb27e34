//! Agent instructions bundled at compile time, and the messages that carry
//! earlier stage outputs into later stages.

/// Research agent instructions
pub const RESEARCH: &str = include_str!("defaults/research.md");

/// Critique agent instructions
pub const CRITIQUE: &str = include_str!("defaults/critique.md");

/// Final report agent instructions
pub const FINAL_REPORT: &str = include_str!("defaults/final_report.md");

/// Opening message of a critique invocation
pub fn critique_message(query: &str, research: &str) -> String {
    format!(
        "Please critique the following research report for the original query: '{}'\n\n\
         Research Content:\n{}\n\n\
         Provide a comprehensive critique analyzing factual accuracy, source quality, \
         completeness, and any gaps or biases.",
        query, research
    )
}

/// Opening message of a final report invocation
pub fn final_report_message(query: &str, research: &str, critique: Option<&str>) -> String {
    let critique = critique.unwrap_or("No critique was performed for this run.");
    format!(
        "Please create a comprehensive final markdown report that synthesizes the research \
         findings and critique analysis.\n\n\
         Original Research Query: '{}'\n\n\
         RESEARCH CONTENT:\n{}\n\n\
         CRITIQUE ANALYSIS:\n{}\n\n\
         The inputs end with token usage statistics listing each model and its token counts. \
         Extract every model, look up its current pricing, and include a cost estimate for \
         the whole workflow.",
        query, research, critique
    )
}

/// Message a handed-off agent starts from
pub fn handoff_message(
    original_instruction: &str,
    transcript: &str,
    guidance: Option<&str>,
) -> String {
    let mut msg = format!(
        "You have been handed control by another agent.\n\nOriginal request:\n{}\n",
        original_instruction
    );
    if !transcript.trim().is_empty() {
        msg.push_str(&format!("\nWork so far:\n{}\n", transcript));
    }
    if let Some(guidance) = guidance.filter(|g| !g.trim().is_empty()) {
        msg.push_str(&format!("\nGuidance:\n{}\n", guidance));
    }
    msg
}

//! Chat prompt rendering.

/// Instructions placed ahead of the conversation history.
pub const PREAMBLE: &str = "\
You are an AI Assistant that writes high-quality content for a wide variety of tasks.

Use the context you are given. When the conversation history or reference material shows a \
preferred writing style, tone or format, follow it.

Keep the user's goal in focus: be concise, well-structured and accurate.

Only use information from the conversation history and the user's message. If you do not know \
the answer to a question, say so truthfully instead of guessing.";

/// Renders the prompt for `message`, with `history` holding earlier turns as
/// `Human: ...` / `Assistant: ...` lines.
pub fn render_prompt(message: &str, history: &str) -> String {
    let mut prompt = String::with_capacity(PREAMBLE.len() + history.len() + message.len() + 32);
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");

    let history = history.trim();
    if !history.is_empty() {
        prompt.push_str(history);
        prompt.push('\n');
    }

    prompt.push_str("Human: ");
    prompt.push_str(message.trim());
    prompt.push_str("\nAssistant:");
    prompt
}

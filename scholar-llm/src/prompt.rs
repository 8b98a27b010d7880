//! Prompt templates for conversations and lessons.
//!
//! Templates use `{placeholder}` fields filled by [`render_template`].
//! The user prompts always carry a `Topic:` line; backends without a model
//! (the scripted one) read it back with [`scenario_topic`].

/// System prompt for a student's turn in a conversation.
pub const CONVERSATION_SYSTEM: &str = r"You are {name}, {role_description}.
Personality: {personality}.
Dialogue style: {dialogue_style}.
Goals: {goals}.

RULES:
- Stay in character.
- Reply with one or two sentences of speech only.
- Refer to your memories naturally, never list them.";

/// User prompt for a conversation turn.
pub const CONVERSATION_USER: &str = r"Location: {location} ({location_description})
Time: {time}
Topic: {topic}
You are talking with: {participants}

What you remember recently:
{memories}

Conversation so far:
{history}

Say your next line as {name}.";

/// System prompt for the expert giving a lesson.
pub const LESSON_SYSTEM: &str = r"You are {name}, the teacher of this class.
Personality: {personality}.
Teaching style: {dialogue_style}.

RULES:
- Teach one clear idea per turn.
- Guide students with questions instead of lecturing.
- Keep it under four sentences.";

/// User prompt for a lesson turn.
pub const LESSON_USER: &str = r"Location: {location} ({location_description})
Time: {time}
Topic: {topic}
Students present: {participants}
Key fact to teach: {fact}

What you remember recently:
{memories}

Conversation so far:
{history}

Give the next part of the lesson as {name}.";

/// Used when generation fails during an ordinary conversation.
pub const FALLBACK_TURN: &str = "{name} chats with {participants} about {topic}.";

/// Used when generation fails during a lesson.
pub const FALLBACK_LESSON: &str = "{name} explains {topic}: {fact}";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value in a single pass over the
/// template; inserted values are never scanned again. Unknown placeholders
/// are left as they are.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            result.push_str(&rest[open..]);
            return result;
        };
        let key = &after[..close];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => result.push_str(value),
            None => result.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    result.push_str(rest);
    result
}

/// The value of the first `Topic:` line in a rendered prompt.
#[must_use]
pub fn scenario_topic(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix("Topic:"))
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
}

/// Bullet list of memory contents, or a placeholder when there are none.
#[must_use]
pub fn format_memories<S: AsRef<str>>(memories: &[S]) -> String {
    if memories.is_empty() {
        return "(nothing yet)".to_string();
    }
    memories
        .iter()
        .map(|m| format!("- {}", m.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Speaker: line` transcript, or a placeholder for a fresh conversation.
#[must_use]
pub fn format_history<S: AsRef<str>, T: AsRef<str>>(turns: &[(S, T)]) -> String {
    if turns.is_empty() {
        return "(the conversation is just starting)".to_string();
    }
    turns
        .iter()
        .map(|(speaker, line)| format!("{}: {}", speaker.as_ref(), line.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_reads_topic_back() {
        let prompt = render_template(CONVERSATION_USER, &[("topic", "calculus")]);
        assert_eq!(scenario_topic(&prompt), Some("calculus"));
        assert_eq!(scenario_topic("no topic here"), None);
        assert_eq!(scenario_topic("Topic:   "), None);
    }

    #[test]
    fn inserted_values_are_not_substituted_again() {
        let rendered = render_template(
            "{name} recalls: {memories} ({fact})",
            &[("memories", "- Mei said {fact} and {name}"), ("name", "Lin"), ("fact", "x > 0")],
        );
        assert_eq!(rendered, "Lin recalls: - Mei said {fact} and {name} (x > 0)");
        assert_eq!(render_template("{unknown} and {", &[("name", "Lin")]), "{unknown} and {");
    }

    #[test]
    fn empty_lists_get_placeholders() {
        assert_eq!(format_memories::<&str>(&[]), "(nothing yet)");
        assert_eq!(format_memories(&["a", "b"]), "- a\n- b");
        assert_eq!(format_history(&[("Ana", "Hi")]), "Ana: Hi");
    }
}

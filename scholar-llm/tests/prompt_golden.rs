//! Prompt Golden Test Set.
//!
//! Curated variable sets for every template: the rendered prompt must carry
//! the persona and scenario details and leave no placeholder unresolved.

use scholar_llm::prompt;

struct GoldenCase {
    name: &'static str,
    template: &'static str,
    vars: Vec<(&'static str, &'static str)>,
    must_contain: Vec<&'static str>,
}

fn conversation_vars() -> Vec<(&'static str, &'static str)> {
    vec![
        ("name", "Lin"),
        ("role_description", "a curious first-year student"),
        ("personality", "outgoing, easily distracted"),
        ("dialogue_style", "casual, lots of questions"),
        ("goals", "pass the calculus exam"),
        ("location", "park"),
        ("location_description", "a quiet lawn behind the library"),
        ("time", "day 2 period 3"),
        ("topic", "derivatives"),
        ("participants", "Mei, Tao"),
        ("memories", "- learned the chain rule in class"),
        ("history", "Mei: Did you get the homework?"),
        ("fact", "the derivative measures instantaneous rate of change"),
    ]
}

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            name: "student_conversation_system",
            template: prompt::CONVERSATION_SYSTEM,
            vars: conversation_vars(),
            must_contain: vec!["Lin", "curious first-year", "casual"],
        },
        GoldenCase {
            name: "student_conversation_user",
            template: prompt::CONVERSATION_USER,
            vars: conversation_vars(),
            must_contain: vec!["park", "Topic: derivatives", "chain rule", "Mei: Did you"],
        },
        GoldenCase {
            name: "lesson_system",
            template: prompt::LESSON_SYSTEM,
            vars: conversation_vars(),
            must_contain: vec!["teacher", "Lin"],
        },
        GoldenCase {
            name: "lesson_user",
            template: prompt::LESSON_USER,
            vars: conversation_vars(),
            must_contain: vec!["Key fact to teach", "instantaneous rate of change", "Mei, Tao"],
        },
        GoldenCase {
            name: "fallback_turn",
            template: prompt::FALLBACK_TURN,
            vars: conversation_vars(),
            must_contain: vec!["Lin chats with Mei, Tao about derivatives."],
        },
        GoldenCase {
            name: "fallback_lesson",
            template: prompt::FALLBACK_LESSON,
            vars: conversation_vars(),
            must_contain: vec!["Lin explains derivatives"],
        },
    ]
}

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    for case in golden_cases() {
        let rendered = prompt::render_template(case.template, &case.vars);
        for needle in &case.must_contain {
            assert!(
                rendered.contains(needle),
                "{}: expected '{needle}' in rendered prompt:\n{rendered}",
                case.name
            );
        }
        let open = rendered.find('{');
        assert!(open.is_none(), "{}: unresolved placeholder in:\n{rendered}", case.name);
    }
}

#[test]
fn user_prompts_expose_topic() {
    for template in [prompt::CONVERSATION_USER, prompt::LESSON_USER] {
        let rendered = prompt::render_template(template, &conversation_vars());
        assert_eq!(prompt::scenario_topic(&rendered), Some("derivatives"));
    }
}

#[test]
fn system_prompts_have_character_instruction() {
    for template in [prompt::CONVERSATION_SYSTEM, prompt::LESSON_SYSTEM] {
        assert!(template.contains("RULES:"));
        assert!(template.contains("{name}"));
    }
}

//! Prompt construction per content type.
//!
//! Every builder is pure. Record-structured prompts embed the exact tag
//! grammar understood by [`crate::tagged_parser`], so the two must change together.

use crate::models::{ChatMessage, ChatRole, ContentType, Difficulty, GenerationRequest, ResponseFormat, SummaryStyle};
use crate::tagged_parser::Tag;

/// System and user prompt for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const MATH_RULES: &str = r#"MATH NOTATION RULES:
- Write inline math between single dollar signs, e.g. $x^2 + 1$.
- Write display math between double dollar signs, e.g. $$\int_0^1 x\,dx$$.
- Use \frac{a}{b} for fractions, \sqrt{x} for roots and \sum_{i=1}^{n} for sums.
- ABSOLUTELY NO \( \) or \[ \] delimiters."#;

/// Example text shown between angle brackets in the output grammars.
/// Models sometimes copy these verbatim; record repair strips exactly these.
pub const PLACEHOLDERS: &[&str] = &[
    "question text",
    "the correct answer, copied exactly from one of the options",
    "option 1",
    "option 2",
    "option 3",
    "option 4",
    "why the answer is correct",
    "term, question or prompt",
    "definition or answer",
    "short topic title",
    "one or two sentences on what the learner will study",
    "subject area, e.g. Mathematics",
    "Beginner, Intermediate or Advanced",
    "estimated study time, e.g. 20 min",
    "a single SF Symbol name, e.g. function",
];

const TUTOR_SYSTEM: &str = "You are a patient, encouraging study tutor. Explain ideas clearly, check understanding, and never invent facts.";
const GENERATOR_SYSTEM: &str = "You are an expert educator who creates accurate study material. You MUST follow the requested output format exactly.";

fn difficulty_instruction(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Beginner => "Target BEGINNER learners: use plain language, define every term, and test core facts only.",
        Difficulty::Intermediate => "Target INTERMEDIATE learners: assume the basics are known and test application of concepts.",
        Difficulty::Advanced => "Target ADVANCED learners: test deep understanding, edge cases and multi-step reasoning.",
    }
}

fn quiz_grammar() -> String {
    format!(
        r#"OUTPUT FORMAT (one tag per line, content on the following lines):
{question}
<question text>
{answer}
<the correct answer, copied exactly from one of the options>
{option}
<option 1>
{option}
<option 2>
{option}
<option 3>
{option}
<option 4>
{explanation}
<why the answer is correct>
{end}

RULES:
- Each question MUST have EXACTLY FOUR {option} entries.
- EXACTLY ONE option MUST be identical to the {answer} text.
- End EVERY question with {end}.
- ABSOLUTELY NO numbering, markdown headings or text outside the tags."#,
        question = Tag::Question.token(),
        answer = Tag::Answer.token(),
        option = Tag::Option.token(),
        explanation = Tag::Explanation.token(),
        end = Tag::End.token(),
    )
}

fn flashcard_grammar() -> String {
    format!(
        r#"OUTPUT FORMAT (one tag per line, content on the following lines):
{front}
<term, question or prompt>
{back}
<definition or answer>
{end}

RULES:
- Every card MUST have one {front} and one {back}.
- End EVERY card with {end}.
- ABSOLUTELY NO numbering, markdown headings or text outside the tags."#,
        front = Tag::Front.token(),
        back = Tag::Back.token(),
        end = Tag::End.token(),
    )
}

fn suggestion_grammar() -> String {
    format!(
        r#"OUTPUT FORMAT (one tag per line, content on the following lines):
{title}
<short topic title>
{description}
<one or two sentences on what the learner will study>
{category}
<subject area, e.g. Mathematics>
{difficulty}
<Beginner, Intermediate or Advanced>
{time}
<estimated study time, e.g. 20 min>
{icon}
<a single SF Symbol name, e.g. function>
{end}

RULES:
- End EVERY suggestion with {end}.
- ABSOLUTELY NO numbering, markdown or text outside the tags."#,
        title = Tag::Title.token(),
        description = Tag::Description.token(),
        category = Tag::Category.token(),
        difficulty = Tag::Difficulty.token(),
        time = Tag::EstimatedTime.token(),
        icon = Tag::Icon.token(),
        end = Tag::End.token(),
    )
}

pub fn summary_prompt(text: &str, style: SummaryStyle, word_count: u32) -> Prompt {
    let style_rule = match style {
        SummaryStyle::Paragraph => "Write flowing paragraphs. ABSOLUTELY NO bullet points or numbered lists.",
        SummaryStyle::Bullets => "Write ONLY bullet points starting with \"- \". ABSOLUTELY NO paragraphs of prose.",
    };

    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Summarize the study material below.

CONSTRAINTS:
- The summary MUST be about {word_count} words.
- {style_rule}
- Cover the most important ideas only. ABSOLUTELY NO preamble such as "Here is a summary".

{MATH_RULES}

MATERIAL:
{text}"#
        ),
    }
}

pub fn quiz_prompt(text: &str, count: usize, difficulty: Difficulty) -> Prompt {
    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Create EXACTLY {count} multiple-choice questions from the study material below.
{difficulty_rule}

{grammar}

{MATH_RULES}

MATERIAL:
{text}"#,
            difficulty_rule = difficulty_instruction(difficulty),
            grammar = quiz_grammar(),
        ),
    }
}

pub fn flashcards_prompt(text: &str, count: usize) -> Prompt {
    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Create EXACTLY {count} flashcards covering the key facts in the study material below.
Each card MUST test a single idea.

{grammar}

{MATH_RULES}

MATERIAL:
{text}"#,
            grammar = flashcard_grammar(),
        ),
    }
}

pub fn topic_guide_prompt(topic: &str, difficulty: Difficulty) -> Prompt {
    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Write a study guide on the topic: {topic}
{difficulty_rule}

CONSTRAINTS:
- Start with a one-paragraph overview, then cover key concepts, worked examples and common mistakes.
- Use markdown headings for each section.
- ABSOLUTELY NO preamble such as "Sure, here is a guide".

{MATH_RULES}"#,
            difficulty_rule = difficulty_instruction(difficulty),
        ),
    }
}

pub fn topic_quiz_prompt(topic: &str, count: usize, difficulty: Difficulty) -> Prompt {
    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Create EXACTLY {count} multiple-choice questions about the topic: {topic}
{difficulty_rule}

{grammar}

{MATH_RULES}"#,
            difficulty_rule = difficulty_instruction(difficulty),
            grammar = quiz_grammar(),
        ),
    }
}

pub fn topic_flashcards_prompt(topic: &str, count: usize, difficulty: Difficulty) -> Prompt {
    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Create EXACTLY {count} flashcards about the topic: {topic}
{difficulty_rule}

{grammar}

{MATH_RULES}"#,
            difficulty_rule = difficulty_instruction(difficulty),
            grammar = flashcard_grammar(),
        ),
    }
}

pub fn topic_suggestions_prompt(interests: &str, count: usize) -> Prompt {
    let focus = if interests.trim().is_empty() {
        "a broad mix of school and university subjects".to_string()
    } else {
        format!("a learner interested in: {}", interests.trim())
    };

    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Suggest EXACTLY {count} study topics for {focus}.
Each topic MUST be specific enough to study in one session.

{grammar}"#,
            grammar = suggestion_grammar(),
        ),
    }
}

/// System prompt for a tutor turn; the conversation itself is sent as messages
pub fn chat_system_prompt(context: &str, format: ResponseFormat) -> String {
    let format_rule = match format {
        ResponseFormat::Conversational => "Reply in a friendly conversational tone, in a few short paragraphs.",
        ResponseFormat::StepByStep => "Reply as numbered steps. Each step MUST contain one idea.",
        ResponseFormat::Concise => "Reply in at most three sentences. ABSOLUTELY NO filler.",
    };

    let context_block = if context.trim().is_empty() {
        String::new()
    } else {
        format!("\n\nSTUDY CONTEXT:\n{}", context.trim())
    };

    format!("{TUTOR_SYSTEM}\n\n{format_rule}\n\n{MATH_RULES}{context_block}")
}

pub fn chat_to_flashcards_prompt(conversation: &[ChatMessage], count: usize) -> Prompt {
    let transcript = conversation
        .iter()
        .filter(|message| message.role != ChatRole::System)
        .map(|message| {
            let speaker = match message.role {
                ChatRole::Assistant => "Tutor",
                _ => "Student",
            };
            format!("{}: {}", speaker, message.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: GENERATOR_SYSTEM.to_string(),
        user: format!(
            r#"Turn the tutoring conversation below into EXACTLY {count} flashcards.
Only use facts the tutor stated. ABSOLUTELY NO cards about small talk.

{grammar}

{MATH_RULES}

CONVERSATION:
{transcript}"#,
            grammar = flashcard_grammar(),
        ),
    }
}

/// Build the prompt for any request. For chat turns the user prompt is the
/// latest student message; the executor sends the full history separately.
pub fn build_prompt(request: &GenerationRequest) -> Prompt {
    let options = &request.options;
    match request.content_type {
        ContentType::Summary => summary_prompt(&request.source, options.style, options.word_count),
        ContentType::Quiz => quiz_prompt(&request.source, options.count, options.difficulty),
        ContentType::Flashcards => flashcards_prompt(&request.source, options.count),
        ContentType::TopicGuide => topic_guide_prompt(&request.source, options.difficulty),
        ContentType::TopicQuiz => topic_quiz_prompt(&request.source, options.count, options.difficulty),
        ContentType::TopicFlashcards => {
            topic_flashcards_prompt(&request.source, options.count, options.difficulty)
        }
        ContentType::TopicSuggestions => topic_suggestions_prompt(&request.source, options.count),
        ContentType::ChatTurn => Prompt {
            system: chat_system_prompt(&request.source, options.response_format),
            user: request.latest_user_message().unwrap_or_default().to_string(),
        },
        ContentType::ChatToFlashcards => chat_to_flashcards_prompt(&request.conversation, options.count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiz_prompt_embeds_grammar() {
        let prompt = quiz_prompt("Photosynthesis converts light into chemical energy.", 4, Difficulty::Beginner);
        for token in ["[QUESTION]", "[ANSWER]", "[OPTION]", "[EXPLANATION]", "[END]"] {
            assert!(prompt.user.contains(token), "missing {}", token);
        }
        assert!(prompt.user.contains("EXACTLY FOUR"));
        assert!(prompt.user.contains("EXACTLY 4 multiple-choice"));
        assert!(prompt.user.contains("BEGINNER"));
        assert!(prompt.user.contains("Photosynthesis"));
    }

    #[test]
    fn test_math_rules_present() {
        let prompt = flashcards_prompt("calculus", 3);
        assert!(prompt.user.contains("single dollar signs"));
        assert!(prompt.user.contains("\\frac"));
        assert!(prompt.user.contains("\\sqrt"));
        assert!(prompt.user.contains("\\sum"));
    }

    #[test]
    fn test_summary_style_constraints() {
        let bullets = summary_prompt("text", SummaryStyle::Bullets, 150);
        assert!(bullets.user.contains("ONLY bullet points"));
        assert!(bullets.user.contains("150 words"));

        let paragraph = summary_prompt("text", SummaryStyle::Paragraph, 300);
        assert!(paragraph.user.contains("ABSOLUTELY NO bullet points"));
    }

    #[test]
    fn test_suggestion_grammar() {
        let prompt = topic_suggestions_prompt("", 6);
        for token in ["[TITLE]", "[DESCRIPTION]", "[CATEGORY]", "[DIFFICULTY]", "[TIME]", "[ICON]", "[END]"] {
            assert!(prompt.user.contains(token), "missing {}", token);
        }
        assert!(prompt.user.contains("broad mix"));
    }

    #[test]
    fn test_chat_prompts() {
        let system = chat_system_prompt("Newton's laws", ResponseFormat::StepByStep);
        assert!(system.contains("numbered steps"));
        assert!(system.contains("Newton's laws"));

        let conversation = vec![
            ChatMessage::user("What is inertia?"),
            ChatMessage::assistant("Inertia is resistance to changes in motion."),
        ];
        let prompt = chat_to_flashcards_prompt(&conversation, 2);
        assert!(prompt.user.contains("Student: What is inertia?"));
        assert!(prompt.user.contains("Tutor: Inertia is resistance"));
        assert!(prompt.user.contains("[FRONT]"));
    }

    #[test]
    fn test_every_grammar_placeholder_is_listed() {
        let placeholder = regex::Regex::new(r"<([^<>\n]+)>").unwrap();
        for grammar in [quiz_grammar(), flashcard_grammar(), suggestion_grammar()] {
            for caps in placeholder.captures_iter(&grammar) {
                assert!(PLACEHOLDERS.contains(&&caps[1]), "unlisted placeholder <{}>", &caps[1]);
            }
        }
    }

    #[test]
    fn test_build_prompt_chat_uses_latest_user_turn() {
        let request = GenerationRequest::chat_turn(
            "",
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
            ResponseFormat::Concise,
        );
        let prompt = build_prompt(&request);
        assert_eq!(prompt.user, "second");
        assert!(prompt.system.contains("at most three sentences"));
    }
}

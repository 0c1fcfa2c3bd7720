//! Post-parse invariant enforcement.
//!
//! Parsed records are salvaged where possible: math delimiters are unified,
//! prompt placeholders stripped, and quiz option sets forced to exactly four
//! distinct entries containing the answer. Anything that cannot be salvaged
//! is dropped.

use rand::seq::SliceRandom;
use rand::Rng;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::log_validation;
use crate::models::{Flashcard, QuizQuestion, TopicSuggestion};
use crate::prompts::PLACEHOLDERS;
use crate::tagged_parser::{ParsedRecord, Tag};

pub const OPTION_COUNT: usize = 4;

pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_DIFFICULTY: &str = "Beginner";
pub const DEFAULT_ESTIMATED_TIME: &str = "15 min";
pub const DEFAULT_ICON: &str = "book";

static DISPLAY_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\\[(.*?)\\\]").expect("display math pattern is valid"));
static INLINE_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\\((.*?)\\\)").expect("inline math pattern is valid"));
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = PLACEHOLDERS
        .iter()
        .map(|text| regex::escape(text).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)<\s*(?:{})\s*>", alternatives)).expect("placeholder pattern is valid")
});

/// `\[...\]` becomes `$$...$$` and `\(...\)` becomes `$...$`. Unbalanced delimiters are left alone.
pub fn normalize_math(text: &str) -> String {
    let display = DISPLAY_MATH.replace_all(text, |caps: &Captures| format!("$${}$$", &caps[1]));
    INLINE_MATH
        .replace_all(&display, |caps: &Captures| format!("${}$", &caps[1]))
        .into_owned()
}

/// Remove grammar placeholders (`<question text>`, `<option 1>`, ...) copied from the prompt.
/// Any other angle-bracket text, such as `x<y` or `Vec<String>`, is content and stays.
pub fn strip_placeholders(text: &str) -> String {
    PLACEHOLDER.replace_all(text, "").into_owned()
}

/// Collapse whitespace runs and trim. Only used for comparisons.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalized_eq(a: &str, b: &str) -> bool {
    normalize_whitespace(a) == normalize_whitespace(b)
}

/// Full cleanup applied to every stored field
pub fn clean_field(text: &str) -> String {
    normalize_math(&strip_placeholders(text)).trim().to_string()
}

/// Force `options` to exactly four distinct entries including `answer`, in shuffled order.
///
/// The answer (or the option matching it) is moved to the front before
/// truncation so it always survives; padding uses numbered placeholders.
pub fn repair_options<R: Rng + ?Sized>(answer: &str, options: &[String], rng: &mut R) -> Vec<String> {
    let mut repaired: Vec<String> = Vec::with_capacity(OPTION_COUNT);

    for option in options {
        let option = option.trim();
        if option.is_empty() || repaired.iter().any(|kept| normalized_eq(kept, option)) {
            continue;
        }
        repaired.push(option.to_string());
    }

    match repaired.iter().position(|option| normalized_eq(option, answer)) {
        Some(index) => {
            let matching = repaired.remove(index);
            repaired.insert(0, matching);
        }
        None => repaired.insert(0, answer.trim().to_string()),
    }

    repaired.truncate(OPTION_COUNT);

    let mut filler = 1;
    while repaired.len() < OPTION_COUNT {
        let candidate = format!("None of the above ({})", filler);
        filler += 1;
        if !repaired.iter().any(|kept| normalized_eq(kept, &candidate)) {
            repaired.push(candidate);
        }
    }

    repaired.shuffle(rng);
    repaired
}

fn cleaned(record: &ParsedRecord, tag: Tag) -> Option<String> {
    record
        .get(tag)
        .map(clean_field)
        .filter(|value| !value.is_empty())
}

pub fn to_quiz_question<R: Rng + ?Sized>(record: &ParsedRecord, rng: &mut R) -> Option<QuizQuestion> {
    let (Some(question), Some(answer)) = (cleaned(record, Tag::Question), cleaned(record, Tag::Answer)) else {
        log_validation!(dropped, "record_repair", reason = "quiz question or answer empty after cleanup");
        return None;
    };

    let options: Vec<String> = record.values(Tag::Option).iter().map(|option| clean_field(option)).collect();
    let options = repair_options(&answer, &options, rng);

    Some(QuizQuestion {
        question,
        answer,
        options,
        explanation: cleaned(record, Tag::Explanation),
    })
}

pub fn to_flashcard(record: &ParsedRecord) -> Option<Flashcard> {
    match (cleaned(record, Tag::Front), cleaned(record, Tag::Back)) {
        (Some(front), Some(back)) => Some(Flashcard { front, back }),
        _ => {
            log_validation!(dropped, "record_repair", reason = "flashcard side empty after cleanup");
            None
        }
    }
}

pub fn to_topic_suggestion(record: &ParsedRecord) -> Option<TopicSuggestion> {
    let (Some(title), Some(description)) = (cleaned(record, Tag::Title), cleaned(record, Tag::Description)) else {
        log_validation!(dropped, "record_repair", reason = "suggestion title or description empty after cleanup");
        return None;
    };

    Some(TopicSuggestion {
        title,
        description,
        category: cleaned(record, Tag::Category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        difficulty: cleaned(record, Tag::Difficulty).unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
        estimated_time: cleaned(record, Tag::EstimatedTime)
            .unwrap_or_else(|| DEFAULT_ESTIMATED_TIME.to_string()),
        icon: cleaned(record, Tag::Icon)
            .map(|icon| icon.split_whitespace().next().unwrap_or(DEFAULT_ICON).to_string())
            .unwrap_or_else(|| DEFAULT_ICON.to_string()),
    })
}

/// Cleanup for free-text outputs (summaries, guides, tutor replies)
pub fn repair_text(text: &str) -> Option<String> {
    let repaired = normalize_math(text).trim().to_string();
    (!repaired.is_empty()).then_some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_normalize_math() {
        let text = r"Area is \(x^2\) and \[\int f\] done";
        let normalized = normalize_math(text);
        assert_eq!(normalized, "Area is $x^2$ and $$\\int f$$ done");
        assert!(!normalized.contains("\\("));
        assert!(!normalized.contains("\\["));
    }

    #[test]
    fn test_normalize_math_leaves_unbalanced() {
        assert_eq!(normalize_math(r"open \( only"), r"open \( only");
        assert_eq!(normalize_math("already $x$"), "already $x$");
    }

    #[test]
    fn test_strip_placeholders() {
        assert_eq!(strip_placeholders("<question text>What is 2+2?"), "What is 2+2?");
        assert_eq!(strip_placeholders("a < b and c > d"), "a < b and c > d");
    }

    #[test]
    fn test_strip_placeholders_keeps_angle_bracket_content() {
        for text in [
            "Which is true if x<y and y>z?",
            "If $a<b$ and $c>d$ then compare.",
            "Vec<String> holds text; Option<T> may be None",
            "<html> is a tag",
        ] {
            assert_eq!(strip_placeholders(text), text);
            assert_eq!(clean_field(text), text);
        }

        assert_eq!(strip_placeholders("<Option  1>Paris"), "Paris");
        assert_eq!(
            strip_placeholders("Rome <the correct answer, copied exactly from one of the options>"),
            "Rome "
        );
    }

    #[test]
    fn test_quiz_question_with_inequalities_survives() {
        let mut record = ParsedRecord::default();
        record.set(Tag::Question, "Which is true if x<y and y>z?");
        record.set(Tag::Answer, "x<z");
        record.set(Tag::Option, "x<z");
        record.set(Tag::Option, "x>z");

        let question = to_quiz_question(&record, &mut rng()).unwrap();
        assert_eq!(question.question, "Which is true if x<y and y>z?");
        assert_eq!(question.answer, "x<z");
        assert!(question.options.contains(&"x>z".to_string()));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  c "), "a b c");
        assert!(normalized_eq("O(log  n)", " O(log n)\n"));
    }

    #[test]
    fn test_answer_not_among_options() {
        let original = strings(&["P", "Q", "R"]);
        let options = repair_options("X", &original, &mut rng());
        assert_eq!(options.len(), 4);
        assert!(options.contains(&"X".to_string()));
        let others: HashSet<_> = options.iter().filter(|o| *o != "X").cloned().collect();
        let allowed: HashSet<_> = original.iter().cloned().collect();
        assert!(others.is_subset(&allowed));
    }

    #[test]
    fn test_padding_and_truncation() {
        let padded = repair_options("A", &strings(&["A", "B"]), &mut rng());
        assert_eq!(padded.len(), 4);
        assert_eq!(padded.iter().filter(|o| o.starts_with("None of the above")).count(), 2);

        let truncated = repair_options("F", &strings(&["A", "B", "C", "D", "E", "F"]), &mut rng());
        assert_eq!(truncated.len(), 4);
        assert!(truncated.contains(&"F".to_string()));
    }

    #[test]
    fn test_duplicates_removed() {
        let options = repair_options("A", &strings(&["A", "A ", "B", "B", "C", ""]), &mut rng());
        let unique: HashSet<_> = options.iter().map(|o| normalize_whitespace(o)).collect();
        assert_eq!(options.len(), 4);
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_whitespace_variant_answer_not_duplicated() {
        let options = repair_options("O(log n)", &strings(&["O(log  n)", "O(n)", "O(1)", "O(n^2)"]), &mut rng());
        assert_eq!(options.len(), 4);
        assert!(options.iter().any(|o| normalized_eq(o, "O(log n)")));
        assert!(!options.contains(&"O(log n)".to_string()) || !options.contains(&"O(log  n)".to_string()));
    }

    #[test]
    fn test_option_invariant_holds_for_many_inputs() {
        let mut rng = rng();
        let cases: Vec<(&str, Vec<String>)> = vec![
            ("a", vec![]),
            ("a", strings(&["a"])),
            ("b", strings(&["a", "c", "d", "e", "f", "g", "b"])),
            ("x", strings(&["", " ", "x"])),
        ];
        for (answer, options) in cases {
            let repaired = repair_options(answer, &options, &mut rng);
            assert_eq!(repaired.len(), OPTION_COUNT);
            assert!(repaired.iter().any(|o| normalized_eq(o, answer)));
        }
    }

    #[test]
    fn test_to_quiz_question_strips_placeholders() {
        let mut record = ParsedRecord::default();
        record.set(Tag::Question, "<question text>");
        record.set(Tag::Answer, "4");
        assert!(to_quiz_question(&record, &mut rng()).is_none());

        record.set(Tag::Question, r"What is \(2+2\)?");
        let question = to_quiz_question(&record, &mut rng()).unwrap();
        assert_eq!(question.question, "What is $2+2$?");
        assert_eq!(question.options.len(), 4);
        assert!(question.explanation.is_none());
    }

    #[test]
    fn test_to_topic_suggestion_defaults() {
        let mut record = ParsedRecord::default();
        record.set(Tag::Title, "Cell Biology");
        record.set(Tag::Description, "Organelles and their jobs.");
        let suggestion = to_topic_suggestion(&record).unwrap();
        assert_eq!(suggestion.category, DEFAULT_CATEGORY);
        assert_eq!(suggestion.icon, DEFAULT_ICON);
        assert_eq!(suggestion.estimated_time, DEFAULT_ESTIMATED_TIME);
    }

    #[test]
    fn test_repair_text() {
        assert_eq!(repair_text("  \\(a\\)  ").as_deref(), Some("$a$"));
        assert!(repair_text("   ").is_none());
    }
}

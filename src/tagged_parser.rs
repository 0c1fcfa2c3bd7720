//! Tolerant parser for the tag-delimited record format emitted by the model.
//!
//! The format is one bracketed tag per line followed by free text, with a
//! terminator tag closing each record. Models routinely break it: tags inline
//! with content, lowercase tags, `[/TAG]` closers, missing terminators. A
//! normalization pre-pass maps all of those onto canonical tag lines before the
//! line scanner runs.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::errors::AIError;
use crate::log_validation;

/// Every tag the grammar knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    Question,
    Answer,
    Option,
    Explanation,
    Front,
    Back,
    Title,
    Description,
    Category,
    Difficulty,
    EstimatedTime,
    Icon,
    End,
}

impl Tag {
    pub const ALL: [Tag; 13] = [
        Tag::Question,
        Tag::Answer,
        Tag::Option,
        Tag::Explanation,
        Tag::Front,
        Tag::Back,
        Tag::Title,
        Tag::Description,
        Tag::Category,
        Tag::Difficulty,
        Tag::EstimatedTime,
        Tag::Icon,
        Tag::End,
    ];

    /// Canonical spelling, as written in prompts
    pub fn token(&self) -> &'static str {
        match self {
            Tag::Question => "[QUESTION]",
            Tag::Answer => "[ANSWER]",
            Tag::Option => "[OPTION]",
            Tag::Explanation => "[EXPLANATION]",
            Tag::Front => "[FRONT]",
            Tag::Back => "[BACK]",
            Tag::Title => "[TITLE]",
            Tag::Description => "[DESCRIPTION]",
            Tag::Category => "[CATEGORY]",
            Tag::Difficulty => "[DIFFICULTY]",
            Tag::EstimatedTime => "[TIME]",
            Tag::Icon => "[ICON]",
            Tag::End => "[END]",
        }
    }

    /// Regex alternatives for the tag name (inside the brackets)
    fn name_pattern(&self) -> &'static str {
        match self {
            Tag::Question => r"QUESTION",
            Tag::Answer => r"(?:CORRECT[\s_]*)?ANSWER",
            Tag::Option => r"OPTION(?:[\s_]*[A-D1-4])?",
            Tag::Explanation => r"EXPLANATION",
            Tag::Front => r"FRONT",
            Tag::Back => r"BACK",
            Tag::Title => r"TITLE",
            Tag::Description => r"DESCRIPTION",
            Tag::Category => r"CATEGORY",
            Tag::Difficulty => r"DIFFICULTY",
            Tag::EstimatedTime => r"(?:ESTIMATED[\s_]*)?TIME",
            Tag::Icon => r"ICON",
            Tag::End => r"END",
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Tag::Option)
    }
}

/// Matches any spelling of a tag, optionally wrapped in markdown emphasis.
/// Group 1 is the closing slash, if any.
static TAG_PATTERNS: LazyLock<Vec<(Tag, Regex)>> = LazyLock::new(|| {
    Tag::ALL
        .iter()
        .filter_map(|tag| {
            let pattern = format!(r"(?i)[*_]*\[\s*(/?)\s*{}\s*\][*_]*", tag.name_pattern());
            Regex::new(&pattern).ok().map(|regex| (*tag, regex))
        })
        .collect()
});

/// Which tags a content type uses and which of them make a record valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    pub tags: &'static [Tag],
    pub required: &'static [Tag],
    /// Seeing this tag again on a complete record starts a new record
    pub lead: Tag,
    pub terminator: Tag,
}

pub const QUIZ_SCHEMA: RecordSchema = RecordSchema {
    tags: &[Tag::Question, Tag::Answer, Tag::Option, Tag::Explanation],
    required: &[Tag::Question, Tag::Answer],
    lead: Tag::Question,
    terminator: Tag::End,
};

pub const FLASHCARD_SCHEMA: RecordSchema = RecordSchema {
    tags: &[Tag::Front, Tag::Back],
    required: &[Tag::Front, Tag::Back],
    lead: Tag::Front,
    terminator: Tag::End,
};

pub const SUGGESTION_SCHEMA: RecordSchema = RecordSchema {
    tags: &[
        Tag::Title,
        Tag::Description,
        Tag::Category,
        Tag::Difficulty,
        Tag::EstimatedTime,
        Tag::Icon,
    ],
    required: &[Tag::Title, Tag::Description],
    lead: Tag::Title,
    terminator: Tag::End,
};

impl RecordSchema {
    fn recognizes(&self, tag: Tag) -> bool {
        tag == self.terminator || self.tags.contains(&tag)
    }

    fn field_for_line(&self, line: &str) -> Option<Tag> {
        self.tags.iter().copied().find(|tag| tag.token() == line)
    }

    fn is_complete(&self, record: &ParsedRecord) -> bool {
        self.required.iter().all(|tag| record.has(*tag))
    }
}

/// One record as a mapping from tag to its values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    fields: BTreeMap<Tag, Vec<String>>,
}

impl ParsedRecord {
    /// Last value written for `tag`
    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.fields
            .get(&tag)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    pub fn values(&self, tag: Tag) -> &[String] {
        self.fields.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, tag: Tag) -> bool {
        self.get(tag).is_some_and(|value| !value.trim().is_empty())
    }

    pub fn set(&mut self, tag: Tag, value: impl Into<String>) {
        let value = value.into();
        if tag.is_multi_valued() {
            self.fields.entry(tag).or_default().push(value);
        } else {
            self.fields.insert(tag, vec![value]);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Write the record back in the tag grammar, fields in schema order
    pub fn to_tagged(&self, schema: &RecordSchema) -> String {
        let mut out = String::new();
        for tag in schema.tags {
            for value in self.values(*tag) {
                out.push_str(tag.token());
                out.push('\n');
                out.push_str(value);
                out.push('\n');
            }
        }
        out.push_str(schema.terminator.token());
        out.push('\n');
        out
    }
}

/// Force every recognized tag onto its own line in canonical form.
/// Closing variants of field tags are dropped; a closing terminator still terminates.
pub fn normalize_tags(raw: &str, schema: &RecordSchema) -> String {
    let mut text = raw.replace("\r\n", "\n");

    for (tag, regex) in TAG_PATTERNS.iter() {
        if !schema.recognizes(*tag) {
            continue;
        }

        text = regex
            .replace_all(&text, |caps: &Captures| {
                let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
                if closing && *tag != schema.terminator {
                    "\n".to_string()
                } else {
                    format!("\n{}\n", tag.token())
                }
            })
            .into_owned();
    }

    text
}

/// Parse raw model output into records valid under `schema`.
///
/// Returns `ParsingFailed` when nothing usable was found, so "the model
/// produced junk" is never confused with "there was nothing to generate".
pub fn parse(raw: &str, schema: &RecordSchema) -> Result<Vec<ParsedRecord>, AIError> {
    let normalized = normalize_tags(raw, schema);
    let mut records = Vec::new();

    for segment in normalized.split(schema.terminator.token()) {
        if segment.trim().is_empty() {
            continue;
        }
        parse_segment(segment, schema, &mut records);
    }

    if records.is_empty() {
        return Err(AIError::ParsingFailed);
    }

    Ok(records)
}

fn parse_segment(segment: &str, schema: &RecordSchema, out: &mut Vec<ParsedRecord>) {
    let mut current = ParsedRecord::default();
    let mut active: Option<Tag> = None;
    let mut accumulator = String::new();

    for line in segment.lines() {
        match schema.field_for_line(line.trim()) {
            Some(tag) => {
                flush(&mut current, active, &accumulator);
                accumulator.clear();

                // Models that skip the terminator still get one record per pair
                if tag == schema.lead && schema.is_complete(&current) {
                    emit(std::mem::take(&mut current), schema, out);
                }
                active = Some(tag);
            }
            None => {
                if active.is_some() {
                    accumulator.push_str(line);
                    accumulator.push('\n');
                }
            }
        }
    }

    flush(&mut current, active, &accumulator);
    emit(current, schema, out);
}

fn flush(record: &mut ParsedRecord, active: Option<Tag>, accumulator: &str) {
    let Some(tag) = active else {
        return;
    };

    let content = accumulator.trim();
    if !content.is_empty() {
        record.set(tag, content);
    }
}

fn emit(record: ParsedRecord, schema: &RecordSchema, out: &mut Vec<ParsedRecord>) {
    if record.is_empty() {
        return;
    }

    if schema.is_complete(&record) {
        out.push(record);
    } else {
        log_validation!(dropped, "tagged_parser", reason = "missing required field");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_quiz() {
        let raw = "[QUESTION]\nWhat is 2+2?\n[ANSWER]\n4\n[OPTION]\n3\n[OPTION]\n4\n[OPTION]\n5\n[OPTION]\n22\n[EXPLANATION]\nBasic addition.\n[END]\n";
        let records = parse(raw, &QUIZ_SCHEMA).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Tag::Question), Some("What is 2+2?"));
        assert_eq!(records[0].get(Tag::Answer), Some("4"));
        assert_eq!(records[0].values(Tag::Option), ["3", "4", "5", "22"]);
        assert_eq!(records[0].get(Tag::Explanation), Some("Basic addition."));
    }

    #[test]
    fn test_inline_and_lowercase_tags() {
        let raw = "[front] Mitochondria [Back] Powerhouse of the cell [end][ FRONT ]DNA[BACK]Genetic material[END]";
        let records = parse(raw, &FLASHCARD_SCHEMA).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(Tag::Front), Some("Mitochondria"));
        assert_eq!(records[0].get(Tag::Back), Some("Powerhouse of the cell"));
        assert_eq!(records[1].get(Tag::Front), Some("DNA"));
    }

    #[test]
    fn test_missing_terminator_flashcards() {
        let records = parse("[FRONT]A[BACK]B[FRONT]C[BACK]D", &FLASHCARD_SCHEMA).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(Tag::Front), Some("A"));
        assert_eq!(records[0].get(Tag::Back), Some("B"));
        assert_eq!(records[1].get(Tag::Front), Some("C"));
        assert_eq!(records[1].get(Tag::Back), Some("D"));
    }

    #[test]
    fn test_closing_variants_and_emphasis() {
        let raw = "**[QUESTION]** Capital of France? [/QUESTION]\n[ANSWER]Paris[/ANSWER]\n[OPTION A] Paris\n[option_b] Rome\n[/END]";
        let records = parse(raw, &QUIZ_SCHEMA).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Tag::Question), Some("Capital of France?"));
        assert_eq!(records[0].get(Tag::Answer), Some("Paris"));
        assert_eq!(records[0].values(Tag::Option), ["Paris", "Rome"]);
    }

    #[test]
    fn test_multiline_field_content() {
        let raw = "[FRONT]\nNewton's laws\n[BACK]\n1. Inertia\n2. F = ma\n3. Action/reaction\n[END]";
        let records = parse(raw, &FLASHCARD_SCHEMA).unwrap();
        assert_eq!(records[0].get(Tag::Back), Some("1. Inertia\n2. F = ma\n3. Action/reaction"));
    }

    #[test]
    fn test_records_missing_required_fields_are_dropped() {
        let raw = "[QUESTION]\nNo answer here\n[OPTION]\nA\n[END]\n[QUESTION]\nHas answer\n[ANSWER]\nYes\n[END]\n[QUESTION]\n\n[ANSWER]\nOrphan\n[END]";
        let records = parse(raw, &QUIZ_SCHEMA).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Tag::Question), Some("Has answer"));
    }

    #[test]
    fn test_zero_records_is_parsing_failure() {
        assert_eq!(parse("", &QUIZ_SCHEMA), Err(AIError::ParsingFailed));
        assert_eq!(
            parse("Sorry, I can't help with that.", &FLASHCARD_SCHEMA),
            Err(AIError::ParsingFailed)
        );
        assert_eq!(parse("[FRONT]\nonly a front\n[END]", &FLASHCARD_SCHEMA), Err(AIError::ParsingFailed));
    }

    #[test]
    fn test_preamble_is_ignored() {
        let raw = "Here are your cards:\n[FRONT]\nQ\n[BACK]\nA\n[END]\nHope this helps!";
        let records = parse(raw, &FLASHCARD_SCHEMA).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_unrecognized_tags_stay_as_text() {
        let raw = "[FRONT]\nTerm [OPTION] inside\n[BACK]\nDef\n[END]";
        let records = parse(raw, &FLASHCARD_SCHEMA).unwrap();
        assert_eq!(records[0].get(Tag::Front), Some("Term [OPTION] inside"));
    }

    #[test]
    fn test_suggestion_schema_aliases() {
        let raw = "[TITLE]\nLinear Algebra\n[DESCRIPTION]\nVectors and matrices.\n[CATEGORY]\nMathematics\n[DIFFICULTY]\nIntermediate\n[ESTIMATED TIME]\n30 min\n[ICON]\nfunction\n[END]";
        let records = parse(raw, &SUGGESTION_SCHEMA).unwrap();
        assert_eq!(records[0].get(Tag::EstimatedTime), Some("30 min"));
        assert_eq!(records[0].get(Tag::Icon), Some("function"));
    }

    #[test]
    fn test_reserialize_round_trip_is_stable() {
        let raw = "[QUESTION]\nQ1\n[ANSWER]\nA\n[OPTION]\nA\n[OPTION]\nB\n[OPTION]\nC\n[OPTION]\nD\n[EXPLANATION]\nE\n[END]\n[QUESTION]\nQ2\n[ANSWER]\nX\n[OPTION]\nX\n[OPTION]\nY\n[OPTION]\nZ\n[OPTION]\nW\n[END]\n";
        let first = parse(raw, &QUIZ_SCHEMA).unwrap();
        let serialized: String = first.iter().map(|record| record.to_tagged(&QUIZ_SCHEMA)).collect();
        let second = parse(&serialized, &QUIZ_SCHEMA).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reserialize_round_trip_flashcards_and_suggestions() {
        let cases = [
            (
                "[FRONT]\nOsmosis\n[BACK]\nDiffusion of water\nacross a membrane\n[END]\n[FRONT]\nATP\n[BACK]\nEnergy currency\n[END]\n",
                FLASHCARD_SCHEMA,
            ),
            (
                "[TITLE]\nLinear Algebra\n[DESCRIPTION]\nVectors and matrices.\n[CATEGORY]\nMathematics\n[DIFFICULTY]\nIntermediate\n[TIME]\n30 min\n[ICON]\nfunction\n[END]\n[TITLE]\nOptics\n[DESCRIPTION]\nLight and lenses.\n[END]\n",
                SUGGESTION_SCHEMA,
            ),
        ];

        for (raw, schema) in cases {
            let first = parse(raw, &schema).unwrap();
            assert_eq!(first.len(), 2);
            let serialized: String = first.iter().map(|record| record.to_tagged(&schema)).collect();
            let second = parse(&serialized, &schema).unwrap();
            assert_eq!(first, second);
        }
    }
}

//! Pure parsing and matching over one remote-rendered question fragment.
//!
//! The LMS shuffles option order and regenerates form field names on every
//! attempt, so a locally captured answer can only be replayed by matching
//! text: the question stem pairs a remote question with an AnswerRecord, and
//! the answer text pairs that record with a rendered option. Both steps fall
//! back to positional order so that every remote question always receives a
//! submittable field/value pair.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::domain::AnswerRecord;

static LETTER_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-D]\)\s*").expect("letter prefix pattern is valid"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const STEM_WORDS: usize = 8;

/// One selectable option as rendered by the LMS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceField {
    pub field_name: String,
    pub form_value: String,
    pub label: String,
}

/// Typed result of parsing a question fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQuestion {
    /// Anti-tamper `(field_name, value)` pair tied to this question instance.
    pub sequence_field: Option<(String, String)>,
    pub choices: Vec<ChoiceField>,
    /// Plain text of the whole fragment, used for stem matching.
    pub stem: String,
}

/// Extract the sequence-check field, the candidate options and the plain-text
/// stem from one question's HTML fragment.
pub fn parse_question_fragment(html: &str) -> ParsedQuestion {
    let document = Html::parse_fragment(html);
    let hidden_inputs =
        Selector::parse(r#"input[type="hidden"]"#).expect("hidden input selector is valid");
    let radio_inputs =
        Selector::parse(r#"input[type="radio"]"#).expect("radio input selector is valid");

    let mut sequence_field = None;
    for input in document.select(&hidden_inputs) {
        let name = input.value().attr("name").unwrap_or("");
        if name.ends_with("_:sequencecheck") {
            let value = input.value().attr("value").unwrap_or("1");
            sequence_field = Some((name.to_string(), value.to_string()));
            break;
        }
    }

    let mut choices = Vec::new();
    for radio in document.select(&radio_inputs) {
        let field_name = radio.value().attr("name").unwrap_or("").to_string();
        let form_value = radio.value().attr("value").unwrap_or("").to_string();

        let mut label = radio
            .value()
            .attr("aria-labelledby")
            .and_then(|id| element_text_by_id(&document, id))
            .unwrap_or_default();

        if label.is_empty() {
            if let Some(radio_id) = radio.value().attr("id") {
                label = label_for_text(&document, radio_id).unwrap_or_default();
            }
        }

        if label.is_empty() {
            label = form_value.clone();
        }

        choices.push(ChoiceField {
            field_name,
            form_value,
            label,
        });
    }

    let stem = element_text(document.root_element());

    ParsedQuestion {
        sequence_field,
        choices,
        stem,
    }
}

/// Label text resolved through the accessibility association. LMS element
/// ids contain colons, so match the attribute directly instead of going
/// through an id selector.
fn element_text_by_id(document: &Html, id: &str) -> Option<String> {
    let any_with_id = Selector::parse("[id]").expect("id selector is valid");
    document
        .select(&any_with_id)
        .find(|el| el.value().attr("id") == Some(id))
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Label text resolved through a standard `label[for]` association.
fn label_for_text(document: &Html, radio_id: &str) -> Option<String> {
    let labels = Selector::parse("label").expect("label selector is valid");
    document
        .select(&labels)
        .find(|el| el.value().attr("for") == Some(radio_id))
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    WHITESPACE_RE.replace_all(joined.trim(), " ").to_string()
}

/// Normalize text for matching: collapse whitespace, trim, case-fold.
pub fn normalize(text: &str) -> String {
    WHITESPACE_RE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// Truncated stem used to pair a stored answer with a remote question:
/// lowercase, punctuation stripped, first eight words.
pub fn stem_prefix(question_text: &str) -> String {
    let lowered: String = question_text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    lowered
        .split_whitespace()
        .take(STEM_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick the unused AnswerRecord corresponding to a remote question text.
/// First containment match on the stored stem wins; with no stem match the
/// next unused record in original order is taken, so every remote question
/// ends up paired with some record.
pub fn match_answer(
    remote_question_text: &str,
    records: &[AnswerRecord],
    used: &mut HashSet<usize>,
) -> Option<usize> {
    let normalized = normalize(remote_question_text);

    for (index, record) in records.iter().enumerate() {
        if used.contains(&index) {
            continue;
        }
        let stem = stem_prefix(&record.question_text);
        if !stem.is_empty() && normalized.contains(&stem) {
            used.insert(index);
            return Some(index);
        }
    }

    for index in 0..records.len() {
        if !used.contains(&index) {
            used.insert(index);
            return Some(index);
        }
    }

    None
}

/// Pick the rendered option matching the stored answer text, returning its
/// `(field_name, form_value)` pair. Falls back to the first candidate so a
/// non-empty choice list always yields a submission.
pub fn choose_option(choices: &[ChoiceField], answer_text: &str) -> Option<(String, String)> {
    let clean = LETTER_PREFIX_RE.replace(answer_text.trim(), "");
    let normalized = normalize(&clean);

    if !normalized.is_empty() {
        for choice in choices {
            if normalize(&choice.label).contains(&normalized) {
                return Some((choice.field_name.clone(), choice.form_value.clone()));
            }
        }
    }

    choices
        .first()
        .map(|choice| (choice.field_name.clone(), choice.form_value.clone()))
}

// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt rendering rules.
//!
//! How a question is presented depends only on its option count. Messaging
//! transports cap reply buttons at 3 and list rows at 10, so anything larger
//! degrades to a numbered text enumeration answered by reply.

use echocal_core::types::{AnswerOption, ClarificationEntry};

/// The presentation chosen for one question.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedQuestion {
    /// Free-text question, answered with a plain reply.
    Text { body: String },
    /// Up to 3 options as reply buttons.
    Buttons {
        body: String,
        options: Vec<AnswerOption>,
    },
    /// 4 to 10 options as a list picker.
    List {
        body: String,
        options: Vec<AnswerOption>,
    },
    /// More than 10 options as a numbered enumeration; the user replies with
    /// the number. The options still back number/label matching.
    Enumeration {
        body: String,
        options: Vec<AnswerOption>,
    },
}

/// Choose the presentation for a question by its option count.
pub fn render_question(entry: &ClarificationEntry) -> RenderedQuestion {
    match entry.options.len() {
        0 => RenderedQuestion::Text {
            body: entry.question.clone(),
        },
        1..=3 => RenderedQuestion::Buttons {
            body: entry.question.clone(),
            options: entry.options.clone(),
        },
        4..=10 => RenderedQuestion::List {
            body: entry.question.clone(),
            options: entry.options.clone(),
        },
        _ => RenderedQuestion::Enumeration {
            body: enumeration_body(entry),
            options: entry.options.clone(),
        },
    }
}

fn enumeration_body(entry: &ClarificationEntry) -> String {
    let mut body = entry.question.clone();
    body.push('\n');
    for (i, option) in entry.options.iter().enumerate() {
        body.push_str(&format!("\n{}. {}", i + 1, option.label));
    }
    body.push_str("\n\nReply with the number of your choice.");
    body
}

/// Match a free-text reply against a prompt's options.
///
/// Accepts a 1-based number (the enumeration reply format) or an exact
/// case-insensitive label or value. Returns the option's value.
pub fn match_text_to_option(text: &str, options: &[AnswerOption]) -> Option<String> {
    let text = text.trim();
    if let Ok(n) = text.parse::<usize>()
        && n >= 1
        && n <= options.len()
    {
        return Some(options[n - 1].value.clone());
    }
    options
        .iter()
        .find(|o| o.label.eq_ignore_ascii_case(text) || o.value.eq_ignore_ascii_case(text))
        .map(|o| o.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use echocal_core::types::ClarificationReason;

    fn entry_with_options(n: usize) -> ClarificationEntry {
        ClarificationEntry {
            field_key: "attendee:sam".into(),
            reason: ClarificationReason::AmbiguousContact,
            question: "Who did you mean?".into(),
            options: (0..n)
                .map(|i| AnswerOption {
                    id: format!("contact-{i}"),
                    label: format!("Sam {i} (sam{i}@example.com)"),
                    value: format!("sam{i}@example.com"),
                })
                .collect(),
            answer: None,
        }
    }

    #[test]
    fn zero_options_renders_text() {
        let entry = entry_with_options(0);
        assert_eq!(
            render_question(&entry),
            RenderedQuestion::Text {
                body: "Who did you mean?".into()
            }
        );
    }

    #[test]
    fn one_to_three_options_render_buttons() {
        for n in 1..=3 {
            match render_question(&entry_with_options(n)) {
                RenderedQuestion::Buttons { options, .. } => assert_eq!(options.len(), n),
                other => panic!("expected buttons for {n} options, got {other:?}"),
            }
        }
    }

    #[test]
    fn four_to_ten_options_render_list() {
        for n in [4, 7, 10] {
            match render_question(&entry_with_options(n)) {
                RenderedQuestion::List { options, .. } => assert_eq!(options.len(), n),
                other => panic!("expected list for {n} options, got {other:?}"),
            }
        }
    }

    #[test]
    fn more_than_ten_options_render_numbered_enumeration() {
        match render_question(&entry_with_options(12)) {
            RenderedQuestion::Enumeration { body, options } => {
                assert!(body.starts_with("Who did you mean?"));
                assert!(body.contains("\n1. Sam 0 (sam0@example.com)"));
                assert!(body.contains("\n12. Sam 11 (sam11@example.com)"));
                assert!(body.ends_with("Reply with the number of your choice."));
                assert_eq!(options.len(), 12);
            }
            other => panic!("expected enumeration, got {other:?}"),
        }
    }

    #[test]
    fn text_matches_number_label_or_value() {
        let options = entry_with_options(12).options;
        assert_eq!(
            match_text_to_option("2", &options).as_deref(),
            Some("sam1@example.com")
        );
        assert_eq!(
            match_text_to_option("SAM 3 (sam3@example.com)", &options).as_deref(),
            Some("sam3@example.com")
        );
        assert_eq!(
            match_text_to_option("sam5@example.com", &options).as_deref(),
            Some("sam5@example.com")
        );
        assert!(match_text_to_option("0", &options).is_none());
        assert!(match_text_to_option("13", &options).is_none());
        assert!(match_text_to_option("nobody", &options).is_none());
    }
}

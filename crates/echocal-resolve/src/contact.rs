// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact resolution against the user's calendar directory.
//!
//! Raw attendee values from the extracted intent are matched against the
//! directory with a descending-preference cascade. The resolver never fails:
//! a directory error degrades to marking every input not-found, so the
//! clarification path stays well-defined.

use std::collections::BTreeMap;

use echocal_core::CalendarProvider;
use echocal_core::types::{AnswerOption, ClarificationEntry, ClarificationReason, Contact};
use tracing::warn;

/// One raw value that matched more than one directory contact.
#[derive(Debug, Clone)]
pub struct AmbiguousMatch {
    pub raw: String,
    pub candidates: Vec<Contact>,
    /// A ready-to-dispatch multiple-choice question enumerating the candidates.
    pub question: ClarificationEntry,
}

/// Outcome of resolving a batch of raw attendee values.
#[derive(Debug, Clone, Default)]
pub struct ContactResolution {
    /// raw value -> resolved address.
    pub resolved: BTreeMap<String, String>,
    pub ambiguous: Vec<AmbiguousMatch>,
    pub not_found: Vec<String>,
}

impl ContactResolution {
    pub fn needs_clarification(&self) -> bool {
        !self.ambiguous.is_empty() || !self.not_found.is_empty()
    }
}

/// The clarification field key for an attendee value.
pub fn attendee_field_key(raw: &str) -> String {
    format!("attendee:{raw}")
}

/// Resolve raw attendee values against the user's contact directory.
pub async fn resolve_contacts(
    calendar: &dyn CalendarProvider,
    user_id: &str,
    raw_values: &[String],
) -> ContactResolution {
    let mut result = ContactResolution::default();
    if raw_values.is_empty() {
        return result;
    }

    // Fully-qualified addresses skip the directory lookup entirely.
    let mut unresolved: Vec<&String> = Vec::new();
    for raw in raw_values {
        if looks_like_email(raw) {
            result.resolved.insert(raw.clone(), raw.trim().to_string());
        } else {
            unresolved.push(raw);
        }
    }
    if unresolved.is_empty() {
        return result;
    }

    let contacts = match calendar.get_contacts(user_id).await {
        Ok(contacts) => contacts,
        Err(e) => {
            // Degrade: never partially resolve on a directory failure.
            warn!(error = %e, "contact directory unavailable, marking all values not found");
            result.resolved.clear();
            result.not_found = raw_values.to_vec();
            return result;
        }
    };

    for raw in unresolved {
        let matches = match_cascade(raw, &contacts);
        match matches.len() {
            0 => result.not_found.push(raw.clone()),
            1 => {
                result.resolved.insert(raw.clone(), matches[0].email.clone());
            }
            _ => {
                result.ambiguous.push(AmbiguousMatch {
                    raw: raw.clone(),
                    question: ambiguity_question(raw, &matches),
                    candidates: matches,
                });
            }
        }
    }

    result
}

fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Descending-preference match cascade. The first tier with any matches wins.
fn match_cascade(raw: &str, contacts: &[Contact]) -> Vec<Contact> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    // Tier 1: exact full-name match.
    let tier: Vec<Contact> = contacts
        .iter()
        .filter(|c| c.name.to_lowercase() == needle)
        .cloned()
        .collect();
    if !tier.is_empty() {
        return tier;
    }

    // Tier 2: exact first-name match.
    let tier: Vec<Contact> = contacts
        .iter()
        .filter(|c| first_name(&c.name).is_some_and(|f| f == needle))
        .cloned()
        .collect();
    if !tier.is_empty() {
        return tier;
    }

    // Tier 3: exact last-name match.
    let tier: Vec<Contact> = contacts
        .iter()
        .filter(|c| last_name(&c.name).is_some_and(|l| l == needle))
        .cloned()
        .collect();
    if !tier.is_empty() {
        return tier;
    }

    // Tier 4: first name plus last initial ("sarah c").
    if let Some((first, initial)) = first_plus_initial(&needle) {
        let tier: Vec<Contact> = contacts
            .iter()
            .filter(|c| {
                first_name(&c.name).is_some_and(|f| f == first)
                    && last_name(&c.name).is_some_and(|l| l.starts_with(initial))
            })
            .cloned()
            .collect();
        if !tier.is_empty() {
            return tier;
        }
    }

    // Tier 5: substring match anywhere in the name.
    contacts
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

fn first_name(name: &str) -> Option<String> {
    name.split_whitespace().next().map(str::to_lowercase)
}

fn last_name(name: &str) -> Option<String> {
    let mut parts = name.split_whitespace();
    let first = parts.next()?;
    let last = parts.last().unwrap_or(first);
    if last == first {
        return None;
    }
    Some(last.to_lowercase())
}

fn first_plus_initial(needle: &str) -> Option<(String, char)> {
    let mut parts = needle.split_whitespace();
    let first = parts.next()?.to_string();
    let second = parts.next()?;
    if parts.next().is_some() || second.chars().count() != 1 {
        return None;
    }
    Some((first, second.chars().next()?))
}

/// A multiple-choice question enumerating each candidate as "<name> (<value>)"
/// in the directory's stable order.
fn ambiguity_question(raw: &str, candidates: &[Contact]) -> ClarificationEntry {
    ClarificationEntry {
        field_key: attendee_field_key(raw),
        reason: ClarificationReason::AmbiguousContact,
        question: format!("I found more than one contact matching \"{raw}\". Who did you mean?"),
        options: candidates
            .iter()
            .enumerate()
            .map(|(i, c)| AnswerOption {
                id: format!("contact-{i}"),
                label: format!("{} ({})", c.name, c.email),
                value: c.email.clone(),
            })
            .collect(),
        answer: None,
    }
}

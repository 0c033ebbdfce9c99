// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error classification.
//!
//! A pure function from an error message to a category, a retry decision,
//! and a user-facing message. Matching is case-insensitive substring search
//! over per-category keyword sets, evaluated in a fixed priority order:
//! authentication and invalid-input must never be silently retried, while
//! network, rate-limit, processing, and unknown errors retry with backoff.
//!
//! Classification has no side effects. Logging the result (with severity
//! chosen by category) is the caller's job.

use echocal_core::EchocalError;
use strum::Display;

/// Category assigned to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Authentication,
    NotFound,
    InvalidInput,
    Processing,
    Unknown,
}

/// The classification verdict for one error.
#[derive(Debug, Clone)]
pub struct Classification {
    pub category: ErrorCategory,
    pub is_retryable: bool,
    /// The original error text, preserved for logs and the job row.
    pub internal_message: String,
    /// Non-technical text for the terminal failure notification.
    pub user_facing_message: String,
}

const NETWORK_KEYWORDS: &[&str] = &[
    "etimedout",
    "econnreset",
    "econnrefused",
    "socket hang up",
    "network",
    "timed out",
    "timeout",
    "fetch failed",
    "dns",
];

const RATE_LIMIT_KEYWORDS: &[&str] = &["rate limit", "too many requests", "429", "quota"];

const AUTHENTICATION_KEYWORDS: &[&str] = &[
    "401",
    "unauthorized",
    "403",
    "forbidden",
    "invalid api key",
    "authentication",
    "token expired",
    "permission denied",
];

const NOT_FOUND_KEYWORDS: &[&str] = &["not found", "404", "no such", "does not exist"];

const INVALID_INPUT_KEYWORDS: &[&str] = &[
    "invalid",
    "malformed",
    "unsupported",
    "bad request",
    "400",
    "unprocessable",
    "422",
];

const PROCESSING_KEYWORDS: &[&str] = &[
    "processing error",
    "internal error",
    "500",
    "deserialize",
    "parse error",
];

fn matches_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

/// Classify an error message.
///
/// Deterministic: the same message always yields the same verdict regardless
/// of call context.
pub fn classify(message: &str) -> Classification {
    let lowered = message.to_lowercase();

    let (category, is_retryable, user_facing_message) = if matches_any(&lowered, NETWORK_KEYWORDS) {
        (
            ErrorCategory::Network,
            true,
            "I couldn't reach a service I depend on. Please try sending that again in a few minutes."
                .to_string(),
        )
    } else if matches_any(&lowered, RATE_LIMIT_KEYWORDS) {
        (
            ErrorCategory::RateLimit,
            true,
            "I'm being rate limited right now. Please try again in a few minutes.".to_string(),
        )
    } else if matches_any(&lowered, AUTHENTICATION_KEYWORDS) {
        (
            ErrorCategory::Authentication,
            false,
            "I couldn't authenticate with your calendar. Please reconnect your account and try again."
                .to_string(),
        )
    } else if matches_any(&lowered, NOT_FOUND_KEYWORDS) {
        // The literal text usually reflects a calendar-side condition the
        // user can act on, so it is surfaced verbatim.
        (ErrorCategory::NotFound, false, message.to_string())
    } else if matches_any(&lowered, INVALID_INPUT_KEYWORDS) {
        (
            ErrorCategory::InvalidInput,
            false,
            "I couldn't make sense of part of that request. Please try rephrasing it.".to_string(),
        )
    } else if matches_any(&lowered, PROCESSING_KEYWORDS) {
        (
            ErrorCategory::Processing,
            true,
            "Something went wrong while processing your message. Please try again.".to_string(),
        )
    } else {
        (
            ErrorCategory::Unknown,
            true,
            "Something unexpected went wrong. Please try again.".to_string(),
        )
    };

    Classification {
        category,
        is_retryable,
        internal_message: message.to_string(),
        user_facing_message,
    }
}

/// Classify a pipeline error by its display text.
pub fn classify_error(err: &EchocalError) -> Classification {
    classify(&err.classification_text())
}

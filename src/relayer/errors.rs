//! Relayer error message normalization.
//!
//! Relayers bubble up raw node errors. The handful of causes a user can
//! actually act on are recognized by substring and rewritten; anything else
//! passes through verbatim so no information is lost.

/// Known raw-error substrings, matched case-insensitively, and the message
/// shown for them.
const KNOWN_ERRORS: &[(&str, &str)] = &[
    (
        "insufficient balance",
        "The relayer does not hold enough funds for this withdrawal. Try another relayer.",
    ),
    (
        "insufficient allowance",
        "The relayer's token allowance is too low for this withdrawal. Try another relayer.",
    ),
    (
        "insufficient funds for gas",
        "The relayer cannot cover gas for this withdrawal. Try another relayer.",
    ),
];

/// Map a raw relayer error onto a user-facing message.
pub fn normalize_relayer_error(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    for (needle, message) in KNOWN_ERRORS {
        if lowered.contains(needle) {
            return (*message).to_string();
        }
    }
    raw.to_string()
}

//! Application identifier normalization.
//!
//! Users address applications by canonical id, by a loose alias, or by the
//! 1-based number shown in listings. This module maps all of them onto the
//! canonical id used in backup filenames and settings.

/// Normalize a user-provided application identifier to a canonical id.
pub fn canonical_app_id(id: &str) -> Option<&'static str> {
    let id = id.trim();

    if let Ok(number) = id.parse::<usize>() {
        return app_id_by_number(number);
    }

    if id.eq_ignore_ascii_case("claude_desktop")
        || id.eq_ignore_ascii_case("claude-desktop")
        || id.eq_ignore_ascii_case("desktop")
    {
        Some("claude_desktop")
    } else if id.eq_ignore_ascii_case("claude_code")
        || id.eq_ignore_ascii_case("claude-code")
        || id.eq_ignore_ascii_case("claude")
    {
        Some("claude_code")
    } else if id.eq_ignore_ascii_case("cline") {
        Some("cline")
    } else if id.eq_ignore_ascii_case("cursor") {
        Some("cursor")
    } else if id.eq_ignore_ascii_case("intellij")
        || id.eq_ignore_ascii_case("intellij-idea")
        || id.eq_ignore_ascii_case("jetbrains")
    {
        Some("intellij")
    } else if id.eq_ignore_ascii_case("windsurf") {
        Some("windsurf")
    } else if id.eq_ignore_ascii_case("master") || id.eq_ignore_ascii_case("superset") {
        Some("master")
    } else {
        None
    }
}

/// Canonical ids in catalog order; position + 1 is the listing number.
pub const CATALOG_ORDER: &[&str] = &[
    "claude_desktop",
    "claude_code",
    "cline",
    "cursor",
    "intellij",
    "windsurf",
    "master",
];

/// Look up a canonical id by its 1-based catalog number.
pub fn app_id_by_number(number: usize) -> Option<&'static str> {
    number
        .checked_sub(1)
        .and_then(|index| CATALOG_ORDER.get(index))
        .copied()
}

/// 1-based catalog number of a canonical id.
pub fn catalog_number(canonical: &str) -> Option<usize> {
    CATALOG_ORDER
        .iter()
        .position(|id| *id == canonical)
        .map(|index| index + 1)
}

use std::collections::HashSet;

use outpost_core::types::{ChatId, WorkspaceFolder};

/// Maximum length of a generated workspace folder name.
const MAX_SLUG_LEN: usize = 50;

/// Lowercase, strip anything outside `[a-z0-9 _-]`, collapse whitespace to
/// `-`, collapse repeated `-`, trim edges, truncate. Idempotent:
/// `slug(slug(x)) == slug(x)`.
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.to_lowercase().chars() {
        match ch {
            'a'..='z' | '0'..='9' | '_' | '-' => out.push(ch),
            c if c.is_whitespace() => out.push('-'),
            _ => {}
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut prev_dash = false;
    for ch in out.chars() {
        if ch == '-' {
            if !prev_dash {
                collapsed.push(ch);
            }
            prev_dash = true;
        } else {
            collapsed.push(ch);
            prev_dash = false;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// Compute the workspace folder to assign to a freshly-seen (chat, topic),
/// given every folder already in use. Appends `-1`, `-2`, … on collision.
///
/// Pure and deterministic: callers own persistence of the result.
pub fn assign_folder(
    chat_id: ChatId,
    chat_title: &str,
    topic_name: Option<&str>,
    existing: &HashSet<String>,
) -> WorkspaceFolder {
    let chat_slug = slug(chat_title);
    let base = match topic_name.map(slug).filter(|s| !s.is_empty()) {
        Some(topic_slug) if !chat_slug.is_empty() => format!("{chat_slug}-{topic_slug}"),
        Some(topic_slug) => topic_slug,
        None => chat_slug,
    };
    let base = if base.is_empty() {
        format!("chat-{}", chat_id.0)
    } else {
        base
    };

    if !existing.contains(&base) {
        return WorkspaceFolder(base);
    }

    let mut n = 1u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.contains(&candidate) {
            return WorkspaceFolder(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_strips_punctuation() {
        assert_eq!(slug("Family Chat!"), "family-chat");
    }

    #[test]
    fn slug_collapses_repeated_separators() {
        assert_eq!(slug("a   b--c"), "a-b-c");
    }

    #[test]
    fn slug_is_idempotent() {
        let once = slug("Weird!! Title__With--Stuff");
        let twice = slug(&once);
        assert_eq!(once, twice);
        assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
    }

    #[test]
    fn slug_truncates_to_max_len() {
        let long = "x".repeat(200);
        assert_eq!(slug(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn assign_folder_falls_back_to_chat_id_when_title_is_empty() {
        let existing = HashSet::new();
        let folder = assign_folder(ChatId(42), "!!!", None, &existing);
        assert_eq!(folder.as_str(), "chat-42");
    }

    #[test]
    fn assign_folder_appends_suffix_on_collision() {
        let mut existing = HashSet::new();
        existing.insert("family-chat".to_string());
        let folder = assign_folder(ChatId(1), "Family Chat", None, &existing);
        assert_eq!(folder.as_str(), "family-chat-1");
    }

    #[test]
    fn assign_folder_combines_chat_and_topic() {
        let existing = HashSet::new();
        let folder = assign_folder(ChatId(1), "Dev Team", Some("Releases"), &existing);
        assert_eq!(folder.as_str(), "dev-team-releases");
    }
}

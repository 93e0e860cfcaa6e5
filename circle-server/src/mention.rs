/// Mention extraction utilities for Circle
/// Extracts @username mentions from posts and comments
use regex::Regex;
use std::sync::OnceLock;

fn mention_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        // @ must start the text or follow a character that can't be part of
        // an address, so "test@example.com" is not a mention
        Regex::new(r"(?:^|[^@\w.])@([A-Za-z0-9_.]{3,30})").expect("mention pattern is valid")
    })
}

/// Extract all @username mentions from content
/// Returns unique lowercase usernames (without the @ symbol) in order of appearance
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut mentions = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for cap in mention_regex().captures_iter(content) {
        if let Some(username) = cap.get(1) {
            // a sentence-ending period is not part of the name
            let name = username.as_str().trim_end_matches('.').to_lowercase();
            if name.len() >= 3 && seen.insert(name.clone()) {
                mentions.push(name);
            }
        }
    }

    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mentions() {
        assert_eq!(
            extract_mentions("Hey @alice, what do you think?"),
            vec!["alice"]
        );

        assert_eq!(
            extract_mentions("@bob and @charlie are both right"),
            vec!["bob", "charlie"]
        );

        assert_eq!(extract_mentions("No mentions here"), Vec::<String>::new());

        // Duplicate mentions should only appear once
        assert_eq!(extract_mentions("@alice @bob @Alice"), vec!["alice", "bob"]);

        // Should not match email addresses
        assert_eq!(
            extract_mentions("Email me at test@example.com"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_dotted_names_and_trailing_period() {
        assert_eq!(extract_mentions("thanks @jane.doe."), vec!["jane.doe"]);
        assert_eq!(extract_mentions("cc @dan."), vec!["dan"]);
        assert_eq!(extract_mentions("too short @al"), Vec::<String>::new());
    }
}

//! Pure text helpers for shaping model output.

use std::collections::{BTreeMap, BTreeSet};

use crate::chunking::Passage;

/// Canned replies for small talk, matched against trimmed lowercase input.
pub const GREETINGS: [(&str, &str); 6] = [
    ("hi", "Hello! 👋 How can I help you today?"),
    ("hello", "Hi there! 👋"),
    ("hey", "Hey! 👋"),
    ("yo", "Yo! What's up?"),
    ("sup", "Not much! How can I assist you?"),
    ("how are you", "I'm great, thanks for asking! 😊 How about you?"),
];

/// Phrases that mark an answer as a refusal, matched case-insensitively.
pub const REFUSAL_PHRASES: [&str; 6] = [
    "i am sorry",
    "i'm sorry",
    "does not contain information",
    "cannot answer your question",
    "no relevant info",
    "doesn't mention",
];

/// Most follow-up suggestions kept per answer.
pub const MAX_SUGGESTIONS: usize = 2;

pub fn greeting_reply(normalized: &str) -> Option<&'static str> {
    GREETINGS
        .iter()
        .find(|(phrase, _)| *phrase == normalized)
        .map(|(_, reply)| *reply)
}

/// Whether the input asks about the previous question.
pub fn refers_to_previous(normalized: &str) -> bool {
    normalized.contains("previous question") || normalized.contains("from the previous")
}

pub fn looks_like_refusal(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    REFUSAL_PHRASES.iter().any(|p| lower.contains(p))
}

/// Repair line-wrapping left over from PDF text and put bullets on their
/// own lines.
///
/// - `"-\n"` becomes `"-"`
/// - a newline between two ASCII letters is removed
/// - every `•` starts a new line
///
/// # Examples
///
/// ```
/// use pdfchat::text_util::format_key_points;
///
/// assert_eq!(format_key_points("supp\nly chain"), "supply chain");
/// assert_eq!(format_key_points("Points: • one • two"), "Points: \n• one \n• two");
/// ```
pub fn format_key_points(answer: &str) -> String {
    let dehyphenated = answer.replace("-\n", "-");
    let chars: Vec<char> = dehyphenated.chars().collect();

    let mut joined = String::with_capacity(dehyphenated.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n'
            && i > 0
            && chars[i - 1].is_ascii_alphabetic()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic())
        {
            continue;
        }
        joined.push(c);
    }

    joined.replace('•', "\n•")
}

/// The citation block appended to a satisfactory answer.
///
/// Pages are grouped per source file, sorted numerically and de-duplicated;
/// sources are sorted by name. No passages, no block.
pub fn build_sources_text(passages: &[Passage]) -> String {
    let mut by_source: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
    for p in passages {
        if !p.source.is_empty() {
            by_source.entry(p.source.as_str()).or_default().insert(p.page);
        }
    }
    if by_source.is_empty() {
        return String::new();
    }

    let mut text = String::from("\n\n📚 Sources:\n");
    for (source, pages) in by_source {
        let pages: Vec<String> = pages.iter().map(u32::to_string).collect();
        text.push_str(&format!("• {source} (p. {})\n", pages.join(", ")));
    }
    text
}

pub fn suggestion_prompt(answer: &str) -> String {
    format!(
        "Suggest 2 concise follow-up questions (10 words max each) based on this answer:\n{answer}"
    )
}

/// Pull follow-up questions out of a model reply.
///
/// Bullet markers and leading numbering are stripped; only lines that end
/// with `?` survive, and at most [`MAX_SUGGESTIONS`] of them.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| {
            let line = line.trim().trim_matches(|c: char| matches!(c, '-' | '•' | '*' | ' '));
            strip_numbering(line).trim()
        })
        .filter(|line| !line.is_empty() && line.ends_with('?'))
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}

fn strip_numbering(line: &str) -> &str {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return line;
    }
    let rest = &line[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(source: &str, page: u32) -> Passage {
        Passage {
            id: 0,
            source: source.to_string(),
            page,
            text: String::new(),
        }
    }

    #[test]
    fn greetings_match_exactly() {
        assert_eq!(greeting_reply("hi"), Some("Hello! 👋 How can I help you today?"));
        assert_eq!(
            greeting_reply("how are you"),
            Some("I'm great, thanks for asking! 😊 How about you?")
        );
        assert_eq!(greeting_reply("hi there"), None);
        assert_eq!(greeting_reply("history"), None);
    }

    #[test]
    fn previous_question_detection() {
        assert!(refers_to_previous("expand on the previous question"));
        assert!(refers_to_previous("more detail from the previous answer"));
        assert!(!refers_to_previous("what is a question?"));
    }

    #[test]
    fn refusals_are_case_insensitive() {
        assert!(looks_like_refusal("The PDF Does Not Contain Information about that."));
        assert!(looks_like_refusal("I'm sorry, I can't."));
        assert!(looks_like_refusal("The text doesn't mention it."));
        assert!(!looks_like_refusal("Pin your dependencies."));
    }

    #[test]
    fn key_points_cleanup() {
        assert_eq!(format_key_points("open-\nsource"), "open-source");
        assert_eq!(format_key_points("end.\nNext"), "end.\nNext");
        assert_eq!(format_key_points("word\nword"), "wordword");
        assert_eq!(format_key_points("a\n1"), "a\n1");
        assert_eq!(format_key_points("•x"), "\n•x");
    }

    #[test]
    fn sources_grouped_and_sorted() {
        let text = build_sources_text(&[
            passage("b.pdf", 10),
            passage("a.pdf", 9),
            passage("b.pdf", 2),
            passage("b.pdf", 10),
        ]);
        assert_eq!(
            text,
            "\n\n📚 Sources:\n• a.pdf (p. 9)\n• b.pdf (p. 2, 10)\n"
        );
    }

    #[test]
    fn no_passages_no_sources() {
        assert_eq!(build_sources_text(&[]), "");
    }

    #[test]
    fn suggestions_keep_questions_only() {
        let raw = "Here are some ideas:\n\
                   1. What is dependency pinning?\n\
                   - How do SBOMs help?\n\
                   * A statement without a question mark\n\
                   • Which tools scan licenses?\n";
        assert_eq!(
            parse_suggestions(raw),
            vec![
                "What is dependency pinning?".to_string(),
                "How do SBOMs help?".to_string()
            ]
        );
    }

    #[test]
    fn suggestions_empty_reply() {
        assert!(parse_suggestions("").is_empty());
        assert!(parse_suggestions("No questions here.").is_empty());
    }
}

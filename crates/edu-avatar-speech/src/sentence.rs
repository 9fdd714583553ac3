//! Sentence splitting for reply playback.

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn has_words(segment: &str) -> bool {
    segment.chars().any(char::is_alphanumeric)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split reply text into sentences in spoken order.
///
/// A sentence ends after a run of `.`, `!` or `?`. Text after the last
/// terminator becomes a final sentence. Punctuation-only fragments are joined
/// onto the preceding sentence. Blank input yields no sentences.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_terminator(c) || chars.peek().is_some_and(|&next| is_terminator(next)) {
            continue;
        }
        if has_words(&current) {
            sentences.push(current.trim().to_string());
            current.clear();
        } else if let Some(last) = sentences.last_mut() {
            last.push(' ');
            last.push_str(current.trim());
            current.clear();
        }
        // Leading punctuation with no sentence yet is carried into the next one
    }

    let tail = current.trim();
    if !tail.is_empty() {
        match sentences.last_mut() {
            Some(last) if !has_words(tail) => {
                last.push(' ');
                last.push_str(tail);
            }
            _ => sentences.push(tail.to_string()),
        }
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sentences() {
        assert_eq!(
            split_into_sentences("Hello there. How are you?"),
            vec!["Hello there.", "How are you?"]
        );
    }

    #[test]
    fn test_no_punctuation_is_one_sentence() {
        assert_eq!(
            split_into_sentences("  just   some\nwords  "),
            vec!["just some words"]
        );
    }

    #[test]
    fn test_blank_input() {
        assert!(split_into_sentences("").is_empty());
        assert!(split_into_sentences(" \n\t ").is_empty());
    }

    #[test]
    fn test_terminator_runs_stay_together() {
        assert_eq!(
            split_into_sentences("Wait!!! Really?! Yes..."),
            vec!["Wait!!!", "Really?!", "Yes..."]
        );
    }

    #[test]
    fn test_trailing_fragment_kept() {
        assert_eq!(
            split_into_sentences("First point. and a trailing thought"),
            vec!["First point.", "and a trailing thought"]
        );
    }

    #[test]
    fn test_punctuation_only_fragments_join_previous() {
        assert_eq!(split_into_sentences("Hi.. ! Bye."), vec!["Hi.. !", "Bye."]);
        assert_eq!(split_into_sentences("...Hello."), vec!["...Hello."]);
        assert_eq!(split_into_sentences("?!"), vec!["?!"]);
    }

    #[test]
    fn test_concatenation_reconstructs_normalized_text() {
        let inputs = [
            "Good morning!  Your essay\n\nlooks great. Shall we revise the intro?",
            "One. Two! Three? Four",
            "Is this... working?? I think so.",
        ];
        for input in inputs {
            let joined = split_into_sentences(input).join(" ");
            assert_eq!(joined, normalize_whitespace(input), "input: {input:?}");
        }
    }
}

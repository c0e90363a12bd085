/// Split text into sentences on terminal punctuation (`.`, `!`, `?`)
/// followed by whitespace. Closing quotes and brackets stay attached to
/// their sentence. Whitespace-only fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut terminal_seen = false;

    for ch in text.chars() {
        if ch.is_whitespace() && terminal_seen {
            flush(&mut sentences, &mut current);
            terminal_seen = false;
            continue;
        }

        if matches!(ch, '.' | '!' | '?') {
            terminal_seen = true;
        } else if !ch.is_whitespace() && !matches!(ch, '"' | '\'' | ')' | ']' | '}') {
            terminal_seen = false;
        }

        current.push(ch);
    }
    flush(&mut sentences, &mut current);

    sentences
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod test {
    use super::split_sentences;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("First sentence. Second one! A third? Yes.");
        assert_eq!(
            sentences,
            vec!["First sentence.", "Second one!", "A third?", "Yes."],
        );
    }

    #[test]
    fn keeps_closing_quotes_with_their_sentence() {
        let sentences = split_sentences(r#"He said "stop." Then he left."#);
        assert_eq!(sentences, vec![r#"He said "stop.""#, "Then he left."]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("The rate was 3.5 percent. It fell.");
        assert_eq!(sentences, vec!["The rate was 3.5 percent.", "It fell."]);
    }

    #[test]
    fn unterminated_text_is_one_sentence() {
        assert_eq!(split_sentences("no punctuation here"), vec![
            "no punctuation here"
        ]);
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(split_sentences("  \n\t ").is_empty());
    }

    #[test]
    fn newlines_act_as_sentence_boundaries() {
        let sentences = split_sentences("Line one.\nLine two.");
        assert_eq!(sentences, vec!["Line one.", "Line two."]);
    }
}

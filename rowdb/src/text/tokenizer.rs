//! Line tokenizer for the delimited text format.
//!
//! Splits a line on a configurable delimiter set, with double-quoted
//! strings carried through as single tokens (quotes stripped). Runs of
//! consecutive delimiters collapse; leading and trailing delimiters
//! are ignored. A quote opened and never closed marks the line as
//! unterminated, and whatever was collected becomes the last token.

pub const DEFAULT_DELIMITERS: &str = " \t";

pub struct Tokenizer {
    delimiters: String,
}

pub struct TokenizedLine {
    pub tokens: Vec<String>,
    pub unterminated: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Start,
    Delimiter,
    Token,
    StringStart,
    StringEnd,
}

impl Default for Tokenizer {
    fn default() -> Tokenizer {
        Tokenizer::new(DEFAULT_DELIMITERS)
    }
}

impl Tokenizer {
    pub fn new(delimiters: &str) -> Tokenizer {
        Tokenizer {
            delimiters: delimiters.to_string(),
        }
    }

    /// Lines whose first character is `#` or `/` are comments.
    pub fn is_comment(line: &str) -> bool {
        matches!(line.chars().next(), Some('#') | Some('/'))
    }

    pub fn tokenize(&self, line: &str) -> TokenizedLine {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut state = State::Start;

        for ch in line.chars() {
            if ch == '"' {
                match state {
                    State::StringStart => {
                        // Closing quote: emit even when empty.
                        tokens.push(std::mem::take(&mut current));
                        state = State::StringEnd;
                    }
                    State::Token => {
                        // A quote glued to a bare token ends the token
                        // and opens a string.
                        tokens.push(std::mem::take(&mut current));
                        state = State::StringStart;
                    }
                    _ => state = State::StringStart,
                }
            } else if self.delimiters.contains(ch) {
                match state {
                    State::StringStart => current.push(ch),
                    State::Token => {
                        tokens.push(std::mem::take(&mut current));
                        state = State::Delimiter;
                    }
                    _ => state = State::Delimiter,
                }
            } else {
                match state {
                    State::StringStart => current.push(ch),
                    State::Token => current.push(ch),
                    _ => {
                        current.push(ch);
                        state = State::Token;
                    }
                }
            }
        }

        match state {
            State::Token | State::StringStart => tokens.push(current),
            _ => {}
        }

        TokenizedLine {
            tokens,
            unterminated: state == State::StringStart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split(line: &str) -> Vec<String> {
        Tokenizer::default().tokenize(line).tokens
    }

    #[test]
    fn test_plain_tokens() {
        assert_eq!(split("a b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delimiters_collapse() {
        assert_eq!(split("  a \t\t b  "), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_line() {
        assert!(split("").is_empty());
        assert!(split(" \t ").is_empty());
    }

    #[test]
    fn test_quoted_token_keeps_delimiters() {
        assert_eq!(split(r#""John Smith" 42"#), vec!["John Smith", "42"]);
    }

    #[test]
    fn test_empty_quoted_token() {
        assert_eq!(split(r#"a "" b"#), vec!["a", "", "b"]);
    }

    #[test]
    fn test_quote_adjacent_to_token() {
        // No delimiter between the bare token and the quote: the quote
        // still terminates the token.
        assert_eq!(split(r#"ab"cd e""#), vec!["ab", "cd e"]);
    }

    #[test]
    fn test_unterminated_quote() {
        let result = Tokenizer::default().tokenize(r#"a "bc d"#);
        assert!(result.unterminated);
        assert_eq!(result.tokens, vec!["a", "bc d"]);
    }

    #[test]
    fn test_custom_delimiters() {
        let tokenizer = Tokenizer::new(",;");
        assert_eq!(tokenizer.tokenize("a,b;;c").tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_comment_detection() {
        assert!(Tokenizer::is_comment("# note"));
        assert!(Tokenizer::is_comment("// note"));
        assert!(!Tokenizer::is_comment(" # indented"));
        assert!(!Tokenizer::is_comment("data"));
    }
}

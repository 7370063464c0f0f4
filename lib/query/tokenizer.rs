use super::ParseError;

/// Splits `input` on ASCII whitespace; a pair of unescaped `"` groups a
/// token that may contain spaces (`""` yields an empty-string token). A
/// quote that opens but never closes is a fatal parse error.
pub fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut token = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '"' {
                    closed = true;
                    break;
                }
                token.push(ch);
            }
            if !closed {
                return Err(ParseError::UnterminatedQuote);
            }
            tokens.push(token);
            continue;
        }

        let mut token = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || ch == '"' {
                break;
            }
            token.push(ch);
            chars.next();
        }
        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("ADD FIO A").unwrap(), vec!["ADD", "FIO", "A"]);
    }

    #[test]
    fn quoted_token_may_contain_spaces() {
        assert_eq!(
            tokenize(r#"FIO "Ivanov I.I.""#).unwrap(),
            vec!["FIO", "Ivanov I.I."]
        );
    }

    #[test]
    fn empty_quotes_produce_empty_token() {
        assert_eq!(tokenize(r#"FIO """#).unwrap(), vec!["FIO", ""]);
    }

    #[test]
    fn unterminated_quote_is_fatal() {
        assert_eq!(tokenize(r#"FIO "Ivanov"#), Err(ParseError::UnterminatedQuote));
    }
}

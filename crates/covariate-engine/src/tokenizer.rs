//! Script line tokenizer

use crate::error::GdsError;

/// Split a script line into tokens.
///
/// Tokens are separated by whitespace; single or double quotes group a token
/// that contains whitespace. Lines whose first visible character is `#` or
/// `;` are comments and yield no tokens.
pub fn tokenize(line: &str) -> Result<Vec<String>, GdsError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in trimmed.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(GdsError::Syntax(format!("unterminated {} quote", q)));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_tokens() {
        assert_eq!(tokenize("  newcov  trial-effect 40 ").unwrap(), vec!["newcov", "trial-effect", "40"]);
    }

    #[test]
    fn test_comments_and_blank() {
        assert!(tokenize("# comment").unwrap().is_empty());
        assert!(tokenize("   ; also").unwrap().is_empty());
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_quotes_group_whitespace() {
        assert_eq!(
            tokenize("multiply \"task->tap left\" 'x y'").unwrap(),
            vec!["multiply", "task->tap left", "x y"]
        );
        assert_eq!(tokenize("cov-name \"\"").unwrap(), vec!["cov-name", ""]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(tokenize("cov-name \"abc").is_err());
    }
}

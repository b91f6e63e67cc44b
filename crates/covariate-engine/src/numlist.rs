//! Integer range lists such as `3,7-9:12`

use crate::error::GdsError;

/// Expand a range list. `,` and `:` separate items, `a-b` is inclusive.
pub fn parse_ranges(text: &str) -> Result<Vec<usize>, GdsError> {
    let mut numbers = Vec::new();
    for item in text.split([',', ':']) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match item.split_once('-') {
            Some((start, end)) => {
                let start = parse_index(start, text)?;
                let end = parse_index(end, text)?;
                if end < start {
                    return Err(GdsError::Syntax(format!("descending range in {}", text)));
                }
                numbers.extend(start..=end);
            }
            None => numbers.push(parse_index(item, text)?),
        }
    }
    if numbers.is_empty() {
        return Err(GdsError::Syntax(format!("empty number list: {}", text)));
    }
    Ok(numbers)
}

fn parse_index(token: &str, context: &str) -> Result<usize, GdsError> {
    token
        .trim()
        .parse::<usize>()
        .map_err(|_| GdsError::Syntax(format!("invalid number list: {}", context)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_list() {
        assert_eq!(parse_ranges("3,7-9:12").unwrap(), vec![3, 7, 8, 9, 12]);
    }

    #[test]
    fn test_single_range() {
        assert_eq!(parse_ranges("0-3").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_ranges("a-3").is_err());
        assert!(parse_ranges("5-2").is_err());
        assert!(parse_ranges(",").is_err());
    }
}

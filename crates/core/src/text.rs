pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_name_separator(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(ch, '-' | '_' | '/' | '.' | ',' | ';' | ':' | '(' | ')' | '[' | ']')
}

/// Canonical key for entity names so "Node.js", "node js" and "NODEJS" collapse
/// onto the same skill. `+` and `#` survive so "C++" and "C#" stay distinct.
pub fn normalize_entity_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !is_name_separator(*ch))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof \u{a0}  spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn entity_names_collapse_punctuation_and_case() {
        assert_eq!(normalize_entity_name("Node.js"), normalize_entity_name("node js"));
        assert_eq!(normalize_entity_name(" SQL "), "sql");
        assert_ne!(normalize_entity_name("C++"), normalize_entity_name("C#"));
        assert_eq!(normalize_entity_name("CI/CD (GitHub_Actions)"), "cicdgithubactions");
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 50), "short");
    }
}

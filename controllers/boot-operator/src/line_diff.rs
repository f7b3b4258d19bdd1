//! Line diff used for revision annotations.

use similar::{ChangeTag, TextDiff};

/// Changed lines between `old` and `new`: removed lines prefixed with `-`,
/// added lines with `+`, in document order. Empty when the texts match.
#[must_use]
pub fn line_diff(old: &str, new: &str) -> String {
    // a missing final newline must not count as a change of the last line
    let old = terminated(old);
    let new = terminated(new);

    TextDiff::from_lines(old.as_str(), new.as_str())
        .iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => return None,
            };
            Some(format!("{}{}", sign, change.value().trim_end_matches(['\r', '\n'])))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn terminated(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_no_diff() {
        assert_eq!(line_diff("a\nb\n", "a\nb\n"), "");
    }

    #[test]
    fn test_changed_line() {
        let old = "image: app\nversion: '1.0'\nport: 8080\n";
        let new = "image: app\nversion: '1.1'\nport: 8080\n";
        assert_eq!(line_diff(old, new), "-version: '1.0'\n+version: '1.1'");
    }

    #[test]
    fn test_added_and_removed_tails() {
        assert_eq!(line_diff("", "a\nb"), "+a\n+b");
        assert_eq!(line_diff("a\nb", "a"), "-b");
    }

    #[test]
    fn test_long_document_reports_only_changed_lines() {
        let old: String = (0..5000).map(|i| format!("key{i}: {i}\n")).collect();
        let new = old.replace("key2500: 2500\n", "key2500: changed\n");
        assert_eq!(line_diff(&old, &new), "-key2500: 2500\n+key2500: changed");
    }
}

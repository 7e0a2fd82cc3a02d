//! Combining multi-tab submissions into a single program text.

use crate::submission::Tab;

/// Header emitted at the top of every combined program.
const COMBINED_HEADER: &str = "# Combined code from multiple tabs\n# Generated automatically for execution\n";

/// Merge an ordered list of named tab fragments into one program text.
///
/// Tabs whose trimmed content is empty are skipped entirely, delimiter
/// included. A missing or empty name defaults to `Tab <1-based index>`.
/// Deterministic and side-effect-free; an empty input yields an empty
/// string. Delimiter uniqueness is the caller's responsibility (unique
/// tab names give unique delimiters).
pub fn combine_tabs(tabs: &[Tab]) -> String {
    if tabs.is_empty() {
        return String::new();
    }

    let mut combined = String::from(COMBINED_HEADER);
    combined.push('\n');

    for (index, tab) in tabs.iter().enumerate() {
        if tab.content.trim().is_empty() {
            continue;
        }

        let name = if tab.name.is_empty() {
            format!("Tab {}", index + 1)
        } else {
            tab.name.clone()
        };

        combined.push_str(&format!("# === {name} ===\n"));
        combined.push_str(&tab.content);
        combined.push('\n');
    }

    combined
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(name: &str, content: &str) -> Tab {
        Tab {
            name: name.into(),
            content: content.into(),
        }
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(combine_tabs(&[]), "");
    }

    #[test]
    fn single_tab_has_header_and_delimiter() {
        let out = combine_tabs(&[tab("Main", "print('M')")]);

        assert!(out.starts_with("# Combined code from multiple tabs\n"));
        assert!(out.contains("# Generated automatically for execution\n"));
        assert!(out.contains("# === Main ===\nprint('M')\n"));
    }

    #[test]
    fn empty_tabs_are_skipped_entirely() {
        let out = combine_tabs(&[
            tab("Main", "print('M')"),
            tab("Empty", ""),
            tab("Utils", "print('U')"),
        ]);

        assert!(out.contains("# === Main ==="));
        assert!(out.contains("# === Utils ==="));
        assert!(!out.contains("# === Empty ==="));
    }

    #[test]
    fn whitespace_only_content_counts_as_empty() {
        let out = combine_tabs(&[tab("Blank", "  \n\t  "), tab("Real", "x = 1")]);

        assert!(!out.contains("# === Blank ==="));
        assert!(out.contains("# === Real ==="));
    }

    #[test]
    fn delimiter_order_matches_input_order() {
        let out = combine_tabs(&[tab("First", "a"), tab("Second", "b"), tab("Third", "c")]);

        let first = out.find("# === First ===").unwrap();
        let second = out.find("# === Second ===").unwrap();
        let third = out.find("# === Third ===").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn unnamed_tabs_get_positional_defaults() {
        let out = combine_tabs(&[tab("", "a"), tab("", "b")]);

        assert!(out.contains("# === Tab 1 ===\na\n"));
        assert!(out.contains("# === Tab 2 ===\nb\n"));
    }

    #[test]
    fn default_index_counts_skipped_tabs() {
        // The positional default is 1-based over the input sequence,
        // not over the surviving tabs.
        let out = combine_tabs(&[tab("Named", "x"), tab("", ""), tab("", "z")]);

        assert!(out.contains("# === Tab 3 ===\nz\n"));
        assert!(!out.contains("# === Tab 2 ==="));
    }

    #[test]
    fn delimiter_appears_exactly_once_per_tab() {
        let out = combine_tabs(&[tab("Main", "print('M')"), tab("Utils", "print('U')")]);
        assert_eq!(out.matches("# === Main ===").count(), 1);
        assert_eq!(out.matches("# === Utils ===").count(), 1);
    }

    #[test]
    fn combine_is_deterministic() {
        let tabs = vec![tab("A", "1"), tab("B", "2")];
        assert_eq!(combine_tabs(&tabs), combine_tabs(&tabs));
    }
}

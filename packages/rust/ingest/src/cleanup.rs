//! Post-conversion cleanup for HTML-derived training text.
//!
//! Each pass is a function `&str -> String` applied in sequence. The goal is
//! prose a model can learn from: no markup residue, no link targets, no
//! runs of blank lines eating into the chunk budget.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.replace("\r\n", "\n");

    result = fix_code_block_languages(&result);
    result = strip_leftover_html(&result);
    result = flatten_links(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Code fences
// ---------------------------------------------------------------------------

/// Turn `language-js`, `lang-python` and `highlight-rust` fence hints into plain names.
fn fix_code_block_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "```$1").to_string()
}

// ---------------------------------------------------------------------------
// HTML residue
// ---------------------------------------------------------------------------

/// Remove tags htmd passed through, keeping their text. Code blocks are left alone.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^<>]*)?/?>").expect("valid regex")
    });

    let mut lines = Vec::new();
    let mut in_code_block = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(line.to_string());
        } else if in_code_block {
            lines.push(line.to_string());
        } else {
            lines.push(HTML_TAG_RE.replace_all(line, "").to_string());
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Replace `[text](url)` with `text` and `![alt](src)` with `alt`.
fn flatten_links(md: &str) -> String {
    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid regex")
    });

    LINK_RE.replace_all(md, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of blank lines to a single blank line.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md.trim_start_matches('\n'), "\n\n").to_string()
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_code_block_languages_strips_prefix() {
        let input = "```language-javascript\nconsole.log('hi');\n```";
        assert!(fix_code_block_languages(input).starts_with("```javascript"));
    }

    #[test]
    fn strip_leftover_html_keeps_text() {
        let input = "<div class=\"note\">Important <em>info</em></div>";
        assert_eq!(strip_leftover_html(input), "Important info");
    }

    #[test]
    fn strip_leftover_html_preserves_code_blocks() {
        let input = "Text\n\n```html\n<div>Preserved</div>\n```";
        assert!(strip_leftover_html(input).contains("<div>Preserved</div>"));
    }

    #[test]
    fn strip_leftover_html_ignores_comparisons() {
        let input = "if a < b and c > d";
        assert_eq!(strip_leftover_html(input), input);
    }

    #[test]
    fn flatten_links_drops_targets() {
        let input = "See [the guide](/guide/intro) and ![diagram](img/arch.png).";
        assert_eq!(flatten_links(input), "See the guide and diagram.");
    }

    #[test]
    fn clean_blank_lines_collapses_runs() {
        assert_eq!(clean_blank_lines("\n\nA\n\n\n\n\nB"), "A\n\nB");
        assert_eq!(clean_blank_lines("A\n\nB"), "A\n\nB");
    }

    #[test]
    fn full_pipeline_produces_clean_text() {
        let input = "# Title\r\n\r\n\r\n\r\n<span>Some</span> [content](https://x.y)   \n\n```lang-python\nprint('hi')\n```\n\n\n";
        let result = run_pipeline(input);

        assert_eq!(
            result,
            "# Title\n\nSome content\n\n```python\nprint('hi')\n```\n"
        );
    }
}

//! HTML-to-text conversion.
//!
//! Extracts the main content of a page, converts it to Markdown with `htmd`
//! (which keeps headings, lists and code blocks readable), then runs the
//! cleanup passes in [`crate::cleanup`].

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use synthkit_shared::{Result, SynthError};

use crate::cleanup;

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Converted page text plus what we could learn about it.
#[derive(Debug, Clone)]
pub struct ConvertedHtml {
    pub text: String,
    /// `<title>` or first H1, if any.
    pub title: Option<String>,
    pub word_count: usize,
}

/// Convert an HTML document to clean training text.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn html_to_text(html: &str) -> Result<ConvertedHtml> {
    let doc = Html::parse_document(html);
    let page_title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let content_html = extract_content_html(&doc).unwrap_or_else(|| html.to_string());
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
        ])
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| SynthError::parse(format!("HTML conversion failed: {e}")))?;
    debug!(raw_len = raw.len(), "htmd conversion complete");

    let text = cleanup::run_pipeline(&raw);
    let title = page_title.or_else(|| first_heading(&text));
    let word_count = count_words(&text);

    Ok(ConvertedHtml {
        text,
        title,
        word_count,
    })
}

// ---------------------------------------------------------------------------
// Content extraction
// ---------------------------------------------------------------------------

/// Inner HTML of the most specific content container, falling back to `<body>`.
fn extract_content_html(doc: &Html) -> Option<String> {
    let selectors = [
        "article .markdown",
        ".vp-doc",
        ".markdown-section",
        "[role=\"main\"]",
        "article",
        "main",
        ".content",
        "body",
    ];

    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        doc.select(&selector).next().map(|el| el.inner_html())
    })
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Replace `<table>` elements with pipe tables; `htmd` drops table structure.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let mut result = html.to_string();

    for table in doc.select(&TABLE_SEL) {
        let md_table = table_to_markdown(&table);
        result = result.replacen(&table.html(), &md_table, 1);
    }

    result
}

fn table_to_markdown(table: &ElementRef) -> String {
    let cell_text = |cell: ElementRef| cell.text().collect::<String>().trim().to_string();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&TR_SEL) {
        let ths: Vec<String> = tr.select(&TH_SEL).map(cell_text).collect();
        if !ths.is_empty() {
            has_header = true;
            rows.push(ths);
            continue;
        }
        let tds: Vec<String> = tr.select(&TD_SEL).map(cell_text).collect();
        if !tds.is_empty() {
            rows.push(tds);
        }
    }

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    let line = |cells: &[String]| format!("| {} |\n", cells.join(" | "));
    let mut md = String::from("\n\n");
    md.push_str(&line(&rows[0]));
    md.push_str(&line(&vec!["---".to_string(); col_count]));
    let data_start = usize::from(has_header);
    for row in &rows[data_start..] {
        md.push_str(&line(row));
    }
    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn first_heading(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

/// Count prose words, ignoring fenced code.
fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    CODE_BLOCK_RE.replace_all(md, "").split_whitespace().count()
}

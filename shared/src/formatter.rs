//! HTML fragments for the digest, one layout per [`QueryKind`].
//!
//! Every formatter skips row 0 (the header) and maps columns by position.
//! Cell values are interpolated as-is, without HTML escaping; the query
//! authors control the content and existing articles rely on markup passing
//! through. A missing cell renders as an empty string.

use std::fmt::Write as _;

use crate::{QueryKind, ResultSet};

const SUMMARY_STYLE: &str = "color: #666666;";

impl QueryKind {
    /// Caption shown in the collapsible summary line.
    pub fn caption(&self) -> &'static str {
        match self {
            QueryKind::TopArticles => "This week&#39;s most popular articles:",
            QueryKind::NewArticles => "Article new arrivals:",
            QueryKind::UnansweredQuestions => "Questions that still need an answer:",
            QueryKind::NewQueries => "Newly published queries:",
        }
    }
}

/// Render `result` with the layout of `kind`.
pub fn format_fragment(kind: QueryKind, result: &ResultSet) -> String {
    match kind {
        QueryKind::TopArticles => format_top_articles(result),
        QueryKind::NewArticles => format_new_articles(result),
        QueryKind::UnansweredQuestions => format_unanswered_questions(result),
        QueryKind::NewQueries => format_new_queries(result),
    }
}

/// Columns: 0 title, 1 url, 2 author.
pub fn format_top_articles(result: &ResultSet) -> String {
    render_details(QueryKind::TopArticles, result, |items, row| {
        let _ = write!(
            items,
            "<li><a href = \"{}\">{}</a> by {}</li>",
            cell(row, 1),
            cell(row, 0),
            cell(row, 2)
        );
    })
}

/// Columns: 0 title, 1 url.
pub fn format_new_articles(result: &ResultSet) -> String {
    render_details(QueryKind::NewArticles, result, |items, row| {
        let _ = write!(items, "<li> <a href = \"{}\" >{}</a> </li>", cell(row, 1), cell(row, 0));
    })
}

/// Columns: 0 title, 1 asker, 2 url.
pub fn format_unanswered_questions(result: &ResultSet) -> String {
    render_details(QueryKind::UnansweredQuestions, result, |items, row| {
        let _ = write!(
            items,
            "<li><a href = \"{}\">{}</a> asked by {}</li>",
            cell(row, 2),
            cell(row, 0),
            cell(row, 1)
        );
    })
}

/// Columns: 0 title, 1 author, 3 url.
pub fn format_new_queries(result: &ResultSet) -> String {
    render_details(QueryKind::NewQueries, result, |items, row| {
        let _ = write!(
            items,
            "<li><a href = \"{}\">{}</a> by {}</li>",
            cell(row, 3),
            cell(row, 0),
            cell(row, 1)
        );
    })
}

fn render_details<F>(kind: QueryKind, result: &ResultSet, mut render_item: F) -> String
where
    F: FnMut(&mut String, &[String]),
{
    let mut html = format!(
        "<details><summary style=\"{SUMMARY_STYLE}\"><strong>{}</strong></summary><ul>",
        kind.caption()
    );
    for row in result.data_rows() {
        render_item(&mut html, row);
    }
    html.push_str("</ul></details>");
    html
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{
        format_fragment, format_new_articles, format_new_queries, format_top_articles,
        format_unanswered_questions,
    };
    use crate::{QueryKind, ResultSet};

    fn rows(data: &[&[&str]]) -> ResultSet {
        ResultSet::new(
            data.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn top_articles_link_title_and_author() {
        let result = rows(&[
            &["title", "url", "author"],
            &["Glossary", "https://c/article/1", "Ada"],
        ]);
        assert_eq!(
            format_top_articles(&result),
            "<details><summary style=\"color: #666666;\"><strong>This week&#39;s most popular \
             articles:</strong></summary><ul><li><a href = \"https://c/article/1\">Glossary</a> \
             by Ada</li></ul></details>"
        );
    }

    #[test]
    fn new_articles_link_title_only() {
        let result = rows(&[&["title", "url"], &["Onboarding", "https://c/article/2"]]);
        let html = format_new_articles(&result);
        assert!(html.contains("<strong>Article new arrivals:</strong>"));
        assert!(html.contains("<li> <a href = \"https://c/article/2\" >Onboarding</a> </li>"));
    }

    #[test]
    fn unanswered_questions_use_asker_and_third_column_url() {
        let result = rows(&[
            &["title", "asker", "url"],
            &["Where is revenue?", "Grace", "https://c/conversation/3"],
        ]);
        let html = format_unanswered_questions(&result);
        assert!(html.contains(
            "<li><a href = \"https://c/conversation/3\">Where is revenue?</a> asked by Grace</li>"
        ));
    }

    #[test]
    fn new_queries_use_fourth_column_url() {
        let result = rows(&[
            &["title", "author", "created", "url"],
            &["Daily users", "Linus", "2024-01-01", "https://c/query/4"],
        ]);
        let html = format_new_queries(&result);
        assert!(html.contains("<li><a href = \"https://c/query/4\">Daily users</a> by Linus</li>"));
        assert!(!html.contains("2024-01-01"));
    }

    #[test]
    fn every_kind_skips_only_the_header_row() {
        let result = rows(&[
            &["h0", "h1", "h2", "h3"],
            &["a", "b", "c", "d"],
            &["e", "f", "g", "h"],
            &["i", "j", "k", "l"],
        ]);
        for kind in QueryKind::ALL {
            let html = format_fragment(kind, &result);
            assert_eq!(html.matches("<li>").count(), 3, "kind {kind}");
            assert!(!html.contains("h0"), "kind {kind} rendered the header");
            assert!(html.starts_with("<details>"));
            assert!(html.ends_with("</ul></details>"));
        }
    }

    #[test]
    fn header_only_result_renders_empty_list() {
        let result = rows(&[&["title", "url", "author"]]);
        for kind in QueryKind::ALL {
            let html = format_fragment(kind, &result);
            assert!(html.contains("<ul></ul>"), "kind {kind}");
        }
    }

    #[test]
    fn formatting_is_deterministic() {
        let result = rows(&[&["title", "url", "author"], &["A", "https://c/1", "B"]]);
        for kind in QueryKind::ALL {
            assert_eq!(format_fragment(kind, &result), format_fragment(kind, &result));
        }
    }

    #[test]
    fn missing_cells_render_empty_and_markup_passes_through() {
        let result = rows(&[&["title", "url", "author"], &["<b>Bold</b>"]]);
        let html = format_top_articles(&result);
        assert!(html.contains("<li><a href = \"\"><b>Bold</b></a> by </li>"));
    }
}

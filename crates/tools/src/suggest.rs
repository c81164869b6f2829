//! File-type tool suggestion.
//!
//! Attached files pull in tools that look like they can handle them: a PDF
//! attachment suggests every available tool whose name mentions `pdf`,
//! `document` or `extract_text`, and so on.

use std::collections::BTreeSet;

use stepclaw_core::AttachedResource;

/// Extension → substrings matched (case-insensitively) against tool names.
const FILE_TYPE_PATTERNS: &[(&str, &[&str])] = &[
    (".pdf", &["pdf", "document", "extract_text"]),
    (".png", &["image", "vision", "ocr"]),
    (".jpg", &["image", "vision", "ocr"]),
    (".jpeg", &["image", "vision", "ocr"]),
    (".gif", &["image", "vision"]),
    (".webp", &["image", "vision"]),
    (".bmp", &["image", "vision", "ocr"]),
    (".doc", &["document", "word", "extract_text"]),
    (".docx", &["document", "word", "extract_text"]),
    (".txt", &["text", "document"]),
    (".md", &["markdown", "text", "document"]),
    (".rtf", &["document", "text"]),
    (".csv", &["csv", "spreadsheet", "data", "table"]),
    (".xlsx", &["excel", "spreadsheet", "data", "table"]),
    (".xls", &["excel", "spreadsheet", "data", "table"]),
    (".py", &["python", "code", "execute"]),
    (".js", &["javascript", "code"]),
    (".ts", &["typescript", "code"]),
    (".json", &["json", "data"]),
    (".yaml", &["yaml", "data"]),
    (".yml", &["yaml", "data"]),
    (".xml", &["xml", "data"]),
    (".html", &["html", "web", "scrape"]),
    (".zip", &["archive", "extract"]),
    (".tar", &["archive", "extract"]),
    (".gz", &["archive", "extract"]),
];

/// Patterns for a lowercase extension including the dot.
pub fn patterns_for_extension(extension: &str) -> &'static [&'static str] {
    FILE_TYPE_PATTERNS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, patterns)| *patterns)
        .unwrap_or(&[])
}

/// Available tools that match any attached file's extension, sorted.
pub fn suggest_for_resources(resources: &[AttachedResource], available: &[String]) -> Vec<String> {
    let mut suggested = BTreeSet::new();
    for resource in resources {
        let patterns = patterns_for_extension(&resource.extension());
        if patterns.is_empty() {
            continue;
        }
        for tool in available {
            let lower = tool.to_lowercase();
            if let Some(pattern) = patterns.iter().find(|p| lower.contains(*p)) {
                tracing::debug!(tool = %tool, file = %resource.name, pattern, "Suggested tool for attached file");
                suggested.insert(tool.clone());
            }
        }
    }
    suggested.into_iter().collect()
}

/// Add suggestions to the user's selection.
///
/// A non-empty selection keeps its order with new suggestions appended; an
/// empty or missing selection becomes the suggestions alone. `None` means
/// no tools at all.
pub fn merge_selection(selected: Option<&[String]>, suggested: &[String]) -> Option<Vec<String>> {
    match selected {
        Some(selected) if !selected.is_empty() => {
            let mut merged = selected.to_vec();
            let added: Vec<&String> = suggested.iter().filter(|s| !selected.contains(*s)).collect();
            if !added.is_empty() {
                tracing::info!(?added, "Auto-adding suggested tools based on attached files");
                merged.extend(added.into_iter().cloned());
            }
            Some(merged)
        }
        _ if !suggested.is_empty() => {
            tracing::info!(?suggested, "Auto-selecting tools based on attached files");
            Some(suggested.to_vec())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn files(list: &[&str]) -> Vec<AttachedResource> {
        list.iter()
            .map(|name| AttachedResource::new(*name, format!("/files/{name}")))
            .collect()
    }

    #[test]
    fn pdf_suggests_pdf_tools() {
        let available = names(&[
            "pdfbasic_extract_pdf_text",
            "pdfbasic_analyze_pdf",
            "code_executor_run_python",
        ]);
        let suggested = suggest_for_resources(&files(&["document.pdf"]), &available);
        assert_eq!(suggested, names(&["pdfbasic_analyze_pdf", "pdfbasic_extract_pdf_text"]));
    }

    #[test]
    fn csv_suggests_data_tools() {
        let available = names(&[
            "data_analyzer_process_csv",
            "spreadsheet_read_table",
            "pdfbasic_extract_pdf_text",
        ]);
        let suggested = suggest_for_resources(&files(&["report.2024.01.CSV"]), &available);
        assert_eq!(suggested, names(&["data_analyzer_process_csv", "spreadsheet_read_table"]));
    }

    #[test]
    fn unknown_extension_suggests_nothing() {
        let available = names(&["pdfbasic_extract_pdf_text"]);
        assert!(suggest_for_resources(&files(&["archive.7z", "Makefile"]), &available).is_empty());
    }

    #[test]
    fn merge_appends_to_selection() {
        let selected = names(&["weather_forecast"]);
        let merged = merge_selection(Some(selected.as_slice()), &names(&["pdfbasic_analyze_pdf", "weather_forecast"]));
        assert_eq!(merged, Some(names(&["weather_forecast", "pdfbasic_analyze_pdf"])));
    }

    #[test]
    fn merge_without_selection_uses_suggestions() {
        let suggested = names(&["ocr_extract_text"]);
        let empty: Vec<String> = Vec::new();
        assert_eq!(merge_selection(None, &suggested), Some(suggested.clone()));
        assert_eq!(merge_selection(Some(empty.as_slice()), &suggested), Some(suggested));
        assert_eq!(merge_selection(None, &[]), None);
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(patterns_for_extension(".gif"), &["image", "vision"]);
        assert!(patterns_for_extension(".exe").is_empty());
    }
}

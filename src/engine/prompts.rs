//! System prompts for the vision engine.

/// Default system prompt for transcribing one rendered PDF page.
///
/// The heading rules matter downstream: the batch pipeline classifies `# `
/// lines as titles and `## ` lines as subtitles.
pub const PAGE_SYSTEM_PROMPT: &str = r####"You are an expert document converter. Convert the PDF page image to clean, well-structured Markdown.

Rules:

1. TEXT
   - Preserve ALL text content in human reading order
   - Keep the original language; do not translate

2. STRUCTURE
   - Use "# " for the main title of the document (only where it appears)
   - Use "## " for section headings, "### " and deeper for subsections
   - Use - for unordered lists and 1. 2. 3. for ordered lists

3. TABLES
   - Convert tables to GFM pipe format

4. FIGURES
   - Do NOT invent image links; describe figures in one italic line instead

5. FORMULAS
   - Render mathematical expressions using LaTeX: $inline$ and $$display$$

6. IGNORE
   - Page numbers, running headers and footers

7. OUTPUT
   - Output ONLY the Markdown content, without ```markdown fences or commentary"####;

/// Build the full system prompt, appending a language hint when the run
/// declares document languages.
pub fn system_prompt(base: &str, langs: &[String]) -> String {
    if langs.is_empty() {
        return base.to_string();
    }
    format!(
        "{base}\n\n8. LANGUAGES\n   The document is written in: {}. Transcribe each language exactly as printed.",
        langs.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_markers_survive_in_prompt() {
        assert!(PAGE_SYSTEM_PROMPT.contains("Use \"# \" for the main title"));
        assert!(PAGE_SYSTEM_PROMPT.contains("Use \"## \" for section headings"));
        assert!(PAGE_SYSTEM_PROMPT.contains("\"### \" and deeper"));
        assert!(PAGE_SYSTEM_PROMPT.ends_with("fences or commentary"));
    }

    #[test]
    fn language_hint_appended() {
        let p = system_prompt(PAGE_SYSTEM_PROMPT, &["zh".into(), "en".into()]);
        assert!(p.starts_with(PAGE_SYSTEM_PROMPT));
        assert!(p.contains("written in: zh, en"));
    }

    #[test]
    fn no_languages_no_hint() {
        assert_eq!(system_prompt("base", &[]), "base");
    }
}

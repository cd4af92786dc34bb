//! Artifact extraction: pull a YAML document out of free-form agent text.
//!
//! The single hand-off point between free-text reasoning output and the
//! structured downstream consumers. Deterministic and side-effect-free.

/// Top-level keys that mark the start of a bare (unfenced) workflow document.
const DOCUMENT_HEADS: [&str; 5] = ["name:", "on:", "jobs:", "workflow_dispatch:", "permissions:"];

/// Extract a YAML document from unstructured text.
///
/// Ladder, degrading gracefully rather than erroring:
/// 1. a fenced code block tagged `yaml`/`yml` (or untagged), whose contents
///    are returned verbatim;
/// 2. a bare document starting at the first top-level workflow key, trimmed
///    at trailing markdown prose;
/// 3. `None`.
pub fn extract_yaml(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(fenced) = extract_fenced(text)
        && !fenced.trim().is_empty()
    {
        return Some(fenced);
    }

    extract_bare(text)
}

/// Find the first YAML-compatible fenced code block and return its contents.
fn extract_fenced(text: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("```") {
        let fence_start = search_from + rel;
        let after_ticks = &text[fence_start + 3..];
        let line_end = after_ticks.find('\n')?;
        let tag = after_ticks[..line_end].trim().to_ascii_lowercase();

        if tag.is_empty() || tag == "yaml" || tag == "yml" {
            let body = &after_ticks[line_end + 1..];
            let close = body.find("```")?;
            // Drop the newline that precedes the closing fence.
            return Some(body[..close].trim_end_matches('\n').to_string());
        }

        // A fence for some other language; skip past its closing fence.
        let body = &after_ticks[line_end + 1..];
        let close = body.find("```")?;
        search_from = fence_start + 3 + line_end + 1 + close + 3;
    }
    None
}

/// Capture from the first top-level workflow key to the end of the document,
/// trimming trailing markdown prose.
fn extract_bare(text: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut capturing = false;

    for line in text.lines() {
        let stripped = line.trim();
        if !capturing && DOCUMENT_HEADS.iter().any(|head| stripped.starts_with(head)) {
            capturing = true;
        }
        if capturing {
            if is_prose_terminator(stripped) {
                break;
            }
            lines.push(line);
        }
    }

    if lines.is_empty() {
        return None;
    }
    let doc = lines.join("\n").trim().to_string();
    if doc.is_empty() { None } else { Some(doc) }
}

/// Markdown headers and annotation-style comments mark the end of the bare
/// document. A `# comment` with a space stays part of the YAML.
fn is_prose_terminator(stripped: &str) -> bool {
    if stripped.starts_with("##") {
        return true;
    }
    if let Some(rest) = stripped.strip_prefix('#')
        && !rest.is_empty()
        && !rest.starts_with(' ')
        && !rest.starts_with('!')
    {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "name: ci\non:\n  push:\n    branches: [main]\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v4";

    #[test]
    fn test_fenced_round_trip() {
        let text = format!("```yaml\n{}\n```", DOC);
        assert_eq!(extract_yaml(&text).unwrap(), DOC);
    }

    #[test]
    fn test_fenced_with_surrounding_prose() {
        let text = format!(
            "Here is the generated workflow:\n\n```yaml\n{}\n```\n\nLet me know if you need changes.",
            DOC
        );
        assert_eq!(extract_yaml(&text).unwrap(), DOC);
    }

    #[test]
    fn test_untagged_fence_accepted() {
        let text = format!("```\n{}\n```", DOC);
        assert_eq!(extract_yaml(&text).unwrap(), DOC);
    }

    #[test]
    fn test_other_language_fence_skipped() {
        let text = format!(
            "```json\n{{\"not\": \"yaml\"}}\n```\nAnd the workflow:\n```yaml\n{}\n```",
            DOC
        );
        assert_eq!(extract_yaml(&text).unwrap(), DOC);
    }

    #[test]
    fn test_empty_fence_falls_through_to_bare() {
        let text = format!("```yaml\n\n```\n{}", DOC);
        assert_eq!(extract_yaml(&text).unwrap(), DOC);
    }

    #[test]
    fn test_bare_document_captured_from_first_key() {
        let text = format!("The workflow below covers build and test.\n\n{}", DOC);
        assert_eq!(extract_yaml(&text).unwrap(), DOC);
    }

    #[test]
    fn test_bare_document_trailing_markdown_trimmed() {
        let text = format!("{}\n\n## Required secrets\n- AWS_ACCESS_KEY_ID", DOC);
        let extracted = extract_yaml(&text).unwrap();
        assert_eq!(extracted, DOC);
        assert!(!extracted.contains("Required secrets"));
    }

    #[test]
    fn test_yaml_comments_survive_bare_capture() {
        let doc = "name: ci\n# run on every push\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make";
        assert_eq!(extract_yaml(doc).unwrap(), doc);
    }

    #[test]
    fn test_no_yaml_found() {
        assert_eq!(extract_yaml("I could not produce a workflow, sorry."), None);
        assert_eq!(extract_yaml(""), None);
        assert_eq!(extract_yaml("   \n  "), None);
    }

    #[test]
    fn test_deterministic() {
        let text = format!("prose\n```yaml\n{}\n```", DOC);
        assert_eq!(extract_yaml(&text), extract_yaml(&text));
    }
}

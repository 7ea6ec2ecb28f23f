/// Concepts offered at the first step
pub const CONCEPTS: [&str; 6] = [
    "AI is probabilistic",
    "Latent Space",
    "Adversarial Attacks",
    "Overfitting",
    "Context Window",
    "Bias in Models",
];

const DEFAULT_STEM: &str = "ai-minigame";

/// File name for the generated game, derived from the chosen idea's title
pub fn artifact_filename(title: Option<&str>) -> String {
    format!("{}.html", file_stem(title))
}

/// File name for the saved product requirements document
pub fn specification_filename(title: Option<&str>) -> String {
    format!("{}-prd.md", file_stem(title))
}

fn file_stem(title: Option<&str>) -> String {
    match title.filter(|t| !t.is_empty()) {
        Some(title) => title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect(),
        None => DEFAULT_STEM.to_string(),
    }
}

/// Loose check that generated code is a full HTML document rather than prose
pub fn looks_like_html_document(text: &str) -> bool {
    let head: String = text
        .trim_start()
        .chars()
        .take(512)
        .collect::<String>()
        .to_ascii_lowercase();
    let tail = text.trim_end().to_ascii_lowercase();
    (head.starts_with("<!doctype html") || head.starts_with("<html")) && tail.ends_with("</html>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_filename() {
        assert_eq!(artifact_filename(Some("Overfit Dash")), "overfit-dash.html");
        assert_eq!(
            artifact_filename(Some("Noise & Signal: v2")),
            "noise---signal--v2.html"
        );
        assert_eq!(artifact_filename(None), "ai-minigame.html");
        assert_eq!(artifact_filename(Some("")), "ai-minigame.html");
        assert_eq!(artifact_filename(Some(" Overfit")), "-overfit.html");
    }

    #[test]
    fn test_specification_filename() {
        assert_eq!(
            specification_filename(Some("Overfit Dash")),
            "overfit-dash-prd.md"
        );
    }

    #[test]
    fn test_looks_like_html_document() {
        assert!(looks_like_html_document(
            "<!DOCTYPE html>\n<html><body></body></html>\n"
        ));
        assert!(looks_like_html_document("  <html lang=\"en\"></html>"));
        assert!(!looks_like_html_document("Here is your game: <html></html>"));
        assert!(!looks_like_html_document("<!DOCTYPE html><html><body>"));
    }

    #[test]
    fn test_concepts_are_unique() {
        let mut sorted = CONCEPTS.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), CONCEPTS.len());
    }
}

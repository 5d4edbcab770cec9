use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{
    Confidence, Intent, Matcher, Mode, PatternCatalog, PatternEntry, Template,
};
use crate::services::catalog;
use crate::utils::text::{normalize_whitespace, trim_trailing_punctuation, FoldedText};

/// Maps free text to exactly one [`Intent`].
///
/// Pure: no I/O and no interior mutability. The catalog is shared read-only,
/// so one interpreter can be cloned into any number of threads or tasks.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    catalog: Arc<PatternCatalog>,
}

impl CommandInterpreter {
    pub fn new(catalog: PatternCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn with_shared(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn builtin() -> Self {
        Self::new(catalog::default_catalog())
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Classifies `text`. Never fails: anything unmatched becomes `ai_chat`.
    pub fn interpret(&self, text: &str, mode: Mode) -> Intent {
        if mode == Mode::Chat {
            return Intent::fallback(text);
        }

        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Intent::fallback(text);
        }
        let folded = FoldedText::new(&normalized);

        for entry in self.catalog.entries() {
            for matcher in &entry.matchers {
                if let Some(parameters) = match_one(&folded, entry, matcher) {
                    log::debug!(
                        "[Interpreter] '{}' -> {} {:?}",
                        normalized,
                        entry.category,
                        parameters
                    );
                    return Intent {
                        category: entry.category,
                        parameters,
                        raw_text: text.to_string(),
                        confidence: Confidence::Exact,
                    };
                }
            }
        }

        Intent::fallback(text)
    }
}

fn match_one(
    text: &FoldedText<'_>,
    entry: &PatternEntry,
    matcher: &Matcher,
) -> Option<BTreeMap<String, String>> {
    let hay = text.folded();

    match &matcher.template {
        Template::Literal(literal) => hay.contains(literal.as_str()).then(|| matcher.params.clone()),
        Template::Slotted {
            prefix,
            slot,
            suffix,
        } => {
            if !hay.starts_with(prefix.as_str()) || !hay.ends_with(suffix.as_str()) {
                return None;
            }
            let start = prefix.len();
            let end = hay.len() - suffix.len();
            if end < start {
                return None;
            }

            let mut value = text.original_slice(start, end).trim();
            if entry.strip_punctuation {
                value = trim_trailing_punctuation(value);
            }
            // An empty slot is a non-match so the scan moves on.
            if value.is_empty() {
                return None;
            }

            let mut params = matcher.params.clone();
            params.insert(slot.clone(), value.to_string());
            Some(params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntentCategory;
    use crate::services::catalog::catalog_from_json;

    fn pc(text: &str) -> Intent {
        CommandInterpreter::builtin().interpret(text, Mode::PcControl)
    }

    #[test]
    fn test_slot_keeps_original_case_and_raw_text() {
        let intent = pc("  Create   Folder   Quarterly Reports ");
        assert_eq!(intent.category, IntentCategory::FolderCreate);
        assert_eq!(intent.param("name"), Some("Quarterly Reports"));
        assert_eq!(intent.raw_text, "  Create   Folder   Quarterly Reports ");
    }

    #[test]
    fn test_trailing_punctuation_stripped_from_slots() {
        let intent = pc("open spotify.");
        assert_eq!(intent.category, IntentCategory::LaunchApp);
        assert_eq!(intent.param("app"), Some("spotify"));
    }

    #[test]
    fn test_shell_command_kept_verbatim() {
        let intent = pc("execute echo done!");
        assert_eq!(intent.category, IntentCategory::ShellExecute);
        assert_eq!(intent.param("cmd"), Some("echo done!"));
    }

    #[test]
    fn test_suffix_template_extracts_middle() {
        let intent = pc("search rust lifetimes on google");
        assert_eq!(intent.category, IntentCategory::WebSearch);
        assert_eq!(intent.param("query"), Some("rust lifetimes"));

        let intent = pc("search for tide tables on google");
        assert_eq!(intent.param("query"), Some("tide tables"));
    }

    #[test]
    fn test_prefix_and_suffix_must_not_overlap() {
        // "search on google" has nothing between "search " and " on google".
        let intent = pc("search on google");
        assert_eq!(intent.category, IntentCategory::AiChat);
    }

    #[test]
    fn test_fixed_params_copied_from_matcher() {
        let intent = pc("please turn the volume up, volume up!");
        assert_eq!(intent.category, IntentCategory::SystemVolume);
        assert_eq!(intent.param("delta"), Some("up"));

        let intent = pc("unmute volume");
        assert_eq!(intent.param("delta"), Some("unmute"));

        let intent = pc("set volume to 40");
        assert_eq!(intent.param("level"), Some("40"));
        assert_eq!(intent.param("delta"), None);
    }

    #[test]
    fn test_higher_priority_category_wins_overlap() {
        assert_eq!(pc("close window").category, IntentCategory::WindowControl);
        assert_eq!(pc("open website example.com").category, IntentCategory::WebOpen);
        assert_eq!(pc("go to folder Downloads").category, IntentCategory::Navigate);
        assert_eq!(
            pc("take a screenshot of chrome").category,
            IntentCategory::Screenshot
        );
    }

    #[test]
    fn test_empty_slot_falls_through_to_next_matcher() {
        let json = r#"{ "entries": [
            { "category": "launch_app", "priority": 2, "matchers": ["open {app}"] },
            { "category": "file_list", "priority": 1, "matchers": ["open"] }
        ] }"#;
        let interpreter = CommandInterpreter::new(catalog_from_json(json).unwrap());
        // "." is stripped, leaving an empty slot for the launch_app template.
        let intent = interpreter.interpret("open .", Mode::PcControl);
        assert_eq!(intent.category, IntentCategory::FileList);
        assert_eq!(intent.confidence, Confidence::Exact);
        assert!(intent.parameters.is_empty());
    }

    #[test]
    fn test_whitespace_only_is_fallback() {
        let intent = pc(" \t ");
        assert_eq!(intent.category, IntentCategory::AiChat);
        assert_eq!(intent.confidence, Confidence::Fallback);
    }

    #[test]
    fn test_empty_catalog_always_falls_back() {
        let interpreter = CommandInterpreter::new(PatternCatalog::default());
        let intent = interpreter.interpret("open chrome", Mode::PcControl);
        assert!(intent.is_chat());
    }

    #[test]
    fn test_interpreter_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandInterpreter>();

        let interpreter = CommandInterpreter::builtin();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let local = interpreter.clone();
                std::thread::spawn(move || local.interpret("open chrome", Mode::PcControl))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().param("app"), Some("chrome"));
        }
    }
}

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{
    CatalogFile, EntrySpec, IntentCategory, Matcher, MatcherSpec, PatternCatalog, PatternEntry,
    Template,
};
use crate::utils::text::normalize_whitespace;

/// Load-time configuration errors. Reported once at startup, never per call.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{category}: empty template")]
    EmptyTemplate { category: IntentCategory },
    #[error("{category}: template '{template}' has {count} placeholders (at most one allowed)")]
    TooManyPlaceholders {
        category: IntentCategory,
        template: String,
        count: usize,
    },
    #[error("{category}: template '{template}' has a malformed placeholder")]
    MalformedPlaceholder {
        category: IntentCategory,
        template: String,
    },
    #[error("{category}: entry has no matchers")]
    NoMatchers { category: IntentCategory },
    #[error("ai_chat is the implicit fallback and cannot appear in the catalog")]
    FallbackInCatalog,
}

// ─── Priorities ───

pub const PRIORITY_EXPLICIT_PREFIX: i32 = 100;
pub const PRIORITY_FILE_VERBS: i32 = 80;
pub const PRIORITY_SYSTEM_PHRASES: i32 = 60;
pub const PRIORITY_WEB: i32 = 40;
pub const PRIORITY_APPS: i32 = 20;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    // Literal pattern; compilation cannot fail.
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder regex"))
}

/// Parses one template string into its lowercase, normalized form.
pub fn parse_template(category: IntentCategory, raw: &str) -> Result<Template, CatalogError> {
    let text = normalize_whitespace(raw).to_lowercase();
    if text.is_empty() {
        return Err(CatalogError::EmptyTemplate { category });
    }

    let malformed = || CatalogError::MalformedPlaceholder {
        category,
        template: raw.to_string(),
    };

    let captures: Vec<_> = placeholder_regex().captures_iter(&text).collect();
    match captures.len() {
        0 => {
            if text.contains(['{', '}']) {
                return Err(malformed());
            }
            Ok(Template::Literal(text))
        }
        1 => {
            let whole = captures[0].get(0).ok_or_else(malformed)?;
            let slot = captures[0]
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if slot.is_empty() {
                return Err(malformed());
            }

            let prefix = &text[..whole.start()];
            let suffix = &text[whole.end()..];
            if prefix.contains(['{', '}']) || suffix.contains(['{', '}']) {
                return Err(malformed());
            }

            Ok(Template::Slotted {
                prefix: prefix.to_string(),
                slot,
                suffix: suffix.to_string(),
            })
        }
        count => Err(CatalogError::TooManyPlaceholders {
            category,
            template: raw.to_string(),
            count,
        }),
    }
}

fn compile_entry(spec: EntrySpec) -> Result<PatternEntry, CatalogError> {
    if spec.category == IntentCategory::AiChat {
        return Err(CatalogError::FallbackInCatalog);
    }
    if spec.matchers.is_empty() {
        return Err(CatalogError::NoMatchers {
            category: spec.category,
        });
    }

    let matchers = spec
        .matchers
        .iter()
        .map(|m| {
            Ok(Matcher {
                template: parse_template(spec.category, m.template())?,
                params: m.params(),
            })
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;

    Ok(PatternEntry {
        category: spec.category,
        priority: spec.priority,
        strip_punctuation: spec.strip_punctuation,
        matchers,
    })
}

pub fn compile(file: CatalogFile) -> Result<PatternCatalog, CatalogError> {
    let entries = file
        .entries
        .into_iter()
        .map(compile_entry)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PatternCatalog::new(entries))
}

pub fn catalog_from_json(json: &str) -> Result<PatternCatalog, CatalogError> {
    let file: CatalogFile = serde_json::from_str(json)?;
    compile(file)
}

pub fn load_catalog(path: &Path) -> Result<PatternCatalog, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let catalog = catalog_from_json(&content)?;
    log::info!(
        "[Catalog] Loaded {} entries from {}",
        catalog.len(),
        path.display()
    );
    Ok(catalog)
}

/// Loads the override file if one is configured, otherwise the built-in table.
/// A broken override is logged and replaced by the built-in table.
pub fn resolve_catalog(path: Option<&Path>) -> PatternCatalog {
    match path {
        Some(p) => load_catalog(p).unwrap_or_else(|e| {
            log::error!("[Catalog] {}; using built-in catalog", e);
            default_catalog()
        }),
        None => default_catalog(),
    }
}

// ─── Built-in table ───

fn t(template: &str) -> MatcherSpec {
    MatcherSpec::Template(template.to_string())
}

fn p(template: &str, key: &str, value: &str) -> MatcherSpec {
    let mut params = BTreeMap::new();
    params.insert(key.to_string(), value.to_string());
    MatcherSpec::WithParams {
        template: template.to_string(),
        params,
    }
}

fn entry(category: IntentCategory, priority: i32, matchers: Vec<MatcherSpec>) -> EntrySpec {
    EntrySpec {
        category,
        priority,
        strip_punctuation: true,
        matchers,
    }
}

const FOLDER_VERBS: &[&str] = &[
    "create a folder named",
    "create folder named",
    "create a folder called",
    "create folder called",
    "create a folder",
    "create folder",
    "make folder",
    "new folder",
];

const FOLDER_PLACES: &[(&str, &str)] = &[
    ("on desktop", "desktop"),
    ("on the desktop", "desktop"),
    ("on my desktop", "desktop"),
    ("in downloads", "downloads"),
    ("in my downloads", "downloads"),
    ("in documents", "documents"),
    ("in my documents", "documents"),
    ("in home", "home"),
];

/// Location-suffixed forms come first so the place phrase never ends up in
/// the folder name.
fn folder_matchers() -> Vec<MatcherSpec> {
    let mut matchers: Vec<MatcherSpec> = FOLDER_VERBS
        .iter()
        .flat_map(|verb| {
            FOLDER_PLACES
                .iter()
                .map(move |(phrase, place)| p(&format!("{} {{name}} {}", verb, phrase), "location", place))
        })
        .collect();
    matchers.extend(FOLDER_VERBS.iter().map(|verb| t(&format!("{} {{name}}", verb))));
    matchers.extend([t("make directory {name}"), t("mkdir {name}")]);
    matchers
}

pub fn default_catalog_spec() -> CatalogFile {
    use IntentCategory::*;

    let shell = EntrySpec {
        strip_punctuation: false,
        ..entry(
            ShellExecute,
            PRIORITY_EXPLICIT_PREFIX,
            vec![t("execute {cmd}"), t("run command {cmd}"), t("run shell {cmd}")],
        )
    };

    let entries = vec![
        shell,
        entry(
            FileCreate,
            PRIORITY_FILE_VERBS,
            vec![
                t("create a file named {path}"),
                t("create file named {path}"),
                t("create a file {path}"),
                t("create file {path}"),
                t("make file {path}"),
                t("new file {path}"),
                t("touch {path}"),
            ],
        ),
        entry(FolderCreate, PRIORITY_FILE_VERBS, folder_matchers()),
        entry(
            FileList,
            PRIORITY_FILE_VERBS,
            vec![
                t("list files in {path}"),
                t("show files in {path}"),
                t("list files"),
                t("show files"),
                t("directory contents"),
            ],
        ),
        entry(
            Navigate,
            PRIORITY_FILE_VERBS,
            vec![
                t("navigate to {path}"),
                t("change directory to {path}"),
                t("go to folder {path}"),
                t("cd {path}"),
            ],
        ),
        entry(
            SystemPower,
            PRIORITY_SYSTEM_PHRASES,
            vec![
                p("shutdown", "action", "shutdown"),
                p("shut down", "action", "shutdown"),
                p("power off", "action", "shutdown"),
                p("restart computer", "action", "restart"),
                p("restart the computer", "action", "restart"),
                p("reboot", "action", "restart"),
                p("go to sleep", "action", "sleep"),
                p("sleep mode", "action", "sleep"),
                p("hibernate", "action", "sleep"),
                p("lock screen", "action", "lock"),
                p("lock computer", "action", "lock"),
            ],
        ),
        entry(
            SystemVolume,
            PRIORITY_SYSTEM_PHRASES,
            vec![
                t("set volume to {level}"),
                t("volume to {level}"),
                p("volume up", "delta", "up"),
                p("increase volume", "delta", "up"),
                p("turn up the volume", "delta", "up"),
                p("louder", "delta", "up"),
                p("volume down", "delta", "down"),
                p("decrease volume", "delta", "down"),
                p("turn down the volume", "delta", "down"),
                p("quieter", "delta", "down"),
                p("unmute", "delta", "unmute"),
                p("mute the volume", "delta", "mute"),
                p("mute volume", "delta", "mute"),
                p("mute sound", "delta", "mute"),
                p("mute audio", "delta", "mute"),
            ],
        ),
        entry(
            MediaControl,
            PRIORITY_SYSTEM_PHRASES,
            vec![
                p("play/pause", "action", "play_pause"),
                p("play music", "action", "play_pause"),
                p("pause music", "action", "play_pause"),
                p("resume music", "action", "play_pause"),
                p("next track", "action", "next"),
                p("next song", "action", "next"),
                p("skip song", "action", "next"),
                p("previous track", "action", "previous"),
                p("previous song", "action", "previous"),
                p("last song", "action", "previous"),
                p("stop music", "action", "stop"),
            ],
        ),
        entry(
            WindowControl,
            PRIORITY_SYSTEM_PHRASES,
            vec![
                p("minimize window", "action", "minimize"),
                p("minimize all", "action", "minimize"),
                p("show desktop", "action", "minimize"),
                p("maximize window", "action", "maximize"),
                p("fullscreen", "action", "maximize"),
                p("close window", "action", "close"),
                p("switch window", "action", "switch"),
            ],
        ),
        entry(
            Screenshot,
            PRIORITY_SYSTEM_PHRASES,
            vec![t("screenshot"), t("screen shot"), t("capture screen"), t("snapshot")],
        ),
        entry(
            WebSearch,
            PRIORITY_WEB,
            vec![
                t("search google for {query}"),
                t("search the web for {query}"),
                t("search for {query} on google"),
                t("search {query} on google"),
                t("google search {query}"),
                t("search for {query}"),
                t("google {query}"),
                t("look up {query}"),
            ],
        ),
        entry(
            WebOpen,
            PRIORITY_WEB,
            vec![
                t("open website {url}"),
                t("open the website {url}"),
                t("browse to {url}"),
                t("visit {url}"),
                t("go to {url}"),
            ],
        ),
        entry(
            LaunchApp,
            PRIORITY_APPS,
            vec![
                t("open application {app}"),
                t("open app {app}"),
                t("open the {app}"),
                t("open {app}"),
                t("launch {app}"),
                t("start app {app}"),
                t("start {app}"),
            ],
        ),
        entry(
            CloseApp,
            PRIORITY_APPS,
            vec![
                t("close application {app}"),
                t("close app {app}"),
                t("close the {app}"),
                t("close {app}"),
                t("quit {app}"),
                t("kill process {app}"),
                t("kill {app}"),
            ],
        ),
    ];

    CatalogFile { entries }
}

pub fn default_catalog() -> PatternCatalog {
    // The built-in table is covered by tests; a failure here is a code defect.
    compile(default_catalog_spec()).unwrap_or_else(|e| {
        log::error!("[Catalog] Built-in catalog is invalid: {}", e);
        PatternCatalog::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_compiles() {
        let catalog = compile(default_catalog_spec()).unwrap();
        assert_eq!(catalog.len(), 14);
        assert_eq!(catalog.entries()[0].category, IntentCategory::ShellExecute);
        assert_eq!(
            catalog.entries().last().unwrap().category,
            IntentCategory::CloseApp
        );
    }

    #[test]
    fn test_folder_location_forms_precede_generic_ones() {
        let matchers = folder_matchers();
        let first_generic = matchers
            .iter()
            .position(|m| m.params().is_empty())
            .unwrap();
        assert!(first_generic > 0);
        assert!(matchers[first_generic..].iter().all(|m| m.params().is_empty()));
        assert_eq!(
            matchers[0].template(),
            "create a folder named {name} on desktop"
        );
        assert_eq!(matchers[0].params().get("location").map(String::as_str), Some("desktop"));
    }

    #[test]
    fn test_builtin_catalog_is_sorted_by_priority() {
        let catalog = default_catalog();
        let priorities: Vec<i32> = catalog.entries().iter().map(|e| e.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_parse_literal_and_slotted() {
        let lit = parse_template(IntentCategory::Screenshot, "  Take   A Screenshot ").unwrap();
        assert_eq!(lit, Template::Literal("take a screenshot".to_string()));

        let slotted = parse_template(IntentCategory::WebSearch, "search {query} on Google").unwrap();
        assert_eq!(
            slotted,
            Template::Slotted {
                prefix: "search ".to_string(),
                slot: "query".to_string(),
                suffix: " on google".to_string(),
            }
        );
    }

    #[test]
    fn test_two_placeholders_rejected() {
        let err = parse_template(IntentCategory::FileCreate, "copy {src} to {dst}").unwrap_err();
        assert!(matches!(err, CatalogError::TooManyPlaceholders { count: 2, .. }));
    }

    #[test]
    fn test_malformed_placeholders_rejected() {
        for bad in ["open {", "open {}", "open } now", "open {{app}}"] {
            let result = parse_template(IntentCategory::LaunchApp, bad);
            assert!(result.is_err(), "template '{}' should be rejected", bad);
        }
        assert!(matches!(
            parse_template(IntentCategory::LaunchApp, "   "),
            Err(CatalogError::EmptyTemplate { .. })
        ));
    }

    #[test]
    fn test_json_catalog_with_both_matcher_forms() {
        let json = r#"{
            "entries": [
                {
                    "category": "system_volume",
                    "priority": 5,
                    "matchers": [
                        "set volume to {level}",
                        { "template": "volume up", "params": { "delta": "up" } }
                    ]
                },
                {
                    "category": "shell_execute",
                    "priority": 9,
                    "strip_punctuation": false,
                    "matchers": ["run {cmd}"]
                }
            ]
        }"#;

        let catalog = catalog_from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entries()[0].category, IntentCategory::ShellExecute);
        assert!(!catalog.entries()[0].strip_punctuation);

        let volume = &catalog.entries()[1];
        assert!(volume.strip_punctuation);
        assert_eq!(volume.matchers[1].params.get("delta").map(String::as_str), Some("up"));
    }

    #[test]
    fn test_ai_chat_entry_rejected() {
        let json = r#"{ "entries": [ { "category": "ai_chat", "priority": 1, "matchers": ["hello"] } ] }"#;
        assert!(matches!(
            catalog_from_json(json),
            Err(CatalogError::FallbackInCatalog)
        ));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let json = r#"{ "entries": [ { "category": "teleport", "priority": 1, "matchers": ["beam me up"] } ] }"#;
        assert!(matches!(catalog_from_json(json), Err(CatalogError::Json(_))));
    }

    #[test]
    fn test_entry_without_matchers_rejected() {
        let json = r#"{ "entries": [ { "category": "screenshot", "priority": 1, "matchers": [] } ] }"#;
        assert!(matches!(
            catalog_from_json(json),
            Err(CatalogError::NoMatchers { .. })
        ));
    }

    #[test]
    fn test_load_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        std::fs::write(
            &path,
            r#"{ "entries": [ { "category": "screenshot", "priority": 1, "matchers": ["grab screen"] } ] }"#,
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 1);

        let missing = load_catalog(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(CatalogError::Io { .. })));
    }

    #[test]
    fn test_resolve_catalog_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let catalog = resolve_catalog(Some(&path));
        assert_eq!(catalog, default_catalog());
    }
}

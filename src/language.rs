//! Highlight language lookup by file name.
//!
//! Grammars themselves live in the rendering layer; the session core only
//! records which one the active file should use.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    JavaScript,
    TypeScript,
    Html,
    Css,
    Json,
    Markdown,
}

/// Files that are JSON regardless of how they would be matched by extension
const JSON_FILE_NAMES: &[&str] = &["package.json", "tsconfig.json", "angular.json"];

impl Language {
    /// Pick the language for a file name or path. Unknown extensions fall
    /// back to JavaScript.
    pub fn from_file_name(name: &str) -> Self {
        let name = name.rsplit('/').next().unwrap_or(name).to_lowercase();
        if JSON_FILE_NAMES.contains(&name.as_str()) {
            return Language::Json;
        }

        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        match extension {
            "js" | "jsx" | "mjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "html" | "htm" => Language::Html,
            "css" | "scss" | "sass" | "less" => Language::Css,
            "json" => Language::Json,
            "md" | "markdown" => Language::Markdown,
            _ => Language::JavaScript,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Html => "html",
            Language::Css => "css",
            Language::Json => "json",
            Language::Markdown => "markdown",
        }
    }
}

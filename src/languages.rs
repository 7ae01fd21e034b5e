//! Unified language registry.
//!
//! Single source of truth for extension -> language mappings used by file
//! filtering (which extensions are indexable code), preprocessing (semantic
//! language codes for the chunker), and display (lexer names).

/// Information about one file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageInfo {
    /// Language code for semantic processing (e.g. "py", "ts"). Used by the
    /// chunker to pick a grammar and stored on every chunk.
    pub semantic: &'static str,
    /// Lexer name for syntax display (e.g. "python").
    pub lexer: &'static str,
    /// Whether the extension represents indexable source code. Config, data,
    /// and documentation files are rendered when shown but never indexed.
    pub is_code: bool,
}

const fn code(semantic: &'static str, lexer: &'static str) -> LanguageInfo {
    LanguageInfo {
        semantic,
        lexer,
        is_code: true,
    }
}

const fn text(lexer: &'static str) -> LanguageInfo {
    LanguageInfo {
        semantic: "txt",
        lexer,
        is_code: false,
    }
}

/// Master registry mapping lowercase file extensions (without the dot) to
/// language info. To add a language, add a single entry here.
pub const LANGUAGE_REGISTRY: &[(&str, LanguageInfo)] = &[
    // Python
    ("py", code("py", "python")),
    ("pyi", code("py", "python")),
    // JavaScript/TypeScript
    ("js", code("js", "javascript")),
    ("jsx", code("js", "javascript")),
    ("mjs", code("js", "javascript")),
    ("cjs", code("js", "javascript")),
    ("ts", code("ts", "typescript")),
    ("tsx", code("ts", "typescript")),
    // Go
    ("go", code("go", "go")),
    // Rust
    ("rs", code("rs", "rust")),
    // Java/JVM
    ("java", code("java", "java")),
    ("kt", code("java", "kotlin")),
    ("scala", code("java", "scala")),
    // C/C++
    ("c", code("c", "c")),
    ("h", code("c", "c")),
    ("cpp", code("cpp", "cpp")),
    ("cc", code("cpp", "cpp")),
    ("cxx", code("cpp", "cpp")),
    ("hpp", code("cpp", "cpp")),
    ("hh", code("cpp", "cpp")),
    ("hxx", code("cpp", "cpp")),
    // C#
    ("cs", code("cs", "csharp")),
    // Ruby
    ("rb", code("rb", "ruby")),
    // PHP
    ("php", code("php", "php")),
    // Swift
    ("swift", code("swift", "swift")),
    // Shell
    ("sh", code("sh", "bash")),
    ("bash", code("sh", "bash")),
    ("zsh", code("sh", "bash")),
    // Web frameworks
    ("vue", code("vue", "vue")),
    ("svelte", code("svelte", "html")),
    // Query/Schema languages
    ("sql", code("sql", "sql")),
    ("proto", code("proto", "protobuf")),
    ("graphql", code("graphql", "graphql")),
    // Data/Config (highlighted but not indexed as code)
    ("yaml", text("yaml")),
    ("yml", text("yaml")),
    ("json", text("json")),
    ("toml", text("toml")),
    // Documentation (highlighted but not indexed as code)
    ("md", text("markdown")),
    ("txt", text("text")),
];

const DEFAULT_LANGUAGE: LanguageInfo = text("text");

fn lookup(ext: &str) -> Option<LanguageInfo> {
    let ext = ext.to_lowercase();
    LANGUAGE_REGISTRY
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, info)| *info)
}

fn ext_of(path: &std::path::Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Semantic language code for a path. Defaults to "txt" for unknown
/// extensions.
pub fn semantic_language(path: &std::path::Path) -> &'static str {
    lookup(&ext_of(path)).unwrap_or(DEFAULT_LANGUAGE).semantic
}

/// Lexer name for display purposes. Defaults to "text".
pub fn lexer_name(path: &std::path::Path) -> &'static str {
    lookup(&ext_of(path)).unwrap_or(DEFAULT_LANGUAGE).lexer
}

/// Whether the path's extension represents indexable source code.
pub fn is_code_file(path: &std::path::Path) -> bool {
    lookup(&ext_of(path)).map(|i| i.is_code).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn semantic_codes() {
        assert_eq!(semantic_language(Path::new("a/b/main.py")), "py");
        assert_eq!(semantic_language(Path::new("lib.RS")), "rs");
        assert_eq!(semantic_language(Path::new("page.tsx")), "ts");
        assert_eq!(semantic_language(Path::new("notes.md")), "txt");
        assert_eq!(semantic_language(Path::new("Makefile")), "txt");
    }

    #[test]
    fn code_detection_excludes_config_and_docs() {
        assert!(is_code_file(Path::new("main.go")));
        assert!(is_code_file(Path::new("schema.sql")));
        assert!(!is_code_file(Path::new("config.yaml")));
        assert!(!is_code_file(Path::new("README.md")));
        assert!(!is_code_file(Path::new("Cargo.toml")));
        assert!(!is_code_file(Path::new("no_extension")));
    }

    #[test]
    fn lexer_names_for_display() {
        assert_eq!(lexer_name(Path::new("x.kt")), "kotlin");
        assert_eq!(lexer_name(Path::new("x.unknown")), "text");
    }
}

//! Split file text into searchable chunks.
//!
//! Primary strategy: parse with a tree-sitter grammar and cut at top-level
//! declaration boundaries. Each declaration owns a "territory" running from
//! its first line to the next declaration's first line, so the whole file is
//! covered; text before the first declaration (imports, module docs) becomes
//! a preamble chunk with no symbol. Territories longer than the configured
//! cap are subdivided into line windows that keep the enclosing symbol name.
//!
//! Fallback strategy, for languages without a grammar, unparseable files,
//! and plain text: overlapping line windows. Whitespace-only chunks are
//! dropped everywhere.

use tree_sitter::{Language, Node, Parser};

use crate::config::ChunkingConfig;

/// A chunk fresh out of the splitter, before identity/hashing is attached.
/// Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub symbol: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

/// Split `source` according to its semantic language code.
pub fn chunk_source(lang: &str, source: &str, cfg: &ChunkingConfig) -> Vec<RawChunk> {
    if source.trim().is_empty() {
        return Vec::new();
    }
    let lines: Vec<&str> = source.lines().collect();

    if let Some(language) = grammar_for(lang) {
        if let Some(symbols) = top_level_symbols(&language, lang, source) {
            if !symbols.is_empty() {
                return territory_chunks(&symbols, &lines, cfg);
            }
        }
    }
    window_chunks(&lines, 0, lines.len(), None, cfg)
}

/// One top-level declaration anchor.
#[derive(Debug, Clone)]
struct SymbolAnchor {
    name: String,
    /// 0-based first source row of the declaration.
    start_row: usize,
}

fn territory_chunks(
    symbols: &[SymbolAnchor],
    lines: &[&str],
    cfg: &ChunkingConfig,
) -> Vec<RawChunk> {
    let total = lines.len();
    let mut chunks = Vec::new();

    // Preamble before the first declaration.
    let first_start = symbols[0].start_row.min(total);
    if first_start > 0 {
        chunks.extend(emit_region(lines, 0, first_start, None, cfg));
    }

    for (i, sym) in symbols.iter().enumerate() {
        let start = sym.start_row.min(total);
        let end = symbols
            .get(i + 1)
            .map(|next| next.start_row)
            .unwrap_or(total)
            .min(total);
        if start >= end {
            continue;
        }
        chunks.extend(emit_region(lines, start, end, Some(sym.name.clone()), cfg));
    }
    chunks
}

/// Emit one region [start, end) as a single chunk, or as windows when it
/// exceeds the cap.
fn emit_region(
    lines: &[&str],
    start: usize,
    end: usize,
    symbol: Option<String>,
    cfg: &ChunkingConfig,
) -> Vec<RawChunk> {
    if end - start > cfg.max_chunk_lines.max(1) {
        return window_chunks(lines, start, end, symbol, cfg);
    }
    make_chunk(lines, start, end, symbol)
        .into_iter()
        .collect()
}

/// Sliding windows over [start, end). Stride below the window height gives
/// overlap so matches near window edges aren't split away from context.
fn window_chunks(
    lines: &[&str],
    start: usize,
    end: usize,
    symbol: Option<String>,
    cfg: &ChunkingConfig,
) -> Vec<RawChunk> {
    let window = cfg.window_lines.max(1);
    let stride = cfg.stride_lines.clamp(1, window);
    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let window_end = (cursor + window).min(end);
        chunks.extend(make_chunk(lines, cursor, window_end, symbol.clone()));
        if window_end == end {
            break;
        }
        cursor += stride;
    }
    chunks
}

fn make_chunk(
    lines: &[&str],
    start: usize,
    end: usize,
    symbol: Option<String>,
) -> Option<RawChunk> {
    let content = lines[start..end].join("\n");
    if content.trim().is_empty() {
        return None;
    }
    Some(RawChunk {
        symbol,
        start_line: start as u32 + 1,
        end_line: end as u32,
        content,
    })
}

// ── Grammar plumbing ──────────────────────────────────────────────────────

fn grammar_for(lang: &str) -> Option<Language> {
    match lang {
        "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
        "py" => Some(tree_sitter_python::LANGUAGE.into()),
        "ts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "js" => Some(tree_sitter_javascript::LANGUAGE.into()),
        #[cfg(feature = "lang-go")]
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        #[cfg(feature = "lang-java")]
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        #[cfg(feature = "lang-c")]
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        #[cfg(feature = "lang-cpp")]
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        _ => None,
    }
}

fn declaration_kinds(lang: &str) -> &'static [&'static str] {
    match lang {
        "rs" => &[
            "function_item",
            "struct_item",
            "enum_item",
            "trait_item",
            "impl_item",
            "mod_item",
            "macro_definition",
        ],
        "py" => &[
            "function_definition",
            "class_definition",
            "decorated_definition",
        ],
        "ts" => &[
            "function_declaration",
            "class_declaration",
            "abstract_class_declaration",
            "interface_declaration",
            "enum_declaration",
            "type_alias_declaration",
            "lexical_declaration",
            "variable_declaration",
            "export_statement",
        ],
        "js" => &[
            "function_declaration",
            "class_declaration",
            "lexical_declaration",
            "variable_declaration",
            "export_statement",
        ],
        "go" => &[
            "function_declaration",
            "method_declaration",
            "type_declaration",
        ],
        "java" => &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "record_declaration",
        ],
        "c" => &[
            "function_definition",
            "struct_specifier",
            "enum_specifier",
            "union_specifier",
        ],
        "cpp" => &[
            "function_definition",
            "class_specifier",
            "struct_specifier",
            "enum_specifier",
            "namespace_definition",
            "template_declaration",
        ],
        _ => &[],
    }
}

/// Parse and collect named top-level declarations in source order. `None`
/// means the parse itself failed (caller falls back to windows); an empty
/// vec means the file parsed but holds nothing chunkable at the top level.
fn top_level_symbols(language: &Language, lang: &str, source: &str) -> Option<Vec<SymbolAnchor>> {
    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    let kinds = declaration_kinds(lang);

    let mut anchors: Vec<SymbolAnchor> = Vec::new();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        if !kinds.contains(&node.kind()) {
            continue;
        }
        let Some(name) = symbol_label(lang, node, source) else {
            continue;
        };
        let start_row = node.start_position().row;
        // Two declarations on one line anchor only once.
        if anchors.last().map(|a| a.start_row) == Some(start_row) {
            continue;
        }
        anchors.push(SymbolAnchor {
            name,
            start_row,
        });
    }
    Some(anchors)
}

fn node_text(node: Node<'_>, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes())
        .ok()
        .map(|t| t.to_string())
}

/// Resolve the identifier a declaration node introduces.
fn symbol_label(lang: &str, node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        // Wrappers: descend to the declaration they carry.
        "decorated_definition" => {
            let inner = node.child_by_field_name("definition")?;
            symbol_label(lang, inner, source)
        }
        "export_statement" => {
            let inner = node.child_by_field_name("declaration")?;
            symbol_label(lang, inner, source)
        }
        "template_declaration" => {
            let mut cursor = node.walk();
            let result = node
                .named_children(&mut cursor)
                .find(|c| {
                    matches!(
                        c.kind(),
                        "function_definition" | "class_specifier" | "struct_specifier"
                    )
                })
                .and_then(|inner| symbol_label(lang, inner, source));
            result
        }
        // `impl Foo` / `impl Trait for Foo`: the type is the symbol.
        "impl_item" => node
            .child_by_field_name("type")
            .and_then(|t| node_text(t, source)),
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let result = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| d.child_by_field_name("name"))
                .and_then(|n| node_text(n, source));
            result
        }
        // Go `type ( ... )` blocks: take the first spec's name.
        "type_declaration" => {
            let mut cursor = node.walk();
            let result = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "type_spec")
                .and_then(|s| s.child_by_field_name("name"))
                .and_then(|n| node_text(n, source));
            result
        }
        "function_definition" if matches!(lang, "c" | "cpp") => c_declarator_name(node, source),
        _ => node
            .child_by_field_name("name")
            .and_then(|n| node_text(n, source)),
    }
}

/// C/C++ function names hide inside nested declarators
/// (`static int *name(args)` parses as pointer/function declarators).
fn c_declarator_name(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
            | "operator_name" => return node_text(current, source),
            _ => {
                current = current
                    .child_by_field_name("declarator")
                    .or_else(|| current.named_child(0))?;
            }
        }
    }
}

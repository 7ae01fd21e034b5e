//! Result presentation: ripgrep-style grouped output for `find`, chunk and
//! context rendering for `cat`, and the human summaries for `sync` and
//! `status`. All result data goes to stdout; everything advisory goes to
//! stderr at the call sites in main.

use std::path::Path;

use colored::Colorize;
use serde_json::json;

use crate::cache::CachedResult;
use crate::types::{IndexResponse, SearchResult};

/// Replace each occurrence of `symbol` with a highlighted rendering.
fn highlight_symbol(text: &str, symbol: Option<&str>) -> String {
    match symbol {
        Some(sym) if !sym.is_empty() && text.contains(sym) => {
            text.replace(sym, &format!("{}", sym.red().bold()))
        }
        _ => text.to_string(),
    }
}

/// Grouped, ranked human output for `find`.
pub fn print_find_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    let mut current_path: Option<&str> = None;
    for result in results {
        // Results arrive rank-ordered; group consecutive hits per file.
        if current_path != Some(result.chunk.path.as_str()) {
            if current_path.is_some() {
                println!();
            }
            println!("{}", result.chunk.path.magenta().bold());
            current_path = Some(result.chunk.path.as_str());
        }

        let rank = format!("[{}]", result.rank).green().bold();
        let line = format!("{}", result.chunk.start_line).dimmed();
        let preview = highlight_symbol(&result.preview, result.chunk.symbol.as_deref());
        println!("{rank} {line}:{preview}");
    }
    println!();
}

/// Deterministic JSON rendering for `find --json`: same query over an
/// unchanged index yields byte-identical output.
pub fn find_results_json(results: &[SearchResult]) -> String {
    let items: Vec<_> = results
        .iter()
        .map(|r| {
            json!({
                "rank": r.rank,
                "score": r.score,
                "path": r.chunk.path,
                "lang": r.chunk.lang,
                "symbol": r.chunk.symbol,
                "start_line": r.chunk.start_line,
                "end_line": r.chunk.end_line,
                "content": r.chunk.content,
                "chunk_id": r.chunk.id,
                "explanation": r.explanation,
            })
        })
        .collect();
    serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
}

/// `cat`: header plus chunk content, optionally with surrounding file
/// context (chunk lines plain, context lines dimmed).
pub fn print_chunk(result: &CachedResult, rank: Option<usize>, repo_root: &Path, context: usize) {
    println!("{}", result.path.magenta().bold());

    let line = format!("{}", result.start_line).dimmed();
    let symbol_part = match &result.symbol {
        Some(sym) => format!(" {}", format!("({sym})").red().bold()),
        None => String::new(),
    };
    match rank {
        Some(rank) => {
            let rank = format!("[{rank}]").green().bold();
            println!("{rank} {line}:{symbol_part}");
        }
        None => {
            let id_prefix = format!("{}", &result.chunk_id[..12.min(result.chunk_id.len())]).dimmed();
            println!("{id_prefix} {line}:{symbol_part}");
        }
    }
    println!(
        "{}",
        format!(
            "Lines {}-{} ({})",
            result.start_line, result.end_line, result.lang
        )
        .dimmed()
    );
    println!();

    if context > 0 {
        if print_with_context(result, repo_root, context).is_ok() {
            println!();
            return;
        }
        eprintln!(
            "Warning: could not read context from {}, showing chunk only",
            result.path
        );
    }
    println!("{}", result.content);
    println!();
}

fn print_with_context(
    result: &CachedResult,
    repo_root: &Path,
    context: usize,
) -> std::io::Result<()> {
    let file_path = repo_root.join(&result.path);
    let text = std::fs::read_to_string(&file_path)?;
    let lines: Vec<&str> = text.lines().collect();

    let start = result.start_line.max(1) as usize;
    let end = (result.end_line as usize).min(lines.len());
    let context_start = start.saturating_sub(context).max(1);
    let context_end = (end + context).min(lines.len());

    for number in context_start..=context_end {
        let content = lines[number - 1];
        if number >= start && number <= end {
            println!("{number:5} | {content}");
        } else {
            println!("{}", format!("{number:5} | {content}").dimmed());
        }
    }
    Ok(())
}

/// Confirmation line for `open`, mirroring the find formatting.
pub fn print_open_confirmation(result: &CachedResult, rank: Option<usize>, editor: &str) {
    let path = result.path.magenta().bold();
    let line = format!("{}", result.start_line).dimmed();
    let rank_part = match rank {
        Some(rank) => format!("{} ", format!("[{rank}]").green().bold()),
        None => String::new(),
    };
    let symbol_part = match &result.symbol {
        Some(sym) => format!(" {}", format!("({sym})").red().bold()),
        None => String::new(),
    };
    println!("Opening {path} {rank_part}{line}:{symbol_part} in {editor}");
}

/// Post-sync summary in the shape users already know.
pub fn print_sync_summary(response: &IndexResponse) {
    let sync_type = if response.is_incremental {
        "incremental"
    } else {
        "full"
    };

    if response.files_indexed == 0 && response.chunks_deleted == 0 {
        println!("{} No changes detected (index up to date)", "✓".green());
    } else {
        println!(
            "{} Indexed {} files ({sync_type} sync)",
            "✓".green(),
            response.files_indexed
        );
    }
    if response.chunks_created > 0 {
        println!("  • {} chunks created", response.chunks_created);
    }
    if response.chunks_updated > 0 {
        println!("  • {} chunks updated", response.chunks_updated);
    }
    if response.chunks_deleted > 0 {
        println!("  • {} chunks deleted", response.chunks_deleted);
    }
    if response.vectors_stored > 0 {
        println!("  • {} vectors stored", response.vectors_stored);
    }
    if response.files_failed > 0 {
        println!(
            "  • {}",
            format!("{} file(s) failed", response.files_failed).yellow()
        );
    }
    if response.files_indexed > 0 || response.chunks_deleted > 0 {
        let shown = &response.tree_sha[..12.min(response.tree_sha.len())];
        println!("  • Tree SHA: {shown}...");
    }
}

/// Everything `status` reports.
#[derive(Debug)]
pub struct StatusReport {
    pub repo_root: String,
    pub staleness: StalenessDisplay,
    pub chunks: usize,
    pub files: usize,
    pub last_sync_mode: Option<String>,
    pub model_fingerprint: Option<String>,
    pub indexed_at: Option<String>,
    pub model: String,
    pub topk: usize,
}

#[derive(Debug)]
pub enum StalenessDisplay {
    Fresh,
    Stale,
    Unknown(String),
}

pub fn print_status(report: &StatusReport) {
    println!("Repository: {}", report.repo_root);
    match &report.staleness {
        StalenessDisplay::Fresh => println!("Index:      {}", "up to date".green()),
        StalenessDisplay::Stale => {
            println!("Index:      {}", "stale (run 'ember sync')".yellow())
        }
        StalenessDisplay::Unknown(why) => println!("Index:      unknown ({why})"),
    }
    println!("Chunks:     {}", report.chunks);
    println!("Files:      {}", report.files);
    if let Some(mode) = &report.last_sync_mode {
        println!("Last sync:  {mode}");
    }
    if let Some(at) = &report.indexed_at {
        println!("Indexed at: {at}");
    }
    if let Some(fingerprint) = &report.model_fingerprint {
        println!("Model:      {fingerprint}");
    } else {
        println!("Model:      {} (no sync yet)", report.model);
    }
    println!("Config:     topk={}, model={}", report.topk, report.model);
}

//! Editor handoff: open a file at a line in the user's editor.
//!
//! `$VISUAL` wins over `$EDITOR`, falling back to vim. Line-jump syntax
//! differs per editor, dispatched on the executable's basename; anything
//! unrecognized gets the widely-supported `+<line> <file>` form.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{EmberError, Result};

/// Resolve the editor command from the environment.
pub fn get_editor() -> String {
    std::env::var("VISUAL")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var("EDITOR").ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "vim".to_string())
}

/// Build the argv for opening `file_path` at `line` in `editor`.
pub fn editor_command(editor: &str, file_path: &Path, line: u32) -> Vec<String> {
    let basename = Path::new(editor)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(editor)
        .to_lowercase();

    match basename.as_str() {
        // VS Code: --goto file:line
        "code" | "vscode" | "code-insiders" => vec![
            editor.to_string(),
            "--goto".to_string(),
            format!("{}:{line}", file_path.display()),
        ],
        // Sublime Text / Atom / Zed: file:line
        "subl" | "atom" | "zed" => vec![
            editor.to_string(),
            format!("{}:{line}", file_path.display()),
        ],
        // vim family, emacs, nano — and the default for strangers.
        _ => vec![
            editor.to_string(),
            format!("+{line}"),
            file_path.display().to_string(),
        ],
    }
}

/// Open the file, blocking until the editor exits.
pub fn open_in_editor(file_path: &Path, line: u32) -> Result<()> {
    if !file_path.exists() {
        return Err(EmberError::Unknown(format!(
            "File not found: {}",
            file_path.display()
        )));
    }
    let editor = get_editor();
    let argv = editor_command(&editor, file_path, line);

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .status()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EmberError::EditorNotFound(editor.clone())
            } else {
                EmberError::Unknown(format!("failed to launch {editor}: {e}"))
            }
        })?;

    if !status.success() {
        return Err(EmberError::EditorExecutionFailed(
            status.code().unwrap_or(-1),
        ));
    }
    Ok(())
}

/// Editor name for the "Opening ... in <editor>" confirmation line.
pub fn editor_display_name() -> String {
    PathBuf::from(get_editor())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(get_editor)
}

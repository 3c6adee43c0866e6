use std::fs;
use std::path::Path;

// Files allowed to touch the filesystem, terminals or CLI parsing.
const BOUNDARY_FILES: [&str; 3] = ["main.rs", "grid.rs", "persist.rs"];
const IO_TOKENS: [&str; 5] = ["std::fs", "clap::", "comfy_table", "csv::", "println!"];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let leaks = io_leaks(Path::new("src"));
    if !leaks.is_empty() {
        panic!(
            "core modules must stay free of I/O; move these into a boundary file:\n{}",
            leaks.join("\n")
        );
    }
}

/// `file:line: token` for every I/O token found outside the boundary files.
fn io_leaks(src: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(src) else {
        return Vec::new();
    };
    let mut leaks = Vec::new();
    for path in entries.flatten().map(|e| e.path()) {
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if !name.ends_with(".rs") || BOUNDARY_FILES.contains(&name) {
            continue;
        }
        let Ok(text) = fs::read_to_string(&path) else {
            continue;
        };
        leaks.extend(text.lines().enumerate().flat_map(|(i, line)| {
            IO_TOKENS
                .iter()
                .filter(move |token| line.contains(*token))
                .map(move |token| format!("  {name}:{}: {token}", i + 1))
        }));
    }
    leaks
}

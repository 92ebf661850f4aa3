pub mod dedup;
pub mod linters;
pub mod llm;
pub mod patterns;
pub mod scoring;
pub mod static_lint;

/// Language id used by the built-in rules.
pub fn detect_language(path: &str) -> &'static str {
    match extension_of(path).as_deref() {
        Some("ts") | Some("tsx") => "typescript",
        Some("js") | Some("jsx") => "javascript",
        Some("py") => "python",
        Some("go") => "go",
        Some("rs") => "rust",
        Some("java") => "java",
        Some("rb") => "ruby",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("cc") | Some("hpp") => "cpp",
        Some("cs") => "csharp",
        _ => "unknown",
    }
}

/// Human-readable language name for the review prompt.
pub fn language_display_name(path: &str) -> &'static str {
    match detect_language(path) {
        "typescript" => "TypeScript",
        "javascript" => "JavaScript",
        "python" => "Python",
        "go" => "Go",
        "rust" => "Rust",
        "java" => "Java",
        "ruby" => "Ruby",
        "c" => "C",
        "cpp" => "C++",
        "csharp" => "C#",
        _ => "source",
    }
}

pub fn extension_of(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

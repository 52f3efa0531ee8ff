//! Virtual path normalization

/// Normalize a virtual file path.
///
/// The result always starts with a single `/`, uses `/` as separator, has no
/// empty or `.` segments, resolves `..` lexically (never above the root) and
/// carries no trailing slash.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.trim().split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

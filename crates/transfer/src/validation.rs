use std::path::{Path, PathBuf};

use crate::TransferError;

const FALLBACK_NAME: &str = "download";
const MAX_NAME_LEN: usize = 200;
const MAX_COLLISIONS: u32 = 10_000;

/// Reduces a peer-supplied file name to a single safe path component.
///
/// Keeps only the last path segment (either separator), drops control and
/// reserved characters, trims leading dots and surrounding whitespace, and
/// falls back to `download` when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    truncate_chars(trimmed, MAX_NAME_LEN)
}

/// Paths inside `dir` to try for `name`, in order: the sanitised name, then
/// ` (1)`, ` (2)`, ... inserted before the extension.
pub(crate) fn destination_candidates(dir: &Path, name: &str) -> impl Iterator<Item = PathBuf> {
    let safe = sanitize_file_name(name);
    let first = dir.join(&safe);
    let (stem, ext) = split_extension(&safe);
    let (stem, ext) = (stem.to_string(), ext.to_string());
    let dir = dir.to_path_buf();
    std::iter::once(first)
        .chain((1..=MAX_COLLISIONS).map(move |n| dir.join(format!("{stem} ({n}){ext}"))))
}

pub(crate) fn no_free_name(dir: &Path, name: &str) -> TransferError {
    TransferError::InvalidPath(format!(
        "no free name for {} in {}",
        sanitize_file_name(name),
        dir.display()
    ))
}

/// Splits `name` into stem and extension (with its dot).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_names() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("my photo (2).jpg"), "my photo (2).jpg");
    }

    #[test]
    fn strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Windows\\evil.exe"), "evil.exe");
        assert_eq!(sanitize_file_name("/abs/path.txt"), "path.txt");
    }

    #[test]
    fn strips_reserved_and_control() {
        assert_eq!(sanitize_file_name("a<b>c:d|e?.txt"), "abcde.txt");
        assert_eq!(sanitize_file_name("bell\u{7}.txt"), "bell.txt");
    }

    #[test]
    fn rejects_hidden_and_empty() {
        assert_eq!(sanitize_file_name(".bashrc"), "bashrc");
        assert_eq!(sanitize_file_name(".."), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_file_name("dir/"), FALLBACK_NAME);
    }

    #[test]
    fn truncates_long_names() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_file_name(&long).chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn candidates_suffix_before_extension() {
        let dir = Path::new("/in");
        let names: Vec<PathBuf> = destination_candidates(dir, "a.tar.gz").take(3).collect();
        assert_eq!(
            names,
            vec![dir.join("a.tar.gz"), dir.join("a.tar (1).gz"), dir.join("a.tar (2).gz")]
        );
    }

    #[test]
    fn candidates_without_extension() {
        let mut names = destination_candidates(Path::new("/in"), "../README");
        assert_eq!(names.next(), Some(PathBuf::from("/in/README")));
        assert_eq!(names.next(), Some(PathBuf::from("/in/README (1)")));
    }
}

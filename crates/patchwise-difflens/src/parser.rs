use patchwise_core::{ChangedFile, PatchwiseError};

/// Ranges from a `@@ -a,b +c,d @@` hunk header.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::parser::parse_hunk_header;
///
/// let header = parse_hunk_header("@@ -10,2 +11,3 @@ fn main() {").unwrap();
/// assert_eq!(header.old_start, 10);
/// assert_eq!(header.new_start, 11);
/// assert_eq!(header.new_lines, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    /// Starting line in the old version.
    pub old_start: u32,
    /// Number of lines in the old version.
    pub old_lines: u32,
    /// Starting line in the new version.
    pub new_start: u32,
    /// Number of lines in the new version.
    pub new_lines: u32,
}

/// Returns `true` if the line opens a hunk.
pub fn is_hunk_header(line: &str) -> bool {
    line.starts_with("@@")
}

/// Parse a strict hunk header.
///
/// # Errors
///
/// Returns [`PatchwiseError::Parse`] if the header is malformed.
pub fn parse_hunk_header(line: &str) -> Result<HunkHeader, PatchwiseError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| PatchwiseError::Parse(format!("invalid hunk header: {line}")))?;

    let parts: Vec<&str> = inner.split(' ').collect();
    if parts.len() != 2 {
        return Err(PatchwiseError::Parse(format!("invalid hunk header: {line}")));
    }

    let old = parts[0]
        .strip_prefix('-')
        .ok_or_else(|| PatchwiseError::Parse(format!("invalid old range in hunk: {line}")))?;
    let new = parts[1]
        .strip_prefix('+')
        .ok_or_else(|| PatchwiseError::Parse(format!("invalid new range in hunk: {line}")))?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok(HunkHeader {
        old_start,
        old_lines,
        new_start,
        new_lines,
    })
}

/// Extract only the new-file starting line from a hunk header.
///
/// Lenient: reads the digits right after the first `+`, stopping at a comma
/// or a space, and ignores everything else on the line.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::parser::right_side_start;
///
/// assert_eq!(right_side_start("@@ -1,3 +1,3 @@"), Some(1));
/// assert_eq!(right_side_start("@@ -5 +7 @@ impl Foo"), Some(7));
/// assert_eq!(right_side_start("@@ garbage @@"), None);
/// ```
pub fn right_side_start(line: &str) -> Option<u32> {
    let after_plus = &line[line.find('+')? + 1..];
    let end = after_plus
        .find(|c: char| c == ',' || c == ' ')
        .unwrap_or(after_plus.len());
    after_plus[..end].parse().ok()
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), PatchwiseError> {
    if let Some((start, count)) = range.split_once(',') {
        let s = start
            .parse()
            .map_err(|_| PatchwiseError::Parse(format!("invalid range number in: {context}")))?;
        let c = count
            .parse()
            .map_err(|_| PatchwiseError::Parse(format!("invalid range count in: {context}")))?;
        Ok((s, c))
    } else {
        let s = range
            .parse()
            .map_err(|_| PatchwiseError::Parse(format!("invalid range number in: {context}")))?;
        Ok((s, 1))
    }
}

/// Remove the `DIFF<<EOF` ... `EOF` wrapper a CI step puts around a diff
/// passed through an environment variable.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::parser::strip_heredoc;
///
/// assert_eq!(strip_heredoc("DIFF<<EOF\n@@ -1 +1 @@\n-a\n+b\nEOF\n"), "@@ -1 +1 @@\n-a\n+b");
/// ```
pub fn strip_heredoc(input: &str) -> &str {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix("DIFF<<EOF").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("EOF").unwrap_or(trimmed);
    trimmed.trim_matches('\n')
}

/// Split a multi-file unified diff (as produced by `git diff`) into
/// per-file [`ChangedFile`] entries.
///
/// Each entry's patch starts at the file's first hunk header, matching the
/// per-file patch text the GitHub API returns. Deleted files and binary or
/// rename-only entries yield an empty patch.
///
/// # Errors
///
/// Returns [`PatchwiseError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::parser::parse_unified_diff;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,2 +1,3 @@\n\
///              fn main() {\n\
///             +    println!(\"hello\");\n\
///              }\n";
/// let files = parse_unified_diff(diff).unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].path, "hello.rs");
/// assert!(files[0].patch.starts_with("@@ -1,2 +1,3 @@"));
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<ChangedFile>, PatchwiseError> {
    let mut files: Vec<ChangedFile> = Vec::new();
    let mut current: Option<FileState> = None;

    let mut lines = input.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush(&mut files, current.take());
            current = Some(FileState::from_git_header(rest));
            continue;
        }

        // Patches without a "diff --git" line start at a "---" / "+++" pair.
        // Inside a hunk body the same pair is a removed and an added line.
        if line.starts_with("--- ")
            && lines.peek().is_some_and(|next| next.starts_with("+++ "))
            && current.as_ref().map_or(true, |f| f.in_hunks && f.hunk_complete())
        {
            flush(&mut files, current.take());
            current = Some(FileState::default());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if !file.in_hunks {
            if line.starts_with("Binary files ") && line.ends_with(" differ") {
                file.binary = true;
            } else if let Some(path) = line.strip_prefix("rename to ") {
                file.path = path.to_string();
            } else if let Some(path) = line.strip_prefix("--- ") {
                if file.path.is_empty() {
                    file.path = parse_path(path);
                }
            } else if let Some(path) = line.strip_prefix("+++ ") {
                if path.trim() == "/dev/null" {
                    file.deleted = true;
                } else {
                    file.path = parse_path(path);
                }
            }
        }

        if is_hunk_header(line) {
            let header = parse_hunk_header(line)?;
            file.in_hunks = true;
            file.old_remaining = header.old_lines;
            file.new_remaining = header.new_lines;
        } else if file.in_hunks {
            file.consume_body_line(line);
        }

        if file.in_hunks {
            file.patch.push_str(line);
            file.patch.push('\n');
        }
    }

    flush(&mut files, current.take());
    Ok(files)
}

#[derive(Default)]
struct FileState {
    path: String,
    patch: String,
    in_hunks: bool,
    binary: bool,
    deleted: bool,
    // Lines still expected by the current hunk, per side
    old_remaining: u32,
    new_remaining: u32,
}

impl FileState {
    fn from_git_header(rest: &str) -> Self {
        // "a/x b/x": the new path is the part after " b/"
        let path = rest
            .rsplit_once(" b/")
            .map(|(_, new)| new.trim_matches('"').to_string())
            .unwrap_or_default();
        Self {
            path,
            ..Self::default()
        }
    }

    fn hunk_complete(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }

    fn consume_body_line(&mut self, line: &str) {
        match line.as_bytes().first() {
            Some(b'+') => self.new_remaining = self.new_remaining.saturating_sub(1),
            Some(b'-') => self.old_remaining = self.old_remaining.saturating_sub(1),
            Some(b'\\') => {}
            // Context, including blank lines whose leading space was stripped
            _ => {
                self.old_remaining = self.old_remaining.saturating_sub(1);
                self.new_remaining = self.new_remaining.saturating_sub(1);
            }
        }
    }
}

fn flush(files: &mut Vec<ChangedFile>, state: Option<FileState>) {
    let Some(state) = state else {
        return;
    };
    if state.path.is_empty() {
        return;
    }
    let patch = if state.binary || state.deleted {
        String::new()
    } else {
        state.patch
    };
    files.push(ChangedFile::new(state.path, patch));
}

fn parse_path(raw: &str) -> String {
    let normalized = raw.trim().trim_matches('"');

    if normalized == "/dev/null" {
        return String::new();
    }

    normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_returns_empty_vec() {
        assert!(parse_unified_diff("").unwrap().is_empty());
    }

    #[test]
    fn hunk_header_without_counts() {
        let header = parse_hunk_header("@@ -1 +1 @@").unwrap();
        assert_eq!(header.old_lines, 1);
        assert_eq!(header.new_lines, 1);
    }

    #[test]
    fn malformed_hunk_header_is_error() {
        assert!(parse_hunk_header("@@ -x +1 @@").is_err());
        assert!(parse_hunk_header("@@ nonsense").is_err());
    }

    #[test]
    fn right_side_start_ignores_trailing_context() {
        assert_eq!(right_side_start("@@ -10,2 +11,3 @@ fn main() {"), Some(11));
        assert_eq!(right_side_start("@@ -0,0 +1 @@"), Some(1));
    }

    #[test]
    fn multiple_files_split_into_patches() {
        let diff = "\
diff --git a/a.rs b/a.rs
index abc1234..def5678 100644
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 line1
+line2
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1,3 +1,4 @@
 fn foo() {
+    bar();
 }
@@ -10,3 +11,4 @@
 fn baz() {
+    qux();
 }
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.rs");
        assert_eq!(files[0].patch, "@@ -1 +1,2 @@\n line1\n+line2\n");
        assert_eq!(files[1].path, "b.rs");
        assert_eq!(files[1].patch.matches("@@ -").count(), 2);
    }

    #[test]
    fn new_file_uses_new_path() {
        let diff = "\
diff --git a/new.rs b/new.rs
new file mode 100644
--- /dev/null
+++ b/new.rs
@@ -0,0 +1,3 @@
+fn hello() {
+    println!(\"new\");
+}
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "new.rs");
        assert!(files[0].patch.starts_with("@@ -0,0 +1,3 @@"));
    }

    #[test]
    fn deleted_and_binary_files_have_empty_patch() {
        let diff = "\
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,2 +0,0 @@
-fn goodbye() {
-}
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert!(!files[0].has_patch());
        assert_eq!(files[1].path, "image.png");
        assert!(!files[1].has_patch());
    }

    #[test]
    fn rename_only_has_empty_patch() {
        let diff = "\
diff --git a/old_name.rs b/new_name.rs
similarity index 100%
rename from old_name.rs
rename to new_name.rs
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "new_name.rs");
        assert!(!files[0].has_patch());
    }

    #[test]
    fn patch_without_git_header() {
        let diff = "\
--- \"a/src/my file.rs\"
+++ \"b/src/my file.rs\"
@@ -1 +1,2 @@
 old
+new
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "src/my file.rs");
    }

    #[test]
    fn header_lookalikes_inside_hunk_stay_in_patch() {
        let diff = "\
diff --git a/fixes/a.patch b/fixes/a.patch
--- a/fixes/a.patch
+++ b/fixes/a.patch
@@ -1,3 +1,4 @@
 header
--- a/old.c
+++ b/new.c
+diff --git a/x b/x
 tail
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "fixes/a.patch");
        assert_eq!(
            files[0].patch,
            "@@ -1,3 +1,4 @@\n header\n--- a/old.c\n+++ b/new.c\n+diff --git a/x b/x\n tail\n"
        );
    }

    #[test]
    fn header_pair_after_complete_hunk_starts_next_file() {
        let diff = "\
--- a/one.sql
+++ b/one.sql
@@ -1,2 +1,2 @@
--- old comment
+++ new comment
 select 1;
--- a/two.sql
+++ b/two.sql
@@ -1 +1 @@
-a
+b
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "one.sql");
        assert!(files[0].patch.ends_with(" select 1;\n"));
        assert_eq!(files[1].path, "two.sql");
        assert_eq!(files[1].patch, "@@ -1 +1 @@\n-a\n+b\n");
    }

    #[test]
    fn heredoc_wrapper_is_removed() {
        let wrapped = "DIFF<<EOF\ndiff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\nEOF";
        let files = parse_unified_diff(strip_heredoc(wrapped)).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].patch.ends_with("+b\n"));
    }
}

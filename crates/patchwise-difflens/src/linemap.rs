//! Translate diff-relative line numbers into new-file line numbers.
//!
//! The model numbers the lines of the patch text it was shown. To anchor an
//! inline comment we need the matching line in the new version of the file,
//! which this module recovers by re-walking the hunks.
//!
//! Position `N` counts every line of the patch text, 1-based: hunk headers,
//! added, removed, and context lines alike. Only added and context lines
//! exist in the new file, so only they produce a result. The model's own
//! counting may differ from this; mis-anchored comments are an accepted
//! limitation.

use patchwise_core::{MappedComment, ReviewComment};

use crate::parser::{is_hunk_header, right_side_start};

/// Map diff position `target` to a line number in the new file.
///
/// Returns `None` when the position falls on a removed line, a hunk header,
/// a line before the first hunk, or past the end of the patch.
///
/// # Examples
///
/// ```
/// use patchwise_difflens::linemap::map_diff_line;
///
/// let patch = "@@ -10,3 +10,3 @@\n a\n-b\n+B\n c\n";
/// assert_eq!(map_diff_line(patch, 2), Some(10)); // " a"
/// assert_eq!(map_diff_line(patch, 3), None);     // "-b"
/// assert_eq!(map_diff_line(patch, 4), Some(11)); // "+B"
/// assert_eq!(map_diff_line(patch, 5), Some(12)); // " c"
/// ```
pub fn map_diff_line(patch: &str, target: u32) -> Option<u32> {
    if target == 0 {
        return None;
    }

    // None until a header establishes where the hunk starts
    let mut current_line: Option<u32> = None;

    for (index, line) in patch.lines().enumerate() {
        let position = u32::try_from(index + 1).ok()?;

        if is_hunk_header(line) {
            current_line = right_side_start(line).map(|start| start.saturating_sub(1));
        } else if line.starts_with('-') || line.starts_with('\\') {
            // Removed lines and "\ No newline at end of file" are not in the new file
        } else if let Some(current) = current_line.as_mut() {
            // Added (`+`) or context line
            *current += 1;
            if position == target {
                return Some(*current);
            }
        }

        if position >= target {
            return None;
        }
    }

    None
}

/// Map every parsed comment against one file's patch, preserving order.
///
/// # Examples
///
/// ```
/// use patchwise_core::ReviewComment;
/// use patchwise_difflens::linemap::map_comments;
///
/// let patch = "@@ -1,2 +1,2 @@\n-old\n+new\n same\n";
/// let comments = vec![
///     ReviewComment { diff_line: 3, body: "nice".into() },
///     ReviewComment { diff_line: 2, body: "gone".into() },
/// ];
/// let mapped = map_comments(patch, &comments);
/// assert_eq!(mapped[0].file_line, Some(1));
/// assert_eq!(mapped[1].file_line, None);
/// ```
pub fn map_comments(patch: &str, comments: &[ReviewComment]) -> Vec<MappedComment> {
    comments
        .iter()
        .map(|c| MappedComment {
            diff_line: c.diff_line,
            file_line: map_diff_line(patch, c.diff_line),
            body: c.body.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_out_of_range_positions_fail() {
        let patch = "@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(map_diff_line(patch, 0), None);
        assert_eq!(map_diff_line(patch, 4), None);
        assert_eq!(map_diff_line(patch, 100), None);
    }

    #[test]
    fn header_position_fails() {
        let patch = "@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(map_diff_line(patch, 1), None);
        assert_eq!(map_diff_line(patch, 3), Some(1));
    }

    #[test]
    fn lines_before_first_header_are_unanchored() {
        let patch = "preamble\n+stray\n@@ -4,1 +4,2 @@\n ctx\n+added\n";
        assert_eq!(map_diff_line(patch, 1), None);
        assert_eq!(map_diff_line(patch, 2), None);
        assert_eq!(map_diff_line(patch, 4), Some(4));
        assert_eq!(map_diff_line(patch, 5), Some(5));
    }

    #[test]
    fn removed_lines_do_not_advance_new_file_counter() {
        let patch = "@@ -1,4 +1,2 @@\n-a\n-b\n-c\n+d\n e\n";
        assert_eq!(map_diff_line(patch, 2), None);
        assert_eq!(map_diff_line(patch, 4), None);
        assert_eq!(map_diff_line(patch, 5), Some(1));
        assert_eq!(map_diff_line(patch, 6), Some(2));
    }

    #[test]
    fn no_newline_marker_is_skipped() {
        let patch = "@@ -1 +1 @@\n-old\n\\ No newline at end of file\n+new\n\\ No newline at end of file\n";
        assert_eq!(map_diff_line(patch, 3), None);
        assert_eq!(map_diff_line(patch, 4), Some(1));
        assert_eq!(map_diff_line(patch, 5), None);
    }

    #[test]
    fn blank_context_line_counts() {
        // Some tools strip the single space from empty context lines
        let patch = "@@ -1,3 +1,3 @@\n a\n\n+c\n";
        assert_eq!(map_diff_line(patch, 3), Some(2));
        assert_eq!(map_diff_line(patch, 4), Some(3));
    }

    #[test]
    fn malformed_header_leaves_hunk_unanchored() {
        let patch = "@@ -1,2 +1,2 @@\n a\n@@ broken @@\n+b\n@@ -9 +20 @@\n+c\n";
        assert_eq!(map_diff_line(patch, 2), Some(1));
        assert_eq!(map_diff_line(patch, 4), None);
        assert_eq!(map_diff_line(patch, 6), Some(20));
    }

    #[test]
    fn new_file_hunk_starts_at_line_one() {
        let patch = "@@ -0,0 +1,3 @@\n+a\n+b\n+c\n";
        assert_eq!(map_diff_line(patch, 2), Some(1));
        assert_eq!(map_diff_line(patch, 4), Some(3));
    }

    #[test]
    fn map_comments_keeps_order_and_bodies() {
        let patch = "@@ -1 +1,2 @@\n a\n+b\n";
        let comments = vec![
            ReviewComment {
                diff_line: 3,
                body: "second line".into(),
            },
            ReviewComment {
                diff_line: 9,
                body: "nowhere".into(),
            },
        ];
        let mapped = map_comments(patch, &comments);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].file_line, Some(2));
        assert_eq!(mapped[0].body, "second line");
        assert!(!mapped[1].is_mapped());
    }
}

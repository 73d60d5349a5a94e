use std::borrow::Cow;
use std::fmt::Write;

use patchwise_core::ReviewComment;

/// Appended to a diff cut at the character limit.
pub const TRUNCATION_MARKER: &str = "\n... [diff truncated]";

/// Review conventions embedded in every prompt.
pub const REVIEW_CONVENTIONS: &str = "\
Review conventions:
- Focus on correctness: logic errors, unhandled errors, nil or null dereferences, races, resource leaks.
- Flag API or behavior changes that are not backward compatible.
- Point out missing validation of external input.
- Prefer clear names and small functions, but do not comment on formatting a formatter would fix.
- Keep each comment short, specific, and actionable.
- Do not repeat the code back; explain the problem and the fix.
- If a change looks correct, say nothing about it.";

const OUTPUT_FORMAT: &str = "\
Output format:
Write one suggestion per line, exactly as

line <number>: <comment>

where <number> is the line number within the diff shown above. \
Write nothing else on those lines.";

/// Everything a per-file review prompt is assembled from.
///
/// # Examples
///
/// ```
/// use patchwise_review::prompt::{build_review_prompt, PromptInput};
///
/// let prompt = build_review_prompt(&PromptInput {
///     path: "pkg/api/types.go",
///     diff: "@@ -1 +1 @@\n-a\n+b\n",
///     ..PromptInput::default()
/// });
/// assert!(prompt.contains("pkg/api/types.go"));
/// assert!(prompt.contains("line <number>: <comment>"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    /// Path of the file under review.
    pub path: &'a str,
    /// Patch text of the file.
    pub diff: &'a str,
    /// Guideline text, possibly empty.
    pub guidelines: &'a str,
    /// Past review comments, possibly empty.
    pub history: &'a str,
    /// Pull request title, when known.
    pub pull_title: Option<&'a str>,
    /// Pull request description, when known.
    pub pull_body: Option<&'a str>,
    /// Character limit for the diff text.
    pub max_diff_chars: usize,
}

impl Default for PromptInput<'_> {
    fn default() -> Self {
        Self {
            path: "",
            diff: "",
            guidelines: "",
            history: "",
            pull_title: None,
            pull_body: None,
            max_diff_chars: 100_000,
        }
    }
}

/// Cut `diff` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
///
/// Counts characters, not tokens or bytes.
///
/// # Examples
///
/// ```
/// use patchwise_review::prompt::{truncate_diff, TRUNCATION_MARKER};
///
/// assert_eq!(truncate_diff("short", 10), "short");
/// let cut = truncate_diff("abcdefghij", 4);
/// assert_eq!(cut, format!("abcd{TRUNCATION_MARKER}"));
/// ```
pub fn truncate_diff(diff: &str, max_chars: usize) -> Cow<'_, str> {
    match diff.char_indices().nth(max_chars) {
        Some((byte_index, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &diff[..byte_index])),
        None => Cow::Borrowed(diff),
    }
}

/// Build the prompt for one changed file.
///
/// Built fresh per file; sections with empty text are left out.
pub fn build_review_prompt(input: &PromptInput<'_>) -> String {
    let mut prompt = String::from(
        "You are reviewing one file of a pull request. \
         Provide feedback on potential issues and improvements.\n\n",
    );

    if let Some(title) = input.pull_title.filter(|t| !t.trim().is_empty()) {
        let _ = writeln!(prompt, "Pull request: {title}");
        if let Some(body) = input.pull_body.filter(|b| !b.trim().is_empty()) {
            let _ = writeln!(prompt, "Description:\n{}", body.trim());
        }
        prompt.push('\n');
    }

    if !input.guidelines.trim().is_empty() {
        let _ = write!(
            prompt,
            "Project guidelines:\n{}\n\n",
            input.guidelines.trim()
        );
    }

    if !input.history.trim().is_empty() {
        let _ = write!(
            prompt,
            "Previous review comments on this project:\n{}\n\n",
            input.history.trim()
        );
    }

    let diff = truncate_diff(input.diff, input.max_diff_chars);
    let _ = write!(
        prompt,
        "File: {}\n\n```diff\n{}\n```\n\n{REVIEW_CONVENTIONS}\n\n{OUTPUT_FORMAT}\n",
        input.path,
        diff.trim_end_matches('\n'),
    );

    prompt
}

/// Classification of one line of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// The line follows `line <number>: <comment>`.
    Suggestion(ReviewComment),
    /// Anything else; ignored downstream.
    Unmatched,
}

/// Parse one output line against `line <number>: <comment>`.
///
/// A leading `- ` or `* ` list marker is allowed, the keyword is
/// case-insensitive, the number must be positive, and the comment must be
/// non-empty.
///
/// # Examples
///
/// ```
/// use patchwise_review::prompt::{parse_review_line, ParsedLine};
///
/// match parse_review_line("line 5: fix this") {
///     ParsedLine::Suggestion(c) => {
///         assert_eq!(c.diff_line, 5);
///         assert_eq!(c.body, "fix this");
///     }
///     ParsedLine::Unmatched => unreachable!(),
/// }
/// assert_eq!(parse_review_line("Looks good to me."), ParsedLine::Unmatched);
/// ```
pub fn parse_review_line(line: &str) -> ParsedLine {
    let trimmed = line.trim();
    let trimmed = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .unwrap_or(trimmed)
        .trim_start();

    let Some(keyword) = trimmed.get(..4) else {
        return ParsedLine::Unmatched;
    };
    if !keyword.eq_ignore_ascii_case("line") {
        return ParsedLine::Unmatched;
    }

    let rest = &trimmed[4..];
    let digits_start = rest.trim_start();
    if digits_start.len() == rest.len() {
        // "line" must be followed by whitespace
        return ParsedLine::Unmatched;
    }

    let digits_len = digits_start
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits_start.len());
    if digits_len == 0 {
        return ParsedLine::Unmatched;
    }
    let Ok(diff_line) = digits_start[..digits_len].parse::<u32>() else {
        return ParsedLine::Unmatched;
    };
    if diff_line == 0 {
        return ParsedLine::Unmatched;
    }

    let Some(body) = digits_start[digits_len..].trim_start().strip_prefix(':') else {
        return ParsedLine::Unmatched;
    };
    let body = body.trim();
    if body.is_empty() {
        return ParsedLine::Unmatched;
    }

    ParsedLine::Suggestion(ReviewComment {
        diff_line,
        body: body.to_string(),
    })
}

/// Collect every suggestion in the model output, in the order encountered.
///
/// # Examples
///
/// ```
/// use patchwise_review::prompt::parse_review_response;
///
/// let text = "line 5: fix this\nline 12: consider renaming\nOverall fine.";
/// let comments = parse_review_response(text);
/// assert_eq!(comments.len(), 2);
/// assert_eq!(comments[1].diff_line, 12);
/// ```
pub fn parse_review_response(response: &str) -> Vec<ReviewComment> {
    response
        .lines()
        .filter_map(|line| match parse_review_line(line) {
            ParsedLine::Suggestion(comment) => Some(comment),
            ParsedLine::Unmatched => None,
        })
        .collect()
}

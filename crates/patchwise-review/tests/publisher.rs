use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use patchwise_core::{ChangedFile, PatchwiseError, ReviewConfig};
use patchwise_review::llm::TextGenerator;
use patchwise_review::pipeline::{ResponseStatus, ReviewContext, ReviewPipeline};
use patchwise_review::publish::CommentSink;

/// Returns the same response for every prompt and records the prompts.
struct ScriptedGenerator {
    response: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, PatchwiseError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Hands out one queued response per prompt, in review order.
struct QueuedGenerator {
    responses: Mutex<VecDeque<String>>,
}

#[async_trait]
impl TextGenerator for QueuedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Option<String>, PatchwiseError> {
        Ok(self.responses.lock().unwrap().pop_front())
    }

    fn model(&self) -> &str {
        "queued"
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Posted {
    Inline { path: String, line: u32 },
    Issue(String),
}

/// Records posts; inline comments on `reject_line` fail.
#[derive(Clone, Default)]
struct FakeSink {
    posts: Arc<Mutex<Vec<Posted>>>,
    reject_line: Option<u32>,
}

#[async_trait]
impl CommentSink for FakeSink {
    async fn inline_comment(
        &self,
        path: &str,
        _commit: &str,
        line: u32,
        _body: &str,
    ) -> Result<(), PatchwiseError> {
        if self.reject_line == Some(line) {
            return Err(PatchwiseError::GitHub(
                "422 Unprocessable Entity: line must be part of the diff".into(),
            ));
        }
        self.posts.lock().unwrap().push(Posted::Inline {
            path: path.to_string(),
            line,
        });
        Ok(())
    }

    async fn issue_comment(&self, body: &str) -> Result<(), PatchwiseError> {
        self.posts.lock().unwrap().push(Posted::Issue(body.to_string()));
        Ok(())
    }
}

/// A patch whose positions 2..=31 are all added lines (new-file lines 1..=30).
fn thirty_line_patch() -> String {
    let mut patch = String::from("@@ -0,0 +1,30 @@\n");
    for i in 1..=30 {
        patch.push_str(&format!("+line {i}\n"));
    }
    patch
}

fn ten_suggestions() -> String {
    (2..=11)
        .map(|n| format!("line {n}: suggestion at {n}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pipeline(response: Option<&str>, sink: FakeSink) -> (ReviewPipeline, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let generator = ScriptedGenerator {
        response: response.map(str::to_string),
        prompts: Arc::clone(&prompts),
    };
    (
        ReviewPipeline::new(Box::new(generator), Box::new(sink), ReviewConfig::default()),
        prompts,
    )
}

#[tokio::test]
async fn quota_caps_inline_comments_across_files() {
    let sink = FakeSink::default();
    let response = ten_suggestions();
    let (pipeline, _) = pipeline(Some(&response), sink.clone());

    let files: Vec<ChangedFile> = (1..=3)
        .map(|i| ChangedFile::new(format!("pkg/f{i}.go"), thirty_line_patch()))
        .collect();

    let report = pipeline
        .run(&files, Some("abc123"), &ReviewContext::default(), Vec::new())
        .await;

    let posts = sink.posts.lock().unwrap();
    assert_eq!(posts.len(), 20);
    assert!(posts.iter().all(|p| matches!(p, Posted::Inline { .. })));
    assert_eq!(report.stats.inline_posted, 20);
    assert_eq!(report.stats.dropped_by_quota, 10);
    // Generation still runs for every file after the quota is reached
    assert_eq!(report.stats.files_reviewed, 3);
    assert!(report
        .files
        .iter()
        .all(|f| f.response == ResponseStatus::Received));
    assert_eq!(
        posts.last(),
        Some(&Posted::Inline {
            path: "pkg/f2.go".into(),
            line: 10
        })
    );
}

#[tokio::test]
async fn unparseable_response_posts_one_issue_comment() {
    let sink = FakeSink::default();
    let (pipeline, _) = pipeline(Some("The change looks fine overall."), sink.clone());
    let files = vec![ChangedFile::new("cmd/main.go", thirty_line_patch())];

    let report = pipeline
        .run(&files, Some("abc123"), &ReviewContext::default(), Vec::new())
        .await;

    let posts = sink.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    match &posts[0] {
        Posted::Issue(body) => {
            assert!(body.contains("cmd/main.go"));
            assert!(body.contains("The change looks fine overall."));
        }
        other => panic!("expected issue comment, got {other:?}"),
    }
    assert_eq!(report.stats.issue_comments, 1);
    assert_eq!(report.stats.inline_posted, 0);
}

#[tokio::test]
async fn inline_failure_does_not_stop_remaining_comments() {
    let sink = FakeSink {
        reject_line: Some(2),
        ..FakeSink::default()
    };
    let (pipeline, _) = pipeline(
        Some("line 2: first\nline 3: second\nline 4: third"),
        sink.clone(),
    );
    let files = vec![
        ChangedFile::new("a.go", thirty_line_patch()),
        ChangedFile::new("b.go", thirty_line_patch()),
    ];

    let report = pipeline
        .run(&files, Some("abc123"), &ReviewContext::default(), Vec::new())
        .await;

    assert_eq!(report.stats.comments_failed, 2);
    assert_eq!(report.stats.inline_posted, 4);
    let posts = sink.posts.lock().unwrap();
    assert_eq!(
        posts[0],
        Posted::Inline {
            path: "a.go".into(),
            line: 1
        }
    );
    assert_eq!(
        posts[3],
        Posted::Inline {
            path: "b.go".into(),
            line: 3
        }
    );
}

#[tokio::test]
async fn missing_commit_sends_every_review_as_issue_comment() {
    let sink = FakeSink::default();
    let (pipeline, _) = pipeline(Some("line 2: would be inline"), sink.clone());
    let files = vec![
        ChangedFile::new("a.go", thirty_line_patch()),
        ChangedFile::new("b.go", thirty_line_patch()),
    ];

    let report = pipeline
        .run(&files, None, &ReviewContext::default(), Vec::new())
        .await;

    let posts = sink.posts.lock().unwrap();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|p| matches!(p, Posted::Issue(_))));
    assert_eq!(report.stats.issue_comments, 2);
    assert!(report.commit.is_none());
}

#[tokio::test]
async fn context_reaches_every_prompt() {
    let sink = FakeSink::default();
    let (pipeline, prompts) = pipeline(None, sink.clone());
    let files = vec![
        ChangedFile::new("a.go", thirty_line_patch()),
        ChangedFile::new("b.go", thirty_line_patch()),
    ];
    let context = ReviewContext {
        guidelines: "Return errors, do not panic.".into(),
        history: String::new(),
        pull_title: Some("Add retry loop".into()),
        pull_body: None,
    };

    let report = pipeline.run(&files, Some("abc"), &context, Vec::new()).await;

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("File: a.go"));
    assert!(prompts[1].contains("File: b.go"));
    assert!(prompts
        .iter()
        .all(|p| p.contains("Return errors, do not panic.") && p.contains("Add retry loop")));
    // No text back means nothing is posted for the file
    assert!(sink.posts.lock().unwrap().is_empty());
    assert_eq!(report.stats.empty_responses, 2);
}

#[tokio::test]
async fn exhausted_quota_withholds_later_issue_comments() {
    let sink = FakeSink::default();
    let generator = QueuedGenerator {
        responses: Mutex::new(VecDeque::from([
            "line 2: a".to_string(),
            "no suggestions here".to_string(),
        ])),
    };
    let config = ReviewConfig {
        max_comments: 1,
        ..ReviewConfig::default()
    };
    let pipeline = ReviewPipeline::new(Box::new(generator), Box::new(sink.clone()), config);
    let files = vec![
        ChangedFile::new("a.go", thirty_line_patch()),
        ChangedFile::new("b.go", thirty_line_patch()),
    ];

    let report = pipeline
        .run(&files, Some("abc123"), &ReviewContext::default(), Vec::new())
        .await;

    let posts = sink.posts.lock().unwrap();
    assert_eq!(
        *posts,
        vec![Posted::Inline {
            path: "a.go".into(),
            line: 1
        }]
    );
    assert_eq!(report.stats.files_reviewed, 2);
    assert_eq!(report.stats.issue_comments, 0);
    assert_eq!(report.stats.issue_comments_suppressed, 1);
    let second = report.files[1].outcome.as_ref().unwrap();
    assert!(second.suppressed_by_quota);
    assert!(report.to_string().contains("b.go: not posted (quota reached)"));
}

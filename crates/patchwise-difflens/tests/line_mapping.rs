use patchwise_core::ReviewComment;
use patchwise_difflens::linemap::{map_comments, map_diff_line};
use patchwise_difflens::parser::parse_unified_diff;

const TWO_HUNKS: &str = "\
@@ -1,3 +1,3 @@
 package main
-import \"fmt\"
+import \"log\"
 
@@ -10,2 +11,3 @@ func main() {
 \tx := 1
+\tlog.Println(x)
 }
";

#[test]
fn second_hunk_resets_to_its_own_start() {
    // First hunk: positions 2..=5
    assert_eq!(map_diff_line(TWO_HUNKS, 2), Some(1));
    assert_eq!(map_diff_line(TWO_HUNKS, 3), None);
    assert_eq!(map_diff_line(TWO_HUNKS, 4), Some(2));
    assert_eq!(map_diff_line(TWO_HUNKS, 5), Some(3));

    // Header of the second hunk, then lines counted from +11
    assert_eq!(map_diff_line(TWO_HUNKS, 6), None);
    assert_eq!(map_diff_line(TWO_HUNKS, 7), Some(11));
    assert_eq!(map_diff_line(TWO_HUNKS, 8), Some(12));
    assert_eq!(map_diff_line(TWO_HUNKS, 9), Some(13));
}

#[test]
fn every_added_or_context_line_maps_and_removed_lines_do_not() {
    let diff = "\
diff --git a/pkg/server/handler.go b/pkg/server/handler.go
--- a/pkg/server/handler.go
+++ b/pkg/server/handler.go
@@ -3,6 +3,7 @@ import (
 \t\"net/http\"
-\t\"io/ioutil\"
+\t\"io\"
+\t\"log\"
 )
 
 func handle(w http.ResponseWriter, r *http.Request) {
@@ -20,4 +21,3 @@ func handle(w http.ResponseWriter, r *http.Request) {
-\tbody, _ := ioutil.ReadAll(r.Body)
-\t_ = body
+\tbody, err := io.ReadAll(r.Body)
 \tw.WriteHeader(200)
 }
";
    let files = parse_unified_diff(diff).unwrap();
    let patch = &files[0].patch;

    let mut expected_next: Option<u32> = None;
    let mut seen_added_or_context = 0;
    for (index, line) in patch.lines().enumerate() {
        let position = (index + 1) as u32;
        let mapped = map_diff_line(patch, position);
        if line.starts_with("@@") {
            assert_eq!(mapped, None, "header at {position}");
            expected_next = patchwise_difflens::parser::right_side_start(line);
        } else if line.starts_with('-') {
            assert_eq!(mapped, None, "removed line at {position}");
        } else {
            let want = expected_next.unwrap();
            assert_eq!(mapped, Some(want), "line {position}: {line:?}");
            expected_next = Some(want + 1);
            seen_added_or_context += 1;
        }
    }
    assert_eq!(seen_added_or_context, 9);
}

#[test]
fn comments_on_removed_lines_stay_unmapped() {
    let comments = vec![
        ReviewComment {
            diff_line: 4,
            body: "prefer log over fmt".into(),
        },
        ReviewComment {
            diff_line: 3,
            body: "this import is gone".into(),
        },
    ];
    let mapped = map_comments(TWO_HUNKS, &comments);
    assert_eq!(mapped[0].file_line, Some(2));
    assert_eq!(mapped[1].file_line, None);
}

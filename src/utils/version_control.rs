use crate::models::{ChangeKind, DetailedChange, DiffFormat, Version, GENERIC_SECTION};
use crate::utils::config::DiffAlgorithm;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use similar::{Algorithm, DiffOp, TextDiff};

const SIDE_BY_SIDE_WIDTH: usize = 40;

// Splits on '\n' only, so an empty string is one empty line
pub fn split_lines(content: &str) -> Vec<&str> {
    content.split('\n').collect()
}

pub fn count_lines(content: &str) -> usize {
    content.split('\n').count()
}

// SHA-256 hex digest of the content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub mod diff_utils {
    use super::*;

    // One aligned row of a comparison; `None` means the side has no line here
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DiffRow<'a> {
        pub before: Option<&'a str>,
        pub after: Option<&'a str>,
    }

    impl<'a> DiffRow<'a> {
        pub fn is_unchanged(&self) -> bool {
            matches!((self.before, self.after), (Some(b), Some(a)) if b == a)
        }
    }

    // Labels for the two sides of a rendered diff
    #[derive(Debug, Clone)]
    pub struct DiffHeader<'a> {
        pub file_id: &'a str,
        pub from_version: Version,
        pub from_timestamp: DateTime<Utc>,
        pub to_version: Version,
        pub to_timestamp: DateTime<Utc>,
    }

    // Aligns two contents into rows with the chosen algorithm
    pub fn diff_rows<'a>(before: &'a str, after: &'a str, algorithm: DiffAlgorithm) -> Vec<DiffRow<'a>> {
        let before_lines = split_lines(before);
        let after_lines = split_lines(after);

        match algorithm {
            DiffAlgorithm::Positional => {
                let max_lines = before_lines.len().max(after_lines.len());
                (0..max_lines)
                    .map(|i| DiffRow {
                        before: before_lines.get(i).copied(),
                        after: after_lines.get(i).copied(),
                    })
                    .collect()
            }
            DiffAlgorithm::Lcs => {
                let mut rows = Vec::new();
                for op in myers_ops(&before_lines, &after_lines) {
                    match op {
                        DiffOp::Equal { old_index, new_index, len } => {
                            for i in 0..len {
                                rows.push(DiffRow {
                                    before: Some(before_lines[old_index + i]),
                                    after: Some(after_lines[new_index + i]),
                                });
                            }
                        }
                        DiffOp::Delete { old_index, old_len, .. } => {
                            for line in &before_lines[old_index..old_index + old_len] {
                                rows.push(DiffRow { before: Some(*line), after: None });
                            }
                        }
                        DiffOp::Insert { new_index, new_len, .. } => {
                            for line in &after_lines[new_index..new_index + new_len] {
                                rows.push(DiffRow { before: None, after: Some(*line) });
                            }
                        }
                        DiffOp::Replace { old_index, old_len, new_index, new_len } => {
                            for i in 0..old_len.max(new_len) {
                                rows.push(DiffRow {
                                    before: (i < old_len).then(|| before_lines[old_index + i]),
                                    after: (i < new_len).then(|| after_lines[new_index + i]),
                                });
                            }
                        }
                    }
                }
                rows
            }
        }
    }

    // Where an LCS insertion is placed in the reported line numbers
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum InsertAnchor {
        // Lines the insertion occupies in the new content
        NewContent,
        // The base line the insertion follows; 0 is the top of the file
        Base,
    }

    // Detailed changes between two contents
    pub fn compute_changes(before: &str, after: &str, algorithm: DiffAlgorithm) -> Vec<DetailedChange> {
        match algorithm {
            DiffAlgorithm::Positional => positional_changes(before, after),
            DiffAlgorithm::Lcs => lcs_changes(before, after, InsertAnchor::NewContent),
        }
    }

    // Changes with every range in the coordinates of `base`, so edits made
    // from the same base can be compared against each other
    pub fn base_changes(base: &str, edited: &str, algorithm: DiffAlgorithm) -> Vec<DetailedChange> {
        match algorithm {
            DiffAlgorithm::Positional => positional_changes(base, edited),
            DiffAlgorithm::Lcs => lcs_changes(base, edited, InsertAnchor::Base),
        }
    }

    fn positional_changes(before: &str, after: &str) -> Vec<DetailedChange> {
        diff_rows(before, after, DiffAlgorithm::Positional)
            .into_iter()
            .enumerate()
            .filter(|(_, row)| !row.is_unchanged())
            .filter_map(|(i, row)| {
                let line = i + 1;
                let (kind, summary) = match (row.before, row.after) {
                    (Some(_), Some(_)) => (ChangeKind::Modification, format!("Modified line {}", line)),
                    (None, Some(_)) => (ChangeKind::Addition, format!("Added line {}", line)),
                    (Some(_), None) => (ChangeKind::Deletion, format!("Removed line {}", line)),
                    (None, None) => return None,
                };
                Some(DetailedChange {
                    kind,
                    section: GENERIC_SECTION.to_string(),
                    line_start: line,
                    line_end: line,
                    content_before: row.before.map(str::to_string),
                    content_after: row.after.map(str::to_string),
                    summary,
                })
            })
            .collect()
    }

    // Deletions and modifications are ranged in the old content
    fn lcs_changes(before: &str, after: &str, anchor: InsertAnchor) -> Vec<DetailedChange> {
        let before_lines = split_lines(before);
        let after_lines = split_lines(after);
        let mut changes = Vec::new();

        for op in myers_ops(&before_lines, &after_lines) {
            let change = match op {
                DiffOp::Equal { .. } => continue,
                DiffOp::Delete { old_index, old_len, .. } => ranged_change(
                    ChangeKind::Deletion,
                    old_index,
                    old_len,
                    Some(before_lines[old_index..old_index + old_len].join("\n")),
                    None,
                ),
                DiffOp::Insert { old_index, new_index, new_len } => {
                    let inserted = after_lines[new_index..new_index + new_len].join("\n");
                    match anchor {
                        InsertAnchor::NewContent => {
                            ranged_change(ChangeKind::Addition, new_index, new_len, None, Some(inserted))
                        }
                        InsertAnchor::Base => DetailedChange {
                            kind: ChangeKind::Addition,
                            section: GENERIC_SECTION.to_string(),
                            line_start: old_index,
                            line_end: old_index,
                            content_before: None,
                            content_after: Some(inserted),
                            summary: format!("Inserted {} line(s) after line {}", new_len, old_index),
                        },
                    }
                }
                DiffOp::Replace { old_index, old_len, new_index, new_len } => ranged_change(
                    ChangeKind::Modification,
                    old_index,
                    old_len.max(1),
                    Some(before_lines[old_index..old_index + old_len].join("\n")),
                    Some(after_lines[new_index..new_index + new_len].join("\n")),
                ),
            };
            changes.push(change);
        }

        changes
    }

    fn ranged_change(
        kind: ChangeKind,
        index: usize,
        len: usize,
        content_before: Option<String>,
        content_after: Option<String>,
    ) -> DetailedChange {
        let line_start = index + 1;
        let line_end = index + len.max(1);
        let verb = match kind {
            ChangeKind::Addition => "Added",
            ChangeKind::Deletion => "Removed",
            ChangeKind::Modification => "Modified",
        };
        let summary = if line_start == line_end {
            format!("{} line {}", verb, line_start)
        } else {
            format!("{} lines {}-{}", verb, line_start, line_end)
        };

        DetailedChange {
            kind,
            section: GENERIC_SECTION.to_string(),
            line_start,
            line_end,
            content_before,
            content_after,
            summary,
        }
    }

    fn myers_ops(before_lines: &[&str], after_lines: &[&str]) -> Vec<DiffOp> {
        TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_slices(before_lines, after_lines)
            .ops()
            .to_vec()
    }

    // True when any change on one side touches a line range changed on the other
    pub fn changes_conflict(ours: &[DetailedChange], theirs: &[DetailedChange]) -> bool {
        ours.iter().any(|a| theirs.iter().any(|b| a.overlaps(b)))
    }

    pub fn render_diff(format: DiffFormat, header: &DiffHeader, rows: &[DiffRow]) -> String {
        match format {
            DiffFormat::Unified => render_unified(header, rows),
            DiffFormat::SideBySide => render_side_by_side(header, rows),
            DiffFormat::Html => render_html(header, rows),
        }
    }

    fn render_unified(header: &DiffHeader, rows: &[DiffRow]) -> String {
        let mut out = vec![
            format!(
                "--- {} (version {}) {}",
                header.file_id,
                header.from_version,
                header.from_timestamp.to_rfc3339()
            ),
            format!(
                "+++ {} (version {}) {}",
                header.file_id,
                header.to_version,
                header.to_timestamp.to_rfc3339()
            ),
        ];

        for row in rows {
            if row.is_unchanged() {
                out.push(format!(" {}", row.before.unwrap_or_default()));
                continue;
            }
            if let Some(before) = row.before {
                out.push(format!("-{}", before));
            }
            if let Some(after) = row.after {
                out.push(format!("+{}", after));
            }
        }

        out.join("\n")
    }

    fn render_side_by_side(header: &DiffHeader, rows: &[DiffRow]) -> String {
        let mut out = vec![
            format!(
                "{} | {}",
                fit_column(&format!("Version {}", header.from_version), SIDE_BY_SIDE_WIDTH),
                fit_column(&format!("Version {}", header.to_version), SIDE_BY_SIDE_WIDTH)
            ),
            format!("{}-+-{}", "-".repeat(SIDE_BY_SIDE_WIDTH), "-".repeat(SIDE_BY_SIDE_WIDTH)),
        ];

        for row in rows {
            out.push(format!(
                "{} | {}",
                fit_column(row.before.unwrap_or_default(), SIDE_BY_SIDE_WIDTH),
                fit_column(row.after.unwrap_or_default(), SIDE_BY_SIDE_WIDTH)
            ));
        }

        out.join("\n")
    }

    fn render_html(header: &DiffHeader, rows: &[DiffRow]) -> String {
        let mut out = vec![
            "<table class=\"diff\">".to_string(),
            format!(
                "<thead><tr><th>{} v{}</th><th>v{}</th></tr></thead>",
                escape_html(header.file_id),
                header.from_version,
                header.to_version
            ),
            "<tbody>".to_string(),
        ];

        for (i, row) in rows.iter().enumerate() {
            let line = i + 1;
            if row.is_unchanged() {
                out.push(format!(
                    "<tr class=\"unchanged\"><td>{}</td><td> {}</td></tr>",
                    line,
                    escape_html(row.before.unwrap_or_default())
                ));
                continue;
            }
            if let Some(before) = row.before {
                out.push(format!(
                    "<tr class=\"deletion\"><td>{}</td><td>-{}</td></tr>",
                    line,
                    escape_html(before)
                ));
            }
            if let Some(after) = row.after {
                out.push(format!(
                    "<tr class=\"addition\"><td>{}</td><td>+{}</td></tr>",
                    line,
                    escape_html(after)
                ));
            }
        }

        out.push("</tbody>".to_string());
        out.push("</table>".to_string());
        out.join("\n")
    }

    // Pads or truncates to exactly `width` characters
    fn fit_column(text: &str, width: usize) -> String {
        let mut column: String = text.chars().take(width).collect();
        let len = column.chars().count();
        column.extend(std::iter::repeat(' ').take(width - len));
        column
    }

    pub fn escape_html(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                other => escaped.push(other),
            }
        }
        escaped
    }
}

pub mod merge_utils {
    use super::*;

    // Wraps both sides in conflict markers; no line-level merging is attempted.
    // The footer names the version the conflict was detected against.
    pub fn create_marked_merge(current: &str, incoming: &str, conflicting_version: Version) -> String {
        [
            "<<<<<<< Current".to_string(),
            current.to_string(),
            "=======".to_string(),
            incoming.to_string(),
            format!(">>>>>>> Version {}", conflicting_version),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::diff_utils::*;
    use super::merge_utils::*;
    use super::*;
    use chrono::TimeZone;

    fn header() -> DiffHeader<'static> {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        DiffHeader {
            file_id: "doc1",
            from_version: 1,
            from_timestamp: ts,
            to_version: 2,
            to_timestamp: ts,
        }
    }

    #[test]
    fn empty_content_counts_as_one_line() {
        assert_eq!(count_lines(""), 1);
        assert_eq!(count_lines("line1\nline2"), 2);
        assert_eq!(count_lines("trailing\n"), 2);
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn positional_diff_reports_single_modification() {
        let changes = compute_changes("line1\nline2", "line1\nline2 changed", DiffAlgorithm::Positional);
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.kind, ChangeKind::Modification);
        assert_eq!((change.line_start, change.line_end), (2, 2));
        assert_eq!(change.content_before.as_deref(), Some("line2"));
        assert_eq!(change.content_after.as_deref(), Some("line2 changed"));
    }

    #[test]
    fn positional_diff_cascades_on_insertion() {
        // A single inserted line shifts everything after it
        let changes = compute_changes("a\nb\nc", "x\na\nb\nc", DiffAlgorithm::Positional);
        let kinds: Vec<ChangeKind> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Modification,
                ChangeKind::Modification,
                ChangeKind::Modification,
                ChangeKind::Addition
            ]
        );
    }

    #[test]
    fn lcs_diff_isolates_insertion() {
        let changes = compute_changes("a\nb\nc", "x\na\nb\nc", DiffAlgorithm::Lcs);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Addition);
        assert_eq!((changes[0].line_start, changes[0].line_end), (1, 1));
        assert_eq!(changes[0].content_after.as_deref(), Some("x"));
    }

    #[test]
    fn lcs_diff_reports_deletion_range() {
        let changes = compute_changes("a\nb\nc\nd", "a\nd", DiffAlgorithm::Lcs);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Deletion);
        assert_eq!((changes[0].line_start, changes[0].line_end), (2, 3));
        assert_eq!(changes[0].summary, "Removed lines 2-3");
    }

    #[test]
    fn identical_content_has_no_changes() {
        for algorithm in [DiffAlgorithm::Positional, DiffAlgorithm::Lcs] {
            assert!(compute_changes("same\ntext", "same\ntext", algorithm).is_empty());
        }
    }

    #[test]
    fn unified_render_marks_removed_then_added() {
        let rows = diff_rows("a\nb", "a\nc\nd", DiffAlgorithm::Positional);
        let rendered = render_diff(DiffFormat::Unified, &header(), &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with("--- doc1 (version 1)"));
        assert!(lines[1].starts_with("+++ doc1 (version 2)"));
        assert_eq!(&lines[2..], &[" a", "-b", "+c", "+d"]);
    }

    #[test]
    fn side_by_side_columns_are_fixed_width() {
        let long = "x".repeat(60);
        let rows = diff_rows(&long, "short", DiffAlgorithm::Positional);
        let rendered = render_diff(DiffFormat::SideBySide, &header(), &rows);
        let body = rendered.lines().nth(2).unwrap();
        let (left, right) = body.split_once(" | ").unwrap();
        assert_eq!(left.chars().count(), 40);
        assert_eq!(right.chars().count(), 40);
        assert!(right.starts_with("short"));
    }

    #[test]
    fn html_render_escapes_and_classifies() {
        let rows = diff_rows("<a href='x'>", "<a href='x'>\nTom & \"Jerry\"", DiffAlgorithm::Positional);
        let rendered = render_diff(DiffFormat::Html, &header(), &rows);
        assert!(rendered.contains("<tr class=\"unchanged\"><td>1</td><td> &lt;a href=&#39;x&#39;&gt;</td></tr>"));
        assert!(rendered.contains("<tr class=\"addition\"><td>2</td><td>+Tom &amp; &quot;Jerry&quot;</td></tr>"));
        assert!(!rendered.contains("class=\"deletion\""));
    }

    #[test]
    fn marked_merge_wraps_both_sides() {
        let merged = create_marked_merge("mine", "theirs", 3);
        assert_eq!(merged, "<<<<<<< Current\nmine\n=======\ntheirs\n>>>>>>> Version 3");
    }

    #[test]
    fn base_changes_anchor_insertions_in_base_lines() {
        let inserted = base_changes("a\nb\nc\nd", "x\ny\nz\na\nb\nc\nd", DiffAlgorithm::Lcs);
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].kind, ChangeKind::Addition);
        assert_eq!((inserted[0].line_start, inserted[0].line_end), (0, 0));
        assert_eq!(inserted[0].content_after.as_deref(), Some("x\ny\nz"));

        let edited = base_changes("a\nb\nc\nd", "a\nb\nC\nd", DiffAlgorithm::Lcs);
        assert_eq!((edited[0].line_start, edited[0].line_end), (3, 3));
        assert!(!changes_conflict(&inserted, &edited));

        // Two insertions at the same point still collide
        let other = base_changes("a\nb\nc\nd", "w\na\nb\nc\nd", DiffAlgorithm::Lcs);
        assert!(changes_conflict(&inserted, &other));
    }
}

//! Statement splitting and classification.
//!
//! Raw migration text is split on `;` terminators and each statement is
//! classified by its leading keyword into a closed set of kinds. Contiguous
//! statements of the same kind are grouped into [`Batch`]es, which are the
//! unit of execution.
//!
//! The splitter understands single-, double- and backtick-quoted text (with
//! doubled-quote escapes), `--` line comments and `/* */` block comments. It
//! does not understand backslash escapes or compound bodies such as
//! `CREATE TRIGGER ... BEGIN ... END`.

use std::fmt;

use serde::Serialize;
use tidemark_core::TidemarkError;

/// Longest statement excerpt carried in a classification error.
const PREVIEW_CHARS: usize = 80;

const SCHEMA_KEYWORDS: &[&str] = &[
    "CREATE", "ALTER", "DROP", "RENAME", "GRANT", "REVOKE", "ANALYZE",
];
const DATA_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

/// The execution class of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Alters the structure of the database; applied through schema operations.
    SchemaChange,
    /// Mutates rows; applied transactionally or with partitioned execution.
    DataChange,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaChange => f.write_str("schema change"),
            Self::DataChange => f.write_str("data change"),
        }
    }
}

/// A single classified statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// The statement's kind.
    pub kind: StatementKind,
    /// The statement text without its terminator or leading comments.
    pub text: String,
    /// Position of the statement within its migration, starting at 0.
    pub index: usize,
}

/// A run of contiguous statements of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// The kind shared by every statement in the batch.
    pub kind: StatementKind,
    /// The statements, in file order.
    pub statements: Vec<Statement>,
}

impl Batch {
    /// Returns the statement texts.
    pub fn texts(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.text.clone()).collect()
    }

    /// Returns the migration index of the first statement.
    pub fn first_index(&self) -> usize {
        self.statements.first().map_or(0, |s| s.index)
    }

    /// Returns the number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if the batch holds no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Clone, Copy)]
enum LexState {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Splits raw text into statement texts.
///
/// Empty and comment-only segments are dropped. A trailing statement without a
/// terminator is kept.
///
/// # Examples
///
/// ```
/// use tidemark_migrations::statement::split_statements;
///
/// let parts = split_statements("CREATE TABLE t (s TEXT);\n-- seed\nINSERT INTO t VALUES ('a;b');");
/// assert_eq!(parts, vec!["CREATE TABLE t (s TEXT)", "INSERT INTO t VALUES ('a;b')"]);
/// ```
pub fn split_statements(raw: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut state = LexState::Code;
    // Byte offset of the first non-comment character of the current segment.
    let mut start: Option<usize> = None;
    let mut chars = raw.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        match state {
            LexState::Code => match c {
                ';' => {
                    if let Some(s) = start.take() {
                        statements.push(raw[s..i].trim().to_string());
                    }
                }
                '-' if next == Some('-') => {
                    chars.next();
                    state = LexState::LineComment;
                }
                '/' if next == Some('*') => {
                    chars.next();
                    state = LexState::BlockComment;
                }
                '\'' | '"' | '`' => {
                    start.get_or_insert(i);
                    state = LexState::Quoted(c);
                }
                c if c.is_whitespace() => {}
                _ => {
                    start.get_or_insert(i);
                }
            },
            LexState::Quoted(quote) => {
                if c == quote {
                    if next == Some(quote) {
                        chars.next();
                    } else {
                        state = LexState::Code;
                    }
                }
            }
            LexState::LineComment => {
                if c == '\n' {
                    state = LexState::Code;
                }
            }
            LexState::BlockComment => {
                if c == '*' && next == Some('/') {
                    chars.next();
                    state = LexState::Code;
                }
            }
        }
    }

    if let Some(s) = start {
        let tail = raw[s..].trim();
        if !tail.is_empty() {
            statements.push(tail.to_string());
        }
    }
    statements
}

/// Classifies one statement by its leading keyword.
///
/// Returns `None` for keywords outside the dictionary.
pub fn classify_statement(text: &str) -> Option<StatementKind> {
    let keyword: String = text
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase();

    if SCHEMA_KEYWORDS.contains(&keyword.as_str()) {
        Some(StatementKind::SchemaChange)
    } else if DATA_KEYWORDS.contains(&keyword.as_str()) {
        Some(StatementKind::DataChange)
    } else {
        None
    }
}

/// Splits and classifies raw migration text.
///
/// Fails with [`TidemarkError::UnknownStatementKind`] on the first statement
/// whose leading keyword is not recognized.
pub fn classify(raw: &str) -> Result<Vec<Statement>, TidemarkError> {
    split_statements(raw)
        .into_iter()
        .enumerate()
        .map(|(index, text)| match classify_statement(&text) {
            Some(kind) => Ok(Statement { kind, text, index }),
            None => Err(TidemarkError::UnknownStatementKind {
                index,
                statement: preview(&text),
            }),
        })
        .collect()
}

/// Groups statements into batches of contiguous same-kind statements,
/// preserving order.
pub fn batches(statements: Vec<Statement>) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for statement in statements {
        match batches.last_mut() {
            Some(batch) if batch.kind == statement.kind => batch.statements.push(statement),
            _ => batches.push(Batch {
                kind: statement.kind,
                statements: vec![statement],
            }),
        }
    }
    batches
}

fn preview(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > PREVIEW_CHARS {
        let cut: String = single_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        single_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        let parts = split_statements("CREATE TABLE a (id INTEGER);\nCREATE TABLE b (id INTEGER);\n");
        assert_eq!(
            parts,
            vec!["CREATE TABLE a (id INTEGER)", "CREATE TABLE b (id INTEGER)"]
        );
    }

    #[test]
    fn test_split_keeps_unterminated_tail() {
        let parts = split_statements("DELETE FROM a;\nDELETE FROM b");
        assert_eq!(parts, vec!["DELETE FROM a", "DELETE FROM b"]);
    }

    #[test]
    fn test_split_ignores_terminators_in_quotes() {
        let parts = split_statements(
            "INSERT INTO t VALUES ('a;b', \"c;d\", `e;f`);\nINSERT INTO t VALUES ('it''s;ok');",
        );
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "INSERT INTO t VALUES ('a;b', \"c;d\", `e;f`)");
        assert_eq!(parts[1], "INSERT INTO t VALUES ('it''s;ok')");
    }

    #[test]
    fn test_split_ignores_terminators_in_comments() {
        let raw = "-- setup; not a statement\n/* block; comment */ CREATE TABLE t (id INTEGER);";
        let parts = split_statements(raw);
        assert_eq!(parts, vec!["CREATE TABLE t (id INTEGER)"]);
    }

    #[test]
    fn test_split_drops_empty_and_comment_only_segments() {
        let raw = ";;\n  ;\n-- only a comment\n;\n/* nothing */;\nDROP TABLE t;\n-- trailing";
        assert_eq!(split_statements(raw), vec!["DROP TABLE t"]);
        assert!(split_statements("").is_empty());
        assert!(split_statements("   \n\t").is_empty());
    }

    #[test]
    fn test_classify_statement_dictionary() {
        for sql in [
            "CREATE TABLE t (id INTEGER)",
            "alter table t add column x TEXT",
            "Drop Index idx",
            "RENAME TABLE a TO b",
            "GRANT SELECT ON t TO r",
            "REVOKE SELECT ON t FROM r",
            "ANALYZE",
        ] {
            assert_eq!(classify_statement(sql), Some(StatementKind::SchemaChange), "{sql}");
        }
        for sql in ["INSERT INTO t VALUES (1)", "update t set x = 1", "DELETE FROM t"] {
            assert_eq!(classify_statement(sql), Some(StatementKind::DataChange), "{sql}");
        }
        assert_eq!(classify_statement("SELECT 1"), None);
        assert_eq!(classify_statement("CREATED"), None);
        assert_eq!(classify_statement("(SELECT 1)"), None);
    }

    #[test]
    fn test_classify_assigns_indices() {
        let raw = "CREATE TABLE t (id INTEGER);\nINSERT INTO t VALUES (1);\nALTER TABLE t ADD COLUMN n TEXT;";
        let statements = classify(raw).unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements.iter().map(|s| (s.index, s.kind)).collect::<Vec<_>>(),
            vec![
                (0, StatementKind::SchemaChange),
                (1, StatementKind::DataChange),
                (2, StatementKind::SchemaChange),
            ]
        );
    }

    #[test]
    fn test_classify_skips_leading_comment() {
        let statements = classify("/* seed */ -- users\nINSERT INTO users VALUES (1);").unwrap();
        assert_eq!(statements[0].kind, StatementKind::DataChange);
        assert!(statements[0].text.starts_with("INSERT"));
    }

    #[test]
    fn test_classify_unknown_kind() {
        let raw = "CREATE TABLE t (id INTEGER);\nSELECT * FROM t;";
        let err = classify(raw).unwrap_err();
        match err {
            TidemarkError::UnknownStatementKind { index, statement } => {
                assert_eq!(index, 1);
                assert_eq!(statement, "SELECT * FROM t");
            }
            other => panic!("expected UnknownStatementKind, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_preview_is_truncated() {
        let long = format!("SELECT {}", "x, ".repeat(100));
        let err = classify(&long).unwrap_err();
        let TidemarkError::UnknownStatementKind { statement, .. } = err else {
            panic!("expected UnknownStatementKind");
        };
        assert!(statement.ends_with("..."));
        assert_eq!(statement.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_batches_preserve_order_across_kinds() {
        let raw = "CREATE TABLE a (id INTEGER);\n\
                   CREATE TABLE b (id INTEGER);\n\
                   INSERT INTO a VALUES (1);\n\
                   UPDATE a SET id = 2;\n\
                   CREATE INDEX idx ON a (id);";
        let batches = batches(classify(raw).unwrap());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].kind, StatementKind::SchemaChange);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].kind, StatementKind::DataChange);
        assert_eq!(batches[1].first_index(), 2);
        assert_eq!(
            batches[1].texts(),
            vec!["INSERT INTO a VALUES (1)", "UPDATE a SET id = 2"]
        );
        assert_eq!(batches[2].kind, StatementKind::SchemaChange);
        assert_eq!(batches[2].first_index(), 4);
    }

    #[test]
    fn test_batches_empty() {
        assert!(batches(Vec::new()).is_empty());
    }
}

//! Statement safety classification.
//!
//! Decides whether a SQL text is read-only or destructive before it is
//! allowed anywhere near a connector. Classification is lexical: the text
//! is tokenized with the source's dialect and keyword positions are
//! inspected. Anything the classifier is not sure about is destructive.

mod classifier;

pub use classifier::{classify_sql, SqlClassifier};

use std::fmt;

/// SQL dialect used to tokenize a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SqlDialect {
    #[default]
    Generic,
    Postgres,
    MySql,
    MsSql,
    Sqlite,
}

/// Verdict for a SQL request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Only reads data (SELECT, SHOW, plain EXPLAIN, ...).
    ReadOnly,
    /// Writes data, changes schema or session state, or could not be
    /// classified with confidence.
    Destructive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Destructive => write!(f, "destructive"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    Replace,
    Merge,
    Explain,
    Show,
    Describe,
    Pragma,
    With,
    /// Another recognized statement keyword (CALL, VACUUM, SET, ...).
    Other(String),
    /// Multiple statements detected; contains the type that decided the verdict.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl StatementType {
    /// Maps a leading keyword (uppercase) to a statement type.
    pub(crate) fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "DROP" => Self::Drop,
            "TRUNCATE" => Self::Truncate,
            "ALTER" => Self::Alter,
            "CREATE" => Self::Create,
            "GRANT" => Self::Grant,
            "REVOKE" => Self::Revoke,
            "REPLACE" => Self::Replace,
            "MERGE" => Self::Merge,
            "EXPLAIN" => Self::Explain,
            "SHOW" => Self::Show,
            "DESCRIBE" | "DESC" => Self::Describe,
            "PRAGMA" => Self::Pragma,
            "WITH" => Self::With,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Replace => write!(f, "REPLACE"),
            Self::Merge => write!(f, "MERGE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Describe => write!(f, "DESCRIBE"),
            Self::Pragma => write!(f, "PRAGMA"),
            Self::With => write!(f, "WITH (CTE)"),
            Self::Other(keyword) => write!(f, "{}", keyword),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The verdict for the whole request.
    pub verdict: Verdict,
    /// The type of statement(s) detected.
    pub statement_type: StatementType,
    /// What matched: the keyword or pattern that made the request destructive.
    pub reason: Option<String>,
}

impl ClassificationResult {
    /// Creates a read-only classification.
    pub fn read_only(statement_type: StatementType) -> Self {
        Self {
            verdict: Verdict::ReadOnly,
            statement_type,
            reason: None,
        }
    }

    /// Creates a destructive classification with the matched reason.
    pub fn destructive(statement_type: StatementType, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Destructive,
            statement_type,
            reason: Some(reason.into()),
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.verdict == Verdict::Destructive
    }

    pub fn is_read_only(&self) -> bool {
        self.verdict == Verdict::ReadOnly
    }

    /// Short description of the offending fragment, for violation messages.
    pub fn fragment(&self) -> String {
        match &self.reason {
            Some(reason) => reason.clone(),
            None => self.statement_type.to_string(),
        }
    }
}

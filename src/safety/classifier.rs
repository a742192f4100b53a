//! Lexical SQL classification.
//!
//! Uses the sqlparser-rs tokenizer (with the source's dialect) so that
//! comments, string literals, quoted identifiers and dollar-quoted bodies
//! never look like keywords. No AST is built: statements are split on `;`
//! and their keywords are inspected positionally.

use sqlparser::dialect::{
    GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError, Whitespace};
use tracing::debug;

use super::{ClassificationResult, SqlDialect, StatementType};

/// Leading keywords that always make a statement destructive.
///
/// This list is a floor: any leading keyword that is not explicitly
/// read-only is destructive as well.
const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "REPLACE", "MERGE", "UPSERT", "RENAME", "COMMENT", "COPY", "CALL", "EXEC", "EXECUTE", "DO",
    "LOCK", "VACUUM", "REINDEX", "CLUSTER", "ANALYZE", "OPTIMIZE", "REFRESH", "ATTACH",
    "DETACH", "LOAD", "IMPORT", "SET", "RESET", "BEGIN", "START", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "RELEASE", "USE", "KILL", "SHUTDOWN", "FLUSH", "PURGE", "HANDLER", "DECLARE",
    "PREPARE", "DEALLOCATE", "LISTEN", "NOTIFY", "UNLISTEN", "DISCARD", "CHECKPOINT",
    "SECURITY", "ALLOCATE", "BACKUP", "RESTORE", "DBCC", "BULK", "REASSIGN", "INSTALL",
    "UNINSTALL", "DENY", "WAITFOR", "RECONFIGURE", "REVERT", "SETUSER",
];

/// T-SQL control-of-flow words that start a new statement inside a batch.
const TSQL_BATCH_KEYWORDS: &[&str] = &["IF", "WHILE", "GOTO", "RAISERROR", "THROW", "PRINT"];

/// Words that make an otherwise read-only statement write something when
/// they appear anywhere in its body (writable CTEs, SELECT ... INTO,
/// FOR UPDATE).
const BODY_WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT",
    "REVOKE", "INTO", "COPY", "CALL", "EXEC", "EXECUTE",
];

/// Statement starters that can follow EXPLAIN and its options.
const EXPLAINABLE_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "VALUES", "TABLE", "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE",
    "CREATE", "DECLARE", "EXECUTE",
];

/// SQLite pragmas that take an argument without changing anything.
const READ_PRAGMA_FUNCTIONS: &[&str] = &[
    "table_info",
    "table_xinfo",
    "table_list",
    "index_list",
    "index_info",
    "index_xinfo",
    "foreign_key_list",
    "foreign_key_check",
    "integrity_check",
    "quick_check",
    "function_list",
    "module_list",
    "pragma_list",
];

/// SQLite pragmas that do work even in their bare form.
const WRITING_PRAGMAS: &[&str] = &[
    "wal_checkpoint",
    "optimize",
    "incremental_vacuum",
    "shrink_memory",
];

/// SQL classifier bound to a tokenizer dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlClassifier {
    dialect: SqlDialect,
}

impl SqlClassifier {
    /// Creates a classifier using the generic dialect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier for a specific dialect.
    pub fn with_dialect(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Classifies a SQL request.
    ///
    /// Never fails: text that cannot be tokenized, is empty, or starts with
    /// an unrecognized keyword is classified as destructive.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        let tokens = match self.tokenize(sql) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!("SQL could not be tokenized: {}", e);
                return ClassificationResult::destructive(
                    StatementType::Unknown,
                    "could not tokenize SQL",
                );
            }
        };

        if has_executable_comment(&tokens) {
            return ClassificationResult::destructive(
                StatementType::Unknown,
                "executable comment (/*! ... */)",
            );
        }

        let statements = split_statements(&tokens);
        match statements.as_slice() {
            [] => ClassificationResult::destructive(StatementType::Unknown, "empty SQL statement"),
            [single] => classify_statement(single, self.dialect),
            many => classify_many(many, self.dialect),
        }
    }

    fn tokenize(&self, sql: &str) -> Result<Vec<Token>, TokenizerError> {
        match self.dialect {
            SqlDialect::Generic => Tokenizer::new(&GenericDialect {}, sql).tokenize(),
            SqlDialect::Postgres => Tokenizer::new(&PostgreSqlDialect {}, sql).tokenize(),
            SqlDialect::MySql => Tokenizer::new(&MySqlDialect {}, sql).tokenize(),
            SqlDialect::MsSql => Tokenizer::new(&MsSqlDialect {}, sql).tokenize(),
            SqlDialect::Sqlite => Tokenizer::new(&SQLiteDialect {}, sql).tokenize(),
        }
    }
}

/// Convenience function to classify SQL with the generic dialect.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

/// A request is destructive as soon as one of its statements is.
fn classify_many(statements: &[Vec<&Token>], dialect: SqlDialect) -> ClassificationResult {
    let mut first_type = StatementType::Unknown;

    for (index, statement) in statements.iter().enumerate() {
        let result = classify_statement(statement, dialect);
        if result.is_destructive() {
            return ClassificationResult {
                verdict: result.verdict,
                statement_type: StatementType::Multiple(Box::new(result.statement_type)),
                reason: result.reason,
            };
        }
        if index == 0 {
            first_type = result.statement_type;
        }
    }

    ClassificationResult::read_only(StatementType::Multiple(Box::new(first_type)))
}

/// Splits significant tokens (no whitespace or comments) on `;`, dropping
/// empty statements.
fn split_statements(tokens: &[Token]) -> Vec<Vec<&Token>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();

    for token in tokens {
        match token {
            Token::Whitespace(_) | Token::EOF => {}
            Token::SemiColon => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(token),
        }
    }
    if !current.is_empty() {
        statements.push(current);
    }

    statements
}

/// MySQL and MariaDB execute the body of `/*! ... */` comments.
fn has_executable_comment(tokens: &[Token]) -> bool {
    tokens.iter().any(|token| {
        matches!(
            token,
            Token::Whitespace(Whitespace::MultiLineComment(body)) if body.starts_with('!')
        )
    })
}

/// Returns the uppercase value of an unquoted word token.
fn bare_word(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_uppercase()),
        _ => None,
    }
}

fn classify_statement(tokens: &[&Token], dialect: SqlDialect) -> ClassificationResult {
    let start = tokens
        .iter()
        .position(|token| !matches!(token, Token::LParen))
        .unwrap_or(tokens.len());
    let body = &tokens[start..];

    let Some(keyword) = body.first().and_then(|token| bare_word(token)) else {
        return ClassificationResult::destructive(
            StatementType::Unknown,
            "unrecognized statement start",
        );
    };
    let rest = &body[1..];

    let batched = dialect == SqlDialect::MsSql;
    match keyword.as_str() {
        "SELECT" | "VALUES" | "TABLE" => scan_body(rest, StatementType::Select, batched),
        "WITH" => scan_body(rest, StatementType::With, batched),
        "SHOW" => ClassificationResult::read_only(StatementType::Show),
        "DESCRIBE" | "DESC" => ClassificationResult::read_only(StatementType::Describe),
        "EXPLAIN" => classify_explain(rest, dialect),
        "PRAGMA" => classify_pragma(rest),
        kw if MUTATING_KEYWORDS.contains(&kw) || TSQL_BATCH_KEYWORDS.contains(&kw) => {
            ClassificationResult::destructive(StatementType::from_keyword(kw), kw)
        }
        other => ClassificationResult::destructive(
            StatementType::Unknown,
            format!("unrecognized statement {other}"),
        ),
    }
}

/// Scans the body of a read-only statement for words that write.
///
/// With `batched` (T-SQL), statements may follow each other without a `;`,
/// so any statement-starting keyword in the body counts as a new statement.
/// Words used as a function call (`REPLACE(...)`) or qualified by a dot
/// (`t.comment`) are identifiers there.
fn scan_body(
    tokens: &[&Token],
    statement_type: StatementType,
    batched: bool,
) -> ClassificationResult {
    let mut previous: Option<String> = None;

    for (index, token) in tokens.iter().enumerate() {
        let Some(word) = bare_word(token) else {
            previous = None;
            continue;
        };

        if BODY_WRITE_KEYWORDS.contains(&word.as_str()) {
            return match (previous.as_deref(), word.as_str()) {
                (Some("FOR"), "UPDATE") => {
                    ClassificationResult::destructive(statement_type, "SELECT ... FOR UPDATE")
                }
                (_, "INTO") => {
                    let reason = format!("{} ... INTO", statement_type);
                    ClassificationResult::destructive(statement_type, reason)
                }
                _ => {
                    let reason = format!("{} inside {}", word, statement_type);
                    ClassificationResult::destructive(StatementType::from_keyword(&word), reason)
                }
            };
        }

        if batched && starts_batched_statement(tokens, index, &word) {
            let reason = format!("{} after {}", word, statement_type);
            return ClassificationResult::destructive(StatementType::from_keyword(&word), reason);
        }

        previous = Some(word);
    }

    ClassificationResult::read_only(statement_type)
}

fn starts_batched_statement(tokens: &[&Token], index: usize, word: &str) -> bool {
    if !MUTATING_KEYWORDS.contains(&word) && !TSQL_BATCH_KEYWORDS.contains(&word) {
        return false;
    }
    let qualified = index > 0 && matches!(tokens[index - 1], Token::Period);
    let called = matches!(tokens.get(index + 1), Some(Token::LParen));
    !qualified && !called
}

/// Plain EXPLAIN only plans; EXPLAIN ANALYZE runs the explained statement.
fn classify_explain(tokens: &[&Token], dialect: SqlDialect) -> ClassificationResult {
    let mut depth = 0usize;
    let mut analyze = false;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        let Some(word) = bare_word(token) else {
            continue;
        };

        if word == "ANALYZE" || word == "ANALYSE" {
            analyze = true;
        } else if depth == 0 && EXPLAINABLE_KEYWORDS.contains(&word.as_str()) {
            if !analyze {
                return ClassificationResult::read_only(StatementType::Explain);
            }
            let inner = classify_statement(&tokens[index..], dialect);
            return ClassificationResult {
                verdict: inner.verdict,
                statement_type: StatementType::Explain,
                reason: inner.reason.map(|reason| format!("EXPLAIN ANALYZE {reason}")),
            };
        }
    }

    ClassificationResult::destructive(
        StatementType::Explain,
        "EXPLAIN without a recognizable statement",
    )
}

fn classify_pragma(tokens: &[&Token]) -> ClassificationResult {
    if tokens.iter().any(|token| matches!(token, Token::Eq)) {
        return ClassificationResult::destructive(StatementType::Pragma, "PRAGMA assignment");
    }

    let has_argument = tokens.iter().any(|token| matches!(token, Token::LParen));
    let name = tokens
        .iter()
        .take_while(|token| !matches!(token, Token::LParen))
        .filter_map(|token| match token {
            Token::Word(word) => Some(word.value.to_lowercase()),
            _ => None,
        })
        .last();

    let Some(name) = name else {
        return ClassificationResult::destructive(StatementType::Pragma, "PRAGMA without a name");
    };

    if WRITING_PRAGMAS.contains(&name.as_str()) {
        return ClassificationResult::destructive(StatementType::Pragma, format!("PRAGMA {name}"));
    }
    if has_argument && !READ_PRAGMA_FUNCTIONS.contains(&name.as_str()) {
        return ClassificationResult::destructive(
            StatementType::Pragma,
            format!("PRAGMA {name}(...) sets a value"),
        );
    }

    ClassificationResult::read_only(StatementType::Pragma)
}

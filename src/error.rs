use std::fmt;

use anyhow::anyhow;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    Database,
    Forbidden,
    InvalidInput,
    NotFound,
}

/// Library error carrying a safe public message and the full internal cause.
#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            source,
        }
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            source,
        }
    }

    pub fn forbidden(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            code: "forbidden",
            public,
            source,
        }
    }

    pub fn conflict(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            code: "conflict",
            public,
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            source,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind == ErrorKind::Forbidden
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for LibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.public, self.source)
    }
}

impl std::error::Error for LibError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = &*self.source;
        Some(source)
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        let unique_violation = value
            .as_database_error()
            .is_some_and(|err| err.is_unique_violation());
        if unique_violation {
            Self::conflict("Record already exists", anyhow!(value))
        } else {
            Self::database("Database request failed", anyhow!(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use anyhow::{Context, anyhow};

    use super::{ErrorKind, LibError};

    #[test]
    fn display_includes_public_message_and_cause_chain() {
        let source = Err::<(), _>(anyhow!("connection reset"))
            .context("Failed to add group members")
            .expect_err("error expected");
        let err = LibError::database("Database request failed", source);

        let rendered = err.to_string();
        assert!(rendered.starts_with("Database request failed"));
        assert!(rendered.contains("Failed to add group members"));
        assert!(rendered.contains("connection reset"));
    }

    #[test]
    fn source_is_preserved() {
        let err = LibError::not_found("User group not found", anyhow!("group gryffindor missing"));
        let source = err.source().expect("source should be present");
        assert_eq!(source.to_string(), "group gryffindor missing");
        assert!(err.is_not_found());
        assert!(!err.is_forbidden());
    }

    #[test]
    fn constructors_set_kind_and_code() {
        let conflict = LibError::conflict("taken", anyhow!("dup"));
        assert_eq!(conflict.kind, ErrorKind::Conflict);
        assert_eq!(conflict.code, "conflict");

        let forbidden = LibError::forbidden("nope", anyhow!("not admin"));
        assert_eq!(forbidden.kind, ErrorKind::Forbidden);
        assert_eq!(forbidden.code, "forbidden");

        let invalid = LibError::invalid_with_code("invalid_slug", "bad slug", anyhow!("x"));
        assert_eq!(invalid.kind, ErrorKind::InvalidInput);
        assert_eq!(invalid.code, "invalid_slug");
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn non_constraint_sqlx_errors_are_database_errors() {
        let err = LibError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind, ErrorKind::Database);
        assert_eq!(err.public, "Database request failed");
    }
}

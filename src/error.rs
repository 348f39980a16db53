use thiserror::Error;

pub type PanelResult<T> = Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Excel(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Calculation cancelled")]
    Cancelled,
}

/// A formula that cannot be evaluated even though its inputs are present.
///
/// Missing data is never reported through this type; it shows up as
/// [`CellValue::Absent`](crate::types::CellValue::Absent) instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("at position {position}: {message}")]
    Parse { message: String, position: usize },
}

impl ExpressionError {
    pub fn unknown_column(column: impl Into<String>) -> Self {
        ExpressionError::UnknownColumn {
            column: column.into(),
        }
    }

    pub fn type_mismatch(op: impl Into<String>, left: &'static str, right: &'static str) -> Self {
        ExpressionError::TypeMismatch {
            op: op.into(),
            left,
            right,
        }
    }
}

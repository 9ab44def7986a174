// SQLite error code mapping into the core's AppError.

use geostage_core::error::AppError;

pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            return match code.as_ref() {
                "2067" | "1555" => AppError::Conflict(db_err.message().to_string()),
                "787" | "3850" => AppError::Validation(format!("foreign key violation: {}", db_err.message())),
                "5" => AppError::Database(format!("database busy: {}", db_err.message())),
                "13" => AppError::Database(format!("database full: {}", db_err.message())),
                _ => AppError::Database(db_err.message().to_string()),
            };
        }
    }
    AppError::Database(err.to_string())
}

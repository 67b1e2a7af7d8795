/// Wraps the error of `$result` into an `AppError` variant, logging the context.
///
/// ```ignore
/// with_context!(db.query(sql).await, DatabaseError, "Failed to count role members")
/// ```
#[macro_export]
macro_rules! with_context {
    ($result:expr, $context:expr) => {
        $crate::with_context!($result, DatabaseError, $context)
    };

    ($result:expr, $error_type:ident, $context:expr) => {
        $result.map_err(|e| {
            $crate::__private::tracing::error!(error = %e, "{}", $context);
            $crate::AppError::$error_type($crate::__private::anyhow::anyhow!("{}: {}", $context, e))
        })
    };
}

/// `Err(ValidationError)` for a single field.
#[macro_export]
macro_rules! validation_error {
    ($field:expr, $message:expr) => {
        Err($crate::AppError::validation($field, $message))
    };
}

/// ```ignore
/// return not_found_error!("Role", role_id);
/// ```
#[macro_export]
macro_rules! not_found_error {
    ($resource_type:expr, $identifier:expr) => {
        Err($crate::AppError::resource_not_found($resource_type, $identifier))
    };
}

#[macro_export]
macro_rules! resource_exists_error {
    ($resource_type:expr, $field:expr, $value:expr) => {
        Err($crate::AppError::resource_exists($resource_type, $field, $value))
    };
}

use crate::services::error::{ErrorCode, ServiceError, ServiceResult};

/// Returns `value` or an `INVALID_PARAMETER` error naming `field` when blank.
pub fn require_non_blank<'a>(value: &'a str, field: &str) -> ServiceResult<&'a str> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidParameter,
            format!("{} must not be blank", field),
        ));
    }
    Ok(value)
}

/// A value used as one segment of an object key: non-blank, no `/`, and not
/// `.` or `..`.
pub fn require_key_segment<'a>(value: &'a str, field: &str) -> ServiceResult<&'a str> {
    require_non_blank(value, field)?;
    if value.contains('/') || value == "." || value == ".." {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidParameter,
            format!("{} must be a single path segment, got '{}'", field, value),
        ));
    }
    Ok(value)
}

/// Extension of `file_name` including the leading dot (`"report.pdf"` → `".pdf"`).
pub fn file_extension(file_name: &str) -> Option<&str> {
    file_name.rfind('.').map(|idx| &file_name[idx..])
}

/// Rejects blank names and names without an extension; returns the extension.
pub fn require_extension(file_name: &str) -> ServiceResult<&str> {
    if file_name.trim().is_empty() {
        return Err(ServiceError::invalid(
            ErrorCode::EmptyFileName,
            "File name must not be blank",
        ));
    }
    file_extension(file_name).ok_or_else(|| {
        ServiceError::invalid(
            ErrorCode::MissingExtension,
            format!("File '{}' has no extension", file_name),
        )
    })
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> ServiceResult<()> {
    if size > max_size {
        return Err(ServiceError::invalid(
            ErrorCode::FileTooLarge,
            format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        ));
    }
    Ok(())
}

/// S3 bucket naming rules: 3-63 characters of lowercase letters, digits, `-`
/// and `.`, starting and ending with a letter or digit, no `..`.
pub fn validate_bucket_name(name: &str) -> ServiceResult<()> {
    let invalid = |reason: &str| {
        Err(ServiceError::invalid(
            ErrorCode::InvalidBucketName,
            format!("Invalid bucket name '{}': {}", name, reason),
        ))
    };

    if !(3..=63).contains(&name.len()) {
        return invalid("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return invalid("only lowercase letters, digits, '-' and '.' are allowed");
    }
    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("must not contain consecutive dots");
    }
    Ok(())
}

/// Rejects text that is not a JSON document.
pub fn validate_policy_json(policy: &str) -> ServiceResult<()> {
    if policy.trim().is_empty() {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidPolicy,
            "Policy must not be blank",
        ));
    }
    serde_json::from_str::<serde_json::Value>(policy).map_err(|e| {
        ServiceError::invalid(
            ErrorCode::InvalidPolicy,
            format!("Policy is not valid JSON: {}", e),
        )
    })?;
    Ok(())
}

/// Content type to store an upload under: the declared type when it parses,
/// otherwise whatever the magic bytes say, otherwise `application/octet-stream`.
pub fn detect_content_type(declared: Option<&str>, data: &[u8]) -> String {
    if let Some(declared) = declared {
        if let Ok(parsed) = declared.trim().parse::<mime::Mime>() {
            return parsed.essence_str().to_string();
        }
    }

    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

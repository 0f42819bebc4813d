//! Request extraction and field validation helpers.

use crate::error::ApiError;
use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// JSON body extractor whose rejection speaks the error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(_) => Err(ApiError::invalid_json()),
        }
    }
}

/// Parse a required UUID field, naming it in the failure.
pub fn parse_uuid(field: &str, raw: &str, request_id: &str) -> Result<Uuid, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(
            ApiError::invalid_request(format!("{field} is required")).with_request_id(request_id)
        );
    }
    Uuid::parse_str(trimmed).map_err(|_| {
        ApiError::invalid_request(format!("{field} must be a UUID")).with_request_id(request_id)
    })
}

/// Parse an optional UUID field; blank means absent.
pub fn parse_optional_uuid(
    field: &str,
    raw: Option<&str>,
    request_id: &str,
) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(trimmed) => Uuid::parse_str(trimmed).map(Some).map_err(|_| {
            ApiError::invalid_request(format!("{field} must be a UUID when provided"))
                .with_request_id(request_id)
        }),
    }
}

/// Phone numbers are 8-16 digits with an optional leading `+`.
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (8..=16).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_fields_trim_and_validate() {
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid("tenant_id", &format!("  {id} "), "").unwrap(), id);
        assert!(parse_uuid("tenant_id", "", "").is_err());
        assert!(parse_uuid("tenant_id", "nope", "").is_err());
    }

    #[test]
    fn optional_uuid_treats_blank_as_absent() {
        assert_eq!(parse_optional_uuid("area_id", None, "").unwrap(), None);
        assert_eq!(parse_optional_uuid("area_id", Some("  "), "").unwrap(), None);
        let id = Uuid::new_v4();
        assert_eq!(
            parse_optional_uuid("area_id", Some(&id.to_string()), "").unwrap(),
            Some(id)
        );
        assert!(parse_optional_uuid("area_id", Some("bad"), "").is_err());
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("08123456789"));
        assert!(is_valid_phone("+628123456789"));
        assert!(!is_valid_phone("1234567"));        // too short
        assert!(!is_valid_phone("12345678901234567")); // too long
        assert!(!is_valid_phone("0812-345-678"));
        assert!(!is_valid_phone(""));
    }
}

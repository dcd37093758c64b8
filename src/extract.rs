use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// `Json` body extractor whose rejection is an `AppError`, so malformed or
/// mistyped payloads get the same 400 envelope as every other validation error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// Splits serde's `path: message` detail into the offending field when the
/// path names one.
fn field_detail(text: &str) -> (&str, &str) {
    let detail = text
        .split_once("target type: ")
        .map(|(_, d)| d)
        .unwrap_or(text);
    match detail.split_once(": ") {
        Some((path, msg)) if !path.is_empty() && !path.contains(' ') => (path, msg),
        _ => ("body", detail),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        let (field, message) = field_detail(&text);
        AppError::field(field, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_the_mistyped_field() {
        let text = "Failed to deserialize the JSON body into the target type: \
                    time_minutes: invalid type: string \"abc\", expected i32 at line 1 column 20";
        let (field, message) = field_detail(text);
        assert_eq!(field, "time_minutes");
        assert!(message.starts_with("invalid type"));
    }

    #[test]
    fn falls_back_to_body() {
        let (field, _) = field_detail("Failed to parse the request body as JSON: EOF");
        assert_eq!(field, "body");
        let (field, _) = field_detail(
            "Failed to deserialize the JSON body into the target type: invalid type: null",
        );
        assert_eq!(field, "body");
    }
}

use crate::error::{RecError, Result};
use crate::models::{Method, UserId};

/// Validated arguments of a recommendation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationArgs {
    pub user_id: UserId,
    pub method: Method,
    pub top_n: usize,
}

pub fn validate_user_id(raw: Option<&str>) -> Result<UserId> {
    let raw = raw.ok_or_else(|| RecError::InvalidInput("user_id is required".into()))?;
    let user_id: UserId = raw
        .trim()
        .parse()
        .map_err(|_| RecError::InvalidInput(format!("user_id must be an integer, got {:?}", raw)))?;

    if user_id <= 0 {
        return Err(RecError::InvalidInput("user_id must be positive".into()));
    }

    Ok(user_id)
}

/// A top_n that does not parse is an error; a non-positive one falls back to
/// the default.
pub fn validate_top_n(raw: Option<&str>, default: usize) -> Result<usize> {
    match raw {
        None => Ok(default),
        Some(raw) => {
            let top_n: i64 = raw
                .trim()
                .parse()
                .map_err(|_| RecError::InvalidInput(format!("top_n must be an integer, got {:?}", raw)))?;
            Ok(if top_n <= 0 { default } else { top_n as usize })
        }
    }
}

/// Lenient variant for the popularity entry point: anything unusable maps to
/// the default.
pub fn top_n_or_default(raw: Option<&str>, default: usize) -> usize {
    validate_top_n(raw, default).unwrap_or(default)
}

pub fn validate_recommendation_args(
    user_id: Option<&str>,
    method: Option<&str>,
    top_n: Option<&str>,
    default_top_n: usize,
) -> Result<RecommendationArgs> {
    Ok(RecommendationArgs {
        user_id: validate_user_id(user_id)?,
        method: Method::parse_or_default(method),
        top_n: validate_top_n(top_n, default_top_n)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_or_non_positive_user() {
        assert!(validate_user_id(None).is_err());
        assert!(validate_user_id(Some("abc")).is_err());
        assert!(validate_user_id(Some("0")).is_err());
        assert_eq!(validate_user_id(Some(" 42 ")).unwrap(), 42);
    }

    #[test]
    fn top_n_rules() {
        assert_eq!(validate_top_n(None, 20).unwrap(), 20);
        assert_eq!(validate_top_n(Some("-3"), 20).unwrap(), 20);
        assert_eq!(validate_top_n(Some("7"), 20).unwrap(), 7);
        assert!(validate_top_n(Some("seven"), 20).is_err());
        assert_eq!(top_n_or_default(Some("seven"), 20), 20);
    }

    #[test]
    fn bogus_method_is_not_an_error() {
        let args = validate_recommendation_args(Some("5"), Some("bogus"), None, 20).unwrap();
        assert_eq!(args.method, Method::Hybrid);
        assert_eq!(args.top_n, 20);

        let err = validate_recommendation_args(Some("x"), None, None, 20).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}

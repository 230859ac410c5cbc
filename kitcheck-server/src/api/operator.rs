//! Operator identity
//!
//! The identity provider sits in front of this service and forwards the
//! authenticated operator in the `X-Operator` / `X-Operator-Role` headers.
//! Requests without them are served as `Anonymous` with the `user` role.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use kitcheck_common::submission::{OPERATOR_HEADER, OPERATOR_ROLE_HEADER};
use std::convert::Infallible;

use super::ApiError;

pub const ANONYMOUS_OPERATOR: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    User,
    Editor,
    Admin,
}

impl Role {
    /// Unknown roles get the least privilege
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
    pub role: Role,
}

impl Operator {
    /// Dashboard and export are for editors and admins
    pub fn require_editor(&self) -> Result<(), ApiError> {
        if self.role >= Role::Editor {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Operator '{}' may not view reports",
                self.name
            )))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Operator {
            name: header(parts, OPERATOR_HEADER)
                .unwrap_or(ANONYMOUS_OPERATOR)
                .to_string(),
            role: header(parts, OPERATOR_ROLE_HEADER)
                .map(Role::parse)
                .unwrap_or(Role::User),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Operator {
        let (mut parts, _) = req.into_parts();
        Operator::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_headers_fall_back_to_anonymous_user() {
        let op = extract(Request::builder().body(()).unwrap()).await;
        assert_eq!(op.name, "Anonymous");
        assert_eq!(op.role, Role::User);
        assert!(op.require_editor().is_err());
    }

    #[tokio::test]
    async fn test_headers_are_read() {
        let op = extract(
            Request::builder()
                .header("X-Operator", " Marie ")
                .header("X-Operator-Role", "Editor")
                .body(())
                .unwrap(),
        )
        .await;
        assert_eq!(op.name, "Marie");
        assert_eq!(op.role, Role::Editor);
        assert!(op.require_editor().is_ok());
    }

    #[test]
    fn test_unknown_role_is_user() {
        assert_eq!(Role::parse("superuser"), Role::User);
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
    }
}

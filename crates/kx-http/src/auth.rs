//! Bearer-token authentication (spec.md §6): `alg=EdDSA` JWTs verified
//! against `Auth:PublicKey`, subject = author identity hex. A dev-mode
//! `X-Author-Id` header fallback is gated by `AuthConfig::allow_dev_identity`
//! — grounded on the Bearer-extraction-then-request-extension idiom in the
//! teacher's `middleware::auth`, though the teacher's own token check is a
//! stub and isn't reused here.
//!
//! `Author` carries no stored clearance: the `scope` claim *is* the
//! caller's classification label for this request, asserted by whatever
//! issued the token rather than persisted per-author. `require_clearance`
//! checks it against the notebook's label on every read; it is never
//! written back to storage.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use kx_core::error::KxError;
use kx_core::ids::AuthorId;
use kx_core::model::{ClassificationLevel, Label};
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    iss: String,
    #[allow(dead_code)]
    exp: i64,
    #[allow(dead_code)]
    nbf: i64,
    #[allow(dead_code)]
    iat: i64,
    scope: String,
}

/// The authenticated caller for one request: identity plus the clearance
/// label their bearer token (or dev header) asserts.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub author: AuthorId,
    pub label: Label,
}

impl<S> FromRequestParts<S> for AuthContext
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);

        let ctx = if let Some(bearer) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            authenticate_bearer(bearer, &app)?
        } else if app.config.auth.allow_dev_identity {
            let Some(dev_author) = parts.headers.get("X-Author-Id").and_then(|v| v.to_str().ok()) else {
                return Err(ApiError(KxError::Forbidden("missing bearer token".into())));
            };
            let author = AuthorId::from_hex(dev_author)
                .map_err(|e| ApiError(KxError::Invalid(format!("invalid X-Author-Id: {e}"))))?;
            let label = match parts.headers.get("X-Clearance").and_then(|v| v.to_str().ok()) {
                Some(scope) => parse_scope(scope)?,
                None => Label::new(ClassificationLevel::Public, BTreeSet::<String>::new()),
            };
            AuthContext { author, label }
        } else {
            return Err(ApiError(KxError::Forbidden("missing bearer token".into())));
        };

        // The token asserts an identity and a clearance, not a signing
        // public key — there's nothing to verify it against yet, so the
        // author row is provisioned just-in-time on first sight, untrusted
        // until an administrator grants trust.
        ensure_author(&app, ctx.author).await?;
        Ok(ctx)
    }
}

async fn ensure_author(app: &AppState, id: AuthorId) -> Result<(), ApiError> {
    app.engine
        .writer()
        .with_conn(move |conn| {
            kx_storage::queries::authors::insert(
                conn,
                &kx_core::model::Author { id, public_key: vec![], trusted: false },
            )
        })
        .await
        .map_err(ApiError)
}

fn authenticate_bearer(token: &str, app: &AppState) -> Result<AuthContext, ApiError> {
    use base64::Engine as _;
    let der = base64::engine::general_purpose::STANDARD
        .decode(&app.config.auth.public_key_base64)
        .map_err(|e| ApiError(KxError::Fatal(format!("Auth:PublicKey is not valid base64: {e}"))))?;
    let key = DecodingKey::from_ed_der(&der);

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_required_spec_claims(&["sub", "iss", "exp", "nbf", "iat"]);
    validation.validate_nbf = true;

    let data = decode::<Claims>(token, &key, &validation)
        .map_err(|e| ApiError(KxError::Forbidden(format!("invalid bearer token: {e}"))))?;

    let author = AuthorId::from_hex(&data.claims.sub)
        .map_err(|e| ApiError(KxError::Forbidden(format!("invalid subject claim: {e}"))))?;
    let label = parse_scope(&data.claims.scope)?;
    Ok(AuthContext { author, label })
}

/// `scope` encodes the caller's classification label as
/// `<level>[:<compartment>,<compartment>,...]`, e.g. `secret:alpha,bravo`
/// or plain `internal` for no compartments.
fn parse_scope(scope: &str) -> Result<Label, ApiError> {
    let (level_str, compartments_str) = scope.split_once(':').unwrap_or((scope, ""));
    let level = match level_str {
        "public" => ClassificationLevel::Public,
        "internal" => ClassificationLevel::Internal,
        "confidential" => ClassificationLevel::Confidential,
        "secret" => ClassificationLevel::Secret,
        "top_secret" => ClassificationLevel::TopSecret,
        other => return Err(ApiError(KxError::Invalid(format!("unknown classification level in scope: {other}")))),
    };
    let compartments: BTreeSet<String> = compartments_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Label::new(level, compartments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_only_scope() {
        let label = parse_scope("internal").unwrap();
        assert_eq!(label.level, ClassificationLevel::Internal);
        assert!(label.compartments.is_empty());
    }

    #[test]
    fn parses_level_and_compartments() {
        let label = parse_scope("secret:alpha,bravo").unwrap();
        assert_eq!(label.level, ClassificationLevel::Secret);
        assert_eq!(label.compartments.len(), 2);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(parse_scope("ultra:alpha").is_err());
    }
}

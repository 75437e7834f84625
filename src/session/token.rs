//! Unverified decoding of access token payloads.
//!
//! Signature checks are the backend's job. The decoded claims only drive
//! cosmetic gating in the client.

use super::user::{de_opt_id, de_opt_role, Role, User};
use crate::error::TokenError;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default, deserialize_with = "de_opt_role")]
    pub id_rol: Option<Role>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl From<Claims> for User {
    fn from(claims: Claims) -> Self {
        User {
            id: claims.id,
            email: claims.email,
            display_name: claims.nombre,
            role: claims.id_rol.unwrap_or_default(),
        }
    }
}

/// Decode the payload (second) segment of a `header.payload.signature` token
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|p| !p.is_empty())
        .ok_or(TokenError::MissingPayload)?;
    let payload = payload.trim_end_matches('=');

    let bytes = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(_) => STANDARD_NO_PAD.decode(payload)?,
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode a token straight into a `User`
pub fn decode_user(token: &str) -> Result<User, TokenError> {
    decode_claims(token).map(User::from)
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_admin_token() {
        let token = encode_test_token(&json!({"id": 3, "email": "a@duoc.cl", "id_rol": 1}));
        let user = decode_user(&token).unwrap();
        assert_eq!(user.id.as_deref(), Some("3"));
        assert_eq!(user.email.as_deref(), Some("a@duoc.cl"));
        assert!(user.is_admin());
    }

    #[test]
    fn test_decode_member_token() {
        let token = encode_test_token(&json!({"id": "9", "email": "b@duoc.cl", "id_rol": 2}));
        let user = decode_user(&token).unwrap();
        assert_eq!(user.id.as_deref(), Some("9"));
        assert!(!user.is_admin());
    }

    #[test]
    fn test_string_or_object_role_decodes_as_member() {
        for role in [json!("1"), json!({ "nombre": "admin" })] {
            let token = encode_test_token(&json!({"id": 4, "id_rol": role}));
            let user = decode_user(&token).unwrap();
            assert_eq!(user.role, Role::Member);
            assert_eq!(user.id.as_deref(), Some("4"));
        }
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let body = base64::engine::general_purpose::STANDARD.encode(br#"{"id_rol": 1}"#);
        let token = format!("{}.{}.sig", header, body);
        assert_eq!(decode_claims(&token).unwrap().id_rol, Some(Role::Admin));
    }

    #[test]
    fn test_opaque_token_is_rejected() {
        assert!(matches!(
            decode_claims("A1"),
            Err(TokenError::MissingPayload)
        ));
        assert!(matches!(
            decode_claims("a.!!!.c"),
            Err(TokenError::Encoding(_))
        ));
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode(b"hello"));
        assert!(matches!(decode_claims(&not_json), Err(TokenError::Json(_))));
    }
}

use serde::{Deserialize, Serialize};

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Access")]
    Access,
    #[serde(alias = "Refresh")]
    Refresh,
}

/// Payload of the access token as issued by the FitWork backend.
///
/// Only `exp` is mandatory. Role flags that are absent read as `false`,
/// anything else the backend puts in the token is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub exp: i64, // expires at (unix timestamp)
    #[serde(default, rename = "token_type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TokenKind>,
    #[serde(default)]
    pub is_candidate: bool,
    #[serde(default)]
    pub is_company_admin: bool,
    #[serde(default)]
    pub is_fitwork_admin: bool,
}

impl Claims {
    /// An access token counts as expired once `exp` is strictly in the past.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_role_flags_default_to_false() {
        let claims: Claims = serde_json::from_str(r#"{"exp": 1700000000}"#).unwrap();
        assert_eq!(claims.exp, 1_700_000_000);
        assert!(!claims.is_candidate);
        assert!(!claims.is_company_admin);
        assert!(!claims.is_fitwork_admin);
        assert_eq!(claims.kind, None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let claims: Claims = serde_json::from_str(
            r#"{"exp": 10, "token_type": "access", "jti": "abc", "user_id": 7, "is_candidate": true}"#,
        )
        .unwrap();
        assert_eq!(claims.kind, Some(TokenKind::Access));
        assert!(claims.is_candidate);
    }

    #[test]
    fn missing_exp_is_rejected() {
        assert!(serde_json::from_str::<Claims>(r#"{"is_candidate": true}"#).is_err());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let claims = Claims {
            exp: 100,
            ..Claims::default()
        };
        assert!(!claims.is_expired_at(100));
        assert!(claims.is_expired_at(101));
    }
}

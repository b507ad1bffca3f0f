use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Claims carried by a signed-in user's access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id.
    pub sub: String,
    /// Token id, the unit of revocation.
    pub jti: Uuid,
    #[serde(default)]
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

impl UserClaims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }
}

#[derive(Clone)]
pub struct JwtAccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAccessTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Issue a token for `user_id`. Returns the encoded token together with
    /// the claims it carries.
    pub fn issue_user_token(
        &self,
        user_id: &str,
        admin: bool,
    ) -> anyhow::Result<(String, UserClaims)> {
        self.issue_user_token_at(user_id, admin, current_unix_timestamp()?)
    }

    fn issue_user_token_at(
        &self,
        user_id: &str,
        admin: bool,
        issued_at: i64,
    ) -> anyhow::Result<(String, UserClaims)> {
        if user_id.trim().is_empty() {
            bail!("user id must not be empty");
        }

        let claims = UserClaims {
            sub: user_id.to_owned(),
            jti: Uuid::new_v4(),
            admin,
            iat: issued_at,
            exp: issued_at + ACCESS_TOKEN_TTL_SECONDS,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode access token")?;
        Ok((token, claims))
    }

    pub fn validate_user_token(&self, token: &str) -> anyhow::Result<UserClaims> {
        let claims = decode::<UserClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode access token")?
            .claims;

        if claims.sub.trim().is_empty() {
            bail!("access token subject is empty");
        }

        Ok(claims)
    }
}

pub(crate) fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}

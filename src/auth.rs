use crate::error::{FResult, FallDetectionError};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Bearer token persisted by the login flow
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the stored token. A missing or empty file means "logged out".
    pub fn load(&self) -> FResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let token = text.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FallDetectionError::StorageError(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// True when the JWT's `exp` claim lies after `now_secs`.
///
/// The signature is not checked; the backend does that. Tokens that cannot
/// be decoded count as expired.
pub fn token_is_current(token: &str, now_secs: i64) -> bool {
    let header = match decode_header(token) {
        Ok(header) => header,
        Err(_) => return false,
    };

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    match decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data.claims.exp > now_secs,
        Err(_) => false,
    }
}

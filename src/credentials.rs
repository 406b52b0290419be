use std::{collections::HashMap, path::Path};

use serde::Deserialize;
use tracing::info;

use crate::apis::telematics::AuthError;

/// One account entry in the credential file. Other keys in the entry are
/// ignored.
#[derive(Debug, Deserialize)]
struct AccountEntry {
    access_token: Option<String>,
}

/// Reads the access token for `account` from a JSON credential file shaped
/// like `{ "<account>": { "access_token": "..." } }`.
pub fn load_access_token(path: &Path, account: &str) -> Result<String, AuthError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuthError::MissingCredentialFile(path.display().to_string()));
        }
        Err(e) => return Err(AuthError::Other(e.into())),
    };
    let accounts: HashMap<String, AccountEntry> = serde_json::from_str(&content).map_err(|source| {
        AuthError::MalformedCredentialFile { path: path.display().to_string(), source }
    })?;
    let token = accounts
        .get(account)
        .and_then(|entry| entry.access_token.clone())
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AuthError::MissingAccessToken(account.to_owned()))?;
    info!("loaded access token for account \"{}\" from {}", account, path.display());
    Ok(token)
}

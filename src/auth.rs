//! Identity for the mirror catalog: a Google service-account key is
//! exchanged for an OpenID id-token, which rides the `Authorization`
//! header as a bearer token; the mirror's own CKAN api-key travels in a
//! non-standard side header.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::ckan::CkanClient;
use crate::error::{EtlError, Result};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    target_audience: &'a str,
    iat: i64,
    exp: i64,
}

/// Sign a service-account JWT for `audience` and exchange it for an
/// id-token at the key's token endpoint.
pub async fn fetch_id_token(creds_path: &Path, audience: &str) -> Result<String> {
    let key: ServiceAccountKey = serde_json::from_str(&std::fs::read_to_string(creds_path)?)?;
    let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

    let now = Utc::now().timestamp();
    let claims = IdTokenClaims {
        iss: &key.client_email,
        sub: &key.client_email,
        aud: token_uri,
        target_audience: audience,
        iat: now,
        exp: now + 3600,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| EtlError::Auth(format!("bad service-account private key: {e}")))?;
    let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| EtlError::Auth(format!("cannot sign assertion: {e}")))?;

    let response: Value = reqwest::Client::new()
        .post(token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    response
        .get("id_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EtlError::Auth("token endpoint returned no id_token".to_string()))
}

/// A catalog client authenticated against the mirror instance.
pub async fn mirror_client(
    base_url: &str,
    creds_path: &Path,
    client_id: &str,
    ckan_api_key: &str,
) -> Result<CkanClient> {
    info!("getting mirror session");
    let token = fetch_id_token(creds_path, client_id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("datagov-internal-client"));
    headers.insert(
        "X-Non-Standard-CKAN-API-Key",
        HeaderValue::from_str(ckan_api_key)
            .map_err(|e| EtlError::Auth(format!("api key is not a valid header value: {e}")))?,
    );
    let http = reqwest::Client::builder().default_headers(headers).build()?;

    Ok(CkanClient::with_http(
        base_url,
        &format!("Bearer {token}"),
        http,
    ))
}

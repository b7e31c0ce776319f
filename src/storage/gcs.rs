use reqwest::blocking::Client;

use crate::error::StorageError;
use crate::storage::ObjectStore;

const TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b";

/// Uploads objects to a GCS bucket via the JSON media-upload endpoint, using
/// a bearer token from the `GCS_ACCESS_TOKEN` environment variable.
#[derive(Debug)]
pub struct GcsObjectStore {
    bucket: String,
    token: String,
    client: Client,
}

impl GcsObjectStore {
    pub fn from_env(bucket: String) -> Result<Self, StorageError> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| StorageError::Credentials(format!("{} is not set", TOKEN_ENV)))?;
        Ok(GcsObjectStore {
            bucket,
            token,
            client: Client::new(),
        })
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/{}/o?uploadType=media&name={}",
            UPLOAD_BASE,
            self.bucket,
            percent_encode(key)
        )
    }
}

impl ObjectStore for GcsObjectStore {
    fn put_bytes(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StorageError::Upload {
                key: key.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

/// Percent-encode an object name for use as a query parameter. Everything
/// outside the unreserved set is escaped, including `/`.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

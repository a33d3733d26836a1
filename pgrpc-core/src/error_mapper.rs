//! Component F: turns a procedure-raised error into the client-visible
//! taxonomy, and signs the payload for v1 calls.

use std::future::Future;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const FALLBACK_TAG: &str = "ERROR_UNKNOWN";
const FALLBACK_CODE: i64 = 620;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:ERROR:  )?(ERROR_[A-Z0-9_]+)").unwrap());

/// Extracts the `ERROR_<UPPER_SNAKE>` tag at the start of a procedure error
/// message, tolerating the literal `ERROR:  ` prefix some drivers prepend.
pub fn extract_error_tag(message: &str) -> Option<&str> {
    TAG_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// The external `get_api_error_code(tag)` catalog function.
pub trait ErrorCodeLookup {
    /// Returns `(error_name, numeric_code)`. A lookup failure (missing tag,
    /// connection issue) should be surfaced as `None`, not an `Err` -- the
    /// mapper falls back to `ERROR_UNKNOWN`/620 either way.
    fn get_api_error_code(
        &self,
        tag: &str,
    ) -> impl Future<Output = Option<(String, i64)>> + Send;
}

/// The external `OpenSSL_Sign(_method, _jsondata, _uuid)` catalog function.
pub trait Signer {
    fn sign(
        &self,
        method: &str,
        json_data: &str,
        uuid: &str,
    ) -> impl Future<Output = Option<String>> + Send;
}

/// The `{name: "JSONRPCError", message, code}` object the client sees.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MappedError {
    pub name: &'static str,
    pub message: String,
    pub code: i64,
}

/// The v1-only signed wrapper: `{..., error: {signature, uuid, method, data}}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignedErrorEnvelope {
    pub signature: Option<String>,
    pub uuid: String,
    pub method: String,
    pub data: MappedError,
}

/// Maps a raw procedure error message to the client-visible taxonomy.
pub async fn map_procedure_error<L: ErrorCodeLookup>(lookup: &L, raw_message: &str) -> MappedError {
    let tag = extract_error_tag(raw_message);

    let (name, code) = match tag {
        Some(tag) => lookup
            .get_api_error_code(tag)
            .await
            .unwrap_or_else(|| (FALLBACK_TAG.to_string(), FALLBACK_CODE)),
        None => (FALLBACK_TAG.to_string(), FALLBACK_CODE),
    };

    MappedError {
        name: "JSONRPCError",
        message: name,
        code,
    }
}

/// Signs a mapped error for a v1 call. If signing fails, the inner signed
/// envelope's signature is left absent rather than failing the whole
/// response (§4.F: "If signing fails, leave the inner signed envelope
/// absent.").
pub async fn sign_v1_error<S: Signer>(
    signer: &S,
    method: &str,
    uuid: &str,
    mapped: MappedError,
) -> SignedErrorEnvelope {
    let json_data = serde_json::to_string(&mapped).unwrap_or_default();
    let signature = signer.sign(method, &json_data, uuid).await;

    SignedErrorEnvelope {
        signature,
        uuid: uuid.to_string(),
        method: method.to_string(),
        data: mapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureLookup;
    impl ErrorCodeLookup for FixtureLookup {
        async fn get_api_error_code(&self, tag: &str) -> Option<(String, i64)> {
            match tag {
                "ERROR_INSUFFICIENT_FUNDS" => Some(("ERROR_INSUFFICIENT_FUNDS".to_string(), 101)),
                _ => None,
            }
        }
    }

    struct FailingSigner;
    impl Signer for FailingSigner {
        async fn sign(&self, _method: &str, _json_data: &str, _uuid: &str) -> Option<String> {
            None
        }
    }

    struct WorkingSigner;
    impl Signer for WorkingSigner {
        async fn sign(&self, _method: &str, _json_data: &str, _uuid: &str) -> Option<String> {
            Some("deadbeef".to_string())
        }
    }

    #[test]
    fn extracts_tag_with_or_without_prefix() {
        assert_eq!(
            extract_error_tag("ERROR_INSUFFICIENT_FUNDS: balance too low"),
            Some("ERROR_INSUFFICIENT_FUNDS")
        );
        assert_eq!(
            extract_error_tag("ERROR:  ERROR_INSUFFICIENT_FUNDS"),
            Some("ERROR_INSUFFICIENT_FUNDS")
        );
        assert_eq!(extract_error_tag("no tag here"), None);
    }

    #[tokio::test]
    async fn known_tag_maps_to_looked_up_code() {
        let mapped = map_procedure_error(&FixtureLookup, "ERROR_INSUFFICIENT_FUNDS: nope").await;
        assert_eq!(mapped.code, 101);
        assert_eq!(mapped.message, "ERROR_INSUFFICIENT_FUNDS");
    }

    #[tokio::test]
    async fn missing_tag_falls_back_to_unknown() {
        let mapped = map_procedure_error(&FixtureLookup, "some random failure").await;
        assert_eq!(mapped.code, 620);
        assert_eq!(mapped.message, "ERROR_UNKNOWN");
    }

    #[tokio::test]
    async fn failed_signing_leaves_signature_absent() {
        let mapped = map_procedure_error(&FixtureLookup, "whatever").await;
        let signed = sign_v1_error(&FailingSigner, "Deposit", "u-1", mapped).await;
        assert!(signed.signature.is_none());
    }

    #[tokio::test]
    async fn successful_signing_populates_signature() {
        let mapped = map_procedure_error(&FixtureLookup, "whatever").await;
        let signed = sign_v1_error(&WorkingSigner, "Deposit", "u-1", mapped).await;
        assert_eq!(signed.signature.as_deref(), Some("deadbeef"));
    }
}

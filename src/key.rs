// src/key.rs

use crate::config::KeySource;
use crate::encoding::decode_base64url;
use crate::error::NilaOidcError;
use crate::model::{JsonWebKeySet, PrivateJwk, PublicJwk};
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::EncodingKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey};
use sha2::{Digest, Sha256};
use tracing::debug;

/// The client's RSA signing key in the form `jsonwebtoken` signs with,
/// together with its public JWK.
#[derive(Clone)]
pub struct SigningKey {
    encoding_key: EncodingKey,
    public_jwk: PublicJwk,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.public_jwk.kid)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Loads the key described by a `KeySource`.
    pub fn from_source(source: &KeySource) -> Result<Self, NilaOidcError> {
        match source {
            KeySource::JwkFile(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    NilaOidcError::KeyFormat(format!("Failed to read JWK file {:?}: {}", path, e))
                })?;
                Self::from_jwk_json(&raw)
            }
            KeySource::JwkEnv(var) => {
                let raw = std::env::var(var).map_err(|_| {
                    NilaOidcError::KeyFormat(format!("Environment variable '{}' is not set", var))
                })?;
                Self::from_jwk_json(&raw)
            }
            KeySource::PemFile(path) => {
                let pem = std::fs::read_to_string(path).map_err(|e| {
                    NilaOidcError::KeyFormat(format!("Failed to read PEM file {:?}: {}", path, e))
                })?;
                Self::from_pem(&pem)
            }
        }
    }

    /// Parses a private JWK from its JSON text.
    pub fn from_jwk_json(raw: &str) -> Result<Self, NilaOidcError> {
        let jwk: PrivateJwk = serde_json::from_str(raw)
            .map_err(|e| NilaOidcError::KeyFormat(format!("Malformed JWK JSON: {}", e)))?;
        Self::from_jwk(&jwk)
    }

    /// Builds the signing key from RSA private JWK members.
    ///
    /// `p` and `q` are required. `dp`, `dq` and `qi` are optional, but when
    /// present they must agree with `d`, `p` and `q`.
    pub fn from_jwk(jwk: &PrivateJwk) -> Result<Self, NilaOidcError> {
        if jwk.kty != "RSA" {
            return Err(NilaOidcError::KeyFormat(format!(
                "Unsupported key type '{}', expected 'RSA'",
                jwk.kty
            )));
        }

        let n = decode_component("n", &jwk.n)?;
        let e = decode_component("e", &jwk.e)?;
        let d = decode_component("d", &jwk.d)?;
        let p = decode_component("p", required("p", &jwk.p)?)?;
        let q = decode_component("q", required("q", &jwk.q)?)?;

        check_crt_parameters(jwk, &d, &p, &q)?;

        let private_key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| NilaOidcError::KeyFormat(format!("Inconsistent RSA components: {}", e)))?;
        private_key
            .validate()
            .map_err(|e| NilaOidcError::KeyFormat(format!("RSA key failed validation: {}", e)))?;

        Self::from_private_key(&private_key, jwk.kid.clone())
    }

    /// Parses a PEM-encoded RSA private key, PKCS#8 or PKCS#1.
    pub fn from_pem(pem: &str) -> Result<Self, NilaOidcError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| {
                NilaOidcError::KeyFormat(format!("Failed to parse RSA private key PEM: {}", e))
            })?;
        Self::from_private_key(&private_key, None)
    }

    fn from_private_key(
        private_key: &RsaPrivateKey,
        kid: Option<String>,
    ) -> Result<Self, NilaOidcError> {
        // jsonwebtoken reliably accepts PKCS#1 DER, so hand it that.
        let pkcs1_der = private_key.to_pkcs1_der().map_err(|e| {
            NilaOidcError::KeyFormat(format!("Failed to convert RSA key to PKCS#1 DER: {}", e))
        })?;
        let encoding_key = EncodingKey::from_rsa_der(pkcs1_der.as_bytes());

        let public_key = private_key.to_public_key();
        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

        let kid = match kid {
            Some(kid) => kid,
            None => {
                let kid = jwk_thumbprint(&n, &e);
                debug!(kid = %kid, "No kid configured; using JWK thumbprint.");
                kid
            }
        };

        Ok(Self {
            encoding_key,
            public_jwk: PublicJwk {
                kty: "RSA".to_string(),
                use_purpose: "sig".to_string(),
                alg: "RS256".to_string(),
                kid,
                n,
                e,
            },
        })
    }

    /// The key ID placed in the `kid` header of client assertions.
    pub fn kid(&self) -> &str {
        &self.public_jwk.kid
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// The public key as a JWKS document, for registration with the provider.
    pub fn public_jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.public_jwk.clone()],
        }
    }
}

/// RFC 7638 thumbprint: SHA-256 over the canonical `{e, kty, n}` JSON.
pub fn jwk_thumbprint(n: &str, e: &str) -> String {
    // Members in lexicographic order, no whitespace. base64url needs no escaping.
    let canonical = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

fn required<'a>(name: &str, member: &'a Option<String>) -> Result<&'a str, NilaOidcError> {
    member
        .as_deref()
        .ok_or_else(|| NilaOidcError::KeyFormat(format!("RSA key missing '{}' component", name)))
}

fn decode_component(name: &str, value: &str) -> Result<BigUint, NilaOidcError> {
    let bytes = decode_base64url(value).map_err(|_| {
        NilaOidcError::KeyFormat(format!("RSA key component '{}' is not valid base64url", name))
    })?;
    if bytes.is_empty() {
        return Err(NilaOidcError::KeyFormat(format!("RSA key component '{}' is empty", name)));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

fn check_crt_parameters(
    jwk: &PrivateJwk,
    d: &BigUint,
    p: &BigUint,
    q: &BigUint,
) -> Result<(), NilaOidcError> {
    let one = BigUint::from(1u8);
    if *p <= one || *q <= one {
        return Err(NilaOidcError::KeyFormat(
            "RSA primes 'p' and 'q' must be greater than 1".to_string(),
        ));
    }

    if let Some(dp) = jwk.dp.as_deref() {
        let dp = decode_component("dp", dp)?;
        if dp != d % &(p - &one) {
            return Err(NilaOidcError::KeyFormat(
                "CRT exponent 'dp' does not match d mod (p-1)".to_string(),
            ));
        }
    }
    if let Some(dq) = jwk.dq.as_deref() {
        let dq = decode_component("dq", dq)?;
        if dq != d % &(q - &one) {
            return Err(NilaOidcError::KeyFormat(
                "CRT exponent 'dq' does not match d mod (q-1)".to_string(),
            ));
        }
    }
    if let Some(qi) = jwk.qi.as_deref() {
        let qi = decode_component("qi", qi)?;
        if (&qi * q) % p != one {
            return Err(NilaOidcError::KeyFormat(
                "CRT coefficient 'qi' is not the inverse of q mod p".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_rsa_key_type() {
        let err = SigningKey::from_jwk_json(r#"{"kty":"EC","n":"AQAB","e":"AQAB","d":"AQAB"}"#)
            .unwrap_err();
        assert!(matches!(err, NilaOidcError::KeyFormat(msg) if msg.contains("'EC'")));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = SigningKey::from_jwk_json("{\"kty\":").unwrap_err();
        assert!(matches!(err, NilaOidcError::KeyFormat(_)));
    }

    #[test]
    fn rejects_missing_primes() {
        let err = SigningKey::from_jwk_json(r#"{"kty":"RSA","n":"AQAB","e":"AQAB","d":"AQAB"}"#)
            .unwrap_err();
        assert!(matches!(err, NilaOidcError::KeyFormat(msg) if msg.contains("'p'")));
    }

    #[test]
    fn rejects_invalid_base64url_component() {
        let err = SigningKey::from_jwk_json(
            r#"{"kty":"RSA","n":"not*base64","e":"AQAB","d":"AQAB","p":"Aw","q":"BQ"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, NilaOidcError::KeyFormat(msg) if msg.contains("'n'")));
    }

    #[test]
    fn crt_check_uses_textbook_key() {
        // p = 61, q = 53, n = 3233, e = 17, d = 2753: dp = 53, dq = 49, qi = 38.
        let mut jwk = PrivateJwk {
            kty: "RSA".into(),
            kid: None,
            n: URL_SAFE_NO_PAD.encode(3233u32.to_be_bytes()),
            e: URL_SAFE_NO_PAD.encode([17u8]),
            d: URL_SAFE_NO_PAD.encode(2753u32.to_be_bytes()),
            p: Some(URL_SAFE_NO_PAD.encode([61u8])),
            q: Some(URL_SAFE_NO_PAD.encode([53u8])),
            dp: Some(URL_SAFE_NO_PAD.encode([53u8])),
            dq: Some(URL_SAFE_NO_PAD.encode([49u8])),
            qi: Some(URL_SAFE_NO_PAD.encode([38u8])),
        };
        let d = BigUint::from(2753u32);
        let p = BigUint::from(61u32);
        let q = BigUint::from(53u32);
        assert!(check_crt_parameters(&jwk, &d, &p, &q).is_ok());

        jwk.qi = Some(URL_SAFE_NO_PAD.encode([39u8]));
        let err = check_crt_parameters(&jwk, &d, &p, &q).unwrap_err();
        assert!(matches!(err, NilaOidcError::KeyFormat(msg) if msg.contains("'qi'")));
    }

    #[test]
    fn degenerate_primes_are_key_format_errors() {
        // "AA" decodes to 0 and "AQ" to 1.
        let cases = [
            r#"{"kty":"RSA","n":"DKE","e":"EQ","d":"CsE","p":"AA","q":"NQ","dp":"AQ"}"#,
            r#"{"kty":"RSA","n":"DKE","e":"EQ","d":"CsE","p":"AQ","q":"NQ","dp":"AQ"}"#,
            r#"{"kty":"RSA","n":"DKE","e":"EQ","d":"CsE","p":"AA","q":"NQ","qi":"AQ"}"#,
            r#"{"kty":"RSA","n":"DKE","e":"EQ","d":"CsE","p":"PQ","q":"AQ","dq":"AQ"}"#,
            r#"{"kty":"RSA","n":"DKE","e":"EQ","d":"CsE","p":"AA","q":"AA"}"#,
        ];
        for raw in cases {
            let err = SigningKey::from_jwk_json(raw).unwrap_err();
            assert!(
                matches!(&err, NilaOidcError::KeyFormat(msg) if msg.contains("greater than 1")),
                "unexpected error for {}: {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn thumbprint_is_stable_and_unpadded() {
        let first = jwk_thumbprint("sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri", "AQAB");
        let second = jwk_thumbprint("sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri", "AQAB");
        assert_eq!(first, second);
        // 32-byte digest, base64url without padding.
        assert_eq!(first.len(), 43);
        assert!(!first.contains('='));
        assert_ne!(first, jwk_thumbprint("sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri", "AQAC"));
    }
}

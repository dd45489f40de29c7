//! `WebAuthn` attestation processing
//!
//! This module verifies the attestation statement returned with a new
//! credential. Supported formats are `none`, `packed` (self and basic
//! attestation) and `fido-u2f`. Certificate chains are parsed so the leaf
//! key can check the signature; they are not validated against trust anchors.

use ciborium::value::Value;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::sign::Verifier;
use openssl::x509::X509;

use super::cbor::{text_entry, value_as_i64, AttestationObject, AuthenticatorData};
use super::cose::{CoseAlgorithm, CoseKey};
use super::errors::WebAuthnError;

/// How the new credential was vouched for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationType {
    /// No attestation conveyed
    None,
    /// Signed by the credential key itself
    SelfAttestation,
    /// Signed by an attestation certificate
    Basic,
}

/// Verify the attestation statement of `attestation`
///
/// `cose_key` is the credential public key already decoded from
/// `auth_data`; `client_data_hash` is SHA-256 of the raw `clientDataJSON`.
///
/// # Errors
/// Returns `UnsupportedAttestationFormat` for unknown formats and
/// `InvalidAttestation` when the statement is malformed or does not verify
pub fn verify_attestation_statement(
    attestation: &AttestationObject,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    cose_key: &CoseKey,
) -> Result<AttestationType, WebAuthnError> {
    match attestation.fmt.as_str() {
        "none" => verify_none(attestation),
        "packed" => verify_packed(attestation, client_data_hash, cose_key),
        "fido-u2f" => verify_fido_u2f(attestation, auth_data, client_data_hash, cose_key),
        other => Err(WebAuthnError::UnsupportedAttestationFormat(other.to_string())),
    }
}

fn verify_none(attestation: &AttestationObject) -> Result<AttestationType, WebAuthnError> {
    if attestation.att_stmt.is_empty() {
        Ok(AttestationType::None)
    } else {
        Err(invalid("none attestation must have an empty statement"))
    }
}

fn verify_packed(
    attestation: &AttestationObject,
    client_data_hash: &[u8; 32],
    cose_key: &CoseKey,
) -> Result<AttestationType, WebAuthnError> {
    let stmt = &attestation.att_stmt;
    let alg = text_entry(stmt, "alg")
        .and_then(value_as_i64)
        .ok_or_else(|| invalid("packed statement is missing alg"))?;
    let sig = statement_signature(stmt)?;
    let signed = signed_data(&attestation.auth_data, client_data_hash);

    match certificate_chain(stmt)? {
        Some(chain) => {
            let leaf = leaf_certificate(&chain)?;
            let alg = CoseAlgorithm::from_id(alg)
                .map_err(|_| invalid("packed statement uses an unsupported algorithm"))?;
            verify_with_certificate(&leaf, alg, &signed, sig)?;
            Ok(AttestationType::Basic)
        }
        None => {
            if alg != cose_key.algorithm().id() {
                return Err(invalid(
                    "self attestation algorithm does not match the credential key",
                ));
            }
            cose_key
                .verify_signature(&signed, sig)
                .map_err(|_| invalid("self attestation signature is invalid"))?;
            Ok(AttestationType::SelfAttestation)
        }
    }
}

fn verify_fido_u2f(
    attestation: &AttestationObject,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    cose_key: &CoseKey,
) -> Result<AttestationType, WebAuthnError> {
    let stmt = &attestation.att_stmt;
    let chain = certificate_chain(stmt)?
        .ok_or_else(|| invalid("fido-u2f statement is missing x5c"))?;
    if chain.len() != 1 {
        return Err(invalid("fido-u2f statement must carry exactly one certificate"));
    }
    let sig = statement_signature(stmt)?;

    let leaf = leaf_certificate(&chain)?;
    let leaf_key = public_key(&leaf)?;
    let curve = leaf_key
        .ec_key()
        .ok()
        .and_then(|key| key.group().curve_name());
    if curve != Some(Nid::X9_62_PRIME256V1) {
        return Err(invalid("fido-u2f certificate key must be P-256"));
    }

    let point = cose_key
        .ec2_uncompressed_point()
        .ok_or_else(|| invalid("fido-u2f credential key must be P-256"))?;
    let credential = auth_data
        .attested_credential
        .as_ref()
        .ok_or_else(|| invalid("fido-u2f attestation without credential data"))?;

    let mut signed = Vec::with_capacity(1 + 32 + 32 + credential.credential_id.len() + 65);
    signed.push(0x00);
    signed.extend_from_slice(&auth_data.rp_id_hash);
    signed.extend_from_slice(client_data_hash);
    signed.extend_from_slice(&credential.credential_id);
    signed.extend_from_slice(&point);

    verify_with_certificate(&leaf, CoseAlgorithm::ES256, &signed, sig)?;
    Ok(AttestationType::Basic)
}

fn signed_data(auth_data: &[u8], client_data_hash: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    data.extend_from_slice(auth_data);
    data.extend_from_slice(client_data_hash);
    data
}

fn statement_signature(stmt: &[(Value, Value)]) -> Result<&[u8], WebAuthnError> {
    text_entry(stmt, "sig")
        .and_then(Value::as_bytes)
        .map(Vec::as_slice)
        .ok_or_else(|| invalid("attestation statement is missing sig"))
}

/// DER certificates from `x5c`, if present
fn certificate_chain(stmt: &[(Value, Value)]) -> Result<Option<Vec<Vec<u8>>>, WebAuthnError> {
    let Some(x5c) = text_entry(stmt, "x5c") else {
        return Ok(None);
    };
    let certs = x5c
        .as_array()
        .ok_or_else(|| invalid("x5c is not an array"))?
        .iter()
        .map(|cert| {
            cert.as_bytes()
                .cloned()
                .ok_or_else(|| invalid("x5c entry is not a byte string"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(invalid("x5c is empty"));
    }
    Ok(Some(certs))
}

fn leaf_certificate(chain: &[Vec<u8>]) -> Result<X509, WebAuthnError> {
    let der = chain.first().ok_or_else(|| invalid("x5c is empty"))?;
    X509::from_der(der).map_err(|e| invalid(&format!("Invalid attestation certificate: {e}")))
}

fn public_key(cert: &X509) -> Result<PKey<Public>, WebAuthnError> {
    cert.public_key()
        .map_err(|e| invalid(&format!("Unreadable certificate key: {e}")))
}

fn verify_with_certificate(
    cert: &X509,
    alg: CoseAlgorithm,
    message: &[u8],
    sig: &[u8],
) -> Result<(), WebAuthnError> {
    let key = public_key(cert)?;

    let key_matches = match alg {
        CoseAlgorithm::ES256 => key.id() == Id::EC,
        CoseAlgorithm::EdDSA => key.id() == Id::ED25519,
        CoseAlgorithm::RS256 => key.id() == Id::RSA,
    };
    if !key_matches {
        return Err(invalid("certificate key does not match the statement algorithm"));
    }

    let verified = match alg {
        CoseAlgorithm::EdDSA => Verifier::new_without_digest(&key)
            .and_then(|mut verifier| verifier.verify_oneshot(sig, message)),
        CoseAlgorithm::ES256 | CoseAlgorithm::RS256 => {
            Verifier::new(MessageDigest::sha256(), &key).and_then(|mut verifier| {
                verifier.update(message)?;
                verifier.verify(sig)
            })
        }
    }
    .map_err(|e| invalid(&format!("Attestation signature check failed: {e}")))?;

    if verified {
        Ok(())
    } else {
        Err(invalid("attestation signature is invalid"))
    }
}

fn invalid(msg: &str) -> WebAuthnError {
    WebAuthnError::InvalidAttestation(msg.to_string())
}

//! Software authenticator
//!
//! Produces registration and assertion responses the way a browser and a
//! platform authenticator would, so ceremonies can be driven end to end
//! without hardware. The credential key is a ring P-256 key pair; attestation
//! certificates for the `packed` basic and `fido-u2f` formats are minted with
//! openssl.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::value::Value;
use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::{X509Builder, X509NameBuilder};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde_json::json;

use crate::utils::crypto::random_bytes;
use crate::webauthn::cbor::AuthenticatorFlags;
use crate::webauthn::crypto::sha256;
use crate::webauthn::{
    AuthenticatorAssertionResponse, AuthenticatorAttestationResponse, AuthenticatorTransport,
    Base64UrlBytes, CoseAlgorithm, CredentialAssertion, CredentialCreation, PublicKeyCredential,
    RegisterPublicKeyCredential, PUBLIC_KEY_TYPE,
};

/// AAGUID reported by the software authenticator
pub const SOFT_AAGUID: [u8; 16] = *b"passgate-softkey";

/// Attestation statement the authenticator returns on `create`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationMode {
    None,
    /// `packed`, signed with the credential key
    PackedSelf,
    /// `packed`, signed with a separate attestation certificate
    PackedBasic,
    FidoU2f,
}

pub struct SoftAuthenticator {
    rp_id: String,
    origin: String,
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
    credential_id: Vec<u8>,
    sign_count: u32,
    counter_step: u32,
    attestation: AttestationMode,
    user_verification: bool,
    backup_eligible: bool,
}

impl SoftAuthenticator {
    /// New authenticator scoped to `rp_id`, acting as a browser at `origin`
    ///
    /// # Panics
    /// If the system RNG cannot produce a key pair
    #[must_use]
    pub fn new(rp_id: &str, origin: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("generate P-256 key");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .expect("load P-256 key");

        Self {
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            key_pair,
            rng,
            credential_id: random_bytes(16),
            sign_count: 0,
            counter_step: 1,
            attestation: AttestationMode::None,
            user_verification: true,
            backup_eligible: false,
        }
    }

    #[must_use]
    pub fn with_attestation(mut self, mode: AttestationMode) -> Self {
        self.attestation = mode;
        self
    }

    #[must_use]
    pub fn with_user_verification(mut self, verified: bool) -> Self {
        self.user_verification = verified;
        self
    }

    /// Never advance the signature counter, like many platform authenticators
    #[must_use]
    pub fn with_counter_disabled(mut self) -> Self {
        self.counter_step = 0;
        self
    }

    #[must_use]
    pub fn with_backup_eligible(mut self, eligible: bool) -> Self {
        self.backup_eligible = eligible;
        self
    }

    /// Act as a browser at a different origin from now on
    pub fn set_origin(&mut self, origin: &str) {
        self.origin = origin.to_string();
    }

    #[must_use]
    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    #[must_use]
    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn set_sign_count(&mut self, count: u32) {
        self.sign_count = count;
    }

    /// Answer `navigator.credentials.create()`
    ///
    /// The exclude list is ignored so relying party checks can be exercised.
    ///
    /// # Panics
    /// If signing or certificate generation fails
    #[must_use]
    pub fn create(&mut self, options: &CredentialCreation) -> RegisterPublicKeyCredential {
        let client_data_json = self.client_data_json(
            "webauthn.create",
            &options.public_key.challenge,
            &self.origin,
        );
        self.create_with_client_data(client_data_json)
    }

    /// Like [`Self::create`], with caller-supplied `clientDataJSON`
    ///
    /// # Panics
    /// If signing or certificate generation fails
    #[must_use]
    pub fn create_with_client_data(
        &mut self,
        client_data_json: Vec<u8>,
    ) -> RegisterPublicKeyCredential {
        let auth_data = self.authenticator_data(true);
        let client_data_hash = sha256(&client_data_json);
        let (fmt, att_stmt) = self.attestation_statement(&auth_data, &client_data_hash);

        let attestation_object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), Value::Map(att_stmt)),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_bytes = Vec::new();
        ciborium::ser::into_writer(&attestation_object, &mut attestation_bytes)
            .expect("encode attestation object");

        RegisterPublicKeyCredential {
            id: self.credential_id_b64(),
            raw_id: Base64UrlBytes(self.credential_id.clone()),
            type_: PUBLIC_KEY_TYPE.to_string(),
            response: AuthenticatorAttestationResponse {
                client_data_json: Base64UrlBytes(client_data_json),
                attestation_object: Base64UrlBytes(attestation_bytes),
                transports: vec![AuthenticatorTransport::Internal, AuthenticatorTransport::Hybrid],
            },
            authenticator_attachment: Some("platform".to_string()),
            client_extension_results: Some(json!({})),
        }
    }

    /// Answer `navigator.credentials.get()`, advancing the counter first
    ///
    /// # Panics
    /// If signing fails
    #[must_use]
    pub fn get(
        &mut self,
        options: &CredentialAssertion,
        user_handle: Option<&[u8]>,
    ) -> PublicKeyCredential {
        let client_data_json =
            self.client_data_json("webauthn.get", &options.public_key.challenge, &self.origin);
        self.get_with_client_data(client_data_json, user_handle)
    }

    /// Like [`Self::get`], with caller-supplied `clientDataJSON`
    ///
    /// # Panics
    /// If signing fails
    #[must_use]
    pub fn get_with_client_data(
        &mut self,
        client_data_json: Vec<u8>,
        user_handle: Option<&[u8]>,
    ) -> PublicKeyCredential {
        self.sign_count = self.sign_count.wrapping_add(self.counter_step);
        let auth_data = self.authenticator_data(false);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));
        let signature = self.sign(&signed);

        PublicKeyCredential {
            id: self.credential_id_b64(),
            raw_id: Base64UrlBytes(self.credential_id.clone()),
            type_: PUBLIC_KEY_TYPE.to_string(),
            response: AuthenticatorAssertionResponse {
                client_data_json: Base64UrlBytes(client_data_json),
                authenticator_data: Base64UrlBytes(auth_data),
                signature: Base64UrlBytes(signature),
                user_handle: user_handle.map(|handle| Base64UrlBytes(handle.to_vec())),
            },
            client_extension_results: Some(json!({})),
        }
    }

    /// `clientDataJSON` as a browser would serialize it
    #[must_use]
    pub fn client_data_json(&self, type_: &str, challenge: &Base64UrlBytes, origin: &str) -> Vec<u8> {
        json!({
            "type": type_,
            "challenge": URL_SAFE_NO_PAD.encode(challenge),
            "origin": origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    /// COSE encoding of the credential public key
    ///
    /// # Panics
    /// If CBOR encoding fails
    #[must_use]
    pub fn cose_public_key(&self) -> Vec<u8> {
        let point = self.key_pair.public_key().as_ref();
        let (x, y) = point[1..].split_at(32);
        let key = Value::Map(vec![
            (Value::Integer(1i64.into()), Value::Integer(2i64.into())),
            (
                Value::Integer(3.into()),
                Value::Integer(CoseAlgorithm::ES256.id().into()),
            ),
            (Value::Integer((-1i64).into()), Value::Integer(1i64.into())),
            (Value::Integer((-2i64).into()), Value::Bytes(x.to_vec())),
            (Value::Integer((-3i64).into()), Value::Bytes(y.to_vec())),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&key, &mut bytes).expect("encode COSE key");
        bytes
    }

    fn authenticator_data(&self, attested: bool) -> Vec<u8> {
        let mut flags = AuthenticatorFlags::USER_PRESENT;
        if self.user_verification {
            flags |= AuthenticatorFlags::USER_VERIFIED;
        }
        if self.backup_eligible {
            flags |= AuthenticatorFlags::BACKUP_ELIGIBLE;
        }
        if attested {
            flags |= AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA;
        }

        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&sha256(self.rp_id.as_bytes()));
        data.push(flags);
        data.extend_from_slice(&self.sign_count.to_be_bytes());

        if attested {
            let aaguid = if self.attestation == AttestationMode::FidoU2f {
                [0; 16]
            } else {
                SOFT_AAGUID
            };
            data.extend_from_slice(&aaguid);
            let id_len = u16::try_from(self.credential_id.len()).expect("credential id length");
            data.extend_from_slice(&id_len.to_be_bytes());
            data.extend_from_slice(&self.credential_id);
            data.extend_from_slice(&self.cose_public_key());
        }
        data
    }

    fn attestation_statement(
        &self,
        auth_data: &[u8],
        client_data_hash: &[u8; 32],
    ) -> (&'static str, Vec<(Value, Value)>) {
        let mut signed = auth_data.to_vec();
        signed.extend_from_slice(client_data_hash);

        match self.attestation {
            AttestationMode::None => ("none", Vec::new()),
            AttestationMode::PackedSelf => (
                "packed",
                vec![
                    alg_entry(),
                    (Value::Text("sig".into()), Value::Bytes(self.sign(&signed))),
                ],
            ),
            AttestationMode::PackedBasic => {
                let (key, cert) = attestation_certificate();
                (
                    "packed",
                    vec![
                        alg_entry(),
                        (Value::Text("sig".into()), Value::Bytes(openssl_sign(&key, &signed))),
                        x5c_entry(cert),
                    ],
                )
            }
            AttestationMode::FidoU2f => {
                let (key, cert) = attestation_certificate();
                let mut u2f_signed = vec![0x00];
                u2f_signed.extend_from_slice(&sha256(self.rp_id.as_bytes()));
                u2f_signed.extend_from_slice(client_data_hash);
                u2f_signed.extend_from_slice(&self.credential_id);
                u2f_signed.extend_from_slice(self.key_pair.public_key().as_ref());
                (
                    "fido-u2f",
                    vec![
                        (
                            Value::Text("sig".into()),
                            Value::Bytes(openssl_sign(&key, &u2f_signed)),
                        ),
                        x5c_entry(cert),
                    ],
                )
            }
        }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair
            .sign(&self.rng, message)
            .expect("sign with credential key")
            .as_ref()
            .to_vec()
    }

    fn credential_id_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.credential_id)
    }
}

fn alg_entry() -> (Value, Value) {
    (
        Value::Text("alg".into()),
        Value::Integer(CoseAlgorithm::ES256.id().into()),
    )
}

fn x5c_entry(cert: Vec<u8>) -> (Value, Value) {
    (
        Value::Text("x5c".into()),
        Value::Array(vec![Value::Bytes(cert)]),
    )
}

/// Fresh P-256 attestation key and a self-signed DER certificate for it
fn attestation_certificate() -> (PKey<Private>, Vec<u8>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
    let key = PKey::from_ec_key(EcKey::generate(&group).expect("generate attestation key"))
        .expect("wrap attestation key");

    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_text("CN", "passgate soft attestation")
        .expect("common name");
    let name = name.build();

    let mut builder = X509Builder::new().expect("certificate builder");
    builder.set_version(2).expect("version");
    builder.set_subject_name(&name).expect("subject");
    builder.set_issuer_name(&name).expect("issuer");
    builder.set_pubkey(&key).expect("public key");
    builder
        .set_not_before(&Asn1Time::days_from_now(0).expect("not before"))
        .expect("not before");
    builder
        .set_not_after(&Asn1Time::days_from_now(1).expect("not after"))
        .expect("not after");
    builder
        .sign(&key, MessageDigest::sha256())
        .expect("self-sign certificate");
    let der = builder.build().to_der().expect("encode certificate");
    (key, der)
}

fn openssl_sign(key: &PKey<Private>, message: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(MessageDigest::sha256(), key).expect("signer");
    signer.update(message).expect("signer update");
    signer.sign_to_vec().expect("sign")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::cbor::{AttestationObject, AuthenticatorData};
    use crate::webauthn::CoseKey;

    #[test]
    fn test_created_credential_parses() {
        let mut authenticator = SoftAuthenticator::new("localhost", "http://localhost:8080");
        let cose = CoseKey::from_cbor(&authenticator.cose_public_key()).unwrap();
        assert_eq!(cose.algorithm(), CoseAlgorithm::ES256);
        assert_eq!(
            cose.ec2_uncompressed_point().unwrap(),
            authenticator.key_pair.public_key().as_ref()
        );

        let data = authenticator.authenticator_data(true);
        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert!(parsed.flags.user_present());
        assert!(parsed.flags.user_verified());
        let attested = parsed.attested_credential.unwrap();
        assert_eq!(attested.credential_id, authenticator.credential_id());
        assert_eq!(attested.aaguid, SOFT_AAGUID);

        authenticator.set_sign_count(9);
        let parsed = AuthenticatorData::parse(&authenticator.authenticator_data(false)).unwrap();
        assert_eq!(parsed.sign_count, 9);
        assert!(parsed.attested_credential.is_none());
    }

    #[test]
    fn test_attestation_object_shape() {
        let authenticator = SoftAuthenticator::new("localhost", "http://localhost:8080")
            .with_attestation(AttestationMode::FidoU2f);
        let auth_data = authenticator.authenticator_data(true);
        let (fmt, stmt) = authenticator.attestation_statement(&auth_data, &[0; 32]);
        assert_eq!(fmt, "fido-u2f");
        assert_eq!(stmt.len(), 2);

        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), Value::Map(stmt)),
            (Value::Text("authData".into()), Value::Bytes(auth_data.clone())),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&object, &mut bytes).unwrap();
        let parsed = AttestationObject::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.fmt, "fido-u2f");
        assert_eq!(parsed.auth_data, auth_data);
    }

    #[test]
    fn test_disabled_counter_stays_zero() {
        let mut authenticator =
            SoftAuthenticator::new("localhost", "http://localhost:8080").with_counter_disabled();
        let options = CredentialAssertion {
            public_key: crate::webauthn::PublicKeyCredentialRequestOptions {
                challenge: Base64UrlBytes(vec![1; 32]),
                timeout: 1000,
                rp_id: "localhost".to_string(),
                allow_credentials: Vec::new(),
                user_verification: crate::webauthn::UserVerificationRequirement::Preferred,
            },
        };
        let _ = authenticator.get(&options, None);
        let _ = authenticator.get(&options, None);
        assert_eq!(authenticator.sign_count(), 0);
    }
}

//! COSE key decoding and signature verification
//!
//! Credential public keys arrive as COSE_Key maps (RFC 9052) inside the
//! attested credential data. Only the algorithms this relying party offers
//! are decoded; everything else is rejected up front.

use ciborium::value::Value;
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use super::cbor::{int_entry, value_as_i64};
use super::errors::WebAuthnError;

// COSE_Key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_RSA_N: i64 = -1;
const LABEL_RSA_E: i64 = -2;

// Key types
const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

// Curves
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

const P256_COORDINATE_LEN: usize = 32;
const ED25519_KEY_LEN: usize = 32;

/// COSE signature algorithms supported by the verifier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoseAlgorithm {
    /// ECDSA P-256 with SHA-256
    ES256,
    /// Ed25519
    EdDSA,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
}

impl CoseAlgorithm {
    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::EdDSA => -8,
            Self::RS256 => -257,
        }
    }

    /// Map a COSE algorithm identifier to a supported algorithm
    ///
    /// # Errors
    /// Returns `UnsupportedAlgorithm` for any identifier not listed above
    pub fn from_id(id: i64) -> Result<Self, WebAuthnError> {
        match id {
            -7 => Ok(Self::ES256),
            -8 => Ok(Self::EdDSA),
            -257 => Ok(Self::RS256),
            other => Err(WebAuthnError::UnsupportedAlgorithm(other)),
        }
    }
}

/// A decoded credential public key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 { x: Vec<u8>, y: Vec<u8> },
    Okp { x: Vec<u8> },
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

impl CoseKey {
    /// Decode a COSE key from its CBOR bytes
    ///
    /// # Errors
    /// Returns `InvalidPublicKey` for malformed keys, mismatched key type and
    /// algorithm, or unsupported curves, and `UnsupportedAlgorithm` when the
    /// `alg` label names an algorithm the verifier does not implement
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|_| invalid_key("Invalid CBOR in COSE key"))?;
        let Value::Map(map) = value else {
            return Err(invalid_key("COSE key is not a map"));
        };

        let kty = int_entry(&map, LABEL_KTY)
            .and_then(value_as_i64)
            .ok_or_else(|| invalid_key("Missing key type"))?;
        let alg = int_entry(&map, LABEL_ALG)
            .and_then(value_as_i64)
            .ok_or_else(|| invalid_key("Missing algorithm"))?;
        let alg = CoseAlgorithm::from_id(alg)?;

        match (kty, alg) {
            (KTY_EC2, CoseAlgorithm::ES256) => {
                let crv = int_entry(&map, LABEL_CRV).and_then(value_as_i64);
                if crv != Some(CRV_P256) {
                    return Err(invalid_key("ES256 key must use curve P-256"));
                }
                let x = bytes_entry(&map, LABEL_X, "x")?;
                let y = bytes_entry(&map, LABEL_Y, "y")?;
                if x.len() != P256_COORDINATE_LEN || y.len() != P256_COORDINATE_LEN {
                    return Err(invalid_key("P-256 coordinates must be 32 bytes"));
                }
                Ok(Self::Ec2 { x, y })
            }
            (KTY_OKP, CoseAlgorithm::EdDSA) => {
                let crv = int_entry(&map, LABEL_CRV).and_then(value_as_i64);
                if crv != Some(CRV_ED25519) {
                    return Err(invalid_key("EdDSA key must use curve Ed25519"));
                }
                let x = bytes_entry(&map, LABEL_X, "x")?;
                if x.len() != ED25519_KEY_LEN {
                    return Err(invalid_key("Ed25519 key must be 32 bytes"));
                }
                Ok(Self::Okp { x })
            }
            (KTY_RSA, CoseAlgorithm::RS256) => {
                let n = bytes_entry(&map, LABEL_RSA_N, "n")?;
                let e = bytes_entry(&map, LABEL_RSA_E, "e")?;
                Ok(Self::Rsa { n, e })
            }
            _ => Err(invalid_key(&format!(
                "Key type {kty} does not match algorithm {}",
                alg.id()
            ))),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            Self::Ec2 { .. } => CoseAlgorithm::ES256,
            Self::Okp { .. } => CoseAlgorithm::EdDSA,
            Self::Rsa { .. } => CoseAlgorithm::RS256,
        }
    }

    /// SEC1 uncompressed point (`0x04 || x || y`) for EC2 keys
    #[must_use]
    pub fn ec2_uncompressed_point(&self) -> Option<Vec<u8>> {
        match self {
            Self::Ec2 { x, y } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    /// Verify `signature` over `message` with this key
    ///
    /// ES256 signatures are ASN.1 DER encoded as produced by authenticators.
    ///
    /// # Errors
    /// Returns `InvalidSignature` if verification fails
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> Result<(), WebAuthnError> {
        let result = match self {
            Self::Ec2 { .. } => {
                let point = self
                    .ec2_uncompressed_point()
                    .ok_or_else(|| invalid_key("EC2 key without coordinates"))?;
                UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, point)
                    .verify(message, signature)
            }
            Self::Okp { x } => {
                UnparsedPublicKey::new(&signature::ED25519, x).verify(message, signature)
            }
            Self::Rsa { n, e } => RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                message,
                signature,
            ),
        };

        result.map_err(|_| WebAuthnError::InvalidSignature)
    }
}

fn bytes_entry(
    map: &[(Value, Value)],
    label: i64,
    name: &str,
) -> Result<Vec<u8>, WebAuthnError> {
    int_entry(map, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| invalid_key(&format!("Missing or invalid {name} parameter")))
}

fn invalid_key(msg: &str) -> WebAuthnError {
    WebAuthnError::InvalidPublicKey(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair};

    fn encode(entries: Vec<(i64, Value)>) -> Vec<u8> {
        let map = Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Integer(k.into()), v))
                .collect(),
        );
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&map, &mut buf).unwrap();
        buf
    }

    fn es256_key(point: &[u8]) -> Vec<u8> {
        encode(vec![
            (LABEL_KTY, Value::Integer(KTY_EC2.into())),
            (LABEL_ALG, Value::Integer((-7).into())),
            (LABEL_CRV, Value::Integer(CRV_P256.into())),
            (LABEL_X, Value::Bytes(point[1..33].to_vec())),
            (LABEL_Y, Value::Bytes(point[33..65].to_vec())),
        ])
    }

    #[test]
    fn test_algorithm_ids() {
        for alg in [CoseAlgorithm::ES256, CoseAlgorithm::EdDSA, CoseAlgorithm::RS256] {
            assert_eq!(CoseAlgorithm::from_id(alg.id()), Ok(alg));
        }
        assert_eq!(
            CoseAlgorithm::from_id(-35),
            Err(WebAuthnError::UnsupportedAlgorithm(-35))
        );
    }

    #[test]
    fn test_es256_signature_verifies() {
        let rng = SystemRandom::new();
        let pkcs8 =
            EcdsaKeyPair::generate_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
                .unwrap();
        let pair = EcdsaKeyPair::from_pkcs8(
            &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
            pkcs8.as_ref(),
            &rng,
        )
        .unwrap();

        let key = CoseKey::from_cbor(&es256_key(pair.public_key().as_ref())).unwrap();
        assert_eq!(key.algorithm(), CoseAlgorithm::ES256);
        assert_eq!(
            key.ec2_uncompressed_point().unwrap(),
            pair.public_key().as_ref().to_vec()
        );

        let sig = pair.sign(&rng, b"signed message").unwrap();
        assert!(key.verify_signature(b"signed message", sig.as_ref()).is_ok());
        assert_eq!(
            key.verify_signature(b"another message", sig.as_ref()),
            Err(WebAuthnError::InvalidSignature)
        );
    }

    #[test]
    fn test_ed25519_signature_verifies() {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();

        let bytes = encode(vec![
            (LABEL_KTY, Value::Integer(KTY_OKP.into())),
            (LABEL_ALG, Value::Integer((-8).into())),
            (LABEL_CRV, Value::Integer(CRV_ED25519.into())),
            (LABEL_X, Value::Bytes(pair.public_key().as_ref().to_vec())),
        ]);
        let key = CoseKey::from_cbor(&bytes).unwrap();

        let sig = pair.sign(b"hello");
        assert!(key.verify_signature(b"hello", sig.as_ref()).is_ok());
        assert!(key.verify_signature(b"hellO", sig.as_ref()).is_err());
    }

    #[test]
    fn test_rs256_signature_verifies() {
        use openssl::hash::MessageDigest;
        use openssl::pkey::PKey;
        use openssl::rsa::Rsa;
        use openssl::sign::Signer;

        let rsa = Rsa::generate(2048).unwrap();
        let bytes = encode(vec![
            (LABEL_KTY, Value::Integer(KTY_RSA.into())),
            (LABEL_ALG, Value::Integer((-257).into())),
            (LABEL_RSA_N, Value::Bytes(rsa.n().to_vec())),
            (LABEL_RSA_E, Value::Bytes(rsa.e().to_vec())),
        ]);
        let key = CoseKey::from_cbor(&bytes).unwrap();
        assert_eq!(key.algorithm(), CoseAlgorithm::RS256);

        let pkey = PKey::from_rsa(rsa).unwrap();
        let mut signer = Signer::new(MessageDigest::sha256(), &pkey).unwrap();
        signer.update(b"signed message").unwrap();
        let sig = signer.sign_to_vec().unwrap();

        assert!(key.verify_signature(b"signed message", &sig).is_ok());
        assert_eq!(
            key.verify_signature(b"signed messagE", &sig),
            Err(WebAuthnError::InvalidSignature)
        );
    }

    #[test]
    fn test_mismatched_key_type_rejected() {
        let bytes = encode(vec![
            (LABEL_KTY, Value::Integer(KTY_OKP.into())),
            (LABEL_ALG, Value::Integer((-7).into())),
            (LABEL_X, Value::Bytes(vec![0; 32])),
        ]);
        assert!(matches!(
            CoseKey::from_cbor(&bytes),
            Err(WebAuthnError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_unsupported_algorithm_reported() {
        let bytes = encode(vec![
            (LABEL_KTY, Value::Integer(KTY_EC2.into())),
            (LABEL_ALG, Value::Integer((-35).into())),
        ]);
        assert_eq!(
            CoseKey::from_cbor(&bytes),
            Err(WebAuthnError::UnsupportedAlgorithm(-35))
        );
    }

    #[test]
    fn test_short_coordinates_rejected() {
        let bytes = encode(vec![
            (LABEL_KTY, Value::Integer(KTY_EC2.into())),
            (LABEL_ALG, Value::Integer((-7).into())),
            (LABEL_CRV, Value::Integer(CRV_P256.into())),
            (LABEL_X, Value::Bytes(vec![1; 31])),
            (LABEL_Y, Value::Bytes(vec![1; 32])),
        ]);
        assert!(CoseKey::from_cbor(&bytes).is_err());
    }
}

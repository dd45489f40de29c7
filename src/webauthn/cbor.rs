//! CBOR processing for `WebAuthn`
//!
//! This module handles the CBOR (Concise Binary Object Representation)
//! processing needed for attestation objects and authenticator data.

use ciborium::de::from_reader;
use ciborium::value::Value;

use super::errors::WebAuthnError;

/// Fixed-size prefix of authenticator data: RP ID hash, flags, counter
const AUTH_DATA_MIN_LEN: usize = 37;
const AAGUID_LEN: usize = 16;
/// Longest credential ID a relying party must accept
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Authenticator data flag bits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatorFlags(pub u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKUP_STATE: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    #[must_use]
    pub fn user_present(self) -> bool {
        self.0 & Self::USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(self) -> bool {
        self.0 & Self::USER_VERIFIED != 0
    }

    #[must_use]
    pub fn backup_eligible(self) -> bool {
        self.0 & Self::BACKUP_ELIGIBLE != 0
    }

    #[must_use]
    pub fn backup_state(self) -> bool {
        self.0 & Self::BACKUP_STATE != 0
    }

    #[must_use]
    pub fn has_attested_credential_data(self) -> bool {
        self.0 & Self::ATTESTED_CREDENTIAL_DATA != 0
    }

    #[must_use]
    pub fn has_extension_data(self) -> bool {
        self.0 & Self::EXTENSION_DATA != 0
    }
}

/// Credential data attached to authenticator data during registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// Raw COSE key bytes, exactly as the authenticator encoded them
    pub public_key: Vec<u8>,
}

/// Parsed authenticator data
#[derive(Clone, Debug)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    /// Parse the binary authenticator data structure
    ///
    /// The format is:
    /// - 32 bytes: RP ID hash
    /// - 1 byte: flags
    /// - 4 bytes: signature counter (big-endian)
    /// - variable: attested credential data (if AT flag is set)
    ///   - 16 bytes: AAGUID
    ///   - 2 bytes: credential ID length (L)
    ///   - L bytes: credential ID
    ///   - variable: COSE public key
    /// - variable: extensions map (if ED flag is set)
    ///
    /// # Errors
    /// Returns `InvalidAuthenticatorData` if the structure is truncated, the
    /// embedded CBOR is malformed, or bytes are left over
    pub fn parse(auth_data: &[u8]) -> Result<Self, WebAuthnError> {
        if auth_data.len() < AUTH_DATA_MIN_LEN {
            return Err(invalid("Auth data too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&auth_data[..32]);
        let flags = AuthenticatorFlags(auth_data[32]);
        let sign_count =
            u32::from_be_bytes([auth_data[33], auth_data[34], auth_data[35], auth_data[36]]);

        let mut rest = &auth_data[AUTH_DATA_MIN_LEN..];

        let attested_credential = if flags.has_attested_credential_data() {
            Some(parse_attested_credential(&mut rest)?)
        } else {
            None
        };

        let extensions = if flags.has_extension_data() {
            let value: Value = from_reader(&mut rest)
                .map_err(|_| invalid("Invalid CBOR in extension data"))?;
            if value.as_map().is_none() {
                return Err(invalid("Extension data is not a map"));
            }
            Some(value)
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(invalid("Trailing bytes after authenticator data"));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
            extensions,
        })
    }
}

/// Read attested credential data, advancing `rest` past it
fn parse_attested_credential(rest: &mut &[u8]) -> Result<AttestedCredentialData, WebAuthnError> {
    if rest.len() < AAGUID_LEN + 2 {
        return Err(invalid("Auth data too short for attested credential data"));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&rest[..AAGUID_LEN]);

    let id_len = usize::from(u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]));
    let id_start = AAGUID_LEN + 2;
    if id_len == 0 || id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(invalid("Credential ID length out of range"));
    }
    if rest.len() < id_start + id_len {
        return Err(invalid("Auth data too short for credential ID"));
    }
    let credential_id = rest[id_start..id_start + id_len].to_vec();

    // The COSE key is self-delimiting: decode it to learn where it ends
    let key_bytes = &rest[id_start + id_len..];
    let mut cursor = key_bytes;
    let _: Value =
        from_reader(&mut cursor).map_err(|_| invalid("Invalid CBOR in credential public key"))?;
    let key_len = key_bytes.len() - cursor.len();
    let public_key = key_bytes[..key_len].to_vec();

    *rest = cursor;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key,
    })
}

/// Decoded attestation object (`fmt`, `attStmt`, `authData`)
#[derive(Clone, Debug)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    /// Raw authenticator data; signatures cover these exact bytes
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    /// Decode an attestation object from its CBOR encoding
    ///
    /// # Errors
    /// Returns `InvalidAttestation` if the CBOR is malformed or a required
    /// member is missing or has the wrong type
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        let value: Value = from_reader(bytes).map_err(|_| {
            WebAuthnError::InvalidAttestation("Invalid CBOR attestation format".to_string())
        })?;

        let Value::Map(map) = value else {
            return Err(WebAuthnError::InvalidAttestation(
                "Attestation object is not a map".to_string(),
            ));
        };

        let fmt = text_entry(&map, "fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| {
                WebAuthnError::InvalidAttestation("Missing fmt in attestation".to_string())
            })?
            .to_string();

        let att_stmt = text_entry(&map, "attStmt")
            .and_then(Value::as_map)
            .ok_or_else(|| {
                WebAuthnError::InvalidAttestation("Missing attStmt in attestation".to_string())
            })?
            .clone();

        let auth_data = text_entry(&map, "authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| {
                WebAuthnError::InvalidAttestation("Missing authData in attestation".to_string())
            })?
            .clone();

        Ok(Self {
            fmt,
            att_stmt,
            auth_data,
        })
    }
}

/// Look up a text-keyed entry in a CBOR map
#[must_use]
pub fn text_entry<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

/// Look up an integer-keyed entry in a CBOR map
#[must_use]
pub fn int_entry(map: &[(Value, Value)], key: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| value_as_i64(k) == Some(key))
        .map(|(_, v)| v)
}

/// Read a CBOR integer as `i64`, if it fits
#[must_use]
pub fn value_as_i64(value: &Value) -> Option<i64> {
    value.as_integer().and_then(|i| i64::try_from(i).ok())
}

fn invalid(msg: &str) -> WebAuthnError {
    WebAuthnError::InvalidAuthenticatorData(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cose_key_bytes() -> Vec<u8> {
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![0x11; 32])),
            (Value::Integer((-3).into()), Value::Bytes(vec![0x22; 32])),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&key, &mut buf).unwrap();
        buf
    }

    fn auth_data_with_credential(flags: u8, credential_id: &[u8], tail: &[u8]) -> Vec<u8> {
        let mut data = vec![0xAA; 32];
        data.push(flags);
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(&[0x01; 16]);
        data.extend_from_slice(&u16::try_from(credential_id.len()).unwrap().to_be_bytes());
        data.extend_from_slice(credential_id);
        data.extend_from_slice(&cose_key_bytes());
        data.extend_from_slice(tail);
        data
    }

    #[test]
    fn test_parse_assertion_auth_data() {
        let mut data = vec![0x42; 32];
        data.push(AuthenticatorFlags::USER_PRESENT | AuthenticatorFlags::USER_VERIFIED);
        data.extend_from_slice(&0x0102_0304u32.to_be_bytes());

        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert_eq!(parsed.rp_id_hash, [0x42; 32]);
        assert!(parsed.flags.user_present());
        assert!(parsed.flags.user_verified());
        assert!(!parsed.flags.backup_eligible());
        assert_eq!(parsed.sign_count, 0x0102_0304);
        assert!(parsed.attested_credential.is_none());
    }

    #[test]
    fn test_parse_attested_credential_data() {
        let data = auth_data_with_credential(0x41, &[7, 8, 9], &[]);
        let parsed = AuthenticatorData::parse(&data).unwrap();
        let attested = parsed.attested_credential.unwrap();
        assert_eq!(attested.aaguid, [0x01; 16]);
        assert_eq!(attested.credential_id, vec![7, 8, 9]);
        assert_eq!(attested.public_key, cose_key_bytes());
        assert_eq!(parsed.sign_count, 5);
    }

    #[test]
    fn test_parse_extensions_after_credential() {
        let mut extensions = Vec::new();
        let ext = Value::Map(vec![(Value::Text("credProtect".into()), Value::Integer(2.into()))]);
        ciborium::ser::into_writer(&ext, &mut extensions).unwrap();

        let data = auth_data_with_credential(0xC1, &[1], &extensions);
        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert!(parsed.attested_credential.is_some());
        assert!(parsed.extensions.is_some());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let data = auth_data_with_credential(0x41, &[1, 2], &[0xFF]);
        assert!(matches!(
            AuthenticatorData::parse(&data),
            Err(WebAuthnError::InvalidAuthenticatorData(_))
        ));
    }

    #[test]
    fn test_truncated_data_rejected() {
        assert!(AuthenticatorData::parse(&[0u8; 36]).is_err());

        let data = auth_data_with_credential(0x41, &[1, 2, 3, 4], &[]);
        // Cut inside the credential ID
        assert!(AuthenticatorData::parse(&data[..37 + 16 + 2 + 2]).is_err());
    }

    #[test]
    fn test_attestation_object_requires_auth_data() {
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(Vec::new())),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&object, &mut buf).unwrap();

        assert!(matches!(
            AttestationObject::from_bytes(&buf),
            Err(WebAuthnError::InvalidAttestation(_))
        ));
    }

    #[test]
    fn test_attestation_object_decodes() {
        let auth_data = auth_data_with_credential(0x41, &[1], &[]);
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(Vec::new())),
            (Value::Text("authData".into()), Value::Bytes(auth_data.clone())),
        ]);
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&object, &mut buf).unwrap();

        let decoded = AttestationObject::from_bytes(&buf).unwrap();
        assert_eq!(decoded.fmt, "none");
        assert!(decoded.att_stmt.is_empty());
        assert_eq!(decoded.auth_data, auth_data);
    }
}

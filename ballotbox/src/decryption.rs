use crate::*;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

/// Vote plaintext as recovered at tally time
///
/// Every field is optional: the tally only needs `contestantId` and falls
/// back to the submission-time value when it is missing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contestant_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter: Option<String>,
}

impl From<VoteIntent> for VoteData {
    fn from(intent: VoteIntent) -> Self {
        VoteData {
            poll_id: Some(intent.poll_id),
            contestant_id: Some(intent.contestant_id),
            voter: Some(intent.voter),
        }
    }
}

/// Opens encrypted votes with the election private key
///
/// The key is parsed once and reused for every vote of a tally run.
pub struct VoteDecryptor {
    private_key: RsaPrivateKey,
}

impl VoteDecryptor {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        VoteDecryptor { private_key }
    }

    pub fn from_pkcs8_pem(private_key_pem: &str) -> Result<Self, Error> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem.trim())?;
        Ok(VoteDecryptor::new(private_key))
    }

    /// Decrypt and parse a vote
    pub fn decrypt(&self, payload: &EncryptedVotePayload) -> Result<VoteData, DecryptionError> {
        let plaintext = self.open(payload)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Decrypt a vote to its raw plaintext bytes
    pub fn open(&self, payload: &EncryptedVotePayload) -> Result<Vec<u8>, DecryptionError> {
        let wrapped_key = decode_b64("wrappedKey", &payload.wrapped_key)?;
        let iv = decode_b64("iv", &payload.iv)?;
        let ciphertext = decode_b64("ciphertext", &payload.ciphertext)?;

        let content_key = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), &wrapped_key)?;
        if content_key.len() != CONTENT_KEY_LEN {
            return Err(DecryptionError::ContentKeyLength(content_key.len()));
        }
        if iv.len() != IV_LEN {
            return Err(DecryptionError::IvLength(iv.len()));
        }

        let (body, tag) = split_tag(&ciphertext)?;

        let cipher = Aes256Gcm::new_from_slice(&content_key)
            .map_err(|_| DecryptionError::ContentKeyLength(content_key.len()))?;
        let mut plaintext = body.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&iv),
                b"",
                &mut plaintext,
                Tag::from_slice(tag),
            )
            .map_err(|_| DecryptionError::TagMismatch)?;

        Ok(plaintext)
    }
}

/// Split Web Crypto style `ciphertext || tag` output
pub fn split_tag(ciphertext: &[u8]) -> Result<(&[u8], &[u8]), DecryptionError> {
    if ciphertext.len() < TAG_LEN {
        return Err(DecryptionError::CiphertextTooShort);
    }
    Ok(ciphertext.split_at(ciphertext.len() - TAG_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{TEST_DECRYPTOR, TEST_KEYS};
    use aes_gcm::aead::Aead;
    use rand::rngs::OsRng;
    use rsa::pkcs8::DecodePublicKey;
    use rsa::RsaPublicKey;

    fn intent(contestant_id: i64) -> VoteIntent {
        VoteIntent {
            poll_id: 7,
            contestant_id,
            voter: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".to_owned(),
        }
    }

    fn seal_raw(plaintext: &[u8], iv: &[u8]) -> EncryptedVotePayload {
        let public_key = RsaPublicKey::from_public_key_pem(&TEST_KEYS.public_key_pem).unwrap();
        let content_key = [7u8; CONTENT_KEY_LEN];
        let cipher = Aes256Gcm::new_from_slice(&content_key).unwrap();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&[1u8; IV_LEN]), plaintext)
            .unwrap();
        let wrapped_key = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &content_key)
            .unwrap();

        EncryptedVotePayload {
            ciphertext: encode_b64(&ciphertext),
            iv: encode_b64(iv),
            wrapped_key: encode_b64(&wrapped_key),
        }
    }

    #[test]
    fn test_round_trip() {
        for contestant_id in 1..4 {
            let payload = encrypt_vote(&intent(contestant_id), &TEST_KEYS.public_key_pem).unwrap();
            let vote = TEST_DECRYPTOR.decrypt(&payload).unwrap();
            assert_eq!(vote, VoteData::from(intent(contestant_id)));
        }
    }

    #[test]
    fn test_flipped_tag_byte() {
        let mut payload = encrypt_vote(&intent(1), &TEST_KEYS.public_key_pem).unwrap();
        let mut ciphertext = decode_b64("ciphertext", &payload.ciphertext).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        payload.ciphertext = encode_b64(&ciphertext);

        assert!(matches!(
            TEST_DECRYPTOR.decrypt(&payload),
            Err(DecryptionError::TagMismatch)
        ));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let mut payload = encrypt_vote(&intent(1), &TEST_KEYS.public_key_pem).unwrap();
        payload.ciphertext = encode_b64(&[0u8; TAG_LEN - 1]);
        assert!(matches!(
            TEST_DECRYPTOR.decrypt(&payload),
            Err(DecryptionError::CiphertextTooShort)
        ));
    }

    #[test]
    fn test_bad_wrapped_key() {
        let mut payload = encrypt_vote(&intent(1), &TEST_KEYS.public_key_pem).unwrap();
        payload.wrapped_key = encode_b64(&[0u8; 256]);
        assert!(matches!(
            TEST_DECRYPTOR.decrypt(&payload),
            Err(DecryptionError::KeyUnwrap(_))
        ));

        payload.wrapped_key = "%%%".to_owned();
        assert!(matches!(
            TEST_DECRYPTOR.decrypt(&payload),
            Err(DecryptionError::Base64 { field: "wrappedKey", .. })
        ));
    }

    #[test]
    fn test_wrong_iv_length() {
        let payload = seal_raw(b"{}", &[1u8; 16]);
        assert!(matches!(
            TEST_DECRYPTOR.decrypt(&payload),
            Err(DecryptionError::IvLength(16))
        ));
    }

    #[test]
    fn test_malformed_plaintext() {
        let payload = seal_raw(b"not json", &[1u8; IV_LEN]);
        assert!(matches!(
            TEST_DECRYPTOR.decrypt(&payload),
            Err(DecryptionError::MalformedPlaintext(_))
        ));

        // Well-formed but without a contestant: still a valid vote
        let payload = seal_raw(br#"{"pollId": 7}"#, &[1u8; IV_LEN]);
        let vote = TEST_DECRYPTOR.decrypt(&payload).unwrap();
        assert_eq!(vote.poll_id, Some(7));
        assert_eq!(vote.contestant_id, None);
    }

    #[test]
    fn test_split_tag() {
        let (body, tag) = split_tag(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17]).unwrap();
        assert_eq!(body, &[1]);
        assert_eq!(tag.len(), TAG_LEN);

        let (body, _) = split_tag(&[0u8; TAG_LEN]).unwrap();
        assert!(body.is_empty());
    }
}

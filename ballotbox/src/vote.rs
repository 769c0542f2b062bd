use crate::*;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;

/// AES-GCM initialization vector length
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length, appended to every ciphertext
pub const TAG_LEN: usize = 16;

/// AES-256 content key length
pub const CONTENT_KEY_LEN: usize = 32;

/// What the voter is casting, before encryption
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteIntent {
    pub poll_id: i64,
    pub contestant_id: i64,
    pub voter: String,
}

/// Hybrid-encrypted vote
///
/// `ciphertext` is AES-256-GCM output with the 16 byte tag appended,
/// `wrapped_key` is the one-time AES key under RSA-OAEP-SHA256.
/// All three fields are standard base64.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVotePayload {
    pub ciphertext: String,
    pub iv: String,
    pub wrapped_key: String,
}

/// Encrypt a vote intent for the holder of the election private key
pub fn encrypt_vote(
    intent: &VoteIntent,
    public_key_pem: &str,
) -> Result<EncryptedVotePayload, Error> {
    encrypt_vote_with_rng(intent, public_key_pem, &mut OsRng)
}

pub fn encrypt_vote_with_rng<R: CryptoRng + RngCore>(
    intent: &VoteIntent,
    public_key_pem: &str,
    rng: &mut R,
) -> Result<EncryptedVotePayload, Error> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem.trim())?;

    // One content key per vote, never reused
    let mut content_key = [0u8; CONTENT_KEY_LEN];
    rng.fill_bytes(&mut content_key);

    let plaintext = serde_json::to_vec(intent)?;

    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let cipher =
        Aes256Gcm::new_from_slice(&content_key).map_err(|_| Error::EncryptionFailed)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| Error::EncryptionFailed)?;

    let wrapped_key = public_key.encrypt(rng, Oaep::new::<Sha256>(), &content_key)?;

    Ok(EncryptedVotePayload {
        ciphertext: encode_b64(&ciphertext),
        iv: encode_b64(&iv),
        wrapped_key: encode_b64(&wrapped_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TEST_KEYS;

    fn intent() -> VoteIntent {
        VoteIntent {
            poll_id: 1,
            contestant_id: 3,
            voter: "0xabc0000000000000000000000000000000000001".to_owned(),
        }
    }

    #[test]
    fn test_payload_layout() {
        let payload = encrypt_vote(&intent(), &TEST_KEYS.public_key_pem).unwrap();
        let plaintext_len = serde_json::to_vec(&intent()).unwrap().len();

        assert_eq!(decode_b64("iv", &payload.iv).unwrap().len(), IV_LEN);
        assert_eq!(
            decode_b64("ciphertext", &payload.ciphertext).unwrap().len(),
            plaintext_len + TAG_LEN
        );
        // RSA-2048 output is always one modulus wide
        assert_eq!(
            decode_b64("wrappedKey", &payload.wrapped_key).unwrap().len(),
            RSA_KEY_BITS / 8
        );
    }

    #[test]
    fn test_fresh_key_and_iv_per_vote() {
        let a = encrypt_vote(&intent(), &TEST_KEYS.public_key_pem).unwrap();
        let b = encrypt_vote(&intent(), &TEST_KEYS.public_key_pem).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.wrapped_key, b.wrapped_key);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_bad_public_key() {
        let res = encrypt_vote(&intent(), "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----");
        assert!(matches!(res, Err(Error::InvalidPublicKey(_))));

        // A private key is not an acceptable election key
        let res = encrypt_vote(&intent(), &TEST_KEYS.private_key_pem);
        assert!(res.is_err());
    }

    #[test]
    fn test_wire_format() {
        let payload = EncryptedVotePayload {
            ciphertext: "Y3Q=".to_owned(),
            iv: "aXY=".to_owned(),
            wrapped_key: "d2s=".to_owned(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["wrappedKey"], "d2s=");

        let json = serde_json::to_value(&intent()).unwrap();
        assert_eq!(json["pollId"], 1);
        assert_eq!(json["contestantId"], 3);
    }
}

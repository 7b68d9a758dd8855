//! Challenge-response login.
//!
//! 1. The client sends `/login`. The router answers `!done =ret=<32 hex chars>`.
//! 2. The client sends `/login =name=<user> =response=00<hex digest>`, where the digest is
//!    computed over `0x00 || password || challenge`.
//! 3. The login succeeded if the router answers `!done`.

use crate::{
    error::ProtocolError,
    sentence::Sentence,
    word::{Word, encode_latin1},
};

/// Length of a decoded login challenge and of the digest computed over it.
pub const CHALLENGE_LEN: usize = 16;

/// Digest primitive used to answer a login challenge.
pub trait ChallengeDigest {
    /// Computes the 16-byte digest of `input`.
    fn digest(&self, input: &[u8]) -> [u8; CHALLENGE_LEN];
}

impl<F> ChallengeDigest for F
where
    F: Fn(&[u8]) -> [u8; CHALLENGE_LEN],
{
    fn digest(&self, input: &[u8]) -> [u8; CHALLENGE_LEN] {
        self(input)
    }
}

/// The MD5 digest expected by RouterOS.
#[cfg(feature = "md5")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5;

#[cfg(feature = "md5")]
impl ChallengeDigest for Md5 {
    fn digest(&self, input: &[u8]) -> [u8; CHALLENGE_LEN] {
        use md5::Digest;

        let mut out = [0_u8; CHALLENGE_LEN];
        out.copy_from_slice(&md5::Md5::digest(input));
        out
    }
}

/// The first login sentence, asking for a challenge.
pub fn challenge_request() -> Sentence {
    Sentence::from(vec![Word::from_wire(b"/login".to_vec())])
}

/// Extracts the challenge from the reply to [`challenge_request`].
///
/// # Errors
///
/// Returns [`ProtocolError::MissingChallenge`] if the reply has no `=ret=` attribute and
/// [`ProtocolError::InvalidChallenge`] if it is not 32 hexadecimal characters.
pub fn parse_challenge(reply: &Sentence) -> Result<[u8; CHALLENGE_LEN], ProtocolError> {
    let hex_challenge = reply.get_bytes("ret").ok_or(ProtocolError::MissingChallenge)?;
    let mut challenge = [0_u8; CHALLENGE_LEN];
    hex::decode_to_slice(hex_challenge, &mut challenge)
        .map_err(ProtocolError::InvalidChallenge)?;
    Ok(challenge)
}

/// Computes the 34-character response token: `"00"` followed by the hex digest of
/// `0x00 || password || challenge`, the password being encoded to Latin-1.
///
/// # Errors
///
/// Returns [`ProtocolError::NonLatin1`] if the password can not be encoded.
pub fn response_token(
    password: &str,
    challenge: &[u8; CHALLENGE_LEN],
    digest: &impl ChallengeDigest,
) -> Result<String, ProtocolError> {
    let password = encode_latin1(password)?;
    let mut input = Vec::with_capacity(1 + password.len() + CHALLENGE_LEN);
    input.push(0);
    input.extend_from_slice(&password);
    input.extend_from_slice(challenge);
    Ok(format!("00{}", hex::encode(digest.digest(&input))))
}

/// The second login sentence, answering the challenge.
pub fn response_request(username: &str, token: &str) -> Result<Sentence, ProtocolError> {
    Sentence::command("/login")?
        .with_attribute("name", username)?
        .with_attribute("response", token)
}

/// The single-round plaintext login used by RouterOS 6.43 and later.
pub fn plain_request(username: &str, password: &str) -> Result<Sentence, ProtocolError> {
    Sentence::command("/login")?
        .with_attribute("name", username)?
        .with_attribute("password", password)
}

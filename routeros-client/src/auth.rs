//! Logging in over an open connection.

use routeros_proto::{
    Reply, ReplyKind, Sentence,
    auth::{self, ChallengeDigest},
};
use tracing::{debug, info, warn};

use crate::{Connection, error::Result, transport::Transport};

impl<T: Transport> Connection<T> {
    /// Authenticates with the challenge-response login.
    ///
    /// Returns `Ok(true)` when the router accepts the credentials and `Ok(false)` when it
    /// answers with `!trap`. The router's reply is read with blocking calls, whatever the
    /// current mode.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, when the first reply carries no valid challenge, and when
    /// the second reply is neither `!done` nor `!trap`.
    #[cfg(feature = "md5")]
    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        self.login_with(username, password, &auth::Md5)
    }

    /// Same as [`login`](Self::login), with a caller supplied digest.
    pub fn login_with(
        &mut self,
        username: &str,
        password: &str,
        digest: &impl ChallengeDigest,
    ) -> Result<bool> {
        let reply = self.send_and_wait(&auth::challenge_request())?;
        let challenge = auth::parse_challenge(&reply)?;
        debug!(username, "received login challenge");

        let token = auth::response_token(password, &challenge, digest)?;
        let response = auth::response_request(username, &token)?;
        self.finish_login(username, &response)
    }

    /// Authenticates with the single-round plaintext login of RouterOS 6.43 and later.
    ///
    /// # Attention 🚨
    /// The password is sent in clear text.
    pub fn login_plain(&mut self, username: &str, password: &str) -> Result<bool> {
        let request = auth::plain_request(username, password)?;
        self.finish_login(username, &request)
    }

    fn finish_login(&mut self, username: &str, request: &Sentence) -> Result<bool> {
        let reply = Reply::from(self.send_and_wait(request)?);
        if reply.kind() == ReplyKind::Trap {
            warn!(username, reason = ?reply.message(), "login rejected");
            // A trap is followed by `!done`; consume it so the next read starts clean.
            while !ReplyKind::of(&self.read_sentence()?).is_terminal() {}
            return Ok(false);
        }
        reply.expect_kind(ReplyKind::Done)?;
        info!(username, "logged in");
        Ok(true)
    }
}

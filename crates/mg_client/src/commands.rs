//! Typed wrappers over the wire commands.
//!
//! Each wrapper builds the request, runs the exchange on a
//! `ServerConnection`, checks the status code, and pulls the typed result
//! out of the response. A wrong code surfaces as `ClientError::Protocol`
//! carrying the server's info string.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};

use mg_crypto::keys::PublicEncryptionKey;
use mg_keycard::{Domain, Keycard, RandomID, UserID};
use mg_proto::message::status;
use mg_proto::Request;

use crate::conn::{expect_code, ServerConnection};
use crate::error::ClientError;

/// What PREREG hands back for the new account holder.
#[derive(Debug, Clone)]
pub struct PreregInfo {
    pub wid: RandomID,
    pub domain: Domain,
    pub reg_code: String,
    pub uid: Option<UserID>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConnection<S> {
    /// First half of authentication. Sends the workspace ID and a random
    /// challenge sealed to the org's encryption key; the server proves key
    /// possession by echoing the decrypted challenge with 100 CONTINUE.
    pub async fn login(
        &mut self,
        wid: &RandomID,
        org_key: &PublicEncryptionKey,
    ) -> Result<(), ClientError> {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let challenge = hex::encode(raw);
        let sealed = org_key.encrypt(challenge.as_bytes())?;

        let req = Request::new("LOGIN")
            .with("Workspace-ID", wid.as_str())
            .with("Challenge", &sealed.to_string());
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::CONTINUE)?;

        if resp.field("Response")? != challenge {
            return Err(ClientError::Verification(
                "challenge echo does not match".into(),
            ));
        }
        Ok(())
    }

    /// Second half of authentication. `password_hash` is the client-side
    /// Argon2 hash of the account password, never the password itself.
    pub async fn password(&mut self, password_hash: &str) -> Result<(), ClientError> {
        let req = Request::new("PASSWORD").with("Password-Hash", password_hash);
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::OK)
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let resp = self.transact(&Request::new("LOGOUT")).await?;
        expect_code(&resp, status::OK)
    }

    /// Maps a user ID on a domain to its workspace ID.
    pub async fn getwid(
        &mut self,
        uid: &UserID,
        domain: &Domain,
    ) -> Result<RandomID, ClientError> {
        let req = Request::new("GETWID")
            .with("User-ID", uid.as_str())
            .with("Domain", domain.as_str());
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::OK)?;
        Ok(resp.field("Workspace-ID")?.parse()?)
    }

    /// Fetches keycard entries for `owner` (a domain for org cards, a
    /// workspace address for user cards).
    ///
    /// Start-Index semantics: 0 = current entry only, 1 = the full chain,
    /// N = entries from index N upward.
    pub async fn getcard(
        &mut self,
        owner: &str,
        start_index: u32,
    ) -> Result<Keycard, ClientError> {
        let req = Request::new("GETCARD")
            .with("Owner", owner)
            .with("Start-Index", &start_index.to_string());
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::OK)?;
        Ok(Keycard::from_text(resp.field("Card-Data")?)?)
    }

    /// Preregisters a workspace. Admin-only on the server side; a non-admin
    /// session gets 403 back as `ClientError::Protocol`.
    pub async fn prereg(
        &mut self,
        uid: Option<&UserID>,
        domain: Option<&Domain>,
    ) -> Result<PreregInfo, ClientError> {
        let mut req = Request::new("PREREG");
        if let Some(uid) = uid {
            req = req.with("User-ID", uid.as_str());
        }
        if let Some(domain) = domain {
            req = req.with("Domain", domain.as_str());
        }
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::OK)?;

        Ok(PreregInfo {
            wid: resp.field("Workspace-ID")?.parse()?,
            domain: resp.field("Domain")?.parse()?,
            reg_code: resp.field("Reg-Code")?.to_string(),
            uid: match resp.data.get("User-ID") {
                Some(v) => Some(v.parse()?),
                None => None,
            },
        })
    }

    /// Redeems a preregistration code and sets the workspace password.
    /// `password_hash` is the client-side Argon2 hash, as with PASSWORD.
    pub async fn regcode(
        &mut self,
        wid: &RandomID,
        reg_code: &str,
        password_hash: &str,
    ) -> Result<(), ClientError> {
        let req = Request::new("REGCODE")
            .with("Workspace-ID", wid.as_str())
            .with("Reg-Code", reg_code)
            .with("Password-Hash", password_hash);
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::OK)
    }

    /// Registers a workspace outright. Servers in invitation-only mode
    /// answer 403.
    pub async fn register(
        &mut self,
        wid: &RandomID,
        uid: Option<&UserID>,
        password_hash: &str,
    ) -> Result<(), ClientError> {
        let mut req = Request::new("REGISTER")
            .with("Workspace-ID", wid.as_str())
            .with("Password-Hash", password_hash);
        if let Some(uid) = uid {
            req = req.with("User-ID", uid.as_str());
        }
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::OK)
    }
}

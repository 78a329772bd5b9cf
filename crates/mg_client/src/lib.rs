//! mg_client — client library for the Mensago wire protocol
//!
//! A thin, typed layer over the framed codec: open a `ServerConnection`,
//! call command wrappers, get typed results or a `ClientError` that says
//! whether the server refused, the schema broke, or verification failed.
//!
//! The ADDENTRY wrapper implements the client half of two-phase keycard
//! chaining, including the mandatory local check of the org
//! countersignature against a pinned verification key.

pub mod addentry;
pub mod commands;
pub mod conn;
pub mod error;

pub use commands::PreregInfo;
pub use conn::ServerConnection;
pub use error::ClientError;

#[cfg(test)]
mod tests {
    use super::*;
    use mg_proto::message::status;
    use mg_proto::{Request, Response};
    use tokio::io::{duplex, DuplexStream};

    async fn scripted_server(
        mut stream: DuplexStream,
        script: Vec<Box<dyn FnOnce(Request) -> Response + Send>>,
    ) {
        for step in script {
            let req = Request::receive(&mut stream).await.unwrap();
            let resp = step(req);
            resp.send(&mut stream).await.unwrap();
        }
    }

    #[tokio::test]
    async fn getwid_happy_path() {
        let (client_end, server_end) = duplex(4096);
        let server = tokio::spawn(scripted_server(
            server_end,
            vec![Box::new(|req: Request| {
                assert_eq!(req.action, "GETWID");
                assert_eq!(req.data["User-ID"], "csimons");
                Response::ok().with("Workspace-ID", "11111111-2222-3333-4444-555555555555")
            })],
        ));

        let mut conn = ServerConnection::from_stream(client_end);
        let wid = conn
            .getwid(&"csimons".parse().unwrap(), &"example.com".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(wid.as_str(), "11111111-2222-3333-4444-555555555555");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn wrong_code_is_a_protocol_error() {
        let (client_end, server_end) = duplex(4096);
        let server = tokio::spawn(scripted_server(
            server_end,
            vec![Box::new(|_| {
                Response::new(status::NOT_FOUND).with_info("no such user")
            })],
        ));

        let mut conn = ServerConnection::from_stream(client_end);
        let err = conn
            .getwid(&"nobody".parse().unwrap(), &"example.com".parse().unwrap())
            .await
            .unwrap_err();
        match err {
            ClientError::Protocol(code, info) => {
                assert_eq!(code, status::NOT_FOUND);
                assert_eq!(info, "no such user");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn login_rejects_bad_challenge_echo() {
        let (client_end, server_end) = duplex(4096);
        let server = tokio::spawn(scripted_server(
            server_end,
            vec![Box::new(|_| {
                Response::new(status::CONTINUE).with("Response", "not-the-challenge")
            })],
        ));

        let epair = mg_crypto::EncryptionPair::generate().unwrap();
        let pubkey =
            mg_crypto::PublicEncryptionKey::from_cryptostring(epair.public_key().clone()).unwrap();
        let mut conn = ServerConnection::from_stream(client_end);
        let err = conn
            .login(&mg_keycard::RandomID::generate(), &pubkey)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Verification(_)));
        server.await.unwrap();
    }
}

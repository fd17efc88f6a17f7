//! WebSocket transport for instance consoles.
//!
//! Console endpoints are short-lived and served with certificates that do not
//! chain to a public root, so the TLS client accepts any server certificate.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt, future};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{Connector, connect_async_tls_with_config};

use super::{ConsoleError, ConsoleStream};

/// Accepts every server certificate and hostname while still checking
/// handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds a TLS client configuration with chain and hostname verification
/// disabled.
///
/// # Errors
///
/// Returns [`ConsoleError::Tls`] when the crypto provider rejects the default
/// protocol versions.
pub fn insecure_client_config() -> Result<ClientConfig, ConsoleError> {
    let provider = Arc::new(ring::default_provider());
    let verifier = AcceptAnyServerCert {
        provider: Arc::clone(&provider),
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| ConsoleError::Tls(err.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}

/// Connects to a console WebSocket and returns its text and binary frames as
/// raw bytes. Control frames are skipped.
///
/// [`ConsoleStream::close`] sends a Close frame on the same connection.
///
/// # Errors
///
/// Returns [`ConsoleError::Connect`] when the handshake fails and
/// [`ConsoleError::Tls`] when the TLS configuration cannot be built.
pub async fn connect(url: &str) -> Result<ConsoleStream, ConsoleError> {
    let connector = Connector::Rustls(Arc::new(insecure_client_config()?));
    let (socket, _response) = connect_async_tls_with_config(url, None, false, Some(connector))
        .await
        .map_err(|err| ConsoleError::Connect {
            url: url.to_owned(),
            message: err.to_string(),
        })?;

    tracing::debug!(url, "console connected");

    let (sink, messages) = socket.split();
    let frames = messages.filter_map(|message| future::ready(frame_bytes(message)));
    Ok(ConsoleStream::new(frames).with_close(move || close_socket(sink)))
}

/// Maps a received message to console bytes, or `None` for control frames.
fn frame_bytes(message: Result<Message, WsError>) -> Option<Result<Vec<u8>, ConsoleError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.into_bytes())),
        Ok(Message::Binary(bytes)) => Some(Ok(bytes)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_)) => None,
        Err(err) => Some(Err(ConsoleError::Transport(err.to_string()))),
    }
}

async fn close_socket<S>(mut sink: S) -> Result<(), ConsoleError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    sink.close()
        .await
        .map_err(|err| ConsoleError::Transport(err.to_string()))?;
    tracing::debug!("console closed");
    Ok(())
}

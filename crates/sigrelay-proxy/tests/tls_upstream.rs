//! HTTPS exchange against a loopback upstream with a self-signed certificate

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use sigrelay_core::{Allowlist, Error};
use sigrelay_proxy::{ClientConfig, HttpClient, Transport, UpstreamRequest};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

const CERT_PEM: &[u8] = include_bytes!("fixtures/upstream.crt");
const KEY_PEM: &[u8] = include_bytes!("fixtures/upstream.key");

fn acceptor() -> TlsAcceptor {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &CERT_PEM[..])
        .collect::<Result<_, _>>()
        .unwrap();
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &KEY_PEM[..])
        .unwrap()
        .unwrap();

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

/// Answers every request with `418` and echoes the request body back
async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = acceptor();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Verifying clients abort the handshake
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let service = hyper::service::service_fn(|req: Request<Incoming>| async move {
                    let body = req.into_body().collect().await.unwrap().to_bytes();
                    let mut response = Response::new(Full::new(body));
                    *response.status_mut() = StatusCode::IM_A_TEAPOT;
                    Ok::<_, Infallible>(response)
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), service)
                    .await;
            });
        }
    });

    addr
}

fn request_to(addr: SocketAddr) -> UpstreamRequest {
    let url = format!("https://127.0.0.1:{}/services/tsp/", addr.port());
    UpstreamRequest {
        method: Method::POST,
        destination: Allowlist::new(["127.0.0.1"]).admit(&url).unwrap(),
        headers: HeaderMap::new(),
        body: Bytes::from_static(b"tsq"),
    }
}

#[tokio::test]
async fn self_signed_upstream_is_trusted_by_hostname() {
    let addr = start_upstream().await;

    let client = HttpClient::new(ClientConfig {
        insecure_skip_verify: true,
        ..ClientConfig::default()
    })
    .unwrap();

    let response = client.send(request_to(addr)).await.unwrap();
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(response.body, Bytes::from_static(b"tsq"));
}

#[tokio::test]
async fn self_signed_upstream_fails_chain_verification() {
    let addr = start_upstream().await;

    let client = match HttpClient::new(ClientConfig {
        insecure_skip_verify: false,
        ..ClientConfig::default()
    }) {
        Ok(client) => client,
        // No system trust store on this host; nothing to verify against
        Err(Error::Config(_)) => return,
        Err(e) => panic!("unexpected error building client: {e}"),
    };

    let err = client.send(request_to(addr)).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamTls(_)), "{err:?}");
}

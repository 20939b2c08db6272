use crate::base::context::IoResultExt;
use crate::socket::stream::MaybeTlsStream;
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{
    BodyStream, Connection, IncomingResponse, Target, Transport, TransportError,
};
use boring::ssl::{SslConnector, SslMethod};
use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::{StreamExt, TryStreamExt};
use http::header::CONNECTION;
use http::{HeaderMap, Version};
use http_body_util::{BodyStream as FrameStream, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::io;
use tokio::net::TcpStream;
use tracing::debug;

/// Manages the connection process: DNS -> TCP -> TLS.
pub struct ConnectJob;

impl ConnectJob {
    pub async fn connect(target: &Target, tls: &TlsConfig) -> Result<MaybeTlsStream, TransportError> {
        // 1. DNS Resolution
        let addrs = tokio::net::lookup_host(target.authority())
            .await
            .dns_context(&target.host)?;

        // 2. TCP Connect, first address that answers wins
        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        let stream = match stream {
            Some(stream) => stream,
            None => {
                let err = last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
                });
                return Err::<MaybeTlsStream, _>(err).connection_context(&target.host, target.port);
            }
        };
        let _ = stream.set_nodelay(true);

        if !target.protocol.is_secure() {
            return Ok(MaybeTlsStream::Tcp(stream));
        }

        // 3. TLS Handshake
        let tls_error = |message: String| TransportError::Tls {
            host: target.host.clone(),
            message,
        };

        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|e| tls_error(e.to_string()))?;
        tls.apply_to_builder(&mut builder, &target.host)?;

        let connector = builder.build();
        let mut config = connector.configure().map_err(|e| tls_error(e.to_string()))?;
        if !TlsConfig::should_set_sni(&target.host) {
            config.set_use_server_name_indication(false);
        }
        if !tls.verify_peer {
            config.set_verify_hostname(false);
        }

        let tls_stream = tokio_boring::connect(config, &target.host, stream)
            .await
            .map_err(|e| tls_error(e.to_string()))?;

        Ok(MaybeTlsStream::Tls(tls_stream))
    }
}

/// HTTP/1.1 connection driven by hyper.
pub struct HttpConnection {
    sender: http1::SendRequest<Full<Bytes>>,
    keep_alive: bool,
}

impl HttpConnection {
    pub async fn handshake(stream: MaybeTlsStream) -> Result<Self, TransportError> {
        let tls = stream.is_tls();
        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, tls, "connection driver stopped");
            }
        });

        Ok(Self {
            sender,
            keep_alive: true,
        })
    }
}

fn wants_close(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}

impl Connection for HttpConnection {
    fn send(
        &mut self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'_, Result<IncomingResponse, TransportError>> {
        Box::pin(async move {
            self.sender.ready().await?;

            let request_close = wants_close(request.headers());
            let response = self.sender.send_request(request.map(Full::new)).await?;
            let (parts, body) = response.into_parts();

            self.keep_alive =
                !request_close && !wants_close(&parts.headers) && parts.version != Version::HTTP_10;

            let body: BodyStream = FrameStream::new(body)
                .try_filter_map(|frame| future::ready(Ok(frame.into_data().ok())))
                .map_err(TransportError::from)
                .boxed();

            Ok(IncomingResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }

    fn is_reusable(&self) -> bool {
        self.keep_alive && !self.sender.is_closed()
    }
}

/// Default transport: TCP or BoringSSL TLS by protocol, HTTP/1.1 on top.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    tls: TlsConfig,
}

impl HttpTransport {
    pub fn new(tls: TlsConfig) -> Self {
        Self { tls }
    }

    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }
}

impl Transport for HttpTransport {
    fn connect(
        &self,
        target: &Target,
    ) -> BoxFuture<'static, Result<Box<dyn Connection>, TransportError>> {
        let target = target.clone();
        let tls = self.tls.clone();
        Box::pin(async move {
            let stream = ConnectJob::connect(&target, &tls).await?;
            debug!(
                target = %target.authority(),
                peer = ?stream.tcp().peer_addr().ok(),
                tls = stream.is_tls(),
                "connected"
            );
            let connection = HttpConnection::handshake(stream).await?;
            Ok(Box::new(connection) as Box<dyn Connection>)
        })
    }
}

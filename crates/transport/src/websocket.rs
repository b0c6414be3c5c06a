//! WebSocket-Connector via tokio-tungstenite
//!
//! Bietet das Sub-Protokoll per `Sec-WebSocket-Protocol` an und trennt
//! den Stream in einen Writer- und einen Reader-Task.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::connector::{
    Connector, Link, LinkEvent, WireMessage, CLOSE_ABNORMAL, INBOUND_KAPAZITAET,
    OUTBOUND_KAPAZITAET,
};
use crate::error::{TransportError, TransportResult};

/// Close-Code wenn der Close-Frame keinen Status traegt
const CLOSE_OHNE_STATUS: u16 = 1005;

/// WebSocket-Implementierung des `Connector`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str, protocols: &[String]) -> TransportResult<Link> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::ConnectionError(format!("Ungueltige URL {url}: {e}")))?;
        if !protocols.is_empty() {
            let wert = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| TransportError::ConnectionError(e.to_string()))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", wert);
        }

        let (ws, antwort) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionError(e.to_string()))?;
        debug!(
            url,
            status = %antwort.status(),
            protokoll = ?antwort.headers().get("Sec-WebSocket-Protocol"),
            "WebSocket-Handshake abgeschlossen"
        );

        let (mut write, mut read) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(OUTBOUND_KAPAZITAET);
        let (in_tx, in_rx) = mpsc::channel::<LinkEvent>(INBOUND_KAPAZITAET);

        // Writer: Kanal -> Socket
        tokio::spawn(async move {
            while let Some(nachricht) = out_rx.recv().await {
                match nachricht {
                    WireMessage::Binary(bytes) => {
                        if let Err(e) = write.send(Message::Binary(bytes.to_vec())).await {
                            warn!(fehler = %e, "WebSocket-Senden fehlgeschlagen");
                            break;
                        }
                    }
                    WireMessage::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            debug!("WebSocket-Writer beendet");
        });

        // Reader: Socket -> Kanal
        tokio::spawn(async move {
            while let Some(nachricht) = read.next().await {
                let ereignis = match nachricht {
                    Ok(Message::Binary(data)) => LinkEvent::Frame(Bytes::from(data)),
                    Ok(Message::Text(text)) => LinkEvent::Text(text),
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((CLOSE_OHNE_STATUS, String::new()));
                        let _ = in_tx.send(LinkEvent::Closed { code, reason }).await;
                        return;
                    }
                    // Ping/Pong beantwortet tungstenite selbst
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(LinkEvent::Error(e.to_string())).await;
                        let _ = in_tx
                            .send(LinkEvent::Closed {
                                code: CLOSE_ABNORMAL,
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                };
                if in_tx.send(ereignis).await.is_err() {
                    return;
                }
            }
            let _ = in_tx
                .send(LinkEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: "Stream beendet".into(),
                })
                .await;
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

//! The production race service: HTTP for race data, WebSocket for pushes.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use bingo_protocol::{RacePush, RaceSnapshot};

use crate::{RaceConnection, RaceError, RaceService, RaceSocket, SocketCommand};

/// Where the race service lives and how the server authenticates to it.
#[derive(Debug, Clone, Default)]
pub struct HttpRaceConfig {
    /// Base URL for push sockets, e.g. `wss://racetime.gg`. The race's
    /// `websocket_bot_url` path is appended.
    pub socket_base: String,
    /// Bearer token for the bot socket.
    pub access_token: String,
}

/// [`RaceService`] backed by `reqwest` and `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct HttpRaceService {
    client: reqwest::Client,
    config: HttpRaceConfig,
}

impl HttpRaceService {
    pub fn new(config: HttpRaceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

impl RaceService for HttpRaceService {
    fn fetch_race(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<RaceSnapshot, RaceError>> {
        let client = self.client.clone();
        let url = format!("{}/data", url.trim_end_matches('/'));
        Box::pin(async move {
            let snapshot = client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<RaceSnapshot>()
                .await?;
            tracing::debug!(%url, version = snapshot.version, "fetched race data");
            Ok(snapshot)
        })
    }

    fn open_socket(
        &self,
        race: &RaceSnapshot,
    ) -> BoxFuture<'static, Result<RaceConnection, RaceError>> {
        let path = race.socket_url.clone();
        let base = self.config.socket_base.clone();
        let token = self.config.access_token.clone();
        Box::pin(async move {
            let path = path.ok_or(RaceError::NoSocketUrl)?;
            let url = format!("{}{}", base.trim_end_matches('/'), path);

            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| RaceError::Socket(e.to_string()))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RaceError::Socket(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);

            let (ws, _) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| RaceError::Socket(e.to_string()))?;
            tracing::info!(%url, "race socket connected");

            let (socket, commands) = RaceSocket::channel();
            let (push_tx, pushes) = mpsc::unbounded_channel();
            tokio::spawn(drive_socket(ws, commands, push_tx));
            Ok(RaceConnection { socket, pushes })
        })
    }
}

type RaceStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns one race socket: writes queued commands, answers probes with a
/// ping/pong round-trip, and forwards `race.data` pushes. Returns (and
/// thereby closes the push stream) when either side hangs up.
async fn drive_socket(
    ws: RaceStream,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    pushes: mpsc::UnboundedSender<RaceSnapshot>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut probes: Vec<oneshot::Sender<()>> = Vec::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SocketCommand::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!(error = %e, "race socket write failed");
                        break;
                    }
                }
                Some(SocketCommand::Probe(reply)) => {
                    if sink.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                    probes.push(reply);
                }
                Some(SocketCommand::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<RacePush>(text.as_str()) {
                        Ok(RacePush::RaceData { race }) => {
                            if pushes.send(race).is_err() {
                                break;
                            }
                        }
                        Ok(RacePush::Other) => {}
                        Err(e) => {
                            tracing::debug!(error = %e, "undecodable race push");
                        }
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    for reply in probes.drain(..) {
                        let _ = reply.send(());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "race socket read failed");
                    break;
                }
            },
        }
    }

    tracing::debug!("race socket driver stopped");
}

use crate::BrokerSession;
use crate::error::ApiError;
use crate::responses::{
    ActiveSymbol, ActiveSymbolsResponse, AuthorizeResponse, BuyResponse, DerivErrorBody,
    PortfolioResponse, ProposalResponse,
};
use async_trait::async_trait;
use chrono::DateTime;
use configuration::DerivSettings;
use core_types::{Direction, OpenPosition, OrderRequest, PlacedOrder};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

/// Active symbols are re-fetched after this long, since markets open and close.
const SYMBOL_CACHE_TTL: Duration = Duration::from_secs(300);

const DEFAULT_CURRENCY: &str = "USD";

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A session on the Deriv WebSocket JSON API.
///
/// Requests and replies are correlated by `req_id`: a background task owns the
/// socket, writes outgoing frames and hands each reply to the caller waiting on it.
pub struct DerivSession {
    settings: DerivSettings,
    token: String,
    link: Mutex<Option<Arc<Link>>>,
    next_req_id: AtomicU64,
    currency: Mutex<Option<String>>,
    symbols: tokio::sync::Mutex<Option<(Instant, Vec<ActiveSymbol>)>>,
}

/// One live socket. Dropping the last handle closes it.
struct Link {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingReplies,
    alive: Arc<AtomicBool>,
}

impl DerivSession {
    pub fn new(settings: DerivSettings, token: String) -> Self {
        Self {
            currency: Mutex::new(settings.currency.clone()),
            settings,
            token,
            link: Mutex::new(None),
            next_req_id: AtomicU64::new(1),
            symbols: tokio::sync::Mutex::new(None),
        }
    }

    fn endpoint(&self) -> Result<Url, ApiError> {
        Url::parse_with_params(
            &self.settings.endpoint,
            &[("app_id", self.settings.app_id.to_string())],
        )
        .map_err(|e| ApiError::Connection(format!("invalid endpoint: {e}")))
    }

    fn current_link(&self) -> Result<Arc<Link>, ApiError> {
        let guard = self.link.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(link) if link.alive.load(Ordering::SeqCst) => Ok(Arc::clone(link)),
            _ => Err(ApiError::NotConnected),
        }
    }

    fn replace_link(&self, link: Option<Arc<Link>>) {
        *self.link.lock().unwrap_or_else(|e| e.into_inner()) = link;
    }

    fn currency(&self) -> String {
        self.currency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }

    /// Sends one request and waits for the reply carrying the same `req_id`.
    async fn request(&self, mut payload: Value, what: &str) -> Result<Value, ApiError> {
        let link = self.current_link()?;
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        payload["req_id"] = json!(req_id);

        let (tx, rx) = oneshot::channel();
        link.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(req_id, tx);

        if link.outgoing.send(Message::text(payload.to_string())).is_err() {
            return Err(ApiError::NotConnected);
        }

        let reply = match tokio::time::timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(ApiError::Connection(format!(
                    "connection closed while waiting for '{what}'"
                )));
            }
            Err(_) => {
                link.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&req_id);
                return Err(ApiError::Timeout(what.to_string()));
            }
        };

        if let Some(error) = reply.get("error") {
            let body: DerivErrorBody = serde_json::from_value(error.clone())
                .map_err(|e| ApiError::Deserialization(e.to_string()))?;
            return Err(classify_error(body));
        }
        Ok(reply)
    }

    async fn call<T: DeserializeOwned>(&self, payload: Value, what: &str) -> Result<T, ApiError> {
        let reply = self.request(payload, what).await?;
        serde_json::from_value(reply)
            .map_err(|e| ApiError::Deserialization(format!("{what}: {e}")))
    }

    async fn active_symbols(&self) -> Result<Vec<ActiveSymbol>, ApiError> {
        let mut cache = self.symbols.lock().await;
        if let Some((fetched_at, symbols)) = cache.as_ref() {
            if fetched_at.elapsed() < SYMBOL_CACHE_TTL {
                return Ok(symbols.clone());
            }
        }
        let reply: ActiveSymbolsResponse = self
            .call(
                json!({"active_symbols": "brief", "product_type": "basic"}),
                "active_symbols",
            )
            .await?;
        *cache = Some((Instant::now(), reply.active_symbols.clone()));
        Ok(reply.active_symbols)
    }
}

#[async_trait]
impl BrokerSession for DerivSession {
    fn name(&self) -> &str {
        "deriv"
    }

    async fn connect(&self) -> Result<(), ApiError> {
        let url = self.endpoint()?;
        self.replace_link(None);

        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let pending: PendingReplies = Arc::default();
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_socket(
            ws_stream,
            outgoing_rx,
            Arc::clone(&pending),
            Arc::clone(&alive),
        ));
        self.replace_link(Some(Arc::new(Link {
            outgoing,
            pending,
            alive,
        })));
        *self.symbols.lock().await = None;

        let authorized: AuthorizeResponse = match self
            .call(json!({"authorize": self.token}), "authorize")
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.replace_link(None);
                return Err(match e {
                    ApiError::Broker { message, .. } => ApiError::Authorization(message),
                    other => other,
                });
            }
        };

        let mut currency = self.currency.lock().unwrap_or_else(|e| e.into_inner());
        if currency.is_none() && !authorized.authorize.currency.is_empty() {
            *currency = Some(authorized.authorize.currency.clone());
        }
        tracing::info!(
            account = %authorized.authorize.loginid,
            currency = ?currency.as_deref(),
            "Authorized with Deriv"
        );
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        if self.current_link().is_err() {
            return false;
        }
        self.request(json!({"ping": 1}), "ping").await.is_ok()
    }

    async fn list_open_positions(&self) -> Result<Vec<OpenPosition>, ApiError> {
        let reply: PortfolioResponse = self.call(json!({"portfolio": 1}), "portfolio").await?;
        let positions = reply
            .portfolio
            .contracts
            .into_iter()
            .filter_map(|contract| {
                let Ok(direction) = Direction::from_str(&contract.contract_type) else {
                    tracing::debug!(
                        contract_id = contract.contract_id,
                        contract_type = %contract.contract_type,
                        "Ignoring non-binary contract"
                    );
                    return None;
                };
                let duration_secs = u32::try_from(contract.expiry_time - contract.date_start)
                    .ok()
                    .filter(|d| *d > 0)?;
                let opened_at = DateTime::from_timestamp(contract.date_start, 0)?;
                Some(OpenPosition {
                    raw_id: contract.contract_id.to_string(),
                    asset: contract.symbol,
                    amount: contract.buy_price,
                    direction,
                    duration_secs,
                    opened_at,
                })
            })
            .collect();
        Ok(positions)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<PlacedOrder, ApiError> {
        let amount = decimal_to_f64(order.amount)?;
        let proposal: ProposalResponse = self
            .call(
                json!({
                    "proposal": 1,
                    "amount": amount,
                    "basis": "stake",
                    "contract_type": order.direction.as_str(),
                    "currency": self.currency(),
                    "duration": order.duration_secs,
                    "duration_unit": "s",
                    "symbol": order.asset,
                }),
                "proposal",
            )
            .await?;

        let price = decimal_to_f64(proposal.proposal.ask_price)?;
        let receipt: BuyResponse = self
            .call(json!({"buy": proposal.proposal.id, "price": price}), "buy")
            .await?;

        Ok(PlacedOrder {
            order_id: receipt.buy.contract_id.to_string(),
        })
    }

    async fn resolve_asset(&self, symbol: &str) -> Result<Option<String>, ApiError> {
        let symbols = self.active_symbols().await?;
        match match_symbol(&symbols, symbol) {
            Some(found) if found.is_tradeable() => Ok(Some(found.symbol.clone())),
            Some(found) => {
                tracing::debug!(symbol = %found.symbol, "Asset exists but market is closed");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn disconnect(&self) {
        self.replace_link(None);
    }
}

/// Finds `wanted` among the broker's symbols: exact, then `frx`-prefixed, then
/// as a substring of a native symbol.
fn match_symbol<'a>(symbols: &'a [ActiveSymbol], wanted: &str) -> Option<&'a ActiveSymbol> {
    let prefixed = format!("frx{wanted}");
    symbols
        .iter()
        .find(|s| s.symbol == wanted || s.symbol == prefixed)
        .or_else(|| symbols.iter().find(|s| s.symbol.contains(wanted)))
}

fn classify_error(body: DerivErrorBody) -> ApiError {
    match body.code.as_str() {
        "InvalidToken" | "AuthorizationRequired" => ApiError::Authorization(body.message),
        _ => ApiError::Broker {
            code: body.code,
            message: body.message,
        },
    }
}

fn decimal_to_f64(value: Decimal) -> Result<f64, ApiError> {
    value
        .to_f64()
        .ok_or_else(|| ApiError::InvalidData(format!("amount {value} out of range")))
}

/// Owns the socket until either side closes it.
async fn run_socket(
    ws_stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    pending: PendingReplies,
    alive: Arc<AtomicBool>,
) {
    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            out = outgoing.recv() => match out {
                Some(msg) => {
                    if let Err(e) = write.send(msg).await {
                        tracing::warn!(error = %e, "Deriv socket write failed");
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => route_reply(&pending, text.as_str()),
                Some(Ok(Message::Ping(data))) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Deriv closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Deriv socket error");
                    break;
                }
                None => break,
            },
        }
    }
    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every caller still waiting.
    pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
}

fn route_reply(pending: &PendingReplies, text: &str) {
    let reply: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable Deriv frame");
            return;
        }
    };
    let Some(req_id) = reply.get("req_id").and_then(Value::as_u64) else {
        tracing::debug!(msg_type = ?reply.get("msg_type"), "Deriv frame without req_id");
        return;
    };
    let waiter = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&req_id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => tracing::debug!(req_id, "Late Deriv reply dropped"),
    }
}

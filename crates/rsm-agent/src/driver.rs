//! Runs an [`AgentMachine`] over real WebSocket sessions.
//!
//! Connection attempts and resolutions happen in spawned tasks that report
//! back over a channel. Every task is tagged with a generation; once the
//! machine abandons a session its late events are dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Action, AgentError, AgentMachine, Event, MachineOptions, Resolve};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Upper bound on flushing a close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

enum Input {
    Opened(u64, WsSink),
    Event(u64, Event),
}

pub struct Agent {
    machine: AgentMachine,
    resolver: Arc<dyn Resolve>,
}

impl Agent {
    pub fn new(options: MachineOptions, resolver: Arc<dyn Resolve>) -> Self {
        Self {
            machine: AgentMachine::new(options),
            resolver,
        }
    }

    /// Keep the node registered until `shutdown` resolves. Returns early
    /// only when the session is lost and reconnection is disabled.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = Driver {
            machine: self.machine,
            resolver: self.resolver,
            tx,
            generation: 0,
            sink: None,
            session: None,
        };

        let actions = driver.machine.handle(Event::Start, std::time::Instant::now());
        driver.execute(actions).await;

        tokio::pin!(shutdown);
        loop {
            if driver.machine.is_idle() {
                tracing::info!("Session lost and reconnection disabled, stopping agent");
                break;
            }
            let deadline = driver.machine.next_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let actions = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutting down agent");
                    break;
                }
                Some(input) = rx.recv() => driver.accept(input),
                _ = timer => driver.machine.handle(Event::Tick, std::time::Instant::now()),
            };
            driver.execute(actions).await;
        }

        driver.close().await;
    }
}

struct Driver {
    machine: AgentMachine,
    resolver: Arc<dyn Resolve>,
    tx: mpsc::UnboundedSender<Input>,
    generation: u64,
    sink: Option<WsSink>,
    session: Option<JoinHandle<()>>,
}

impl Driver {
    fn accept(&mut self, input: Input) -> Vec<Action> {
        let now = std::time::Instant::now();
        match input {
            Input::Opened(gen, sink) if gen == self.generation => {
                self.sink = Some(sink);
                self.machine.handle(Event::Opened, now)
            }
            Input::Event(gen, event) if gen == self.generation => self.machine.handle(event, now),
            _ => Vec::new(),
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Resolve(name) => {
                    self.drop_session();
                    let gen = self.generation;
                    let resolver = Arc::clone(&self.resolver);
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let result = resolver.resolve(&name).await;
                        let _ = tx.send(Input::Event(gen, Event::Resolved(result)));
                    });
                }
                Action::Connect(url) => {
                    self.drop_session();
                    let gen = self.generation;
                    self.session = Some(tokio::spawn(session_task(url, gen, self.tx.clone())));
                }
                Action::Send(text) => {
                    if let Err(e) = self.send(Message::Text(text)).await {
                        tracing::error!(error = %e, "Error from ws");
                        queue.extend(self.machine.handle(Event::Closed, std::time::Instant::now()));
                    }
                }
                Action::Ping => {
                    if let Err(e) = self.send(Message::Ping(Vec::new())).await {
                        tracing::error!(error = %e, "Error from ws");
                        queue.extend(self.machine.handle(Event::Closed, std::time::Instant::now()));
                    }
                }
                Action::Close => self.close().await,
                Action::Terminate => self.drop_session(),
            }
        }
    }

    async fn send(&mut self, msg: Message) -> Result<(), AgentError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| AgentError::Transport("no open session".into()))?;
        sink.send(msg)
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await;
        }
        self.drop_session();
    }

    /// Forget the current session; anything it still reports is stale.
    fn drop_session(&mut self) {
        self.sink = None;
        if let Some(task) = self.session.take() {
            task.abort();
        }
        self.generation += 1;
    }
}

async fn session_task(url: String, gen: u64, tx: mpsc::UnboundedSender<Input>) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::error!(address = %url, error = %e, "Error from ws");
            let _ = tx.send(Input::Event(gen, Event::Closed));
            return;
        }
    };
    let (sink, mut stream) = ws.split();
    if tx.send(Input::Opened(gen, sink)).is_err() {
        return;
    }

    while let Some(msg) = stream.next().await {
        let event = match msg {
            Ok(Message::Text(text)) => Event::Frame(text),
            Ok(Message::Binary(bytes)) => Event::Frame(String::from_utf8_lossy(&bytes).into_owned()),
            Ok(Message::Pong(_)) => Event::Pong,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(address = %url, error = %e, "Error from ws");
                break;
            }
        };
        if tx.send(Input::Event(gen, event)).is_err() {
            return;
        }
    }
    let _ = tx.send(Input::Event(gen, Event::Closed));
}

//! An in-process broadcast bus that replays its whole history.
//!
//! Every message ever published is kept in an append-only log. A listener
//! that subscribes late is first fed the messages it missed, in publish
//! order, and then everything published afterwards. Delivery is one message
//! at a time: after each message the listener must [`Listener::respond`]
//! with `true` to keep receiving or `false` to unsubscribe.
//!
//! All mutation of the log and the listener list happens on a single tokio
//! task owned by the [`Broadcaster`]; publishers and subscribers only talk
//! to it through channels.

use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Pending publish/subscribe requests the loop has not picked up yet.
const REQUEST_QUEUE: usize = 1;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Broadcaster has not been started")]
    NotStarted,
    #[error("Broadcaster has been stopped")]
    Stopped,
}

/// A single published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// When the message was published.
    pub created: SystemTime,
    pub payload: String,
}

impl Message {
    fn new(payload: String) -> Self {
        Self {
            created: SystemTime::now(),
            payload,
        }
    }
}

enum Request {
    Publish(Message),
    Subscribe(Destination),
}

/// Owner of the bus loop. Lifecycle is `Created -> Running -> Stopped`;
/// a stopped broadcaster can't be restarted.
pub struct Broadcaster {
    lifecycle: Lifecycle,
}

enum Lifecycle {
    Created,
    Running {
        bus: Bus,
        quit: oneshot::Sender<()>,
        worker: JoinHandle<()>,
    },
    Stopped,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Create a new `Broadcaster`. Nothing runs until [`Broadcaster::start`].
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Created,
        }
    }

    /// Spawn the bus loop onto the current tokio runtime.
    ///
    /// Starting an already running broadcaster does nothing.
    pub fn start(&mut self) -> Result<(), Error> {
        match self.lifecycle {
            Lifecycle::Created => {
                let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
                let (quit_tx, quit_rx) = oneshot::channel();
                let worker = tokio::spawn(Hub::default().run(requests_rx, quit_rx));
                log::debug!("broadcaster started");
                self.lifecycle = Lifecycle::Running {
                    bus: Bus {
                        requests: requests_tx,
                    },
                    quit: quit_tx,
                    worker,
                };
                Ok(())
            }
            Lifecycle::Running { .. } => Ok(()),
            Lifecycle::Stopped => Err(Error::Stopped),
        }
    }

    /// Get a cloneable handle for publishing and subscribing.
    pub fn bus(&self) -> Result<Bus, Error> {
        match &self.lifecycle {
            Lifecycle::Created => Err(Error::NotStarted),
            Lifecycle::Running { bus, .. } => Ok(bus.clone()),
            Lifecycle::Stopped => Err(Error::Stopped),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running { .. })
    }

    /// Stop the bus loop and wait for it to exit.
    ///
    /// Every listener still subscribed has its delivery channel closed.
    /// Afterwards all `publish` and `subscribe` calls fail with [`Error::Stopped`].
    pub async fn stop(&mut self) {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running { quit, worker, .. } => {
                // the loop may already be gone if every sender was dropped:
                let _ = quit.send(());
                if let Err(e) = worker.await {
                    log::error!("broadcaster loop did not exit cleanly: {e}");
                }
                log::debug!("broadcaster stopped");
            }
            Lifecycle::Created | Lifecycle::Stopped => {}
        }
    }
}

/// Cloneable handle to a running bus.
#[derive(Clone)]
pub struct Bus {
    requests: mpsc::Sender<Request>,
}

impl Bus {
    /// Append `payload` to the log and deliver it to every active listener.
    ///
    /// Waits while the loop is busy delivering to a slow listener.
    pub async fn publish<S: Into<String>>(&self, payload: S) -> Result<(), Error> {
        let msg = Message::new(payload.into());
        self.requests
            .send(Request::Publish(msg))
            .await
            .map_err(|_| Error::Stopped)
    }

    /// Register a listener that will receive every message ever published,
    /// starting from the first one.
    pub async fn subscribe(&self) -> Result<Listener, Error> {
        let (delivery_tx, delivery_rx) = mpsc::channel(1);
        let (response_tx, response_rx) = mpsc::channel(1);
        let dest = Destination {
            next: 0,
            delivery: Some(delivery_tx),
            response: response_rx,
        };
        self.requests
            .send(Request::Subscribe(dest))
            .await
            .map_err(|_| Error::Stopped)?;
        Ok(Listener {
            delivery: delivery_rx,
            response: response_tx,
        })
    }
}

/// One subscription to the bus.
///
/// Call [`Listener::recv`] to get the next message, then [`Listener::respond`]
/// before calling `recv` again. `recv` returns `None` once the listener has
/// unsubscribed or the bus has stopped.
pub struct Listener {
    delivery: mpsc::Receiver<Message>,
    response: mpsc::Sender<bool>,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<Message> {
        self.delivery.recv().await
    }

    /// Acknowledge the last message: `true` to keep receiving,
    /// `false` to unsubscribe.
    pub async fn respond(&mut self, keep_going: bool) {
        if self.response.send(keep_going).await.is_err() {
            log::trace!("listener responded after the bus closed it");
        }
    }
}

/// The bus loop's view of a listener.
struct Destination {
    /// Index of the next log entry to deliver.
    next: usize,
    /// `None` once closed.
    delivery: Option<mpsc::Sender<Message>>,
    response: mpsc::Receiver<bool>,
}

impl Destination {
    fn is_open(&self) -> bool {
        self.delivery.is_some()
    }

    fn close(&mut self) {
        self.delivery = None;
    }

    /// Hand over one message and wait for the acknowledgment.
    /// A listener that was dropped counts as having said `false`.
    async fn deliver(&mut self, msg: Message) -> bool {
        let Some(delivery) = &self.delivery else {
            return false;
        };
        if delivery.send(msg).await.is_err() {
            return false;
        }
        self.response.recv().await.unwrap_or(false)
    }
}

enum Flow {
    Continue,
    Quit,
}

/// State owned by the bus loop.
#[derive(Default)]
struct Hub {
    history: Vec<Message>,
    destinations: Vec<Destination>,
}

impl Hub {
    async fn run(mut self, mut requests: mpsc::Receiver<Request>, mut quit: oneshot::Receiver<()>) {
        loop {
            let request = tokio::select! {
                biased;
                _ = &mut quit => break,
                request = requests.recv() => request,
            };
            match request {
                Some(Request::Publish(msg)) => {
                    log::trace!("bus: publish #{} '{}'", self.history.len(), msg.payload);
                    self.history.push(msg);
                }
                Some(Request::Subscribe(dest)) => {
                    log::trace!("bus: listener subscribed, {} active", self.destinations.len() + 1);
                    self.destinations.push(dest);
                }
                None => break,
            }
            if let Flow::Quit = self.fan_out(&mut quit).await {
                break;
            }
        }

        let open = self.destinations.iter().filter(|d| d.is_open()).count();
        log::debug!(
            "bus: shutting down with {} messages, closing {open} open listeners",
            self.history.len()
        );
        for dest in &mut self.destinations {
            dest.close();
        }
    }

    /// Bring every open listener up to date with the log, then forget the
    /// ones that have closed.
    async fn fan_out(&mut self, quit: &mut oneshot::Receiver<()>) -> Flow {
        let Hub {
            history,
            destinations,
        } = self;
        for dest in destinations.iter_mut() {
            while dest.is_open() && dest.next < history.len() {
                let msg = history[dest.next].clone();
                let delivered = tokio::select! {
                    biased;
                    _ = &mut *quit => None,
                    keep_going = dest.deliver(msg) => Some(keep_going),
                };
                match delivered {
                    None => return Flow::Quit,
                    Some(keep_going) => {
                        dest.next += 1;
                        if !keep_going {
                            log::trace!("bus: listener unsubscribed after {} messages", dest.next);
                            dest.close();
                        }
                    }
                }
            }
        }
        destinations.retain(Destination::is_open);
        Flow::Continue
    }
}

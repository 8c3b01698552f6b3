use std::{cell::RefCell, fmt, rc::Rc, time::Duration};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use crate::{error::PluginInitialisationError, visualiser::Visualiser};

/// Plugin-like message producer with no visual state.
pub trait DataSource: 'static {
    fn name(&self) -> &str;

    fn on_init(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        let _ = visualiser;
        Ok(())
    }

    /// Starts producing. Typically adds a task or a background worker.
    fn construct(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError>;
}

/// Callbacks registered on a data source. Clones share the same list, so
/// subscribers can be added after the source itself has been registered.
pub struct Subscribers<M> {
    callbacks: Rc<RefCell<Vec<Rc<dyn Fn(&M)>>>>,
}

impl<M> Clone for Subscribers<M> {
    fn clone(&self) -> Self {
        Self {
            callbacks: Rc::clone(&self.callbacks),
        }
    }
}

impl<M> Default for Subscribers<M> {
    fn default() -> Self {
        Self {
            callbacks: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<M> Subscribers<M> {
    pub fn add_callback(&self, callback: impl Fn(&M) + 'static) {
        self.callbacks.borrow_mut().push(Rc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    pub fn dispatch(&self, message: &M) {
        let snapshot: Vec<Rc<dyn Fn(&M)>> = self.callbacks.borrow().clone();
        for callback in snapshot {
            callback(message);
        }
    }
}

impl<M> fmt::Debug for Subscribers<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("callbacks", &self.len())
            .finish()
    }
}

/// Feeds a channel into its subscribers on the loop thread, in arrival order.
pub struct ChannelSource<M> {
    name: String,
    receiver: Option<UnboundedReceiver<M>>,
    subscribers: Subscribers<M>,
}

impl<M: 'static> ChannelSource<M> {
    pub fn new(name: impl Into<String>) -> (Self, UnboundedSender<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                receiver: Some(rx),
                subscribers: Subscribers::default(),
            },
            tx,
        )
    }

    pub fn subscribers(&self) -> Subscribers<M> {
        self.subscribers.clone()
    }
}

impl<M: 'static> DataSource for ChannelSource<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        let mut receiver = self.receiver.take().ok_or_else(|| {
            PluginInitialisationError::new(self.name.as_str(), "channel already consumed")
        })?;
        let subscribers = self.subscribers.clone();
        let shutdown = visualiser.shutdown();
        let name = self.name.clone();
        visualiser.add_task(async move {
            loop {
                tokio::select! {
                    message = receiver.recv() => match message {
                        Some(message) => {
                            trace!(source = %name, "dispatching message");
                            subscribers.dispatch(&message);
                        }
                        None => break,
                    },
                    _ = shutdown.closed() => break,
                }
            }
            debug!(source = %name, "channel source stopped");
        });
        Ok(())
    }
}

type Poll<M> = Box<dyn FnMut() -> Option<M> + Send>;

/// Polls a blocking producer on its own OS thread.
pub struct PollingSource<M> {
    name: String,
    interval: Duration,
    poll: Option<Poll<M>>,
    subscribers: Subscribers<M>,
}

impl<M: Send + 'static> PollingSource<M> {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        poll: impl FnMut() -> Option<M> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            poll: Some(Box::new(poll)),
            subscribers: Subscribers::default(),
        }
    }

    pub fn subscribers(&self) -> Subscribers<M> {
        self.subscribers.clone()
    }
}

impl<M: Send + 'static> DataSource for PollingSource<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        let poll = self.poll.take().ok_or_else(|| {
            PluginInitialisationError::new(self.name.as_str(), "poller already started")
        })?;
        let subscribers = self.subscribers.clone();
        visualiser
            .scheduler()
            .run_in_background_thread(&self.name, self.interval, poll, move |message: M| {
                subscribers.dispatch(&message)
            })
            .map_err(|err| PluginInitialisationError::new(self.name.as_str(), err.to_string()))
    }
}

use crate::connect::{connect, ConnectArgs, NatsConnection};
use crate::service::{add_service, Service};
use crate::types::{ConfigError, ServiceBuilder};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type TeardownFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Teardown = Box<dyn FnOnce() -> TeardownFuture + Send>;

/// A composable async scope: an ordered teardown stack joined to a
/// one-shot cancel flag.
///
/// Resources registered with the context are released in reverse order
/// of acquisition when `shutdown` runs, regardless of error or cancel.
/// OS signals can be mapped onto the cancel flag; handlers in flight are
/// never aborted mid-operation.
pub struct Context {
    connection: tokio::sync::OnceCell<NatsConnection>,
    cancel: watch::Sender<bool>,
    teardown: Mutex<Vec<Teardown>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            connection: tokio::sync::OnceCell::new(),
            cancel,
            teardown: Mutex::new(Vec::new()),
        }
    }

    /// Set the cancel flag.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether the context was cancelled.
    pub fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Block until the cancel flag is set.
    pub async fn wait(&self) {
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            return;
        }
        while cancelled.changed().await.is_ok() {
            if *cancelled.borrow() {
                return;
            }
        }
    }

    /// Run a future concurrently with `wait`; first completed wins.
    ///
    /// Returns `None` when the context is cancelled before the future
    /// completes. Cancellation is not an error.
    pub async fn wait_for<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            output = future => Some(output),
            _ = self.wait() => None,
        }
    }

    /// Map SIGINT and SIGTERM to the cancel flag.
    #[cfg(unix)]
    pub fn trap_signals(&self) -> std::io::Result<()> {
        use tokio::signal::unix::SignalKind;
        self.trap(&[SignalKind::interrupt(), SignalKind::terminate()])
    }

    /// Map the listed OS signals to the cancel flag.
    #[cfg(unix)]
    pub fn trap(&self, kinds: &[tokio::signal::unix::SignalKind]) -> std::io::Result<()> {
        for kind in kinds {
            let mut signal = tokio::signal::unix::signal(*kind)?;
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                if signal.recv().await.is_some() {
                    cancel.send_replace(true);
                }
            });
        }
        Ok(())
    }

    /// Register a teardown callback; callbacks run in reverse order.
    pub fn push_teardown<F, Fut>(&self, teardown: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.teardown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(move || Box::pin(teardown())));
    }

    /// Connect the transport client and register its drain for teardown.
    ///
    /// Does not error on cancel: when the context is cancelled while
    /// connecting, the attempt is abandoned and `Ok(())` is returned.
    pub async fn connect(&self, args: ConnectArgs) -> Result<(), async_nats::Error> {
        match self.wait_for(connect(args)).await {
            None => Ok(()),
            Some(Err(err)) => Err(err),
            Some(Ok(connection)) => {
                let handle = connection.clone();
                self.push_teardown(move || async move {
                    if let Err(err) = handle.close().await {
                        log::warn!("failed to drain NATS client during teardown: {err}");
                    }
                });
                let _ = self.connection.set(connection);
                Ok(())
            }
        }
    }

    /// The connected client, when `connect` has completed.
    pub fn client(&self) -> Option<async_nats::Client> {
        self.connection.get().map(|conn| conn.client.clone())
    }

    pub fn connection(&self) -> Option<&NatsConnection> {
        self.connection.get()
    }

    /// Install and start a service: the instance is wired to the
    /// transport event observer (reset on reconnect) and its `stop` is
    /// registered for teardown.
    pub async fn add_service(&self, builder: ServiceBuilder) -> Result<Service, async_nats::Error> {
        let connection = self.connection.get().ok_or(ConfigError::NotConnected)?;
        let service = add_service(connection.client.clone(), builder)?;
        service.start().await?;
        service.watch_events(connection.subscribe_events()).await;
        let handle = service.clone();
        self.push_teardown(move || async move {
            if let Err(err) = handle.stop().await {
                log::warn!("failed to stop service during teardown: {err}");
            }
        });
        Ok(service)
    }

    /// Run the teardown stack, most recently registered first.
    pub async fn shutdown(&self) {
        let teardown: Vec<Teardown> = {
            let mut stack = self.teardown.lock().unwrap_or_else(|e| e.into_inner());
            stack.drain(..).collect()
        };
        for callback in teardown.into_iter().rev() {
            callback().await;
        }
    }
}

/// Compose a whole program: trap signals, connect, run the setup, wait
/// for cancellation, then tear everything down in reverse order.
///
/// Returns `Ok(())` on a clean cancel.
pub async fn run<S, Fut>(args: ConnectArgs, setup: S) -> Result<(), async_nats::Error>
where
    S: FnOnce(Arc<Context>) -> Fut,
    Fut: Future<Output = Result<(), async_nats::Error>>,
{
    let context = Arc::new(Context::new());
    let result = run_inner(&context, args, setup).await;
    context.shutdown().await;
    result
}

async fn run_inner<S, Fut>(context: &Arc<Context>, args: ConnectArgs, setup: S) -> Result<(), async_nats::Error>
where
    S: FnOnce(Arc<Context>) -> Fut,
    Fut: Future<Output = Result<(), async_nats::Error>>,
{
    #[cfg(unix)]
    context.trap_signals()?;
    context.connect(args).await?;
    if context.cancelled() {
        return Ok(());
    }
    match context.wait_for(setup(context.clone())).await {
        Some(result) => result?,
        None => return Ok(()),
    }
    context.wait().await;
    Ok(())
}

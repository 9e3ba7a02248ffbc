//! `GameClient` builder and game operations.
//!
//! This is the entry point for embedding the werewolf client. It ties the
//! layers together: transport → session → routing → callbacks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use werewolf_protocol::{
    GameIdentity, Procedure, TopicPattern, selection_accepted, string_args, topic,
};
use werewolf_routing::{
    Callbacks, Dispatcher, DispatcherHandle, RouteContext, SubscriptionManager,
};
use werewolf_session::{SessionConfig, SessionGateway, SessionState, SubscriptionRecord};
use werewolf_transport::{Delivery, Transport};

use crate::WerewolfError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Router endpoint, realm and call timeout.
    pub session: SessionConfig,

    /// Also subscribe the whole `com.werewolf` namespace and log every
    /// event seen on it at `debug`. Nothing is routed from this
    /// subscription.
    ///
    /// Default: `true`.
    pub monitor_namespace: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            monitor_namespace: true,
        }
    }
}

/// Builder for a [`GameClient`].
///
/// # Example
///
/// ```rust
/// use werewolf::prelude::*;
///
/// let client = GameClientBuilder::new()
///     .realm("realm1")
///     .monitor_namespace(false)
///     .callbacks(Callbacks::new().on_role_affected(|role| println!("{role}")))
///     .build(LocalRouter::new("realm1"));
/// # drop(client);
/// ```
pub struct GameClientBuilder {
    config: ClientConfig,
    callbacks: Callbacks,
}

impl GameClientBuilder {
    /// Creates a builder with default settings and no callbacks.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            callbacks: Callbacks::new(),
        }
    }

    /// Sets the router endpoint.
    pub fn url(mut self, url: &str) -> Self {
        self.config.session.url = url.to_string();
        self
    }

    /// Sets the realm to join.
    pub fn realm(mut self, realm: &str) -> Self {
        self.config.session.realm = realm.to_string();
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.call_timeout = timeout;
        self
    }

    pub fn monitor_namespace(mut self, enabled: bool) -> Self {
        self.config.monitor_namespace = enabled;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the callbacks events are routed to.
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Builds a disconnected client over `transport`. No I/O happens here.
    pub fn build<T: Transport>(self, transport: T) -> GameClient<T> {
        let gateway = Arc::new(SessionGateway::new(transport, self.config.session.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = RouteContext {
            subscriptions: Arc::new(SubscriptionManager::new(Arc::clone(&gateway), tx)),
            gateway,
            callbacks: Arc::new(self.callbacks),
        };

        GameClient {
            ctx,
            config: self.config,
            identity: Mutex::new(None),
            tasks: Mutex::new(Tasks {
                deliveries: Some(rx),
                dispatcher: None,
                monitor: None,
            }),
        }
    }
}

impl Default for GameClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// GameClient
// ---------------------------------------------------------------------------

/// Background work owned by a connected client.
struct Tasks {
    /// Taken by the dispatcher on connect.
    deliveries: Option<mpsc::UnboundedReceiver<Delivery>>,
    dispatcher: Option<DispatcherHandle>,
    monitor: Option<(SubscriptionRecord, JoinHandle<()>)>,
}

/// A werewolf game client: one router session, one player.
///
/// All methods take `&self`; wrap the client in an `Arc` to share it
/// between tasks. Dropping the client stops its background tasks; only
/// [`close`](Self::close) also unsubscribes and ends the session.
pub struct GameClient<T: Transport> {
    ctx: RouteContext<T>,
    config: ClientConfig,
    identity: Mutex<Option<GameIdentity>>,
    tasks: Mutex<Tasks>,
}

impl<T: Transport> GameClient<T> {
    /// Opens the session and starts routing events.
    ///
    /// # Errors
    /// [`SessionError::Connection`](werewolf_session::SessionError::Connection)
    /// if the router is unreachable, after which the client is closed.
    pub async fn connect(&self) -> Result<(), WerewolfError> {
        self.ctx.gateway.connect().await?;

        let mut tasks = self.tasks.lock().await;
        if let Some(deliveries) = tasks.deliveries.take() {
            tasks.dispatcher = Some(Dispatcher::new(self.ctx.clone()).spawn(deliveries));
        }

        if self.config.monitor_namespace {
            let (tx, rx) = mpsc::unbounded_channel();
            match self.ctx.gateway.subscribe(&TopicPattern::namespace(), tx).await {
                Ok(record) => tasks.monitor = Some((record, tokio::spawn(monitor(rx)))),
                // The monitor only logs, so the client works without it.
                Err(e) => tracing::warn!(error = %e, "namespace monitor unavailable"),
            }
        }
        Ok(())
    }

    /// Creates `game` with `player` as its first member and subscribes to
    /// its events.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidSegment`](werewolf_protocol::ProtocolError::InvalidSegment)
    ///   for names containing `.`, before any I/O
    /// - the server's rejection, e.g. when the game already exists; no
    ///   subscription is made in that case
    pub async fn create_game(&self, game: &str, player: &str) -> Result<(), WerewolfError> {
        self.enter_game(Procedure::CreateGame, game, player).await
    }

    /// Joins an existing `game` as `player` and subscribes to its events.
    ///
    /// Same contract as [`create_game`](Self::create_game).
    pub async fn join_game(&self, game: &str, player: &str) -> Result<(), WerewolfError> {
        self.enter_game(Procedure::JoinGame, game, player).await
    }

    async fn enter_game(
        &self,
        procedure: Procedure,
        game: &str,
        player: &str,
    ) -> Result<(), WerewolfError> {
        topic::validate_segment("game", game)?;
        topic::validate_segment("player", player)?;

        self.ctx
            .gateway
            .call(&procedure.uri(), string_args([game, player]))
            .await?;
        *self.identity.lock().await = Some(GameIdentity::new(game, player));

        let added = self
            .ctx
            .subscriptions
            .ensure_game_subscriptions(game, player)
            .await?;
        tracing::info!(%game, %player, %procedure, added, "entered game");
        Ok(())
    }

    /// Asks the server to start `game`. Roles arrive later as events.
    pub async fn start_game(&self, game: &str) -> Result<(), WerewolfError> {
        topic::validate_segment("game", game)?;
        self.ctx
            .gateway
            .call(&Procedure::StartGame.uri(), string_args([game]))
            .await?;
        tracing::info!(%game, "game start requested");
        Ok(())
    }

    /// Votes for `target` on behalf of `player`.
    ///
    /// Returns whether the server accepted the vote. A refusal is
    /// `Ok(false)`, not an error.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidPayload`](werewolf_protocol::ProtocolError::InvalidPayload)
    /// if the server answers with something other than a boolean or `null`.
    pub async fn select_player(
        &self,
        game: &str,
        target: &str,
        player: &str,
    ) -> Result<bool, WerewolfError> {
        topic::validate_segment("game", game)?;
        let result = self
            .ctx
            .gateway
            .call(&Procedure::SelectPlayer.uri(), string_args([game, target, player]))
            .await?;
        let accepted = selection_accepted(&result)?;
        tracing::debug!(%game, %target, %player, accepted, "vote sent");
        Ok(accepted)
    }

    /// Stops receiving events for `game`. Purely local: the server is not
    /// told.
    ///
    /// Returns the number of subscriptions released.
    pub async fn leave_game(&self, game: &str) -> usize {
        let released = self.ctx.subscriptions.teardown(game).await;

        let mut identity = self.identity.lock().await;
        if identity.as_ref().is_some_and(|id| id.game_name == game) {
            *identity = None;
        }
        tracing::info!(%game, released, "left game");
        released
    }

    /// Releases every subscription, closes the session and stops the
    /// background tasks. Idempotent.
    pub async fn close(&self) {
        self.ctx.subscriptions.teardown_all().await;

        let mut tasks = self.tasks.lock().await;
        if let Some((record, task)) = tasks.monitor.take() {
            if let Err(e) = self.ctx.gateway.unsubscribe(&record).await {
                tracing::debug!(error = %e, "namespace monitor unsubscribe failed");
            }
            task.abort();
        }

        self.ctx.gateway.close().await;

        if let Some(dispatcher) = tasks.dispatcher.take() {
            dispatcher.shutdown().await;
        }
        self.identity.lock().await.take();
    }

    /// The game and player this client last created or joined.
    pub async fn identity(&self) -> Option<GameIdentity> {
        self.identity.lock().await.clone()
    }

    /// The session lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.ctx.gateway.state().await
    }

    /// The subscriptions the client currently holds.
    pub fn subscriptions(&self) -> &SubscriptionManager<T> {
        &self.ctx.subscriptions
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<T: Transport> Drop for GameClient<T> {
    fn drop(&mut self) {
        // The dispatcher stops with its handle; the monitor has no handle.
        if let Some((_, task)) = self.tasks.get_mut().monitor.take() {
            task.abort();
        }
    }
}

/// Logs every event seen on the namespace subscription.
async fn monitor(mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(Delivery { event, .. }) = deliveries.recv().await {
        tracing::debug!(topic = %event.topic, args = ?event.args, "namespace event");
    }
}

#[cfg(test)]
mod tests {
    use werewolf_transport::LocalRouter;

    use super::*;

    #[test]
    fn test_default_config_monitors_namespace() {
        let config = ClientConfig::default();
        assert!(config.monitor_namespace);
        assert_eq!(config.session.realm, "realm1");
    }

    #[test]
    fn test_builder_applies_settings() {
        let client = GameClientBuilder::new()
            .url("local://village")
            .realm("village")
            .call_timeout(Duration::from_secs(5))
            .monitor_namespace(false)
            .build(LocalRouter::new("village"));

        let config = client.config();
        assert_eq!(config.session.url, "local://village");
        assert_eq!(config.session.realm, "village");
        assert_eq!(config.session.call_timeout, Duration::from_secs(5));
        assert!(!config.monitor_namespace);
    }

    #[tokio::test]
    async fn test_new_client_is_disconnected_without_identity() {
        let client = GameClientBuilder::new().build(LocalRouter::new("realm1"));
        assert_eq!(client.state().await, SessionState::Disconnected);
        assert_eq!(client.identity().await, None);
    }
}

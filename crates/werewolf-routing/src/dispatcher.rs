//! The event dispatcher: turns deliveries into callback invocations.
//!
//! A single task drains the client's delivery channel, so events from all
//! subscriptions are routed one at a time, in the order the transport
//! handed them over. The only asynchronous follow-up an event can trigger
//! is the role hand-off after `start_game`, which runs on its own task
//! with an explicit [`RouteContext`] so the dispatcher never blocks on it.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use werewolf_protocol::{
    ClosePhaseEvent, EventKind, PhaseEvent, Player, Procedure, ProtocolError, RoleContext, Scope,
    assigned_role, first_arg, string_args, topic,
};
use werewolf_session::SessionGateway;
use werewolf_transport::{Delivery, InboundEvent, Transport};

use crate::{Callbacks, SubscriptionManager};

/// Everything routing needs, shared between the dispatcher and the tasks
/// it spawns.
pub struct RouteContext<T: Transport> {
    pub gateway: Arc<SessionGateway<T>>,
    pub subscriptions: Arc<SubscriptionManager<T>>,
    pub callbacks: Arc<Callbacks>,
}

// Manual impl: `T` itself need not be `Clone`.
impl<T: Transport> Clone for RouteContext<T> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            subscriptions: Arc::clone(&self.subscriptions),
            callbacks: Arc::clone(&self.callbacks),
        }
    }
}

/// Routes inbound events to the registered callbacks.
pub struct Dispatcher<T: Transport> {
    ctx: RouteContext<T>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(ctx: RouteContext<T>) -> Self {
        Self { ctx }
    }

    /// Spawns the dispatch loop onto the tokio runtime.
    ///
    /// The loop holds the subscription manager, which holds a sender of
    /// `deliveries`, so the channel alone never closes. The task stops when
    /// the returned handle is shut down or dropped.
    pub fn spawn(self, deliveries: mpsc::UnboundedReceiver<Delivery>) -> DispatcherHandle {
        let (stop, stopped) = oneshot::channel();
        DispatcherHandle {
            stop: Some(stop),
            task: tokio::spawn(self.run(deliveries, stopped)),
        }
    }

    /// Runs the dispatch loop on the current task until `stop` resolves,
    /// either by a send or by its sender being dropped.
    pub async fn run(
        self,
        mut deliveries: mpsc::UnboundedReceiver<Delivery>,
        mut stop: oneshot::Receiver<()>,
    ) {
        tracing::debug!("dispatcher started");
        loop {
            tokio::select! {
                _ = &mut stop => break,
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => self.handle(delivery).await,
                    None => break,
                },
            }
        }
        tracing::debug!("dispatcher stopped");
    }

    /// Routes one delivery, unless its subscription has been released.
    ///
    /// Undecodable events are logged and dropped; they never reach a
    /// callback and never stop the loop.
    pub async fn handle(&self, delivery: Delivery) {
        let Delivery { subscription, event } = delivery;
        if self.ctx.subscriptions.is_retired(subscription) {
            tracing::trace!(%subscription, topic = %event.topic, "released subscription, event dropped");
            return;
        }

        let topic = event.topic.clone();
        tracing::debug!(%topic, "event received");
        match self.route(event) {
            Ok(kind) => tracing::trace!(%topic, %kind, "event routed"),
            Err(ProtocolError::MalformedTopic(_)) => {
                tracing::debug!(%topic, "unrecognized topic, event dropped");
            }
            Err(e) => tracing::warn!(%topic, error = %e, "undecodable event dropped"),
        }
    }

    /// Classifies `event` by its topic and invokes the matching callbacks.
    ///
    /// A `start_game` event spawns the role hand-off and returns at once.
    ///
    /// # Errors
    /// [`ProtocolError`] if the topic is not one the client routes or the
    /// payload does not decode. No callback has run in that case.
    pub fn route(&self, event: InboundEvent) -> Result<EventKind, ProtocolError> {
        let routed = topic::classify(&event.topic)?;
        let callbacks = &self.ctx.callbacks;

        match routed.kind {
            EventKind::EnterInPhase => {
                let phase = PhaseEvent::parse(&event, &routed.phase)?;
                if let Some(change) = phase.change() {
                    callbacks.enter_in_phase(change);
                }
                if let Some(selectable) = phase.selectable {
                    callbacks.player_selectable(selectable, phase.active.unwrap_or_default());
                }
            }
            EventKind::SelectPlayer => {
                let player: Player = first_arg(&event)?;
                callbacks.selected_player(player);
            }
            EventKind::ClosePhase => {
                callbacks.close_phase(ClosePhaseEvent::parse(&event, &routed.phase)?);
            }
            EventKind::AddPlayer => {
                let players: Vec<Player> = first_arg(&event)?;
                callbacks.player_join(players);
            }
            EventKind::StartGame => {
                let Scope::User(player_name) = routed.scope else {
                    return Err(ProtocolError::MalformedTopic(event.topic));
                };
                let role = assigned_role(&event)?;
                topic::validate_segment("role", &role)?;
                let role = RoleContext {
                    game_name: routed.game,
                    player_name,
                    role,
                };
                tokio::spawn(assume_role(self.ctx.clone(), role));
            }
        }

        Ok(routed.kind)
    }
}

/// Owns a running dispatch loop. Dropping it stops the loop.
pub struct DispatcherHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stops the loop and waits for the event being routed, if any.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "dispatcher task failed");
        }
    }
}

/// Finishes a role assignment: tells the server where this player listens,
/// subscribes the role topics, then reports the role.
///
/// A failed `player_listen_topic` call stops here and only `on_error`
/// fires. A failed role subscription is reported through `on_error` but the
/// role is still announced, since the server has already assigned it.
async fn assume_role<T: Transport>(ctx: RouteContext<T>, assignment: RoleContext) {
    let RoleContext {
        game_name,
        player_name,
        role,
    } = assignment;

    let listen = ctx
        .gateway
        .call(
            &Procedure::PlayerListenTopic.uri(),
            string_args([game_name.as_str(), player_name.as_str()]),
        )
        .await;
    if let Err(e) = listen {
        tracing::warn!(game = %game_name, player = %player_name, error = %e, "role hand-off failed");
        ctx.callbacks.error(e);
        return;
    }

    if let Err(e) = ctx
        .subscriptions
        .ensure_role_subscriptions(&game_name, &role)
        .await
    {
        tracing::warn!(game = %game_name, %role, error = %e, "role subscriptions incomplete");
        ctx.callbacks.error(e);
    }

    tracing::info!(game = %game_name, player = %player_name, %role, "role assigned");
    ctx.callbacks.role_affected(role);
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use werewolf::prelude::*;
use werewolf::transport::Kwargs;

const GAME: &str = "millers_hollow";
const VILLAGERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

// ---------------------------------------------------------------------------
// Scripted server
// ---------------------------------------------------------------------------

struct Seat {
    name: String,
    role: &'static str,
    alive: bool,
}

#[derive(Default)]
struct Village {
    seats: Vec<Seat>,
    night: bool,
    votes: HashMap<String, u32>,
}

impl Village {
    fn seat(&self, name: &str) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.name == name)
    }

    fn player(&self, seat: &Seat) -> Value {
        json!({
            "name": seat.name,
            "state": if seat.alive { "alive" } else { "dead" },
            "selected": self.votes.get(&seat.name).copied().unwrap_or(0),
        })
    }

    fn players(&self, keep: impl Fn(&Seat) -> bool) -> Value {
        Value::Array(
            self.seats
                .iter()
                .filter(|seat| keep(seat))
                .map(|seat| self.player(seat))
                .collect(),
        )
    }

    fn winner(&self) -> Option<&'static str> {
        let wolves = self.seats.iter().filter(|s| s.alive && s.role == "wolf").count();
        let others = self.seats.iter().filter(|s| s.alive && s.role != "wolf").count();
        if wolves == 0 {
            Some("villagers")
        } else if wolves >= others {
            Some("wolves")
        } else {
            None
        }
    }
}

/// Plays the game server's part on the local router. The first player to
/// enter the game is the wolf.
#[derive(Clone)]
struct Server {
    router: LocalRouter,
    village: Arc<Mutex<Village>>,
}

fn arg(args: &[Value], index: usize) -> String {
    args.get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl Server {
    fn install(router: &LocalRouter) -> Self {
        let server = Self {
            router: router.clone(),
            village: Arc::default(),
        };

        let s = server.clone();
        router.register("com.werewolf.create_game", move |args| s.seat_player(args));
        let s = server.clone();
        router.register("com.werewolf.join_game", move |args| s.seat_player(args));

        let s = server.clone();
        router.register("com.werewolf.start_game", move |_| {
            let village = s.lock();
            for seat in &village.seats {
                s.publish(
                    &format!("user.{}.start_game", seat.name),
                    json!({"role": seat.role}),
                );
            }
            Ok(Value::Null)
        });

        let s = server.clone();
        router.register("com.werewolf.select_player", move |args| {
            let (target, voter) = (arg(&args, 1), arg(&args, 2));
            let mut village = s.lock();
            let voter_ok = village
                .seat(&voter)
                .is_some_and(|seat| seat.alive && (!village.night || seat.role == "wolf"));
            let target_ok = village.seat(&target).is_some_and(|seat| seat.alive);
            if !(voter_ok && target_ok) {
                return Ok(json!(false));
            }

            *village.votes.entry(target.clone()).or_default() += 1;
            if let Some(seat) = village.seat(&target) {
                s.publish("role.wolf.select_player", village.player(seat));
            }
            Ok(json!(true))
        });

        router.register("com.werewolf.player_listen_topic", |args| {
            tracing::debug!(?args, "player listening");
            Ok(Value::Null)
        });

        server
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Village> {
        self.village.lock().expect("village lock poisoned")
    }

    fn publish(&self, suffix: &str, payload: Value) {
        self.router.publish(
            &format!("com.werewolf.{GAME}.{suffix}"),
            vec![payload],
            Kwargs::new(),
        );
    }

    fn seat_player(&self, args: Vec<Value>) -> Result<Value, String> {
        let player = arg(&args, 1);
        let mut village = self.lock();
        if village.seat(&player).is_some() {
            return Err(format!("{player} is already seated"));
        }
        let role = if village.seats.is_empty() { "wolf" } else { "villager" };
        village.seats.push(Seat {
            name: player,
            role,
            alive: true,
        });
        self.publish("add_player", village.players(|_| true));
        Ok(Value::Null)
    }

    fn nightfall(&self) {
        let mut village = self.lock();
        village.night = true;
        village.votes.clear();
        self.publish("enter_in_phase.wolf", json!({"is_night": true}));
        self.publish(
            "role.wolf.enter_in_phase.wolf",
            json!({
                "selectable": village.players(|s| s.alive && s.role != "wolf"),
                "active": village.players(|s| s.alive && s.role == "wolf"),
            }),
        );
    }

    /// Kills the most-voted player and reports the outcome.
    fn dawn(&self) -> Option<&'static str> {
        let mut village = self.lock();
        let victim = village
            .votes
            .iter()
            .max_by_key(|(_, votes)| **votes)
            .map(|(name, _)| name.clone());

        if let Some(victim) = &victim {
            if let Some(seat) = village.seats.iter_mut().find(|s| &s.name == victim) {
                seat.alive = false;
            }
        }
        village.night = false;
        let winner = village.winner();

        self.publish(
            "close_phase.wolf",
            json!({"killed": victim, "resurrected": null, "winner": winner}),
        );
        if winner.is_none() {
            self.publish("enter_in_phase.day", json!({"is_night": false}));
        }
        winner
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

fn callbacks_for(player: &'static str) -> Callbacks {
    Callbacks::new()
        .on_player_join(move |players| {
            let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
            tracing::info!(%player, ?names, "players in the village");
        })
        .on_role_affected(move |role| tracing::info!(%player, %role, "role received"))
        .on_enter_in_phase(move |change| {
            tracing::info!(%player, phase = %change.phase, is_night = change.is_night, "phase started");
        })
        .on_player_selectable(move |selectable, active| {
            let targets: Vec<_> = selectable.iter().map(|p| p.name.as_str()).collect();
            let voters: Vec<_> = active.iter().map(|p| p.name.as_str()).collect();
            tracing::info!(%player, ?targets, ?voters, "vote open");
        })
        .on_selected_player(move |target| {
            tracing::info!(%player, target = %target.name, votes = target.selected, "vote cast");
        })
        .on_close_phase(move |event| {
            let killed: Vec<_> = event.killed.iter().map(|p| p.name.as_str()).collect();
            tracing::info!(%player, phase = %event.phase, ?killed, winner = ?event.winner, "phase closed");
        })
        .on_error(move |error| tracing::error!(%player, %error, "client error"))
}

/// Lets in-flight events reach every client.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let router = LocalRouter::new("realm1");
    let server = Server::install(&router);

    let mut clients = Vec::new();
    for (i, player) in VILLAGERS.into_iter().enumerate() {
        let client = GameClientBuilder::new()
            .realm("realm1")
            .monitor_namespace(i == 0)
            .callbacks(callbacks_for(player))
            .build(router.clone());
        client.connect().await?;
        if i == 0 {
            client.create_game(GAME, player).await?;
        } else {
            client.join_game(GAME, player).await?;
        }
        clients.push(client);
    }

    clients[0].start_game(GAME).await?;
    settle().await;

    // Alice holds the wolf seat; she eats one villager per night.
    for (night, target) in ["bob", "carol"].into_iter().enumerate() {
        tracing::info!(night = night + 1, "night falls");
        server.nightfall();
        settle().await;

        let accepted = clients[0].select_player(GAME, target, "alice").await?;
        let refused = clients[3].select_player(GAME, "alice", "dave").await?;
        tracing::info!(%target, accepted, villager_vote_accepted = refused, "votes sent");
        settle().await;

        if let Some(winner) = server.dawn() {
            settle().await;
            tracing::info!(%winner, "game over");
            break;
        }
        settle().await;
    }

    for client in &clients {
        client.leave_game(GAME).await;
        client.close().await;
    }
    Ok(())
}

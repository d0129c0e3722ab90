use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    code::{generate_code, generate_unique, is_valid, normalize},
    models::{Departure, GameImpact, Member, Room, RoomState},
    repository::RoomRepository,
    types::{JoinedRoom, VoteReceipt},
    views::{self, ControlsSnapshot, GameView, LobbyView, PlayerEntry, ResultsView},
};
use crate::config::RoomSettings;
use crate::event::{Broadcaster, Outbox, RoomEventKind, RoomMessage};
use crate::game::{Catalog, Phase, Progress, MIN_PLAYERS};
use crate::realtime::Subscription;
use crate::shared::AppError;

const ABORT_MESSAGE: &str = "Not enough players remaining (minimum 3 required)";

/// How a player is leaving
#[derive(Debug, Clone, PartialEq, Eq)]
enum Exit {
    /// Explicit leave, optionally naming the next host
    Leave { requested_host: Option<String> },
    /// Every real-time stream of the player closed and stayed closed
    Disconnect,
}

/// Every input action on a room.
///
/// Mutations go through `commit`: take the room's exclusive lock, mutate, render
/// the resulting notifications into an `Outbox`, release the lock, and only
/// then hand the outbox to the broadcaster.
pub struct RoomService {
    repository: Arc<dyn RoomRepository + Send + Sync>,
    broadcaster: Broadcaster,
    catalog: Arc<Catalog>,
    settings: RoomSettings,
}

impl RoomService {
    pub fn new(
        repository: Arc<dyn RoomRepository + Send + Sync>,
        broadcaster: Broadcaster,
        catalog: Arc<Catalog>,
        settings: RoomSettings,
    ) -> Self {
        Self {
            repository,
            broadcaster,
            catalog,
            settings,
        }
    }

    /// Looks a room up by code, accepting any case
    pub async fn find(&self, code: &str) -> Result<Arc<Room>, AppError> {
        let code = normalize(code);
        if !is_valid(&code) {
            return Err(AppError::NotFound(format!("Room {} not found", code)));
        }
        self.repository
            .get(&code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", code)))
    }

    async fn commit<T, F>(&self, room: &Arc<Room>, mutate: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut RoomState) -> Result<(T, Outbox), AppError>,
    {
        let (value, outbox) = room
            .transact(|state| {
                if state.closed {
                    return Err(AppError::NotFound(format!("Room {} not found", state.code)));
                }
                mutate(state)
            })
            .await?;

        if !outbox.is_empty() {
            self.broadcaster.flush(room, &self.repository, outbox).await;
        }
        Ok(value)
    }

    /// Creates a room with the caller as host.
    /// An existing session id is reused as the host's player id.
    #[instrument(skip(self))]
    pub async fn create_room(
        &self,
        host_name: &str,
        session: Option<String>,
    ) -> Result<JoinedRoom, AppError> {
        let name = validate_name(host_name)?;
        let player_id = session.unwrap_or_else(new_player_id);

        loop {
            let code = generate_unique(self.repository.as_ref(), || {
                generate_code(&mut rand::rng())
            })
            .await?;
            let room = Arc::new(Room::new(
                code.clone(),
                Member::new(player_id.clone(), name.clone()),
            ));

            if self.repository.insert_if_absent(room).await? {
                info!(room_code = %code, player_id = %player_id, "Room created");
                return Ok(JoinedRoom {
                    path: views::lobby_path(&code),
                    room_code: code,
                    player_id,
                });
            }
            debug!(room_code = %code, "Lost race for room code, retrying");
        }
    }

    /// Adds the caller to a room's lobby.
    ///
    /// A caller who is already a member gets the same answer again without any
    /// change; a caller with an unknown session id joins under that id.
    #[instrument(skip(self))]
    pub async fn join_room(
        &self,
        code: &str,
        name: &str,
        session: Option<String>,
    ) -> Result<JoinedRoom, AppError> {
        let room = self.find(code).await?;

        self.commit(&room, |state| {
            if let Some(id) = session.as_deref().filter(|id| state.is_member(id)) {
                debug!(room_code = %state.code, player_id = %id, "Player already in room");
                let joined = JoinedRoom {
                    room_code: state.code.clone(),
                    player_id: id.to_string(),
                    path: views::current_path(state),
                };
                return Ok((joined, Outbox::new()));
            }

            if state.has_active_game() {
                return Err(AppError::PreconditionFailed(
                    "Game already in progress".to_string(),
                ));
            }
            let name = validate_name(name)?;
            if state.name_taken(&name) {
                return Err(AppError::PreconditionFailed(format!(
                    "Name {} is already taken",
                    name
                )));
            }

            let player_id = session.unwrap_or_else(new_player_id);
            state.add_member(Member::new(player_id.clone(), name));
            info!(
                room_code = %state.code,
                player_id = %player_id,
                player_count = state.members.len(),
                "Player joined room"
            );

            let mut outbox = Outbox::new();
            lobby_refresh(&mut outbox, state);
            let joined = JoinedRoom {
                room_code: state.code.clone(),
                player_id,
                path: views::lobby_path(&state.code),
            };
            Ok((joined, outbox))
        })
        .await
    }

    /// Host only: deals a new game and sends everyone to the ready check
    #[instrument(skip(self))]
    pub async fn start_game(&self, code: &str, player_id: &str) -> Result<(), AppError> {
        let room = self.find(code).await?;

        self.commit(&room, |state| {
            require_host(state, player_id, "start the game")?;
            if state.has_active_game() {
                return Err(AppError::PreconditionFailed(
                    "Game already in progress".to_string(),
                ));
            }
            if state.members.len() < MIN_PLAYERS {
                return Err(AppError::PreconditionFailed(format!(
                    "Need at least {} players to start",
                    MIN_PLAYERS
                )));
            }

            let members: Vec<(String, String)> = state
                .members
                .values()
                .map(|m| (m.id.clone(), m.name.clone()))
                .collect();
            let game = self.catalog.deal(&members, &mut rand::rng())?;
            state.begin_game(game);
            info!(room_code = %state.code, players = members.len(), "Game started");

            let mut outbox = Outbox::new();
            outbox.all(
                RoomEventKind::NavRedirect,
                views::nav_redirect(&Phase::ReadyCheck.path(&state.code)),
            );
            controls_refresh(&mut outbox, state);
            Ok(((), outbox))
        })
        .await
    }

    /// Host only: discards the current game and returns everyone to the lobby
    #[instrument(skip(self))]
    pub async fn restart_game(&self, code: &str, player_id: &str) -> Result<(), AppError> {
        let room = self.find(code).await?;

        self.commit(&room, |state| {
            require_host(state, player_id, "restart the game")?;
            state.game = None;
            info!(room_code = %state.code, "Game cleared, back to lobby");

            let mut outbox = Outbox::new();
            outbox.all(
                RoomEventKind::NavRedirect,
                views::nav_redirect(&views::lobby_path(&state.code)),
            );
            lobby_refresh(&mut outbox, state);
            Ok(((), outbox))
        })
        .await
    }

    /// Host only: sends everyone home, ends every stream and deletes the room
    #[instrument(skip(self))]
    pub async fn close_room(&self, code: &str, player_id: &str) -> Result<(), AppError> {
        let room = self.find(code).await?;

        let subscribers = room
            .transact(|state| {
                if state.closed {
                    return Err(AppError::NotFound(format!("Room {} not found", state.code)));
                }
                require_host(state, player_id, "close the room")?;
                state.closed = true;
                state.game = None;
                Ok(state.take_subscribers())
            })
            .await?;

        self.repository.delete(room.code()).await?;
        info!(room_code = %room.code(), "Room closed");

        let home = RoomMessage::new(RoomEventKind::NavRedirect, views::nav_redirect("/"));
        self.broadcaster
            .deliver(room.code(), &subscribers, |_| home.clone())
            .await;
        Ok(())
    }

    /// Explicit leave. A leaving host may pick a successor from the members.
    #[instrument(skip(self))]
    pub async fn leave_room(
        &self,
        code: &str,
        player_id: &str,
        new_host_id: Option<String>,
    ) -> Result<Departure, AppError> {
        let room = self.find(code).await?;
        let exit = Exit::Leave {
            requested_host: new_host_id,
        };

        self.depart(&room, player_id, exit)
            .await?
            .ok_or_else(|| AppError::NotFound("Player is not in this room".to_string()))
    }

    /// Implicit leave for a player whose streams have all closed.
    /// Does nothing if the player reconnected in the meantime.
    #[instrument(skip(self))]
    pub async fn disconnect(
        &self,
        code: &str,
        player_id: &str,
    ) -> Result<Option<Departure>, AppError> {
        let room = self.find(code).await?;
        self.depart(&room, player_id, Exit::Disconnect).await
    }

    async fn depart(
        &self,
        room: &Arc<Room>,
        player_id: &str,
        exit: Exit,
    ) -> Result<Option<Departure>, AppError> {
        let delay = self.settings.abort_redirect_delay;

        let departure = self
            .commit(room, |state| {
                let requested_host = match exit {
                    Exit::Disconnect => {
                        if state.subscription_count(player_id) > 0 {
                            debug!(room_code = %state.code, player_id = %player_id, "Player reconnected, keeping them");
                            return Ok((None, Outbox::new()));
                        }
                        None
                    }
                    Exit::Leave { requested_host } => {
                        if let Some(next) = requested_host.as_deref() {
                            if !state.is_host(player_id) {
                                return Err(AppError::Forbidden(
                                    "Only the host can choose the next host".to_string(),
                                ));
                            }
                            if next == player_id || !state.is_member(next) {
                                return Err(AppError::PreconditionFailed(
                                    "Chosen host is not in this room".to_string(),
                                ));
                            }
                        }
                        requested_host
                    }
                };

                let Some(departure) =
                    state.remove_member(player_id, requested_host.as_deref(), &mut rand::rng())
                else {
                    return Ok((None, Outbox::new()));
                };

                let mut outbox = Outbox::new();
                if departure.emptied {
                    return Ok((Some(departure), outbox));
                }

                if let Some(host) = &departure.new_host {
                    info!(room_code = %state.code, new_host = %host, "Host reassigned");
                    outbox.to_player(host, RoomEventKind::HostChanged, views::host_changed(state));
                }
                lobby_refresh(&mut outbox, state);

                match &departure.game {
                    GameImpact::None => {}
                    GameImpact::SpyForfeited(_) => {
                        info!(room_code = %state.code, "Spy left, game forfeited");
                        outbox.all(
                            RoomEventKind::NavRedirect,
                            views::nav_redirect(&Phase::Finished.path(&state.code)),
                        );
                    }
                    GameImpact::Aborted => {
                        info!(room_code = %state.code, "Too few players, game aborted");
                        outbox
                            .all(RoomEventKind::ErrorMessage, views::message(ABORT_MESSAGE))
                            .after(
                                delay,
                                state.games_dealt,
                                RoomEventKind::NavRedirect,
                                views::nav_redirect(&views::lobby_path(&state.code)),
                            );
                    }
                    GameImpact::Progressed(progress) => progress_notices(&mut outbox, state, progress),
                }

                Ok((Some(departure), outbox))
            })
            .await?;

        if let Some(departure) = &departure {
            if departure.emptied {
                self.repository.delete(room.code()).await?;
                info!(room_code = %room.code(), "Last player left, room deleted");
            } else {
                info!(
                    room_code = %room.code(),
                    player_id = %departure.player.id,
                    "Player left room"
                );
            }
        }

        Ok(departure)
    }

    /// Flips the caller's readiness for the current phase.
    /// Returns the caller's new readiness.
    #[instrument(skip(self))]
    pub async fn toggle_ready(&self, code: &str, player_id: &str) -> Result<bool, AppError> {
        let room = self.find(code).await?;

        self.commit(&room, |state| {
            require_member(state, player_id)?;
            let game = state
                .game
                .as_mut()
                .ok_or_else(|| AppError::NotFound("No game in progress".to_string()))?;
            let ready = game.toggle_ready(player_id)?;

            let progress = state.advance_game(&mut rand::rng());
            debug!(room_code = %state.code, player_id = %player_id, ready, ?progress, "Readiness toggled");

            let mut outbox = Outbox::new();
            progress_notices(&mut outbox, state, &progress);
            Ok((ready, outbox))
        })
        .await
    }

    /// Records the caller's vote and resolves the round once everyone voted.
    /// The receipt is for the voter only and is not broadcast.
    #[instrument(skip(self))]
    pub async fn cast_vote(
        &self,
        code: &str,
        voter_id: &str,
        suspect_id: &str,
    ) -> Result<VoteReceipt, AppError> {
        let room = self.find(code).await?;

        self.commit(&room, |state| {
            let ids = state.member_ids();
            let game = state
                .game
                .as_mut()
                .ok_or_else(|| AppError::NotFound("No game in progress".to_string()))?;
            game.cast_vote(voter_id, suspect_id, &ids)?;
            let vote_round = game.vote_round();

            let receipt = VoteReceipt {
                suspect_id: suspect_id.to_string(),
                suspect_name: state.member_name(suspect_id).unwrap_or_default().to_string(),
                vote_round,
            };

            let progress = state.advance_game(&mut rand::rng());
            if let Progress::Finished(outcome) = &progress {
                info!(
                    room_code = %state.code,
                    innocents_won = outcome.innocents_won,
                    tied = outcome.tied,
                    "Voting finished"
                );
            }

            let mut outbox = Outbox::new();
            progress_notices(&mut outbox, state, &progress);
            Ok((receipt, outbox))
        })
        .await
    }

    /// Registers a real-time subscriber for a member of the room.
    ///
    /// The subscription starts with a snapshot rendered under the same lock that
    /// registered it, so nothing broadcast afterwards can be missed.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, code: &str, player_id: &str) -> Result<Subscription, AppError> {
        let room = self.find(code).await?;
        let (sender, receiver) = mpsc::channel(self.settings.subscriber_buffer);

        let (subscriber_id, initial) = room
            .transact(|state| {
                if state.closed {
                    return Err(AppError::NotFound(format!("Room {} not found", state.code)));
                }
                if !state.is_member(player_id) {
                    return Err(AppError::Forbidden(
                        "Only members can follow this room".to_string(),
                    ));
                }
                let (id, _) = state.add_subscriber(player_id.to_string(), sender);
                Ok((id, views::initial_messages(state, player_id)))
            })
            .await?;

        debug!(room_code = %room.code(), subscriber_id, "Subscriber registered");
        Ok(Subscription {
            room,
            subscriber_id,
            player_id: player_id.to_string(),
            initial,
            receiver,
        })
    }

    /// Unregisters a finished stream. If it was the player's last one and they
    /// stay away for the grace period, they are treated as having left.
    pub async fn end_subscription(&self, room: &Arc<Room>, subscriber_id: u64) {
        let Some(subscriber) = room.unsubscribe(subscriber_id).await else {
            return;
        };
        let player_id = subscriber.player_id;
        debug!(room_code = %room.code(), subscriber_id, player_id = %player_id, "Subscriber removed");

        if room.read().await.subscription_count(&player_id) > 0 {
            return;
        }

        tokio::time::sleep(self.settings.disconnect_grace).await;

        match self.repository.get(room.code()).await {
            Ok(Some(current)) if Arc::ptr_eq(&current, room) => {}
            Ok(_) => return,
            Err(e) => {
                warn!(room_code = %room.code(), error = %e, "Room lookup failed after disconnect");
                return;
            }
        }

        match self.depart(room, &player_id, Exit::Disconnect).await {
            Ok(Some(_)) => info!(room_code = %room.code(), player_id = %player_id, "Player disconnected"),
            Ok(None) => {}
            Err(AppError::NotFound(_)) => {}
            Err(e) => warn!(room_code = %room.code(), error = %e, "Disconnect cleanup failed"),
        }
    }

    pub async fn lobby_view(&self, code: &str, viewer: &str) -> Result<LobbyView, AppError> {
        let room = self.find(code).await?;
        let state = room.read().await;
        require_open_member(&state, viewer)?;
        Ok(views::lobby_view(&state, viewer))
    }

    pub async fn game_view(&self, code: &str, viewer: &str) -> Result<GameView, AppError> {
        let room = self.find(code).await?;
        let state = room.read().await;
        require_open_member(&state, viewer)?;
        views::game_view(&state, viewer)
            .ok_or_else(|| AppError::NotFound("No game in progress".to_string()))
    }

    pub async fn results_view(&self, code: &str, viewer: &str) -> Result<ResultsView, AppError> {
        let room = self.find(code).await?;
        let state = room.read().await;
        require_open_member(&state, viewer)?;
        views::results_view(&state)
            .ok_or_else(|| AppError::NotFound("No results available".to_string()))
    }

    /// Host only: everyone who could take over as host
    pub async fn host_candidates(
        &self,
        code: &str,
        viewer: &str,
    ) -> Result<Vec<PlayerEntry>, AppError> {
        let room = self.find(code).await?;
        let state = room.read().await;
        require_open_member(&state, viewer)?;
        require_host(&state, viewer, "choose the next host")?;

        Ok(views::players(&state)
            .into_iter()
            .filter(|p| p.id != viewer)
            .collect())
    }
}

fn new_player_id() -> String {
    Uuid::new_v4().to_string()
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::PreconditionFailed("Name is required".to_string()));
    }
    Ok(name.to_string())
}

fn require_member(state: &RoomState, player_id: &str) -> Result<(), AppError> {
    if !state.is_member(player_id) {
        return Err(AppError::Forbidden("Not a member of this room".to_string()));
    }
    Ok(())
}

fn require_open_member(state: &RoomState, player_id: &str) -> Result<(), AppError> {
    if state.closed {
        return Err(AppError::NotFound(format!("Room {} not found", state.code)));
    }
    require_member(state, player_id)
}

fn require_host(state: &RoomState, player_id: &str, action: &str) -> Result<(), AppError> {
    if !state.is_host(player_id) {
        return Err(AppError::Forbidden(format!("Only the host can {}", action)));
    }
    Ok(())
}

/// Per-viewer controls, rendered from a snapshot taken now
fn controls_refresh(outbox: &mut Outbox, state: &RoomState) {
    let snapshot = ControlsSnapshot::capture(state);
    outbox.personalized(RoomEventKind::ControlsUpdate, move |viewer| {
        views::controls_update(&snapshot, viewer)
    });
}

/// Membership, score table and controls
fn lobby_refresh(outbox: &mut Outbox, state: &RoomState) {
    outbox
        .all(RoomEventKind::PlayerUpdate, views::player_update(state))
        .all(RoomEventKind::ScoreUpdate, views::score_update(state));
    controls_refresh(outbox, state);
}

/// What clients need to hear after the advancement rule ran
fn progress_notices(outbox: &mut Outbox, state: &RoomState, progress: &Progress) {
    match progress {
        Progress::Unchanged => {
            if let Some(count) = views::phase_count(state) {
                outbox.all(count.event, count.data);
            }
        }
        Progress::Advanced { to, .. } => {
            outbox.all(
                RoomEventKind::NavRedirect,
                views::nav_redirect(&to.path(&state.code)),
            );
        }
        Progress::Revote { .. } => {
            if let Some(count) = views::phase_count(state) {
                outbox.all(count.event, count.data);
            }
            outbox.all(
                RoomEventKind::NavRedirect,
                views::nav_redirect(&Phase::Voting.path(&state.code)),
            );
        }
        Progress::Finished(_) => {
            outbox
                .all(RoomEventKind::ScoreUpdate, views::score_update(state))
                .all(
                    RoomEventKind::NavRedirect,
                    views::nav_redirect(&Phase::Finished.path(&state.code)),
                );
        }
    }
}

use std::{sync::Arc, time::Instant};

use serde_json::Value;
use time::OffsetDateTime;
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::{MissedTickBehavior, interval, interval_at, timeout},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    backend::DataBackend,
    config::{AppConfig, RoomTiming},
    dto::room::{PresenceSnapshot, PreviewSnapshot, RoomSnapshot, RunStatusLabel, TimerSnapshot},
    error::ServiceError,
    model::{
        chat::ChatMessage,
        event::EventRecord,
        presence::{self, PresenceRow},
        run_state::{RunMode, RunState},
        script::{Script, ScriptSection},
    },
    room::{countdown, prefs::JoinPrefs, timeline::ChatTimeline},
    state::run_machine::{PlanId, RunAction, RunPlanner},
    store::{chat::ChatLog, presence::PresenceTracker, run_state::RunStateStore},
    sync::{FeedEvent, SyncedMap},
};

/// Commands a client can send into its room session.
#[derive(Debug, Clone)]
pub enum RoomCommand {
    /// Manually join the room, setting the sticky preference.
    Join,
    /// Explicitly leave: delete the presence row and clear the sticky
    /// preference.
    Leave,
    /// Report whether the app is foregrounded; heartbeats pause while it
    /// is not.
    SetForeground(bool),
    /// Host-only run-state action.
    Host(RunAction),
    /// Preview a section locally without touching the shared timer.
    Preview(usize),
    /// Drop the local preview and follow the host's live section again.
    FollowHost,
    /// Send a chat message.
    SendMessage {
        /// Message body.
        body: String,
    },
    /// Send an energy gift.
    SendEnergy {
        /// Gift size.
        amount: u32,
    },
    /// Report the viewer's transcript scroll position.
    SetAtBottom(bool),
    /// Tear the session down (navigation away, not a leave).
    Close,
}

/// Result of one spawned run-state write, delivered back into the actor.
#[derive(Debug)]
pub struct TransitionOutcome {
    plan_id: PlanId,
    result: Result<RunState, ServiceError>,
}

/// Handle the gateway holds for one open room session.
///
/// Dropping every handle closes the command channel, which ends the actor
/// and with it every timer and subscription the session owns.
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::UnboundedSender<RoomCommand>,
    view: watch::Receiver<RoomSnapshot>,
    is_host: bool,
}

impl RoomHandle {
    /// Whether the session's viewer is the event host.
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Queue a command for the session.
    pub fn send(&self, command: RoomCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .map_err(|_| ServiceError::InvalidState("room session has closed".into()))
    }

    /// Latest published view model.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.view.borrow().clone()
    }

    /// Subscribe to view-model updates.
    pub fn watch(&self) -> watch::Receiver<RoomSnapshot> {
        self.view.clone()
    }

    /// Whether the underlying session has ended.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Subscriptions a session consumes, created alongside it so no write
/// between the initial fetches and the actor loop can be missed.
pub struct RoomFeeds {
    run_state: broadcast::Receiver<Value>,
    presence: broadcast::Receiver<FeedEvent<PresenceRow>>,
    chat: broadcast::Receiver<FeedEvent<ChatMessage>>,
    outcomes: mpsc::UnboundedReceiver<TransitionOutcome>,
}

/// Local estimate of server time.
///
/// Anchored to the backend's clock whenever the session fetches it;
/// between anchors, time advances on the local monotonic clock. Countdown
/// math only ever reads this, never the device's wall clock, so drift
/// between viewers' devices cannot desynchronize their timers.
struct ServerClock {
    anchor: OffsetDateTime,
    observed: Instant,
}

impl ServerClock {
    fn new(anchor: OffsetDateTime) -> Self {
        Self {
            anchor,
            observed: Instant::now(),
        }
    }

    fn sync(&mut self, server_now: OffsetDateTime) {
        self.anchor = server_now;
        self.observed = Instant::now();
    }

    fn now(&self) -> OffsetDateTime {
        self.anchor + self.observed.elapsed()
    }
}

/// Per-viewer orchestration for one event room.
///
/// Owns everything a single viewer's room screen needs: the last
/// confirmed run state, the presence set, the chat timeline, the local
/// preview, and the transition planner when the viewer is the host. All
/// mutation happens inside the actor loop; the outside world interacts
/// only through [`RoomCommand`]s and the published [`RoomSnapshot`].
pub struct RoomSession {
    event: EventRecord,
    user_id: Uuid,
    is_host: bool,
    timing: RoomTiming,
    chat_history_limit: usize,
    backend: Arc<dyn DataBackend>,
    run_store: RunStateStore,
    presence: PresenceTracker,
    chat: ChatLog,
    prefs: Arc<JoinPrefs>,
    degraded: watch::Receiver<bool>,
    script: Option<Script>,
    shared: RunState,
    clock: ServerClock,
    planner: RunPlanner,
    presence_rows: SyncedMap<PresenceRow>,
    timeline: ChatTimeline,
    joined: bool,
    foreground: bool,
    preview: Option<usize>,
    last_error: Option<String>,
    outcome_tx: mpsc::UnboundedSender<TransitionOutcome>,
}

impl RoomSession {
    /// Load everything a fresh session needs and wire its subscriptions.
    ///
    /// This is the one path where a backend failure is user-facing: a
    /// room that cannot complete its initial load does not open.
    pub async fn open(
        backend: Arc<dyn DataBackend>,
        prefs: Arc<JoinPrefs>,
        config: &AppConfig,
        degraded: watch::Receiver<bool>,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<(RoomSession, RoomFeeds), ServiceError> {
        let run_store = RunStateStore::new(backend.clone());
        let presence = PresenceTracker::new(backend.clone());
        let chat = ChatLog::new(backend.clone());

        let event = backend
            .fetch_event(event_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("event `{event_id}` not found")))?;

        let script = match event.script_id {
            Some(script_id) => backend
                .fetch_script(script_id)
                .await?
                .as_ref()
                .and_then(Script::normalize),
            None => None,
        };

        // Subscribe before the initial fetches so nothing written in
        // between is lost to the gap.
        let run_feed = run_store.subscribe(event_id);
        let presence_feed = presence.subscribe(event_id);
        let chat_feed = chat.subscribe(event_id);

        let shared = run_store.ensure(event_id).await?;
        let server_now = backend.server_time().await?;

        let mut presence_rows = SyncedMap::new();
        presence_rows.reconcile(presence.list(event_id).await?);

        let mut timeline = ChatTimeline::new(user_id);
        timeline.reconcile(chat.history(event_id, config.chat_history_limit).await?);

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let mut session = RoomSession {
            is_host: event.is_host(user_id),
            event,
            user_id,
            timing: config.timing,
            chat_history_limit: config.chat_history_limit,
            backend,
            run_store,
            presence,
            chat,
            prefs,
            degraded,
            script,
            shared,
            clock: ServerClock::new(server_now),
            planner: RunPlanner::new(),
            presence_rows,
            timeline,
            joined: false,
            foreground: true,
            preview: None,
            last_error: None,
            outcome_tx,
        };

        session.joined = session.own_presence().is_some();
        if !session.joined && session.prefs.should_auto_join(user_id, event_id) {
            session.join().await;
        }

        Ok((
            session,
            RoomFeeds {
                run_state: run_feed,
                presence: presence_feed,
                chat: chat_feed,
                outcomes: outcome_rx,
            },
        ))
    }

    fn sections(&self) -> &[ScriptSection] {
        self.script
            .as_ref()
            .map(|script| script.sections.as_slice())
            .unwrap_or(&[])
    }

    fn own_presence(&self) -> Option<&PresenceRow> {
        self.presence_rows.get(&(self.event.id, self.user_id))
    }

    /// Dispatch one client command.
    pub async fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join => self.join().await,
            RoomCommand::Leave => self.leave().await,
            RoomCommand::SetForeground(foreground) => self.foreground = foreground,
            RoomCommand::Host(action) => self.host_action(action),
            RoomCommand::Preview(index) => self.preview_section(index),
            RoomCommand::FollowHost => self.preview = None,
            RoomCommand::SendMessage { body } => self.send_message(body).await,
            RoomCommand::SendEnergy { amount } => self.send_energy(amount).await,
            RoomCommand::SetAtBottom(at_bottom) => self.timeline.set_at_bottom(at_bottom),
            // Close never reaches the session; the actor loop consumes it.
            RoomCommand::Close => {}
        }
    }

    async fn join(&mut self) {
        match self.presence.join(self.event.id, self.user_id).await {
            Ok(row) => {
                self.presence_rows.apply(FeedEvent::Update(row));
                self.prefs.set_sticky(self.user_id, self.event.id);
                self.joined = true;
                self.last_error = None;
            }
            Err(err) => {
                warn!(event_id = %self.event.id, error = %err, "join failed");
                self.last_error = Some(ServiceError::from(err).to_string());
            }
        }
    }

    async fn leave(&mut self) {
        match self.presence.leave(self.event.id, self.user_id).await {
            Ok(()) => {
                if let Some(row) = self.own_presence().cloned() {
                    self.presence_rows.apply(FeedEvent::Delete(row));
                }
                self.prefs.clear_sticky(self.user_id, self.event.id);
                self.joined = false;
                self.last_error = None;
            }
            Err(err) => {
                warn!(event_id = %self.event.id, error = %err, "leave failed");
                self.last_error = Some(ServiceError::from(err).to_string());
            }
        }
    }

    fn preview_section(&mut self, index: usize) {
        if index < self.sections().len() {
            self.preview = Some(index);
        } else {
            self.last_error = Some(format!("section {index} does not exist"));
        }
    }

    /// Plan a host transition and put its backend write in flight.
    ///
    /// The shared state is never mutated optimistically: the view keeps
    /// showing the last confirmed state until the write lands, and a
    /// failed write leaves that state untouched next to a local error.
    fn host_action(&mut self, action: RunAction) {
        if !self.is_host {
            self.last_error = Some("only the host can control the shared timer".into());
            return;
        }

        let sections = self.sections();
        let section_count = sections.len();
        let elapsed_sec = countdown::derive(&self.shared, sections, self.clock.now())
            .map(|countdown| countdown.elapsed_sec)
            .unwrap_or(0);

        let plan = match self
            .planner
            .plan(&self.shared, elapsed_sec, section_count, action)
        {
            Ok(plan) => plan,
            Err(err) => {
                self.last_error = Some(ServiceError::from(err).to_string());
                return;
            }
        };

        let store = self.run_store.clone();
        let event_id = self.event.id;
        let limit = self.timing.transition_timeout;
        let outcome_tx = self.outcome_tx.clone();
        let plan_id = plan.id;
        let write = plan.write;

        tokio::spawn(async move {
            let result = match timeout(limit, store.transition(event_id, write)).await {
                Ok(Ok(state)) => Ok(state),
                Ok(Err(err)) => Err(ServiceError::from(err)),
                Err(_) => Err(ServiceError::Timeout),
            };
            let _ = outcome_tx.send(TransitionOutcome { plan_id, result });
        });
    }

    /// Confirm or roll back the in-flight transition.
    pub fn on_transition_outcome(&mut self, outcome: TransitionOutcome) {
        match outcome.result {
            Ok(state) => {
                if let Err(err) = self.planner.apply(outcome.plan_id) {
                    warn!(event_id = %self.event.id, error = ?err, "stale transition outcome");
                    return;
                }
                if let Some(started_at) = state.started_at {
                    // The write stamped fresh server time; tighten the
                    // local anchor with it.
                    self.clock.sync(started_at);
                }
                self.shared = state;
                self.last_error = None;
            }
            Err(err) => {
                if let Err(abort_err) = self.planner.abort(outcome.plan_id) {
                    warn!(
                        event_id = %self.event.id,
                        error = ?abort_err,
                        "failed to abort transition after write error"
                    );
                }
                warn!(event_id = %self.event.id, error = %err, "run-state transition failed");
                self.last_error = Some(err.to_string());
            }
        }
    }

    /// Display tick: derive the current view and, on the host instance,
    /// fire auto-advance when the countdown crosses zero.
    ///
    /// The in-flight plan is the re-entrancy guard: ticks keep observing
    /// `seconds_left == 0` while the advance write round-trips, and every
    /// one of them is refused a second plan.
    pub fn on_display_tick(&mut self) {
        if !self.is_host
            || self.shared.mode != RunMode::Running
            || self.planner.pending().is_some()
        {
            return;
        }

        let zero = countdown::derive(&self.shared, self.sections(), self.clock.now())
            .is_some_and(|countdown| countdown.seconds_left == 0);
        if zero {
            self.host_action(RunAction::Advance);
        }
    }

    /// Heartbeat tick: refresh liveness while joined and foregrounded.
    pub async fn on_heartbeat_tick(&mut self) {
        if !self.joined || !self.foreground {
            return;
        }

        if let Err(err) = self.presence.heartbeat(self.event.id, self.user_id).await {
            // Transient by assumption; the next tick retries on its own.
            warn!(event_id = %self.event.id, error = %err, "heartbeat failed");
        }
    }

    async fn send_message(&mut self, body: String) {
        let message =
            ChatLog::compose_text(self.event.id, self.user_id, body, self.clock.now());
        self.timeline.insert_local(message.clone());
        if let Err(err) = self.chat.send(message).await {
            warn!(event_id = %self.event.id, error = %err, "message send failed");
            self.last_error = Some(ServiceError::from(err).to_string());
        } else {
            self.last_error = None;
        }
    }

    async fn send_energy(&mut self, amount: u32) {
        let gift =
            ChatLog::compose_energy(self.event.id, self.user_id, amount, self.clock.now());
        self.timeline.insert_local(gift.clone());
        if let Err(err) = self.chat.send(gift).await {
            warn!(event_id = %self.event.id, error = %err, "energy gift send failed");
            self.last_error = Some(ServiceError::from(err).to_string());
        } else {
            self.last_error = None;
        }
    }

    /// Apply a run-state document delivered by the change feed.
    pub fn on_run_feed(&mut self, raw: Value) {
        self.shared = RunState::normalize(&raw);
    }

    /// Apply one presence feed event.
    pub fn on_presence_feed(&mut self, event: FeedEvent<PresenceRow>) {
        if let FeedEvent::Delete(row) = &event {
            if row.user_id == self.user_id {
                // Someone (or another device) removed our row; stop
                // heartbeating until the viewer joins again.
                self.joined = false;
            }
        }
        self.presence_rows.apply(event);
    }

    /// Apply one chat feed event.
    pub fn on_chat_feed(&mut self, event: FeedEvent<ChatMessage>) {
        match event {
            FeedEvent::Insert(message) | FeedEvent::Update(message) => {
                self.timeline.insert(message);
            }
            // The message table is append-only; a delete event would be
            // moderation tooling outside this room's scope.
            FeedEvent::Delete(_) => {}
        }
    }

    /// Refetch the presence snapshot, healing missed feed events.
    pub async fn resync_presence(&mut self) {
        match self.presence.list(self.event.id).await {
            Ok(rows) => {
                self.presence_rows.reconcile(rows);
                self.joined = self.own_presence().is_some() && self.joined;
            }
            Err(err) => {
                warn!(event_id = %self.event.id, error = %err, "presence resync failed");
            }
        }
    }

    /// Refetch chat history, healing missed feed events.
    pub async fn resync_chat(&mut self) {
        match self
            .chat
            .history(self.event.id, self.chat_history_limit)
            .await
        {
            Ok(rows) => {
                self.timeline.reconcile(rows);
            }
            Err(err) => {
                warn!(event_id = %self.event.id, error = %err, "chat resync failed");
            }
        }
    }

    /// Refetch the run state and re-anchor the server clock.
    pub async fn resync_run_state(&mut self) {
        match self.backend.server_time().await {
            Ok(server_now) => self.clock.sync(server_now),
            Err(err) => {
                warn!(event_id = %self.event.id, error = %err, "server time resync failed");
            }
        }

        match self.run_store.fetch(self.event.id).await {
            Ok(Some(state)) => self.shared = state,
            Ok(None) => {}
            Err(err) => {
                warn!(event_id = %self.event.id, error = %err, "run-state resync failed");
            }
        }
    }

    fn run_status(&self) -> RunStatusLabel {
        if self.sections().is_empty() {
            return RunStatusLabel::NoScript;
        }
        match self.shared.mode {
            RunMode::Idle => RunStatusLabel::Waiting,
            RunMode::Running => RunStatusLabel::Live,
            RunMode::Paused => RunStatusLabel::Paused,
            RunMode::Ended => RunStatusLabel::Ended,
        }
    }

    /// Build the current view model.
    pub fn snapshot(&self) -> RoomSnapshot {
        let sections = self.sections();
        let now = self.clock.now();

        let timer = countdown::derive(&self.shared, sections, now).map(|countdown| {
            TimerSnapshot::from_countdown(
                &countdown,
                sections[countdown.section_index].name.clone(),
            )
        });

        let preview = self.preview.and_then(|index| {
            let section = sections.get(index)?;
            Some(PreviewSnapshot {
                section_index: index,
                name: section.name.clone(),
                duration_sec: section.duration_sec(),
                text: section.text.clone(),
            })
        });

        let partition =
            presence::partition(self.presence_rows.values(), now, self.timing.active_window);

        RoomSnapshot {
            event_id: self.event.id,
            title: self.event.title.clone(),
            is_host: self.is_host,
            is_joined: self.joined,
            foreground: self.foreground,
            degraded: *self.degraded.borrow(),
            run_status: self.run_status(),
            script: self.script.as_ref().map(Into::into),
            timer,
            preview,
            presence: PresenceSnapshot::from(&partition),
            messages: self.timeline.messages().iter().map(Into::into).collect(),
            unread_count: self.timeline.unread_count(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Spawn the session's actor loop and return the gateway handle.
pub fn spawn(session: RoomSession, feeds: RoomFeeds) -> RoomHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(session.snapshot());
    let handle = RoomHandle {
        commands: command_tx,
        view: view_rx,
        is_host: session.is_host,
    };

    tokio::spawn(run(session, command_rx, feeds, view_tx));
    handle
}

/// Actor loop: one task owns the session, its timers, and its feeds.
///
/// Every interval lives in this scope, so ending the loop tears all of
/// them down with it — reopening a room can never accumulate duplicate
/// timers, and no callback outlives the session.
async fn run(
    mut session: RoomSession,
    mut commands: mpsc::UnboundedReceiver<RoomCommand>,
    mut feeds: RoomFeeds,
    view_tx: watch::Sender<RoomSnapshot>,
) {
    let timing = session.timing;
    let mut display = interval(timing.display_tick);
    display.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut heartbeat = interval(timing.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let started = tokio::time::Instant::now();
    let mut presence_resync = interval_at(started + timing.presence_resync, timing.presence_resync);
    let mut chat_resync = interval_at(started + timing.chat_resync, timing.chat_resync);
    let mut run_resync = interval_at(started + timing.run_state_resync, timing.run_state_resync);

    let event_id = session.event.id;
    let user_id = session.user_id;
    info!(%event_id, %user_id, host = session.is_host, "room session opened");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(RoomCommand::Close) => break,
                Some(command) => session.handle_command(command).await,
            },
            outcome = feeds.outcomes.recv() => {
                if let Some(outcome) = outcome {
                    session.on_transition_outcome(outcome);
                }
            }
            _ = display.tick() => session.on_display_tick(),
            _ = heartbeat.tick() => session.on_heartbeat_tick().await,
            _ = presence_resync.tick() => session.resync_presence().await,
            _ = chat_resync.tick() => session.resync_chat().await,
            _ = run_resync.tick() => session.resync_run_state().await,
            raw = feeds.run_state.recv() => match raw {
                Ok(raw) => session.on_run_feed(raw),
                Err(reason) => {
                    warn!(%event_id, %reason, "run-state feed gap; resyncing");
                    session.resync_run_state().await;
                }
            },
            event = feeds.presence.recv() => match event {
                Ok(event) => session.on_presence_feed(event),
                Err(reason) => {
                    warn!(%event_id, %reason, "presence feed gap; resyncing");
                    session.resync_presence().await;
                }
            },
            event = feeds.chat.recv() => match event {
                Ok(event) => session.on_chat_feed(event),
                Err(reason) => {
                    warn!(%event_id, %reason, "chat feed gap; resyncing");
                    session.resync_chat().await;
                }
            },
        }

        let _ = view_tx.send(session.snapshot());
    }

    info!(%event_id, %user_id, "room session closed");
}

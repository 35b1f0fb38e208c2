//! One client's live view of a combat session.
//!
//! A [`SyncSession`] owns the client's [`SessionState`] and is the only way
//! to change it. Every user intent goes through the same steps:
//!
//! ```text
//! access gate → optimistic local apply → mark stale → store write (retried)
//!      ... store broadcast ...
//! sync()/next_change() → reconcile → follow-ups (events, re-fetch, auto-reveal)
//! ```
//!
//! Background work (debounced drag writes and the turn countdown) runs on
//! tokio tasks that share the inner half of the session through an `Arc`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, MAX_CELL_SIZE_PX, MIN_CELL_SIZE_PX, map_size_error};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::game::access::{Actor, Capability, authorize};
use crate::game::fog::FogPaint;
use crate::game::grid::{GridBounds, GridPos, WorldPos, to_grid_coord};
use crate::game::measure::{MeasurementSpan, MeasurementTool};
use crate::game::roster::{Role, Roster};
use crate::game::state::{EntityKey, SessionState};
use crate::game::tokens::{Token, TokenId};
use crate::game::turns::{CombatPhase, TurnChange, TurnDuration, TurnState};
use crate::sync::drag::DragStream;
use crate::sync::envelope::{ChangeEvent, FogChange, Mutation};
use crate::sync::events::EngineEvent;
use crate::sync::reconcile::{Followup, Reconciled, reconcile};
use crate::sync::retry::RetryPolicy;
use crate::sync::store::SessionStore;
use crate::sync::timer::TurnTimer;

/// What an intent did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Applied locally and persisted.
    Applied,
    /// Nothing to do (already in that state).
    Unchanged,
    /// The actor lacks the capability. Silent no-op.
    Ignored,
    /// A drag was released off the map and rolled back.
    Cancelled,
}

// ── Shared half ─────────────────────────────────────────────────────────

struct SessionInner {
    session_id: String,
    actor: Actor,
    config: EngineConfig,
    state: RwLock<SessionState>,
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<EngineEvent>,
    retry: RetryPolicy,
    timer: TurnTimer,
}

impl SessionInner {
    fn permit(&self, capability: Capability<'_>) -> bool {
        match authorize(&self.actor, capability) {
            Ok(()) => true,
            Err(e) => {
                e.log(&self.session_id);
                let _ = self.events.send(EngineEvent::Notice {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Persist a mutation that has already been applied locally.
    ///
    /// On a transient failure that outlives the retries the entity stays
    /// stale and `SyncFailed` is published. A write the store refuses
    /// outright means the local guess is wrong, so the entity is re-fetched.
    async fn commit(self: &Arc<Self>, mutation: Mutation) -> EngineResult<()> {
        let key = mutation.key();
        let envelope = mutation.to_envelope()?;
        self.state.write().await.stale.insert(key.clone());

        let written = self
            .retry
            .execute(|| self.store.write(&self.session_id, &self.actor.user_id, envelope.clone()))
            .await;

        match written {
            Ok(event) => {
                debug!("{} persisted {} as r{}", self.session_id, key, event.revision);
                Ok(())
            }
            Err(exhausted) => {
                let err = EngineError::from(exhausted);
                err.log(&format!("{} write {}", self.session_id, key));
                if err.kind() == ErrorKind::Sync {
                    self.emit(EngineEvent::SyncFailed {
                        entity: key.to_string(),
                        message: err.to_string(),
                    });
                } else if let Err(refetch_err) = self.refetch(&key).await {
                    refetch_err.log(&format!("{} re-fetch {}", self.session_id, key));
                }
                Err(err)
            }
        }
    }

    /// Replace one entity with the store's current value.
    async fn refetch(self: &Arc<Self>, key: &EntityKey) -> EngineResult<()> {
        let fetched = self
            .retry
            .execute(|| self.store.fetch(&self.session_id, key))
            .await?;
        let mutation = fetched.as_ref().map(Mutation::try_from).transpose()?;

        let turn = {
            let mut state = self.state.write().await;
            let bounds = state.bounds;
            let mut turn = None;
            match mutation {
                Some(Mutation::PlaceToken(token)) | Some(Mutation::UpdateToken(token)) => {
                    state
                        .confirmed
                        .positions
                        .insert(token.id.clone(), bounds.clamp(token.position));
                    state.tokens.upsert(token, bounds);
                }
                Some(Mutation::Fog(FogChange::Replace { grid })) if grid.bounds() == bounds => {
                    state.fog = grid;
                }
                Some(Mutation::Turn(t)) => {
                    state.confirmed.turn = t.clone();
                    state.turn = t.clone();
                    turn = Some(t);
                }
                Some(Mutation::Resize(new_bounds)) => {
                    if new_bounds != bounds {
                        state.resize(new_bounds);
                    }
                }
                Some(other) => {
                    return Err(EngineError::StateDesync(format!(
                        "re-fetch of {} returned {}",
                        key,
                        other.key()
                    )));
                }
                None => {
                    if let EntityKey::Token(id) = key {
                        state.tokens.remove(id).ok();
                        state.confirmed.positions.remove(id);
                    }
                }
            }
            state.stale.remove(key);
            turn
        };
        debug!("{} re-fetched {}", self.session_id, key);
        if let Some(turn) = turn {
            self.rearm_timer(&turn);
        }
        Ok(())
    }

    /// Apply a turn transition and persist it. Only the game master drives
    /// the tracker; anyone else is ignored.
    async fn transition_turn<F>(self: &Arc<Self>, apply: F) -> EngineResult<Outcome>
    where
        F: FnOnce(&mut TurnState, &Roster, DateTime<Utc>) -> EngineResult<Option<TurnChange>>,
    {
        if !self.permit(Capability::ControlTurns) {
            return Ok(Outcome::Ignored);
        }
        let turn = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            match apply(&mut state.turn, &state.roster, Utc::now())? {
                Some(change) => {
                    info!("{} turn: {:?} (round {})", self.session_id, change, state.turn.round);
                    state.turn.clone()
                }
                None => return Ok(Outcome::Unchanged),
            }
        };
        self.rearm_timer(&turn);
        self.commit(Mutation::Turn(turn)).await?;
        Ok(Outcome::Applied)
    }

    /// Keep the countdown in step with the turn state. Only the game
    /// master's client runs it, and only while combat is active.
    fn rearm_timer(self: &Arc<Self>, turn: &TurnState) {
        if !self.actor.is_gm() || turn.phase != CombatPhase::Active {
            self.timer.cancel();
            return;
        }
        let remaining = turn
            .remaining(Utc::now())
            .and_then(|d| d.to_std().ok())
            .unwrap_or_default();
        let epoch = turn.epoch;
        let inner = Arc::clone(self);
        self.timer.arm(epoch, remaining, async move {
            inner.expire_turn(epoch).await;
        });
    }

    async fn rearm_from_state(self: &Arc<Self>) {
        let turn = self.state.read().await.turn.clone();
        self.rearm_timer(&turn);
    }

    async fn expire_turn(self: Arc<Self>, epoch: u64) {
        if !self.timer.release(epoch) {
            return;
        }
        info!("{} turn timer expired (e{})", self.session_id, epoch);
        let result = self
            .transition_turn(|turn, _, now| {
                Ok(if turn.epoch == epoch {
                    turn.next_turn(now)
                } else {
                    None
                })
            })
            .await;
        if let Err(e) = result {
            e.log(&format!("{} turn expiry", self.session_id));
        }
    }

    /// Debounced drag write.
    async fn persist_position(self: Arc<Self>, token_id: TokenId, pos: GridPos) {
        let token = {
            let state = self.state.read().await;
            match state.tokens.get(&token_id) {
                Some(token) => Token {
                    position: pos,
                    ..token.clone()
                },
                None => return,
            }
        };
        debug!("{} drag write {} -> ({}, {})", self.session_id, token_id, pos.x, pos.y);
        // Failures were already logged and published by commit.
        let _ = self.commit(Mutation::UpdateToken(token)).await;
    }
}

// ── Client handle ───────────────────────────────────────────────────────

pub struct SyncSession {
    inner: Arc<SessionInner>,
    changes: broadcast::Receiver<ChangeEvent>,
    drag: Option<DragStream>,
    paint: Option<FogPaint>,
    measure: MeasurementTool,
    cell_size_px: f64,
}

impl SyncSession {
    /// Join a session: subscribe first, then load the snapshot, so no change
    /// can fall between the two.
    pub async fn join(
        session_id: impl Into<String>,
        actor: Actor,
        roster: Roster,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        let session_id = session_id.into();
        let changes = store.subscribe(&session_id)?;
        let retry = RetryPolicy::from(&config.sync);
        let snapshot = retry.execute(|| store.snapshot(&session_id)).await?;

        let mut state = SessionState::from(snapshot);
        state.roster = roster;
        info!(
            "{} joined {} as {:?} at r{}",
            actor.user_id, session_id, actor.role, state.revision
        );

        let (events, _) = broadcast::channel(config.sync.event_capacity);
        let measure = MeasurementTool::new(config.map.units_per_cell);
        let cell_size_px = config.map.cell_size_px;
        let inner = Arc::new(SessionInner {
            session_id,
            actor,
            config,
            state: RwLock::new(state),
            store,
            events,
            retry,
            timer: TurnTimer::new(),
        });
        inner.rearm_from_state().await;

        Ok(Self {
            inner,
            changes,
            drag: None,
            paint: None,
            measure,
            cell_size_px,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn actor(&self) -> &Actor {
        &self.inner.actor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Read the current state.
    pub async fn with_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.inner.state.read().await;
        f(&state)
    }

    pub async fn is_stale(&self, key: &EntityKey) -> bool {
        self.inner.state.read().await.is_stale(key)
    }

    /// Replace the roster supplied by the session service.
    pub async fn set_roster(&self, roster: Roster) {
        self.inner.state.write().await.roster = roster;
    }

    // ── Zoom ────────────────────────────────────────────────────────────

    pub fn cell_size_px(&self) -> f64 {
        self.cell_size_px
    }

    /// Set the local zoom, clamped to the supported cell sizes.
    pub fn set_zoom(&mut self, cell_size_px: f64) -> f64 {
        self.cell_size_px = cell_size_px.clamp(MIN_CELL_SIZE_PX, MAX_CELL_SIZE_PX);
        self.cell_size_px
    }

    pub fn to_grid(&self, world: WorldPos) -> GridPos {
        to_grid_coord(world, self.cell_size_px)
    }

    // ── Tokens ──────────────────────────────────────────────────────────

    async fn token(&self, id: &str) -> EngineResult<Token> {
        self.inner
            .state
            .read()
            .await
            .tokens
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownToken(id.to_string()))
    }

    pub async fn place_token(&mut self, token: Token) -> EngineResult<Outcome> {
        if !self.inner.permit(Capability::PlaceToken { owner: token.owner() }) {
            return Ok(Outcome::Ignored);
        }
        let placed = {
            let mut state = self.inner.state.write().await;
            let bounds = state.bounds;
            state.tokens.place(token, bounds)?.clone()
        };
        debug!("placed {} at ({}, {})", placed.id, placed.position.x, placed.position.y);
        self.inner.commit(Mutation::PlaceToken(placed)).await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    /// Move a token to `target`, clamping into the map.
    pub async fn move_token(&mut self, id: &str, target: GridPos) -> EngineResult<Outcome> {
        let token = self.token(id).await?;
        if !self.inner.permit(Capability::MoveToken { owner: token.owner() }) {
            return Ok(Outcome::Ignored);
        }
        let moved = {
            let mut state = self.inner.state.write().await;
            let bounds = state.bounds;
            let landed = state.tokens.move_to(id, target, bounds)?;
            Token {
                position: landed,
                ..token
            }
        };
        self.inner.commit(Mutation::UpdateToken(moved)).await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    pub async fn set_token_visible(&mut self, id: &str, visible: bool) -> EngineResult<Outcome> {
        let token = self.token(id).await?;
        if !self.inner.permit(Capability::SetTokenVisibility) {
            return Ok(Outcome::Ignored);
        }
        if token.visible == visible {
            return Ok(Outcome::Unchanged);
        }
        self.inner.state.write().await.tokens.set_visible(id, visible)?;
        self.inner
            .commit(Mutation::UpdateToken(Token { visible, ..token }))
            .await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    pub async fn remove_token(&mut self, id: &str) -> EngineResult<Outcome> {
        let token = self.token(id).await?;
        if !self.inner.permit(Capability::RemoveToken { owner: token.owner() }) {
            return Ok(Outcome::Ignored);
        }
        self.inner.state.write().await.tokens.remove(id)?;
        self.inner.commit(Mutation::RemoveToken(token.id)).await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    /// Tokens this client's actor may see.
    pub async fn list_visible(&self) -> Vec<Token> {
        let state = self.inner.state.read().await;
        state
            .tokens
            .list_visible(&self.inner.actor)
            .into_iter()
            .cloned()
            .collect()
    }

    // ── Drag ────────────────────────────────────────────────────────────

    /// Start dragging a token. Ticks update the local position immediately
    /// and persist only after the pointer rests for the debounce window.
    pub async fn begin_drag(&mut self, id: &str) -> EngineResult<Outcome> {
        if self.drag.is_some() {
            return Err(EngineError::Validation("a drag is already in progress".into()));
        }
        let token = self.token(id).await?;
        if !self.inner.permit(Capability::MoveToken { owner: token.owner() }) {
            return Ok(Outcome::Ignored);
        }
        let debounce = Duration::from_millis(self.inner.config.sync.debounce_ms);
        self.drag = Some(DragStream::new(token.id, token.position, debounce));
        Ok(Outcome::Applied)
    }

    pub async fn drag_to(&mut self, world: WorldPos) -> EngineResult<GridPos> {
        let target = self.to_grid(world);
        let Some(drag) = self.drag.as_mut() else {
            return Err(EngineError::Validation("no drag in progress".into()));
        };
        let landed = {
            let mut state = self.inner.state.write().await;
            let bounds = state.bounds;
            state.tokens.move_to(&drag.token_id, target, bounds)?
        };
        let inner = Arc::clone(&self.inner);
        let token_id = drag.token_id.clone();
        drag.tick(landed, move |pos| inner.persist_position(token_id, pos));
        Ok(landed)
    }

    /// Release the drag at `world`. Inside the map this writes the final
    /// position once; outside it rolls the token back to where it started.
    pub async fn end_drag(&mut self, world: WorldPos) -> EngineResult<Outcome> {
        let target = self.to_grid(world);
        let Some(drag) = self.drag.take() else {
            return Ok(Outcome::Unchanged);
        };
        let (token_id, origin) = (drag.token_id.clone(), drag.origin);
        let written = drag.finish();

        let (bounds, token) = {
            let state = self.inner.state.read().await;
            let token = state
                .tokens
                .get(&token_id)
                .cloned()
                .ok_or_else(|| EngineError::UnknownToken(token_id.clone()))?;
            (state.bounds, token)
        };

        if !bounds.contains(target) {
            info!("drag of {} released off the map - cancelled", token_id);
            self.inner
                .state
                .write()
                .await
                .tokens
                .move_to(&token_id, origin, bounds)?;
            if written.is_some_and(|p| p != origin) {
                self.inner
                    .commit(Mutation::UpdateToken(Token {
                        position: origin,
                        ..token
                    }))
                    .await?;
            }
            self.sync().await?;
            return Ok(Outcome::Cancelled);
        }

        let landed = self
            .inner
            .state
            .write()
            .await
            .tokens
            .move_to(&token_id, target, bounds)?;
        self.inner
            .commit(Mutation::UpdateToken(Token {
                position: landed,
                ..token
            }))
            .await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    pub fn dragging(&self) -> Option<&TokenId> {
        self.drag.as_ref().map(|d| &d.token_id)
    }

    // ── Fog ─────────────────────────────────────────────────────────────

    pub async fn toggle_fog_cell(&mut self, pos: GridPos, revealed: bool) -> EngineResult<Outcome> {
        if !self.inner.permit(Capability::EditFog) {
            return Ok(Outcome::Ignored);
        }
        let changed = self.inner.state.write().await.fog.toggle_cell(pos, revealed)?;
        if !changed {
            return Ok(Outcome::Unchanged);
        }
        self.commit_fog_cells(vec![pos], revealed).await
    }

    pub async fn reveal_radius(&mut self, center: GridPos, radius: u32) -> EngineResult<Outcome> {
        if !self.inner.permit(Capability::EditFog) {
            return Ok(Outcome::Ignored);
        }
        let cells = self.inner.state.write().await.fog.reveal_radius(center, radius);
        if cells.is_empty() {
            return Ok(Outcome::Unchanged);
        }
        self.commit_fog_cells(cells, true).await
    }

    pub async fn reveal_all(&mut self) -> EngineResult<Outcome> {
        self.set_all_fog(true).await
    }

    pub async fn hide_all(&mut self) -> EngineResult<Outcome> {
        self.set_all_fog(false).await
    }

    async fn set_all_fog(&mut self, revealed: bool) -> EngineResult<Outcome> {
        if !self.inner.permit(Capability::EditFog) {
            return Ok(Outcome::Ignored);
        }
        {
            let mut state = self.inner.state.write().await;
            if revealed {
                state.fog.reveal_all();
            } else {
                state.fog.hide_all();
            }
        }
        self.inner.commit(Mutation::Fog(FogChange::All { revealed })).await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    async fn commit_fog_cells(&mut self, cells: Vec<GridPos>, revealed: bool) -> EngineResult<Outcome> {
        self.inner
            .commit(Mutation::Fog(FogChange::Cells { cells, revealed }))
            .await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    /// Start a paint stroke that reveals (or hides) each cell the pointer
    /// passes over.
    pub fn begin_fog_paint(&mut self, reveal: bool) -> Outcome {
        if !self.inner.permit(Capability::EditFog) {
            return Outcome::Ignored;
        }
        self.paint = Some(FogPaint::new(reveal));
        Outcome::Applied
    }

    pub async fn paint_fog_at(&mut self, world: WorldPos) -> EngineResult<Outcome> {
        let pos = self.to_grid(world);
        let Some(paint) = self.paint.as_mut() else {
            return Ok(Outcome::Unchanged);
        };
        let reveal = paint.reveal;
        let painted = {
            let mut state = self.inner.state.write().await;
            paint.stroke(&mut state.fog, pos)
        };
        match painted {
            Some(cell) => self.commit_fog_cells(vec![cell], reveal).await,
            None => Ok(Outcome::Unchanged),
        }
    }

    pub fn end_fog_paint(&mut self) {
        self.paint = None;
    }

    /// Reveal around a moved player token. Runs on the game master's client
    /// only, so exactly one client issues the write.
    async fn auto_reveal(&mut self, owner: &str, position: GridPos) -> EngineResult<()> {
        let radius = self.inner.config.fog.auto_reveal_radius;
        if !self.inner.actor.is_gm() || radius == 0 {
            return Ok(());
        }
        let cells = {
            let mut state = self.inner.state.write().await;
            if state.roster.role_of(owner) != Some(Role::Player) {
                return Ok(());
            }
            state.fog.reveal_radius(position, radius)
        };
        if cells.is_empty() {
            return Ok(());
        }
        debug!("auto-reveal {} cells around ({}, {})", cells.len(), position.x, position.y);
        self.inner
            .commit(Mutation::Fog(FogChange::Cells { cells, revealed: true }))
            .await
    }

    // ── Map ─────────────────────────────────────────────────────────────

    /// Resize the map. Fog resets to hidden and tokens are pulled inside.
    pub async fn resize_map(&mut self, bounds: GridBounds) -> EngineResult<Outcome> {
        if !self.inner.permit(Capability::ResizeMap) {
            return Ok(Outcome::Ignored);
        }
        if let Some(reason) = map_size_error(bounds) {
            return Err(EngineError::Validation(reason));
        }
        {
            let mut state = self.inner.state.write().await;
            if state.bounds == bounds {
                return Ok(Outcome::Unchanged);
            }
            state.resize(bounds);
        }
        info!("{} map resized to {}x{}", self.inner.session_id, bounds.width, bounds.height);
        self.inner.commit(Mutation::Resize(bounds)).await?;
        self.sync().await?;
        Ok(Outcome::Applied)
    }

    // ── Turns ───────────────────────────────────────────────────────────

    pub async fn start_combat(&mut self) -> EngineResult<Outcome> {
        let outcome = self
            .inner
            .transition_turn(|turn, roster, now| turn.start_combat(roster, now))
            .await?;
        self.sync().await?;
        Ok(outcome)
    }

    pub async fn next_turn(&mut self) -> EngineResult<Outcome> {
        let outcome = self
            .inner
            .transition_turn(|turn, _, now| Ok(turn.next_turn(now)))
            .await?;
        self.sync().await?;
        Ok(outcome)
    }

    pub async fn pause_combat(&mut self) -> EngineResult<Outcome> {
        let outcome = self.inner.transition_turn(|turn, _, _| Ok(turn.pause())).await?;
        self.sync().await?;
        Ok(outcome)
    }

    pub async fn resume_combat(&mut self) -> EngineResult<Outcome> {
        let outcome = self
            .inner
            .transition_turn(|turn, _, now| Ok(turn.resume(now)))
            .await?;
        self.sync().await?;
        Ok(outcome)
    }

    pub async fn end_combat(&mut self) -> EngineResult<Outcome> {
        let outcome = self.inner.transition_turn(|turn, _, _| Ok(turn.end_combat())).await?;
        self.sync().await?;
        Ok(outcome)
    }

    /// Set the turn length in seconds (30, 60, 120 or 300).
    pub async fn set_turn_duration(&mut self, seconds: u64) -> EngineResult<Outcome> {
        let duration = TurnDuration::try_from(seconds)?;
        let outcome = self
            .inner
            .transition_turn(|turn, _, _| Ok(turn.set_duration(duration)))
            .await?;
        self.sync().await?;
        Ok(outcome)
    }

    /// Countdown for the current turn, recomputed from the wall clock.
    pub async fn turn_remaining(&self) -> Option<ChronoDuration> {
        self.inner.state.read().await.turn.remaining(Utc::now())
    }

    // ── Measurement ─────────────────────────────────────────────────────

    /// Feed a ruler click. Returns the span once two points are set.
    pub fn measure_click(&mut self, world: WorldPos) -> Option<MeasurementSpan> {
        let pos = self.to_grid(world);
        self.measure.click(pos)
    }

    pub fn measure_clear(&mut self) {
        self.measure.deactivate();
    }

    pub fn measurement(&self) -> &MeasurementTool {
        &self.measure
    }

    // ── Reconciliation ──────────────────────────────────────────────────

    /// Reconcile every broadcast that has already arrived. Returns how many
    /// were processed.
    pub async fn sync(&mut self) -> EngineResult<usize> {
        let mut processed = 0;
        loop {
            match self.changes.try_recv() {
                Ok(event) => {
                    self.apply_change(event).await?;
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("{} missed {} changes - resyncing", self.inner.session_id, missed);
                    self.refresh().await?;
                }
                Err(TryRecvError::Closed) => {
                    warn!("{} change feed closed - reconnecting", self.inner.session_id);
                    self.reconnect().await?;
                    break;
                }
            }
        }
        if processed > 0 {
            self.inner.rearm_from_state().await;
        }
        Ok(processed)
    }

    /// Wait for the next broadcast and reconcile it.
    pub async fn next_change(&mut self) -> EngineResult<()> {
        match self.changes.recv().await {
            Ok(event) => {
                self.apply_change(event).await?;
                self.inner.rearm_from_state().await;
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("{} missed {} changes - resyncing", self.inner.session_id, missed);
                self.refresh().await?;
            }
            Err(RecvError::Closed) => {
                warn!("{} change feed closed - reconnecting", self.inner.session_id);
                self.reconnect().await?;
            }
        }
        Ok(())
    }

    async fn apply_change(&mut self, event: ChangeEvent) -> EngineResult<()> {
        let followups = {
            let mut guard = self.inner.state.write().await;
            let current = std::mem::replace(&mut *guard, SessionState::new(GridBounds::new(0, 0)));
            let Reconciled { mut state, followups } = reconcile(current, &event);
            // The local drag position wins until the drag ends.
            if let Some(drag) = &self.drag {
                let bounds = state.bounds;
                state.tokens.move_to(&drag.token_id, drag.current, bounds).ok();
            }
            *guard = state;
            followups
        };

        for followup in followups {
            match followup {
                Followup::Emit(event) => self.inner.emit(event),
                Followup::Refetch(key) => {
                    if let Err(e) = self.inner.refetch(&key).await {
                        e.log(&format!("{} re-fetch {}", self.inner.session_id, key));
                        self.inner.state.write().await.stale.insert(key);
                    }
                }
                Followup::Resync => self.refresh().await?,
                Followup::AutoReveal { owner, position, .. } => {
                    if let Err(e) = self.auto_reveal(&owner, position).await {
                        e.log(&format!("{} auto-reveal", self.inner.session_id));
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace local state with the store's full snapshot. Also the manual
    /// recovery after a `SyncFailed`.
    pub async fn refresh(&mut self) -> EngineResult<()> {
        let inner = &self.inner;
        let snapshot = inner
            .retry
            .execute(|| inner.store.snapshot(&inner.session_id))
            .await?;
        let revision = snapshot.revision;
        {
            let mut state = inner.state.write().await;
            state.restore(snapshot);
            if let Some(drag) = &self.drag {
                let bounds = state.bounds;
                state.tokens.move_to(&drag.token_id, drag.current, bounds).ok();
            }
        }
        info!("{} resynced at r{}", inner.session_id, revision);
        inner.emit(EngineEvent::Resynced { revision });
        inner.rearm_from_state().await;
        Ok(())
    }

    /// Re-subscribe to the change feed and re-fetch everything.
    pub async fn reconnect(&mut self) -> EngineResult<()> {
        self.changes = self.inner.store.subscribe(&self.inner.session_id)?;
        self.refresh().await
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.inner.timer.cancel();
    }
}

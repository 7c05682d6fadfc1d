//! Tick scheduler: the fixed-rate loop that owns the match session
//!
//! One task owns the [`MatchSession`]. Each period it drains transport
//! events and local commands, records and broadcasts the local swing, then
//! simulates every tick whose inputs are complete, oldest first. Nothing
//! else touches the session, so a step is never interleaved with input.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::net::{
    join_with_retry, ChannelEvent, ControlMsg, DataChannel, OfflineChannel, PeerMessage, TickMsg,
    TransportError,
};
use crate::util::time::{tick_period, unix_millis, TickKey};

use super::engine::{RulesEngine, TickReport};
use super::mailbox::Recorded;
use super::render::{RenderBridge, RenderSink};
use super::session::MatchSession;
use super::swing::PoseSource;
use super::{Mode, PlayerId};

/// Requests from the local UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    Ready(bool),
    SetMode(Mode),
    Shutdown,
}

/// Handle to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    pub local_id: PlayerId,
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub async fn set_ready(&self, ready: bool) -> Result<(), TransportError> {
        self.send(SchedulerCommand::Ready(ready)).await
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<(), TransportError> {
        self.send(SchedulerCommand::SetMode(mode)).await
    }

    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.send(SchedulerCommand::Shutdown).await
    }

    async fn send(&self, command: SchedulerCommand) -> Result<(), TransportError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

pub struct TickScheduler {
    session: MatchSession,
    channel: Box<dyn DataChannel>,
    events: mpsc::Receiver<ChannelEvent>,
    events_open: bool,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    pose: Box<dyn PoseSource>,
    bridge: RenderBridge,
}

impl TickScheduler {
    pub fn new(
        config: SessionConfig,
        channel: Box<dyn DataChannel>,
        events: mpsc::Receiver<ChannelEvent>,
        pose: Box<dyn PoseSource>,
        sink: Box<dyn RenderSink>,
    ) -> (Self, SchedulerHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let local_id = channel.local_id().clone();

        let handle = SchedulerHandle {
            local_id: local_id.clone(),
            command_tx,
        };

        let scheduler = Self {
            session: MatchSession::new(local_id, config),
            channel,
            events,
            events_open: true,
            command_rx,
            pose,
            bridge: RenderBridge::new(sink),
        };

        (scheduler, handle)
    }

    pub fn session(&self) -> &MatchSession {
        &self.session
    }

    /// Run until shutdown is requested or every handle is dropped
    pub async fn run(mut self) {
        info!(
            player_id = %self.session.local_id(),
            tick_rate = self.session.config().tick_rate,
            "Tick scheduler started"
        );

        let mut tick_interval = interval(tick_period(self.session.config().tick_rate));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let now_ms = unix_millis();

            self.process_events(now_ms);
            if !self.process_commands(now_ms) {
                break;
            }
            self.on_period(now_ms);
        }

        info!(player_id = %self.session.local_id(), "Tick scheduler stopped");
    }

    /// One timer period. Returns the reports of the ticks simulated.
    pub fn on_period(&mut self, now_ms: u64) -> Vec<TickReport> {
        let rate = self.session.config().tick_rate;
        let Some(tick) = TickKey::from_millis(now_ms, rate) else {
            warn!(now_ms, "Local clock out of tick range, skipping period");
            return Vec::new();
        };

        let pose = self.pose.latest();
        let sample = self.session.extractor_mut().extract(pose.as_ref(), now_ms);
        let local_id = self.session.local_id().clone();
        if self.session.record_input(tick, local_id.clone(), sample) != Recorded::Late {
            self.broadcast(PeerMessage::Tick(TickMsg {
                t: tick.boundary_millis(rate),
                id: local_id,
                swing: sample,
            }));
        }

        let mut reports = Vec::new();
        for ready in self.session.ready_ticks() {
            let Some(inputs) = self.session.take_ready(ready) else {
                continue;
            };
            match RulesEngine::simulate(&mut self.session, ready, &inputs) {
                Ok(report) => {
                    self.bridge.present(&self.session, &report, now_ms);
                    reports.push(report);
                }
                Err(e) => warn!(tick = %ready, error = %e, "Tick faulted, keeping last good state"),
            }
            self.session.mailbox_mut().evict(ready.prev());
        }
        reports
    }

    /// Drain all queued transport events
    pub fn process_events(&mut self, now_ms: u64) {
        while self.events_open {
            match self.events.try_recv() {
                Ok(event) => self.on_event(event, now_ms),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Transport event stream closed");
                    self.events_open = false;
                }
            }
        }
    }

    /// Drain local commands. Returns false once the loop should stop.
    pub fn process_commands(&mut self, now_ms: u64) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(SchedulerCommand::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Ok(command) => self.apply_command(command, now_ms),
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    pub fn apply_command(&mut self, command: SchedulerCommand, now_ms: u64) {
        match command {
            SchedulerCommand::Ready(ready) => {
                let id = self.session.local_id().clone();
                self.session.set_ready(&id, ready);
                self.broadcast(ControlMsg::Ready { id, ready }.into());
                self.maybe_auto_start(now_ms);
            }
            SchedulerCommand::SetMode(mode) => {
                self.session.set_mode(mode);
                self.broadcast(ControlMsg::Mode { mode }.into());
                self.maybe_auto_start(now_ms);
            }
            SchedulerCommand::Shutdown => {}
        }
    }

    pub fn on_event(&mut self, event: ChannelEvent, now_ms: u64) {
        match event {
            ChannelEvent::Joined(id) => {
                self.session.player_joined(id);
                self.maybe_auto_start(now_ms);
            }
            ChannelEvent::Left(id) => {
                self.session.player_left(&id);
            }
            ChannelEvent::Updated(id) => {
                debug!(player_id = %id, "Participant updated");
                if self.session.player_joined(id) {
                    self.maybe_auto_start(now_ms);
                }
            }
            ChannelEvent::Message { from, payload } => match PeerMessage::decode(&payload) {
                Ok(msg) => self.on_peer_message(msg, now_ms),
                Err(e) => warn!(from = %from, error = %e, "Dropping malformed peer message"),
            },
        }
    }

    fn on_peer_message(&mut self, msg: PeerMessage, now_ms: u64) {
        match msg {
            PeerMessage::Tick(TickMsg { t, id, swing }) => {
                if !swing.is_usable() {
                    warn!(player_id = %id, "Dropping non-finite swing sample");
                    return;
                }
                let rate = self.session.config().tick_rate;
                let (Some(tick), Some(now)) =
                    (TickKey::from_millis(t, rate), TickKey::from_millis(now_ms, rate))
                else {
                    warn!(player_id = %id, t, "Dropping tick message with out-of-range timestamp");
                    return;
                };
                self.session.record_peer_input(now, tick, id, swing);
            }
            PeerMessage::Control(ControlMsg::Ready { id, ready }) => {
                self.session.set_ready(&id, ready);
                self.maybe_auto_start(now_ms);
            }
            PeerMessage::Control(ControlMsg::Start) => {
                if self.session.start() {
                    self.bridge.on_game_start(now_ms);
                }
            }
            PeerMessage::Control(ControlMsg::Mode { mode }) => {
                self.session.set_mode(mode);
                self.maybe_auto_start(now_ms);
            }
        }
    }

    fn maybe_auto_start(&mut self, now_ms: u64) {
        if !self.session.should_auto_start() {
            return;
        }
        self.broadcast(ControlMsg::Start.into());
        if self.session.start() {
            self.bridge.on_game_start(now_ms);
        }
    }

    fn broadcast(&self, msg: PeerMessage) {
        let payload = match msg.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound message");
                return;
            }
        };
        if let Err(e) = self.channel.send(payload) {
            warn!(error = %e, "Broadcast failed");
        }
    }
}

/// Join the data channel with retries, falling back to offline play.
///
/// Offline play keeps `fallback_id` as the local player and has no peers.
pub async fn connect<C, F, Fut>(
    connect: F,
    config: &SessionConfig,
    fallback_id: PlayerId,
) -> (Box<dyn DataChannel>, mpsc::Receiver<ChannelEvent>)
where
    C: DataChannel + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(C, mpsc::Receiver<ChannelEvent>), TransportError>>,
{
    match join_with_retry(connect, config.join_attempts, config.join_backoff).await {
        Ok((channel, events)) => (Box::new(channel), events),
        Err(e) => {
            warn!(player_id = %fallback_id, error = %e, "Starting in offline mode");
            let (_closed, events) = mpsc::channel(1);
            (Box::new(OfflineChannel::new(fallback_id)), events)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::render::RenderFrame;
    use crate::game::session::AppPhase;
    use crate::game::swing::NoPose;
    use crate::net::LocalHub;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Frames(Arc<Mutex<Vec<RenderFrame>>>);

    impl RenderSink for Frames {
        fn draw(&mut self, frame: &RenderFrame) {
            self.0.lock().unwrap().push(frame.clone());
        }
    }

    fn hub_scheduler(hub: &LocalHub, id: &str) -> TickScheduler {
        let (channel, events) = hub.join_as(id.into()).unwrap();
        let (scheduler, _handle) = TickScheduler::new(
            SessionConfig::default(),
            Box::new(channel),
            events,
            Box::new(NoPose),
            Box::new(Frames::default()),
        );
        scheduler
    }

    #[tokio::test]
    async fn tick_waits_for_every_player_then_runs_once() {
        let hub = LocalHub::new();
        let mut a = hub_scheduler(&hub, "a");
        let mut b = hub_scheduler(&hub, "b");
        a.process_events(1_000);

        assert!(a.on_period(1_000).is_empty(), "b has not sent tick 60 yet");

        b.process_events(1_000);
        let reports = b.on_period(1_005);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].tick, TickKey::new(60));

        a.process_events(1_010);
        let reports = a.on_period(1_010);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].tick, TickKey::new(60));

        // tick 60 is retired on both sides; a late copy changes nothing
        assert_eq!(
            a.session.record_input(TickKey::new(60), "b".into(), Default::default()),
            Recorded::Late
        );
        assert!(a.on_period(1_012).is_empty());
    }

    #[tokio::test]
    async fn offline_session_simulates_every_period() {
        let (scheduler, _handle) = TickScheduler::new(
            SessionConfig::default(),
            Box::new(OfflineChannel::new("solo".into())),
            mpsc::channel::<ChannelEvent>(1).1,
            Box::new(NoPose),
            Box::new(Frames::default()),
        );
        let mut scheduler = scheduler;
        scheduler.process_events(0);

        for period in 0..5u64 {
            let now = 1_000 + period * 17;
            assert_eq!(scheduler.on_period(now).len(), 1, "period {period}");
        }
        assert_eq!(scheduler.session().mailbox().pending(), 0);
    }

    #[tokio::test]
    async fn everyone_ready_starts_singles_on_both_sides() {
        let hub = LocalHub::new();
        let mut a = hub_scheduler(&hub, "a");
        let mut b = hub_scheduler(&hub, "b");

        a.apply_command(SchedulerCommand::SetMode(Mode::Singles), 0);
        a.apply_command(SchedulerCommand::Ready(true), 0);
        b.process_events(0);
        assert_eq!(b.session().mode(), Mode::Singles);
        assert!(b.session().is_ready(&"a".into()));

        b.apply_command(SchedulerCommand::Ready(true), 0);
        assert_eq!(b.session().phase(), AppPhase::Playing);

        a.process_events(0);
        assert_eq!(a.session().phase(), AppPhase::Playing);
        assert_eq!(a.session().rackets().len(), 2);
    }

    #[tokio::test]
    async fn malformed_and_departed_peers_are_handled() {
        let hub = LocalHub::new();
        let mut a = hub_scheduler(&hub, "a");
        let (ghost, _ghost_rx) = hub.join_as("ghost".into()).unwrap();

        ghost.send("{not json".to_string()).unwrap();
        a.process_events(0);
        assert_eq!(a.session().mailbox().pending(), 0);
        assert_eq!(a.session().roster().len(), 2);

        drop(ghost);
        a.process_events(0);
        assert_eq!(a.session().roster().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_and_far_future_ticks_are_dropped() {
        let hub = LocalHub::new();
        let mut a = hub_scheduler(&hub, "a");
        let (b, _b_rx) = hub.join_as("b".into()).unwrap();
        let tick_at = |t: u64| {
            PeerMessage::Tick(TickMsg { t, id: "b".into(), swing: Default::default() })
                .encode()
                .unwrap()
        };

        b.send(tick_at(u64::MAX)).unwrap();
        b.send(tick_at(1_000 + 60_000)).unwrap();
        a.process_events(1_000);
        assert_eq!(a.session().mailbox().pending(), 0);

        assert!(a.on_period(u64::MAX).is_empty());
        assert_eq!(a.session().mailbox().pending(), 0);
    }

    #[tokio::test]
    async fn peers_agree_on_teams_and_rackets_whatever_the_join_order() {
        let hub = LocalHub::new();
        let mut schedulers: Vec<_> = ["c", "a", "d", "b"]
            .into_iter()
            .map(|id| hub_scheduler(&hub, id))
            .collect();
        for scheduler in &mut schedulers {
            scheduler.process_events(0);
            scheduler.session.start();
        }

        let first = &schedulers[0].session;
        for other in &schedulers[1..] {
            assert_eq!(other.session.roster(), first.roster());
            for id in ["a", "b", "c", "d"] {
                let id = PlayerId::from(id);
                assert_eq!(other.session.team_of(&id), first.team_of(&id));
            }
            assert_eq!(other.session.rackets(), first.rackets());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_presents_frames_until_shutdown() {
        let frames = Frames::default();
        let (scheduler, handle) = TickScheduler::new(
            SessionConfig::default(),
            Box::new(OfflineChannel::new("solo".into())),
            mpsc::channel::<ChannelEvent>(1).1,
            Box::new(NoPose),
            Box::new(frames.clone()),
        );
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(!frames.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_join_falls_back_to_offline() {
        let config = SessionConfig {
            join_attempts: 2,
            join_backoff: Duration::from_millis(10),
            ..SessionConfig::default()
        };
        let (channel, mut events) = connect(
            |_| async { Err::<(OfflineChannel, mpsc::Receiver<ChannelEvent>), _>(TransportError::Closed) },
            &config,
            "solo".into(),
        )
        .await;

        assert_eq!(channel.local_id(), &PlayerId::from("solo"));
        assert!(channel.send("x".to_string()).is_ok());
        assert!(events.recv().await.is_none());
    }
}

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use serde::Serialize;

use crate::alarm::model::{Alarm, EngineSettings};
use crate::alarm::scheduler::{AlarmScheduler, EngineSnapshot, Intent, IntentOutcome};
use crate::ticker::Ticker;
use crate::time_provider::{ClockSnapshot, TimeProvider};

/// Audio collaborator. Called once per edge of the "should play" signal.
pub trait CueSink: Send {
    fn start(&mut self, alarm: &Alarm);
    fn stop(&mut self);
}

/// Tracks the last signalled cue state so repeated matches never restart
/// playback.
#[derive(Debug, Default)]
pub struct CueWatch {
    playing: bool,
}

impl CueWatch {
    pub fn sync(&mut self, scheduler: &AlarmScheduler, sink: &mut dyn CueSink) {
        let should_play = scheduler.should_play_cue();
        if should_play == self.playing {
            return;
        }
        self.playing = should_play;
        if should_play {
            if let Some(alarm) = scheduler.ringing_alarm() {
                sink.start(alarm);
            }
        } else {
            sink.stop();
        }
    }

    pub fn silence(&mut self, sink: &mut dyn CueSink) {
        if self.playing {
            self.playing = false;
            sink.stop();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentReply {
    #[serde(flatten)]
    pub outcome: IntentOutcome,
    pub state: EngineSnapshot,
}

pub enum Event {
    Tick(ClockSnapshot),
    Intent(Intent, Sender<IntentReply>),
    Query(Sender<EngineSnapshot>),
    Shutdown,
}

#[derive(Clone)]
pub struct RuntimeHandle {
    events: Sender<Event>,
}

impl RuntimeHandle {
    pub fn submit(&self, intent: Intent) -> Result<IntentReply> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.events
            .send(Event::Intent(intent, reply_tx))
            .map_err(|_| anyhow!("alarm runtime is not running"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("alarm runtime stopped before replying"))
    }

    pub fn query(&self) -> Result<EngineSnapshot> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.events
            .send(Event::Query(reply_tx))
            .map_err(|_| anyhow!("alarm runtime is not running"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("alarm runtime stopped before replying"))
    }

    pub fn tick(&self, snapshot: ClockSnapshot) -> bool {
        self.events.send(Event::Tick(snapshot)).is_ok()
    }

    fn shutdown(&self) {
        let _ = self.events.send(Event::Shutdown);
    }
}

/// Single owner of the scheduler. Ticks, intents, queries and notice expiry
/// are handled strictly one after another.
pub struct EventLoop {
    scheduler: AlarmScheduler,
    cue: Box<dyn CueSink>,
    watch: CueWatch,
}

impl EventLoop {
    pub fn new(scheduler: AlarmScheduler, cue: Box<dyn CueSink>) -> Self {
        Self {
            scheduler,
            cue,
            watch: CueWatch::default(),
        }
    }

    pub fn handle(&mut self, event: Event, now: Instant) -> ControlFlow<()> {
        match event {
            Event::Tick(snapshot) => {
                self.scheduler.tick(snapshot);
            }
            Event::Intent(intent, reply) => {
                debug!("intent {intent:?}");
                let outcome = self.scheduler.apply(intent, now);
                self.watch.sync(&self.scheduler, self.cue.as_mut());
                let _ = reply.send(IntentReply {
                    outcome,
                    state: self.scheduler.snapshot(now),
                });
                return ControlFlow::Continue(());
            }
            Event::Query(reply) => {
                let _ = reply.send(self.scheduler.snapshot(now));
            }
            Event::Shutdown => {
                self.watch.silence(self.cue.as_mut());
                return ControlFlow::Break(());
            }
        }
        self.watch.sync(&self.scheduler, self.cue.as_mut());
        ControlFlow::Continue(())
    }

    /// Serves events until shutdown or until every sender is gone, then hands
    /// the scheduler back.
    pub fn run(mut self, events: Receiver<Event>) -> AlarmScheduler {
        loop {
            let event = match self.scheduler.notice_deadline() {
                Some(deadline) => {
                    match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            self.scheduler.expire_notice(Instant::now());
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match events.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            if self.handle(event, Instant::now()).is_break() {
                break;
            }
        }
        self.watch.silence(self.cue.as_mut());
        debug!("alarm runtime loop finished");
        self.scheduler
    }
}

/// The running engine: event loop thread plus its clock ticker.
pub struct Runtime {
    handle: RuntimeHandle,
    ticker: Option<Ticker>,
    join: Option<JoinHandle<AlarmScheduler>>,
}

impl Runtime {
    pub fn start(
        settings: EngineSettings,
        provider: Arc<dyn TimeProvider>,
        cue: Box<dyn CueSink>,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::channel();
        let scheduler = AlarmScheduler::new(settings.clone(), provider.now()?);
        let event_loop = EventLoop::new(scheduler, cue);
        let join = thread::Builder::new()
            .name("alarm-runtime".to_string())
            .spawn(move || event_loop.run(events_rx))
            .context("failed to spawn alarm runtime thread")?;

        let handle = RuntimeHandle { events: events_tx };
        let tick_handle = handle.clone();
        info!(
            "alarm runtime started ({} clock, tick every {} ms)",
            provider.label(),
            settings.tick_interval_ms
        );
        let ticker = Ticker::start(provider, settings.tick_interval(), move |snapshot| {
            tick_handle.tick(snapshot)
        });

        Ok(Self {
            handle,
            ticker: Some(ticker),
            join: Some(join),
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.handle.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        info!("alarm runtime stopped");
    }
}

//! Simulator main loop.
//!
//! A single control thread reads FunctionFS events from `ep0` and drains a
//! command queue shared with router workers and outside callers. Session
//! state is only touched from this thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gbsim_transport::{Endpoint, EndpointSource};
use tracing::{debug, error, info, warn};

use crate::control::{ControlEvent, ControlReader, SetupRequest};
use crate::error::{Result, SvcError};
use crate::module::Module;
use crate::router::WorkerExit;
use crate::session::{SessionConfig, SvcSession};

/// Work queued for the control thread.
#[derive(Debug)]
pub enum SimulatorEvent {
    /// Plug a module at runtime.
    Plug(Module),
    /// Unplug the module at an interface.
    Unplug(u8),
    /// Stop the control loop.
    Shutdown,
    /// A router worker returned.
    EndpointExited { index: usize, exit: WorkerExit },
}

/// Cloneable handle for queueing commands to a running simulator.
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    tx: Sender<SimulatorEvent>,
}

impl SimulatorHandle {
    pub fn plug(&self, module: Module) -> Result<()> {
        self.send(SimulatorEvent::Plug(module))
    }

    pub fn unplug(&self, interface_id: u8) -> Result<()> {
        self.send(SimulatorEvent::Unplug(interface_id))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SimulatorEvent::Shutdown)
    }

    fn send(&self, event: SimulatorEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| SvcError::Disconnected("simulator stopped".to_string()))
    }
}

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Longest the control loop waits on `ep0` before draining the queue
    /// and rechecking the running flag.
    pub poll_interval: Duration,
    /// Longest the data stage of an SVC SETUP request may trail its event.
    pub data_stage_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            data_stage_timeout: Duration::from_secs(1),
            session: SessionConfig::default(),
        }
    }
}

/// SVC SETUP request still waiting for its data stage.
struct PendingSetup {
    setup: SetupRequest,
    deadline: Instant,
}

enum Flow {
    Continue,
    Stop,
}

/// One simulated Greybus device: control loop, SVC session and router.
pub struct Simulator {
    control: ControlReader<Endpoint>,
    session: SvcSession,
    events: Receiver<SimulatorEvent>,
    tx: Sender<SimulatorEvent>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    data_stage_timeout: Duration,
    pending: Option<PendingSetup>,
}

impl Simulator {
    /// Build a simulator reading control events from `control` and opening
    /// SVC and data endpoints from `source` on every enable.
    pub fn new(
        control: Endpoint,
        source: Box<dyn EndpointSource>,
        modules: Vec<Module>,
        config: SimulatorConfig,
    ) -> Self {
        let (tx, events) = channel();
        let session = SvcSession::new(source, modules, config.session, tx.clone());
        Self {
            control: ControlReader::new(control),
            session,
            events,
            tx,
            running: Arc::new(AtomicBool::new(true)),
            poll_interval: config.poll_interval,
            data_stage_timeout: config.data_stage_timeout,
            pending: None,
        }
    }

    /// Stop when `running` is cleared, e.g. from a signal handler.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn session(&self) -> &SvcSession {
        &self.session
    }

    /// Run until shutdown, the running flag clears, or `ep0` closes.
    ///
    /// Errors answering the AP are logged; only control endpoint failures
    /// end the loop with an error. The session is disabled on return.
    pub fn run(&mut self) -> Result<()> {
        info!(control = %self.control.get_ref().name(), "simulator started");
        let result = self.run_loop();
        self.session.disable();
        match &result {
            Ok(()) => info!("simulator stopped"),
            Err(err) => error!(%err, "simulator stopped on error"),
        }
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            if !self.running.load(Ordering::Acquire) {
                info!("shutdown requested");
                return Ok(());
            }
            if let Flow::Stop = self.drain_events() {
                return Ok(());
            }

            if self.dispatch_buffered() || self.expire_data_stage() {
                continue;
            }

            if !self
                .control
                .get_ref()
                .wait_readable(Some(self.poll_interval))?
            {
                continue;
            }

            let filled = match &self.pending {
                Some(pending) => self.control.fill_data(pending.setup.length),
                None => self.control.fill_event(),
            };
            match filled {
                Ok(_) => {}
                Err(SvcError::Disconnected(reason)) => {
                    info!(reason = %reason, "control endpoint closed");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Handle one buffered event or completed data stage, if any.
    fn dispatch_buffered(&mut self) -> bool {
        if let Some(pending) = &self.pending {
            let Some(raw) = self.control.take_data(pending.setup.length) else {
                return false;
            };
            self.pending = None;
            if let Err(err) = self.session.handle_svc_message(&raw) {
                warn!(%err, "svc message rejected");
            }
            return true;
        }

        match self.control.take_event() {
            Some(event) => {
                self.handle_control(event);
                true
            }
            None => false,
        }
    }

    fn expire_data_stage(&mut self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        if Instant::now() < pending.deadline {
            return false;
        }
        warn!(
            length = pending.setup.length,
            received = self.control.buffered(),
            "svc data stage timed out"
        );
        self.control.discard_buffered();
        self.pending = None;
        true
    }

    fn drain_events(&mut self) -> Flow {
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Flow::Continue,
            };

            match event {
                SimulatorEvent::Plug(module) => {
                    let interface_id = module.interface_id;
                    if let Err(err) = self.session.plug(module) {
                        warn!(interface = interface_id, %err, "plug rejected");
                    }
                }
                SimulatorEvent::Unplug(interface_id) => {
                    if let Err(err) = self.session.unplug(interface_id) {
                        warn!(interface = interface_id, %err, "unplug rejected");
                    }
                }
                SimulatorEvent::Shutdown => {
                    info!("shutdown command received");
                    return Flow::Stop;
                }
                SimulatorEvent::EndpointExited { index, exit } => match exit {
                    WorkerExit::Stopped => debug!(index, "router worker exited"),
                    WorkerExit::Closed => info!(index, "data endpoint closed by AP"),
                    WorkerExit::Failed(reason) => {
                        error!(index, reason = %reason, "data endpoint failed")
                    }
                },
            }
        }
    }

    fn handle_control(&mut self, event: ControlEvent) {
        debug!(event = event.name(), "control event");
        match event {
            ControlEvent::Enable => {
                if let Err(err) = self.session.enable() {
                    error!(%err, "enable failed");
                }
            }
            ControlEvent::Disable | ControlEvent::Unbind => self.session.disable(),
            ControlEvent::Setup(setup) => self.handle_setup(setup),
            ControlEvent::Bind | ControlEvent::Suspend | ControlEvent::Resume => {
                info!(event = event.name(), "function event");
            }
            ControlEvent::Unknown(kind) => warn!(kind, "unknown control event skipped"),
        }
    }

    fn handle_setup(&mut self, setup: SetupRequest) {
        if !setup.is_svc_message() {
            debug!(
                request_type = setup.request_type,
                request = setup.request,
                length = setup.length,
                "ignoring setup request"
            );
            return;
        }

        self.pending = Some(PendingSetup {
            setup,
            deadline: Instant::now() + self.data_stage_timeout,
        });
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("session", &self.session)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

//! SVC session: handshake, route bookkeeping and module hotplug.
//!
//! The session lives on the control thread. It owns the SVC event endpoint
//! and the router workers of the current enable cycle; the binding table is
//! shared with those workers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use gbsim_frame::{decode_svc_message, hex_dump, FrameWriter, SvcMessage};
use gbsim_protocol::{BackendKind, CPortTable};
use gbsim_transport::{Endpoint, EndpointSource};
use tracing::{debug, info, warn};

use crate::error::{Result, SvcError};
use crate::handshake::{ap_id_assignment, validate_ap_hello};
use crate::module::Module;
use crate::router::{EndpointWorker, RouterConfig};
use crate::simulator::SimulatorEvent;

/// Handshake state of the SVC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SvcState {
    #[default]
    Idle,
    HandshakeComplete,
}

impl SvcState {
    pub fn name(self) -> &'static str {
        match self {
            SvcState::Idle => "idle",
            SvcState::HandshakeComplete => "handshake_complete",
        }
    }
}

impl std::fmt::Display for SvcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Log a hex dump of every SVC message in either direction.
    pub dump_messages: bool,
    /// Device id given to the first module plugged without an explicit one.
    pub first_device_id: u8,
    /// Side-effect backend for protocol handlers.
    pub backend: BackendKind,
    pub router: RouterConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dump_messages: false,
            first_device_id: 2,
            backend: BackendKind::default(),
            router: RouterConfig::default(),
        }
    }
}

/// SVC state machine for one simulated Greybus device.
pub struct SvcSession {
    source: Box<dyn EndpointSource>,
    config: SessionConfig,
    modules: Vec<Module>,
    table: Arc<CPortTable>,
    events: Sender<SimulatorEvent>,
    state: SvcState,
    errored: bool,
    enabled: bool,
    svc: Option<FrameWriter<Endpoint>>,
    workers: Vec<EndpointWorker>,
    plugged: BTreeMap<u8, u8>,
    routes: BTreeSet<u8>,
    next_device_id: u8,
}

impl SvcSession {
    /// Create a session that plugs `modules` after every handshake.
    pub fn new(
        source: Box<dyn EndpointSource>,
        modules: Vec<Module>,
        config: SessionConfig,
        events: Sender<SimulatorEvent>,
    ) -> Self {
        let next_device_id = config.first_device_id;
        Self {
            source,
            config,
            modules,
            table: Arc::new(CPortTable::new()),
            events,
            state: SvcState::Idle,
            errored: false,
            enabled: false,
            svc: None,
            workers: Vec::new(),
            plugged: BTreeMap::new(),
            routes: BTreeSet::new(),
            next_device_id,
        }
    }

    /// Open the endpoints, start the router and send SVC_HELLO.
    ///
    /// A second enable without a disable in between is ignored.
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            debug!("function already enabled");
            return Ok(());
        }

        let set = self.source.open()?;
        let mut svc = FrameWriter::new(set.svc);

        let mut workers = Vec::with_capacity(set.data.len());
        for pair in set.data {
            workers.push(EndpointWorker::spawn(
                pair,
                Arc::clone(&self.table),
                self.config.router.clone(),
                self.events.clone(),
            )?);
        }

        self.state = SvcState::Idle;
        self.errored = false;
        self.plugged.clear();
        self.routes.clear();
        self.next_device_id = self.config.first_device_id;

        let hello = SvcMessage::svc_hello();
        svc.write_svc(&hello)?;
        if self.config.dump_messages {
            debug!("SVC -> AP {}\n{}", hello.name(), hex_dump(svc.last_written()));
        }

        self.svc = Some(svc);
        self.workers = workers;
        self.enabled = true;
        info!(data_pairs = self.workers.len(), "function enabled, SVC_HELLO sent");
        Ok(())
    }

    /// Stop the router, close the endpoints and forget session state.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }

        for worker in &self.workers {
            worker.request_stop();
        }
        for worker in self.workers.drain(..) {
            worker.stop();
        }

        if let Some(svc) = self.svc.take() {
            if let Err(err) = svc.into_inner().close() {
                debug!(%err, "svc endpoint close failed");
            }
        }

        let unbound = self.table.clear();
        self.plugged.clear();
        self.routes.clear();
        self.state = SvcState::Idle;
        self.errored = false;
        self.enabled = false;
        info!(cports = unbound, "function disabled");
    }

    /// Handle one AP->SVC message received on the control endpoint.
    pub fn handle_svc_message(&mut self, raw: &[u8]) -> Result<()> {
        if self.config.dump_messages {
            debug!("AP -> SVC\n{}", hex_dump(raw));
        }
        if !self.enabled {
            return Err(SvcError::NotReady);
        }
        self.ensure_not_latched()?;

        let message = decode_svc_message(raw)?;
        debug!(message = message.name(), state = %self.state, "svc message from AP");

        match message {
            SvcMessage::Error { function_id } => {
                warn!(function_id, "AP reported an SVC error");
                self.errored = true;
                Ok(())
            }
            SvcMessage::Handshake { .. } => self.handle_handshake(&message),
            SvcMessage::SetRoute { device_id } => {
                if self.state != SvcState::HandshakeComplete {
                    return Err(SvcError::NotReady);
                }
                self.routes.insert(device_id);
                info!(device_id, "route set");
                Ok(())
            }
            other => Err(SvcError::UnexpectedMessage(other.name())),
        }
    }

    fn handle_handshake(&mut self, message: &SvcMessage) -> Result<()> {
        if self.state == SvcState::HandshakeComplete {
            warn!("repeated handshake ignored");
            return Ok(());
        }

        if let Err(err) = validate_ap_hello(message) {
            self.errored = true;
            return Err(err);
        }

        self.state = SvcState::HandshakeComplete;
        info!("handshake complete");
        if let Err(err) = self.send(&ap_id_assignment()) {
            self.errored = true;
            return Err(err);
        }

        for module in self.modules.clone() {
            let interface_id = module.interface_id;
            if let Err(err) = self.plug(module) {
                warn!(interface = interface_id, %err, "failed to plug configured module");
            }
        }
        Ok(())
    }

    /// Announce a module to the AP and bind its CPorts.
    ///
    /// Returns the device id the module was given.
    pub fn plug(&mut self, module: Module) -> Result<u8> {
        self.ensure_connected()?;
        let interface_id = module.interface_id;
        if self.plugged.contains_key(&interface_id) {
            return Err(SvcError::DuplicateModule(interface_id));
        }

        self.table
            .bind_module(interface_id, &module.cports, self.config.backend)?;

        let device_id = module.device_id.unwrap_or(self.next_device_id);
        let hotplug = SvcMessage::Hotplug {
            interface_id,
            manifest: module.manifest.bytes().clone(),
        };
        let link_up = SvcMessage::LinkUp {
            interface_id,
            device_id,
        };
        if let Err(err) = self.send(&hotplug).and_then(|()| self.send(&link_up)) {
            self.table.unbind_module(interface_id);
            return Err(err);
        }

        if module.device_id.is_none() {
            self.next_device_id = self.next_device_id.wrapping_add(1);
        }
        self.plugged.insert(interface_id, device_id);
        info!(
            interface = interface_id,
            device_id,
            cports = module.cports.len(),
            manifest_size = module.manifest.size(),
            "module plugged"
        );
        Ok(device_id)
    }

    /// Announce removal of a module and drop its bindings.
    pub fn unplug(&mut self, interface_id: u8) -> Result<()> {
        self.ensure_connected()?;
        if !self.plugged.contains_key(&interface_id) {
            return Err(SvcError::UnknownModule(interface_id));
        }

        let sent = self.send(&SvcMessage::HotUnplug { interface_id });
        self.plugged.remove(&interface_id);
        let removed = self.table.unbind_module(interface_id);
        info!(interface = interface_id, cports = removed, "module unplugged");
        sent
    }

    fn ensure_not_latched(&self) -> Result<()> {
        if self.errored {
            return Err(SvcError::HandshakeInvalid(
                "session errored; waiting for re-enable".to_string(),
            ));
        }
        Ok(())
    }

    /// Hotplug traffic needs a completed handshake on a healthy session.
    fn ensure_connected(&self) -> Result<()> {
        self.ensure_not_latched()?;
        if self.state != SvcState::HandshakeComplete {
            return Err(SvcError::NotReady);
        }
        Ok(())
    }

    fn send(&mut self, message: &SvcMessage) -> Result<()> {
        let svc = self.svc.as_mut().ok_or(SvcError::NotReady)?;
        svc.write_svc(message)?;
        if self.config.dump_messages {
            debug!("SVC -> AP {}\n{}", message.name(), hex_dump(svc.last_written()));
        } else {
            debug!(message = message.name(), "svc message to AP");
        }
        Ok(())
    }

    pub fn state(&self) -> SvcState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether an error latched the session until the next enable.
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Device ids the AP asked routes for.
    pub fn routes(&self) -> &BTreeSet<u8> {
        &self.routes
    }

    /// Plugged modules as interface id to device id.
    pub fn plugged(&self) -> &BTreeMap<u8, u8> {
        &self.plugged
    }

    pub fn table(&self) -> &Arc<CPortTable> {
        &self.table
    }

    /// Router workers still running.
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }
}

impl Drop for SvcSession {
    fn drop(&mut self) {
        self.disable();
    }
}

impl std::fmt::Debug for SvcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvcSession")
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("errored", &self.errored)
            .field("plugged", &self.plugged)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::mpsc::{channel, Receiver};

    use bytes::Bytes;
    use gbsim_frame::{Manifest, SVC_HEADER_SIZE};
    use gbsim_protocol::{CPortAssignment, ProtocolClass};
    use gbsim_transport::{EndpointSet, LoopbackSource};

    use super::*;

    fn pwm_module(interface_id: u8, host_cport_id: u16) -> Module {
        Module {
            interface_id,
            device_id: None,
            manifest: Manifest::from_bytes(Bytes::from_static(&[0x06, 0x00, 0x00, 0x01, 0x01, 0x02]))
                .expect("manifest should parse"),
            cports: vec![CPortAssignment {
                cport_id: 0,
                host_cport_id,
                protocol: ProtocolClass::Pwm,
            }],
        }
    }

    fn session(modules: Vec<Module>) -> (SvcSession, Receiver<EndpointSet>) {
        let (source, ap_rx) = LoopbackSource::new(1);
        let (tx, _rx) = channel();
        let session = SvcSession::new(Box::new(source), modules, SessionConfig::default(), tx);
        (session, ap_rx)
    }

    fn read_svc(ap: &mut Endpoint) -> SvcMessage {
        let mut header = [0u8; SVC_HEADER_SIZE];
        ap.read_exact(&mut header).expect("svc header should arrive");
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut raw = header.to_vec();
        raw.resize(SVC_HEADER_SIZE + len, 0);
        ap.read_exact(&mut raw[SVC_HEADER_SIZE..])
            .expect("svc payload should arrive");
        decode_svc_message(&raw).expect("svc message should decode")
    }

    fn ap_hello() -> Vec<u8> {
        SvcMessage::ap_hello().to_bytes().unwrap().to_vec()
    }

    #[test]
    fn enable_sends_svc_hello() {
        let (mut session, ap_rx) = session(Vec::new());
        session.enable().expect("enable should succeed");
        let mut ap = ap_rx.recv().expect("AP ends should be handed over");

        assert_eq!(read_svc(&mut ap.svc), SvcMessage::svc_hello());
        assert!(session.is_enabled());
        assert_eq!(session.state(), SvcState::Idle);
    }

    #[test]
    fn second_enable_is_ignored() {
        let (mut session, ap_rx) = session(Vec::new());
        session.enable().unwrap();
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();
        assert!(ap_rx.try_recv().is_err());
    }

    #[test]
    fn handshake_assigns_ap_id_and_plugs_modules() {
        let (mut session, ap_rx) = session(vec![pwm_module(1, 4), pwm_module(2, 5)]);
        session.enable().unwrap();
        let mut ap = ap_rx.recv().unwrap();
        read_svc(&mut ap.svc);

        session
            .handle_svc_message(&ap_hello())
            .expect("handshake should succeed");
        assert_eq!(session.state(), SvcState::HandshakeComplete);

        assert_eq!(
            read_svc(&mut ap.svc),
            SvcMessage::ApId {
                interface_id: 0,
                device_id: 1
            }
        );
        let SvcMessage::Hotplug {
            interface_id,
            manifest,
        } = read_svc(&mut ap.svc)
        else {
            panic!("expected hotplug");
        };
        assert_eq!(interface_id, 1);
        assert_eq!(manifest.len(), 6);
        assert_eq!(
            read_svc(&mut ap.svc),
            SvcMessage::LinkUp {
                interface_id: 1,
                device_id: 2
            }
        );
        assert!(matches!(read_svc(&mut ap.svc), SvcMessage::Hotplug { interface_id: 2, .. }));
        assert_eq!(
            read_svc(&mut ap.svc),
            SvcMessage::LinkUp {
                interface_id: 2,
                device_id: 3
            }
        );
        assert_eq!(session.table().len(), 2);
    }

    #[test]
    fn bad_handshake_latches_error_until_reenable() {
        let (mut session, ap_rx) = session(vec![pwm_module(1, 4)]);
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();

        let bad = SvcMessage::Handshake {
            version_major: 0,
            version_minor: 2,
            handshake_type: 1,
        };
        let err = session
            .handle_svc_message(&bad.to_bytes().unwrap())
            .unwrap_err();
        assert!(matches!(err, SvcError::HandshakeInvalid(_)));
        assert!(session.is_errored());
        assert_eq!(session.state(), SvcState::Idle);

        assert!(matches!(
            session.handle_svc_message(&ap_hello()),
            Err(SvcError::HandshakeInvalid(_))
        ));
        assert!(session.table().is_empty());

        session.disable();
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();
        assert!(!session.is_errored());
        session
            .handle_svc_message(&ap_hello())
            .expect("handshake after re-enable should succeed");
    }

    #[test]
    fn set_route_requires_handshake() {
        let (mut session, ap_rx) = session(Vec::new());
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();

        let route = SvcMessage::SetRoute { device_id: 2 }.to_bytes().unwrap();
        assert!(matches!(
            session.handle_svc_message(&route),
            Err(SvcError::NotReady)
        ));

        session.handle_svc_message(&ap_hello()).unwrap();
        session.handle_svc_message(&route).unwrap();
        assert!(session.routes().contains(&2));
    }

    #[test]
    fn messages_before_enable_are_rejected() {
        let (mut session, _ap_rx) = session(Vec::new());
        assert!(matches!(
            session.handle_svc_message(&ap_hello()),
            Err(SvcError::NotReady)
        ));
    }

    #[test]
    fn svc_only_messages_from_ap_are_rejected() {
        let (mut session, ap_rx) = session(Vec::new());
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();
        session.handle_svc_message(&ap_hello()).unwrap();

        let link_up = SvcMessage::LinkUp {
            interface_id: 1,
            device_id: 2,
        };
        assert!(matches!(
            session.handle_svc_message(&link_up.to_bytes().unwrap()),
            Err(SvcError::UnexpectedMessage("link_up"))
        ));
    }

    #[test]
    fn plug_and_unplug_manage_bindings() {
        let (mut session, ap_rx) = session(Vec::new());
        assert!(matches!(
            session.plug(pwm_module(1, 4)),
            Err(SvcError::NotReady)
        ));

        session.enable().unwrap();
        let mut ap = ap_rx.recv().unwrap();
        session.handle_svc_message(&ap_hello()).unwrap();
        read_svc(&mut ap.svc);
        read_svc(&mut ap.svc);

        let mut module = pwm_module(3, 7);
        module.device_id = Some(9);
        assert_eq!(session.plug(module.clone()).unwrap(), 9);
        assert!(matches!(
            session.plug(module),
            Err(SvcError::DuplicateModule(3))
        ));
        assert!(session.table().resolve(7).is_some());
        read_svc(&mut ap.svc);
        assert_eq!(
            read_svc(&mut ap.svc),
            SvcMessage::LinkUp {
                interface_id: 3,
                device_id: 9
            }
        );

        session.unplug(3).expect("unplug should succeed");
        assert_eq!(
            read_svc(&mut ap.svc),
            SvcMessage::HotUnplug { interface_id: 3 }
        );
        assert!(session.table().resolve(7).is_none());
        assert!(matches!(session.unplug(3), Err(SvcError::UnknownModule(3))));
    }

    #[test]
    fn svc_error_blocks_hotplug_until_reenable() {
        let (mut session, ap_rx) = session(vec![pwm_module(1, 4)]);
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();
        session.handle_svc_message(&ap_hello()).unwrap();
        assert_eq!(session.plugged().len(), 1);

        let error = SvcMessage::Error { function_id: 3 }.to_bytes().unwrap();
        session.handle_svc_message(&error).unwrap();
        assert!(session.is_errored());

        assert!(matches!(
            session.plug(pwm_module(2, 5)),
            Err(SvcError::HandshakeInvalid(_))
        ));
        assert!(matches!(
            session.unplug(1),
            Err(SvcError::HandshakeInvalid(_))
        ));
        assert!(session.table().resolve(5).is_none());
        assert!(session.table().resolve(4).is_some());
        assert_eq!(session.plugged().len(), 1);

        session.disable();
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();
        session.handle_svc_message(&ap_hello()).unwrap();
        assert_eq!(session.plug(pwm_module(2, 5)).unwrap(), 3);
    }

    #[test]
    fn failed_ap_id_send_latches_error() {
        let (mut session, ap_rx) = session(vec![pwm_module(1, 4)]);
        session.enable().unwrap();
        let ap = ap_rx.recv().unwrap();
        drop(ap.svc);

        assert!(session.handle_svc_message(&ap_hello()).is_err());
        assert!(session.is_errored());
        assert!(session.plugged().is_empty());
        assert!(session.table().is_empty());
        assert!(matches!(
            session.handle_svc_message(&ap_hello()),
            Err(SvcError::HandshakeInvalid(_))
        ));
    }

    #[test]
    fn disable_clears_session_state() {
        let (mut session, ap_rx) = session(vec![pwm_module(1, 4)]);
        session.enable().unwrap();
        let _ap = ap_rx.recv().unwrap();
        session.handle_svc_message(&ap_hello()).unwrap();
        assert_eq!(session.table().len(), 1);

        session.disable();
        assert!(!session.is_enabled());
        assert_eq!(session.state(), SvcState::Idle);
        assert!(session.table().is_empty());
        assert!(session.plugged().is_empty());
        assert_eq!(session.active_workers(), 0);
    }
}

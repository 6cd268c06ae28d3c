use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::BackendKind;
use crate::error::{HandlerError, Result};
use crate::handler::{OperationContext, OperationHandler, Response};
use crate::protocol::{create_handler, ProtocolClass};

/// CPort of a module and the AP-side id it is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CPortAssignment {
    pub cport_id: u16,
    pub host_cport_id: u16,
    pub protocol: ProtocolClass,
}

/// Snapshot of one binding, for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BindingInfo {
    pub module_id: u8,
    pub cport_id: u16,
    pub host_cport_id: u16,
    pub protocol: ProtocolClass,
}

/// A CPort bound to its handler.
///
/// The handler sits behind its own mutex: operations on one CPort run one
/// at a time while other CPorts proceed independently.
pub struct CPortBinding {
    info: BindingInfo,
    handler: Mutex<Box<dyn OperationHandler>>,
}

impl CPortBinding {
    pub fn new(
        module_id: u8,
        assignment: CPortAssignment,
        handler: Box<dyn OperationHandler>,
    ) -> Self {
        Self {
            info: BindingInfo {
                module_id,
                cport_id: assignment.cport_id,
                host_cport_id: assignment.host_cport_id,
                protocol: assignment.protocol,
            },
            handler: Mutex::new(handler),
        }
    }

    pub fn info(&self) -> BindingInfo {
        self.info
    }

    pub fn module_id(&self) -> u8 {
        self.info.module_id
    }

    pub fn cport_id(&self) -> u16 {
        self.info.cport_id
    }

    pub fn host_cport_id(&self) -> u16 {
        self.info.host_cport_id
    }

    pub fn protocol(&self) -> ProtocolClass {
        self.info.protocol
    }

    pub fn context(&self) -> OperationContext {
        OperationContext {
            module_id: self.info.module_id,
            cport_id: self.info.cport_id,
            host_cport_id: self.info.host_cport_id,
        }
    }

    /// Run one request through the handler, holding the CPort lock.
    pub fn dispatch(&self, op_type: u8, payload: &[u8]) -> Result<Response> {
        let ctx = self.context();
        // A panicked operation does not retire the CPort.
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        handler.handle(&ctx, op_type, payload)
    }
}

impl std::fmt::Debug for CPortBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CPortBinding")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Binding table keyed by AP-side CPort id.
///
/// Lookups take a shared lock. Plug and unplug take the exclusive lock,
/// which only waits for lookups, never for running operations.
#[derive(Debug, Default)]
pub struct CPortTable {
    bindings: RwLock<HashMap<u16, Arc<CPortBinding>>>,
}

impl CPortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single binding.
    pub fn bind(&self, binding: CPortBinding) -> Result<()> {
        self.insert_all(vec![binding])
    }

    /// Bind every CPort of a module, or none of them.
    pub fn bind_module(
        &self,
        module_id: u8,
        cports: &[CPortAssignment],
        backend: BackendKind,
    ) -> Result<()> {
        let mut prepared = Vec::with_capacity(cports.len());
        for assignment in cports {
            let handler = create_handler(assignment.protocol, backend)?;
            prepared.push(CPortBinding::new(module_id, *assignment, handler));
        }

        self.insert_all(prepared)?;
        info!(module = module_id, cports = cports.len(), "module cports bound");
        Ok(())
    }

    fn insert_all(&self, prepared: Vec<CPortBinding>) -> Result<()> {
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        let mut seen = Vec::with_capacity(prepared.len());
        for binding in &prepared {
            let host = binding.host_cport_id();
            if bindings.contains_key(&host) || seen.contains(&host) {
                return Err(HandlerError::AlreadyBound(host));
            }
            seen.push(host);
        }

        for binding in prepared {
            debug!(
                module = binding.module_id(),
                cport = binding.cport_id(),
                host_cport = binding.host_cport_id(),
                protocol = %binding.protocol(),
                "bound cport"
            );
            bindings.insert(binding.host_cport_id(), Arc::new(binding));
        }
        Ok(())
    }

    /// Remove every binding of a module. Returns how many were removed.
    ///
    /// Operations already dispatched keep their `Arc` and finish normally.
    pub fn unbind_module(&self, module_id: u8) -> usize {
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        let before = bindings.len();
        bindings.retain(|_, binding| binding.module_id() != module_id);
        let removed = before - bindings.len();
        if removed > 0 {
            info!(module = module_id, cports = removed, "module cports unbound");
        }
        removed
    }

    /// Remove every binding.
    pub fn clear(&self) -> usize {
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        let removed = bindings.len();
        bindings.clear();
        removed
    }

    /// Resolve an AP-side CPort id.
    pub fn resolve(&self, host_cport_id: u16) -> Option<Arc<CPortBinding>> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        bindings.get(&host_cport_id).cloned()
    }

    /// All bindings ordered by AP-side CPort id.
    pub fn bindings(&self) -> Vec<BindingInfo> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<BindingInfo> = bindings.values().map(|b| b.info()).collect();
        list.sort_unstable_by_key(|info| info.host_cport_id);
        list
    }

    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

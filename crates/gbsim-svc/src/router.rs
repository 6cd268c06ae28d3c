//! CPort router: one worker thread per data endpoint pair.
//!
//! A worker reads operation messages from the AP, resolves the AP-side CPort
//! id in the header pad bytes to a binding, runs the bound handler and writes
//! the response to the paired outbound endpoint. Workers share nothing but
//! the binding table, so a blocked outbound endpoint only stalls its own
//! worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use gbsim_frame::{hex_dump, FrameConfig, FrameError, FrameReader, FrameWriter, Message, Status};
use gbsim_protocol::CPortTable;
use gbsim_transport::{DataEndpoints, Endpoint};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::simulator::SimulatorEvent;

/// Router worker configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Longest a worker waits for input before rechecking its stop flag.
    pub poll_interval: Duration,
    /// Log a hex dump of every inbound and outbound frame.
    pub dump_frames: bool,
    /// Frame size limit. The packetized flag follows each endpoint.
    pub frame: FrameConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            dump_frames: false,
            frame: FrameConfig::default(),
        }
    }
}

/// Dispatch one inbound message and build the response owed to the AP.
///
/// Returns `None` for messages that must not be answered (responses sent by
/// the AP). Every request gets exactly one response: the handler's result,
/// or an empty error response for unknown CPorts and failed requests.
pub fn route_message(table: &CPortTable, message: &Message) -> Option<Message> {
    let header = &message.header;
    let host_cport = header.cport_tag();

    if header.is_response() {
        warn!(
            host_cport,
            operation_id = header.operation_id,
            op_type = header.op_type,
            "dropping response sent by AP"
        );
        return None;
    }

    let op_type = header.request_type();
    let Some(binding) = table.resolve(host_cport) else {
        warn!(
            host_cport,
            operation_id = header.operation_id,
            op_type,
            "request for unknown cport"
        );
        return Some(error_response(message, Status::Bad));
    };

    let operation = binding.protocol().operation_name(op_type);
    match binding.dispatch(op_type, &message.payload) {
        Ok(response) => {
            debug!(
                module = binding.module_id(),
                cport = binding.cport_id(),
                host_cport = binding.host_cport_id(),
                protocol = %binding.protocol(),
                operation,
                operation_id = header.operation_id,
                status = %response.status,
                "handled operation"
            );
            match Message::response_to(
                header,
                response.status.as_u8(),
                binding.host_cport_id(),
                response.payload,
            ) {
                Ok(rsp) => Some(rsp),
                Err(err) => {
                    error!(
                        module = binding.module_id(),
                        cport = binding.cport_id(),
                        operation,
                        %err,
                        "handler response does not fit in a frame"
                    );
                    Some(error_response(message, Status::NoMemory))
                }
            }
        }
        Err(err) => {
            warn!(
                module = binding.module_id(),
                cport = binding.cport_id(),
                host_cport = binding.host_cport_id(),
                protocol = %binding.protocol(),
                operation,
                op_type,
                operation_id = header.operation_id,
                %err,
                "operation failed"
            );
            Some(error_response(message, err.status()))
        }
    }
}

fn error_response(request: &Message, status: Status) -> Message {
    Message::error_response(&request.header, status.as_u8())
}

/// Why a router worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The stop flag was raised.
    Stopped,
    /// The AP closed the inbound endpoint.
    Closed,
    /// An endpoint read or write failed.
    Failed(String),
}

/// Handle to a running router worker.
pub struct EndpointWorker {
    index: usize,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EndpointWorker {
    /// Spawn a worker serving one endpoint pair.
    pub fn spawn(
        endpoints: DataEndpoints,
        table: Arc<CPortTable>,
        config: RouterConfig,
        events: Sender<SimulatorEvent>,
    ) -> Result<Self> {
        let index = endpoints.index;
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name(format!("gbsim-cport-{index}"))
            .spawn(move || {
                let exit = run_worker(endpoints, &table, &config, &worker_stop);
                match &exit {
                    WorkerExit::Stopped => debug!(index, "router worker stopped"),
                    WorkerExit::Closed => info!(index, "router worker saw endpoint close"),
                    WorkerExit::Failed(reason) => {
                        error!(index, reason = %reason, "router worker failed")
                    }
                }
                let _ = events.send(SimulatorEvent::EndpointExited { index, exit });
            })?;

        debug!(index, "router worker started");
        Ok(Self {
            index,
            stop,
            handle: Some(handle),
        })
    }

    /// Position of the served endpoint pair.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Ask the worker to stop within one poll interval.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the worker and wait for it.
    pub fn stop(mut self) {
        self.request_stop();
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(index = self.index, "router worker panicked");
            }
        }
    }
}

impl Drop for EndpointWorker {
    fn drop(&mut self) {
        self.request_stop();
        self.join_inner();
    }
}

fn run_worker(
    endpoints: DataEndpoints,
    table: &CPortTable,
    config: &RouterConfig,
    stop: &AtomicBool,
) -> WorkerExit {
    let DataEndpoints {
        index,
        to_ap,
        from_ap,
    } = endpoints;
    let endpoint = from_ap.name().to_string();

    let mut reader = FrameReader::for_endpoint(from_ap, config.frame.clone());
    let mut writer = FrameWriter::with_config(to_ap, config.frame.clone());

    let exit = loop {
        if stop.load(Ordering::Acquire) {
            break WorkerExit::Stopped;
        }

        // Only read after a bounded wait, so a stalled partial frame never
        // hides the stop flag.
        let next = match reader.next_buffered() {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => match reader.get_ref().wait_readable(Some(config.poll_interval)) {
                Ok(true) => reader.read_available(),
                Ok(false) => continue,
                Err(err) => break WorkerExit::Failed(err.to_string()),
            },
            Err(err) => Err(err),
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(FrameError::ConnectionClosed) => break WorkerExit::Closed,
            Err(err @ (FrameError::Malformed { .. } | FrameError::TooLarge { .. })) => {
                warn!(index, endpoint = %endpoint, %err, "dropping malformed frame");
                continue;
            }
            Err(err) => break WorkerExit::Failed(err.to_string()),
        };

        if config.dump_frames {
            debug!(endpoint = %endpoint, "AP -> module\n{}", hex_dump(&message.to_bytes()));
        }

        let Some(response) = route_message(table, &message) else {
            continue;
        };

        if config.dump_frames {
            debug!(endpoint = %endpoint, "module -> AP\n{}", hex_dump(&response.to_bytes()));
        }

        if let Err(err) = writer.write_message(&response) {
            break WorkerExit::Failed(err.to_string());
        }
    };

    close_pair(reader.into_inner(), writer.into_inner());
    exit
}

fn close_pair(from_ap: Endpoint, to_ap: Endpoint) {
    for endpoint in [to_ap, from_ap] {
        let name = endpoint.name().to_string();
        if let Err(err) = endpoint.close() {
            debug!(endpoint = %name, %err, "endpoint close failed");
        }
    }
}

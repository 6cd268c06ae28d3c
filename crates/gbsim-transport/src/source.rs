use std::sync::mpsc::{channel, Receiver, Sender};

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// One bulk in/out endpoint pair carrying CPort traffic.
#[derive(Debug)]
pub struct DataEndpoints {
    /// Position of the pair in the endpoint layout.
    pub index: usize,
    /// Frames travelling to the AP.
    pub to_ap: Endpoint,
    /// Frames travelling from the AP.
    pub from_ap: Endpoint,
}

/// Endpoints opened when the AP enables the function.
#[derive(Debug)]
pub struct EndpointSet {
    /// SVC event channel.
    pub svc: Endpoint,
    /// CPort data pairs.
    pub data: Vec<DataEndpoints>,
}

/// Opens the SVC and CPort endpoints on every enable cycle.
pub trait EndpointSource: Send {
    /// Open a fresh set of endpoints.
    fn open(&mut self) -> Result<EndpointSet>;
}

/// In-process endpoint source backed by socket pairs.
///
/// Every `open` creates new pairs, keeps the simulator ends and hands the AP
/// ends to the receiver returned by [`LoopbackSource::new`]. On the AP side
/// `to_ap` is read and `from_ap` is written.
#[derive(Debug)]
pub struct LoopbackSource {
    data_pairs: usize,
    ap_ends: Sender<EndpointSet>,
}

impl LoopbackSource {
    /// Create a source with `data_pairs` CPort pairs.
    pub fn new(data_pairs: usize) -> (Self, Receiver<EndpointSet>) {
        let (ap_ends, rx) = channel();
        (
            Self {
                data_pairs: data_pairs.max(1),
                ap_ends,
            },
            rx,
        )
    }
}

impl EndpointSource for LoopbackSource {
    fn open(&mut self) -> Result<EndpointSet> {
        let (svc, ap_svc) = Endpoint::pair("svc")?;

        let mut data = Vec::with_capacity(self.data_pairs);
        let mut ap_data = Vec::with_capacity(self.data_pairs);
        for index in 0..self.data_pairs {
            let (to_ap, ap_to_ap) = Endpoint::pair(&format!("to_ap{index}"))?;
            let (from_ap, ap_from_ap) = Endpoint::pair(&format!("from_ap{index}"))?;
            data.push(DataEndpoints {
                index,
                to_ap,
                from_ap,
            });
            ap_data.push(DataEndpoints {
                index,
                to_ap: ap_to_ap,
                from_ap: ap_from_ap,
            });
        }

        self.ap_ends
            .send(EndpointSet {
                svc: ap_svc,
                data: ap_data,
            })
            .map_err(|_| TransportError::Shutdown)?;

        debug!(data_pairs = self.data_pairs, "opened loopback endpoints");
        Ok(EndpointSet { svc, data })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn loopback_connects_simulator_and_ap_ends() {
        let (mut source, ap) = LoopbackSource::new(2);
        let mut sim = source.open().unwrap();
        let mut ap = ap.recv().unwrap();

        assert_eq!(sim.data.len(), 2);
        assert_eq!(ap.data.len(), 2);

        sim.svc.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        ap.svc.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        ap.data[1].from_ap.write_all(b"req").unwrap();
        let mut buf = [0u8; 3];
        sim.data[1].from_ap.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"req");

        sim.data[1].to_ap.write_all(b"rsp").unwrap();
        ap.data[1].to_ap.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"rsp");
    }

    #[test]
    fn loopback_fails_when_ap_side_is_gone() {
        let (mut source, ap) = LoopbackSource::new(1);
        drop(ap);
        assert!(matches!(source.open(), Err(TransportError::Shutdown)));
    }
}

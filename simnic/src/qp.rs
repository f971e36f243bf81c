//! Reliable-connected Queue Pair state machine.

use std::io;

/// QP states, in the order a connection walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpState {
    Reset,
    Init,
    /// Ready to receive
    Rtr,
    /// Ready to send
    Rts,
    Error,
}

/// Queue Pair bookkeeping. Writes are only accepted in [`QpState::Rts`].
#[derive(Debug)]
pub struct QueuePair {
    qpn: u32,
    state: QpState,
    port: Option<u8>,
    remote_qpn: Option<u32>,
}

impl QueuePair {
    pub fn new(qpn: u32) -> Self {
        Self {
            qpn,
            state: QpState::Reset,
            port: None,
            remote_qpn: None,
        }
    }

    pub fn qpn(&self) -> u32 {
        self.qpn
    }

    pub fn state(&self) -> QpState {
        self.state
    }

    pub fn port(&self) -> Option<u8> {
        self.port
    }

    pub fn remote_qpn(&self) -> Option<u32> {
        self.remote_qpn
    }

    /// Transition QP from RESET to INIT.
    pub fn modify_to_init(&mut self, port: u8) -> io::Result<()> {
        self.transition(QpState::Reset, QpState::Init)?;
        self.port = Some(port);
        Ok(())
    }

    /// Transition QP from INIT to RTR.
    pub fn modify_to_rtr(&mut self, remote_qpn: u32) -> io::Result<()> {
        self.transition(QpState::Init, QpState::Rtr)?;
        self.remote_qpn = Some(remote_qpn);
        Ok(())
    }

    /// Transition QP from RTR to RTS.
    pub fn modify_to_rts(&mut self) -> io::Result<()> {
        self.transition(QpState::Rtr, QpState::Rts)
    }

    /// Connect to a remote QP (INIT -> RTR -> RTS).
    pub fn connect(&mut self, remote_qpn: u32) -> io::Result<()> {
        self.modify_to_rtr(remote_qpn)?;
        self.modify_to_rts()
    }

    /// Move to the error state. Any state may fail.
    pub fn set_error(&mut self) {
        if self.state != QpState::Error {
            tracing::debug!("QP {:#x}: {:?} -> Error", self.qpn, self.state);
        }
        self.state = QpState::Error;
    }

    fn transition(&mut self, from: QpState, to: QpState) -> io::Result<()> {
        if self.state != from {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "QP {:#x}: cannot move to {:?} from {:?}",
                    self.qpn, to, self.state
                ),
            ));
        }
        self.state = to;
        Ok(())
    }
}

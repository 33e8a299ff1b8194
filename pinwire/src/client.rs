// client.rs — Name-based set/get against a flashed device
//
// Resolves variable names through the port's stored profile, then performs
// one transport exchange per operation. Profile problems are reported before
// any serial I/O; protocol problems are kept distinct from transport ones.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::profile::ProfileStore;
use crate::protocol::{is_set_ack, normalize_value, parse_value_reply, Command, ValueReplyError};
use crate::transport::{LinkOpener, SerialOpener, Transport, TransportConfig, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no communication profile for port {port}; upload firmware first")]
    NoProfile { port: String },

    #[error("variable '{name}' is not in the communication map for port {port}")]
    UnknownVariable { port: String, name: String },

    #[error("invalid value {0:?}: expected HIGH, LOW or a number")]
    InvalidValue(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected response: {response}")]
    UnexpectedResponse { response: String },

    #[error("invalid value in response: {response}")]
    InvalidResponse { response: String },
}

impl ClientError {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ClientError::UnexpectedResponse { .. } | ClientError::InvalidResponse { .. }
        )
    }
}

pub struct HostClient<'s, O = SerialOpener> {
    store: &'s ProfileStore,
    transport: Transport<O>,
}

impl<'s> HostClient<'s, SerialOpener> {
    /// Client over real serial ports with default timing.
    pub fn new(store: &'s ProfileStore) -> Self {
        HostClient::with_transport(store, Transport::serial(TransportConfig::default()))
    }
}

impl<'s, O: LinkOpener> HostClient<'s, O> {
    pub fn with_transport(store: &'s ProfileStore, transport: Transport<O>) -> Self {
        HostClient { store, transport }
    }

    pub fn transport(&self) -> &Transport<O> {
        &self.transport
    }

    fn timeout(&self) -> Duration {
        self.transport.config().timeout
    }

    /// Slot index of `name` on `port`.
    pub fn resolve(&self, port: &str, name: &str) -> Result<usize, ClientError> {
        let profile = self.store.get(port).ok_or_else(|| ClientError::NoProfile {
            port: port.to_string(),
        })?;
        profile
            .map
            .index_of(name)
            .ok_or_else(|| ClientError::UnknownVariable {
                port: port.to_string(),
                name: name.to_string(),
            })
    }

    /// Set `name` from a user-facing value (`HIGH`, `LOW`, or a number).
    /// Returns the acknowledgement line.
    pub fn set(&self, port: &str, name: &str, value: &str) -> Result<String, ClientError> {
        let index = self.resolve(port, name)?;
        let value =
            normalize_value(value).ok_or_else(|| ClientError::InvalidValue(value.to_string()))?;
        self.send_set(port, index, value)
    }

    /// Set `name` to an already-normalized integer.
    pub fn set_value(&self, port: &str, name: &str, value: i64) -> Result<String, ClientError> {
        let index = self.resolve(port, name)?;
        self.send_set(port, index, value)
    }

    fn send_set(&self, port: &str, index: usize, value: i64) -> Result<String, ClientError> {
        let command = Command::Set { index, value };
        let response = self
            .transport
            .send_and_receive(port, &command.encode(), self.timeout())?;
        if !is_set_ack(&response, index) {
            return Err(ClientError::UnexpectedResponse { response });
        }
        debug!(port, index, value, "set acknowledged");
        Ok(response)
    }

    /// Read the current slot value of `name`.
    pub fn get(&self, port: &str, name: &str) -> Result<i64, ClientError> {
        let index = self.resolve(port, name)?;
        let command = Command::Get { index };
        let response = self
            .transport
            .send_and_receive(port, &command.encode(), self.timeout())?;
        match parse_value_reply(&response, index) {
            Ok(value) => {
                debug!(port, index, value, "value received");
                Ok(value)
            }
            Err(ValueReplyError::Unexpected) => Err(ClientError::UnexpectedResponse { response }),
            Err(ValueReplyError::InvalidValue) => Err(ClientError::InvalidResponse { response }),
        }
    }
}

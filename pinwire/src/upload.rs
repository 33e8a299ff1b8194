// upload.rs — Compile-and-flash orchestration and toolchain seams
//
// Builds the map, generates firmware, hands the source to a build/upload
// collaborator, and records the port's profile only once the upload has
// succeeded. Port and board enumeration live here as traits too; they feed
// user-facing choices and never influence generation.
//
// Preconditions: none.
// Postconditions: on Ok, the store holds exactly the map that was flashed;
//                 on Err, the store is unchanged.
// Failure modes: invalid target, toolchain failure, enumeration failure.
// Side effects: whatever the collaborator does (process spawn, flashing).

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::codegen::CodegenOptions;
use crate::model::Model;
use crate::pipeline::{self, Provenance};
use crate::profile::{Profile, ProfileStore};

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid upload target: {0}")]
    InvalidTarget(&'static str),

    #[error("compilation failed: {output}")]
    Compile { output: String },

    #[error("upload to {port} failed: {output}")]
    Upload { port: String, output: String },

    #[error("could not run {tool}: {source}")]
    Tool { tool: String, source: io::Error },

    #[error("could not stage sketch: {0}")]
    Staging(#[from] io::Error),

    #[error("board '{0}' not found")]
    BoardNotFound(String),

    #[error("could not read board list: {0}")]
    Catalog(String),

    #[error("could not list serial ports: {0}")]
    Ports(String),
}

// ── Collaborator seams ──────────────────────────────────────────────────────

/// Compiles and flashes one sketch. Returns a human-readable status line.
pub trait BuildUploader {
    fn build_and_upload(&self, board: &str, port: &str, source: &str)
        -> Result<String, UploadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.description)
    }
}

pub trait PortEnumerator {
    fn ports(&self) -> Result<Vec<PortInfo>, UploadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardInfo {
    pub name: String,
    pub fqbn: String,
}

pub trait BoardCatalog {
    fn boards(&self) -> Result<Vec<BoardInfo>, UploadError>;

    /// FQBN of the first board named exactly `name`.
    fn fqbn_for(&self, name: &str) -> Result<String, UploadError> {
        self.boards()?
            .into_iter()
            .find(|b| b.name == name)
            .map(|b| b.fqbn)
            .ok_or_else(|| UploadError::BoardNotFound(name.to_string()))
    }
}

// ── Serial port enumeration ─────────────────────────────────────────────────

/// Lists the host's serial ports through `serialport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPorts;

impl PortEnumerator for SerialPorts {
    fn ports(&self) -> Result<Vec<PortInfo>, UploadError> {
        let found = serialport::available_ports().map_err(|e| UploadError::Ports(e.to_string()))?;
        let mut ports: Vec<PortInfo> = found
            .into_iter()
            .map(|p| PortInfo {
                description: describe_port_type(&p.port_type),
                name: p.port_name,
            })
            .collect();
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        ports.dedup_by(|a, b| a.name == b.name);
        Ok(ports)
    }
}

fn describe_port_type(kind: &serialport::SerialPortType) -> String {
    use serialport::SerialPortType;
    match kind {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .or_else(|| usb.manufacturer.clone())
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

// ── Orchestration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub port: String,
    pub board: String,
}

impl Target {
    pub fn new(port: impl Into<String>, board: impl Into<String>) -> Self {
        Target {
            port: port.into(),
            board: board.into(),
        }
    }

    fn validate(&self) -> Result<(), UploadError> {
        if self.port.trim().is_empty() {
            return Err(UploadError::InvalidTarget("port is empty"));
        }
        if self.board.trim().is_empty() {
            return Err(UploadError::InvalidTarget("board is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub message: String,
    pub profile: Profile,
    pub provenance: Provenance,
}

/// Generate firmware for `model`, flash it to `target`, and record the
/// port's profile on success.
pub fn compile_and_upload<U: BuildUploader + ?Sized>(
    store: &ProfileStore,
    uploader: &U,
    target: &Target,
    model: &Model,
    options: &CodegenOptions,
) -> Result<UploadReport, UploadError> {
    target.validate()?;

    let compiled = pipeline::compile(model, options);
    info!(
        port = %target.port,
        board = %target.board,
        variables = compiled.map.len(),
        "uploading firmware"
    );

    let message = match uploader.build_and_upload(
        &target.board,
        &target.port,
        &compiled.firmware.source,
    ) {
        Ok(message) => message,
        Err(e) => {
            warn!(port = %target.port, error = %e, "upload failed; profile unchanged");
            return Err(e);
        }
    };

    let profile = Profile {
        port: target.port.clone(),
        board: target.board.clone(),
        map_fingerprint: compiled.provenance.map_fingerprint.clone(),
        map: compiled.map,
    };
    store.insert(profile.clone());

    Ok(UploadReport {
        message,
        profile,
        provenance: compiled.provenance,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────

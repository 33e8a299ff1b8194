// sim.rs — Host-side simulation of generated firmware
//
// Executes the same line buffering, number grammar and S/G interpreter that
// codegen emits, against the same communication map. Used to exercise the
// protocol without hardware, either directly (`feed`/`take_output`) or as a
// `Link` behind the transport.
//
// Slots are `int`s, whose width depends on the target: 32-bit on ARM and
// ESP cores and on a host build, 16-bit on AVR boards such as
// `arduino:avr:uno`. `SlotWidth` selects which one a device models; values
// outside the range wrap as the `(int)` cast in the firmware does.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::comm_map::{CommMap, VarKind};
use crate::model::Model;
use crate::protocol::{
    is_line_terminator, scan_number, Reply, GET_OPCODE, LINE_BUFFER_CAPACITY, SET_OPCODE,
};
use crate::transport::{Link, LinkOpener, TransportConfig, TransportError};

// ── Device ──────────────────────────────────────────────────────────────────

/// One pin write performed by the apply step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: u32,
    pub kind: VarKind,
    pub value: i32,
}

/// Width of the firmware's `int` control slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotWidth {
    /// AVR targets.
    Bits16,
    #[default]
    Bits32,
}

impl SlotWidth {
    /// Narrow `value` the way `(int)value` does on the target.
    pub fn wrap(self, value: i64) -> i32 {
        match self {
            SlotWidth::Bits16 => i32::from(value as i16),
            SlotWidth::Bits32 => value as i32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    map: CommMap,
    width: SlotWidth,
    slots: Vec<i32>,
    buffer: Vec<u8>,
    output: Vec<u8>,
}

impl SimulatedDevice {
    /// Boot a device flashed with firmware for `model`: slots seeded as
    /// `setup()` would seed them. Slots are 32-bit.
    pub fn flash(model: &Model) -> Self {
        Self::flash_with_width(model, SlotWidth::Bits32)
    }

    pub fn flash_with_width(model: &Model, width: SlotWidth) -> Self {
        let map = CommMap::build(model);
        let slots = map
            .iter()
            .map(|e| match e.kind {
                VarKind::Shared => 0,
                VarKind::Digital | VarKind::Analog => model
                    .pin_states()
                    .get(&e.name)
                    .map(|s| width.wrap(s.initial_value.as_control_value()))
                    .unwrap_or(0),
            })
            .collect();
        SimulatedDevice {
            map,
            width,
            slots,
            buffer: Vec::with_capacity(LINE_BUFFER_CAPACITY),
            output: Vec::new(),
        }
    }

    pub fn map(&self) -> &CommMap {
        &self.map
    }

    pub fn slot_width(&self) -> SlotWidth {
        self.width
    }

    pub fn slot(&self, index: usize) -> Option<i32> {
        self.slots.get(index).copied()
    }

    /// Receive bytes from the host, as `checkSerialInput()` does.
    pub fn feed(&mut self, bytes: &[u8]) {
        // Firmware without variables never starts the serial port.
        if self.slots.is_empty() {
            return;
        }
        for &b in bytes {
            if is_line_terminator(b) {
                if !self.buffer.is_empty() {
                    let line = std::mem::take(&mut self.buffer);
                    if let Some(reply) = self.process_line(&line) {
                        self.output.extend_from_slice(reply.to_string().as_bytes());
                        self.output.extend_from_slice(b"\r\n");
                    }
                }
            } else if self.buffer.len() < LINE_BUFFER_CAPACITY - 1 {
                self.buffer.push(b);
            }
        }
    }

    /// Interpret one complete line. `None` means the device stays silent.
    pub fn process_line(&mut self, line: &[u8]) -> Option<Reply> {
        let opcode = *line.first()? as char;
        if (opcode != SET_OPCODE && opcode != GET_OPCODE) || line.get(1) != Some(&b':') {
            return None;
        }
        let (index, used) = scan_number(&line[2..])?;
        if index < 0 || index >= self.slots.len() as i64 {
            return None;
        }
        let rest = &line[2 + used..];
        let slot = index as usize;

        if opcode == SET_OPCODE {
            let value_text = rest.strip_prefix(b":")?;
            let (value, used) = scan_number(value_text)?;
            if used != value_text.len() {
                return None;
            }
            self.slots[slot] = self.width.wrap(value);
            Some(Reply::SetAck { index })
        } else {
            if !rest.is_empty() {
                return None;
            }
            Some(Reply::Value {
                index,
                value: i64::from(self.slots[slot]),
            })
        }
    }

    /// Drain bytes the device has written to the serial port.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Writes one pass of `applyControlValues()` performs, in index order.
    pub fn apply(&self) -> Vec<PinWrite> {
        self.map
            .iter()
            .filter(|e| e.kind != VarKind::Shared)
            .filter_map(|e| {
                Some(PinWrite {
                    pin: e.pin_number?,
                    kind: e.kind,
                    value: self.slots[e.index],
                })
            })
            .collect()
    }
}

// ── Link adapter ────────────────────────────────────────────────────────────

/// Serves simulated devices by port name through the transport.
#[derive(Default)]
pub struct SimulatedPorts {
    devices: Mutex<HashMap<String, Arc<Mutex<SimulatedDevice>>>>,
    open_links: Arc<AtomicUsize>,
}

impl SimulatedPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `device` at `port`, replacing whatever was there.
    pub fn attach(&self, port: &str, device: SimulatedDevice) -> Arc<Mutex<SimulatedDevice>> {
        let device = Arc::new(Mutex::new(device));
        self.devices
            .lock()
            .insert(port.to_string(), Arc::clone(&device));
        device
    }

    /// Number of links currently open.
    pub fn open_links(&self) -> usize {
        self.open_links.load(Ordering::SeqCst)
    }
}

impl LinkOpener for SimulatedPorts {
    fn open(&self, port: &str, _config: &TransportConfig) -> Result<Box<dyn Link>, TransportError> {
        let device = self
            .devices
            .lock()
            .get(port)
            .cloned()
            .ok_or_else(|| TransportError::Open {
                port: port.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
            })?;
        self.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedLink {
            device,
            open_links: Arc::clone(&self.open_links),
        }))
    }
}

struct SimulatedLink {
    device: Arc<Mutex<SimulatedDevice>>,
    open_links: Arc<AtomicUsize>,
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.open_links.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Read for SimulatedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut device = self.device.lock();
        if device.output.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(device.output.len());
        buf[..n].copy_from_slice(&device.output[..n]);
        device.output.drain(..n);
        Ok(n)
    }
}

impl Write for SimulatedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device.lock().feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for SimulatedLink {
    fn clear_buffers(&mut self) -> io::Result<()> {
        self.device.lock().output.clear();
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

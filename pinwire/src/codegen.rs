// codegen.rs — Firmware source generation
//
// Instantiates the device-side sketch for a model and its communication map:
// control-value storage, a line-buffered serial reader, the S/G command
// interpreter, and a setup/loop skeleton that applies slot values to pins.
//
// Preconditions: `map` was built from `model` (CommMap::build).
// Postconditions: returns the complete sketch text; the control store has
//                 exactly `map.len()` slots and the interpreter accepts the
//                 grammar in `protocol`.
// Failure modes: none.
// Side effects: none.

use std::fmt::Write as _;

use crate::comm_map::{CommMap, VarKind};
use crate::model::Model;
use crate::protocol::{BAUD_RATE, LINE_BUFFER_CAPACITY};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Requested polling cadence in milliseconds.
    ///
    /// Accepted and carried through the pipeline but not applied: the
    /// generated loop runs at native speed and the output does not depend on
    /// this value.
    pub cadence_ms: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions { cadence_ms: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFirmware {
    pub source: String,
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn generate_firmware(
    model: &Model,
    options: &CodegenOptions,
    map: &CommMap,
) -> GeneratedFirmware {
    // The cadence is not threaded into the generated loop.
    let CodegenOptions { cadence_ms: _ } = options;
    let mut ctx = CodegenCtx::new(model, map);
    ctx.emit_all();
    GeneratedFirmware { source: ctx.out }
}

// ── Internal context ────────────────────────────────────────────────────────

struct CodegenCtx<'a> {
    model: &'a Model,
    map: &'a CommMap,
    out: String,
}

impl<'a> CodegenCtx<'a> {
    fn new(model: &'a Model, map: &'a CommMap) -> Self {
        CodegenCtx {
            model,
            map,
            out: String::with_capacity(4096),
        }
    }

    fn has_comms(&self) -> bool {
        !self.map.is_empty()
    }

    fn emit_all(&mut self) {
        self.emit_preamble();
        if self.has_comms() {
            self.emit_storage();
            self.emit_apply();
            self.emit_parse_number();
            self.emit_interpreter();
            self.emit_reader();
        }
        self.emit_setup();
        self.emit_loop();
    }

    // ── Preamble ────────────────────────────────────────────────────────

    fn emit_preamble(&mut self) {
        self.out
            .push_str("// Generated by pinwire (pin model firmware generator)\n");
        self.out.push('\n');
    }

    // ── Storage ─────────────────────────────────────────────────────────

    fn emit_storage(&mut self) {
        let _ = writeln!(self.out, "#define SERIAL_BUFFER_SIZE {}", LINE_BUFFER_CAPACITY);
        let _ = writeln!(self.out, "#define CONTROL_COUNT {}", self.map.len());
        self.out.push('\n');
        self.out.push_str("char serialBuffer[SERIAL_BUFFER_SIZE];\n");
        self.out.push_str("byte serialBufferPos = 0;\n");
        self.out.push_str("int controlValues[CONTROL_COUNT];\n");
        self.out.push('\n');
    }

    // ── Apply step ──────────────────────────────────────────────────────

    fn emit_apply(&mut self) {
        self.out.push_str("void applyControlValues() {\n");
        let map = self.map;
        for entry in map {
            let (Some(pin), Some(write_fn)) = (entry.pin_number, write_primitive(entry.kind))
            else {
                continue;
            };
            let _ = writeln!(
                self.out,
                "  {}({}, controlValues[{}]);",
                write_fn, pin, entry.index
            );
        }
        self.out.push_str("}\n\n");
    }

    // ── Number grammar ──────────────────────────────────────────────────

    // Optional '-' then one or more digits. Kept in step with
    // protocol::scan_number.
    fn emit_parse_number(&mut self) {
        self.out.push_str(
            "\
bool parseNumber(char* start, char** end, long* out) {
  char* p = start;
  bool negative = false;
  if (*p == '-') {
    negative = true;
    p++;
  }
  if (*p < '0' || *p > '9') return false;
  long value = 0;
  while (*p >= '0' && *p <= '9') {
    value = value * 10 + (*p - '0');
    p++;
  }
  *end = p;
  *out = negative ? -value : value;
  return true;
}

",
        );
    }

    // ── Command interpreter ─────────────────────────────────────────────

    fn emit_interpreter(&mut self) {
        self.out.push_str(
            "\
void processSerialCommand() {
  char commandType = serialBuffer[0];
  if ((commandType != 'S' && commandType != 'G') || serialBuffer[1] != ':') return;
  char* cursor;
  long index;
  if (!parseNumber(serialBuffer + 2, &cursor, &index)) return;
  if (index < 0 || index >= CONTROL_COUNT) return;

  if (commandType == 'S') {
    if (*cursor != ':') return;
    long value;
    if (!parseNumber(cursor + 1, &cursor, &value)) return;
    if (*cursor != '\\0') return;
    controlValues[index] = (int)value;
    Serial.print(\"OK:S:\");
    Serial.println(index);
  } else {
    if (*cursor != '\\0') return;
    Serial.print(\"R:\");
    Serial.print(index);
    Serial.print(\":\");
    Serial.println(controlValues[index]);
  }
}

",
        );
    }

    // ── Line reader ─────────────────────────────────────────────────────

    fn emit_reader(&mut self) {
        self.out.push_str(
            "\
void checkSerialInput() {
  while (Serial.available() > 0) {
    char inChar = Serial.read();
    if (inChar == '\\n' || inChar == '\\r') {
      if (serialBufferPos > 0) {
        serialBuffer[serialBufferPos] = '\\0';
        processSerialCommand();
        serialBufferPos = 0;
      }
    } else if (serialBufferPos < SERIAL_BUFFER_SIZE - 1) {
      serialBuffer[serialBufferPos++] = inChar;
    }
  }
}

",
        );
    }

    // ── setup() ─────────────────────────────────────────────────────────

    fn emit_setup(&mut self) {
        self.out.push_str("void setup() {\n");
        if self.has_comms() {
            let _ = writeln!(self.out, "  Serial.begin({});", BAUD_RATE);
        }
        let (model, map) = (self.model, self.map);
        for pin in model.pins_to_configure() {
            let _ = writeln!(self.out, "  pinMode({}, OUTPUT);", pin);
        }
        for entry in map {
            let initial = match entry.kind {
                VarKind::Shared => 0,
                VarKind::Digital | VarKind::Analog => model
                    .pin_states()
                    .get(&entry.name)
                    .map(|s| s.initial_value.as_control_value())
                    .unwrap_or(0),
            };
            let _ = writeln!(
                self.out,
                "  controlValues[{}] = {}; // Initial state for {}",
                entry.index,
                initial,
                comment_safe(&entry.name)
            );
        }
        self.out.push_str("}\n\n");
    }

    // ── loop() ──────────────────────────────────────────────────────────

    fn emit_loop(&mut self) {
        self.out.push_str("void loop() {\n");
        if self.has_comms() {
            self.out.push_str("  checkSerialInput();\n");
            self.out.push_str("  applyControlValues();\n");
        }
        self.out.push_str("}\n");
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn write_primitive(kind: VarKind) -> Option<&'static str> {
    match kind {
        VarKind::Digital => Some("digitalWrite"),
        VarKind::Analog => Some("analogWrite"),
        VarKind::Shared => None,
    }
}

/// Names end up inside `//` comments; keep them on one line.
fn comment_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────

// arduino_cli.rs — `arduino-cli` as build/upload collaborator and board catalog
//
// Every invocation is `<cli> [--config-file <path>] <args...>` with captured
// output. Sketches are staged in a temporary directory whose `.ino` file
// carries the directory's own name, as arduino-cli requires; the directory
// is removed when the stage is dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::upload::{BoardCatalog, BoardInfo, BuildUploader, UploadError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArduinoCli {
    pub cli_path: PathBuf,
    pub config_file: Option<PathBuf>,
}

impl Default for ArduinoCli {
    fn default() -> Self {
        ArduinoCli {
            cli_path: PathBuf::from("arduino-cli"),
            config_file: None,
        }
    }
}

impl ArduinoCli {
    pub fn new(cli_path: impl Into<PathBuf>) -> Self {
        ArduinoCli {
            cli_path: cli_path.into(),
            config_file: None,
        }
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.cli_path);
        if let Some(config) = &self.config_file {
            cmd.arg("--config-file").arg(config);
        }
        cmd.args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Output, UploadError> {
        debug!(cli = %self.cli_path.display(), ?args, "running arduino-cli");
        self.command(args).output().map_err(|source| UploadError::Tool {
            tool: self.cli_path.display().to_string(),
            source,
        })
    }

    fn run_in(&self, args: &[&str], sketch_dir: &Path) -> Result<Output, UploadError> {
        let dir = sketch_dir.to_string_lossy();
        let mut full: Vec<&str> = args.to_vec();
        full.push(&dir);
        self.run(&full)
    }
}

/// Combined stderr (or stdout if stderr is empty) of a failed run.
fn failure_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

// ── Sketch staging ──────────────────────────────────────────────────────────

/// A sketch written to disk; removed on drop.
pub struct StagedSketch {
    dir: TempDir,
    ino: PathBuf,
}

impl StagedSketch {
    pub fn new(source: &str) -> Result<Self, UploadError> {
        let dir = tempfile::Builder::new().prefix("pinwire_").tempdir()?;
        let name = dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pinwire_sketch".to_string());
        let ino = dir.path().join(format!("{name}.ino"));
        fs::write(&ino, source)?;
        debug!(path = %ino.display(), "sketch staged");
        Ok(StagedSketch { dir, ino })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn ino(&self) -> &Path {
        &self.ino
    }
}

// ── Build & upload ──────────────────────────────────────────────────────────

impl BuildUploader for ArduinoCli {
    fn build_and_upload(
        &self,
        board: &str,
        port: &str,
        source: &str,
    ) -> Result<String, UploadError> {
        let sketch = StagedSketch::new(source)?;

        info!(board, "compiling sketch");
        let output = self.run_in(&["compile", "--fqbn", board], sketch.dir())?;
        if !output.status.success() {
            return Err(UploadError::Compile {
                output: failure_output(&output),
            });
        }

        info!(board, port, "uploading sketch");
        let output = self.run_in(&["upload", "-p", port, "--fqbn", board], sketch.dir())?;
        if !output.status.success() {
            return Err(UploadError::Upload {
                port: port.to_string(),
                output: failure_output(&output),
            });
        }

        Ok(format!("Upload to {board} on {port} successful"))
    }
}

// ── Board catalog ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct BoardList {
    #[serde(default)]
    boards: Vec<BoardEntry>,
}

#[derive(Debug, Deserialize)]
struct BoardEntry {
    name: String,
    #[serde(default)]
    fqbn: String,
}

/// Parse `board listall --format json` output. Boards come back in the
/// tool's order; entries without an FQBN are dropped.
pub fn parse_board_list(json: &str) -> Result<Vec<BoardInfo>, UploadError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: BoardList =
        serde_json::from_str(json).map_err(|e| UploadError::Catalog(e.to_string()))?;
    Ok(list
        .boards
        .into_iter()
        .filter(|b| !b.fqbn.is_empty())
        .map(|b| BoardInfo {
            name: b.name,
            fqbn: b.fqbn,
        })
        .collect())
}

impl BoardCatalog for ArduinoCli {
    fn boards(&self) -> Result<Vec<BoardInfo>, UploadError> {
        let output = self.run(&["board", "listall", "--format", "json"])?;
        if !output.status.success() {
            return Err(UploadError::Catalog(failure_output(&output)));
        }
        parse_board_list(&String::from_utf8_lossy(&output.stdout))
    }
}

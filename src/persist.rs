//! Sequence files.
//!
//! A saved sequence is a JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "instructions": [
//!     { "time_since_previous_ms": 12.5, "kind": { "type": "delay", "duration_ms": 100.0 } }
//!   ]
//! }
//! ```
//!
//! Anything that is not a `.json` file is treated as script source and
//! compiled on load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::code::{Instruction, InstructionKind, MAX_DELAY_MS, Sequence};
use crate::compiler::compile;
use crate::error::PersistError;
use crate::exec_context::SequenceLoader;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    instructions: &'a [Instruction],
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct Document {
    instructions: Vec<Instruction>,
}

pub fn to_json(sequence: &Sequence) -> Result<String, PersistError> {
    validate(sequence.instructions())?;
    let doc = DocumentRef {
        version: FORMAT_VERSION,
        instructions: sequence.instructions(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn from_json(text: &str) -> Result<Sequence, PersistError> {
    let header: Header = serde_json::from_str(text)?;
    if header.version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(header.version));
    }
    let doc: Document = serde_json::from_str(text)?;
    validate(&doc.instructions)?;
    Ok(Sequence::new(doc.instructions))
}

pub fn save(path: &Path, sequence: &Sequence) -> Result<(), PersistError> {
    let json = to_json(sequence)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Sequence, PersistError> {
    from_json(&fs::read_to_string(path)?)
}

/// Load a `.json` sequence, or compile any other file as script.
pub fn load_or_compile(path: &Path) -> Result<Sequence, PersistError> {
    if is_json(path) {
        load(path)
    } else {
        Ok(compile(&fs::read_to_string(path)?)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Gaps and delay durations must lie within `0..=MAX_DELAY_MS`.
fn validate(instructions: &[Instruction]) -> Result<(), PersistError> {
    for (index, instr) in instructions.iter().enumerate() {
        let gap = instr.time_since_previous_ms;
        if !delay_in_range(gap) {
            return Err(PersistError::InvalidGap { index, value: gap });
        }
        if let InstructionKind::Delay { duration_ms } = instr.kind {
            if !delay_in_range(duration_ms) {
                return Err(PersistError::InvalidDelay {
                    index,
                    value: duration_ms,
                });
            }
        }
    }
    Ok(())
}

fn delay_in_range(ms: f64) -> bool {
    (0.0..=MAX_DELAY_MS).contains(&ms)
}

/// Resolves cross-file branch targets on disk.
#[derive(Debug, Clone)]
pub struct FileLoader {
    base_dir: PathBuf,
}

impl FileLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Loader rooted at the directory holding `file`.
    pub fn beside(file: &Path) -> Self {
        Self::new(file.parent().map(Path::to_path_buf).unwrap_or_default())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl SequenceLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<Sequence, PersistError> {
        let resolved = self.resolve(path);
        tracing::debug!("loading sequence from {}", resolved.display());
        load_or_compile(&resolved)
    }
}

//! `ExecutionContext`: program counter and lookup state for one playback run.
//!
//! A context borrows the sequence it runs over and is owned by exactly one
//! run. Nested runs started by a file transfer get their own context but share
//! the [`CancelToken`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::code::{Instruction, Sequence};
use crate::error::{FlowControlError, PersistError};

/// Cooperative cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolves the path of a cross-file branch into a sequence.
pub trait SequenceLoader {
    fn load(&self, path: &Path) -> Result<Sequence, PersistError>;
}

/// Interpreter state for a single run over one sequence.
pub struct ExecutionContext<'a> {
    sequence: &'a Sequence,
    index: usize,
    /// Lowercased target name to first instruction index carrying it.
    names: HashMap<String, usize>,
    cancel: CancelToken,
    loader: Option<&'a dyn SequenceLoader>,
    /// Directory of the file this sequence was loaded from, as the loader
    /// sees it. Relative cross-file targets are resolved against it.
    origin: Option<PathBuf>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        sequence: &'a Sequence,
        loader: Option<&'a dyn SequenceLoader>,
        cancel: CancelToken,
    ) -> Self {
        let mut names = HashMap::new();
        for (index, instr) in sequence.instructions().iter().enumerate() {
            if let Some(name) = instr.target_name() {
                // Recorded sequences are not validated; first occurrence wins.
                names.entry(name.to_lowercase()).or_insert(index);
            }
        }
        Self {
            sequence,
            index: 0,
            names,
            cancel,
            loader,
            origin: None,
        }
    }

    pub fn with_origin(mut self, dir: impl Into<PathBuf>) -> Self {
        self.origin = Some(dir.into());
        self
    }

    pub fn sequence(&self) -> &'a Sequence {
        self.sequence
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The instruction at the program counter, or `None` once exhausted.
    pub fn current(&self) -> Option<&'a Instruction> {
        self.sequence.get(self.index)
    }

    /// Move to the next instruction. Returns false when there is none.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.sequence.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn jump_to(&mut self, index: usize) -> Result<(), FlowControlError> {
        if index >= self.sequence.len() {
            return Err(FlowControlError::IndexOutOfRange {
                index,
                len: self.sequence.len(),
            });
        }
        self.index = index;
        Ok(())
    }

    /// Case-insensitive lookup of a target name.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.names.get(&name.to_lowercase()).copied()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn loader(&self) -> Option<&'a dyn SequenceLoader> {
        self.loader
    }

    /// Path handed to the loader for a cross-file target.
    pub fn resolve_external(&self, path: &Path) -> PathBuf {
        match &self.origin {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Load the sequence a cross-file branch points at.
    pub fn load_external(&self, path: &Path) -> Result<Sequence, FlowControlError> {
        let loader = self
            .loader
            .ok_or_else(|| FlowControlError::NoFileLoader(path.to_path_buf()))?;
        let resolved = self.resolve_external(path);
        loader
            .load(&resolved)
            .map_err(|source| FlowControlError::ExternalFile {
                path: resolved,
                source,
            })
    }
}

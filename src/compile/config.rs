/// Knobs for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Storage keys longer than this are cut to this many bytes.
    pub max_storage_key_len: usize,
    pub emit_source_map: bool,
    /// Emit the `upgrade` entry point for contracts that declare
    /// `approveUpgrade`.
    pub allow_upgrade: bool,
    /// Re-check stack heights over the assembled script.
    pub verify_stack: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            max_storage_key_len: 64,
            emit_source_map: true,
            allow_upgrade: true,
            verify_stack: true,
        }
    }
}

impl CompilerConfig {
    pub fn with_max_storage_key_len(mut self, len: usize) -> Self {
        self.max_storage_key_len = len;
        self
    }

    pub fn with_source_map(mut self, emit: bool) -> Self {
        self.emit_source_map = emit;
        self
    }

    pub fn with_upgrade(mut self, allow: bool) -> Self {
        self.allow_upgrade = allow;
        self
    }

    pub fn with_stack_verification(mut self, verify: bool) -> Self {
        self.verify_stack = verify;
        self
    }
}

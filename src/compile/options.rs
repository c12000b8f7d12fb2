/// Per-call emission options handed to every helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// Leave the result on the stack. When false the helper still performs
    /// its side effects but leaves the stack as it found it.
    pub push_value: bool,
    /// The node is being emitted as an assignment target.
    pub set_value: bool,
}

impl EmitOptions {
    pub const VALUE: EmitOptions = EmitOptions {
        push_value: true,
        set_value: false,
    };

    pub const EFFECT: EmitOptions = EmitOptions {
        push_value: false,
        set_value: false,
    };

    pub fn discard(self) -> Self {
        EmitOptions {
            push_value: false,
            ..self
        }
    }

    pub fn target(self) -> Self {
        EmitOptions {
            set_value: true,
            ..self
        }
    }
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions::VALUE
    }
}

use crate::runtime::value::StackItem;

/// A VM fault. Scripts that throw fault with the thrown value attached.
#[derive(Debug)]
pub struct RuntimeError {
    pub message: String,
    /// Where the fault happened, then the return address of each active
    /// invocation, innermost first.
    pub trace: Vec<usize>,
    pub thrown: Option<StackItem>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm fault: {}", self.message)?;
        let mut frames = self.trace.iter();
        if let Some(ip) = frames.next() {
            write!(f, " at {:04}", ip)?;
        }
        for ret in frames {
            write!(f, "\n  called from {:04}", ret)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(msg: &str) -> Self {
        RuntimeError {
            message: msg.to_string(),
            trace: Vec::new(),
            thrown: None,
        }
    }

    pub fn thrown(value: StackItem) -> Self {
        RuntimeError {
            message: format!("uncaught exception: {}", value),
            trace: Vec::new(),
            thrown: Some(value),
        }
    }

    pub fn at(mut self, ip: usize) -> Self {
        self.trace.push(ip);
        self
    }
}

pub fn stack_underflow(ip: usize) -> RuntimeError {
    RuntimeError::new(&format!("stack underflow at {:04}", ip))
}

pub fn type_error(expected: &str, got: &StackItem) -> RuntimeError {
    RuntimeError::new(&format!("expected {}, got {}", expected, got.type_name()))
}

pub fn index_out_of_bounds(index: i64, len: usize) -> RuntimeError {
    RuntimeError::new(&format!("index {} outside 0..{}", index, len))
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

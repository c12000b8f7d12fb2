use serde::{Deserialize, Serialize};

use crate::lang::Type;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Type,
}

/// One entry of the public surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Name the dispatcher matches against argument 0.
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub return_type: Type,
    /// Answers the verification trigger.
    pub verify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: Type,
    pub readonly: bool,
}

/// An event raised with `notify("Name", ...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    pub params: Vec<Type>,
}

/// What a compiled module exposes to callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractMetadata {
    /// The smart contract class, or the module name when there is none.
    pub name: String,
    pub methods: Vec<MethodInfo>,
    pub properties: Vec<PropertyInfo>,
    pub events: Vec<EventInfo>,
}

impl ContractMetadata {
    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&EventInfo> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

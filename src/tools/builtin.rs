//! Identifiers of the builtin tools the engine knows by name.

use crate::operation::OperationKind;

pub const WEB_BROWSING: &str = "web-browsing";
pub const CODE_INTERPRETER: &str = "code-interpreter";
pub const LOCAL_FILES: &str = "local-files";

/// Operation kind recorded for a call into the given tool identifier.
pub fn operation_kind_for(identifier: &str) -> OperationKind {
    match identifier {
        CODE_INTERPRETER => OperationKind::ToolInterpreter,
        WEB_BROWSING => OperationKind::ToolSearch,
        LOCAL_FILES => OperationKind::ToolLocalFiles,
        _ => OperationKind::BuiltinToolCall,
    }
}

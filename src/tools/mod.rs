//! Tool manifests, resolution and builtin execution.

pub mod builtin;
mod capabilities;
mod executor;
mod manifest;
mod resolver;

pub use builtin::operation_kind_for;
pub use capabilities::{Capabilities, ExecutionEnvironment, FunctionCalling};
pub use executor::{BuiltinToolExecutor, BuiltinToolRegistry, ToolExecutionContext, ToolResult};
pub use manifest::{ConnectorType, ManifestSource, StaticManifestSource, ToolApi, ToolManifest};
pub use resolver::{
    EnableChecker, FilterReason, FilteredTool, ResolvedToolSet, SEPARATOR, ToolNameParts,
    ToolResolver, parse_tool_name, tool_schema_name,
};

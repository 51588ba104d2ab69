//! Diagnostic catalogue shared by every compilation phase.
//!
//! Every finding is a [`DiagnosticKind`]; its code, category and severity are
//! derived from the variant so category membership is checked by the compiler
//! instead of by code prefix.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Aborts compilation of the current document (or project).
    Fatal,
    /// Advisory only; returned alongside a successful result.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Structural,
    Uniqueness,
    State,
    GraphIntegrity,
    Configuration,
    Expression,
    Advisory,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Structural => write!(f, "Structure"),
            Category::Uniqueness => write!(f, "Uniqueness"),
            Category::State => write!(f, "State"),
            Category::GraphIntegrity => write!(f, "Graph"),
            Category::Configuration => write!(f, "Configuration"),
            Category::Expression => write!(f, "Expression"),
            Category::Advisory => write!(f, "Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    // -- structural ---------------------------------------------------------
    #[error("Document is not well-formed AJML: {reason}")]
    MalformedDocument { reason: String },
    #[error("Root element must be `<{expected}>` with a non-empty `name` attribute.")]
    RootMismatch { expected: String },
    #[error("Required block `<{block}>` is missing.")]
    MissingBlock { block: String },
    #[error("No project document found. A `_project.ajml` file is required.")]
    MissingProject,
    #[error("Invalid `ajml_version` '{found}'. Supported versions: 2.0.")]
    InvalidVersion { found: String },

    // -- uniqueness ---------------------------------------------------------
    #[error("Duplicate node ID `{id}`.")]
    DuplicateNodeId { id: String },
    #[error("Duplicate tool ID `{id}`.")]
    DuplicateToolId { id: String },
    #[error("Duplicate state field name `{name}`.")]
    DuplicateField { name: String },
    #[error("`{word}` is a reserved word and cannot be used as a {role}.")]
    ReservedWord { word: String, role: String },
    #[error("Invalid node type `{found}`. Must be one of: action, llm, script, subgraph.")]
    InvalidNodeType { found: String },
    #[error("Invalid tool type `{found}`. Must be one of: api_call, local_script, script_tool.")]
    InvalidToolType { found: String },
    #[error("`{name}` is not a valid {role}. Use letters, digits and underscores, not starting with a digit or matching a Python keyword.")]
    InvalidIdentifier { name: String, role: String },

    // -- state --------------------------------------------------------------
    #[error("Invalid state field type `{found}` for field `{field}`.")]
    InvalidFieldType { field: String, found: String },
    #[error("Enum field `{field}` must have a non-empty `values` attribute.")]
    EnumWithoutValues { field: String },
    #[error("Reducer `{reducer}` is not valid for field `{field}` of type `{ty}`. Valid reducers: {allowed}.")]
    InvalidReducer {
        field: String,
        reducer: String,
        ty: String,
        allowed: String,
    },
    #[error("Enum default value `{default}` of field `{field}` is not in the declared values list: {values}.")]
    EnumDefault {
        field: String,
        default: String,
        values: String,
    },
    #[error("Cannot declare state field `messages`. This field is implicitly managed by the framework.")]
    MessagesField,
    #[error("Required field `{field}` cannot have a default value.")]
    RequiredWithDefault { field: String },

    // -- graph integrity ----------------------------------------------------
    #[error("No entry point found. At least one edge must have `source=\"__START__\"`.")]
    NoEntryPoint,
    #[error("Edge target `{target}` does not match any declared node ID or `__END__`.")]
    UnknownEdgeTarget { target: String },
    #[error("Edge source `{from}` does not match any declared node ID or `__START__`.")]
    UnknownEdgeSource { from: String },
    #[error("Conditional edge group from `{from}` is missing a `default=\"true\"` edge.")]
    MissingDefault { from: String },
    #[error("Edge from `{from}` to `{to}` has `default=\"true\"` and must not also contain a `<condition>`.")]
    DefaultWithCondition { from: String, to: String },
    #[error("Multiple `default=\"true\"` edges ({count}) from source `{from}`.")]
    MultipleDefaults { from: String, count: usize },
    #[error("Tool reference `{tool}` does not match any declared tool ID.")]
    UnknownTool { tool: String },
    #[error("Script file `tools/{path}` does not exist.")]
    ScriptNotFound { path: String },
    #[error("Agent reference `{agent}` does not match any agent in the project.")]
    UnknownAgentRef { agent: String },
    #[error("Input map target `{target}` does not exist in child agent `{agent}` state.")]
    InputMapTarget { target: String, agent: String },
    #[error("Output map source `{field}` does not exist in child agent `{agent}` state.")]
    OutputMapSource { field: String, agent: String },
    #[error("Node `{node}` is unreachable from `__START__`.")]
    UnreachableNode { node: String },
    #[error("Node `{node}` has no outgoing edges.")]
    DeadEndNode { node: String },
    #[error("Mixed edge types from source `{from}`. A node's outgoing edges must be all unconditional, all conditional, or a single map edge.")]
    MixedEdgeTypes { from: String },
    #[error("Map edge `items_field` `{field}` must reference a list-type state field.")]
    FanOutType { field: String },
    #[error("Action node `{node}` passes tool parameter `{param}`, which is not a declared state field.")]
    ActionParamNotInState { node: String, param: String },
    #[error("{site} references `{field}`, which is not a declared state field.")]
    UnknownStateField { field: String, site: String },

    // -- configuration ------------------------------------------------------
    #[error("Unknown LLM provider `{provider}`. Must be one of: {supported}.")]
    UnknownProvider { provider: String, supported: String },
    #[error("Circular subgraph dependency detected: {}.", .path.join(" → "))]
    CircularReference { path: Vec<String> },
    #[error("Duplicate agent name `{name}` across project (first declared in {first_file}).")]
    DuplicateAgentName { name: String, first_file: String },

    // -- expression ---------------------------------------------------------
    #[error("Condition expression references undefined name `{name}`. Only `state` and allowed builtins are available.")]
    UnboundName { name: String, expr: String },
    #[error("Invalid interpolation `{text}`: {reason}.")]
    InterpolationSyntax { text: String, reason: String },
    #[error("Condition expression `{expr}` is not a valid expression: {reason}.")]
    ExpressionSyntax { expr: String, reason: String },

    // -- warnings -----------------------------------------------------------
    #[error("Parallel branches from `{node}` may both write to field `{field}` which uses the `overwrite` reducer. Result may be non-deterministic.")]
    ParallelWrite { node: String, field: String },
    #[error("Required field `{field}` is never referenced by any prompt, condition, mapping or tool.")]
    UnusedField { field: String },
}

impl DiagnosticKind {
    /// Stable catalogue code.
    pub fn code(&self) -> &'static str {
        use DiagnosticKind::*;
        match self {
            MalformedDocument { .. } => "E000",
            RootMismatch { .. } => "E001",
            MissingBlock { .. } => "E002",
            MissingProject => "E003",
            InvalidVersion { .. } => "E004",
            DuplicateNodeId { .. } => "E101",
            DuplicateToolId { .. } => "E102",
            DuplicateField { .. } => "E103",
            ReservedWord { .. } => "E104",
            InvalidNodeType { .. } => "E105",
            InvalidToolType { .. } => "E106",
            InvalidIdentifier { .. } => "E110",
            InvalidFieldType { .. } | EnumWithoutValues { .. } => "E107",
            InvalidReducer { .. } => "E108",
            EnumDefault { .. } => "E109",
            MessagesField => "E201",
            RequiredWithDefault { .. } => "E202",
            NoEntryPoint => "E301",
            UnknownEdgeTarget { .. } => "E302",
            UnknownEdgeSource { .. } => "E303",
            MissingDefault { .. } => "E304",
            DefaultWithCondition { .. } => "E305",
            MultipleDefaults { .. } => "E306",
            UnknownTool { .. } => "E307",
            ScriptNotFound { .. } => "E308",
            UnknownAgentRef { .. } => "E309",
            InputMapTarget { .. } => "E310",
            OutputMapSource { .. } => "E311",
            UnreachableNode { .. } => "E312",
            DeadEndNode { .. } => "E313",
            MixedEdgeTypes { .. } => "E314",
            FanOutType { .. } => "E315",
            ActionParamNotInState { .. } => "E316",
            UnknownStateField { .. } => "E317",
            UnknownProvider { .. } => "E401",
            CircularReference { .. } => "E402",
            DuplicateAgentName { .. } => "E403",
            UnboundName { .. } => "E501",
            InterpolationSyntax { .. } => "E502",
            ExpressionSyntax { .. } => "E503",
            ParallelWrite { .. } => "W301",
            UnusedField { .. } => "W302",
        }
    }

    pub fn category(&self) -> Category {
        use DiagnosticKind::*;
        match self {
            MalformedDocument { .. }
            | RootMismatch { .. }
            | MissingBlock { .. }
            | MissingProject
            | InvalidVersion { .. } => Category::Structural,
            DuplicateNodeId { .. }
            | DuplicateToolId { .. }
            | DuplicateField { .. }
            | ReservedWord { .. }
            | InvalidNodeType { .. }
            | InvalidToolType { .. }
            | InvalidIdentifier { .. } => Category::Uniqueness,
            InvalidFieldType { .. }
            | EnumWithoutValues { .. }
            | InvalidReducer { .. }
            | EnumDefault { .. }
            | MessagesField
            | RequiredWithDefault { .. } => Category::State,
            NoEntryPoint
            | UnknownEdgeTarget { .. }
            | UnknownEdgeSource { .. }
            | MissingDefault { .. }
            | DefaultWithCondition { .. }
            | MultipleDefaults { .. }
            | UnknownTool { .. }
            | ScriptNotFound { .. }
            | UnknownAgentRef { .. }
            | InputMapTarget { .. }
            | OutputMapSource { .. }
            | UnreachableNode { .. }
            | DeadEndNode { .. }
            | MixedEdgeTypes { .. }
            | FanOutType { .. }
            | ActionParamNotInState { .. }
            | UnknownStateField { .. } => Category::GraphIntegrity,
            UnknownProvider { .. } | CircularReference { .. } | DuplicateAgentName { .. } => {
                Category::Configuration
            }
            UnboundName { .. } | InterpolationSyntax { .. } | ExpressionSyntax { .. } => {
                Category::Expression
            }
            ParallelWrite { .. } | UnusedField { .. } => Category::Advisory,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.category() {
            Category::Advisory => Severity::Warning,
            _ => Severity::Fatal,
        }
    }
}

/// A single finding: what went wrong, in which file, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: String,
    /// 1-based line of the offending element, when known.
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, file: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            file: file.into(),
            line: None,
        }
    }

    pub fn at(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.severity() == Severity::Fatal
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.kind)?;
        match (self.file.is_empty(), self.line) {
            (true, _) => Ok(()),
            (false, Some(line)) => write!(f, " ({}:{})", self.file, line),
            (false, None) => write!(f, " ({})", self.file),
        }
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_category() {
        let kind = DiagnosticKind::MultipleDefaults {
            from: "check".into(),
            count: 2,
        };
        assert_eq!(kind.code(), "E306");
        assert_eq!(kind.category(), Category::GraphIntegrity);
        assert_eq!(kind.severity(), Severity::Fatal);

        let warn = DiagnosticKind::ParallelWrite {
            node: "split".into(),
            field: "result".into(),
        };
        assert_eq!(warn.code(), "W301");
        assert_eq!(warn.severity(), Severity::Warning);
    }

    #[test]
    fn display_includes_file_and_line() {
        let d = Diagnostic::new(
            DiagnosticKind::DuplicateNodeId { id: "a".into() },
            "agents/test.ajml",
        )
        .at(Some(7));
        assert_eq!(
            d.to_string(),
            "[E101] Duplicate node ID `a`. (agents/test.ajml:7)"
        );
    }

    #[test]
    fn cycle_message_lists_full_path() {
        let kind = DiagnosticKind::CircularReference {
            path: vec!["agent_a".into(), "agent_b".into(), "agent_a".into()],
        };
        assert_eq!(
            kind.to_string(),
            "Circular subgraph dependency detected: agent_a → agent_b → agent_a."
        );
    }
}

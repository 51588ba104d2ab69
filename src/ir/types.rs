//! IR type definitions for the AJML compiler.
//!
//! The IR sits between the parsed document tree (input) and the generated
//! Python module (output). Every entity is built once by the validator, in
//! declaration order, and only read afterwards.

use std::fmt;

use serde::Serialize;

// =============================================================================
// RESERVED NAMES
// =============================================================================

/// Entry sentinel. Only valid as an edge source.
pub const START: &str = "__START__";
/// Terminal sentinel. Only valid as an edge target.
pub const END: &str = "__END__";

/// Names no field, tool or node may take.
pub const RESERVED_WORDS: [&str; 6] = [
    START,
    END,
    "messages",
    "__root__",
    "__config__",
    "__state__",
];

/// The framework-managed message history channel.
pub const MESSAGES_FIELD: &str = "messages";

/// Names a condition expression may use in name position.
pub const CONDITION_NAMES: [&str; 14] = [
    "state", "len", "any", "all", "abs", "min", "max", "str", "int", "float", "bool", "True",
    "False", "None",
];

pub const SUPPORTED_AJML_VERSION: &str = "2.0";

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

const PYTHON_KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Ids become Python function, class and variable names in generated code.
pub fn is_python_name(name: &str) -> bool {
    super::template::is_identifier(name) && !PYTHON_KEYWORDS.contains(&name)
}

// =============================================================================
// PROJECT
// =============================================================================

/// Validated `_project.ajml`: project-wide defaults shared by every agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub name: String,
    pub ajml_version: String,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub env_vars: Vec<EnvVar>,
    pub file: String,
}

impl Project {
    /// Project with every optional block left at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Project {
            name: name.into(),
            ajml_version: SUPPORTED_AJML_VERSION.into(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            env_vars: Vec::new(),
            file: String::new(),
        }
    }

    /// The LLM config an agent runs with: its own override, else the project's.
    pub fn llm_for<'a>(&'a self, agent: &'a Agent) -> &'a LlmConfig {
        agent.llm.as_ref().unwrap_or(&self.llm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmConfig {
    /// `None` when no provider was declared; codegen leaves a placeholder.
    pub provider: Option<Provider>,
    pub model: String,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: None,
            model: String::new(),
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
    Mistral,
    Groq,
    Ollama,
    AzureOpenai,
    Bedrock,
}

impl Provider {
    pub const ALL: [Provider; 8] = [
        Provider::Openai,
        Provider::Anthropic,
        Provider::Google,
        Provider::Mistral,
        Provider::Groq,
        Provider::Ollama,
        Provider::AzureOpenai,
        Provider::Bedrock,
    ];

    pub fn parse(s: &str) -> Option<Provider> {
        Provider::ALL.into_iter().find(|p| p.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
            Provider::AzureOpenai => "azure_openai",
            Provider::Bedrock => "bedrock",
        }
    }

    /// Sorted, comma-separated list used in diagnostics.
    pub fn supported_list() -> String {
        let mut names: Vec<&str> = Provider::ALL.iter().map(|p| p.as_str()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub cors_origins: String,
    pub auth_env: Option<String>,
    /// Explicit `docs_public`, or `true` exactly when no `auth_env` is set.
    pub docs_public: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            cors_origins: "*".into(),
            auth_env: None,
            docs_public: true,
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub required: bool,
    pub default: Option<String>,
}

// =============================================================================
// AGENT
// =============================================================================

/// One validated agent document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    /// Unique across the project; also names the generated module.
    pub name: String,
    pub version: String,
    pub description: String,
    /// Per-agent override of the project LLM config.
    pub llm: Option<LlmConfig>,
    pub state: Vec<StateField>,
    pub tools: Vec<Tool>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub file: String,
}

impl Agent {
    pub fn field(&self, name: &str) -> Option<&StateField> {
        self.state.iter().find(|f| f.name == name)
    }

    pub fn tool(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id() == id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Subgraph nodes, in declaration order.
    pub fn subgraphs(&self) -> impl Iterator<Item = &SubgraphNode> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Subgraph(s) => Some(s),
            _ => None,
        })
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateField {
    pub name: String,
    pub ty: FieldType,
    /// Caller-supplied input; never carries a default.
    pub required: bool,
    pub default: Option<String>,
    pub reducer: Reducer,
    /// Whether the field is visible to external callers of the compiled agent.
    pub expose: bool,
    pub line: Option<u32>,
}

/// Declared type of a state field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum FieldType {
    Simple(SimpleType),
    /// `list[string|int|float|dict]`
    List(ScalarType),
    /// `dict[string|int|any]`
    Dict(ScalarType),
    /// `enum` plus its declared value set.
    Enum(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleType {
    String,
    Int,
    Float,
    Bool,
    List,
    Dict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Int,
    Float,
    Dict,
    Any,
}

/// Type family used to pick the legal reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    String,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Enum,
}

impl FieldType {
    /// Resolve a type name from the catalogue. `enum` comes back with an empty
    /// value set; the caller attaches the declared values.
    pub fn parse(s: &str) -> Option<FieldType> {
        let ty = match s {
            "string" => FieldType::Simple(SimpleType::String),
            "int" => FieldType::Simple(SimpleType::Int),
            "float" => FieldType::Simple(SimpleType::Float),
            "bool" => FieldType::Simple(SimpleType::Bool),
            "list" => FieldType::Simple(SimpleType::List),
            "dict" => FieldType::Simple(SimpleType::Dict),
            "enum" => FieldType::Enum(Vec::new()),
            "list[string]" => FieldType::List(ScalarType::String),
            "list[int]" => FieldType::List(ScalarType::Int),
            "list[float]" => FieldType::List(ScalarType::Float),
            "list[dict]" => FieldType::List(ScalarType::Dict),
            "dict[string]" => FieldType::Dict(ScalarType::String),
            "dict[int]" => FieldType::Dict(ScalarType::Int),
            "dict[any]" => FieldType::Dict(ScalarType::Any),
            _ => return None,
        };
        Some(ty)
    }

    pub fn base(&self) -> BaseType {
        match self {
            FieldType::Simple(SimpleType::String) => BaseType::String,
            FieldType::Simple(SimpleType::Int) => BaseType::Int,
            FieldType::Simple(SimpleType::Float) => BaseType::Float,
            FieldType::Simple(SimpleType::Bool) => BaseType::Bool,
            FieldType::Simple(SimpleType::List) | FieldType::List(_) => BaseType::List,
            FieldType::Simple(SimpleType::Dict) | FieldType::Dict(_) => BaseType::Dict,
            FieldType::Enum(_) => BaseType::Enum,
        }
    }

    pub fn is_list(&self) -> bool {
        self.base() == BaseType::List
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Simple(s) => write!(f, "{}", s.as_str()),
            FieldType::List(s) => write!(f, "list[{}]", s.as_str()),
            FieldType::Dict(s) => write!(f, "dict[{}]", s.as_str()),
            FieldType::Enum(_) => write!(f, "enum"),
        }
    }
}

impl SimpleType {
    pub fn as_str(self) -> &'static str {
        match self {
            SimpleType::String => "string",
            SimpleType::Int => "int",
            SimpleType::Float => "float",
            SimpleType::Bool => "bool",
            SimpleType::List => "list",
            SimpleType::Dict => "dict",
        }
    }
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Dict => "dict",
            ScalarType::Any => "any",
        }
    }
}

impl BaseType {
    pub fn allowed_reducers(self) -> &'static [Reducer] {
        match self {
            BaseType::String => &[Reducer::Overwrite, Reducer::Concat],
            BaseType::Int | BaseType::Float => &[Reducer::Overwrite, Reducer::Add],
            BaseType::Bool | BaseType::Enum => &[Reducer::Overwrite],
            BaseType::List => &[Reducer::Overwrite, Reducer::Append],
            BaseType::Dict => &[Reducer::Overwrite, Reducer::Merge],
        }
    }

    /// Allowed reducer names, sorted, comma-separated.
    pub fn allowed_list(self) -> String {
        let mut names: Vec<&str> = self.allowed_reducers().iter().map(|r| r.as_str()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

/// Merge policy for concurrent updates to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Last write wins.
    Overwrite,
    Append,
    Add,
    /// Shallow key union, right side wins.
    Merge,
    Concat,
}

impl Reducer {
    pub fn parse(s: &str) -> Option<Reducer> {
        match s {
            "overwrite" => Some(Reducer::Overwrite),
            "append" => Some(Reducer::Append),
            "add" => Some(Reducer::Add),
            "merge" => Some(Reducer::Merge),
            "concat" => Some(Reducer::Concat),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reducer::Overwrite => "overwrite",
            Reducer::Append => "append",
            Reducer::Add => "add",
            Reducer::Merge => "merge",
            Reducer::Concat => "concat",
        }
    }
}

// =============================================================================
// TOOLS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    ApiCall(ApiCallTool),
    LocalScript(LocalScriptTool),
    ScriptTool(ScriptTool),
}

impl Tool {
    pub fn id(&self) -> &str {
        match self {
            Tool::ApiCall(t) => &t.id,
            Tool::LocalScript(t) => &t.id,
            Tool::ScriptTool(t) => &t.id,
        }
    }

    /// Names of the explicitly declared call parameters. `LocalScript` passes
    /// its arguments through and declares none.
    pub fn param_names(&self) -> Vec<&str> {
        match self {
            Tool::ApiCall(t) => t.parameters.iter().map(|p| p.name.as_str()).collect(),
            Tool::LocalScript(_) => Vec::new(),
            Tool::ScriptTool(t) => t.parameters.iter().map(|p| p.name.as_str()).collect(),
        }
    }
}

/// HTTP request tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCallTool {
    pub id: String,
    pub description: String,
    /// Upper-case HTTP verb.
    pub method: String,
    /// May contain `${env:VAR}` and `${path_param}` placeholders.
    pub url: String,
    pub headers: Vec<Header>,
    pub parameters: Vec<ApiParam>,
    pub body: Option<RequestBody>,
    pub returns: Vec<ReturnMapping>,
    /// 0 disables retrying.
    pub max_retries: u32,
    /// Seconds.
    pub timeout: f64,
    pub retry_status_codes: Vec<u16>,
    pub backoff: Backoff,
    /// Seconds; multiplier for exponential, constant for fixed.
    pub backoff_base: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    /// May contain `${env:VAR}` placeholders.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiParam {
    /// Python argument name.
    pub name: String,
    pub ty: String,
    /// Name on the API side (query key or URL placeholder); defaults to `name`.
    pub map_to: String,
    pub location: ParamLocation,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    Query,
    Path,
    Body,
    /// Declared but not placed anywhere by the wrapper.
    Unplaced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestBody {
    pub format: String,
    pub fields: Vec<BodyField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BodyField {
    pub name: String,
    pub ty: String,
    pub from_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnMapping {
    /// Dotted path into the JSON response.
    pub api_field: String,
    pub state_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalScriptTool {
    pub id: String,
    /// Relative to the project `tools/` directory.
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptTool {
    pub id: String,
    /// Relative to the project `tools/` directory.
    pub src: String,
    pub description: String,
    pub parameters: Vec<ScriptParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptParam {
    pub name: String,
    pub ty: String,
    pub description: String,
}

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Llm(LlmNode),
    Action(ActionNode),
    Script(ScriptNode),
    Subgraph(SubgraphNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Llm(n) => &n.id,
            Node::Action(n) => &n.id,
            Node::Script(n) => &n.id,
            Node::Subgraph(n) => &n.id,
        }
    }

    /// LLM nodes with bound tools get a companion tool node and a loop router.
    pub fn has_tool_loop(&self) -> bool {
        matches!(self, Node::Llm(n) if !n.tool_binds.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmNode {
    pub id: String,
    /// Template; `${field}` placeholders read state fields.
    pub system_prompt: String,
    pub output_schema: Vec<OutputField>,
    /// Ids of declared tools.
    pub tool_binds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputField {
    pub name: String,
    pub ty: String,
    pub description: String,
    /// Literal choices when `ty` is `enum`.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionNode {
    pub id: String,
    pub tool_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptNode {
    pub id: String,
    /// Relative to the project `tools/` directory.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubgraphNode {
    pub id: String,
    /// Name of another agent in the project.
    pub agent_ref: String,
    /// parent field → child field
    pub input_map: Vec<FieldMapping>,
    /// child field → parent field
    pub output_map: Vec<FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
}

// =============================================================================
// EDGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EdgeSource {
    Start,
    Node(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EdgeTarget {
    End,
    Node(String),
}

impl EdgeSource {
    /// The id as written in the document.
    pub fn as_str(&self) -> &str {
        match self {
            EdgeSource::Start => START,
            EdgeSource::Node(id) => id,
        }
    }
}

impl EdgeTarget {
    pub fn as_str(&self) -> &str {
        match self {
            EdgeTarget::End => END,
            EdgeTarget::Node(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: EdgeSource,
    pub target: EdgeTarget,
    pub default: bool,
    pub condition: Option<String>,
    pub fan_out: Option<FanOut>,
    pub line: Option<u32>,
}

impl Edge {
    pub fn new(source: EdgeSource, target: EdgeTarget) -> Self {
        Edge {
            source,
            target,
            default: false,
            condition: None,
            fan_out: None,
            line: None,
        }
    }

    /// No condition, not default, not fan-out.
    pub fn is_plain(&self) -> bool {
        self.condition.is_none() && !self.default && self.fan_out.is_none()
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some() || self.default
    }
}

/// One downstream dispatch per element of `items_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanOut {
    pub items_field: String,
    pub item_var: String,
}

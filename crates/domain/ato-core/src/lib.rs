pub mod event;
pub mod manufacturing;
pub mod model;
pub mod normalize;
pub mod protocol;
pub mod toolchain;

pub use event::{Event, EventType};
pub use model::{
    BomComponent, BomData, Build, BuildStatus, BuildTarget, DependencyInfo, FileTreeNode,
    ModuleDefinition, PackageInfo, Problem, ProblemLevel, Project, StdLibItem, VariablesData,
};
pub use protocol::{
    CorrelationId, InboundFrame, OutboundFrame, ProtocolError, RequestEnvelope, ResponseEnvelope,
};
pub use toolchain::{AtopileConfig, AtopileConfigPatch};

/// Identifies one build target of one project; keys the BOM and variables slices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub project_root: String,
    pub target: String,
}

impl TargetKey {
    pub fn new(project_root: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            target: target.into(),
        }
    }
}

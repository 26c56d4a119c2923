use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitStatus {
    pub has_uncommitted_changes: bool,
    pub changed_files: Vec<String>,
}

/// Paths to the artifacts a finished build produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOutputs {
    pub gerbers: Option<String>,
    pub bom_json: Option<String>,
    pub bom_csv: Option<String>,
    pub pick_and_place: Option<String>,
    pub step: Option<String>,
    pub glb: Option<String>,
    pub kicad_pcb: Option<String>,
    pub kicad_sch: Option<String>,
    pub pcb_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PcbBreakdown {
    pub base_cost: f64,
    pub area_cost: f64,
    pub layer_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentsBreakdown {
    pub unique_parts: u32,
    pub total_parts: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyBreakdown {
    pub base_cost: f64,
    pub per_part_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostEstimate {
    pub pcb_cost: f64,
    pub components_cost: f64,
    pub assembly_cost: f64,
    pub total_cost: f64,
    pub currency: String,
    pub quantity: u32,
    pub pcb_breakdown: Option<PcbBreakdown>,
    pub components_breakdown: Option<ComponentsBreakdown>,
    pub assembly_breakdown: Option<AssemblyBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub project_root: String,
    pub targets: Vec<String>,
    pub directory: String,
    pub file_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportResult {
    pub files: Vec<String>,
    pub errors: Option<Vec<String>>,
}

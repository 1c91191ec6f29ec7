//! Dry-run planning: the writes a save would issue for a document.

use serde::Serialize;

use trellis_core::EntitySchema;
use trellis_mapper::{MappingContext, ObjectGraphDiffer, PlanSummary, WritePlan};

use crate::document::{DocumentError, GraphDocument};

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutput {
    pub summary: PlanSummary,
    pub plan: WritePlan,
}

/// Diff a document against an empty mapping context. With no `roots`,
/// every object of the document is a root.
pub fn plan_document(
    schema: &dyn EntitySchema,
    doc: &GraphDocument,
    roots: &[String],
    horizon: i32,
) -> Result<PlanOutput, DocumentError> {
    let loaded = doc.build(schema)?;
    let roots = if roots.is_empty() {
        doc.objects
            .iter()
            .map(|o| loaded.resolve(&o.key))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        roots
            .iter()
            .map(|k| loaded.resolve(k))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut context = MappingContext::new();
    let saved = ObjectGraphDiffer::new(schema, &mut context).diff_all(&loaded.graph, &roots, horizon)?;
    tracing::debug!(roots = roots.len(), operations = saved.plan.len(), "planned document");
    Ok(PlanOutput {
        summary: saved.plan.summary(),
        plan: saved.plan,
    })
}

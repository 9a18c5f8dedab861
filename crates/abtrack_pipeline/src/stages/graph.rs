//! The whole-library graph stage.

use std::path::PathBuf;

use abtrack_cache::layout::TIMELINE_FILE;
use abtrack_cache::{ArtifactKey, ArtifactRecord, GraphRecord};

use crate::error::PipelineError;
use crate::orchestrator::{PipelineOrchestrator, Plan};
use crate::timeline::Timeline;

impl PipelineOrchestrator<'_> {
    /// Rewrites the timeline when the records it is built from changed.
    pub(crate) fn graph_stage(&self) -> Result<(), PipelineError> {
        let timeline = {
            let store = self.lock_store()?;
            Timeline::collect(&self.ctx.library, &self.ctx.versions, &store)
        };
        let fingerprint = timeline.fingerprint()?;
        let key = ArtifactKey::Graph;
        let plan = self.plan(&key, |cached| {
            cached
                .data
                .as_graph()
                .map_or(true, |graph| graph.inputs != Some(fingerprint))
        })?;
        if !matches!(plan, Plan::Build(_)) {
            return Ok(());
        }

        let rel = PathBuf::from(TIMELINE_FILE);
        timeline.write(&self.absolute(&rel))?;
        tracing::info!(rows = timeline.rows.len(), "timeline written");
        let record = ArtifactRecord::new(GraphRecord {
            rows: timeline.rows.len(),
            inputs: Some(fingerprint),
        })
        .with_path(rel)
        .with_hash(fingerprint);
        self.commit(key, record)
    }
}

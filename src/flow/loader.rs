//! Graph loader (C9): reads JSON graph definitions from a directory,
//! derives a registration graph for any authentication graph that doesn't
//! already have one, and upserts everything into the engine's catalog.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::flow::engine::FlowEngine;
use crate::flow::graph::{Graph, GraphType};
use crate::flow::store::FlowContextStore;

/// Parse every `*.json` file in `directory` as a [`Graph`]. A file that
/// fails to parse is logged and skipped rather than aborting the whole load,
/// matching the registry's lenient-by-default posture elsewhere in the crate.
pub fn load_graphs_from_dir(directory: &Path) -> Result<Vec<Graph>> {
    if !directory.exists() {
        info!(path = %directory.display(), "graph directory does not exist, nothing to load");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(directory).map_err(|e| Error::Storage(e.to_string()))?;
    let mut graphs = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| Error::Storage(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read graph file, skipping");
                continue;
            }
        };

        match Graph::from_json(&raw) {
            Ok(graph) => graphs.push(graph),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to parse graph file, skipping"),
        }
    }

    Ok(graphs)
}

/// Load every graph under `directory`, deriving a registration graph for any
/// authentication graph that doesn't already have one with a matching id
/// (`<id>-registration`), and register all of them on `engine` (§4.6).
pub fn load_and_register<S: FlowContextStore>(engine: &FlowEngine<S>, directory: &Path, auto_infer_registration: bool) -> Result<usize> {
    let graphs = load_graphs_from_dir(directory)?;
    let existing_ids: std::collections::HashSet<String> = graphs.iter().map(|g| g.id.clone()).collect();

    let mut derived = Vec::new();
    if auto_infer_registration {
        for graph in &graphs {
            if graph.graph_type != GraphType::Authentication {
                continue;
            }
            let registration_id = format!("{}-registration", graph.id);
            if existing_ids.contains(&registration_id) {
                continue;
            }
            match graph.derive_registration() {
                Ok(mut registration_graph) => {
                    registration_graph.id = registration_id;
                    derived.push(registration_graph);
                }
                Err(e) => {
                    info!(graph_id = %graph.id, error = %e, "skipping registration derivation");
                }
            }
        }
    }

    let count = graphs.len() + derived.len();
    for graph in graphs.into_iter().chain(derived) {
        engine.register_graph(graph);
    }
    Ok(count)
}

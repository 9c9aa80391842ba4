//! Startup loading of contracts and seed expectations.

use super::{create_stub, ExpectationDocument, HttpStubData};
use crate::contract::Feature;
use crate::errors::ContractError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Suffix of the directory holding a contract's own example expectations,
/// e.g. `orders_examples/` next to `orders.json`.
pub const EXAMPLES_DIR_SUFFIX: &str = "_examples";

/// A contract together with the expectations that came with it.
#[derive(Debug, Clone)]
pub struct LoadedContract {
    pub feature: Feature,
    pub source: PathBuf,
    pub examples: Vec<(PathBuf, ExpectationDocument)>,
}

/// Everything produced at startup, plus a human-readable log of it.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub features: Vec<Feature>,
    pub stubs: Vec<HttpStubData>,
    pub log: Vec<String>,
}

/// Directory of implicit examples for a contract file.
pub fn examples_dir_for(contract: &Path) -> Option<PathBuf> {
    let stem = contract.file_stem()?.to_string_lossy();
    let parent = contract.parent().unwrap_or_else(|| Path::new(""));
    Some(parent.join(format!("{}{}", stem, EXAMPLES_DIR_SUFFIX)))
}

/// Read every `*.json` expectation in `dir`, sorted by file name. Files that
/// fail to parse are reported in `log` and skipped.
pub fn read_expectation_dir(dir: &Path, log: &mut Vec<String>) -> Vec<(PathBuf, ExpectationDocument)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log.push(format!("Could not read expectation directory {}: {}", dir.display(), e));
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<ExpectationDocument>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(document) => documents.push((path, document)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable expectation");
                log.push(format!("Skipped {}: {}", path.display(), e));
            }
        }
    }
    documents
}

/// Load a contract and its implicit examples directory, if present.
pub fn load_contract(path: &Path, log: &mut Vec<String>) -> Result<LoadedContract, ContractError> {
    let feature = Feature::from_file(path)?;
    log.push(format!(
        "Loaded contract {} ({} scenarios) from {}",
        feature.name(),
        feature.scenarios().len(),
        path.display()
    ));
    let examples = match examples_dir_for(path) {
        Some(dir) if dir.is_dir() => read_expectation_dir(&dir, log),
        _ => Vec::new(),
    };
    Ok(LoadedContract {
        feature,
        source: path.to_path_buf(),
        examples,
    })
}

/// Load contracts and seed expectations. A broken contract aborts the load;
/// a seed expectation that does not fit its contracts is logged and left
/// out.
pub fn load(contracts: &[PathBuf], expectation_dirs: &[PathBuf]) -> Result<LoadOutcome, ContractError> {
    let mut outcome = LoadOutcome::default();
    let mut loaded = Vec::new();
    for path in contracts {
        loaded.push(load_contract(path, &mut outcome.log)?);
    }

    let mut stubs = Vec::new();
    for contract in &loaded {
        for (path, document) in &contract.examples {
            register_seed(
                std::slice::from_ref(&contract.feature),
                path,
                document.clone(),
                &mut stubs,
                &mut outcome.log,
            );
        }
    }

    outcome.features = loaded.into_iter().map(|c| c.feature).collect();
    for dir in expectation_dirs {
        for (path, document) in read_expectation_dir(dir, &mut outcome.log) {
            register_seed(&outcome.features, &path, document, &mut stubs, &mut outcome.log);
        }
    }
    outcome.stubs = stubs;

    info!(
        contracts = outcome.features.len(),
        stubs = outcome.stubs.len(),
        "Finished loading"
    );
    Ok(outcome)
}

fn register_seed(
    features: &[Feature],
    path: &Path,
    document: ExpectationDocument,
    stubs: &mut Vec<HttpStubData>,
    log: &mut Vec<String>,
) {
    match create_stub(features, document) {
        Ok(stub) => {
            log.push(format!("Loaded expectation {} from {}", stub.label(), path.display()));
            stubs.push(stub);
        }
        Err(e) => {
            warn!(path = %path.display(), "Seed expectation rejected");
            log.push(format!("Rejected expectation {}: {}", path.display(), e));
        }
    }
}

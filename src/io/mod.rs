use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::shap::ExplanationTable;
use crate::tree::{
    DecisionTree, Feature, NodeId, Outcome, Predicate, SampleCounts, TreeError, TreeNode,
};

const BUNDLED_TREE: &str = include_str!("../../assets/titanic_tree.json");
const BUNDLED_EXPLANATIONS: &str = include_str!("../../assets/titanic_explanations.json");

/// One node of the nested `/tree` response.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub category: Option<f64>,
    #[serde(default)]
    pub samples: Option<u32>,
    pub class_0: u32,
    pub class_1: u32,
    pub predicted_class: u8,
    pub probability: f64,
    pub is_leaf: bool,
    #[serde(default)]
    pub left_label: Option<String>,
    #[serde(default)]
    pub right_label: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<NodeDocument>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeDocument {
    Wrapped {
        tree: NodeDocument,
        #[serde(default)]
        feature_names: Vec<String>,
        #[serde(default)]
        model_metrics: Option<ModelMetrics>,
    },
    Bare(NodeDocument),
}

/// Validated tree plus whatever the serving layer sent alongside it.
#[derive(Debug, Clone)]
pub struct LoadedTree {
    pub tree: DecisionTree,
    pub metrics: Option<ModelMetrics>,
}

impl TreeDocument {
    pub fn into_tree(self) -> Result<LoadedTree, TreeError> {
        let (root, feature_names, metrics) = match self {
            TreeDocument::Wrapped {
                tree,
                feature_names,
                model_metrics,
            } => (tree, feature_names, model_metrics),
            TreeDocument::Bare(tree) => (tree, Vec::new(), None),
        };

        let root_id = root.id;
        let mut nodes = Vec::new();
        let mut stack = vec![root];
        while let Some(doc) = stack.pop() {
            let (node, children) = adapt_node(doc, &feature_names)?;
            nodes.push(node);
            stack.extend(children.into_iter().rev());
        }

        let tree = DecisionTree::new(root_id, nodes)?;
        Ok(LoadedTree { tree, metrics })
    }
}

fn adapt_node(
    doc: NodeDocument,
    feature_names: &[String],
) -> Result<(TreeNode, Vec<NodeDocument>), TreeError> {
    let id = doc.id;
    let samples = SampleCounts::new(doc.class_0, doc.class_1);
    if let Some(declared) = doc.samples {
        if declared != samples.total() {
            warn!(
                "node {id}: samples {declared} disagrees with class counts {}",
                samples.total()
            );
        }
    }
    let children = doc.children.unwrap_or_default();

    if doc.is_leaf {
        if !children.is_empty() {
            return Err(TreeError::BadArity(id, children.len()));
        }
        let outcome = Outcome::from_class(doc.predicted_class).ok_or(TreeError::InvalidClass {
            node: id,
            class: doc.predicted_class,
        })?;
        let leaf = TreeNode::Leaf {
            id,
            outcome,
            survival_rate: doc.probability,
            samples,
        };
        return Ok((leaf, children));
    }

    let name = doc.feature.ok_or(TreeError::MissingField {
        node: id,
        field: "feature",
    })?;
    let declared = feature_names.is_empty() || feature_names.iter().any(|f| f == &name);
    let feature = Feature::from_name(&name)
        .filter(|_| declared)
        .ok_or_else(|| TreeError::UnknownFeature {
            node: id,
            feature: name.clone(),
        })?;
    let predicate = match (doc.category, doc.threshold) {
        (Some(category), _) => Predicate::Equals(category),
        (None, Some(threshold)) => Predicate::AtMost(threshold),
        (None, None) => {
            return Err(TreeError::MissingField {
                node: id,
                field: "threshold",
            })
        }
    };
    let (left, right) = match children.as_slice() {
        [left, right] => (left.id, right.id),
        _ => return Err(TreeError::BadArity(id, children.len())),
    };

    let internal = TreeNode::Internal {
        id,
        feature,
        predicate,
        left,
        right,
        samples,
        left_label: doc.left_label,
        right_label: doc.right_label,
    };
    Ok((internal, children))
}

pub fn parse_tree(raw: &str) -> Result<LoadedTree> {
    let document: TreeDocument =
        serde_json::from_str(raw).context("tree document is not valid JSON")?;
    let loaded = document
        .into_tree()
        .context("tree document is not a valid binary decision tree")?;
    Ok(loaded)
}

pub fn load_tree(path: &Path) -> Result<LoadedTree> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read tree file: {}", path.display()))?;
    let loaded = parse_tree(&raw).with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        "loaded tree from {} ({} nodes, depth {})",
        path.display(),
        loaded.tree.len(),
        loaded.tree.depth()
    );
    Ok(loaded)
}

pub fn bundled_tree() -> Result<LoadedTree> {
    parse_tree(BUNDLED_TREE).context("bundled tree is invalid")
}

pub fn load_explanations(path: &Path) -> Result<ExplanationTable> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read explanation file: {}", path.display()))?;
    let table = ExplanationTable::from_json(&raw)
        .with_context(|| format!("failed to load {}", path.display()))?;
    log_explanation_count(&table, &path.display().to_string());
    Ok(table)
}

pub fn bundled_explanations() -> Result<ExplanationTable> {
    let table = ExplanationTable::from_json(BUNDLED_EXPLANATIONS)
        .context("bundled explanations are invalid")?;
    log_explanation_count(&table, "bundled assets");
    Ok(table)
}

fn log_explanation_count(table: &ExplanationTable, origin: &str) {
    if table.is_empty() {
        warn!("no explanations in {origin}; the SHAP chart will stay empty");
    } else {
        info!("loaded {} explanations from {origin}", table.len());
    }
}

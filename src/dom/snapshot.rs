use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::{Document, NodeId};
use crate::geometry::Rect;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read page snapshot: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse page snapshot")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot node has neither a tag nor text")]
    EmptyNode,
}

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// One node of a serialized page. Exactly one of `tag` or `text` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSnapshot {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// `[x, y, width, height]` in document coordinates.
    #[serde(default)]
    pub rect: Option<[f64; 4]>,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

/// A page as captured by a host: the body's children plus scroll state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub scroll: Option<[f64; 2]>,
    #[serde(default)]
    pub body: Vec<NodeSnapshot>,
}

impl PageSnapshot {
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> SnapshotResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn into_document(self) -> SnapshotResult<Document> {
        let mut document = Document::new();
        let body = document.body();
        for node in &self.body {
            build_node(&mut document, body, node)?;
        }
        if let Some([x, y]) = self.scroll {
            document.scroll_to(x, y);
        }
        Ok(document)
    }
}

fn build_node(document: &mut Document, parent: NodeId, snapshot: &NodeSnapshot) -> SnapshotResult<()> {
    let node = match (&snapshot.tag, &snapshot.text) {
        (Some(tag), _) => {
            let node = document.create_element(tag);
            for (name, value) in &snapshot.attributes {
                document.set_attribute(node, name, value);
            }
            if let Some([x, y, width, height]) = snapshot.rect {
                document.set_layout(node, Rect::new(x, y, width, height));
            }
            node
        }
        (None, Some(text)) => document.create_text(text),
        (None, None) => return Err(SnapshotError::EmptyNode),
    };
    document.append_child(parent, node);
    for child in &snapshot.children {
        build_node(document, node, child)?;
    }
    Ok(())
}

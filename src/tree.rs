//! Flattens the idiom hierarchy into the parallel label/parent/payload arrays
//! a treemap visualization consumes.

use crate::error::{GlossaError, Result};
use crate::models::{Corpus, Idiom};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_ROOT_LABEL: &str = "Languages";
pub const DEFAULT_CORPUS_HREF: &str = "/corpus/";

/// How often a group idiom's row is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupEmission {
    /// One row per group idiom.
    #[default]
    Once,
    /// One row per child visited under the group. Reproduces the output of the
    /// historical renderer, which appended the group again for every child.
    PerChild,
}

#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Label of the synthetic root that parentless idioms hang from.
    pub root_label: String,
    /// Prefix of the corpus links placed in each idiom's payload; the corpus id is appended.
    pub corpus_href: String,
    pub emission: GroupEmission,
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptions {
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            corpus_href: DEFAULT_CORPUS_HREF.to_string(),
            emission: GroupEmission::default(),
        }
    }
}

/// Three parallel sequences: row `i` is `labels[i]`, drawn under `parents[i]`,
/// carrying `payloads[i]` (HTML links to the idiom's corpora).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreemapData {
    pub labels: Vec<String>,
    pub parents: Vec<String>,
    pub payloads: Vec<String>,
}

impl TreemapData {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of rows carrying `label`.
    pub fn occurrences(&self, label: &str) -> usize {
        self.labels.iter().filter(|l| l.as_str() == label).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(GlossaError::from)
    }

    fn push(&mut self, label: &str, parent: &str, payload: String) {
        self.labels.push(label.to_string());
        self.parents.push(parent.to_string());
        self.payloads.push(payload);
    }
}

/// Escapes the characters that matter inside HTML text and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct Walk<'a> {
    children: HashMap<i64, Vec<&'a Idiom>>,
    corpora: HashMap<i64, Vec<&'a Corpus>>,
    options: &'a TreeOptions,
    visited: HashSet<i64>,
    out: TreemapData,
}

impl<'a> Walk<'a> {
    fn payload(&self, idiom: &Idiom) -> String {
        self.corpora
            .get(&idiom.id)
            .map(|list| {
                list.iter()
                    .map(|c| {
                        format!(
                            "<a href=\"{}{}\">{}</a>",
                            escape_html(&self.options.corpus_href),
                            c.id,
                            escape_html(&c.name)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("<br>")
            })
            .unwrap_or_default()
    }

    fn emit(&mut self, idiom: &Idiom, parent: &str) {
        let payload = self.payload(idiom);
        self.out.push(&idiom.name, parent, payload);
    }

    fn visit(&mut self, idiom: &'a Idiom, parent: &str) -> Result<()> {
        if !self.visited.insert(idiom.id) {
            return Err(GlossaError::CycleDetected(format!(
                "idiom '{}' reached twice while flattening",
                idiom.name
            )));
        }

        let kids = match self.children.get(&idiom.id) {
            Some(kids) if !kids.is_empty() => kids.clone(),
            _ => {
                self.emit(idiom, parent);
                return Ok(());
            }
        };

        match self.options.emission {
            GroupEmission::Once => {
                self.emit(idiom, parent);
                for kid in kids {
                    self.visit(kid, &idiom.name)?;
                }
            }
            GroupEmission::PerChild => {
                for kid in kids {
                    self.emit(idiom, parent);
                    self.visit(kid, &idiom.name)?;
                }
            }
        }
        Ok(())
    }
}

/// Flattens `idioms` (with their `corpora`) depth-first under a synthetic root row.
///
/// Siblings are visited in id order. Idioms that cannot be reached from a
/// parentless idiom (a cycle in the stored hierarchy) fail with `CycleDetected`;
/// a group id naming no idiom fails with `ConstraintViolation`.
pub fn flatten(idioms: &[Idiom], corpora: &[Corpus], options: &TreeOptions) -> Result<TreemapData> {
    let known: HashSet<i64> = idioms.iter().map(|i| i.id).collect();

    let mut sorted: Vec<&Idiom> = idioms.iter().collect();
    sorted.sort_by_key(|i| i.id);

    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<&Idiom>> = HashMap::new();
    for idiom in sorted {
        match idiom.group_id {
            None => roots.push(idiom),
            Some(group) if known.contains(&group) => children.entry(group).or_default().push(idiom),
            Some(group) => {
                return Err(GlossaError::ConstraintViolation(format!(
                    "idiom '{}' belongs to missing group {}",
                    idiom.name, group
                )));
            }
        }
    }

    let mut by_idiom: HashMap<i64, Vec<&Corpus>> = HashMap::new();
    for corpus in corpora {
        if known.contains(&corpus.idiom_id) {
            by_idiom.entry(corpus.idiom_id).or_default().push(corpus);
        } else {
            warn!(
                "Corpus '{}' references unknown idiom {}; left out of the tree.",
                corpus.name, corpus.idiom_id
            );
        }
    }
    for list in by_idiom.values_mut() {
        list.sort_by_key(|c| c.id);
    }

    let mut walk = Walk {
        children,
        corpora: by_idiom,
        options,
        visited: HashSet::new(),
        out: TreemapData::default(),
    };
    walk.out.push(&options.root_label, "", String::new());
    for root in roots {
        walk.visit(root, &options.root_label)?;
    }

    if walk.visited.len() != idioms.len() {
        let mut stranded: Vec<&str> = idioms
            .iter()
            .filter(|i| !walk.visited.contains(&i.id))
            .map(|i| i.name.as_str())
            .collect();
        stranded.sort_unstable();
        return Err(GlossaError::CycleDetected(format!(
            "idioms not reachable from the root: {}",
            stranded.join(", ")
        )));
    }

    debug!(
        "Flattened {} idioms into {} treemap rows ({:?}).",
        idioms.len(),
        walk.out.len(),
        options.emission
    );
    Ok(walk.out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idiom(id: i64, name: &str, group_id: Option<i64>) -> Idiom {
        Idiom {
            id,
            name: name.to_string(),
            group_id,
        }
    }

    fn corpus(id: i64, name: &str, idiom_id: i64) -> Corpus {
        Corpus {
            id,
            name: name.to_string(),
            source: String::new(),
            description: String::new(),
            idiom_id,
        }
    }

    fn germanic() -> Vec<Idiom> {
        vec![
            idiom(1, "Germanic", None),
            idiom(2, "English", Some(1)),
            idiom(3, "German", Some(1)),
        ]
    }

    #[test]
    fn test_group_emitted_once() {
        let data = flatten(&germanic(), &[], &TreeOptions::default()).unwrap();
        assert_eq!(data.labels, vec!["Languages", "Germanic", "English", "German"]);
        assert_eq!(data.parents, vec!["", "Languages", "Germanic", "Germanic"]);
        assert_eq!(data.occurrences("Germanic"), 1);
    }

    #[test]
    fn test_group_emitted_per_child() {
        let options = TreeOptions {
            emission: GroupEmission::PerChild,
            ..TreeOptions::default()
        };
        let data = flatten(&germanic(), &[], &options).unwrap();
        assert_eq!(
            data.labels,
            vec!["Languages", "Germanic", "English", "Germanic", "German"]
        );
        assert_eq!(data.occurrences("Germanic"), 2);
        assert_eq!(data.labels.len(), data.parents.len());
        assert_eq!(data.labels.len(), data.payloads.len());
    }

    #[test]
    fn test_nested_groups_depth_first() {
        let idioms = vec![
            idiom(1, "Indo-European", None),
            idiom(2, "Germanic", Some(1)),
            idiom(3, "Romance", Some(1)),
            idiom(4, "English", Some(2)),
            idiom(5, "French", Some(3)),
            idiom(6, "Quechua", None),
        ];
        let data = flatten(&idioms, &[], &TreeOptions::default()).unwrap();
        assert_eq!(
            data.labels,
            vec!["Languages", "Indo-European", "Germanic", "English", "Romance", "French", "Quechua"]
        );
        assert_eq!(
            data.parents,
            vec!["", "Languages", "Indo-European", "Germanic", "Indo-European", "Romance", "Languages"]
        );
    }

    #[test]
    fn test_payload_links() {
        let corpora = vec![
            corpus(7, "Beowulf & co", 2),
            corpus(3, "Canterbury Tales", 2),
        ];
        let data = flatten(&germanic(), &corpora, &TreeOptions::default()).unwrap();
        let english = data.labels.iter().position(|l| l == "English").unwrap();
        assert_eq!(
            data.payloads[english],
            "<a href=\"/corpus/3\">Canterbury Tales</a><br><a href=\"/corpus/7\">Beowulf &amp; co</a>"
        );
        let german = data.labels.iter().position(|l| l == "German").unwrap();
        assert_eq!(data.payloads[german], "");
    }

    #[test]
    fn test_custom_root_label() {
        let options = TreeOptions {
            root_label: "World".to_string(),
            ..TreeOptions::default()
        };
        let data = flatten(&[idiom(1, "Basque", None)], &[], &options).unwrap();
        assert_eq!(data.labels, vec!["World", "Basque"]);
        assert_eq!(data.parents, vec!["", "World"]);
    }

    #[test]
    fn test_empty_hierarchy_has_root_only() {
        let data = flatten(&[], &[], &TreeOptions::default()).unwrap();
        assert_eq!(data.labels, vec!["Languages"]);
    }

    #[test]
    fn test_two_cycle_is_reported_instead_of_recursing() {
        let idioms = vec![
            idiom(1, "Root", None),
            idiom(2, "A", Some(3)),
            idiom(3, "B", Some(2)),
        ];
        let err = flatten(&idioms, &[], &TreeOptions::default()).unwrap_err();
        match err {
            GlossaError::CycleDetected(msg) => assert!(msg.contains("A, B"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_group_is_constraint_violation() {
        let err = flatten(&[idiom(1, "Orphan", Some(99))], &[], &TreeOptions::default()).unwrap_err();
        assert!(matches!(err, GlossaError::ConstraintViolation(_)));
    }

    #[test]
    fn test_json_shape() {
        let data = flatten(&germanic(), &[], &TreeOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&data.to_json().unwrap()).unwrap();
        assert_eq!(value["labels"][1], "Germanic");
        assert_eq!(value["parents"][2], "Germanic");
        assert!(value["payloads"].is_array());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a & 'b'>\""), "&lt;a &amp; &#39;b&#39;&gt;&quot;");
    }
}
